use tracing::{debug, warn};

use crate::error::Result;
use crate::profile::ProfileRecord;
use crate::secrets::{CallSecretStore, SecretItem};
use crate::select::SelectItem;
use crate::store::{keys, ProfileStore};

/// Words too generic to disambiguate secret items.
const STOP_WORDS: [&str; 6] = ["aws", "amazon", "account", "login", "sso", "mfa"];

/// Resolves a current TOTP code for a profile out of the external secret
/// store. Returns `None` whenever the store cannot help; the caller prompts
/// interactively in that case.
pub struct OtpProvider<'a, S, C, Sel> {
    store: &'a S,
    secrets: &'a C,
    selector: &'a Sel,
}

impl<'a, S, C, Sel> OtpProvider<'a, S, C, Sel>
where
    S: ProfileStore,
    C: CallSecretStore,
    Sel: SelectItem,
{
    pub fn new(store: &'a S, secrets: &'a C, selector: &'a Sel) -> Self {
        OtpProvider {
            store,
            secrets,
            selector,
        }
    }

    pub async fn get_otp(&self, profile: &ProfileRecord) -> Result<Option<String>> {
        if !self.secrets.available().await {
            debug!("secret-store CLI unavailable");
            return Ok(None);
        }

        if let Some(item_id) = &profile.otp_item_id {
            if self.secrets.item_exists(item_id).await? {
                return Ok(Some(self.secrets.read_totp(item_id).await?));
            }
            warn!(
                "linked secret item {} no longer exists; searching again",
                item_id
            );
        }

        let candidates = self.matching_items(&profile.name).await?;
        let chosen = match candidates.len() {
            0 => return Ok(None),
            1 => candidates.into_iter().next().unwrap(),
            _ => {
                let labels = candidates
                    .iter()
                    .map(|item| format!("{} ({})", item.title, item.id))
                    .collect::<Vec<_>>();
                match self.selector.select("one-time password item", &labels)? {
                    Some(index) => candidates.into_iter().nth(index).unwrap(),
                    None => return Ok(None),
                }
            }
        };

        self.store
            .set(&profile.name, keys::OTP_ITEM_ID, &chosen.id)
            .await?;
        Ok(Some(self.secrets.read_totp(&chosen.id).await?))
    }

    async fn matching_items(&self, profile: &str) -> Result<Vec<SecretItem>> {
        let items = self.secrets.list_items().await?;
        Ok(items
            .into_iter()
            .filter(|item| plausibly_federation_item(&item.title))
            .filter(|item| title_matches(&item.title, profile))
            .collect())
    }
}

fn plausibly_federation_item(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.contains("aws") || lower.contains("amazon")
}

/// Lowercase, split on non-alphanumerics, drop stop words, rejoin. The same
/// inputs always produce the same match.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty() && !STOP_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join("-")
}

fn title_matches(title: &str, profile: &str) -> bool {
    let base = normalize(profile.trim_end_matches("-long-term"));
    if base.is_empty() {
        return false;
    }
    normalize(title).contains(&base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SesameError;
    use crate::select::StaticSelector;
    use crate::store::memory::MemoryProfileStore;
    use async_trait::async_trait;

    struct FakeSecrets {
        available: bool,
        items: Vec<SecretItem>,
    }

    #[async_trait]
    impl CallSecretStore for FakeSecrets {
        async fn available(&self) -> bool {
            self.available
        }

        async fn list_items(&self) -> Result<Vec<SecretItem>> {
            Ok(self.items.clone())
        }

        async fn item_exists(&self, id: &str) -> Result<bool> {
            Ok(self.items.iter().any(|item| item.id == id))
        }

        async fn read_totp(&self, id: &str) -> Result<String> {
            if self.item_exists(id).await? {
                Ok(format!("totp-{}", id))
            } else {
                Err(SesameError::Subprocess {
                    command: "op item get".to_string(),
                    stderr: "no such item".to_string(),
                })
            }
        }
    }

    fn item(id: &str, title: &str) -> SecretItem {
        SecretItem {
            id: id.to_string(),
            title: title.to_string(),
        }
    }

    fn record(name: &str) -> ProfileRecord {
        ProfileRecord {
            name: name.to_string(),
            ..ProfileRecord::default()
        }
    }

    #[tokio::test]
    async fn unavailable_store_yields_nothing() {
        let store = MemoryProfileStore::new().with_profile("acme", &[]);
        let secrets = FakeSecrets {
            available: false,
            items: vec![item("a", "Acme AWS")],
        };
        let selector = StaticSelector::first();
        let provider = OtpProvider::new(&store, &secrets, &selector);
        assert_eq!(provider.get_otp(&record("acme")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn single_match_is_linked_and_used() {
        let store = MemoryProfileStore::new().with_profile("acme", &[]);
        let secrets = FakeSecrets {
            available: true,
            items: vec![item("a1", "Acme AWS"), item("b2", "GitHub")],
        };
        let selector = StaticSelector::first();
        let provider = OtpProvider::new(&store, &secrets, &selector);

        let code = provider.get_otp(&record("acme")).await.unwrap();
        assert_eq!(code.as_deref(), Some("totp-a1"));
        assert_eq!(
            store.dump("acme").unwrap().get("otp_item_id").unwrap(),
            "a1"
        );
    }

    #[tokio::test]
    async fn ambiguous_matches_go_through_the_selector() {
        let store = MemoryProfileStore::new().with_profile("acme", &[]);
        let secrets = FakeSecrets {
            available: true,
            items: vec![item("a1", "Acme AWS"), item("a2", "Acme AWS (old)")],
        };
        let selector = StaticSelector::nth(1);
        let provider = OtpProvider::new(&store, &secrets, &selector);

        let code = provider.get_otp(&record("acme")).await.unwrap();
        assert_eq!(code.as_deref(), Some("totp-a2"));
        assert_eq!(
            store.dump("acme").unwrap().get("otp_item_id").unwrap(),
            "a2"
        );
    }

    #[tokio::test]
    async fn stale_link_falls_back_to_search() {
        let store = MemoryProfileStore::new().with_profile("acme", &[]);
        let secrets = FakeSecrets {
            available: true,
            items: vec![item("a1", "Acme AWS")],
        };
        let selector = StaticSelector::first();
        let provider = OtpProvider::new(&store, &secrets, &selector);

        let mut profile = record("acme");
        profile.otp_item_id = Some("gone".to_string());
        let code = provider.get_otp(&profile).await.unwrap();
        assert_eq!(code.as_deref(), Some("totp-a1"));
    }

    #[test]
    fn normalization_strips_stop_words_deterministically() {
        assert_eq!(normalize("Acme AWS Login (dev)"), "acme-dev");
        assert_eq!(normalize("AWS amazon sso"), "");
        assert!(title_matches("Acme AWS (dev account)", "acme-dev-long-term"));
        assert!(!title_matches("Globex AWS", "acme"));
    }
}
