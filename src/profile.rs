use crate::error::Result;
use crate::store::{keys, ProfileStore};

/// Every key the broker reads during classification and validation.
const RECORD_KEYS: [&str; 18] = [
    keys::REGION,
    keys::OUTPUT,
    keys::SSO_START_URL,
    keys::SSO_SESSION,
    keys::SSO_REGION,
    keys::SSO_ACCOUNT_ID,
    keys::SSO_ROLE_NAME,
    keys::ACCESS_KEY_ID,
    keys::SECRET_ACCESS_KEY,
    keys::SESSION_EXPIRATION,
    keys::MFA_DEVICE,
    keys::OTP_ITEM_ID,
    keys::OTP_ENABLED,
    keys::PARENT_PROFILE,
    keys::ACCOUNT_ID,
    keys::ACCOUNT_NAME,
    keys::ROLE_NAME,
    keys::ASSUME_ROLE,
];

/// A typed snapshot of one profile's records.
#[derive(Debug, Clone, Default)]
pub struct ProfileRecord {
    pub name: String,
    pub region: Option<String>,
    pub output: Option<String>,
    pub sso_start_url: Option<String>,
    pub sso_session: Option<String>,
    pub sso_region: Option<String>,
    pub sso_account_id: Option<String>,
    pub sso_role_name: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_expiration: Option<String>,
    pub mfa_device: Option<String>,
    pub otp_item_id: Option<String>,
    pub otp_enabled: bool,
    pub parent_profile: Option<String>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub role_name: Option<String>,
    pub assume_role: Option<String>,
}

impl ProfileRecord {
    pub async fn load<S: ProfileStore>(store: &S, name: &str) -> Result<ProfileRecord> {
        let mut values = store.get_many(name, &RECORD_KEYS).await?;
        let mut take = |key: &str| values.remove(key);
        Ok(ProfileRecord {
            name: name.to_string(),
            region: take(keys::REGION),
            output: take(keys::OUTPUT),
            sso_start_url: take(keys::SSO_START_URL),
            sso_session: take(keys::SSO_SESSION),
            sso_region: take(keys::SSO_REGION),
            sso_account_id: take(keys::SSO_ACCOUNT_ID),
            sso_role_name: take(keys::SSO_ROLE_NAME),
            access_key_id: take(keys::ACCESS_KEY_ID),
            secret_access_key: take(keys::SECRET_ACCESS_KEY),
            session_expiration: take(keys::SESSION_EXPIRATION),
            mfa_device: take(keys::MFA_DEVICE),
            otp_item_id: take(keys::OTP_ITEM_ID),
            otp_enabled: take(keys::OTP_ENABLED)
                .map(|raw| raw == "true")
                .unwrap_or(false),
            parent_profile: take(keys::PARENT_PROFILE),
            account_id: take(keys::ACCOUNT_ID),
            account_name: take(keys::ACCOUNT_NAME),
            role_name: take(keys::ROLE_NAME),
            assume_role: take(keys::ASSUME_ROLE),
        })
    }

    pub fn is_federated(&self) -> bool {
        self.sso_start_url.is_some() || self.sso_session.is_some()
    }

    pub fn has_long_term_keys(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// The `(account, role)` pair this profile pins, when complete.
    pub fn pinned_target(&self) -> Option<(&str, &str)> {
        match (self.sso_account_id.as_deref(), self.sso_role_name.as_deref()) {
            (Some(account), Some(role)) => Some((account, role)),
            _ => None,
        }
    }
}

/// Name of the sibling profile that may hold a profile's permanent keys.
pub fn long_term_name(profile: &str) -> String {
    format!("{}-long-term", profile)
}

/// The authentication strategy a profile resolves to. Exactly one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Pins an (account, role) under a federated parent.
    Child { parent: String },
    /// Single sign-on; sessions derive from the browser-acquired token.
    Federated,
    /// Short-lived sessions minted from long-term keys plus a one-time
    /// password. `key_profile` holds the permanent keys and the MFA device.
    DirectWithMfa { key_profile: String },
    /// Long-term keys used as-is.
    Direct,
}

/// The one place that reads the key set to decide strategy. Deterministic;
/// order matters.
pub fn classify(record: &ProfileRecord, has_long_term_sibling: bool) -> Option<Strategy> {
    if let Some(parent) = &record.parent_profile {
        Some(Strategy::Child {
            parent: parent.clone(),
        })
    } else if record.is_federated() {
        Some(Strategy::Federated)
    } else if has_long_term_sibling {
        Some(Strategy::DirectWithMfa {
            key_profile: long_term_name(&record.name),
        })
    } else if record.has_long_term_keys() {
        if record.mfa_device.is_some() {
            Some(Strategy::DirectWithMfa {
                key_profile: record.name.clone(),
            })
        } else {
            Some(Strategy::Direct)
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ProfileRecord {
        ProfileRecord {
            name: name.to_string(),
            ..ProfileRecord::default()
        }
    }

    #[test]
    fn parent_profile_wins_over_everything() {
        let mut r = record("dev");
        r.parent_profile = Some("corp".to_string());
        r.sso_session = Some("corp".to_string());
        r.access_key_id = Some("AKIA".to_string());
        assert_eq!(
            classify(&r, true),
            Some(Strategy::Child {
                parent: "corp".to_string()
            })
        );
    }

    #[test]
    fn either_sso_key_classifies_as_federated() {
        let mut by_url = record("corp");
        by_url.sso_start_url = Some("https://corp.awsapps.com/start".to_string());
        assert_eq!(classify(&by_url, false), Some(Strategy::Federated));

        let mut by_session = record("corp");
        by_session.sso_session = Some("corp".to_string());
        assert_eq!(classify(&by_session, false), Some(Strategy::Federated));
    }

    #[test]
    fn sibling_takes_precedence_over_own_keys() {
        let mut r = record("ops");
        r.access_key_id = Some("AKIA".to_string());
        r.secret_access_key = Some("secret".to_string());
        assert_eq!(
            classify(&r, true),
            Some(Strategy::DirectWithMfa {
                key_profile: "ops-long-term".to_string()
            })
        );
    }

    #[test]
    fn own_keys_with_mfa_device_use_the_profile_itself() {
        let mut r = record("ops");
        r.access_key_id = Some("AKIA".to_string());
        r.secret_access_key = Some("secret".to_string());
        r.mfa_device = Some("arn:aws:iam::111122223333:mfa/ops".to_string());
        assert_eq!(
            classify(&r, false),
            Some(Strategy::DirectWithMfa {
                key_profile: "ops".to_string()
            })
        );
    }

    #[test]
    fn own_keys_without_mfa_are_direct() {
        let mut r = record("ops");
        r.access_key_id = Some("AKIA".to_string());
        r.secret_access_key = Some("secret".to_string());
        assert_eq!(classify(&r, false), Some(Strategy::Direct));
    }

    #[test]
    fn empty_profile_has_no_strategy() {
        assert_eq!(classify(&record("blank"), false), None);
    }

    #[test]
    fn pinned_target_requires_both_keys() {
        let mut r = record("corp");
        r.sso_account_id = Some("111122223333".to_string());
        assert_eq!(r.pinned_target(), None);
        r.sso_role_name = Some("Reader".to_string());
        assert_eq!(r.pinned_target(), Some(("111122223333", "Reader")));
    }
}
