use tracing::info;

use crate::error::Result;
use crate::profile::ProfileRecord;
use crate::session::Session;
use crate::sso::Account;
use crate::store::{keys, ProfileStore};

/// Lowercase ASCII alphanumerics plus `-`, collapsed and trimmed.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Stable child name for a (parent, account) pair. Accounts whose names
/// yield an empty slug fall back to the raw account id.
pub fn derive_name(parent: &str, account: &Account) -> String {
    let s = slug(&account.name);
    if s.is_empty() {
        format!("{}-{}", parent, account.id)
    } else {
        format!("{}-{}", parent, s)
    }
}

/// Maintains the derived namespace of child profiles under a federated
/// parent. Children store the child-to-parent edge only; the reverse
/// direction is a scan.
pub struct ChildManager<'a, S> {
    store: &'a S,
}

impl<'a, S: ProfileStore> ChildManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        ChildManager { store }
    }

    /// Write the session and pin metadata onto the derived child profile.
    /// Re-creating under the same (parent, account, role) updates session
    /// keys only and keeps the same name.
    pub async fn create_or_refresh(
        &self,
        parent: &ProfileRecord,
        account: &Account,
        role_name: &str,
        session: &Session,
    ) -> Result<String> {
        let child = derive_name(&parent.name, account);
        session.write(self.store, &child).await?;

        let mut meta: Vec<(&str, String)> = vec![
            (keys::PARENT_PROFILE, parent.name.clone()),
            (keys::ACCOUNT_ID, account.id.clone()),
            (keys::ACCOUNT_NAME, account.name.clone()),
            (keys::ROLE_NAME, role_name.to_string()),
        ];
        if let Some(region) = &parent.region {
            meta.push((keys::REGION, region.clone()));
        }
        if let Some(output) = &parent.output {
            meta.push((keys::OUTPUT, output.clone()));
        }
        self.store.set_many(&child, &meta).await?;
        info!(
            "profile {} now pins account {} role {}",
            child, account.id, role_name
        );
        Ok(child)
    }

    pub async fn list_children(&self, parent: &str) -> Result<Vec<String>> {
        let mut children = Vec::new();
        for name in self.store.list().await? {
            if let Some(stored) = self.store.get(&name, keys::PARENT_PROFILE).await? {
                if stored == parent {
                    children.push(name);
                }
            }
        }
        Ok(children)
    }
}
