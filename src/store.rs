use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

pub mod aws_cli;
pub mod memory;

/// Key names in the shared profile store. These are contractual with every
/// other tool reading the same files and must not be renamed.
pub mod keys {
    pub const REGION: &str = "region";
    pub const OUTPUT: &str = "output";

    pub const SSO_START_URL: &str = "sso_start_url";
    pub const SSO_SESSION: &str = "sso_session";
    pub const SSO_REGION: &str = "sso_region";
    pub const SSO_ACCOUNT_ID: &str = "sso_account_id";
    pub const SSO_ROLE_NAME: &str = "sso_role_name";

    pub const ACCESS_KEY_ID: &str = "access_key_id";
    pub const SECRET_ACCESS_KEY: &str = "secret_access_key";
    pub const SESSION_TOKEN: &str = "session_token";
    pub const SESSION_EXPIRATION: &str = "session_expiration";

    pub const MFA_DEVICE: &str = "mfa_device";
    pub const OTP_ITEM_ID: &str = "otp_item_id";
    pub const OTP_ENABLED: &str = "otp_enabled";

    pub const PARENT_PROFILE: &str = "parent_profile";
    pub const ACCOUNT_ID: &str = "account_id";
    pub const ACCOUNT_NAME: &str = "account_name";
    pub const ROLE_NAME: &str = "role_name";

    pub const ASSUME_ROLE: &str = "assume_role";

    /// The short-lived session record. All four present or all four absent.
    pub const SESSION: [&str; 4] = [
        ACCESS_KEY_ID,
        SECRET_ACCESS_KEY,
        SESSION_TOKEN,
        SESSION_EXPIRATION,
    ];

    /// Metadata pinning a child profile to its parent and target.
    pub const CHILD_META: [&str; 4] = [PARENT_PROFILE, ACCOUNT_ID, ACCOUNT_NAME, ROLE_NAME];
}

/// Typed key-value access to the shared profile store.
///
/// Implementations must serialize writes per store so that a multi-key write
/// sequence (a session record plus metadata) becomes visible atomically from
/// a reader's point of view. A missing key is not a failure and reads as
/// `None`; an unreadable backing store is `SesameError::StoreUnavailable`.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;

    async fn get(&self, profile: &str, key: &str) -> Result<Option<String>>;

    async fn set(&self, profile: &str, key: &str, value: &str) -> Result<()>;

    async fn unset(&self, profile: &str, key: &str) -> Result<()>;

    async fn exists(&self, profile: &str) -> Result<bool> {
        Ok(self.list().await?.iter().any(|name| name == profile))
    }

    async fn get_many(&self, profile: &str, keys: &[&str]) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(profile, key).await? {
                values.insert(key.to_string(), value);
            }
        }
        Ok(values)
    }

    async fn set_many(&self, profile: &str, entries: &[(&str, String)]) -> Result<()> {
        for (key, value) in entries {
            self.set(profile, key, value).await?;
        }
        Ok(())
    }
}
