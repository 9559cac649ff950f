use std::path::PathBuf;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;

/// One cached federation token. The platform CLI writes these; only the
/// expiry matters here.
#[derive(Debug, Deserialize)]
struct CachedToken {
    #[serde(alias = "expiresAt")]
    expires_at: DateTime<Utc>,
}

/// Read-only view of the platform CLI's federation token cache: a directory
/// of JSON documents under the user's home. Malformed files are skipped.
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    pub fn new(dir: PathBuf) -> Self {
        TokenCache { dir }
    }

    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot locate the home directory"))?;
        Ok(TokenCache::new(home.join(".aws").join("sso").join("cache")))
    }

    /// Latest expiry among cached tokens that are still valid. `None` means
    /// any federated operation will need a fresh browser login.
    pub fn latest_valid_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("token cache at {:?} unreadable: {}", self.dir, err);
                return None;
            }
        };
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .filter_map(|raw| serde_json::from_str::<CachedToken>(&raw).ok())
            .map(|token| token.expires_at)
            .filter(|expires_at| *expires_at > now)
            .max()
    }

    pub fn has_valid_token(&self, now: DateTime<Utc>) -> bool {
        self.latest_valid_expiry(now).is_some()
    }
}
