use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::store::ProfileStore;

/// In-memory profile store. Used by the test suites as a stand-in for the
/// shared on-disk store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile with the given key-value pairs.
    pub fn with_profile(self, name: &str, entries: &[(&str, &str)]) -> Self {
        {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles.entry(name.to_string()).or_default();
            for (key, value) in entries {
                profile.insert(key.to_string(), value.to_string());
            }
        }
        self
    }

    /// Snapshot of one profile, for assertions.
    pub fn dump(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.profiles.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.profiles.lock().unwrap().keys().cloned().collect())
    }

    async fn get(&self, profile: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(profile)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, profile: &str, key: &str, value: &str) -> Result<()> {
        self.profiles
            .lock()
            .unwrap()
            .entry(profile.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn unset(&self, profile: &str, key: &str) -> Result<()> {
        if let Some(entries) = self.profiles.lock().unwrap().get_mut(profile) {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let store = MemoryProfileStore::new().with_profile("dev", &[(keys::REGION, "us-east-1")]);
        assert_eq!(
            store.get("dev", keys::REGION).await.unwrap().as_deref(),
            Some("us-east-1")
        );
        assert_eq!(store.get("dev", keys::OUTPUT).await.unwrap(), None);
        assert_eq!(store.get("absent", keys::REGION).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unset_is_idempotent() {
        let store = MemoryProfileStore::new().with_profile("dev", &[(keys::SESSION_TOKEN, "t")]);
        store.unset("dev", keys::SESSION_TOKEN).await.unwrap();
        store.unset("dev", keys::SESSION_TOKEN).await.unwrap();
        assert_eq!(store.get("dev", keys::SESSION_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn exists_scans_profile_names() {
        let store = MemoryProfileStore::new().with_profile("dev", &[]);
        assert!(store.exists("dev").await.unwrap());
        assert!(!store.exists("prod").await.unwrap());
    }
}
