use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::aws::CallAws;
use crate::error::{Result, SesameError};
use crate::store::ProfileStore;

const READ_CACHE_TTL: Duration = Duration::from_secs(5);

/// Profile store backed by the platform CLI's `configure` commands.
///
/// Reads go through a short-TTL cache because the validity scan and the
/// classification step issue many reads against the same profile. Writes are
/// serialized through one async lock and bump the cache entry (write-through)
/// so a read right after a write never observes stale data.
pub struct AwsCliProfileStore<A> {
    aws: A,
    cache: Mutex<ReadCache>,
    write_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct ReadCache {
    profiles: Option<(Instant, Vec<String>)>,
    values: HashMap<(String, String), (Instant, Option<String>)>,
}

impl<A> AwsCliProfileStore<A> {
    pub fn new(aws: A) -> Self {
        AwsCliProfileStore {
            aws,
            cache: Mutex::new(ReadCache::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn cached_value(&self, profile: &str, key: &str) -> Option<Option<String>> {
        let cache = self.cache.lock().unwrap();
        cache
            .values
            .get(&(profile.to_string(), key.to_string()))
            .filter(|(at, _)| at.elapsed() < READ_CACHE_TTL)
            .map(|(_, value)| value.clone())
    }

    fn remember_value(&self, profile: &str, key: &str, value: Option<String>) {
        let mut cache = self.cache.lock().unwrap();
        cache
            .values
            .insert((profile.to_string(), key.to_string()), (Instant::now(), value));
    }

    fn cached_profiles(&self) -> Option<Vec<String>> {
        let cache = self.cache.lock().unwrap();
        cache
            .profiles
            .as_ref()
            .filter(|(at, _)| at.elapsed() < READ_CACHE_TTL)
            .map(|(_, names)| names.clone())
    }

    fn remember_profiles(&self, names: Vec<String>) {
        let mut cache = self.cache.lock().unwrap();
        cache.profiles = Some((Instant::now(), names));
    }

    fn forget_profiles(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.profiles = None;
    }
}

impl<A: CallAws> AwsCliProfileStore<A> {
    async fn set_unlocked(&self, profile: &str, key: &str, value: &str) -> Result<()> {
        let output = self
            .aws
            .run(&["configure", "set", key, value, "--profile", profile])
            .await?;
        if !output.success {
            return Err(SesameError::StoreUnavailable(output.stderr.trim().to_string()));
        }
        self.remember_value(profile, key, Some(value.to_string()));
        self.forget_profiles();
        Ok(())
    }
}

#[async_trait]
impl<A: CallAws> ProfileStore for AwsCliProfileStore<A> {
    async fn list(&self) -> Result<Vec<String>> {
        if let Some(names) = self.cached_profiles() {
            return Ok(names);
        }
        let output = self.aws.run(&["configure", "list-profiles"]).await?;
        if !output.success {
            return Err(SesameError::StoreUnavailable(output.stderr.trim().to_string()));
        }
        let names = output
            .stdout
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        self.remember_profiles(names.clone());
        Ok(names)
    }

    async fn get(&self, profile: &str, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.cached_value(profile, key) {
            return Ok(value);
        }
        let output = self
            .aws
            .run(&["configure", "get", key, "--profile", profile])
            .await?;
        let value = if output.success {
            let trimmed = output.stdout.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        } else {
            // `configure get` exits non-zero for a missing key; that is not a
            // failure. Anything with diagnostics on stderr is.
            let stderr = output.stderr.trim();
            if !stderr.is_empty() && !stderr.contains("could not be found") {
                return Err(SesameError::StoreUnavailable(stderr.to_string()));
            }
            None
        };
        self.remember_value(profile, key, value.clone());
        Ok(value)
    }

    async fn set(&self, profile: &str, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.set_unlocked(profile, key, value).await
    }

    async fn unset(&self, profile: &str, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let output = self
            .aws
            .run(&["configure", "unset", key, "--profile", profile])
            .await?;
        if !output.success {
            // Unsetting an absent key must stay idempotent.
            debug!(
                "unset {}.{} reported: {}",
                profile,
                key,
                output.stderr.trim()
            );
        }
        self.remember_value(profile, key, None);
        Ok(())
    }

    async fn set_many(&self, profile: &str, entries: &[(&str, String)]) -> Result<()> {
        // One lock held across the whole sequence so the session record
        // becomes visible atomically from a reader's point of view.
        let _guard = self.write_lock.lock().await;
        for (key, value) in entries {
            self.set_unlocked(profile, key, value).await?;
        }
        Ok(())
    }
}
