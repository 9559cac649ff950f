use chrono::{DateTime, Utc};
use tracing::debug;

use crate::aws::CallAws;
use crate::error::Result;
use crate::profile::ProfileRecord;
use crate::session::{is_fresh_at, parse_expiration};
use crate::token_cache::TokenCache;

/// Answers "is this profile usable right now?".
///
/// Validation is cheapest-first: the federation token cache, then the stored
/// expiration with its 15-minute margin, and only then a live identity probe.
/// The stored expiration is an upper bound, not a proof, so a fully valid
/// verdict always ends in a probe.
pub struct SessionValidator<'a, A> {
    aws: &'a A,
    cache: &'a TokenCache,
}

impl<'a, A: CallAws> SessionValidator<'a, A> {
    pub fn new(aws: &'a A, cache: &'a TokenCache) -> Self {
        SessionValidator { aws, cache }
    }

    /// Steps that never leave the local disk: token cache and stored expiry.
    pub fn fresh_on_disk(&self, record: &ProfileRecord, now: DateTime<Utc>) -> bool {
        if record.is_federated() && !self.cache.has_valid_token(now) {
            debug!("no valid federation token for {}", record.name);
            return false;
        }
        match record.session_expiration.as_deref() {
            Some(raw) => match parse_expiration(raw) {
                Some(expiration) if is_fresh_at(expiration, now) => true,
                Some(_) => {
                    debug!("session for {} is expired or near expiry", record.name);
                    false
                }
                None => {
                    debug!("unparseable session_expiration on {}; treating as expired", record.name);
                    false
                }
            },
            // No stored session yet; a federated profile may still resolve
            // straight from the token cache, which the probe decides.
            None => true,
        }
    }

    /// Lightweight read-only identity call under the profile.
    pub async fn probe(&self, profile: &str) -> Result<bool> {
        let output = self
            .aws
            .run(&[
                "sts",
                "get-caller-identity",
                "--profile",
                profile,
                "--output",
                "json",
            ])
            .await?;
        if !output.success {
            debug!("identity probe for {} failed: {}", profile, output.stderr.trim());
        }
        Ok(output.success)
    }

    /// The full contract: on-disk state first, then the live probe.
    pub async fn is_valid(&self, record: &ProfileRecord) -> Result<bool> {
        if !self.fresh_on_disk(record, Utc::now()) {
            return Ok(false);
        }
        self.probe(&record.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::CliOutput;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::path::PathBuf;

    struct StubAws {
        probe_ok: bool,
    }

    #[async_trait]
    impl CallAws for StubAws {
        async fn run(&self, _args: &[&str]) -> Result<CliOutput> {
            Ok(if self.probe_ok {
                CliOutput::ok("{\"Account\":\"111122223333\"}")
            } else {
                CliOutput::failed("ExpiredToken")
            })
        }

        async fn run_interactive(&self, _args: &[&str]) -> Result<bool> {
            Ok(self.probe_ok)
        }
    }

    fn empty_cache(tag: &str) -> TokenCache {
        let dir: PathBuf = std::env::temp_dir().join(format!(
            "sesame-validate-{}-{}",
            std::process::id(),
            tag
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        TokenCache::new(dir)
    }

    fn record_with_expiry(expiry: DateTime<Utc>) -> ProfileRecord {
        ProfileRecord {
            name: "dev".to_string(),
            session_expiration: Some(expiry.to_rfc3339()),
            ..ProfileRecord::default()
        }
    }

    #[test]
    fn federated_profile_without_token_is_stale() {
        let aws = StubAws { probe_ok: true };
        let cache = empty_cache("no-token");
        let validator = SessionValidator::new(&aws, &cache);
        let mut record = record_with_expiry(Utc::now() + Duration::hours(1));
        record.sso_session = Some("corp".to_string());
        assert!(!validator.fresh_on_disk(&record, Utc::now()));
    }

    #[test]
    fn margin_boundary_is_exclusive() {
        let aws = StubAws { probe_ok: true };
        let cache = empty_cache("margin");
        let validator = SessionValidator::new(&aws, &cache);
        let now = Utc::now();
        assert!(!validator.fresh_on_disk(&record_with_expiry(now + Duration::minutes(15)), now));
        assert!(validator.fresh_on_disk(
            &record_with_expiry(now + Duration::minutes(15) + Duration::seconds(1)),
            now
        ));
    }

    #[tokio::test]
    async fn stored_expiry_is_only_an_upper_bound() {
        let aws = StubAws { probe_ok: false };
        let cache = empty_cache("revoked");
        let validator = SessionValidator::new(&aws, &cache);
        let record = record_with_expiry(Utc::now() + Duration::hours(1));
        assert!(!validator.is_valid(&record).await.unwrap());
    }
}
