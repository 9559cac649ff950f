use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::store::{keys, ProfileStore};

/// Requested duration for minted sessions.
pub const SESSION_DURATION_SECS: i64 = 8 * 60 * 60;

/// Sessions closer than this to expiry are treated as already expired, so we
/// never hand out credentials that will die mid-operation.
pub const EXPIRY_MARGIN_SECS: i64 = 15 * 60;

/// A short-lived credential record. Internally consistent by construction:
/// either the whole four-tuple is stored on a profile or none of it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl Session {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        is_fresh_at(self.expiration, now)
    }

    /// Read a session from a profile. A partial record (any of the four keys
    /// missing, or an unparseable expiration) reads as absent.
    pub async fn read<S: ProfileStore>(store: &S, profile: &str) -> Result<Option<Session>> {
        let values = store.get_many(profile, &keys::SESSION).await?;
        let complete = (
            values.get(keys::ACCESS_KEY_ID),
            values.get(keys::SECRET_ACCESS_KEY),
            values.get(keys::SESSION_TOKEN),
            values.get(keys::SESSION_EXPIRATION).and_then(|raw| parse_expiration(raw)),
        );
        Ok(match complete {
            (Some(key), Some(secret), Some(token), Some(expiration)) => Some(Session {
                access_key_id: key.clone(),
                secret_access_key: secret.clone(),
                session_token: token.clone(),
                expiration,
            }),
            _ => None,
        })
    }

    pub async fn write<S: ProfileStore>(&self, store: &S, profile: &str) -> Result<()> {
        store
            .set_many(
                profile,
                &[
                    (keys::ACCESS_KEY_ID, self.access_key_id.clone()),
                    (keys::SECRET_ACCESS_KEY, self.secret_access_key.clone()),
                    (keys::SESSION_TOKEN, self.session_token.clone()),
                    (
                        keys::SESSION_EXPIRATION,
                        self.expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ),
                ],
            )
            .await
    }

    pub async fn clear<S: ProfileStore>(store: &S, profile: &str) -> Result<()> {
        for key in keys::SESSION {
            store.unset(profile, key).await?;
        }
        Ok(())
    }
}

/// Strictly more than the margin left until expiry.
pub fn is_fresh_at(expiration: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiration - now > Duration::seconds(EXPIRY_MARGIN_SECS)
}

pub fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// The `Credentials` shape shared by `sts get-session-token`,
/// `sts assume-role` and `configure export-credentials` output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CredentialsPayload {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<String>,
}

impl CredentialsPayload {
    /// Normalize into a session. Paths that return no explicit expiration
    /// (the federation-native mint) fall back to a caller-provided ceiling.
    pub fn into_session(self, fallback_expiration: DateTime<Utc>) -> Session {
        let expiration = self
            .expiration
            .as_deref()
            .and_then(parse_expiration)
            .unwrap_or(fallback_expiration);
        Session {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.session_token,
            expiration,
        }
    }
}
