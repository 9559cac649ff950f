use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::aws::CallAws;
use crate::error::{Result, SesameError};
use crate::mfa::ReadMfaToken;
use crate::profile::ProfileRecord;
use crate::session::{CredentialsPayload, Session, SESSION_DURATION_SECS};
use crate::store::{keys, ProfileStore};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Where the one-time password came from. Store-supplied codes get exactly
/// one interactive retry on rejection.
#[derive(Debug, Clone)]
pub enum OtpSource {
    /// Supplied on the command line (`--token`).
    Static(String),
    /// Retrieved from the external secret store.
    Stored(String),
    /// Not yet obtained; prompt the user.
    Interactive,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsSessionPayload {
    credentials: CredentialsPayload,
}

/// Mints a short-lived session from long-term keys plus a TOTP challenge.
/// The permanent keys live on `key_profile` (usually the `-long-term`
/// sibling); the fresh session always lands on the standard profile.
pub struct LongTermDriver<'a, S, A, M> {
    store: &'a S,
    aws: &'a A,
    mfa: &'a M,
}

impl<'a, S, A, M> LongTermDriver<'a, S, A, M>
where
    S: ProfileStore,
    A: CallAws,
    M: ReadMfaToken,
{
    pub fn new(store: &'a S, aws: &'a A, mfa: &'a M) -> Self {
        LongTermDriver { store, aws, mfa }
    }

    pub async fn mint(
        &self,
        target: &ProfileRecord,
        key_profile: &str,
        otp: OtpSource,
    ) -> Result<Session> {
        let mfa_device = self
            .store
            .get(key_profile, keys::MFA_DEVICE)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("profile \"{}\" has no mfa_device configured", key_profile)
            })?;
        let region = self.resolve_region(target, key_profile).await?;
        let role_arn = match &target.assume_role {
            Some(arn) => Some(arn.clone()),
            None => self.store.get(key_profile, keys::ASSUME_ROLE).await?,
        };

        let (code, from_store) = match otp {
            OtpSource::Static(code) => (code, false),
            OtpSource::Stored(code) => (code, true),
            OtpSource::Interactive => (self.mfa.read_mfa_token(&mfa_device).await?, false),
        };

        let mut minted_with_stored_code = from_store;
        let session = match self
            .call_sts(target, key_profile, &mfa_device, &code, role_arn.as_deref(), &region)
            .await
        {
            Ok(session) => session,
            Err(err) if from_store && is_mfa_rejection(&err) => {
                minted_with_stored_code = false;
                warn!("stored one-time password was rejected; prompting instead");
                let code = self.mfa.read_mfa_token(&mfa_device).await?;
                self.call_sts(target, key_profile, &mfa_device, &code, role_arn.as_deref(), &region)
                    .await?
            }
            Err(err) => return Err(err),
        };

        session.write(self.store, &target.name).await?;
        if minted_with_stored_code && !target.otp_enabled {
            self.store
                .set(&target.name, keys::OTP_ENABLED, "true")
                .await?;
        }

        let probe = self
            .aws
            .run(&[
                "sts",
                "get-caller-identity",
                "--profile",
                &target.name,
                "--output",
                "json",
            ])
            .await?;
        if !probe.success {
            return Err(SesameError::ProbeFailed(target.name.clone()));
        }
        info!("minted an {}h session for {}", SESSION_DURATION_SECS / 3600, target.name);
        Ok(session)
    }

    /// The key profile's region, else the standard profile's, else the
    /// documented default.
    async fn resolve_region(&self, target: &ProfileRecord, key_profile: &str) -> Result<String> {
        if let Some(region) = self.store.get(key_profile, keys::REGION).await? {
            return Ok(region);
        }
        Ok(target
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string()))
    }

    async fn call_sts(
        &self,
        target: &ProfileRecord,
        key_profile: &str,
        mfa_device: &str,
        code: &str,
        role_arn: Option<&str>,
        region: &str,
    ) -> Result<Session> {
        let duration = SESSION_DURATION_SECS.to_string();
        let session_name = format!("{}-sesame", target.name);
        let mut args: Vec<&str> = vec!["sts"];
        match role_arn {
            Some(arn) => {
                args.extend([
                    "assume-role",
                    "--role-arn",
                    arn,
                    "--role-session-name",
                    &session_name,
                ]);
            }
            None => args.push("get-session-token"),
        }
        args.extend([
            "--serial-number",
            mfa_device,
            "--token-code",
            code,
            "--duration-seconds",
            &duration,
            "--profile",
            key_profile,
            "--region",
            region,
            "--output",
            "json",
        ]);

        let output = self.aws.run(&args).await?;
        if !output.success {
            let stderr = output.stderr.trim().to_string();
            return Err(if stderr_is_mfa_rejection(&stderr) {
                SesameError::OtpRejected
            } else {
                SesameError::Subprocess {
                    command: "aws sts".to_string(),
                    stderr,
                }
            });
        }
        let payload: StsSessionPayload = serde_json::from_str(&output.stdout)
            .map_err(|err| anyhow::anyhow!("unexpected sts payload: {}", err))?;
        Ok(payload
            .credentials
            .into_session(Utc::now() + Duration::seconds(SESSION_DURATION_SECS)))
    }
}

/// STS wraps a failed TOTP challenge in a generic AccessDenied; only the MFA
/// wording separates it from a real permission denial, which must surface
/// with its own stderr.
fn stderr_is_mfa_rejection(stderr: &str) -> bool {
    stderr.contains("MultiFactorAuthentication")
        || stderr.contains("invalid MFA")
        || stderr.contains("tokenCode")
}

fn is_mfa_rejection(err: &SesameError) -> bool {
    matches!(err, SesameError::OtpRejected)
}
