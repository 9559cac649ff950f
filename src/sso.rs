use std::cmp;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::aws::CallAws;
use crate::error::{Result, SesameError};
use crate::profile::ProfileRecord;
use crate::session::{CredentialsPayload, Session, SESSION_DURATION_SECS};
use crate::store::{keys, ProfileStore};
use crate::token_cache::TokenCache;

/// Candidates offered when role enumeration is denied, which happens when
/// access is granted through group membership. The guess is loud, never
/// silent.
pub const FALLBACK_ROLE_NAMES: [&str; 4] = [
    "AdministratorAccess",
    "PowerUserAccess",
    "ReadOnlyAccess",
    "ViewOnlyAccess",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountListPayload {
    account_list: Vec<AccountEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountEntry {
    account_id: String,
    account_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleListPayload {
    role_list: Vec<RoleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleEntry {
    role_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrgAccountsPayload {
    accounts: Vec<OrgAccountEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrgAccountEntry {
    id: String,
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRolePayload {
    credentials: CredentialsPayload,
}

/// Drives the federated (single sign-on) strategy: token freshness, account
/// and role enumeration, and credential minting for an (account, role) pair.
pub struct SsoDriver<'a, S, A> {
    store: &'a S,
    aws: &'a A,
    cache: &'a TokenCache,
}

impl<'a, S: ProfileStore, A: CallAws> SsoDriver<'a, S, A> {
    pub fn new(store: &'a S, aws: &'a A, cache: &'a TokenCache) -> Self {
        SsoDriver { store, aws, cache }
    }

    /// No-op when the token cache already holds a valid token; otherwise the
    /// platform CLI's blocking browser flow runs with inherited stdio.
    pub async fn ensure_federation_token(&self, profile: &str) -> Result<()> {
        if self.cache.has_valid_token(Utc::now()) {
            debug!("federation token for {} still valid", profile);
            return Ok(());
        }
        info!("no valid federation token; opening the browser login");
        let ok = self
            .aws
            .run_interactive(&["sso", "login", "--profile", profile])
            .await?;
        if ok {
            Ok(())
        } else {
            Err(SesameError::FederationExpired(profile.to_string()))
        }
    }

    /// Accounts reachable under the federation session. Falls back to the
    /// organization's active account list on permission failure.
    pub async fn list_accounts(&self, profile: &str) -> Result<Vec<Account>> {
        let output = self
            .aws
            .run(&["sso", "list-accounts", "--profile", profile, "--output", "json"])
            .await?;
        if output.success {
            let payload: AccountListPayload = serde_json::from_str(&output.stdout)
                .map_err(|err| anyhow::anyhow!("unexpected account list payload: {}", err))?;
            let mut accounts = payload
                .account_list
                .into_iter()
                .map(|entry| Account {
                    id: entry.account_id,
                    name: entry.account_name,
                })
                .collect::<Vec<_>>();
            accounts.sort_by(|a, b| a.name.cmp(&b.name));
            return Ok(accounts);
        }

        warn!(
            "sso list-accounts denied ({}); listing the organization instead",
            output.stderr.trim()
        );
        let output = self
            .aws
            .run(&[
                "organizations",
                "list-accounts",
                "--profile",
                profile,
                "--output",
                "json",
            ])
            .await?;
        if !output.success {
            return Err(SesameError::Subprocess {
                command: "aws organizations list-accounts".to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        let payload: OrgAccountsPayload = serde_json::from_str(&output.stdout)
            .map_err(|err| anyhow::anyhow!("unexpected organizations payload: {}", err))?;
        let mut accounts = payload
            .accounts
            .into_iter()
            .filter(|entry| entry.status == "ACTIVE")
            .map(|entry| Account {
                id: entry.id,
                name: entry.name,
            })
            .collect::<Vec<_>>();
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }

    /// Roles available in one account. On permission failure, a well-known
    /// candidate set is offered instead.
    pub async fn list_roles(&self, profile: &str, account_id: &str) -> Result<Vec<String>> {
        let output = self
            .aws
            .run(&[
                "sso",
                "list-account-roles",
                "--profile",
                profile,
                "--account-id",
                account_id,
                "--output",
                "json",
            ])
            .await?;
        if output.success {
            let payload: RoleListPayload = serde_json::from_str(&output.stdout)
                .map_err(|err| anyhow::anyhow!("unexpected role list payload: {}", err))?;
            return Ok(payload
                .role_list
                .into_iter()
                .map(|entry| entry.role_name)
                .collect());
        }
        let stderr = output.stderr.trim();
        if !is_permission_denial(stderr) {
            return Err(SesameError::Subprocess {
                command: "aws sso list-account-roles".to_string(),
                stderr: stderr.to_string(),
            });
        }
        warn!(
            "cannot enumerate roles in account {} ({}); offering well-known candidates",
            account_id, stderr
        );
        Ok(FALLBACK_ROLE_NAMES.iter().map(|s| s.to_string()).collect())
    }

    /// Short-lived credentials for (account, role). The federation-native
    /// path goes first; explicit role assumption is the fallback.
    pub async fn mint_role_credentials(
        &self,
        parent: &ProfileRecord,
        account_id: &str,
        role_name: &str,
    ) -> Result<Session> {
        match self.mint_native(parent, account_id, role_name).await {
            Ok(session) => Ok(session),
            Err(err) => {
                warn!(
                    "federation-native mint failed ({}); falling back to sts assume-role",
                    err
                );
                self.mint_assume_role(&parent.name, account_id, role_name)
                    .await
            }
        }
    }

    /// Pin (account, role) on a uniquely named scratch profile sharing the
    /// parent's federation configuration, then let the platform CLI resolve
    /// credentials from the cached token. The scratch profile is unset on
    /// every exit path.
    async fn mint_native(
        &self,
        parent: &ProfileRecord,
        account_id: &str,
        role_name: &str,
    ) -> Result<Session> {
        let scratch = ephemeral_name(&parent.name, account_id, role_name);
        let mut entries: Vec<(&str, String)> = Vec::new();
        if let Some(url) = &parent.sso_start_url {
            entries.push((keys::SSO_START_URL, url.clone()));
        }
        if let Some(session) = &parent.sso_session {
            entries.push((keys::SSO_SESSION, session.clone()));
        }
        if let Some(region) = &parent.sso_region {
            entries.push((keys::SSO_REGION, region.clone()));
        }
        if let Some(region) = &parent.region {
            entries.push((keys::REGION, region.clone()));
        }
        entries.push((keys::SSO_ACCOUNT_ID, account_id.to_string()));
        entries.push((keys::SSO_ROLE_NAME, role_name.to_string()));

        // A partial write still leaves scratch keys behind, so the cleanup
        // loop runs even when set_many itself failed.
        let minted = match self.store.set_many(&scratch, &entries).await {
            Ok(()) => self.export_credentials(&scratch).await,
            Err(err) => Err(err),
        };
        for (key, _) in &entries {
            if let Err(err) = self.store.unset(&scratch, key).await {
                warn!("failed to remove scratch key {}.{}: {}", scratch, key, err);
            }
        }
        minted
    }

    async fn export_credentials(&self, profile: &str) -> Result<Session> {
        let output = self
            .aws
            .run(&[
                "configure",
                "export-credentials",
                "--profile",
                profile,
                "--format",
                "json",
            ])
            .await?;
        if !output.success {
            return Err(SesameError::Subprocess {
                command: "aws configure export-credentials".to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        let payload: CredentialsPayload = serde_json::from_str(&output.stdout)
            .map_err(|err| anyhow::anyhow!("unexpected credentials payload: {}", err))?;
        Ok(payload.into_session(self.native_expiry_ceiling()))
    }

    /// When the native path reports no expiration: the token-cache expiry or
    /// eight hours, whichever is sooner.
    fn native_expiry_ceiling(&self) -> chrono::DateTime<Utc> {
        let now = Utc::now();
        let ceiling = now + Duration::seconds(SESSION_DURATION_SECS);
        match self.cache.latest_valid_expiry(now) {
            Some(token_expiry) => cmp::min(token_expiry, ceiling),
            None => ceiling,
        }
    }

    async fn mint_assume_role(
        &self,
        parent: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<Session> {
        let role_arn = format!("arn:aws:iam::{}:role/{}", account_id, role_name);
        let session_name = format!("aws-sesame-{}", Utc::now().timestamp());
        let duration = SESSION_DURATION_SECS.to_string();
        let output = self
            .aws
            .run(&[
                "sts",
                "assume-role",
                "--role-arn",
                &role_arn,
                "--role-session-name",
                &session_name,
                "--duration-seconds",
                &duration,
                "--profile",
                parent,
                "--output",
                "json",
            ])
            .await?;
        if !output.success {
            return Err(SesameError::Subprocess {
                command: "aws sts assume-role".to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        let payload: AssumeRolePayload = serde_json::from_str(&output.stdout)
            .map_err(|err| anyhow::anyhow!("unexpected assume-role payload: {}", err))?;
        Ok(payload
            .credentials
            .into_session(Utc::now() + Duration::seconds(SESSION_DURATION_SECS)))
    }
}

fn is_permission_denial(stderr: &str) -> bool {
    stderr.contains("AccessDenied") || stderr.contains("Unauthorized") || stderr.contains("Forbidden")
}

fn ephemeral_name(parent: &str, account_id: &str, role_name: &str) -> String {
    format!(
        "{}-mint-{}-{}-{}",
        parent,
        account_id,
        role_name.to_lowercase(),
        Utc::now().timestamp()
    )
}
