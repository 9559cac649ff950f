use chrono::Utc;
use tracing::{debug, info};

use crate::aws::CallAws;
use crate::child::ChildManager;
use crate::error::{Result, SesameError};
use crate::longterm::{LongTermDriver, OtpSource};
use crate::mfa::ReadMfaToken;
use crate::otp::OtpProvider;
use crate::profile::{classify, long_term_name, ProfileRecord, Strategy};
use crate::secrets::CallSecretStore;
use crate::select::{selection_policy, SelectItem, SelectionPolicy};
use crate::session::Session;
use crate::sso::{Account, SsoDriver};
use crate::store::{keys, ProfileStore};
use crate::token_cache::TokenCache;
use crate::validate::SessionValidator;

#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub select: bool,
    pub change: bool,
    pub force: bool,
    pub mfa_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    /// The existing session was still usable; nothing was written.
    AlreadyValid,
    /// A fresh session was minted and persisted.
    Minted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// May differ from the requested profile when account selection
    /// produced a child.
    pub resolved_profile: String,
    pub status: LoginStatus,
}

/// The authentication orchestrator. Classifies a profile, drives the right
/// strategy to completion, persists the session, and proves the result with
/// an identity probe the user can see.
pub struct Sesame<S, A, C, Sel, M> {
    store: S,
    aws: A,
    secrets: C,
    selector: Sel,
    mfa: M,
    cache: TokenCache,
}

impl<S, A, C, Sel, M> Sesame<S, A, C, Sel, M>
where
    S: ProfileStore,
    A: CallAws,
    C: CallSecretStore,
    Sel: SelectItem,
    M: ReadMfaToken,
{
    pub fn new(store: S, aws: A, secrets: C, selector: Sel, mfa: M, cache: TokenCache) -> Self {
        Sesame {
            store,
            aws,
            secrets,
            selector,
            mfa,
            cache,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn aws(&self) -> &A {
        &self.aws
    }

    pub async fn login(&self, profile: &str, opts: LoginOptions) -> Result<LoginOutcome> {
        if !self.store.exists(profile).await? {
            return Err(SesameError::ProfileNotFound(profile.to_string()));
        }
        let record = ProfileRecord::load(&self.store, profile).await?;
        let validator = SessionValidator::new(&self.aws, &self.cache);

        // Fast path: when nothing forces a re-mint and the on-disk state
        // looks fresh, the single displayed probe is the whole operation.
        let fast_path_allowed = !opts.force && !opts.select && !opts.change;
        if fast_path_allowed && validator.fresh_on_disk(&record, Utc::now()) {
            if self.display_identity(profile).await? {
                info!("session for {} is still valid", profile);
                return Ok(LoginOutcome {
                    resolved_profile: profile.to_string(),
                    status: LoginStatus::AlreadyValid,
                });
            }
            debug!("stored session for {} failed the probe; re-minting", profile);
        }

        let sibling = long_term_name(profile);
        let has_sibling = self.store.exists(&sibling).await?;
        let strategy = classify(&record, has_sibling)
            .ok_or_else(|| SesameError::NoStrategyApplicable(profile.to_string()))?;
        debug!("profile {} classified as {:?}", profile, strategy);

        let outcome = match strategy {
            Strategy::Child { parent } => self.login_child(&record, &parent).await?,
            Strategy::Federated => self.login_federated(&record, &opts).await?,
            Strategy::DirectWithMfa { key_profile } => {
                self.login_long_term(&record, &key_profile, &opts).await?
            }
            Strategy::Direct => {
                // Nothing to mint; the keys either work or they don't.
                if !validator.probe(profile).await? {
                    return Err(SesameError::ProbeFailed(profile.to_string()));
                }
                LoginOutcome {
                    resolved_profile: profile.to_string(),
                    status: LoginStatus::AlreadyValid,
                }
            }
        };

        if !self.display_identity(&outcome.resolved_profile).await? {
            return Err(SesameError::ProbeFailed(outcome.resolved_profile.clone()));
        }
        Ok(outcome)
    }

    /// Remove every session key, and the pin metadata when the profile is a
    /// child. Long-term keys and federation configuration stay. Idempotent.
    pub async fn clean(&self, profile: &str) -> Result<()> {
        if !self.store.exists(profile).await? {
            return Err(SesameError::ProfileNotFound(profile.to_string()));
        }
        let record = ProfileRecord::load(&self.store, profile).await?;
        Session::clear(&self.store, profile).await?;
        if record.parent_profile.is_some() {
            for key in keys::CHILD_META {
                self.store.unset(profile, key).await?;
            }
        }
        info!("removed the session from {}", profile);
        Ok(())
    }

    /// Force account and role selection under the federation session,
    /// ignoring any previously chosen child.
    pub async fn change_account(&self, profile: &str) -> Result<LoginOutcome> {
        self.login(
            profile,
            LoginOptions {
                select: true,
                change: true,
                ..LoginOptions::default()
            },
        )
        .await
    }

    async fn login_child(&self, record: &ProfileRecord, parent_name: &str) -> Result<LoginOutcome> {
        if !self.store.exists(parent_name).await? {
            return Err(SesameError::ProfileNotFound(parent_name.to_string()));
        }
        let parent = ProfileRecord::load(&self.store, parent_name).await?;
        if !parent.is_federated() {
            return Err(anyhow::anyhow!(
                "parent profile \"{}\" is not federated",
                parent_name
            )
            .into());
        }
        if !self.cache.has_valid_token(Utc::now()) {
            return Err(SesameError::ParentFederationExpired {
                child: record.name.clone(),
                parent: parent_name.to_string(),
            });
        }

        let account_id = record.account_id.as_deref().ok_or_else(|| {
            anyhow::anyhow!("child profile \"{}\" has no pinned account_id", record.name)
        })?;
        let role_name = record.role_name.as_deref().ok_or_else(|| {
            anyhow::anyhow!("child profile \"{}\" has no pinned role_name", record.name)
        })?;

        let driver = SsoDriver::new(&self.store, &self.aws, &self.cache);
        let session = driver
            .mint_role_credentials(&parent, account_id, role_name)
            .await?;
        session.write(&self.store, &record.name).await?;
        Ok(LoginOutcome {
            resolved_profile: record.name.clone(),
            status: LoginStatus::Minted,
        })
    }

    async fn login_federated(
        &self,
        record: &ProfileRecord,
        opts: &LoginOptions,
    ) -> Result<LoginOutcome> {
        let driver = SsoDriver::new(&self.store, &self.aws, &self.cache);
        driver.ensure_federation_token(&record.name).await?;

        let policy = selection_policy(opts.select, opts.change, record.pinned_target().is_some());
        debug!("selection policy for {}: {:?}", record.name, policy);

        match policy {
            SelectionPolicy::Pinned => {
                let (account_id, role_name) = record.pinned_target().expect("pin checked above");
                let session = driver
                    .mint_role_credentials(record, account_id, role_name)
                    .await?;
                session.write(&self.store, &record.name).await?;
                Ok(LoginOutcome {
                    resolved_profile: record.name.clone(),
                    status: LoginStatus::Minted,
                })
            }
            SelectionPolicy::DefaultFirst => {
                let (account, role_name) = self.first_target(&driver, record).await?;
                let session = driver
                    .mint_role_credentials(record, &account.id, &role_name)
                    .await?;
                session.write(&self.store, &record.name).await?;
                Ok(LoginOutcome {
                    resolved_profile: record.name.clone(),
                    status: LoginStatus::Minted,
                })
            }
            SelectionPolicy::PromptWithConfirm | SelectionPolicy::ForcePrompt => {
                let (account, role_name) = self
                    .prompt_target(&driver, record, policy == SelectionPolicy::PromptWithConfirm)
                    .await?;
                let session = driver
                    .mint_role_credentials(record, &account.id, &role_name)
                    .await?;
                let child = ChildManager::new(&self.store)
                    .create_or_refresh(record, &account, &role_name, &session)
                    .await?;
                Ok(LoginOutcome {
                    resolved_profile: child,
                    status: LoginStatus::Minted,
                })
            }
        }
    }

    async fn first_target(
        &self,
        driver: &SsoDriver<'_, S, A>,
        record: &ProfileRecord,
    ) -> Result<(Account, String)> {
        let accounts = driver.list_accounts(&record.name).await?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no accounts reachable under \"{}\"", record.name))?;
        let roles = driver.list_roles(&record.name, &account.id).await?;
        let role = roles
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no roles available in account {}", account.id))?;
        info!("defaulting to account {} role {}", account.id, role);
        Ok((account, role))
    }

    async fn prompt_target(
        &self,
        driver: &SsoDriver<'_, S, A>,
        record: &ProfileRecord,
        confirm_pin: bool,
    ) -> Result<(Account, String)> {
        let mut accounts = driver.list_accounts(&record.name).await?;
        if accounts.is_empty() {
            return Err(anyhow::anyhow!("no accounts reachable under \"{}\"", record.name).into());
        }
        // With an existing pin the previous choice is offered first.
        if confirm_pin {
            if let Some((pinned_account, _)) = record.pinned_target() {
                if let Some(index) = accounts.iter().position(|a| a.id == pinned_account) {
                    let pinned = accounts.remove(index);
                    accounts.insert(0, pinned);
                }
            }
        }
        let labels = accounts
            .iter()
            .map(|account| format!("{} ({})", account.name, account.id))
            .collect::<Vec<_>>();
        let account_index = self
            .selector
            .select("account", &labels)?
            .ok_or_else(|| anyhow::anyhow!("account selection aborted"))?;
        let account = accounts.swap_remove(account_index);

        let roles = driver.list_roles(&record.name, &account.id).await?;
        let role = match roles.len() {
            0 => return Err(anyhow::anyhow!("no roles available in account {}", account.id).into()),
            1 => {
                info!("single role {} in account {}", roles[0], account.id);
                roles.into_iter().next().unwrap()
            }
            _ => {
                let index = self
                    .selector
                    .select("role", &roles)?
                    .ok_or_else(|| anyhow::anyhow!("role selection aborted"))?;
                roles.into_iter().nth(index).unwrap()
            }
        };
        Ok((account, role))
    }

    async fn login_long_term(
        &self,
        record: &ProfileRecord,
        key_profile: &str,
        opts: &LoginOptions,
    ) -> Result<LoginOutcome> {
        let otp = match &opts.mfa_token {
            Some(code) => OtpSource::Static(code.clone()),
            None => {
                let provider = OtpProvider::new(&self.store, &self.secrets, &self.selector);
                match provider.get_otp(record).await? {
                    Some(code) => OtpSource::Stored(code),
                    None => OtpSource::Interactive,
                }
            }
        };
        let driver = LongTermDriver::new(&self.store, &self.aws, &self.mfa);
        driver.mint(record, key_profile, otp).await?;
        Ok(LoginOutcome {
            resolved_profile: record.name.clone(),
            status: LoginStatus::Minted,
        })
    }

    /// The probe the user sees: inherited stdio, so the resolved identity
    /// lands on their terminal as proof of authentication.
    async fn display_identity(&self, profile: &str) -> Result<bool> {
        self.aws
            .run_interactive(&["sts", "get-caller-identity", "--profile", profile])
            .await
    }
}
