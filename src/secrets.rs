use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SesameError};

/// One entry in the external secret store.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretItem {
    pub id: String,
    pub title: String,
}

/// Subprocess boundary to the secret-store CLI. The whole dependency is
/// optional: when `available` is false every caller falls back to an
/// interactive prompt.
#[async_trait]
pub trait CallSecretStore: Send + Sync {
    async fn available(&self) -> bool;

    async fn list_items(&self) -> Result<Vec<SecretItem>>;

    async fn item_exists(&self, id: &str) -> Result<bool>;

    /// Current TOTP code for an item. Never cached.
    async fn read_totp(&self, id: &str) -> Result<String>;
}

/// The 1Password CLI (`op`).
#[derive(Debug, Clone)]
pub struct OnePasswordCli {
    bin: String,
}

impl Default for OnePasswordCli {
    fn default() -> Self {
        OnePasswordCli {
            bin: "op".to_string(),
        }
    }
}

impl OnePasswordCli {
    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!("exec: {} {}", self.bin, args.join(" "));
        Ok(Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?)
    }
}

#[async_trait]
impl CallSecretStore for OnePasswordCli {
    async fn available(&self) -> bool {
        Command::new(&self.bin)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn list_items(&self) -> Result<Vec<SecretItem>> {
        let output = self
            .run(&["item", "list", "--categories", "Login", "--format", "json"])
            .await?;
        if !output.status.success() {
            return Err(SesameError::Subprocess {
                command: format!("{} item list", self.bin),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let items: Vec<SecretItem> = serde_json::from_slice(&output.stdout)
            .map_err(|err| anyhow::anyhow!("unexpected item list payload: {}", err))?;
        Ok(items)
    }

    async fn item_exists(&self, id: &str) -> Result<bool> {
        let output = self.run(&["item", "get", id, "--format", "json"]).await?;
        Ok(output.status.success())
    }

    async fn read_totp(&self, id: &str) -> Result<String> {
        let output = self.run(&["item", "get", id, "--otp"]).await?;
        if !output.status.success() {
            return Err(SesameError::Subprocess {
                command: format!("{} item get {} --otp", self.bin, id),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
