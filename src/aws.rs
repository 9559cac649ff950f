use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::Result;

/// Captured output of a platform CLI invocation.
#[derive(Debug, Clone)]
pub struct CliOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn ok<S: Into<String>>(stdout: S) -> Self {
        CliOutput {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed<S: Into<String>>(stderr: S) -> Self {
        CliOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Subprocess boundary to the platform CLI. Every external command goes
/// through this trait so tests can substitute a scripted double.
#[async_trait]
pub trait CallAws: Send + Sync {
    /// Run a command with captured stdout/stderr.
    async fn run(&self, args: &[&str]) -> Result<CliOutput>;

    /// Run a command with inherited stdio. Used for the browser login, the
    /// configuration wizards and the final identity display, all of which
    /// talk to the user directly. Returns whether the command succeeded.
    async fn run_interactive(&self, args: &[&str]) -> Result<bool>;
}

pub fn command_line(bin: &str, args: &[&str]) -> String {
    let mut line = String::from(bin);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// The real platform CLI (`aws`).
#[derive(Debug, Clone)]
pub struct SystemAwsCli {
    bin: String,
}

impl Default for SystemAwsCli {
    fn default() -> Self {
        SystemAwsCli {
            bin: "aws".to_string(),
        }
    }
}

#[async_trait]
impl CallAws for SystemAwsCli {
    async fn run(&self, args: &[&str]) -> Result<CliOutput> {
        debug!("exec: {}", command_line(&self.bin, args));
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_interactive(&self, args: &[&str]) -> Result<bool> {
        debug!("exec (interactive): {}", command_line(&self.bin, args));
        let status = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;
        Ok(status.success())
    }
}
