use std::io;
use std::io::Write;

use async_trait::async_trait;

use crate::error::Result;

/// Source of a one-time password typed or supplied by the user. The
/// secret-store lookup lives in `otp`; this is the interactive tail of the
/// fallback chain, plus the `--token` override.
#[async_trait]
pub trait ReadMfaToken: Send + Sync {
    async fn read_mfa_token(&self, mfa_device: &str) -> Result<String>;
}

/// Prompts on stderr so stdout stays clean for whatever the user pipes the
/// tool into. Keeps asking until the input looks like a TOTP code.
pub struct StdinMfaTokenReader;

#[async_trait]
impl ReadMfaToken for StdinMfaTokenReader {
    async fn read_mfa_token(&self, mfa_device: &str) -> Result<String> {
        let mut line = String::new();
        loop {
            eprint!("Enter MFA code for {}: ", mfa_device);
            io::stderr().flush()?;

            line.clear();
            if io::stdin().read_line(&mut line)? == 0 {
                return Err(anyhow::anyhow!("end of input while reading the MFA code").into());
            }
            let code = line.trim();
            if looks_like_totp(code) {
                return Ok(code.to_string());
            }
            eprintln!("a one-time password is 6-8 digits, got {:?}", code);
        }
    }
}

fn looks_like_totp(code: &str) -> bool {
    (6..=8).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit())
}

pub struct StaticMfaTokenReader {
    token: String,
}

#[async_trait]
impl ReadMfaToken for StaticMfaTokenReader {
    async fn read_mfa_token(&self, _mfa_device: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

impl<S: Into<String>> From<S> for StaticMfaTokenReader {
    fn from(s: S) -> Self {
        StaticMfaTokenReader { token: s.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totp_codes_are_six_to_eight_digits() {
        assert!(looks_like_totp("123456"));
        assert!(looks_like_totp("12345678"));
        assert!(!looks_like_totp("12345"));
        assert!(!looks_like_totp("123456789"));
        assert!(!looks_like_totp("12a456"));
        assert!(!looks_like_totp(""));
    }
}
