use thiserror::Error;

pub type Result<T> = std::result::Result<T, SesameError>;

/// Error taxonomy for the broker. Drivers report failures upward as tagged
/// variants; only the application layer prints messages and picks exit codes.
#[derive(Debug, Error)]
pub enum SesameError {
    #[error("profile \"{0}\" not found in the AWS config")]
    ProfileNotFound(String),

    #[error("no authentication strategy applies to profile \"{0}\"")]
    NoStrategyApplicable(String),

    #[error("no valid federation session for profile \"{0}\"")]
    FederationExpired(String),

    #[error("the federation session of \"{parent}\" (parent of \"{child}\") has expired")]
    ParentFederationExpired { child: String, parent: String },

    #[error("the one-time password was rejected")]
    OtpRejected,

    #[error("identity probe failed for profile \"{0}\"")]
    ProbeFailed(String),

    #[error("`{command}` failed: {stderr}")]
    Subprocess { command: String, stderr: String },

    #[error("profile store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SesameError {
    /// One actionable hint at most, printed under the error message.
    pub fn hint(&self) -> Option<String> {
        match self {
            SesameError::NoStrategyApplicable(profile) => Some(format!(
                "run `aws-sesame {} --configure` to set the profile up",
                profile
            )),
            SesameError::FederationExpired(profile) => Some(format!(
                "run `aws-sesame {}` again to reopen the browser login",
                profile
            )),
            SesameError::ParentFederationExpired { parent, .. } => {
                Some(format!("run `aws-sesame {}` first, then retry", parent))
            }
            SesameError::ProbeFailed(_) => {
                Some("the written credentials were kept; a later run may succeed".to_string())
            }
            _ => None,
        }
    }
}
