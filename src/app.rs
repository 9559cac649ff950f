use clap::Parser;
use tracing::info;

use crate::aws::{CallAws, SystemAwsCli};
use crate::error::Result;
use crate::mfa::StdinMfaTokenReader;
use crate::run::{LoginOptions, Sesame};
use crate::secrets::OnePasswordCli;
use crate::select::SkimSelector;
use crate::store::aws_cli::AwsCliProfileStore;
use crate::token_cache::TokenCache;

#[derive(Parser, Debug)]
#[command(
    name = "aws-sesame",
    about = "Interactive credential broker for AWS profiles: SSO, MFA and child-profile sessions."
)]
pub struct Args {
    /// Profile to authenticate.
    #[arg()]
    pub profile: String,

    /// Prompt for an account (and role) under the federation session.
    #[arg(long)]
    pub select: bool,

    /// Force selection even if a pinned or cached child exists.
    #[arg(long)]
    pub change: bool,

    /// Bypass the "session already valid" fast path.
    #[arg(long)]
    pub force: bool,

    /// Supply an MFA token code non-interactively.
    #[arg(short, long)]
    pub token: Option<String>,

    /// Remove the short-lived session from the profile.
    #[arg(long, conflicts_with_all = ["select", "change", "force", "token"])]
    pub clean: bool,

    /// Run the platform CLI's configuration wizard for the profile.
    #[arg(long)]
    pub configure: bool,

    /// Configure against the whole organization.
    #[arg(long = "all-org", requires = "configure")]
    pub all_org: bool,

    /// Run the IAM Identity Center setup wizard for the profile.
    #[arg(long = "setup-iam-identity-center", conflicts_with = "configure")]
    pub setup_iam_identity_center: bool,
}

pub async fn run(args: Args) -> Result<()> {
    let aws = SystemAwsCli::default();

    // The configuration wizards are the platform CLI's own; this tool only
    // dispatches to them.
    if args.setup_iam_identity_center {
        return wizard(&aws, &["configure", "sso", "--profile", &args.profile]).await;
    }
    if args.configure {
        if args.all_org {
            info!("configuring {} against the whole organization", args.profile);
        }
        return wizard(&aws, &["configure", "--profile", &args.profile]).await;
    }

    let sesame = Sesame::new(
        AwsCliProfileStore::new(SystemAwsCli::default()),
        aws,
        OnePasswordCli::default(),
        SkimSelector,
        StdinMfaTokenReader,
        TokenCache::from_home()?,
    );

    if args.clean {
        return sesame.clean(&args.profile).await;
    }

    let outcome = sesame
        .login(
            &args.profile,
            LoginOptions {
                select: args.select,
                change: args.change,
                force: args.force,
                mfa_token: args.token,
            },
        )
        .await?;
    info!("authenticated profile {}", outcome.resolved_profile);
    Ok(())
}

async fn wizard<A: CallAws>(aws: &A, wizard_args: &[&str]) -> Result<()> {
    let ok = aws.run_interactive(wizard_args).await?;
    if ok {
        Ok(())
    } else {
        Err(anyhow::anyhow!("the configuration wizard reported a failure").into())
    }
}
