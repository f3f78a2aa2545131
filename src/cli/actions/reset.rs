use crate::cli::globals::GlobalArgs;
use crate::provider::http::HttpProvider;
use crate::provider::IdentityProvider;
use crate::recovery::page::PageLocation;
use crate::recovery::password::{PasswordUpdate, UpdateError};
use crate::recovery::state::{InvalidReason, RecoverySession, RecoveryState};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Args {
    pub url: String,
    pub password: SecretString,
    pub confirmation: SecretString,
    pub check_timeout: Duration,
    pub update_timeout: Duration,
}

// SecretString already redacts; keep the link out of Debug output too, it
// carries one-time credentials.
impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("url", &"[REDACTED]")
            .field("check_timeout", &self.check_timeout)
            .field("update_timeout", &self.update_timeout)
            .finish_non_exhaustive()
    }
}

/// Handle the reset action
pub async fn execute(globals: &GlobalArgs, args: Args) -> Result<()> {
    let provider: Arc<dyn IdentityProvider> = Arc::new(HttpProvider::new(
        &globals.provider_url,
        globals.api_key.clone(),
    )?);

    let page = PageLocation::parse(&args.url).context("invalid recovery link")?;

    let mut session =
        RecoverySession::begin_with_deadline(Arc::clone(&provider), page, args.check_timeout);

    match session.verdict().await {
        RecoveryState::Valid => info!("recovery link verified"),
        RecoveryState::Invalid(InvalidReason::Timeout) => {
            return Err(anyhow!(
                "could not verify the reset link in time, request a new one"
            ));
        }
        _ => {
            return Err(anyhow!(
                "this password reset link is invalid or has expired, request a new one"
            ));
        }
    }

    let update = PasswordUpdate::new(provider).with_timeout(args.update_timeout);

    match update
        .submit(&session, &args.password, &args.confirmation)
        .await
    {
        Ok(redirect) => {
            println!("Password updated. Please log in with your new password.");
            info!("redirect target: {}", redirect);
            Ok(())
        }
        Err(UpdateError::TooWeak(failed)) => {
            for rule in &failed {
                eprintln!("  - {}", rule.describe());
            }
            Err(anyhow!("password does not meet the requirements"))
        }
        Err(err) => Err(err.into()),
    }
}
