//! Password validation and the gated update flow.
//!
//! Validation is pure and runs before anything touches the network; a
//! password that fails the local rules is never sent to the provider. The
//! update itself is permitted only while the recovery verdict is `Valid`,
//! runs under its own timeout (longer than the checking deadline), and on
//! success revokes every other session without blocking the redirect.

use crate::provider::{IdentityProvider, ProviderError, SignOutScope};
use crate::recovery::state::{RecoverySession, RecoveryState};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Bound on the provider's password-update call.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the embedder should land after a successful reset.
pub const REDIRECT_AFTER_RESET: &str = "/auth?tab=login&reset=success";

/// Rules a new password must satisfy, in display order.
pub const PASSWORD_RULES: [PasswordRule; 5] = [
    PasswordRule::MinLength,
    PasswordRule::Uppercase,
    PasswordRule::Lowercase,
    PasswordRule::Digit,
    PasswordRule::Special,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordRule {
    MinLength,
    Uppercase,
    Lowercase,
    Digit,
    Special,
}

impl PasswordRule {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::MinLength => "At least 8 characters",
            Self::Uppercase => "One uppercase letter",
            Self::Lowercase => "One lowercase letter",
            Self::Digit => "One number",
            Self::Special => "One special character (!@#$...)",
        }
    }

    #[must_use]
    pub fn check(self, password: &str) -> bool {
        match self {
            Self::MinLength => password.chars().count() >= 8,
            Self::Uppercase => password.chars().any(|c| c.is_ascii_uppercase()),
            Self::Lowercase => password.chars().any(|c| c.is_ascii_lowercase()),
            Self::Digit => password.chars().any(|c| c.is_ascii_digit()),
            Self::Special => password.chars().any(|c| !c.is_ascii_alphanumeric()),
        }
    }
}

/// Rules `password` fails, in display order. Empty means acceptable.
#[must_use]
pub fn failed_rules(password: &str) -> Vec<PasswordRule> {
    PASSWORD_RULES
        .into_iter()
        .filter(|rule| !rule.check(password))
        .collect()
}

/// Whether `password` satisfies every rule.
#[must_use]
pub fn validate_password(password: &str) -> bool {
    failed_rules(password).is_empty()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strength {
    Weak,
    Fair,
    Good,
    Strong,
}

impl Strength {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Weak => "Weak",
            Self::Fair => "Fair",
            Self::Good => "Good",
            Self::Strong => "Strong",
        }
    }
}

/// Per-rule report used for strength display.
#[derive(Clone, Debug)]
pub struct StrengthReport {
    pub passed: Vec<(PasswordRule, bool)>,
    pub score: u8,
    pub strength: Strength,
}

/// Score `password` against the rule set.
#[must_use]
pub fn strength(password: &str) -> StrengthReport {
    let passed: Vec<(PasswordRule, bool)> = PASSWORD_RULES
        .into_iter()
        .map(|rule| (rule, rule.check(password)))
        .collect();
    let score = passed.iter().filter(|(_, ok)| *ok).count() as u8;
    let strength = match score {
        0 | 1 => Strength::Weak,
        2 | 3 => Strength::Fair,
        4 => Strength::Good,
        _ => Strength::Strong,
    };

    StrengthReport {
        passed,
        score,
        strength,
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The recovery verdict is not `Valid`; the user must request a new
    /// link. Nothing was sent to the provider.
    #[error("recovery session expired, request a new link")]
    SessionExpired,

    #[error("passwords do not match")]
    ConfirmationMismatch,

    /// Failed local rules; never sent to the provider.
    #[error("password does not meet the requirements")]
    TooWeak(Vec<PasswordRule>),

    #[error("new password must be different from the current password")]
    SamePassword,

    /// The update call exceeded its timeout. Neither success nor failure of
    /// the underlying operation can be assumed.
    #[error("password update timed out, try again")]
    TimedOut,

    #[error("password update failed: {0}")]
    Provider(String),
}

/// One-shot password update, gated on a valid recovery session.
pub struct PasswordUpdate {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl PasswordUpdate {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_UPDATE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate and submit a new password.
    ///
    /// On success the other sessions of the account are revoked in the
    /// background and the caller receives the post-reset redirect path; the
    /// redirect never waits on the revocation.
    ///
    /// # Errors
    /// Returns an [`UpdateError`] naming the first gate that failed; local
    /// gates (`SessionExpired`, `ConfirmationMismatch`, `TooWeak`) reject
    /// before any provider call.
    pub async fn submit(
        &self,
        session: &RecoverySession,
        new_password: &SecretString,
        confirmation: &SecretString,
    ) -> Result<&'static str, UpdateError> {
        if session.state() != RecoveryState::Valid {
            return Err(UpdateError::SessionExpired);
        }

        if new_password.expose_secret() != confirmation.expose_secret() {
            return Err(UpdateError::ConfirmationMismatch);
        }

        let failed = failed_rules(new_password.expose_secret());
        if !failed.is_empty() {
            return Err(UpdateError::TooWeak(failed));
        }

        match timeout(self.timeout, self.provider.update_password(new_password)).await {
            Err(_) => return Err(UpdateError::TimedOut),
            Ok(Err(ProviderError::SamePassword)) => return Err(UpdateError::SamePassword),
            Ok(Err(ProviderError::Unauthorized)) => {
                // The provider invalidated the session between load and
                // submit; same terminal outcome as a local gate failure.
                return Err(UpdateError::SessionExpired);
            }
            Ok(Err(err)) => return Err(UpdateError::Provider(err.to_string())),
            Ok(Ok(())) => {}
        }

        debug!("password updated, revoking other sessions");

        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            if let Err(err) = provider.sign_out(SignOutScope::Global).await {
                warn!("global sign-out after password update failed: {}", err);
            }
        });

        Ok(REDIRECT_AFTER_RESET)
    }
}
