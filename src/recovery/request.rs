//! Enumeration-safe forgot-password initiation.
//!
//! The flow always asks the provider to send a recovery email and always
//! reports the same generic outcome, whatever the provider answered. This is
//! the one boundary where errors are deliberately discarded instead of
//! classified: distinguishing them is exactly what account enumeration needs.
//!
//! The cooldown between sends is client-side UX to damp resend abuse, not a
//! security control.

use crate::provider::IdentityProvider;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Minimum gap between consecutive sends from one flow instance.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// The one message every send reports.
pub const CONFIRMATION_MESSAGE: &str =
    "If this email is registered, a password reset link has been sent.";

/// Informational copy: the provider invalidates older links when a new one
/// is issued.
pub const LATEST_LINK_NOTICE: &str =
    "Use the most recent reset email only. Older reset links become invalid after a new request.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The generic acknowledgement; identical for registered and unknown
    /// addresses.
    Accepted,
    /// Local format check failed; nothing was sent.
    InvalidEmail,
    /// Still cooling down from the previous send; nothing was sent.
    CoolingDown { remaining: Duration },
}

/// Forgot-password flow for one view session.
pub struct RecoveryRequest {
    provider: Arc<dyn IdentityProvider>,
    redirect_url: Url,
    cooldown: Duration,
    last_sent: Option<Instant>,
}

impl RecoveryRequest {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, redirect_url: Url) -> Self {
        Self {
            provider,
            redirect_url,
            cooldown: DEFAULT_COOLDOWN,
            last_sent: None,
        }
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Seconds-style remainder of the active cooldown, if any.
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let last_sent = self.last_sent?;
        let elapsed = last_sent.elapsed();
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    /// Initiate a recovery email for `email`.
    ///
    /// The provider's answer never changes the outcome: send failures are
    /// swallowed and the caller still sees [`RequestOutcome::Accepted`].
    pub async fn send(&mut self, email: &str) -> RequestOutcome {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return RequestOutcome::InvalidEmail;
        }

        if let Some(remaining) = self.cooldown_remaining() {
            return RequestOutcome::CoolingDown { remaining };
        }

        if let Err(err) = self
            .provider
            .send_recovery_email(&email, &self.redirect_url)
            .await
        {
            // Swallowed on purpose; the outcome must not depend on it.
            debug!("recovery email send discarded an error: {}", err);
        }

        self.last_sent = Some(Instant::now());

        RequestOutcome::Accepted
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryProvider;

    fn flow(memory: &Arc<MemoryProvider>) -> RecoveryRequest {
        let redirect = Url::parse("https://app.example/reset-password").unwrap();
        RecoveryRequest::new(memory.clone(), redirect)
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[tokio::test]
    async fn registered_and_unknown_addresses_are_indistinguishable() {
        let memory = Arc::new(MemoryProvider::new());
        memory.register_email("exists@example.com");
        let mut requests = flow(&memory).with_cooldown(Duration::ZERO);

        let registered = requests.send("exists@example.com").await;
        let unknown = requests.send("doesnotexist@example.com").await;

        assert_eq!(registered, RequestOutcome::Accepted);
        assert_eq!(unknown, RequestOutcome::Accepted);
        // Both went to the provider; neither outcome leaked its answer.
        assert_eq!(memory.op_count("send_recovery_email"), 2);
    }

    #[tokio::test]
    async fn invalid_email_never_reaches_the_provider() {
        let memory = Arc::new(MemoryProvider::new());
        let mut requests = flow(&memory);

        assert_eq!(
            requests.send("not-an-email").await,
            RequestOutcome::InvalidEmail
        );
        assert_eq!(memory.op_count("send_recovery_email"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_the_second_send() {
        let memory = Arc::new(MemoryProvider::new());
        memory.register_email("exists@example.com");
        let mut requests = flow(&memory);

        assert_eq!(
            requests.send("exists@example.com").await,
            RequestOutcome::Accepted
        );

        let outcome = requests.send("exists@example.com").await;
        assert!(matches!(outcome, RequestOutcome::CoolingDown { .. }));
        assert_eq!(memory.op_count("send_recovery_email"), 1);

        tokio::time::advance(DEFAULT_COOLDOWN).await;
        assert_eq!(requests.cooldown_remaining(), None);
        assert_eq!(
            requests.send("exists@example.com").await,
            RequestOutcome::Accepted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_remaining_counts_down() {
        let memory = Arc::new(MemoryProvider::new());
        memory.register_email("exists@example.com");
        let mut requests = flow(&memory);

        requests.send("exists@example.com").await;
        tokio::time::advance(Duration::from_secs(20)).await;

        let remaining = requests.cooldown_remaining().unwrap();
        assert_eq!(remaining, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn redirect_url_travels_with_the_request() {
        let memory = Arc::new(MemoryProvider::new());
        memory.register_email("exists@example.com");
        let mut requests = flow(&memory);

        requests.send(" Exists@Example.com ").await;

        let sent = memory.recovery_emails();
        assert_eq!(
            sent,
            vec![(
                "exists@example.com".to_string(),
                "https://app.example/reset-password".to_string()
            )]
        );
    }
}
