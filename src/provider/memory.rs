//! Deterministic in-memory identity provider.
//!
//! Local dev and test double for [`IdentityProvider`], in the spirit of a
//! logging email sender: no network, fully scripted. Tests seed credentials
//! and accounts up front, then observe which operations the flows performed.

use crate::provider::{AuthEvent, IdentityProvider, ProviderError, Session, SignOutScope};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Default)]
struct State {
    // One-time credentials still outstanding. Redeeming removes the entry;
    // a second redemption behaves like an expired credential.
    token_hashes: HashSet<String>,
    codes: HashSet<String>,
    token_pairs: HashMap<String, String>,
    session: Option<Session>,
    registered: HashSet<String>,
    current_password: Option<String>,
    recovery_emails: Vec<(String, String)>,
    op_counts: HashMap<&'static str, usize>,
    update_delay: Option<Duration>,
}

#[derive(Clone)]
pub struct MemoryProvider {
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: &'static str) {
        *self.lock().op_counts.entry(op).or_insert(0) += 1;
    }

    fn fresh_session() -> Session {
        Session::new(
            SecretString::from("memory-access-token".to_string()),
            SecretString::from("memory-refresh-token".to_string()),
        )
    }

    fn install_session(&self, event: AuthEvent) -> Session {
        let session = Self::fresh_session();
        self.lock().session = Some(session.clone());
        let _ = self.events.send(event);
        session
    }

    /// Issue an unredeemed one-time token hash.
    pub fn issue_token_hash(&self, token_hash: &str) {
        self.lock().token_hashes.insert(token_hash.to_string());
    }

    /// Issue an unredeemed authorization code.
    pub fn issue_code(&self, code: &str) {
        self.lock().codes.insert(code.to_string());
    }

    /// Issue an implicit-flow access/refresh token pair.
    pub fn issue_token_pair(&self, access_token: &str, refresh_token: &str) {
        self.lock()
            .token_pairs
            .insert(access_token.to_string(), refresh_token.to_string());
    }

    /// Pretend the provider runtime already established a session.
    pub fn seed_session(&self) {
        self.lock().session = Some(Self::fresh_session());
    }

    pub fn register_email(&self, email: &str) {
        self.lock().registered.insert(email.to_string());
    }

    pub fn set_current_password(&self, password: &str) {
        self.lock().current_password = Some(password.to_string());
    }

    /// Delay applied inside `update_password`, for timeout tests.
    pub fn set_update_delay(&self, delay: Duration) {
        self.lock().update_delay = Some(delay);
    }

    /// Simulate the provider runtime pushing an auth-state notification.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn has_session(&self) -> bool {
        self.lock().session.is_some()
    }

    #[must_use]
    pub fn current_password(&self) -> Option<String> {
        self.lock().current_password.clone()
    }

    /// Recovery emails the provider was asked to send, as `(email, redirect)`.
    #[must_use]
    pub fn recovery_emails(&self) -> Vec<(String, String)> {
        self.lock().recovery_emails.clone()
    }

    /// How many times the named operation was called.
    #[must_use]
    pub fn op_count(&self, op: &str) -> usize {
        self.lock().op_counts.get(op).copied().unwrap_or(0)
    }
}

#[async_trait]
impl IdentityProvider for MemoryProvider {
    async fn verify_recovery_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Session, ProviderError> {
        self.record("verify_recovery_token_hash");

        if !self.lock().token_hashes.remove(token_hash) {
            return Err(ProviderError::Rejected(
                "Token has expired or is invalid".to_string(),
            ));
        }

        Ok(self.install_session(AuthEvent::PasswordRecovery))
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<Session, ProviderError> {
        self.record("exchange_authorization_code");

        if !self.lock().codes.remove(code) {
            return Err(ProviderError::Rejected(
                "Code has expired or is invalid".to_string(),
            ));
        }

        Ok(self.install_session(AuthEvent::SignedIn))
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, ProviderError> {
        self.record("set_session");

        let known = self.lock().token_pairs.remove(access_token) == Some(refresh_token.to_string());
        if !known {
            return Err(ProviderError::Unauthorized);
        }

        Ok(self.install_session(AuthEvent::SignedIn))
    }

    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        self.record("current_session");
        Ok(self.lock().session.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn update_password(&self, new_password: &SecretString) -> Result<(), ProviderError> {
        self.record("update_password");

        let delay = self.lock().update_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut state = self.lock();
        if state.session.is_none() {
            return Err(ProviderError::Unauthorized);
        }
        if state.current_password.as_deref() == Some(new_password.expose_secret()) {
            return Err(ProviderError::SamePassword);
        }
        state.current_password = Some(new_password.expose_secret().to_string());

        Ok(())
    }

    async fn sign_out(&self, _scope: SignOutScope) -> Result<(), ProviderError> {
        self.record("sign_out");
        self.lock().session = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn send_recovery_email(
        &self,
        email: &str,
        redirect_url: &Url,
    ) -> Result<(), ProviderError> {
        self.record("send_recovery_email");

        let mut state = self.lock();
        state
            .recovery_emails
            .push((email.to_string(), redirect_url.to_string()));

        // Unregistered addresses fail here the way a real backend might;
        // the enumeration-safe flow must hide the difference.
        if !state.registered.contains(email) {
            return Err(ProviderError::Rejected("User not found".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_hash_is_one_time() {
        let provider = MemoryProvider::new();
        provider.issue_token_hash("otp-1");

        assert!(provider.verify_recovery_token_hash("otp-1").await.is_ok());
        assert!(matches!(
            provider.verify_recovery_token_hash("otp-1").await,
            Err(ProviderError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn verify_emits_password_recovery_event() {
        let provider = MemoryProvider::new();
        provider.issue_token_hash("otp-1");
        let mut events = provider.subscribe();

        provider.verify_recovery_token_hash("otp-1").await.unwrap();

        assert_eq!(events.recv().await.unwrap(), AuthEvent::PasswordRecovery);
        assert!(provider.has_session());
    }

    #[tokio::test]
    async fn set_session_rejects_unknown_pair() {
        let provider = MemoryProvider::new();
        provider.issue_token_pair("at", "rt");

        assert!(matches!(
            provider.set_session("at", "wrong").await,
            Err(ProviderError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn update_password_rejects_reuse() {
        let provider = MemoryProvider::new();
        provider.seed_session();
        provider.set_current_password("Old1!pass");

        let result = provider
            .update_password(&SecretString::from("Old1!pass".to_string()))
            .await;
        assert!(matches!(result, Err(ProviderError::SamePassword)));

        provider
            .update_password(&SecretString::from("New1!pass".to_string()))
            .await
            .unwrap();
        assert_eq!(provider.current_password().as_deref(), Some("New1!pass"));
    }

    #[tokio::test]
    async fn recovery_email_records_and_rejects_unknown() {
        let provider = MemoryProvider::new();
        provider.register_email("known@example.com");
        let redirect = Url::parse("https://app.example/reset-password").unwrap();

        assert!(provider
            .send_recovery_email("known@example.com", &redirect)
            .await
            .is_ok());
        assert!(provider
            .send_recovery_email("unknown@example.com", &redirect)
            .await
            .is_err());
        assert_eq!(provider.recovery_emails().len(), 2);
    }
}
