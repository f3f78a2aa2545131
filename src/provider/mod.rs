//! Identity provider client contract.
//!
//! The identity provider is an external collaborator: it owns the session
//! store (token cache) and may process recovery URLs on its own before any
//! application code runs, announcing the result on its event channel. Recovery
//! flows only ever read or request changes to the session through this
//! contract, never by touching token state directly.
//!
//! [`http::HttpProvider`] speaks the provider's REST surface; the in-memory
//! [`memory::MemoryProvider`] backs the test suite and local development.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

/// Opaque credential bundle issued by the identity provider.
///
/// Recovery code observes only its existence; token material stays wrapped
/// and is never logged.
#[derive(Clone, Debug)]
pub struct Session {
    access_token: SecretString,
    refresh_token: SecretString,
}

impl Session {
    #[must_use]
    pub fn new(access_token: SecretString, refresh_token: SecretString) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    pub(crate) fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub(crate) fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }
}

/// Auth-state notification pushed by the provider's client runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    PasswordRecovery,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl AuthEvent {
    /// Whether the event confirms an authenticated recovery session.
    #[must_use]
    pub fn confirms_session(self) -> bool {
        matches!(self, Self::PasswordRecovery | Self::SignedIn)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignOutScope {
    /// Revoke only the session held by this client.
    Local,
    /// Revoke every active session for the account.
    Global,
}

impl SignOutScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider refused the request: expired, already used, or malformed
    /// credentials, or a policy rejection.
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    /// No valid session accompanied a call that requires one.
    #[error("missing or invalid session")]
    Unauthorized,

    /// The new password equals the current one.
    #[error("new password must be different from the current password")]
    SamePassword,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    Malformed(String),
}

/// Client contract for the identity provider.
///
/// Every method is a suspension point. Implementations own the client-side
/// session store and serialize access to it internally.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Redeem a one-time recovery `token_hash` via OTP verification.
    async fn verify_recovery_token_hash(&self, token_hash: &str)
        -> Result<Session, ProviderError>;

    /// Exchange a PKCE authorization code for a session.
    async fn exchange_authorization_code(&self, code: &str) -> Result<Session, ProviderError>;

    /// Adopt an access/refresh token pair as the current session.
    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, ProviderError>;

    /// The session currently held by the client runtime, if any.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Subscribe to auth-state notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Change the password of the account behind the current session.
    async fn update_password(&self, new_password: &SecretString) -> Result<(), ProviderError>;

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError>;

    /// Ask the provider to send a recovery email. Callers on the
    /// enumeration-safe path discard the result.
    async fn send_recovery_email(&self, email: &str, redirect_url: &Url)
        -> Result<(), ProviderError>;
}
