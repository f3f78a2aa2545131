//! Session establisher.
//!
//! Converts whatever credential the recovery link carried into a confirmed
//! session, trying each viable strategy once, strictly in sequence. Running
//! strategies one at a time keeps "first success wins" deterministic and
//! never double-redeems a one-time token hash.
//!
//! The provider's own runtime may have consumed the URL before this code
//! runs. The trailing current-session probe exists for exactly that race and
//! must stay even when it looks redundant.

use crate::provider::IdentityProvider;
use crate::recovery::link::{parse_recovery_link, RecoveryCredentials};
use crate::recovery::page::PageLocation;
use tracing::debug;

/// What the establisher could conclude on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A strategy produced a session; one-time credentials were stripped
    /// from the page location.
    Established,
    /// A credential was present but every redemption failed.
    Rejected,
    /// No credential in the URL and no existing session; the verdict belongs
    /// to the event channel or the deadline.
    NoSession,
}

pub async fn establish_session(
    provider: &dyn IdentityProvider,
    page: &PageLocation,
) -> BootstrapOutcome {
    let url = page.current();
    let credentials = parse_recovery_link(&url);

    let redeemed = match &credentials {
        Some(RecoveryCredentials::TokenHash { token_hash }) => {
            match provider.verify_recovery_token_hash(token_hash).await {
                Ok(_) => true,
                Err(err) => {
                    debug!("token-hash redemption failed: {}", err);
                    false
                }
            }
        }
        Some(RecoveryCredentials::AuthorizationCode { code }) => {
            match provider.exchange_authorization_code(code).await {
                Ok(_) => true,
                Err(err) => {
                    debug!("code exchange failed: {}", err);
                    false
                }
            }
        }
        Some(RecoveryCredentials::ImplicitTokens {
            access_token,
            refresh_token,
        }) => match provider.set_session(access_token, refresh_token).await {
            Ok(_) => true,
            Err(err) => {
                debug!("implicit token adoption failed: {}", err);
                false
            }
        },
        None => false,
    };

    if redeemed {
        page.replace_with_bare_path();
        return BootstrapOutcome::Established;
    }

    // Either no credential was present, or redemption failed because the
    // provider runtime beat us to the one-time credential. A live session
    // settles both cases.
    match provider.current_session().await {
        Ok(Some(_)) => {
            if credentials.is_some() {
                page.replace_with_bare_path();
            }
            BootstrapOutcome::Established
        }
        Ok(None) if credentials.is_some() => BootstrapOutcome::Rejected,
        Ok(None) => BootstrapOutcome::NoSession,
        Err(err) => {
            debug!("session probe failed: {}", err);
            if credentials.is_some() {
                BootstrapOutcome::Rejected
            } else {
                BootstrapOutcome::NoSession
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryProvider;

    fn page(input: &str) -> PageLocation {
        PageLocation::parse(input).unwrap()
    }

    #[tokio::test]
    async fn token_hash_redemption_strips_url() {
        let provider = MemoryProvider::new();
        provider.issue_token_hash("TH");
        let page = page("https://app.example/reset-password?token_hash=TH&type=recovery");

        let outcome = establish_session(&provider, &page).await;

        assert_eq!(outcome, BootstrapOutcome::Established);
        assert_eq!(
            page.current().as_str(),
            "https://app.example/reset-password"
        );
    }

    #[tokio::test]
    async fn code_exchange_establishes() {
        let provider = MemoryProvider::new();
        provider.issue_code("C-1");
        let page = page("https://app.example/reset-password?code=C-1");

        assert_eq!(
            establish_session(&provider, &page).await,
            BootstrapOutcome::Established
        );
        assert!(provider.has_session());
    }

    #[tokio::test]
    async fn implicit_pair_establishes() {
        let provider = MemoryProvider::new();
        provider.issue_token_pair("AT", "RT");
        let page =
            page("https://app.example/reset-password#access_token=AT&refresh_token=RT&type=recovery");

        assert_eq!(
            establish_session(&provider, &page).await,
            BootstrapOutcome::Established
        );
        assert_eq!(page.current().fragment(), None);
    }

    #[tokio::test]
    async fn spent_credential_is_rejected() {
        let provider = MemoryProvider::new();
        let page = page("https://app.example/reset-password?token_hash=SPENT&type=recovery");

        assert_eq!(
            establish_session(&provider, &page).await,
            BootstrapOutcome::Rejected
        );
        // Failed redemptions must not strip the URL.
        assert!(page.current().query().is_some());
    }

    #[tokio::test]
    async fn failed_redemption_falls_back_to_live_session() {
        // The runtime consumed the one-time credential first; our replay
        // fails but the session it left behind still validates the link.
        let provider = MemoryProvider::new();
        provider.seed_session();
        let page = page("https://app.example/reset-password?code=ALREADY-USED");

        assert_eq!(
            establish_session(&provider, &page).await,
            BootstrapOutcome::Established
        );
        assert_eq!(page.current().query(), None);
    }

    #[tokio::test]
    async fn bare_url_with_session_establishes_without_stripping() {
        let provider = MemoryProvider::new();
        provider.seed_session();
        let page = page("https://app.example/reset-password");

        assert_eq!(
            establish_session(&provider, &page).await,
            BootstrapOutcome::Established
        );
    }

    #[tokio::test]
    async fn bare_url_without_session_is_undecided() {
        let provider = MemoryProvider::new();
        let page = page("https://app.example/reset-password");

        assert_eq!(
            establish_session(&provider, &page).await,
            BootstrapOutcome::NoSession
        );
    }

    #[tokio::test]
    async fn one_time_credentials_are_redeemed_once() {
        let provider = MemoryProvider::new();
        provider.issue_token_hash("TH");
        let page = page("https://app.example/reset-password?token_hash=TH&type=recovery");

        establish_session(&provider, &page).await;

        assert_eq!(provider.op_count("verify_recovery_token_hash"), 1);
        assert_eq!(provider.op_count("exchange_authorization_code"), 0);
        assert_eq!(provider.op_count("set_session"), 0);
    }
}
