//! Recovery state machine.
//!
//! Owns the `Checking -> Valid | Invalid` verdict for one reset-password view
//! instance. Three resolvers race: the session establisher, the provider's
//! auth-event channel, and a hard deadline. The first terminal write wins;
//! every later write is a guaranteed no-op, enforced by a compare-and-set
//! latch rather than a bare flag check. Terminal states are absorbing.
//!
//! Once a verdict lands, the event subscription and the remaining resolvers
//! are torn down so a late notification cannot mutate a decided view.
//! Dropping the handle before resolution cancels the whole race.

use crate::provider::{AuthEvent, IdentityProvider};
use crate::recovery::bootstrap::{establish_session, BootstrapOutcome};
use crate::recovery::page::PageLocation;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

/// How long the machine waits in `Checking` before forcing a verdict.
pub const DEFAULT_CHECK_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    /// No strategy could redeem the link: expired, malformed, or already
    /// consumed.
    InvalidOrExpired,
    /// Nothing confirmed a session before the deadline.
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryState {
    Checking,
    Valid,
    Invalid(InvalidReason),
}

impl RecoveryState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Checking)
    }
}

/// Single-assignment verdict cell: the one-shot latch for this view
/// instance. `resolve` commits the first terminal state and reports whether
/// this caller was the winner.
struct VerdictCell {
    resolved: AtomicBool,
    tx: watch::Sender<RecoveryState>,
}

impl VerdictCell {
    fn new() -> (Arc<Self>, watch::Receiver<RecoveryState>) {
        let (tx, rx) = watch::channel(RecoveryState::Checking);
        (
            Arc::new(Self {
                resolved: AtomicBool::new(false),
                tx,
            }),
            rx,
        )
    }

    fn resolve(&self, verdict: RecoveryState) -> bool {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.tx.send(verdict);
            true
        } else {
            debug!("late resolver ignored: {:?}", verdict);
            false
        }
    }
}

/// Handle to an in-flight (or decided) recovery check.
pub struct RecoverySession {
    state: watch::Receiver<RecoveryState>,
    page: PageLocation,
    tasks: Vec<JoinHandle<()>>,
}

impl RecoverySession {
    /// Start checking with the default deadline.
    #[must_use]
    pub fn begin(provider: Arc<dyn IdentityProvider>, page: PageLocation) -> Self {
        Self::begin_with_deadline(provider, page, DEFAULT_CHECK_DEADLINE)
    }

    /// Start checking; `deadline` bounds the `Checking` state.
    #[must_use]
    pub fn begin_with_deadline(
        provider: Arc<dyn IdentityProvider>,
        page: PageLocation,
        deadline: Duration,
    ) -> Self {
        let (cell, state) = VerdictCell::new();

        // Subscribe before the establisher starts so a notification fired
        // mid-establishment cannot slip between the two.
        let events = provider.subscribe();

        let establisher = {
            let cell = Arc::clone(&cell);
            let provider = Arc::clone(&provider);
            let page = page.clone();
            tokio::spawn(async move {
                match establish_session(provider.as_ref(), &page).await {
                    BootstrapOutcome::Established => {
                        cell.resolve(RecoveryState::Valid);
                    }
                    BootstrapOutcome::Rejected => {
                        cell.resolve(RecoveryState::Invalid(InvalidReason::InvalidOrExpired));
                    }
                    // Leave the verdict to the event channel or the deadline.
                    BootstrapOutcome::NoSession => {}
                }
            })
        };

        let listener = {
            let cell = Arc::clone(&cell);
            tokio::spawn(listen_for_session(events, cell))
        };

        let timer = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move {
                sleep(deadline).await;
                cell.resolve(RecoveryState::Invalid(InvalidReason::Timeout));
            })
        };

        // Tear the race down as soon as a verdict lands.
        let janitor = {
            let mut state = state.clone();
            let resolvers = [
                establisher.abort_handle(),
                listener.abort_handle(),
                timer.abort_handle(),
            ];
            tokio::spawn(async move {
                if state.wait_for(|s| s.is_terminal()).await.is_ok() {
                    for resolver in resolvers {
                        resolver.abort();
                    }
                }
            })
        };

        Self {
            state,
            page,
            tasks: vec![establisher, listener, timer, janitor],
        }
    }

    /// Current state, without waiting.
    #[must_use]
    pub fn state(&self) -> RecoveryState {
        *self.state.borrow()
    }

    /// Watch state transitions (at most one: `Checking` to a terminal state).
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RecoveryState> {
        self.state.clone()
    }

    /// Wait for the terminal verdict.
    pub async fn verdict(&mut self) -> RecoveryState {
        match self.state.wait_for(|s| s.is_terminal()).await.map(|s| *s) {
            Ok(state) => state,
            // All resolvers are gone; report whatever was decided.
            Err(_) => *self.state.borrow(),
        }
    }

    /// Snapshot of the page URL, stripped of credentials once `Valid`.
    #[must_use]
    pub fn current_url(&self) -> Url {
        self.page.current()
    }
}

impl Drop for RecoverySession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn listen_for_session(mut events: broadcast::Receiver<AuthEvent>, cell: Arc<VerdictCell>) {
    loop {
        match events.recv().await {
            Ok(event) if event.confirms_session() => {
                cell.resolve(RecoveryState::Valid);
                break;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("auth event listener lagged by {}", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryProvider;
    use tokio::task::yield_now;

    fn page(input: &str) -> PageLocation {
        PageLocation::parse(input).unwrap()
    }

    fn provider() -> (Arc<MemoryProvider>, Arc<dyn IdentityProvider>) {
        let provider = Arc::new(MemoryProvider::new());
        let dyn_provider: Arc<dyn IdentityProvider> = provider.clone();
        (provider, dyn_provider)
    }

    #[tokio::test]
    async fn fresh_token_hash_reaches_valid() {
        let (memory, dyn_provider) = provider();
        memory.issue_token_hash("TH");
        let page = page("https://app.example/reset-password?token_hash=TH&type=recovery");

        let mut session = RecoverySession::begin(dyn_provider, page);

        assert_eq!(session.verdict().await, RecoveryState::Valid);
        assert_eq!(
            session.current_url().as_str(),
            "https://app.example/reset-password"
        );
    }

    #[tokio::test]
    async fn spent_credential_reaches_invalid_or_expired() {
        let (_, dyn_provider) = provider();
        let page = page("https://app.example/reset-password?code=SPENT");

        let mut session = RecoverySession::begin(dyn_provider, page);

        assert_eq!(
            session.verdict().await,
            RecoveryState::Invalid(InvalidReason::InvalidOrExpired)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bare_url_times_out_at_the_deadline_not_before() {
        let (_, dyn_provider) = provider();
        let page = page("https://app.example/reset-password");

        let mut session =
            RecoverySession::begin_with_deadline(dyn_provider, page, Duration::from_secs(5));

        // Let the establisher finish; nothing should have resolved yet.
        for _ in 0..20 {
            yield_now().await;
        }
        assert_eq!(session.state(), RecoveryState::Checking);

        assert_eq!(
            session.verdict().await,
            RecoveryState::Invalid(InvalidReason::Timeout)
        );
    }

    #[tokio::test]
    async fn runtime_notification_validates_a_bare_url() {
        let (memory, dyn_provider) = provider();
        let page = page("https://app.example/reset-password");

        let mut session = RecoverySession::begin(dyn_provider, page);
        for _ in 0..20 {
            yield_now().await;
        }
        memory.emit(AuthEvent::PasswordRecovery);

        assert_eq!(session.verdict().await, RecoveryState::Valid);
    }

    #[tokio::test]
    async fn non_session_events_do_not_resolve() {
        let (memory, dyn_provider) = provider();
        let page = page("https://app.example/reset-password");

        let session = RecoverySession::begin(dyn_provider, page);
        for _ in 0..20 {
            yield_now().await;
        }
        memory.emit(AuthEvent::TokenRefreshed);
        for _ in 0..20 {
            yield_now().await;
        }

        assert_eq!(session.state(), RecoveryState::Checking);
    }

    #[tokio::test]
    async fn first_writer_wins_and_state_never_toggles() {
        // Establisher success and a runtime notification land in the same
        // tick; the verdict must be written exactly once.
        let (memory, dyn_provider) = provider();
        memory.issue_token_hash("TH");
        let page = page("https://app.example/reset-password?token_hash=TH&type=recovery");

        let mut session = RecoverySession::begin(dyn_provider, page);
        memory.emit(AuthEvent::SignedIn);

        assert_eq!(session.verdict().await, RecoveryState::Valid);

        // Absorbing: nothing moves it back to Checking afterwards.
        memory.emit(AuthEvent::SignedOut);
        for _ in 0..20 {
            yield_now().await;
        }
        assert_eq!(session.state(), RecoveryState::Valid);
    }

    #[tokio::test]
    async fn verdict_cell_is_single_assignment() {
        let (cell, rx) = VerdictCell::new();

        assert!(cell.resolve(RecoveryState::Valid));
        assert!(!cell.resolve(RecoveryState::Invalid(InvalidReason::Timeout)));
        assert_eq!(*rx.borrow(), RecoveryState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn late_timer_is_a_no_op_after_valid() {
        let (memory, dyn_provider) = provider();
        memory.issue_token_hash("TH");
        let page = page("https://app.example/reset-password?token_hash=TH&type=recovery");

        let mut session =
            RecoverySession::begin_with_deadline(dyn_provider, page, Duration::from_millis(10));
        assert_eq!(session.verdict().await, RecoveryState::Valid);

        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..20 {
            yield_now().await;
        }
        assert_eq!(session.state(), RecoveryState::Valid);
    }
}
