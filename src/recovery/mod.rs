//! Credential recovery session bootstrap.
//!
//! Turning a recovery link into a new password runs through four stages, in
//! dependency order:
//!
//! 1. [`link`] classifies the page URL into at most one credential format.
//! 2. [`bootstrap`] redeems whichever credential is present (or finds an
//!    already-live session), trying each strategy once, in order.
//! 3. [`state`] owns the `Checking -> Valid | Invalid` verdict, racing the
//!    establisher against the provider's auth notifications under a bounded
//!    deadline with first-writer-wins semantics.
//! 4. [`password`] validates and submits the new password once the verdict is
//!    `Valid`.
//!
//! [`request`] (forgot-password initiation) is independent of the others and
//! enumeration-safe by construction.

pub mod bootstrap;
pub mod link;
pub mod page;
pub mod password;
pub mod request;
pub mod state;

pub use link::{parse_recovery_link, RecoveryCredentials};
pub use page::PageLocation;
pub use state::{InvalidReason, RecoverySession, RecoveryState};
