//! # Reakiri (Account Recovery & Session Bootstrap)
//!
//! `reakiri` implements the credential-recovery side of an identity platform:
//! turning a recovery link delivered out-of-band (email) into an authenticated
//! recovery session, and using that session to set a new password.
//!
//! ## Recovery Links
//!
//! A recovery link carries exactly one of three credential formats:
//!
//! - **Implicit tokens**: an `access_token`/`refresh_token` pair in the URL
//!   fragment with `type=recovery`.
//! - **Authorization code**: a short-lived `code` in the query string,
//!   exchanged for a session (PKCE pattern).
//! - **Token hash**: a one-time `token_hash` in the query string or fragment
//!   with `type=recovery`, redeemed via OTP verification.
//!
//! The [`recovery`] module classifies the link, establishes a session from
//! whichever format is present, and arbitrates the result against the
//! provider's own asynchronous auth notifications under a bounded deadline.
//!
//! ## Security Boundaries
//!
//! - Recovery credentials are one-time: once a session is established, the
//!   page location is replaced with the bare path so a reload cannot replay
//!   the tokens.
//! - Password updates are gated on a confirmed recovery session and never
//!   reach the network when the local gate rejects them.
//! - The forgot-password request flow is enumeration-safe: registered and
//!   unregistered addresses produce identical outcomes.
//!
//! The identity provider itself is an external collaborator reached through
//! the [`provider::IdentityProvider`] contract; this crate never inspects
//! session token contents beyond existence.

pub mod cli;
pub mod provider;
pub mod recovery;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
