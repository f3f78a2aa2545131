//! Recovery link classification.
//!
//! A recovery URL carries at most one credential format, in the query string
//! or the fragment. Parsing is pure: no network, no URL mutation (stripping
//! happens only after a session is established).

use std::collections::HashMap;
use std::fmt;
use url::Url;

/// The `type` value a recovery link must carry for fragment/token-hash
/// formats.
const RECOVERY_TYPE: &str = "recovery";

/// Credentials extracted from a recovery link.
///
/// Exactly one variant is produced per URL. When several formats coexist the
/// most constrained one wins: token-hash, then authorization code, then the
/// implicit token pair.
#[derive(Clone, PartialEq, Eq)]
pub enum RecoveryCredentials {
    TokenHash {
        token_hash: String,
    },
    AuthorizationCode {
        code: String,
    },
    ImplicitTokens {
        access_token: String,
        refresh_token: String,
    },
}

// One-time credentials never land in logs, so Debug names the variant only.
impl fmt::Debug for RecoveryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenHash { .. } => f.write_str("TokenHash([REDACTED])"),
            Self::AuthorizationCode { .. } => f.write_str("AuthorizationCode([REDACTED])"),
            Self::ImplicitTokens { .. } => f.write_str("ImplicitTokens([REDACTED])"),
        }
    }
}

/// Classify `url` into at most one credential format.
#[must_use]
pub fn parse_recovery_link(url: &Url) -> Option<RecoveryCredentials> {
    let query = params(url.query());
    let fragment = params(url.fragment());

    // token_hash may travel in either component; its type tag must travel
    // with it.
    for component in [&query, &fragment] {
        if component.get("type").map(String::as_str) == Some(RECOVERY_TYPE) {
            if let Some(token_hash) = non_empty(component.get("token_hash")) {
                return Some(RecoveryCredentials::TokenHash { token_hash });
            }
        }
    }

    if let Some(code) = non_empty(query.get("code")) {
        return Some(RecoveryCredentials::AuthorizationCode { code });
    }

    if fragment.get("type").map(String::as_str) == Some(RECOVERY_TYPE) {
        if let (Some(access_token), Some(refresh_token)) = (
            non_empty(fragment.get("access_token")),
            non_empty(fragment.get("refresh_token")),
        ) {
            return Some(RecoveryCredentials::ImplicitTokens {
                access_token,
                refresh_token,
            });
        }
    }

    None
}

fn params(component: Option<&str>) -> HashMap<String, String> {
    component
        .map(|raw| {
            url::form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
