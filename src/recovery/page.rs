//! Page location handle.
//!
//! Stands in for the browser's location + history pair: flows read the
//! current URL from it and, after a successful session establishment, replace
//! the visible entry with the bare path so one-time credentials cannot be
//! reloaded, shared, or resurrected through history navigation.

use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Shared handle to the embedder's current location.
///
/// Cloning hands out another handle to the same location, the way every part
/// of a page shares one history.
#[derive(Clone, Debug)]
pub struct PageLocation {
    url: Arc<Mutex<Url>>,
}

impl PageLocation {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url: Arc::new(Mutex::new(url)),
        }
    }

    /// # Errors
    /// Returns an error if `input` is not an absolute URL.
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(input)?))
    }

    /// Snapshot of the current URL.
    #[must_use]
    pub fn current(&self) -> Url {
        self.url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the visible entry with the bare path: no query, no fragment.
    pub fn replace_with_bare_path(&self) {
        let mut url = self.url.lock().unwrap_or_else(PoisonError::into_inner);
        url.set_query(None);
        url.set_fragment(None);
    }
}
