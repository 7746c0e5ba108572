//! Request bookkeeping around the conversion pipeline.
//!
//! A [`Session`] holds what the user currently sees: the fetched source text,
//! the converted RSS and a failure indicator. Requests may overlap (a new URL
//! submitted while the previous fetch is still in flight). Every request takes
//! a [`Ticket`] with a monotonically increasing id, and a completion is only
//! applied when it is newer than the last applied one, so a slow, older
//! request can never overwrite the result of a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::convert::{convert_with_indent, ConvertError};
use crate::feed::{fetch_feed, FetchError, FetchOptions};
use crate::util::validate_feed_url;

/// Visible state of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Id of the request whose result is shown; 0 before any completion.
    pub request_id: u64,
    pub url: String,
    /// Source feed text as fetched.
    pub source: String,
    /// Converted RSS document. Left untouched when a request fails.
    pub rss: String,
    /// Failure message of the last applied request.
    pub error: Option<String>,
    /// Requests started but not yet completed.
    pub pending: usize,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }
}

/// Handle for one in-flight request.
#[derive(Debug)]
pub struct Ticket {
    id: u64,
    url: String,
}

impl Ticket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Result of running one request through fetch and conversion.
#[derive(Debug)]
pub enum Outcome {
    Converted { source: String, rss: String },
    ConvertFailed { source: String, error: ConvertError },
    FetchFailed(FetchError),
}

/// Whether a completion was applied or dropped as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Carries the state as it stood right after this completion, so callers
    /// can show it without racing a later one.
    Applied(SessionState),
    Stale,
}

impl Completion {
    pub fn is_applied(&self) -> bool {
        matches!(self, Completion::Applied(_))
    }
}

#[derive(Debug, Default)]
pub struct Session {
    next_id: AtomicU64,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new request and returns its ticket.
    pub fn begin(&self, url: &str) -> Ticket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().pending += 1;
        tracing::debug!(request = id, url = %url, "Conversion request started");
        Ticket {
            id,
            url: url.to_owned(),
        }
    }

    /// Applies `outcome` unless a newer request has already completed.
    pub fn complete(&self, ticket: Ticket, outcome: Outcome) -> Completion {
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(1);

        if ticket.id <= state.request_id {
            tracing::warn!(
                request = ticket.id,
                current = state.request_id,
                url = %ticket.url,
                "Discarding stale conversion result"
            );
            return Completion::Stale;
        }

        state.request_id = ticket.id;
        state.url = ticket.url;
        match outcome {
            Outcome::Converted { source, rss } => {
                state.source = source;
                state.rss = rss;
                state.error = None;
            }
            Outcome::ConvertFailed { source, error } => {
                tracing::warn!(request = ticket.id, error = %error, "Conversion failed");
                state.source = source;
                state.error = Some(error.to_string());
            }
            Outcome::FetchFailed(error) => {
                tracing::warn!(request = ticket.id, error = %error, "Feed fetch failed");
                state.error = Some(error.to_string());
            }
        }
        Completion::Applied(state.clone())
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// Validates, fetches and converts `url`, then completes the request.
    ///
    /// Returns `None` for a blank URL, which is ignored.
    pub async fn submit(
        &self,
        client: &reqwest::Client,
        url: &str,
        config: &Config,
    ) -> Option<Completion> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        let ticket = self.begin(url);
        let outcome = run(client, url, config).await;
        Some(self.complete(ticket, outcome))
    }
}

/// Fetches and converts one feed without touching any session state.
pub async fn run(client: &reqwest::Client, url: &str, config: &Config) -> Outcome {
    if let Err(e) = validate_feed_url(url, config.allow_private_hosts) {
        return Outcome::FetchFailed(FetchError::InvalidUrl(e.to_string()));
    }

    let source = match fetch_feed(client, url, &FetchOptions::from(config)).await {
        Ok(source) => source,
        Err(e) => return Outcome::FetchFailed(e),
    };

    match convert_with_indent(&source, config.indent) {
        Ok(rss) => Outcome::Converted { source, rss },
        Err(error) => Outcome::ConvertFailed { source, error },
    }
}
