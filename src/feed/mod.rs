//! Getting feeds in and RSS documents out.
//!
//! - [`fetcher`] - HTTP retrieval of the source feed with retry, timeout and size limits
//! - [`export`] - Atomic saving of a converted document to disk
//!
//! # Example
//!
//! ```ignore
//! use atom2rss::feed::{export_to_file, fetch_feed, FetchOptions, EXPORT_FILE_NAME};
//!
//! let atom = fetch_feed(&client, "https://example.com/atom.xml", &FetchOptions::default()).await?;
//! let rss = atom2rss::convert::convert(&atom)?;
//! export_to_file(&rss, Path::new(EXPORT_FILE_NAME))?;
//! ```

mod export;
mod fetcher;

pub use export::{export_to_file, EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME};
pub use fetcher::{fetch_feed, request_url, FetchError, FetchOptions};
