//! Utility functions shared by the CLI and the conversion session.

mod atomic_file;
mod url_validator;

pub use atomic_file::write_atomic;
pub use url_validator::{validate_feed_url, UrlValidationError};
