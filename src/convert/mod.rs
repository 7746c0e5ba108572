//! Atom to RSS 2.0 conversion.
//!
//! The pipeline is synchronous and stateless:
//!
//! - [`parser`] reads the Atom text into an [`AtomDocument`] with path lookups
//! - [`builder`] maps the document onto the [`RssChannel`] value model
//! - [`date`] normalizes entry publication dates
//! - [`writer`] serializes the finished channel as indented XML
//!
//! # Example
//!
//! ```
//! let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
//!   <title>Example</title>
//!   <entry><title>Hello</title></entry>
//! </feed>"#;
//!
//! let rss = atom2rss::convert::convert(atom).unwrap();
//! assert!(rss.contains("<title>Hello</title>"));
//! ```

pub mod builder;
pub mod date;
pub mod parser;
pub mod writer;

use thiserror::Error;

pub use builder::{build_channel, RssChannel, RssItem};
pub use date::format_pub_date;
pub use parser::{AtomDocument, ElementRef, ParseError};
pub use writer::{write_rss, SerializationError};

/// Indentation width used by [`convert`].
pub const DEFAULT_INDENT: usize = 2;

/// Errors that abort a conversion. No partial document is produced.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Serialize(#[from] SerializationError),
}

/// Converts Atom XML text into a formatted RSS 2.0 document.
pub fn convert(xml: &str) -> Result<String, ConvertError> {
    convert_with_indent(xml, DEFAULT_INDENT)
}

/// Like [`convert`], with a custom indentation width.
pub fn convert_with_indent(xml: &str, indent: usize) -> Result<String, ConvertError> {
    let doc = AtomDocument::parse(xml)?;
    let channel = build_channel(&doc);
    let rss = write_rss(&channel, indent)?;
    tracing::debug!(
        items = channel.items.len(),
        bytes = rss.len(),
        "Converted Atom feed to RSS"
    );
    Ok(rss)
}
