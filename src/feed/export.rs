use anyhow::{Context, Result};
use std::path::Path;

use crate::util::write_atomic;

/// Default file name for a saved RSS document.
pub const EXPORT_FILE_NAME: &str = "rss-feed.xml";

/// Content type of a saved RSS document.
pub const EXPORT_CONTENT_TYPE: &str = "text/xml";

/// Saves an RSS document to `path`, byte-for-byte and atomically.
pub fn export_to_file(rss: &str, path: &Path) -> Result<()> {
    write_atomic(path, rss.as_bytes())
        .with_context(|| format!("Failed to save RSS document to '{}'", path.display()))?;

    tracing::info!(
        path = %path.display(),
        bytes = rss.len(),
        content_type = EXPORT_CONTENT_TYPE,
        "Saved RSS document"
    );
    Ok(())
}
