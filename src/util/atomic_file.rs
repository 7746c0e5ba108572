use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// A temporary sibling of the destination that is removed on drop unless it
/// was renamed into place.
struct Staged {
    path: PathBuf,
    committed: bool,
}

impl Staged {
    /// Creates the temp file next to `dest` so the final rename stays on one
    /// filesystem. `create_new` refuses a pre-existing path or symlink.
    fn create(dest: &Path) -> Result<(Self, File)> {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = dest.with_extension(format!("tmp.{nonce:016x}"));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("Failed to create temporary file '{}'", path.display()))?;
        Ok((
            Self {
                path,
                committed: false,
            },
            file,
        ))
    }

    fn commit(mut self, dest: &Path) -> Result<()> {
        #[cfg(windows)]
        if dest.exists() {
            std::fs::remove_file(dest)
                .with_context(|| format!("Failed to replace existing '{}'", dest.display()))?;
        }

        std::fs::rename(&self.path, dest).with_context(|| {
            format!(
                "Failed to rename '{}' to '{}'",
                self.path.display(),
                dest.display()
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Replaces `dest` with `bytes` so readers see either the old file or the
/// complete new one, never a partial write.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let (staged, mut file) = Staged::create(dest)?;

    file.write_all(bytes)
        .with_context(|| format!("Failed to write '{}'", staged.path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync '{}' to disk", staged.path.display()))?;
    drop(file);

    staged.commit(dest)
}
