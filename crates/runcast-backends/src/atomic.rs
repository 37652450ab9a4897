//! Whole-file replacement for artifacts the OS scheduler reads.

use std::{io::Write, path::Path};

use tempfile::NamedTempFile;

use crate::error::{BackendError, Result};

/// Write `contents` to `path` so readers see either the old file or the new
/// one, never a partial write.
///
/// The temporary file is created in the destination directory so the final
/// rename stays on one file system.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| BackendError::from(e.error))?;
    Ok(())
}
