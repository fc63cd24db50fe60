//! Pre-run archival of the starting assembly sources.
//!
//! The drivers modify the STL sources in place, so before the first removal
//! every source is copied into a fresh sibling directory. The archive is the
//! only way back to the starting point after an interrupted run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::common::error::{Error, Result};

/// Copies `files` into a new directory named `dir_stem`, creating it (and
/// any missing parents) first. Returns the archive directory.
///
/// # Errors
///
/// [`Error::Io`] when the directory cannot be created or a file cannot be
/// copied; the caller treats that as fatal (an unarchived run must not
/// mutate sources).
pub fn archive_sources(
    dir_stem: impl AsRef<Path>,
    files: &[PathBuf],
) -> Result<PathBuf> {
    let archive = dir_stem.as_ref().to_path_buf();
    fs::create_dir_all(&archive).map_err(|e| Error::io(&archive, e))?;

    for file in files {
        let name = file
            .file_name()
            .ok_or_else(|| Error::Invariant(format!("{} has no file name", file.display())))?;
        let target = archive.join(name);
        let _ = fs::copy(file, &target).map_err(|e| Error::io(file, e))?;
    }

    info!("archived {} source file(s) to {}", files.len(), archive.display());
    Ok(archive)
}
