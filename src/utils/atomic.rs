//! Atomic file operations
//!
//! Whole-file persistence (documents.jsonl, meta.json, pruned
//! events.jsonl) goes through these helpers so a crash mid-write can
//! never leave a truncated file behind.
//!
//! # Pattern
//!
//! 1. Write to a temporary file (.tmp)
//! 2. Call sync_all() to flush to disk
//! 3. Rename temp file to final path (atomic on most filesystems)
//!
//! The final file is either the old version (crash before rename) or
//! the new version (rename completed), never a partial state.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Atomically replace `path` with `content`.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &str) -> io::Result<()> {
    atomic_write_with(path, |file| file.write_all(content.as_bytes()))
}

/// Atomically replace `path` with whatever `write_fn` produces.
///
/// Preferred for line-oriented files: the rows are streamed into the
/// temp file instead of being joined into one string first.
pub fn atomic_write_with<P, F>(path: P, write_fn: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&temp_path)?;
    write_fn(&mut file)?;

    // Durable before the rename makes it visible
    file.sync_all()?;

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Remove leftover .tmp files from interrupted writes.
///
/// Called once at store startup, before any file is loaded.
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let dir = dir.as_ref();
    let mut cleaned = 0;

    if !dir.exists() {
        return Ok(0);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            fs::remove_file(&path)?;
            cleaned += 1;
        }
    }

    Ok(cleaned)
}
