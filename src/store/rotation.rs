//! Bounded-depth rotation of snapshot files.
//!
//! `alerts.json` is always the freshest snapshot; `alerts_1.json` through
//! `alerts_N.json` hold progressively older ones. Rotation runs once a new
//! snapshot has been staged, right before it is moved onto the base path.

use std::io;
use std::path::{Path, PathBuf};

/// Path of the `index`-th historical copy of `base`, e.g.
/// `state/alerts.json` → `state/alerts_3.json`.
pub fn numbered_path(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_{}", stem, index),
    };
    base.with_file_name(name)
}

/// Shifts `_1.._{N-1}` up by one (the old `_N` is discarded) and moves the
/// current base file into `_1`.
///
/// Missing files at any step are skipped. `max_history == 0` keeps no
/// history and leaves the base file for the caller to overwrite.
pub fn rotate_snapshots(base: &Path, max_history: usize) -> io::Result<()> {
    if max_history == 0 {
        return Ok(());
    }

    for i in (1..max_history).rev() {
        let older = numbered_path(base, i);
        let newer = numbered_path(base, i + 1);
        replace_if_exists(&older, &newer)?;
    }

    replace_if_exists(base, &numbered_path(base, 1))
}

/// Moves `from` over `to`, removing `to` first. No-op when `from` is absent.
fn replace_if_exists(from: &Path, to: &Path) -> io::Result<()> {
    if !from.exists() {
        return Ok(());
    }
    match std::fs::remove_file(to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::rename(from, to)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
