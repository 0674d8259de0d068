// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile location.
//!
//! Walk a [`Manifest`] against the user's home directory, and classify what
//! actually lives at each candidate path. Location never fails. A candidate
//! that does not exist, or that cannot be inspected, is simply recorded as
//! [`LocatedKind::Missing`].

use crate::config::{EntryKind, Manifest, ManifestEntry};

use std::{
    ffi::OsStr,
    fs::metadata,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// What was found at a located path.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LocatedKind {
    File,
    Directory,
    Missing,
}

/// Manifest entry resolved against a home and target directory.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LocatedEntry {
    /// Absolute path of dotfile in home directory.
    pub source: PathBuf,

    /// Absolute path the dotfile gets materialized to.
    pub dest: PathBuf,

    /// What the source path turned out to be.
    pub kind: LocatedKind,
}

/// Locate every manifest entry relative to a home directory.
///
/// Each entry is given a destination path inside `target_dir` named after the
/// final component of its manifest path, e.g., `.config/nvim/` becomes
/// `<target_dir>/nvim`.
pub fn locate(
    manifest: &Manifest,
    home_dir: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Vec<LocatedEntry> {
    manifest
        .iter()
        .map(|entry| locate_entry(entry, home_dir.as_ref(), target_dir.as_ref()))
        .collect()
}

fn locate_entry(entry: &ManifestEntry, home_dir: &Path, target_dir: &Path) -> LocatedEntry {
    let source = home_dir.join(&entry.path);
    let dest = target_dir.join(dest_name(&entry.path));

    let kind = match metadata(&source) {
        Ok(meta) if meta.is_dir() => LocatedKind::Directory,
        Ok(_) => LocatedKind::File,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            info!("not found: {}", source.display());
            LocatedKind::Missing
        }
        Err(error) => {
            warn!("cannot inspect {}: {error}", source.display());
            LocatedKind::Missing
        }
    };

    match (entry.kind, kind) {
        (EntryKind::File, LocatedKind::Directory) | (EntryKind::Directory, LocatedKind::File) => {
            debug!(
                "{} expected to be {:?} but found {:?}",
                source.display(),
                entry.kind,
                kind
            );
        }
        _ => {}
    }

    LocatedEntry { source, dest, kind }
}

fn dest_name(path: &str) -> &OsStr {
    // INVARIANT: Trailing separators do not count as a final component.
    Path::new(path.trim_end_matches(['/', '\\']))
        .file_name()
        .unwrap_or_else(|| OsStr::new(path))
}
