// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile materialization.
//!
//! Produce the on-disk representation of a [`LocatedEntry`] inside the
//! dotfyles directory. Plain files are copied along with their permission
//! bits. Directories are symlinked, but only if nothing already occupies the
//! destination path. Missing entries are left alone.

use crate::locate::{LocatedEntry, LocatedKind};

use std::{
    fs::{copy, metadata, set_permissions, symlink_metadata},
    io,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// What materialization did for a given entry.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Materialized {
    /// File copied to destination.
    Copied,

    /// Directory symlinked at destination.
    Linked,

    /// Destination already occupied, left untouched.
    AlreadyPresent,

    /// Source does not exist, nothing done.
    Missing,
}

/// Materialize located entry at its destination path.
///
/// # Errors
///
/// - Return [`MaterializeError::Copy`] if file cannot be copied.
/// - Return [`MaterializeError::Permissions`] if permission bits cannot be
///   reproduced on copied file.
/// - Return [`MaterializeError::Symlink`] if directory cannot be symlinked.
#[instrument(skip(entry), level = "debug")]
pub fn materialize(entry: &LocatedEntry) -> Result<Materialized> {
    match entry.kind {
        LocatedKind::File => copy_file(&entry.source, &entry.dest),
        LocatedKind::Directory => symlink_dir(&entry.source, &entry.dest),
        LocatedKind::Missing => {
            info!("skip missing {}", entry.source.display());
            Ok(Materialized::Missing)
        }
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<Materialized> {
    // INVARIANT: Never write through a symlink sitting at the destination.
    if is_symlink(dest) {
        warn!("{} is a symlink, not overwriting it", dest.display());
        return Ok(Materialized::AlreadyPresent);
    }

    copy(source, dest).map_err(|err| MaterializeError::Copy {
        source: err,
        from: source.into(),
        to: dest.into(),
    })?;

    let permissions = metadata(source)
        .map_err(|err| MaterializeError::Permissions {
            source: err,
            path: source.into(),
        })?
        .permissions();
    set_permissions(dest, permissions).map_err(|err| MaterializeError::Permissions {
        source: err,
        path: dest.into(),
    })?;

    info!("copied {} to {}", source.display(), dest.display());
    Ok(Materialized::Copied)
}

fn symlink_dir(source: &Path, dest: &Path) -> Result<Materialized> {
    // INVARIANT: Anything at the destination, dangling links included, wins.
    if symlink_metadata(dest).is_ok() {
        info!("{} already exists", dest.display());
        return Ok(Materialized::AlreadyPresent);
    }

    create_dir_link(source, dest).map_err(|err| MaterializeError::Symlink {
        source: err,
        from: source.into(),
        to: dest.into(),
    })?;

    info!("linked {} to {}", dest.display(), source.display());
    Ok(Materialized::Linked)
}

fn is_symlink(path: &Path) -> bool {
    symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(unix)]
fn create_dir_link(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn create_dir_link(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, dest)
}

/// Per-entry file system failures.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// Failed to copy file content.
    #[error("failed to copy {from:?} to {to:?}")]
    Copy {
        #[source]
        source: io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Failed to read or apply permission bits.
    #[error("failed to reproduce permissions on {path:?}")]
    Permissions {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Failed to create directory symlink.
    #[error("failed to symlink {to:?} to {from:?}")]
    Symlink {
        #[source]
        source: io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = MaterializeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, read_link, read_to_string, write};

    fn entry(root: &Path, source: &str, dest: &str, kind: LocatedKind) -> LocatedEntry {
        LocatedEntry {
            source: root.join(source),
            dest: root.join(dest),
            kind,
        }
    }

    #[sealed_test]
    fn missing_entry_changes_nothing() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("dots"))?;

        let result = materialize(&entry(&root, "home/.zshrc", "dots/.zshrc", LocatedKind::Missing))?;
        assert_eq!(result, Materialized::Missing);
        assert_eq!(std::fs::read_dir(root.join("dots"))?.count(), 0);

        Ok(())
    }

    #[sealed_test]
    fn file_is_copied() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("home"))?;
        create_dir_all(root.join("dots"))?;
        write(root.join("home/.bashrc"), "export EDITOR=vim\n")?;

        let result = materialize(&entry(&root, "home/.bashrc", "dots/.bashrc", LocatedKind::File))?;
        assert_eq!(result, Materialized::Copied);
        assert_eq!(read_to_string(root.join("dots/.bashrc"))?, "export EDITOR=vim\n");

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn file_copy_reproduces_permission_bits() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let root = std::env::current_dir()?;
        create_dir_all(root.join("home"))?;
        create_dir_all(root.join("dots"))?;
        write(root.join("home/.profile"), "#!/bin/sh\n")?;
        set_permissions(root.join("home/.profile"), std::fs::Permissions::from_mode(0o700))?;

        materialize(&entry(&root, "home/.profile", "dots/.profile", LocatedKind::File))?;
        let mode = metadata(root.join("dots/.profile"))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn directory_is_symlinked() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("home/.config/nvim"))?;
        create_dir_all(root.join("dots"))?;

        let result = materialize(&entry(&root, "home/.config/nvim", "dots/nvim", LocatedKind::Directory))?;
        assert_eq!(result, Materialized::Linked);
        assert_eq!(read_link(root.join("dots/nvim"))?, root.join("home/.config/nvim"));

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn existing_destination_is_not_touched() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("home/.config/kitty"))?;
        create_dir_all(root.join("elsewhere"))?;
        create_dir_all(root.join("dots"))?;
        write(root.join("dots/helix"), "occupied")?;
        std::os::unix::fs::symlink(root.join("elsewhere"), root.join("dots/kitty"))?;

        let linked = entry(&root, "home/.config/kitty", "dots/kitty", LocatedKind::Directory);
        assert_eq!(materialize(&linked)?, Materialized::AlreadyPresent);
        assert_eq!(read_link(root.join("dots/kitty"))?, root.join("elsewhere"));

        let file = entry(&root, "home/.config/kitty", "dots/helix", LocatedKind::Directory);
        assert_eq!(materialize(&file)?, Materialized::AlreadyPresent);
        assert_eq!(read_to_string(root.join("dots/helix"))?, "occupied");

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn file_never_written_through_symlink() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("home"))?;
        create_dir_all(root.join("dots"))?;
        write(root.join("home/.gitconfig"), "[user]\n")?;
        write(root.join("victim"), "old")?;
        std::os::unix::fs::symlink(root.join("victim"), root.join("dots/.gitconfig"))?;

        let file = entry(&root, "home/.gitconfig", "dots/.gitconfig", LocatedKind::File);
        assert_eq!(materialize(&file)?, Materialized::AlreadyPresent);
        assert_eq!(read_link(root.join("dots/.gitconfig"))?, root.join("victim"));
        assert_eq!(read_to_string(root.join("victim"))?, "old");

        Ok(())
    }

    #[sealed_test]
    fn copy_into_missing_target_dir_fails() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("home"))?;
        write(root.join("home/.vimrc"), "set nu\n")?;

        let result = materialize(&entry(&root, "home/.vimrc", "nowhere/.vimrc", LocatedKind::File));
        assert!(matches!(result, Err(MaterializeError::Copy { .. })));

        Ok(())
    }
}
