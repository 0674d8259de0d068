// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the dotfyles configuration file, and the manifest of
//! well-known dotfile paths that get gathered into the dotfyles directory.
//! File I/O is left to the caller to figure out.
//!
//! # General Layout
//!
//! Every section of the configuration file is optional. Anything left out
//! falls back to its default value:
//!
//! ```toml
//! target_dir = "~/dotfyles"
//! branch = "main"
//! commit_message = "Initial commit"
//!
//! [remote]
//! name = "origin"
//! url = "https://github.com/me/dotfyles.git"
//!
//! [auth]
//! client_id = "Ov23liNHy37PEdYFK4Jf"
//! scope = "repo"
//! base_url = "https://github.com"
//! api_url = "https://api.github.com"
//! timeout_secs = 30
//!
//! [identity]
//! name = "John Doe"
//! email = "john@doe.com"
//!
//! [[manifest]]
//! path = ".bashrc"
//! kind = "file"
//! ```
//!
//! When at least one `[[manifest]]` entry is given, the listing replaces the
//! built-in manifest entirely.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Built-in listing of well-known dotfile paths relative to home directory.
const DEFAULT_MANIFEST: &[(&str, EntryKind)] = &[
    (".bashrc", EntryKind::File),
    (".bash_profile", EntryKind::File),
    (".zshrc", EntryKind::File),
    (".profile", EntryKind::File),
    (".fish/config.fish", EntryKind::File),
    (".config/fish/", EntryKind::Directory),
    (".vimrc", EntryKind::File),
    (".config/nvim/", EntryKind::Directory),
    (".emacs.d/init.el", EntryKind::File),
    (".config/helix/", EntryKind::Directory),
    (".tmux.conf", EntryKind::File),
    (".zellij/", EntryKind::Directory),
    (".config/wezterm/", EntryKind::Directory),
    (".wezterm.lua", EntryKind::File),
    (".config/alacritty/", EntryKind::Directory),
    (".alacritty.yml", EntryKind::File),
    (".config/kitty/", EntryKind::Directory),
    (".config/starship.toml", EntryKind::File),
    (".config/i3/", EntryKind::Directory),
    (".config/sway/", EntryKind::Directory),
    (".config/hypr/", EntryKind::Directory),
    (".config/xfce4/", EntryKind::Directory),
    (".gitconfig", EntryKind::File),
    (".gitignore_global", EntryKind::File),
    (".config/ranger/", EntryKind::Directory),
    (".config/picom.conf", EntryKind::File),
    (".config/dunst/", EntryKind::Directory),
    (".config/rofi", EntryKind::Directory),
    (".config/swaylock", EntryKind::Directory),
    (".ssh/config/", EntryKind::Directory),
    (".config/gtk-3.0/", EntryKind::Directory),
];

/// Kind of file system object a manifest entry is expected to be.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Plain file, gets copied.
    File,

    /// Directory, gets symlinked.
    Directory,
}

/// One candidate dotfile path relative to the home directory.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ManifestEntry {
    /// Path relative to home directory.
    pub path: String,

    /// What the path is expected to be.
    pub kind: EntryKind,
}

impl ManifestEntry {
    /// Construct new manifest entry.
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Immutable listing of candidate dotfiles.
///
/// Defines the universe of paths that dotfyles will consider gathering. The
/// default manifest is the built-in table of well-known dotfiles, but any
/// listing can be supplied instead.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Construct new manifest from given entries.
    pub fn new(entries: impl IntoIterator<Item = ManifestEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Iterate through each manifest entry in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(
            DEFAULT_MANIFEST
                .iter()
                .map(|(path, kind)| ManifestEntry::new(*path, *kind)),
        )
    }
}

/// Dotfyles configuration settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory to gather dotfiles into. Defaults to `$HOME/dotfyles`.
    pub target_dir: Option<PathBuf>,

    /// Initial branch of a freshly created repository.
    pub branch: String,

    /// Message to use when committing gathered dotfiles.
    pub commit_message: String,

    /// Remote repository settings.
    pub remote: RemoteSettings,

    /// Device authorization settings.
    pub auth: AuthSettings,

    /// Commit author identity.
    pub identity: Option<IdentitySettings>,

    /// Replacement for the built-in manifest.
    pub manifest: Option<Vec<ManifestEntry>>,
}

impl Settings {
    /// Manifest to locate dotfiles with.
    ///
    /// Use the configured manifest listing if any, or the built-in one.
    pub fn manifest(&self) -> Manifest {
        match &self.manifest {
            Some(entries) if !entries.is_empty() => Manifest::new(entries.iter().cloned()),
            _ => Manifest::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_dir: None,
            branch: "main".into(),
            commit_message: "Initial commit".into(),
            remote: RemoteSettings::default(),
            auth: AuthSettings::default(),
            identity: None,
            manifest: None,
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on target directory field.
        if let Some(target_dir) = &settings.target_dir {
            settings.target_dir = Some(PathBuf::from(
                shellexpand::full(target_dir.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Remote repository settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Name of remote to synchronize with.
    pub name: String,

    /// URL of remote. Discovered through authenticated user if absent.
    pub url: Option<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            name: "origin".into(),
            url: None,
        }
    }
}

/// Device authorization settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
    /// OAuth application client identifier.
    pub client_id: String,

    /// Scope to request access for.
    pub scope: String,

    /// Base URL of provider's login endpoints.
    pub base_url: String,

    /// Base URL of provider's REST API.
    pub api_url: String,

    /// Timeout for every network request in seconds.
    pub timeout_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_id: "Ov23liNHy37PEdYFK4Jf".into(),
            scope: "repo".into(),
            base_url: "https://github.com".into(),
            api_url: "https://api.github.com".into(),
            timeout_secs: 30,
        }
    }
}

/// Commit author identity settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct IdentitySettings {
    pub name: String,
    pub email: String,
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = indoc! {r#"
            target_dir = "$BLAH/dots"
            branch = "trunk"
            commit_message = "chore: gather dotfiles"

            [remote]
            name = "upstream"
            url = "https://blah.org/dots.git"

            [auth]
            client_id = "abc123"
            scope = "repo workflow"
            base_url = "http://localhost:8080"
            api_url = "http://localhost:8081"
            timeout_secs = 5

            [identity]
            name = "John Doe"
            email = "john@doe.com"

            [[manifest]]
            path = ".bashrc"
            kind = "file"

            [[manifest]]
            path = ".config/nvim/"
            kind = "directory"
        "#}
        .parse()?;

        let expect = Settings {
            target_dir: Some(PathBuf::from("/home/blah/dots")),
            branch: "trunk".into(),
            commit_message: "chore: gather dotfiles".into(),
            remote: RemoteSettings {
                name: "upstream".into(),
                url: Some("https://blah.org/dots.git".into()),
            },
            auth: AuthSettings {
                client_id: "abc123".into(),
                scope: "repo workflow".into(),
                base_url: "http://localhost:8080".into(),
                api_url: "http://localhost:8081".into(),
                timeout_secs: 5,
            },
            identity: Some(IdentitySettings {
                name: "John Doe".into(),
                email: "john@doe.com".into(),
            }),
            manifest: Some(vec![
                ManifestEntry::new(".bashrc", EntryKind::File),
                ManifestEntry::new(".config/nvim/", EntryKind::Directory),
            ]),
        };

        assert_eq!(result, expect);
        assert_eq!(result.manifest().len(), 2);

        Ok(())
    }

    #[test]
    fn empty_settings_use_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result, Settings::default());
        assert_eq!(result.manifest(), Manifest::default());
        assert_eq!(result.remote.name, "origin");
        assert_eq!(result.auth.scope, "repo");

        Ok(())
    }

    #[test]
    fn partial_section_keeps_remaining_defaults() -> anyhow::Result<()> {
        let result: Settings = "[auth]\nclient_id = \"xyz\"\n".parse()?;
        assert_eq!(result.auth.client_id, "xyz");
        assert_eq!(result.auth.base_url, "https://github.com");
        assert_eq!(result.auth.timeout_secs, 30);

        Ok(())
    }

    #[test]
    fn serialized_settings_parse_back() -> anyhow::Result<()> {
        let settings = Settings {
            target_dir: Some(PathBuf::from("/home/blah/dots")),
            identity: Some(IdentitySettings {
                name: "John Doe".into(),
                email: "john@doe.com".into(),
            }),
            manifest: Some(vec![ManifestEntry::new(".vimrc", EntryKind::File)]),
            ..Settings::default()
        };

        let text = settings.to_string();
        assert!(text.contains("[[manifest]]"));
        assert_eq!(text.parse::<Settings>()?, settings);

        Ok(())
    }

    #[test]
    fn unknown_entry_kind_fails() {
        let result = "[[manifest]]\npath = \".bashrc\"\nkind = \"socket\"\n".parse::<Settings>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn default_manifest_covers_well_known_paths() {
        let manifest = Manifest::default();
        let paths = manifest.iter().map(|e| e.path.as_str()).collect::<Vec<_>>();

        assert_eq!(manifest.len(), 31);
        assert!(paths.contains(&".bashrc"));
        assert!(manifest
            .iter()
            .any(|e| e.path == ".config/nvim/" && e.kind == EntryKind::Directory));
    }
}
