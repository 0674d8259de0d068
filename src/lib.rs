// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bootstrap a dotfiles repository.
//!
//! Dotfyles gathers well-known configuration files out of the user's home
//! directory into a dedicated directory, turns that directory into a Git
//! repository, commits what it gathered, and pushes the result to the user's
//! account on the hosting provider. Authentication goes through the OAuth2
//! device flow, so no browser is needed on the machine being bootstrapped.

pub mod auth;
pub mod config;
pub mod identity;
pub mod locate;
pub mod materialize;
pub mod path;
pub mod repository;
pub mod sync;

pub use auth::{AccessToken, AuthError, DeviceAuthClient, DeviceAuthSession};
pub use config::{EntryKind, Manifest, ManifestEntry, Settings};
pub use identity::{CommitIdentity, IdentityProvider};
pub use locate::{locate, LocatedEntry, LocatedKind};
pub use materialize::{materialize, Materialized};
pub use repository::{Credentials, RepositoryError, RepositoryManager};
pub use sync::{Bootstrap, PushOutcome, SyncError, SyncPlan, SyncReport};
