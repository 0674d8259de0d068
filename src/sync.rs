// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfyles bootstrap pipeline.
//!
//! Ties everything together into one run:
//!
//! 1. Authenticate through the device flow.
//! 2. Prepare the dotfyles directory.
//! 3. Initialize its repository, and make sure the remote exists.
//! 4. Fetch remote history, and fast-forward onto it if possible.
//! 5. Locate dotfiles, and materialize them into the dotfyles directory.
//! 6. Stage and commit everything.
//! 7. Push, unless there is nothing to push.
//!
//! Failing to authenticate aborts the run before anything touches the file
//! system. A single dotfile that cannot be materialized only gets logged, so
//! one broken entry never blocks the rest. Repository failures abort the run
//! without rolling back files that were already materialized.

use crate::{
    auth::{transport::DeviceFlowTransport, AuthError, Clock, DeviceAuthClient, DeviceAuthSession},
    config::{Manifest, Settings},
    identity::{IdentityError, IdentityProvider},
    locate::{locate, LocatedEntry},
    materialize::{materialize, MaterializeError, Materialized},
    path::{default_target_dir, home_dir, NoWayHome},
    repository::{
        set_transfer_timeout, Credentials, Reconciled, RepositoryError, RepositoryManager,
    },
};

use git2::Oid;
use indicatif::ProgressBar;
use std::{io, path::PathBuf, time::Duration};
use tracing::{info, instrument, warn};

/// Everything a run needs to know besides how to authenticate.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// Home directory to locate dotfiles in.
    pub home_dir: PathBuf,

    /// Directory to materialize dotfiles into.
    pub target_dir: PathBuf,

    /// Candidate dotfiles.
    pub manifest: Manifest,

    /// Initial branch of a fresh repository.
    pub branch: String,

    /// Message of the commit holding gathered dotfiles.
    pub commit_message: String,

    /// Name of remote to synchronize with.
    pub remote_name: String,

    /// URL of remote. Discovered through authenticated user if absent.
    pub remote_url: Option<String>,

    /// Timeout of remote transfers.
    pub timeout: Duration,
}

impl SyncPlan {
    /// Construct plan from configuration settings.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if home directory cannot be determined.
    pub fn from_settings(settings: &Settings) -> Result<Self, NoWayHome> {
        let target_dir = match &settings.target_dir {
            Some(path) => path.clone(),
            None => default_target_dir()?,
        };

        Ok(Self {
            home_dir: home_dir()?,
            target_dir,
            manifest: settings.manifest(),
            branch: settings.branch.clone(),
            commit_message: settings.commit_message.clone(),
            remote_name: settings.remote.name.clone(),
            remote_url: settings.remote.url.clone(),
            timeout: Duration::from_secs(settings.auth.timeout_secs),
        })
    }
}

/// What happened to a single located dotfile.
#[derive(Debug)]
pub struct EntryReport {
    pub entry: LocatedEntry,
    pub outcome: Result<Materialized, MaterializeError>,
}

/// What the push step did.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PushOutcome {
    Pushed,
    NothingToPush,
}

/// Summary of one run.
#[derive(Debug)]
pub struct SyncReport {
    /// Remote URL synchronized with.
    pub remote_url: String,

    /// How local history was reconciled with remote history.
    pub reconciled: Reconciled,

    /// Per-entry materialization results in manifest order.
    pub entries: Vec<EntryReport>,

    /// New commit, if there was anything to commit.
    pub commit: Option<Oid>,

    /// What the push step did.
    pub push: PushOutcome,
}

impl SyncReport {
    /// Number of entries that failed to materialize.
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_err()).count()
    }
}

/// Bootstrap pipeline over a device flow client and an identity provider.
pub struct Bootstrap<T, C, I>
where
    T: DeviceFlowTransport,
    C: Clock,
    I: IdentityProvider,
{
    auth: DeviceAuthClient<T, C>,
    identity: I,
    plan: SyncPlan,
    progress: ProgressBar,
}

impl<T, C, I> Bootstrap<T, C, I>
where
    T: DeviceFlowTransport,
    C: Clock,
    I: IdentityProvider,
{
    /// Construct new bootstrap pipeline.
    pub fn new(auth: DeviceAuthClient<T, C>, identity: I, plan: SyncPlan) -> Self {
        Self {
            auth,
            identity,
            plan,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report transfer progress through progress bar.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Run the whole pipeline.
    ///
    /// Calls `notice` exactly once with the device session, so the user can
    /// be told where to authorize dotfyles.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Auth`] if device authorization fails.
    /// - Return [`SyncError::Prepare`] if dotfyles directory cannot be made.
    /// - Return [`SyncError::Identity`] if commit identity cannot be obtained.
    /// - Return [`SyncError::Repository`] if any repository step fails.
    #[instrument(skip(self, notice), level = "debug")]
    pub fn run(&self, notice: impl FnOnce(&DeviceAuthSession)) -> Result<SyncReport> {
        let token = self.auth.authenticate(notice)?;
        let remote_url = match &self.plan.remote_url {
            Some(url) => url.clone(),
            None => {
                let login = self.auth.resolve_login(&token)?;
                format!("{}/{login}/dotfyles.git", self.auth.base_url())
            }
        };

        let target_dir = &self.plan.target_dir;
        mkdirp::mkdirp(target_dir).map_err(|err| SyncError::Prepare {
            source: err,
            path: target_dir.clone(),
        })?;
        info!("dotfyles directory ready at {}", target_dir.display());

        let repo = RepositoryManager::ensure_initialized(target_dir, &self.plan.branch)?
            .with_progress(self.progress.clone())?;
        set_transfer_timeout(self.plan.timeout)?;
        repo.ensure_remote(&self.plan.remote_name, &remote_url)?;

        let credentials = Credentials::from_token(&token);
        repo.fetch(&self.plan.remote_name, &credentials)?;
        let reconciled = repo.reconcile(&self.plan.remote_name)?;

        let entries = self.materialize_all();

        // INVARIANT: Identity is settled before anything gets staged.
        let identity = self.identity.identity()?;
        if !identity.is_complete() {
            return Err(RepositoryError::IdentityRequired.into());
        }

        repo.stage_all()?;
        let commit = match repo.commit(&self.plan.commit_message, &identity) {
            Ok(oid) => Some(oid),
            Err(RepositoryError::NothingToCommit) => {
                info!("nothing new to commit");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let push = if commit.is_none() && !repo.has_unpushed_commits(&self.plan.remote_name)? {
            info!("no changes to push; repository is up-to-date");
            PushOutcome::NothingToPush
        } else {
            repo.push(&self.plan.remote_name, &credentials)?;
            PushOutcome::Pushed
        };

        Ok(SyncReport {
            remote_url,
            reconciled,
            entries,
            commit,
            push,
        })
    }

    fn materialize_all(&self) -> Vec<EntryReport> {
        locate(&self.plan.manifest, &self.plan.home_dir, &self.plan.target_dir)
            .into_iter()
            .map(|entry| {
                let outcome = materialize(&entry);
                if let Err(err) = &outcome {
                    warn!("{err}: {}", error_chain(err));
                }
                EntryReport { entry, outcome }
            })
            .collect()
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }

    chain.join(": ")
}

/// Pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Device authorization fails.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Dotfyles directory cannot be created.
    #[error("failed to prepare dotfyles directory {path:?}")]
    Prepare {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Commit identity cannot be obtained.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Repository operation fails.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Friendly result alias :3
type Result<T, E = SyncError> = std::result::Result<T, E>;
