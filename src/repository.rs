// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfyles repository management.
//!
//! The dotfyles directory doubles as a plain, non-bare Git repository. Every
//! run walks the repository through the same lifecycle:
//!
//! ```text
//! Absent -> Initialized -> RemoteConfigured -> Synced
//! ```
//!
//! Each step is idempotent. Running dotfyles against a repository that is
//! already partially set up picks up wherever the last run left off, without
//! creating a second repository, or a second remote.
//!
//! # Reconciliation
//!
//! Remote history is fetched before anything new gets committed. Dotfyles
//! only ever __fast-forwards__ to remote history. An unborn local branch
//! adopts the remote branch as is, and a local branch that is strictly behind
//! gets moved up to the remote tip. Diverged histories are left alone, which
//! means the remote will reject the next push. Dotfyles never force pushes.

use crate::{auth::AccessToken, identity::CommitIdentity};

use auth_git2::GitAuthenticator;
use git2::{
    build::CheckoutBuilder, ErrorClass, ErrorCode, FetchOptions, IndexAddOption, Oid,
    PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions, Signature,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::Path,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Credentials for remote transfers.
///
/// Wraps an access token as HTTP basic credentials with `oauth2` as the
/// username. Dotfyles never falls back to interactive prompting.
pub struct Credentials {
    authenticator: GitAuthenticator,
}

impl Credentials {
    /// Construct credentials from access token.
    pub fn from_token(token: &AccessToken) -> Self {
        let authenticator = GitAuthenticator::default()
            .try_cred_helper(false)
            .try_password_prompt(0)
            .add_plaintext_credentials("*", "oauth2", token.secret());

        Self { authenticator }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Credentials").finish_non_exhaustive()
    }
}

/// What [`RepositoryManager::ensure_remote`] did.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RemoteSetup {
    Created,
    Reused,
}

/// Outcome of reconciling local branch with fetched remote branch.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Reconciled {
    /// Remote has no branch of the same name yet.
    NoRemoteBranch,

    /// Unborn local branch now starts at remote tip.
    AdoptedRemote,

    /// Both branches point at the same commit.
    UpToDate,

    /// Local branch moved up to remote tip.
    FastForwarded,

    /// Local branch has commits remote lacks, and nothing else.
    Ahead,

    /// Both branches have commits the other lacks.
    Diverged,
}

/// Manage the repository of a dotfyles directory.
pub struct RepositoryManager {
    repository: Repository,
    progress: ProgressBar,
}

impl RepositoryManager {
    /// Open repository at path, or initialize a new one if there is none.
    ///
    /// A fresh repository starts out on `branch`. An existing repository is
    /// left untouched, whatever branch it is on.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::Git2`] if repository cannot be opened or
    ///   created.
    #[instrument(skip(path), level = "debug")]
    pub fn ensure_initialized(path: impl AsRef<Path>, branch: &str) -> Result<Self> {
        let repository = match Repository::open(path.as_ref()) {
            Ok(repository) => {
                info!("reuse existing repository at {}", path.as_ref().display());
                repository
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                info!("initialize new repository at {}", path.as_ref().display());
                let mut opts = RepositoryInitOptions::new();
                opts.bare(false);
                opts.initial_head(branch);
                Repository::init_opts(path.as_ref(), &opts)?
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            repository,
            progress: ProgressBar::hidden(),
        })
    }

    /// Report transfer progress of fetch and push through progress bar.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::IndicatifStyleTemplate`] if progress bar
    ///   style cannot be set.
    pub fn with_progress(mut self, bar: ProgressBar) -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<30}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        self.progress = bar;

        Ok(self)
    }

    /// Name of branch HEAD points to, born or not.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::DetachedHead`] if HEAD is not symbolic.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.repository.find_reference("HEAD")?;
        let target = head.symbolic_target().ok_or(RepositoryError::DetachedHead)?;

        Ok(target.strip_prefix("refs/heads/").unwrap_or(target).to_owned())
    }

    /// Make sure remote of given name exists.
    ///
    /// An existing remote is reused as is, even if it points somewhere other
    /// than `url`. Users are free to repoint their remote between runs.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::Git2`] if remote cannot be looked up or
    ///   created.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<RemoteSetup> {
        match self.repository.find_remote(name) {
            Ok(remote) => {
                let existing = remote.url().unwrap_or_default();
                if existing != url {
                    info!("remote {name:?} points to {existing}, leaving it that way");
                } else {
                    info!("remote {name:?} already exists, reusing it");
                }
                Ok(RemoteSetup::Reused)
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                self.repository.remote(name, url)?;
                info!("remote {name:?} created at {url}");
                Ok(RemoteSetup::Created)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch remote history.
    ///
    /// Being up to date already is not an error.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::RemoteNotFound`] if no repository lives at
    ///   remote URL.
    /// - Return [`RepositoryError::Auth`] if remote refuses credentials.
    /// - Return [`RepositoryError::Network`] if remote cannot be reached.
    /// - Return [`RepositoryError::Git2`] for any other libgit2 failure.
    #[instrument(skip(self, credentials), level = "debug")]
    pub fn fetch(&self, remote_name: &str, credentials: &Credentials) -> Result<()> {
        let mut remote = self.repository.find_remote(remote_name)?;
        let config = self.repository.config()?;
        self.start_progress(format!("fetch {remote_name}"));

        let bar = self.progress.clone();
        let mut throttle = Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(credentials.authenticator.credentials(&config));
        rc.transfer_progress(move |progress| {
            if throttle.elapsed() > Duration::from_millis(10) {
                throttle = Instant::now();
                bar.set_length(progress.total_objects() as u64);
                bar.set_position(progress.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        let result = remote.fetch::<&str>(&[], Some(&mut fo), None);
        self.progress.finish_and_clear();
        if let Err(err) = result {
            if is_missing_repository(&err) {
                let url = remote.url().unwrap_or_default().to_owned();
                return Err(RepositoryError::RemoteNotFound { source: err, url });
            }
            return Err(transfer_error(err));
        }

        info!("fetched {remote_name}");
        Ok(())
    }

    /// Bring local branch up to fetched remote branch by fast-forward only.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::DetachedHead`] if HEAD is not symbolic.
    /// - Return [`RepositoryError::Git2`] if references cannot be read or
    ///   moved, or if checkout fails.
    #[instrument(skip(self), level = "debug")]
    pub fn reconcile(&self, remote_name: &str) -> Result<Reconciled> {
        let branch = self.current_branch()?;
        let local_ref = format!("refs/heads/{branch}");
        let tracking_ref = format!("refs/remotes/{remote_name}/{branch}");

        let Some(remote_oid) = self.resolve(&tracking_ref)? else {
            debug!("remote has no {branch} branch yet");
            return Ok(Reconciled::NoRemoteBranch);
        };

        let Some(local_oid) = self.resolve(&local_ref)? else {
            info!("adopt history of {tracking_ref}");
            self.move_branch(&local_ref, remote_oid, "dotfyles: adopt remote history")?;
            return Ok(Reconciled::AdoptedRemote);
        };

        let (ahead, behind) = self.repository.graph_ahead_behind(local_oid, remote_oid)?;
        let outcome = match (ahead, behind) {
            (0, 0) => Reconciled::UpToDate,
            (_, 0) => Reconciled::Ahead,
            (0, _) => {
                info!("fast-forward {branch} by {behind} commit(s)");
                self.move_branch(&local_ref, remote_oid, "dotfyles: fast-forward")?;
                Reconciled::FastForwarded
            }
            _ => {
                warn!("{branch} diverged from {tracking_ref} ({ahead} ahead, {behind} behind)");
                Reconciled::Diverged
            }
        };

        Ok(outcome)
    }

    /// Stage every added, modified, or removed file of working tree.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::Git2`] if index cannot be updated.
    #[instrument(skip(self), level = "debug")]
    pub fn stage_all(&self) -> Result<()> {
        let mut index = self.repository.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        debug!("staged {} entries", index.len());

        Ok(())
    }

    /// Check if index differs from HEAD.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::Git2`] if index or HEAD cannot be read.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let index = self.repository.index()?;
        let head_tree = match self.repository.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(err) if is_unborn(&err) => None,
            Err(err) => return Err(err.into()),
        };
        let diff = self
            .repository
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;

        Ok(diff.deltas().len() > 0)
    }

    /// Commit staged changes on top of HEAD.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::IdentityRequired`] if identity is missing
    ///   a name or an email. Checked before anything else.
    /// - Return [`RepositoryError::NothingToCommit`] if index matches HEAD.
    /// - Return [`RepositoryError::Git2`] if commit cannot be written.
    #[instrument(skip(self, message, identity), level = "debug")]
    pub fn commit(&self, message: &str, identity: &CommitIdentity) -> Result<Oid> {
        if !identity.is_complete() {
            return Err(RepositoryError::IdentityRequired);
        }

        if !self.has_staged_changes()? {
            return Err(RepositoryError::NothingToCommit);
        }

        let mut index = self.repository.index()?;
        let tree = self.repository.find_tree(index.write_tree()?)?;
        let signature = Signature::now(identity.name.trim(), identity.email.trim())?;

        // INVARIANT: Always append to latest commit of HEAD if there is one.
        let parent = match self.repository.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(err) if is_unborn(&err) => None,
            Err(err) => return Err(err.into()),
        };
        let parents = parent.iter().collect::<Vec<_>>();

        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!("committed {oid}");

        Ok(oid)
    }

    /// Check if local branch has commits that remote-tracking branch lacks.
    ///
    /// An unborn branch has nothing to push. A born branch without a
    /// remote-tracking counterpart has never been pushed.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::DetachedHead`] if HEAD is not symbolic.
    /// - Return [`RepositoryError::Git2`] if references cannot be read.
    pub fn has_unpushed_commits(&self, remote_name: &str) -> Result<bool> {
        let branch = self.current_branch()?;
        let Some(local_oid) = self.resolve(&format!("refs/heads/{branch}"))? else {
            return Ok(false);
        };
        let Some(remote_oid) = self.resolve(&format!("refs/remotes/{remote_name}/{branch}"))?
        else {
            return Ok(true);
        };

        let (ahead, _) = self.repository.graph_ahead_behind(local_oid, remote_oid)?;
        Ok(ahead > 0)
    }

    /// Push current branch to branch of the same name on remote.
    ///
    /// Non-fast-forward updates are reported, never forced or retried.
    ///
    /// # Errors
    ///
    /// - Return [`RepositoryError::Rejected`] if remote refuses the update.
    /// - Return [`RepositoryError::Auth`] if remote refuses credentials.
    /// - Return [`RepositoryError::Network`] if remote cannot be reached.
    /// - Return [`RepositoryError::Git2`] for any other libgit2 failure.
    #[instrument(skip(self, credentials), level = "debug")]
    pub fn push(&self, remote_name: &str, credentials: &Credentials) -> Result<()> {
        let branch = self.current_branch()?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let mut remote = self.repository.find_remote(remote_name)?;
        let config = self.repository.config()?;
        self.start_progress(format!("push {branch} to {remote_name}"));

        let mut rejections = Vec::new();
        let result = {
            let bar = self.progress.clone();
            let mut rc = RemoteCallbacks::new();
            rc.credentials(credentials.authenticator.credentials(&config));
            rc.push_transfer_progress(move |current, total, _bytes| {
                bar.set_length(total as u64);
                bar.set_position(current as u64);
            });
            rc.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejections.push(format!("{refname}: {message}"));
                }
                Ok(())
            });

            let mut po = PushOptions::new();
            po.remote_callbacks(rc);
            remote.push(&[refspec.as_str()], Some(&mut po))
        };
        self.progress.finish_and_clear();
        result.map_err(transfer_error)?;

        if !rejections.is_empty() {
            return Err(RepositoryError::Rejected(rejections.join("; ")));
        }

        info!("pushed {branch} to {remote_name}");
        Ok(())
    }

    fn resolve(&self, refname: &str) -> Result<Option<Oid>> {
        match self.repository.refname_to_id(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn move_branch(&self, refname: &str, oid: Oid, log_message: &str) -> Result<()> {
        self.repository.reference(refname, oid, true, log_message)?;

        // INVARIANT: Working tree mirrors new tip, tracked content wins.
        self.repository
            .checkout_head(Some(CheckoutBuilder::new().force()))?;

        Ok(())
    }

    fn start_progress(&self, message: String) {
        self.progress.reset();
        self.progress.set_message(message);
        self.progress.enable_steady_tick(Duration::from_millis(100));
    }
}

/// Bound how long libgit2 waits on remote servers.
///
/// Applies to every fetch and push made afterwards in this process. Must not
/// be called while another thread is in the middle of a transfer.
///
/// # Errors
///
/// - Return [`RepositoryError::Git2`] if libgit2 refuses the setting.
pub(crate) fn set_transfer_timeout(timeout: Duration) -> Result<()> {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

    // SAFETY: Only called by Bootstrap::run, which performs its transfers
    // sequentially on the calling thread after this returns.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
        git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }

    debug!("libgit2 server timeout set to {millis}ms");
    Ok(())
}

fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

// Hosting providers answer 404 over HTTP, local paths fail to open.
fn is_missing_repository(err: &git2::Error) -> bool {
    let message = err.message();
    err.code() == ErrorCode::NotFound
        || (err.class() == ErrorClass::Http && message.contains("404"))
        || message.contains("could not find repository")
}

fn transfer_error(err: git2::Error) -> RepositoryError {
    match (err.class(), err.code()) {
        (_, ErrorCode::Auth) => RepositoryError::Auth(err),
        (_, ErrorCode::NotFastForward) => RepositoryError::Rejected(err.message().to_owned()),
        (ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh, _) => {
            RepositoryError::Network(err)
        }
        _ => RepositoryError::Git2(err),
    }
}

/// Repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Index matches HEAD.
    #[error("nothing to commit, working tree clean")]
    NothingToCommit,

    /// Commit identity lacks name or email.
    #[error("commit identity requires a non-empty name and email")]
    IdentityRequired,

    /// HEAD does not point to a branch.
    #[error("HEAD is detached, cannot determine current branch")]
    DetachedHead,

    /// Remote refused to update a reference.
    #[error("remote rejected push: {0}")]
    Rejected(String),

    /// No repository exists at remote URL.
    #[error("remote repository {url} does not exist; create it first, or use another remote URL")]
    RemoteNotFound {
        #[source]
        source: git2::Error,
        url: String,
    },

    /// Remote refused credentials.
    #[error("authentication with remote failed")]
    Auth(#[source] git2::Error),

    /// Remote cannot be reached.
    #[error("failed to reach remote")]
    Network(#[source] git2::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
type Result<T, E = RepositoryError> = std::result::Result<T, E>;
