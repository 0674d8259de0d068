// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{RepoFixture, RepoKind};

use anyhow::Result;
use dotfyles::{
    repository::{Reconciled, RemoteSetup},
    AccessToken, CommitIdentity, Credentials, RepositoryError, RepositoryManager,
};
use git2::Repository;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{create_dir_all, remove_file, write},
    path::{Path, PathBuf},
};

fn identity() -> CommitIdentity {
    CommitIdentity::new("John Doe", "john@doe.com")
}

fn credentials() -> Credentials {
    Credentials::from_token(&AccessToken::new("unused"))
}

fn url(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn commit_file(manager: &RepositoryManager, dir: &Path, name: &str, contents: &str) -> Result<git2::Oid> {
    write(dir.join(name), contents)?;
    manager.stage_all()?;
    Ok(manager.commit(&format!("add {name}"), &identity())?)
}

fn root() -> Result<PathBuf> {
    Ok(std::env::current_dir()?)
}

#[sealed_test]
fn ensure_initialized_is_idempotent() -> Result<()> {
    let dir = root()?.join("dotfyles");
    create_dir_all(&dir)?;

    let first = RepositoryManager::ensure_initialized(&dir, "main")?;
    let oid = commit_file(&first, &dir, ".bashrc", "alias g=git\n")?;
    drop(first);

    let second = RepositoryManager::ensure_initialized(&dir, "main")?;
    assert_eq!(second.current_branch()?, "main");
    assert!(!second.has_staged_changes()?);
    assert!(!dir.join(".git").join(".git").exists());
    assert_eq!(Repository::open(&dir)?.head()?.target(), Some(oid));

    Ok(())
}

#[sealed_test]
fn ensure_initialized_keeps_existing_branch() -> Result<()> {
    let dir = root()?.join("dotfyles");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("trunk");
    Repository::init_opts(&dir, &opts)?;

    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;
    assert_eq!(manager.current_branch()?, "trunk");

    Ok(())
}

#[sealed_test]
fn ensure_remote_never_duplicates_or_overwrites() -> Result<()> {
    let dir = root()?.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;

    let first = manager.ensure_remote("origin", "https://blah.org/first.git")?;
    let second = manager.ensure_remote("origin", "https://blah.org/second.git")?;
    assert_eq!(first, RemoteSetup::Created);
    assert_eq!(second, RemoteSetup::Reused);

    let repo = Repository::open(&dir)?;
    let remotes = repo.remotes()?;
    assert_eq!(remotes.len(), 1);
    assert_eq!(repo.find_remote("origin")?.url(), Some("https://blah.org/first.git"));

    Ok(())
}

#[sealed_test]
fn commit_requires_identity() -> Result<()> {
    let dir = root()?.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;
    write(dir.join(".vimrc"), "set nu\n")?;
    manager.stage_all()?;

    let no_name = manager.commit("Initial commit", &CommitIdentity::new("", "john@doe.com"));
    let no_email = manager.commit("Initial commit", &CommitIdentity::new("John Doe", " "));
    assert!(matches!(no_name, Err(RepositoryError::IdentityRequired)));
    assert!(matches!(no_email, Err(RepositoryError::IdentityRequired)));
    assert!(Repository::open(&dir)?.head().is_err());

    Ok(())
}

#[sealed_test]
fn commit_with_clean_index_is_nothing_to_commit() -> Result<()> {
    let dir = root()?.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;

    manager.stage_all()?;
    assert!(matches!(
        manager.commit("Initial commit", &identity()),
        Err(RepositoryError::NothingToCommit)
    ));

    commit_file(&manager, &dir, ".zshrc", "bindkey -v\n")?;
    manager.stage_all()?;
    assert!(matches!(
        manager.commit("again", &identity()),
        Err(RepositoryError::NothingToCommit)
    ));

    Ok(())
}

#[sealed_test]
fn stage_all_picks_up_modifications_and_removals() -> Result<()> {
    let dir = root()?.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;
    commit_file(&manager, &dir, ".tmux.conf", "set -g mouse on\n")?;
    commit_file(&manager, &dir, ".profile", "export PATH\n")?;

    write(dir.join(".tmux.conf"), "set -g mouse off\n")?;
    remove_file(dir.join(".profile"))?;
    manager.stage_all()?;
    assert!(manager.has_staged_changes()?);

    let oid = manager.commit("update", &identity())?;
    let repo = Repository::open(&dir)?;
    let tree = repo.find_commit(oid)?.tree()?;
    assert!(tree.get_name(".tmux.conf").is_some());
    assert!(tree.get_name(".profile").is_none());

    Ok(())
}

#[sealed_test]
fn push_updates_remote_and_tracking_branch() -> Result<()> {
    let root = root()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let dir = root.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;
    manager.ensure_remote("origin", &url(&root.join("remote.git")))?;
    manager.fetch("origin", &credentials())?;
    assert_eq!(manager.reconcile("origin")?, Reconciled::NoRemoteBranch);
    assert!(!manager.has_unpushed_commits("origin")?);

    let oid = commit_file(&manager, &dir, ".gitconfig", "[user]\n")?;
    assert!(manager.has_unpushed_commits("origin")?);

    manager.push("origin", &credentials())?;
    assert_eq!(remote.branch_tip("main"), Some(oid));
    assert!(!manager.has_unpushed_commits("origin")?);

    Ok(())
}

#[sealed_test]
fn fetch_when_up_to_date_is_not_an_error() -> Result<()> {
    let root = root()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    remote.stage_and_commit("README.md", "dotfiles\n")?;

    let manager = RepositoryManager::ensure_initialized(root.join("dotfyles"), "main")?;
    manager.ensure_remote("origin", &url(&root.join("remote.git")))?;
    manager.fetch("origin", &credentials())?;
    manager.fetch("origin", &credentials())?;

    Ok(())
}

#[sealed_test]
fn fetch_from_unknown_remote_fails() -> Result<()> {
    let manager = RepositoryManager::ensure_initialized(root()?.join("dotfyles"), "main")?;
    assert!(manager.fetch("origin", &credentials()).is_err());

    Ok(())
}

#[sealed_test]
fn fetch_from_missing_repository_names_the_url() -> Result<()> {
    let root = root()?;
    let nowhere = root.join("nowhere.git");
    create_dir_all(&nowhere)?;

    let manager = RepositoryManager::ensure_initialized(root.join("dotfyles"), "main")?;
    manager.ensure_remote("origin", &url(&nowhere))?;
    match manager.fetch("origin", &credentials()) {
        Err(RepositoryError::RemoteNotFound { url: missing, .. }) => {
            assert_eq!(missing, url(&nowhere));
        }
        other => panic!("expected missing remote, got {other:?}"),
    }

    Ok(())
}

#[sealed_test]
fn reconcile_adopts_remote_history_into_unborn_branch() -> Result<()> {
    let root = root()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let seeded = remote.stage_and_commit("README.md", "dotfiles\n")?;

    let dir = root.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;
    manager.ensure_remote("origin", &url(&root.join("remote.git")))?;
    manager.fetch("origin", &credentials())?;

    assert_eq!(manager.reconcile("origin")?, Reconciled::AdoptedRemote);
    assert_eq!(Repository::open(&dir)?.head()?.target(), Some(seeded));
    assert_eq!(std::fs::read_to_string(dir.join("README.md"))?, "dotfiles\n");
    assert!(!manager.has_staged_changes()?);

    Ok(())
}

#[sealed_test]
fn reconcile_fast_forwards_and_detects_ahead() -> Result<()> {
    let root = root()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    remote.stage_and_commit("README.md", "dotfiles\n")?;

    let dir = root.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;
    manager.ensure_remote("origin", &url(&root.join("remote.git")))?;
    manager.fetch("origin", &credentials())?;
    manager.reconcile("origin")?;

    let newer = remote.stage_and_commit("LICENSE", "MIT\n")?;
    manager.fetch("origin", &credentials())?;
    assert_eq!(manager.reconcile("origin")?, Reconciled::FastForwarded);
    assert_eq!(Repository::open(&dir)?.head()?.target(), Some(newer));
    assert!(dir.join("LICENSE").exists());
    assert_eq!(manager.reconcile("origin")?, Reconciled::UpToDate);

    commit_file(&manager, &dir, ".vimrc", "set nu\n")?;
    assert_eq!(manager.reconcile("origin")?, Reconciled::Ahead);

    Ok(())
}

#[sealed_test]
fn diverged_push_is_rejected() -> Result<()> {
    let root = root()?;
    let remote = RepoFixture::new(root.join("remote.git"), RepoKind::Bare)?;
    let remote_tip = remote.stage_and_commit("README.md", "dotfiles\n")?;

    let dir = root.join("dotfyles");
    let manager = RepositoryManager::ensure_initialized(&dir, "main")?;
    commit_file(&manager, &dir, ".bashrc", "set -o vi\n")?;
    manager.ensure_remote("origin", &url(&root.join("remote.git")))?;
    manager.fetch("origin", &credentials())?;

    assert_eq!(manager.reconcile("origin")?, Reconciled::Diverged);
    assert!(matches!(
        manager.push("origin", &credentials()),
        Err(RepositoryError::Rejected(_))
    ));
    assert_eq!(remote.branch_tip("main"), Some(remote_tip));

    Ok(())
}
