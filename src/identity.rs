// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Commit author identity.
//!
//! Commits need an author. Where that author comes from depends on how
//! dotfyles is run: flags or the configuration file, the standard Git
//! environment variables, or an interactive prompt.

use inquire::Text;
use std::env;
use tracing::debug;

/// Name and email to author commits with.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    /// Construct new commit identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Both name and email are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.email.trim().is_empty()
    }
}

/// Capability to obtain a commit identity.
pub trait IdentityProvider {
    /// Obtain commit identity.
    fn identity(&self) -> Result<CommitIdentity>;
}

/// Identity known up front.
#[derive(Debug, Default, Clone)]
pub struct FixedIdentity(pub CommitIdentity);

impl IdentityProvider for FixedIdentity {
    fn identity(&self) -> Result<CommitIdentity> {
        Ok(self.0.clone())
    }
}

/// Identity from `GIT_AUTHOR_NAME` and `GIT_AUTHOR_EMAIL`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvIdentity;

impl IdentityProvider for EnvIdentity {
    fn identity(&self) -> Result<CommitIdentity> {
        Ok(CommitIdentity::new(
            env::var("GIT_AUTHOR_NAME").unwrap_or_default(),
            env::var("GIT_AUTHOR_EMAIL").unwrap_or_default(),
        ))
    }
}

/// Identity asked of the user through the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptIdentity;

impl IdentityProvider for PromptIdentity {
    fn identity(&self) -> Result<CommitIdentity> {
        let name = Text::new("Enter your Git username:").prompt()?;
        let email = Text::new("Enter your Git email:").prompt()?;

        Ok(CommitIdentity::new(name.trim(), email.trim()))
    }
}

/// First complete identity out of a chain of providers.
///
/// Missing fields of an incomplete identity are filled in by later
/// providers, so a name from one source can pair with an email of another.
#[derive(Default)]
pub struct FallbackIdentity {
    providers: Vec<Box<dyn IdentityProvider>>,
}

impl FallbackIdentity {
    /// Construct new empty provider chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append provider to chain.
    pub fn with(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

impl IdentityProvider for FallbackIdentity {
    fn identity(&self) -> Result<CommitIdentity> {
        let mut found = CommitIdentity::default();
        for provider in &self.providers {
            let identity = provider.identity()?;
            if found.name.trim().is_empty() {
                found.name = identity.name;
            }
            if found.email.trim().is_empty() {
                found.email = identity.email;
            }

            if found.is_complete() {
                break;
            }
        }

        debug!("resolved commit identity {} <{}>", found.name, found.email);
        Ok(found)
    }
}

/// Identity acquisition failures.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Interactive prompt failed or was cancelled.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),
}

/// Friendly result alias :3
type Result<T, E = IdentityError> = std::result::Result<T, E>;
