// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotfyles::{
    identity::{EnvIdentity, FallbackIdentity, FixedIdentity, PromptIdentity},
    locate,
    path::default_config_path,
    sync::PushOutcome,
    Bootstrap, CommitIdentity, DeviceAuthClient, LocatedKind, RepositoryError, Settings, SyncError,
    SyncPlan,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  dotfyles [options] <dotfyles-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Configuration file to use instead of the default one.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let settings = load_settings(self.config)?;
        match self.command {
            Command::Init(opts) => run_init(settings, opts),
            Command::Locate(opts) => run_locate(settings, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Gather dotfiles into a repository, and push it to your account.
    #[command(override_usage = "dotfyles init [options]")]
    Init(InitOptions),

    /// List which dotfiles would be gathered, and where to.
    #[command(override_usage = "dotfyles locate [options]")]
    Locate(LocateOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Directory to gather dotfiles into.
    #[arg(short, long, value_name = "path")]
    pub target_dir: Option<PathBuf>,

    /// Remote repository to push to.
    #[arg(short, long, value_name = "url")]
    pub url: Option<String>,

    /// Commit author name.
    #[arg(short, long, value_name = "name")]
    pub name: Option<String>,

    /// Commit author email.
    #[arg(short, long, value_name = "email")]
    pub email: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LocateOptions {
    /// Directory to gather dotfiles into.
    #[arg(short, long, value_name = "path")]
    pub target_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer().compact();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (default_config_path()?, false),
    };

    if !required && !path.exists() {
        return Ok(Settings::default());
    }

    let data = read_to_string(&path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    let settings: Settings = data
        .parse()
        .with_context(|| format!("failed to parse configuration {}", path.display()))?;
    info!("loaded configuration {}", path.display());
    debug!("effective configuration:\n{settings}");

    Ok(settings)
}

fn run_init(mut settings: Settings, opts: InitOptions) -> Result<()> {
    if opts.target_dir.is_some() {
        settings.target_dir = opts.target_dir;
    }
    if opts.url.is_some() {
        settings.remote.url = opts.url;
    }

    let configured = settings.identity.clone().unwrap_or_default();
    let identity = FallbackIdentity::new()
        .with(FixedIdentity(CommitIdentity::new(
            opts.name.unwrap_or(configured.name),
            opts.email.unwrap_or(configured.email),
        )))
        .with(EnvIdentity)
        .with(PromptIdentity);

    let plan = SyncPlan::from_settings(&settings)?;
    let auth = DeviceAuthClient::from_settings(&settings.auth);
    let result = Bootstrap::new(auth, identity, plan)
        .with_progress(ProgressBar::new(0))
        .run(|session| {
            println!(
                "Please go to {} and enter the code: {}",
                session.verification_uri, session.user_code
            );
        });
    let report = match result {
        Ok(report) => report,
        Err(err @ SyncError::Repository(RepositoryError::RemoteNotFound { .. })) => {
            return Err(anyhow::Error::new(err)
                .context("create the repository on your account, or pass --url <url>"));
        }
        Err(err) => return Err(err.into()),
    };

    if report.failures() > 0 {
        warn!("{} dotfile(s) could not be gathered", report.failures());
    }
    if let Some(oid) = report.commit {
        info!("committed gathered dotfiles as {oid}");
    }
    match report.push {
        PushOutcome::Pushed => info!("pushed dotfyles to {}", report.remote_url),
        PushOutcome::NothingToPush => info!("nothing to push to {}", report.remote_url),
    }

    Ok(())
}

fn run_locate(mut settings: Settings, opts: LocateOptions) -> Result<()> {
    if opts.target_dir.is_some() {
        settings.target_dir = opts.target_dir;
    }

    let plan = SyncPlan::from_settings(&settings)?;
    for entry in locate(&plan.manifest, &plan.home_dir, &plan.target_dir) {
        let kind = match entry.kind {
            LocatedKind::File => "file",
            LocatedKind::Directory => "directory",
            LocatedKind::Missing => "missing",
        };
        println!("{kind:<10} {} -> {}", entry.source.display(), entry.dest.display());
    }

    Ok(())
}
