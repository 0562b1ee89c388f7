use std::path::{Path, PathBuf};

use clap::Args;

use sfdelta::config;
use sfdelta::git::{self, RevisionPair};
use sfdelta::logger::{LogLevel, RunLog};
use sfdelta::orchestrator::Orchestrator;
use sfdelta::workspace;
use sfdelta::{Error, RunReport};

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Start revision (the already-deployed baseline)
    pub start: String,

    /// End revision (the state to deploy)
    pub end: String,

    /// Path to a JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Authenticate and validate, but log the deploy commands instead of
    /// running them
    #[arg(long)]
    pub dry_run: bool,

    /// Log level (info|debug)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

pub fn run(args: DeployArgs) -> CmdResult<RunReport> {
    let level: LogLevel = args
        .log_level
        .parse()
        .map_err(|problem: String| Error::config_invalid_value("logLevel", problem))?;

    let log = RunLog::new(level);
    let config = config::resolve(args.config.as_deref(), args.dry_run, level)?;
    let repo = git::repo_root(Path::new("."))?;

    let mut orchestrator = Orchestrator::new(config, &log, repo)?;
    // An external interruption must release the workspace the same way a
    // normal exit does.
    workspace::register_interrupt_cleanup(orchestrator.cleanup_handle());

    let pair = RevisionPair {
        start: args.start,
        end: args.end,
    };
    let report = orchestrator.run(&pair)?;

    Ok((report, 0))
}
