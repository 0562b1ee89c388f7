//! The delta-deployment state machine.
//!
//! Sequences commit validation, authentication, package generation, deploy
//! validation, deployment, and destructive deployment. Progression is
//! strictly monotonic; a stage that exhausts its retry budget (or fails a
//! local validation) moves the pipeline to `Failed(stage)`, which is terminal.
//! Workspace cleanup runs on every exit path.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::classify::{self, TestUnit};
use crate::core::config::Configuration;
use crate::core::error::{Error, ErrorCode, Result};
use crate::core::git::{self, Presence, RevisionPair};
use crate::core::logger::RunLog;
use crate::core::manifest::{Manifest, ManifestBuilder, ManifestSet};
use crate::core::platform::{PlatformClient, TestSelection};
use crate::core::retry::{run_with_retry, RetryPolicy};
use crate::core::workspace::{CleanupHandle, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ValidateCommits,
    Authenticate,
    GeneratePackage,
    ValidateDeploy,
    Deploy,
    DestructiveDeploy,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ValidateCommits => "validate_commits",
            Stage::Authenticate => "authenticate",
            Stage::GeneratePackage => "generate_package",
            Stage::ValidateDeploy => "validate_deploy",
            Stage::Deploy => "deploy",
            Stage::DestructiveDeploy => "destructive_deploy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Configured,
    CommitsValidated,
    Authenticated,
    PackageGenerated,
    DeployValidated,
    Deployed,
    DestructiveDeployed,
    Done,
    Failed(Stage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Deployed,
    DryRun,
    NoChanges,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageAttempts {
    pub stage: Stage,
    pub attempts: u32,
}

/// End-of-run report, serialized to stdout as the command's JSON payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub state: PipelineState,
    pub outcome: RunOutcome,
    pub revisions: RevisionPair,
    pub changed_files: usize,
    pub package: Manifest,
    pub destructive: Manifest,
    pub test_units: Vec<TestUnit>,
    pub attempts: Vec<StageAttempts>,
    pub dry_run: bool,
}

pub struct Orchestrator<'a> {
    config: Configuration,
    log: &'a RunLog,
    repo: PathBuf,
    workspace: Workspace,
    state: PipelineState,
    attempts: Vec<StageAttempts>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: Configuration, log: &'a RunLog, repo: PathBuf) -> Result<Self> {
        let workspace = Workspace::create()?;
        log.attach_file(&workspace.log_path())?;
        log.debug(format!("Workspace: {}", workspace.root().display()));

        Ok(Self {
            config,
            log,
            repo,
            workspace,
            state: PipelineState::Init,
            attempts: Vec::new(),
        })
    }

    /// Token for wiring the interruption-signal handler to this run's
    /// workspace.
    pub fn cleanup_handle(&self) -> CleanupHandle {
        self.workspace.cleanup_handle()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn workspace_root(&self) -> &Path {
        self.workspace.root()
    }

    /// Drive the full pipeline. Cleanup runs whether the pipeline completes,
    /// no-ops, or fails. A recognized no-op surfaces as a successful
    /// `NoChanges` report; every other error stays fatal.
    pub fn run(&mut self, pair: &RevisionPair) -> Result<RunReport> {
        let result = match self.execute(pair) {
            Ok(report) => Ok(report),
            Err(err) if err.is_no_op() => {
                self.log.info(format!("{}; nothing to deploy", err.message));
                Ok(self.report(pair, RunOutcome::NoChanges, 0, empty_set(), Vec::new()))
            }
            Err(err) => {
                self.log.error(format!("Run failed: {}", err));
                Err(err)
            }
        };
        self.workspace.cleanup(self.log);
        result
    }

    fn execute(&mut self, pair: &RevisionPair) -> Result<RunReport> {
        self.transition(PipelineState::Configured);
        self.log.info(format!(
            "Deploying delta {}..{} for {} (dry run: {})",
            pair.start, pair.end, self.config.username, self.config.dry_run
        ));
        if let Some(batch) = self.config.test_batch_count {
            // Accepted and surfaced, but nothing consumes it yet.
            self.log.info(format!("Test batch count {} (reserved, unused)", batch));
        }

        let (start_hash, end_hash) = git::validate_pair(&self.repo, pair)
            .map_err(|e| self.fail(Stage::ValidateCommits, e))?;
        self.log
            .debug(format!("Resolved revisions {} -> {}", start_hash, end_hash));
        self.transition(PipelineState::CommitsValidated);

        // Diff before touching the platform: an empty diff is a recognized
        // no-op and must not trigger any remote call.
        let changed = git::changed_files(&self.repo, pair, &self.config.source_root)
            .map_err(|e| self.fail(Stage::GeneratePackage, e))?;

        if changed.is_empty() {
            self.transition(PipelineState::PackageGenerated);
            self.transition(PipelineState::Done);
            return Err(Error::package_no_changes());
        }

        let policy = RetryPolicy::new(self.config.retry_count, self.config.retry_delay);
        // The client borrows a snapshot so stage-failure bookkeeping can
        // take &mut self while remote closures are still alive.
        let config = self.config.clone();
        let platform = PlatformClient::new(&config, self.log);

        // Dry-run still authenticates: validation needs a live session.
        let auth = run_with_retry(self.log, "authenticate", ErrorCode::AuthFailed, &policy, || {
            platform.authenticate()
        })
        .map_err(|e| self.fail(Stage::Authenticate, e))?;
        self.record_attempts(Stage::Authenticate, auth.attempts);
        self.transition(PipelineState::Authenticated);

        let mut builder = ManifestBuilder::new(&self.config.source_root);
        for file in &changed {
            builder.record(file);
        }
        let set = builder
            .finish()
            .map_err(|e| self.fail(Stage::GeneratePackage, e))?;

        let test_units =
            classify::collect_test_units(&self.repo, &changed, &self.config.test_patterns);
        self.log.info(format!(
            "Package: {} member(s), destructive: {} member(s), test unit(s): {}",
            set.package.member_count(),
            set.destructive.member_count(),
            test_units.len()
        ));

        self.stage_package(&changed, &set)
            .map_err(|e| self.fail(Stage::GeneratePackage, e))?;
        self.transition(PipelineState::PackageGenerated);

        let selection = if test_units.is_empty() {
            TestSelection::LocalTests
        } else {
            TestSelection::Specified(test_units.iter().map(|u| u.name.clone()).collect())
        };

        let deploy_dir = self.workspace.deploy_dir();
        let validated = run_with_retry(
            self.log,
            "validate deploy",
            ErrorCode::DeployValidationFailed,
            &policy,
            || platform.validate_deploy(&deploy_dir, &selection),
        )
        .map_err(|e| self.fail(Stage::ValidateDeploy, e))?;
        self.record_attempts(Stage::ValidateDeploy, validated.attempts);
        self.transition(PipelineState::DeployValidated);

        if self.config.dry_run {
            self.log.info(format!(
                "DRY RUN would have run: {}",
                platform.describe_deploy(&deploy_dir, &selection)
            ));
        } else {
            let deployed = run_with_retry(self.log, "deploy", ErrorCode::DeployFailed, &policy, || {
                platform.deploy(&deploy_dir, &selection)
            })
            .map_err(|e| self.fail(Stage::Deploy, e))?;
            self.record_attempts(Stage::Deploy, deployed.attempts);
        }
        self.transition(PipelineState::Deployed);

        let destructive_dir = self.workspace.destructive_dir();
        if set.destructive.is_empty() {
            self.log.info("No destructive changes; skipping destructive deploy");
        } else if self.config.dry_run {
            self.log.info(format!(
                "DRY RUN would have run: {}",
                platform.describe_destructive(&destructive_dir)
            ));
        } else {
            let destroyed = run_with_retry(
                self.log,
                "destructive deploy",
                ErrorCode::DestructiveDeployFailed,
                &policy,
                || platform.deploy_destructive(&destructive_dir),
            )
            .map_err(|e| self.fail(Stage::DestructiveDeploy, e))?;
            self.record_attempts(Stage::DestructiveDeploy, destroyed.attempts);
        }
        self.transition(PipelineState::DestructiveDeployed);

        self.transition(PipelineState::Done);
        let outcome = if self.config.dry_run {
            RunOutcome::DryRun
        } else {
            RunOutcome::Deployed
        };
        Ok(self.report(pair, outcome, changed.len(), set, test_units))
    }

    /// Copy present files into the deploy tree and serialize both manifests.
    /// Destructive changes ship as their own deploy tree: an empty package
    /// manifest alongside the destructive-changes manifest.
    fn stage_package(&self, changed: &[git::ChangedFile], set: &ManifestSet) -> Result<()> {
        for file in changed {
            if file.presence == Presence::Present {
                self.workspace.stage_source_file(&self.repo, &file.path)?;
            }
        }

        let api = &self.config.api_version;
        self.workspace.write_file(
            &self.workspace.deploy_dir(),
            "package.xml",
            &set.package.to_xml(api),
        )?;

        if !set.destructive.is_empty() {
            self.workspace.write_file(
                &self.workspace.destructive_dir(),
                "package.xml",
                &Manifest::new().to_xml(api),
            )?;
            self.workspace.write_file(
                &self.workspace.destructive_dir(),
                "destructiveChanges.xml",
                &set.destructive.to_xml(api),
            )?;
        }

        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        self.log.debug(format!("State: {:?} -> {:?}", self.state, next));
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, err: Error) -> Error {
        self.state = PipelineState::Failed(stage);
        self.log
            .error(format!("Stage {} failed: {}", stage.as_str(), err.message));
        err
    }

    fn record_attempts(&mut self, stage: Stage, attempts: u32) {
        self.attempts.push(StageAttempts { stage, attempts });
    }

    fn report(
        &self,
        pair: &RevisionPair,
        outcome: RunOutcome,
        changed_files: usize,
        set: ManifestSet,
        test_units: Vec<TestUnit>,
    ) -> RunReport {
        RunReport {
            state: self.state,
            outcome,
            revisions: pair.clone(),
            changed_files,
            package: set.package,
            destructive: set.destructive,
            test_units,
            attempts: self.attempts.clone(),
            dry_run: self.config.dry_run,
        }
    }
}

fn empty_set() -> ManifestSet {
    ManifestSet {
        package: Manifest::new(),
        destructive: Manifest::new(),
    }
}
