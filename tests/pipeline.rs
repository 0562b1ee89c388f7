//! End-to-end pipeline runs against a stub platform CLI.
//!
//! The stub records every invocation and emits a canned JSON payload, which
//! is enough to observe which remote operations each run actually issues.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::Command;

use sfdelta::config::{resolve_with, ConfigFile, Configuration};
use sfdelta::git::RevisionPair;
use sfdelta::logger::{LogLevel, RunLog};
use sfdelta::orchestrator::{Orchestrator, PipelineState, RunOutcome, Stage};

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.email=ci@example.org", "-c", "user.name=CI"])
        .args(args)
        .current_dir(repo)
        .status()
        .expect("git not available");
    assert!(status.success(), "git {:?} failed", args);
}

fn write(repo: &Path, relative: &str, contents: &str) {
    let path = repo.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn commit_all(repo: &Path, message: &str) {
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-q", "-m", message]);
}

/// A repo whose delta adds a test class, modifies a class, and deletes one.
fn seeded_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q"]);
    write(dir.path(), "src/classes/Foo.cls", "public class Foo {}\n");
    write(dir.path(), "src/classes/Gone.cls", "public class Gone {}\n");
    commit_all(dir.path(), "baseline");

    write(dir.path(), "src/classes/Foo.cls", "public class Foo { Integer x; }\n");
    write(dir.path(), "src/classes/FooTest.cls", "@isTest\nprivate class FooTest {}\n");
    std::fs::remove_file(dir.path().join("src/classes/Gone.cls")).unwrap();
    commit_all(dir.path(), "delta");
    dir
}

/// Install a stub CLI that appends its arguments to `calls` and exits with
/// `exit_code`.
fn write_stub(dir: &Path, calls: &Path, exit_code: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("platform-cli");
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> \"{}\"\necho '{{\"status\":{},\"result\":{{}},\"message\":\"stub failure\"}}'\nexit {}\n",
        calls.display(),
        exit_code,
        exit_code
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn stub_config(dir: &Path, cli_path: &Path, dry_run: bool, retry_count: u32) -> Configuration {
    let key = dir.join("server.key");
    std::fs::write(&key, "---key---").unwrap();

    let file = ConfigFile {
        username: Some("deploy@example.org".to_string()),
        client_id: Some("client-123".to_string()),
        key_file: Some(key.display().to_string()),
        instance_url: Some("https://login.example.org".to_string()),
        cli_path: Some(cli_path.display().to_string()),
        retry_count: Some(retry_count),
        retry_delay_secs: Some(0),
        ..ConfigFile::default()
    };
    resolve_with(file, |_| None, dry_run, LogLevel::Debug).unwrap()
}

fn read_calls(calls: &Path) -> Vec<String> {
    std::fs::read_to_string(calls)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn head_pair() -> RevisionPair {
    RevisionPair {
        start: "HEAD~1".to_string(),
        end: "HEAD".to_string(),
    }
}

#[test]
fn full_run_deploys_validates_and_destroys() {
    let repo = seeded_repo();
    let aux = tempfile::tempdir().unwrap();
    let calls = aux.path().join("calls.log");
    let stub = write_stub(aux.path(), &calls, 0);
    let config = stub_config(aux.path(), &stub, false, 3);

    let log = RunLog::silent(LogLevel::Debug);
    let mut orchestrator = Orchestrator::new(config, &log, repo.path().to_path_buf()).unwrap();
    let workspace = orchestrator.workspace_root().to_path_buf();
    let report = orchestrator.run(&head_pair()).unwrap();

    assert_eq!(report.outcome, RunOutcome::Deployed);
    assert_eq!(orchestrator.state(), PipelineState::Done);
    assert!(!workspace.exists(), "workspace removed after a completed run");
    assert_eq!(report.changed_files, 3);
    assert_eq!(report.test_units.len(), 1);
    assert_eq!(report.test_units[0].name, "FooTest");

    let invocations = read_calls(&calls);
    assert_eq!(invocations.len(), 4, "auth, validate, deploy, destructive");
    assert!(invocations[0].contains("force:auth:jwt:grant"));
    assert!(invocations[1].contains("--checkonly"));
    assert!(invocations[1].contains("RunSpecifiedTests"));
    assert!(invocations[1].contains("FooTest"));
    assert!(invocations[2].contains("force:mdapi:deploy"));
    assert!(!invocations[2].contains("--checkonly"));
    assert!(invocations[3].contains("--ignorewarnings"));
}

#[test]
fn dry_run_authenticates_and_validates_but_never_deploys() {
    let repo = seeded_repo();
    let aux = tempfile::tempdir().unwrap();
    let calls = aux.path().join("calls.log");
    let stub = write_stub(aux.path(), &calls, 0);
    let config = stub_config(aux.path(), &stub, true, 3);

    let log = RunLog::silent(LogLevel::Debug);
    let mut orchestrator = Orchestrator::new(config, &log, repo.path().to_path_buf()).unwrap();
    let report = orchestrator.run(&head_pair()).unwrap();

    assert_eq!(report.outcome, RunOutcome::DryRun);
    assert_eq!(orchestrator.state(), PipelineState::Done);

    let invocations = read_calls(&calls);
    assert_eq!(invocations.len(), 2, "auth and check-only validation only");
    assert!(invocations[0].contains("force:auth:jwt:grant"));
    assert!(invocations[1].contains("--checkonly"));
    assert!(!invocations.iter().any(|c| c.contains("--ignorewarnings")));
}

#[test]
fn identical_revisions_no_op_without_any_remote_call() {
    let repo = seeded_repo();
    let aux = tempfile::tempdir().unwrap();
    let calls = aux.path().join("calls.log");
    let stub = write_stub(aux.path(), &calls, 0);
    let config = stub_config(aux.path(), &stub, false, 3);

    let log = RunLog::silent(LogLevel::Debug);
    let mut orchestrator = Orchestrator::new(config, &log, repo.path().to_path_buf()).unwrap();
    let pair = RevisionPair {
        start: "HEAD".to_string(),
        end: "HEAD".to_string(),
    };
    let report = orchestrator.run(&pair).unwrap();

    assert_eq!(report.outcome, RunOutcome::NoChanges);
    assert_eq!(orchestrator.state(), PipelineState::Done);
    assert!(report.package.is_empty());
    assert!(read_calls(&calls).is_empty(), "no remote calls for an empty diff");
}

#[test]
fn auth_exhaustion_fails_the_run_after_max_attempts() {
    let repo = seeded_repo();
    let aux = tempfile::tempdir().unwrap();
    let calls = aux.path().join("calls.log");
    let stub = write_stub(aux.path(), &calls, 1);
    let config = stub_config(aux.path(), &stub, false, 2);

    let log = RunLog::silent(LogLevel::Debug);
    let mut orchestrator = Orchestrator::new(config, &log, repo.path().to_path_buf()).unwrap();
    let workspace = orchestrator.workspace_root().to_path_buf();
    let err = orchestrator.run(&head_pair()).unwrap_err();

    assert_eq!(err.code.as_str(), "auth.failed");
    assert_eq!(err.details["attempts"], 2);
    assert_eq!(orchestrator.state(), PipelineState::Failed(Stage::Authenticate));
    assert_eq!(read_calls(&calls).len(), 2, "one invocation per attempt");
    assert!(!workspace.exists(), "workspace removed after a failed run");
}

#[test]
fn undeployable_diff_fails_package_generation_after_auth() {
    let repo = tempfile::tempdir().unwrap();
    git(repo.path(), &["init", "-q"]);
    write(repo.path(), "src/notes.txt", "baseline\n");
    commit_all(repo.path(), "baseline");
    write(repo.path(), "src/notes.txt", "changed\n");
    commit_all(repo.path(), "delta");

    let aux = tempfile::tempdir().unwrap();
    let calls = aux.path().join("calls.log");
    let stub = write_stub(aux.path(), &calls, 0);
    let config = stub_config(aux.path(), &stub, false, 3);

    let log = RunLog::silent(LogLevel::Debug);
    let mut orchestrator = Orchestrator::new(config, &log, repo.path().to_path_buf()).unwrap();
    let err = orchestrator.run(&head_pair()).unwrap_err();

    assert_eq!(err.code.as_str(), "package.no_deployable_metadata");
    assert!(!err.is_no_op(), "no deployable metadata is fatal, not a no-op");
    assert_eq!(orchestrator.state(), PipelineState::Failed(Stage::GeneratePackage));
    assert_eq!(read_calls(&calls).len(), 1, "authentication only");
}
