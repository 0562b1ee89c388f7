//! Boundary to the remote platform's command-line tool.
//!
//! Every operation is an opaque external command invoked with `--json`,
//! returning a structured payload and an exit status. Authentication,
//! validation, and deployment semantics live entirely on the other side of
//! this boundary.

use std::path::Path;

use serde_json::Value;

use crate::core::config::Configuration;
use crate::core::error::{Error, Result};
use crate::core::logger::RunLog;
use crate::utils::command;

/// Which tests the deploy operations ask the platform to run.
#[derive(Debug, Clone)]
pub enum TestSelection {
    /// Run exactly the named test units.
    Specified(Vec<String>),
    /// Fallback when no changed test units were detected.
    LocalTests,
}

impl TestSelection {
    fn args(&self) -> Vec<String> {
        match self {
            TestSelection::Specified(units) => vec![
                "--testlevel".to_string(),
                "RunSpecifiedTests".to_string(),
                "--runtests".to_string(),
                units.join(","),
            ],
            TestSelection::LocalTests => {
                vec!["--testlevel".to_string(), "RunLocalTests".to_string()]
            }
        }
    }
}

pub struct PlatformClient<'a> {
    config: &'a Configuration,
    log: &'a RunLog,
}

impl<'a> PlatformClient<'a> {
    pub fn new(config: &'a Configuration, log: &'a RunLog) -> Self {
        Self { config, log }
    }

    pub fn authenticate(&self) -> Result<Value> {
        let args = self.auth_args();
        self.invoke(&args, "authenticate")
    }

    pub fn validate_deploy(&self, deploy_dir: &Path, tests: &TestSelection) -> Result<Value> {
        let args = self.deploy_args(deploy_dir, tests, true);
        self.invoke(&args, "validate deploy")
    }

    pub fn deploy(&self, deploy_dir: &Path, tests: &TestSelection) -> Result<Value> {
        let args = self.deploy_args(deploy_dir, tests, false);
        self.invoke(&args, "deploy")
    }

    pub fn deploy_destructive(&self, destructive_dir: &Path) -> Result<Value> {
        let args = self.destructive_args(destructive_dir);
        self.invoke(&args, "destructive deploy")
    }

    /// Render the command line an operation would issue. Dry-run logging
    /// uses this instead of executing.
    pub fn describe_deploy(&self, deploy_dir: &Path, tests: &TestSelection) -> String {
        self.render(&self.deploy_args(deploy_dir, tests, false))
    }

    pub fn describe_destructive(&self, destructive_dir: &Path) -> String {
        self.render(&self.destructive_args(destructive_dir))
    }

    fn auth_args(&self) -> Vec<String> {
        vec![
            "force:auth:jwt:grant".to_string(),
            "--clientid".to_string(),
            self.config.client_id.clone(),
            "--jwtkeyfile".to_string(),
            self.config.key_file.display().to_string(),
            "--username".to_string(),
            self.config.username.clone(),
            "--instanceurl".to_string(),
            self.config.instance_url.clone(),
            "--json".to_string(),
        ]
    }

    fn deploy_args(&self, deploy_dir: &Path, tests: &TestSelection, check_only: bool) -> Vec<String> {
        let mut args = vec![
            "force:mdapi:deploy".to_string(),
            "--deploydir".to_string(),
            deploy_dir.display().to_string(),
            "--wait".to_string(),
            "-1".to_string(),
        ];
        if check_only {
            args.push("--checkonly".to_string());
        }
        args.extend(tests.args());
        args.push("--json".to_string());
        args
    }

    fn destructive_args(&self, destructive_dir: &Path) -> Vec<String> {
        vec![
            "force:mdapi:deploy".to_string(),
            "--deploydir".to_string(),
            destructive_dir.display().to_string(),
            "--wait".to_string(),
            "-1".to_string(),
            "--ignorewarnings".to_string(),
            "--json".to_string(),
        ]
    }

    fn render(&self, args: &[String]) -> String {
        format!("{} {}", self.config.cli_path, args.join(" "))
    }

    fn invoke(&self, args: &[String], context: &str) -> Result<Value> {
        self.log.debug(format!("Running: {}", self.render(args)));

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = command::capture_in(Path::new("."), &self.config.cli_path, &arg_refs, context)?;

        let payload: Value = serde_json::from_str(output.stdout.trim()).unwrap_or(Value::Null);

        if !output.success {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| command_error_text(&output));
            return Err(Error::platform_command_failed(
                format!("{} failed: {}", context, message),
                output.exit_code,
            ));
        }

        Ok(payload)
    }
}

fn command_error_text(output: &command::CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        output.stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{resolve_with, ConfigFile};
    use crate::core::logger::{LogLevel, RunLog};

    fn config() -> (tempfile::TempDir, Configuration) {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("server.key");
        std::fs::write(&key, "---key---").unwrap();

        let file = ConfigFile {
            username: Some("deploy@example.org".to_string()),
            client_id: Some("client-123".to_string()),
            key_file: Some(key.display().to_string()),
            instance_url: Some("https://login.example.org".to_string()),
            ..ConfigFile::default()
        };
        let config = resolve_with(file, |_| None, false, LogLevel::Info).unwrap();
        (dir, config)
    }

    #[test]
    fn specified_tests_render_as_comma_joined_list() {
        let selection = TestSelection::Specified(vec!["FooTest".to_string(), "BarTest".to_string()]);
        let args = selection.args();
        assert_eq!(args[1], "RunSpecifiedTests");
        assert_eq!(args[3], "FooTest,BarTest");
    }

    #[test]
    fn check_only_flag_distinguishes_validation_from_deploy() {
        let (_dir, config) = config();
        let log = RunLog::silent(LogLevel::Info);
        let client = PlatformClient::new(&config, &log);

        let validate = client.deploy_args(Path::new("/tmp/d"), &TestSelection::LocalTests, true);
        let deploy = client.deploy_args(Path::new("/tmp/d"), &TestSelection::LocalTests, false);
        assert!(validate.contains(&"--checkonly".to_string()));
        assert!(!deploy.contains(&"--checkonly".to_string()));
    }

    #[test]
    fn described_command_names_the_configured_tool() {
        let (_dir, config) = config();
        let log = RunLog::silent(LogLevel::Info);
        let client = PlatformClient::new(&config, &log);

        let rendered = client.describe_destructive(Path::new("/tmp/x"));
        assert!(rendered.starts_with("sfdx force:mdapi:deploy"));
        assert!(rendered.contains("--ignorewarnings"));
    }
}
