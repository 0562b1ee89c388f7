use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,
    ConfigKeyFileNotFound,

    CommitUnresolvable,

    AuthFailed,
    DeployValidationFailed,
    DeployFailed,
    DestructiveDeployFailed,

    PackageNoChanges,
    PackageNoDeployableMetadata,

    GitCommandFailed,
    PlatformCommandFailed,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigKeyFileNotFound => "config.key_file_not_found",

            ErrorCode::CommitUnresolvable => "commit.unresolvable",

            ErrorCode::AuthFailed => "auth.failed",
            ErrorCode::DeployValidationFailed => "deploy.validation_failed",
            ErrorCode::DeployFailed => "deploy.failed",
            ErrorCode::DestructiveDeployFailed => "deploy.destructive_failed",

            ErrorCode::PackageNoChanges => "package.no_changes",
            ErrorCode::PackageNoDeployableMetadata => "package.no_deployable_metadata",

            ErrorCode::GitCommandFailed => "git.command_failed",
            ErrorCode::PlatformCommandFailed => "platform.command_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OperationFailedDetails {
    operation: String,
    attempts: u32,
    last_error: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let details = serde_json::json!({ "key": key, "path": path });
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = serde_json::json!({ "path": path.into(), "error": err.to_string() });
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details,
        )
    }

    pub fn config_invalid_value(key: impl Into<String>, problem: impl Into<String>) -> Self {
        let key = key.into();
        let problem = problem.into();
        let details = serde_json::json!({ "key": key, "problem": problem });
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for '{}': {}", key, problem),
            details,
        )
    }

    pub fn config_key_file_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        let details = serde_json::json!({ "keyFile": path });
        Self::new(
            ErrorCode::ConfigKeyFileNotFound,
            format!("Key file not found: {}", path),
            details,
        )
    }

    pub fn commit_unresolvable(revision: impl Into<String>) -> Self {
        let revision = revision.into();
        let details = serde_json::json!({ "revision": revision });
        Self::new(
            ErrorCode::CommitUnresolvable,
            format!("Revision '{}' does not resolve to a commit", revision),
            details,
        )
    }

    /// Terminal error for a remote operation that exhausted its retry budget.
    pub fn operation_exhausted(
        code: ErrorCode,
        operation: impl Into<String>,
        attempts: u32,
        last_error: impl Into<String>,
    ) -> Self {
        let operation = operation.into();
        let details = serde_json::to_value(OperationFailedDetails {
            operation: operation.clone(),
            attempts,
            last_error: last_error.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        let mut err = Self::new(
            code,
            format!("{} failed after {} attempt(s)", operation, attempts),
            details,
        );
        err.retryable = Some(false);
        err
    }

    pub fn package_no_changes() -> Self {
        Self::new(
            ErrorCode::PackageNoChanges,
            "No changes detected between revisions",
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn package_no_deployable_metadata() -> Self {
        Self::new(
            ErrorCode::PackageNoDeployableMetadata,
            "No deployable metadata in changed files",
            Value::Object(serde_json::Map::new()),
        )
    }

    /// Single-attempt remote failure; the retry layer converts exhaustion
    /// into the stage-specific terminal code.
    pub fn platform_command_failed(message: impl Into<String>, exit_code: i32) -> Self {
        let details = serde_json::json!({ "exitCode": exit_code });
        let mut err = Self::new(ErrorCode::PlatformCommandFailed, message, details);
        err.retryable = Some(true);
        err
    }

    pub fn git_command_failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::GitCommandFailed,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({ "context": context });
        Self::new(ErrorCode::InternalIoError, error, details)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Recognized no-op conditions terminate the run successfully; every
    /// other code is fatal.
    pub fn is_no_op(&self) -> bool {
        matches!(self.code, ErrorCode::PackageNoChanges)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_is_distinguishable_from_fatal_package_error() {
        assert!(Error::package_no_changes().is_no_op());
        assert!(!Error::package_no_deployable_metadata().is_no_op());
    }

    #[test]
    fn exhausted_operation_carries_name_and_attempts() {
        let err = Error::operation_exhausted(ErrorCode::AuthFailed, "authenticate", 3, "boom");
        assert_eq!(err.code.as_str(), "auth.failed");
        assert_eq!(err.details["operation"], "authenticate");
        assert_eq!(err.details["attempts"], 3);
    }
}
