//! CLI response formatting and output.
//!
//! Provides the JSON envelope, printing, and exit code mapping.

use serde::Serialize;
use sfdelta::error::Hint;
use sfdelta::Error;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: if err.hints.is_empty() {
                    None
                } else {
                    Some(err.hints.clone())
                },
                retryable: err.retryable,
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) {
    use std::io::{self, Write};

    let payload = serde_json::to_string_pretty(response)
        .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"{}\"}}", e));
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Exit gracefully on SIGPIPE.
    let _ = writeln!(handle, "{}", payload);
}

/// Print a command result and return the process exit code: the command's
/// own code on success, 1 on any fatal error.
pub fn print_result<T: Serialize>(result: sfdelta::Result<(T, i32)>) -> i32 {
    match result {
        Ok((data, exit_code)) => {
            print_response(&CliResponse::success(data));
            exit_code
        }
        Err(err) => {
            print_response(&CliResponse::<()>::from_error(&err));
            1
        }
    }
}

pub fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
