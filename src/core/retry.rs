//! Bounded retry for named remote operations.
//!
//! Fixed inter-attempt delay, no backoff: callers needing adaptive behavior
//! wrap this. Every attempt logs its start and outcome.

use std::time::Duration;

use crate::core::error::{Error, ErrorCode, Result};
use crate::core::logger::RunLog;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Successful outcome plus the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `operation` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between attempts. After exhausting the budget, the failure is converted to
/// the operation's terminal error code, carrying the operation name and
/// attempt count.
pub fn run_with_retry<T>(
    log: &RunLog,
    operation: &str,
    terminal_code: ErrorCode,
    policy: &RetryPolicy,
    mut op: impl FnMut() -> Result<T>,
) -> Result<Attempted<T>> {
    let mut attempt = 1;
    loop {
        log.info(format!(
            "{}: attempt {}/{}",
            operation, attempt, policy.max_attempts
        ));

        match op() {
            Ok(value) => {
                log.info(format!("{}: succeeded on attempt {}", operation, attempt));
                return Ok(Attempted { value, attempts: attempt });
            }
            Err(err) => {
                log.error(format!(
                    "{}: attempt {} failed: {}",
                    operation, attempt, err.message
                ));
                if attempt >= policy.max_attempts {
                    return Err(Error::operation_exhausted(
                        terminal_code,
                        operation,
                        attempt,
                        err.message,
                    ));
                }
                log.debug(format!(
                    "{}: retrying in {}s",
                    operation,
                    policy.delay.as_secs_f64()
                ));
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logger::LogLevel;
    use std::time::Instant;

    fn quiet() -> RunLog {
        RunLog::silent(LogLevel::Debug)
    }

    fn flaky(failures: u32) -> impl FnMut() -> Result<u32> {
        let mut calls = 0;
        move || {
            calls += 1;
            if calls <= failures {
                Err(Error::git_command_failed("transient"))
            } else {
                Ok(calls)
            }
        }
    }

    #[test]
    fn succeeds_immediately_without_sleeping() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        let started = Instant::now();
        let out = run_with_retry(&quiet(), "op", ErrorCode::AuthFailed, &policy, flaky(0)).unwrap();
        assert_eq!(out.attempts, 1);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn two_failures_then_success_waits_twice() {
        let delay = Duration::from_millis(20);
        let policy = RetryPolicy::new(3, delay);
        let started = Instant::now();
        let out = run_with_retry(&quiet(), "op", ErrorCode::DeployFailed, &policy, flaky(2)).unwrap();
        assert_eq!(out.attempts, 3);
        assert!(started.elapsed() >= delay * 2);
    }

    #[test]
    fn exhaustion_yields_terminal_error_after_max_attempts() {
        let delay = Duration::from_millis(10);
        let policy = RetryPolicy::new(3, delay);
        let started = Instant::now();
        let err = run_with_retry(&quiet(), "authenticate", ErrorCode::AuthFailed, &policy, || {
            Err::<u32, _>(Error::git_command_failed("down"))
        })
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::AuthFailed);
        assert_eq!(err.details["attempts"], 3);
        assert_eq!(err.details["operation"], "authenticate");
        // Delay applies between attempts only: M attempts, M-1 waits.
        assert!(started.elapsed() >= delay * 2);
    }
}
