//! Timestamped, level-tagged run log.
//!
//! Every pipeline event is written as one `[timestamp] [level] message` line,
//! mirrored to stdout and (once the workspace exists) appended to the run's
//! log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("Unknown log level '{}' (expected info|debug)", other)),
        }
    }
}

pub struct RunLog {
    level: LogLevel,
    file: Mutex<Option<File>>,
    mirror_stdout: bool,
}

impl RunLog {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            file: Mutex::new(None),
            mirror_stdout: true,
        }
    }

    /// Log without the stdout mirror. Used by tests to keep output quiet.
    pub fn silent(level: LogLevel) -> Self {
        Self {
            level,
            file: Mutex::new(None),
            mirror_stdout: false,
        }
    }

    /// Start appending log lines to `path` in addition to stdout.
    ///
    /// The log file lives inside the workspace, which does not exist until
    /// after configuration resolves, so attachment is deferred.
    pub fn attach_file(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("open log file {}", path.display())))
            })?;
        if let Ok(mut guard) = self.file.lock() {
            *guard = Some(file);
        }
        Ok(())
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write("INFO", message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if self.level >= LogLevel::Debug {
            self.write("DEBUG", message.as_ref());
        }
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write("ERROR", message.as_ref());
    }

    fn write(&self, tag: &str, message: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] [{}] {}", timestamp, tag, message);

        if self.mirror_stdout {
            println!("{}", line);
        }

        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                // Log-file write failures must not take down the pipeline.
                let _ = writeln!(file, "{}", line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("trace".parse::<LogLevel>().is_err());
    }

    #[test]
    fn attached_file_receives_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");

        let log = RunLog::silent(LogLevel::Info);
        log.attach_file(&path).unwrap();
        log.info("hello");
        log.debug("hidden at info level");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[INFO] hello"));
        assert!(!contents.contains("hidden"));
    }
}
