//! Per-run scoped temporary workspace with guaranteed cleanup.
//!
//! The workspace holds the staged deploy tree, the destructive-change tree,
//! and the run log. Cleanup runs exactly once per run regardless of how the
//! run ends: normal completion, fatal error, or an interruption signal.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::{Error, Result};
use crate::core::logger::RunLog;

pub const DEPLOY_DIR: &str = "deploy";
pub const DESTRUCTIVE_DIR: &str = "destructive";
pub const LOG_FILE: &str = "run.log";

/// Shareable cleanup token. The atomic flag makes the release action
/// idempotent across the normal exit path and the signal handler.
#[derive(Clone)]
pub struct CleanupHandle {
    root: PathBuf,
    cleaned: Arc<AtomicBool>,
}

impl CleanupHandle {
    /// Remove the workspace tree. Returns true when this call performed the
    /// removal, false when cleanup had already run.
    pub fn run(&self) -> bool {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = std::fs::remove_dir_all(&self.root);
        true
    }
}

pub struct Workspace {
    root: PathBuf,
    handle: CleanupHandle,
}

impl Workspace {
    pub fn create() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("sfdelta-")
            .tempdir()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create workspace".to_string())))?;
        // Deletion is owned by the CleanupHandle, not the TempDir guard.
        let root = temp.keep();

        for dir in [DEPLOY_DIR, DESTRUCTIVE_DIR] {
            std::fs::create_dir_all(root.join(dir)).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create workspace {}", dir)))
            })?;
        }

        let handle = CleanupHandle {
            root: root.clone(),
            cleaned: Arc::new(AtomicBool::new(false)),
        };
        Ok(Self { root, handle })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.root.join(DEPLOY_DIR)
    }

    pub fn destructive_dir(&self) -> PathBuf {
        self.root.join(DESTRUCTIVE_DIR)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// Copy one repository file into the deploy tree, preserving its
    /// source-relative path.
    pub fn stage_source_file(&self, repo: &Path, relative: &Path) -> Result<()> {
        let target = self.deploy_dir().join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::internal_io(e.to_string(), Some("stage source file".to_string()))
            })?;
        }
        std::fs::copy(repo.join(relative), &target).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("stage {}", relative.display())),
            )
        })?;
        Ok(())
    }

    /// Write a generated artifact (manifest) into the workspace.
    pub fn write_file(&self, dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, contents)
            .map_err(|e| Error::internal_io(e.to_string(), Some(format!("write {}", name))))?;
        Ok(path)
    }

    pub fn cleanup_handle(&self) -> CleanupHandle {
        self.handle.clone()
    }

    pub fn cleanup(&self, log: &RunLog) {
        if self.handle.run() {
            log.info(format!("Workspace removed: {}", self.root.display()));
        }
    }
}

/// Hook the interruption signal to workspace cleanup. Registration failure
/// (a handler already installed, as happens under test harnesses) leaves the
/// normal exit-path cleanup in charge.
pub fn register_interrupt_cleanup(handle: CleanupHandle) {
    let _ = ctrlc::set_handler(move || {
        eprintln!("Interrupted; cleaning up workspace");
        handle.run();
        std::process::exit(130);
    });
}
