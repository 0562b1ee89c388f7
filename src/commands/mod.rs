pub mod deploy;

/// Command output paired with the process exit code it maps to.
pub type CmdResult<T> = sfdelta::Result<(T, i32)>;
