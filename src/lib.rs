pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `sfdelta::manifest` instead of `sfdelta::core::manifest`
pub use crate::core::*;
