//! Command handlers for the vecquery CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod index;
mod input;
pub mod run;
pub mod setup_env;
pub mod shell;

// Re-export command types for convenience
pub use index::{DeleteCommand, InitCommand, SearchCommand, StatsCommand};
pub use run::RunCommand;
pub use setup_env::SetupEnvCommand;
pub use shell::ShellCommand;
