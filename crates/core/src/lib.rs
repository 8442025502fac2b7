//! vecquery core library
//!
//! Foundational pieces shared by every vecquery crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration and credential loading
//! - Retry timing for the HTTP clients

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

#[cfg(feature = "test-util")]
pub mod testing;

// Re-export commonly used types
pub use config::{ApiKey, AppConfig, ConfigOverrides};
pub use error::{AppError, AppResult};
