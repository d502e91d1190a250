//! Dumpdex Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the Dumpdex workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`DumpdexError`] and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use dumpdex_common::logging::{init_logging, LogConfig};
//! use dumpdex_common::{DumpdexError, Result};
//!
//! fn start() -> Result<()> {
//!     let config = LogConfig::from_env().map_err(|e| DumpdexError::Config(e.to_string()))?;
//!     let _guard = init_logging(&config).map_err(|e| DumpdexError::Config(e.to_string()))?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{DumpdexError, Result};
