//! Shared plumbing for the SunSpec tools
//!
//! - `config`: layered application configuration (figment)
//! - `logging`: tracing subscriber setup with the bracketed level format

pub mod config;
pub mod error;
pub mod logging;

pub use config::{load_config, load_config_from_file, AppConfig, OutputFormat, TransportKind};
pub use error::{CommonError, Result};
pub use logging::{init_with_config, level_for_verbosity, LogConfig};
