//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FlakyConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults so the binary runs without a file
//! - Disruption parameters are constants, not configuration

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::FlakyConfig;
pub use schema::ListenerConfig;
pub use schema::{UpstreamConfig, UpstreamMode};
pub use validation::{validate_config, ValidationError};
