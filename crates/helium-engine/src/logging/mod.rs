//! Logger initialization.
//!
//! Everything logs through the `log` facade; `env_logger` is installed once
//! at startup by the binary.

mod init;

pub use init::{LoggingConfig, init_logging};
