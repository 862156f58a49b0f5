//! CLI command implementation

pub mod command;
pub mod error;
pub mod validate;

pub use command::{Cli, OutputFormat};
pub use error::CliError;
pub use validate::ValidationError;
