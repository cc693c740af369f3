//! Command-line interface.
//!
//! Argument definitions live in `commands`, text and JSON rendering in
//! `output`, the apply confirmation in `prompt`. Wiring them to the
//! planner is done by the binary.

mod commands;
mod output;
mod prompt;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, Selection};
pub use output::OutputFormatter;
pub use prompt::confirm;
