//! CLI module - argument parsing, subcommand runners and interactive prompts

pub mod args;
pub mod commands;
pub mod convert;
mod prompts;

pub use args::{Cli, Commands};
pub use prompts::*;
