//! CLI commands and argument parsing

pub mod commands;

pub use commands::Cli;
