//! CLI module for faqbuddy
//!
//! Handles command-line argument parsing and human-readable output.

pub mod args;
pub mod output;

pub use args::{Args, Commands, ConfigCommand, Verbosity};
