//! Command-line argument parsing for faqbuddy
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// faqbuddy - grounded answers about the product catalog
#[derive(Parser, Debug)]
#[command(name = "faqbuddy")]
#[command(version)]
#[command(about = "Answer product questions from FAQ and documentation indexes", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only the answer is printed)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer one question
    Ask {
        /// The customer question
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Answer locale, e.g. en or pt-BR
        #[arg(short, long, default_value = "en")]
        locale: String,

        /// Product of interest, e.g. pix
        #[arg(short, long)]
        product: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or initialize configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Parse the config file spelling
    pub fn from_config(value: &str) -> Self {
        match value {
            "quiet" => Verbosity::Quiet,
            "verbose" => Verbosity::Verbose,
            "very_verbose" => Verbosity::VeryVerbose,
            _ => Verbosity::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Tracing filter directive for this level
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn,faqbuddy=info",
            Verbosity::Verbose => "info,faqbuddy=debug",
            Verbosity::VeryVerbose => "debug,faqbuddy=trace",
        }
    }

    /// Check if should show diagnostics after the answer
    pub fn show_diagnostics(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
