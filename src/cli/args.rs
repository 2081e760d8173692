//! Command-line argument parsing for filebridge
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// filebridge - stream chat completions through a pair of mailbox files
#[derive(Parser, Debug)]
#[command(name = "filebridge")]
#[command(version)]
#[command(about = "Turn a local request file into a channel for a streaming completion server", long_about = None)]
pub struct Args {
    /// Request file to watch (default: input.txt)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Response file to stream into (default: output.txt)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Chat-completion endpoint URL
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Delay before reading the request file after a notification
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Check that the completion server is reachable and list its models
    Check,

    /// Display the effective configuration
    Config,
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
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Log level forced by the flags; `None` defers to the config file
    pub fn log_level(&self) -> Option<&'static str> {
        match self {
            Verbosity::Quiet => Some("warn"),
            Verbosity::Normal => None,
            Verbosity::Verbose => Some("debug"),
            Verbosity::VeryVerbose => Some("trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("filebridge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert!(args.input.is_none());
        assert!(args.endpoint.is_none());
        assert!(args.command.is_none());
        assert_eq!(args.verbosity(), Verbosity::Normal);
    }

    #[test]
    fn test_paths_and_endpoint() {
        let args = parse(&[
            "-i",
            "req.json",
            "--output",
            "answer.txt",
            "--endpoint",
            "http://127.0.0.1:8080/v1/chat/completions",
            "--debounce-ms",
            "0",
        ]);
        assert_eq!(args.input, Some(PathBuf::from("req.json")));
        assert_eq!(args.output, Some(PathBuf::from("answer.txt")));
        assert_eq!(args.debounce_ms, Some(0));
        assert!(args.endpoint.unwrap().contains("8080"));
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["-q"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["-v"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["-vv"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Args::try_parse_from(["filebridge", "-q", "-v"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(parse(&["check"]).command, Some(Commands::Check));
        assert_eq!(parse(&["config"]).command, Some(Commands::Config));
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(Verbosity::Quiet.log_level(), Some("warn"));
        assert_eq!(Verbosity::Normal.log_level(), None);
        assert_eq!(Verbosity::VeryVerbose.log_level(), Some("trace"));
        assert_eq!(Verbosity::Verbose.as_str(), "verbose");
    }
}
