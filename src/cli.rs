// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `actionloop`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "actionloop",
    version,
    about = "Serve an action process over HTTP using the actionloop protocol.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `actionloop.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on, e.g. `0.0.0.0:8080`.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Log the action's stdout/stderr instead of passing them through.
    #[arg(long)]
    pub capture_output: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ACTIONLOOP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve and print the settings, but don't start the server.
    #[arg(long)]
    pub dry_run: bool,

    /// Action command and its arguments, overriding `[action].command`.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_arguments_form_the_action_command() {
        let args = CliArgs::try_parse_from([
            "actionloop",
            "--listen",
            "127.0.0.1:9000",
            "--",
            "/action/exec",
            "--flag",
        ])
        .unwrap();
        assert_eq!(args.listen.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(args.command, vec!["/action/exec", "--flag"]);
        assert!(args.config.is_none());
    }
}
