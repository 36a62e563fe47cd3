// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::{ActionKind, CacheStorageMode};

/// Command-line arguments for `trellis`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "trellis",
    version,
    about = "Build, deploy, run and test project actions in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the project file (TOML).
    #[arg(long, value_name = "PATH", default_value = "trellis.toml")]
    pub config: String,

    /// Environment to resolve variables against.
    #[arg(long = "env", value_name = "NAME")]
    pub environment: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TRELLIS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Maximum number of tasks running at the same time.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Where task results are cached between runs.
    #[arg(long, value_enum, value_name = "MODE")]
    pub cache: Option<CacheArg>,

    /// Re-run requested actions even if a cached result matches.
    #[arg(long)]
    pub force: bool,

    /// Ignore cached results for every task.
    #[arg(long)]
    pub no_cache: bool,

    /// Print the planned tasks in dependency order without running them.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build actions (all enabled Build actions if no names are given).
    Build { names: Vec<String> },
    /// Deploy actions.
    Deploy { names: Vec<String> },
    /// Run actions.
    Run { names: Vec<String> },
    /// Test actions.
    Test { names: Vec<String> },
    /// Report deploy status (or the status of the given `<kind>.<name>` keys).
    Status { keys: Vec<String> },
    /// Print actions and their dependency edges.
    Graph,
    /// Resolve every action and print its version.
    Versions {
        /// Also write `.trellis-version` files.
        #[arg(long)]
        write: bool,
    },
}

impl Command {
    /// The action kind and names for the process commands.
    pub fn targets(&self) -> Option<(ActionKind, &[String])> {
        match self {
            Command::Build { names } => Some((ActionKind::Build, names)),
            Command::Deploy { names } => Some((ActionKind::Deploy, names)),
            Command::Run { names } => Some((ActionKind::Run, names)),
            Command::Test { names } => Some((ActionKind::Test, names)),
            _ => None,
        }
    }
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

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum CacheArg {
    Memory,
    File,
}

impl From<CacheArg> for CacheStorageMode {
    fn from(arg: CacheArg) -> Self {
        match arg {
            CacheArg::Memory => CacheStorageMode::Memory,
            CacheArg::File => CacheStorageMode::File,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_and_names() {
        let args = CliArgs::try_parse_from([
            "trellis", "--env", "local", "--force", "--concurrency", "2", "deploy", "web", "api",
        ])
        .unwrap();
        assert_eq!(args.environment.as_deref(), Some("local"));
        assert!(args.force);
        assert_eq!(args.concurrency, Some(2));
        let (kind, names) = args.command.targets().unwrap();
        assert_eq!(kind, ActionKind::Deploy);
        assert_eq!(names, ["web".to_string(), "api".to_string()]);
    }

    #[test]
    fn versions_accepts_write_flag() {
        let args = CliArgs::try_parse_from(["trellis", "versions", "--write"]).unwrap();
        assert!(matches!(args.command, Command::Versions { write: true }));
        assert!(args.command.targets().is_none());
    }
}
