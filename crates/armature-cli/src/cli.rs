use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and trees
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Parser)]
#[command(name = "arma")]
#[command(about = "arma - build and inspect metadata-driven forms")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses the config file value or defaults to 'off'
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/armature/config.{toml,yaml})
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Set output format (table, json)
    #[arg(short = 'f', long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Readiness deadline in milliseconds (overrides config file)
    #[arg(long, global = true)]
    pub ready_timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Construct the widget tree described by a form file
    Build {
        /// Form metadata file (.json, .yaml or .yml)
        file: PathBuf,
    },

    /// Parse and validate a form file without building it
    Validate {
        /// Form metadata file (.json, .yaml or .yml)
        file: PathBuf,
    },

    /// List the widget kinds registered by the default composition root
    Kinds,
}
