use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "regwatch",
    about = "Follow company and entrepreneur registry changes in real time",
    version,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API base URL (overrides config and REGWATCH_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// API token (overrides config and REGWATCH_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream live notifications until interrupted
    Watch {
        /// Output format for notifications
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,

        /// Skip loading recent history before streaming
        #[arg(long)]
        no_history: bool,

        /// Number of history entries to load first
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show recent changes
    History {
        /// Number of entries to fetch
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,

        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Mark one notification as read on the server
    MarkRead {
        /// Notification id
        id: String,
    },

    /// Mark every notification as read on the server
    MarkAllRead,

    /// Show or change notification settings
    Settings {
        /// Alert on every new notification
        #[arg(long)]
        show_toasts: Option<bool>,

        /// Only keep changes flagged as significant
        #[arg(long)]
        only_significant: Option<bool>,

        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Pretty,
    /// One JSON document per line
    Json,
}
