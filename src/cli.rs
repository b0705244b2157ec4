use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Find default config path with priority:
/// 1. /etc/arrsweep/config.yaml (system-wide, preferred)
/// 2. ~/.config/arrsweep/config.yaml (user-specific)
/// 3. Fallback to /etc even if doesn't exist
pub fn default_config_path() -> PathBuf {
    let etc_path = PathBuf::from("/etc/arrsweep/config.yaml");

    if etc_path.exists() {
        return etc_path;
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user_path = config_dir.join("arrsweep/config.yaml");
        if user_path.exists() {
            return user_path;
        }
    }

    etc_path
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "arrsweep")]
#[command(version)]
#[command(about = "Cleans stuck downloads out of *arr queues and download clients", long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single cleanup cycle and exit
    Run {
        /// Path to configuration file
        #[arg(short, long, value_name = "FILE", default_value_os_t = default_config_path())]
        config: PathBuf,

        /// Dry-run mode: log every action without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Run cleanup cycles periodically until interrupted
    Daemon {
        /// Path to configuration file
        #[arg(short, long, value_name = "FILE", default_value_os_t = default_config_path())]
        config: PathBuf,

        /// Dry-run mode: log every action without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Interval between cycles (in seconds)
        #[arg(short, long, value_name = "SECONDS", default_value = "300")]
        interval: u64,
    },

    /// Validate the configuration and test connectivity to every service
    Check {
        /// Path to configuration file
        #[arg(short, long, value_name = "FILE", default_value_os_t = default_config_path())]
        config: PathBuf,
    },
}
