use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use spinup::{DEFAULT_MAX_MODEL_LEN, DEFAULT_MODEL, DEFAULT_PORT, READY_MARKER, RetryPolicy};

/// CLI for spinup
#[derive(Parser, Debug)]
#[command(
    name = "spinup",
    version,
    about = "Start a server process and wait for log-confirmed readiness"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch an OpenAI-compatible model server and wait until it is ready
    Serve {
        /// Model identifier to load
        #[arg(default_value = DEFAULT_MODEL)]
        model: String,

        /// Port for the HTTP endpoint
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Maximum model context length
        #[arg(default_value_t = DEFAULT_MAX_MODEL_LEN)]
        max_model_len: u32,

        /// Readiness marker expected in the server log
        #[arg(long, default_value = READY_MARKER)]
        marker: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Launch an arbitrary command and wait until it is ready
    Exec {
        /// Readiness marker expected in the command's output
        #[arg(long)]
        marker: String,

        /// Service name used for the log file (defaults to the executable name)
        #[arg(long)]
        name: Option<String>,

        /// Environment variables for the child
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Command line to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Total number of launch attempts
    #[arg(long, default_value_t = 2)]
    pub attempts: u32,

    /// Per-attempt startup budget in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Delay between readiness checks in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub poll_ms: u64,

    /// Directory for per-service log files
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

impl CommonArgs {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts,
            startup_timeout_secs: self.timeout_secs,
            poll_interval_ms: self.poll_ms,
            ..RetryPolicy::default()
        }
    }
}

/// Parse KEY=VALUE pairs from repeated --env flags
pub fn parse_env_pairs(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("invalid --env value '{pair}', expected KEY=VALUE"))
        })
        .collect()
}
