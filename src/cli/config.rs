use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::flows::flow_model::SavePolicy;
use crate::forms::form_model::ScannerOptions;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "vault-autofill",
    version,
    about = "Form detection and save/fill flow engine for a credential manager"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: vault-autofill.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect and classify the forms of a page
    Scan {
        /// HTML file to scan
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        file: Option<String>,

        /// URL to fetch and scan
        #[arg(long)]
        url: Option<String>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Drive the background coordinator from a YAML script
    Replay {
        /// Path to the replay script
        #[arg(long)]
        script: String,

        /// Append flow transitions to this JSONL file
        #[arg(long)]
        trace: Option<String>,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `vault-autofill.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub flows: FlowsConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsConfig {
    #[serde(default = "default_retries")]
    pub save_retries: u32,

    #[serde(default = "default_timeout_ms")]
    pub save_timeout_ms: u64,

    #[serde(default = "default_retry_time_ms")]
    pub save_retry_time_ms: u64,
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            save_retries: 3,
            save_timeout_ms: 10_000,
            save_retry_time_ms: 1_000,
        }
    }
}

impl FlowsConfig {
    pub fn save_policy(&self) -> SavePolicy {
        SavePolicy {
            retries: self.save_retries,
            timeout_ms: self.save_timeout_ms,
            retry_time_ms: self.save_retry_time_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_true")]
    pub second_pass: bool,

    #[serde(default = "default_true")]
    pub prune_removed: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            second_pass: true,
            prune_removed: true,
        }
    }
}

impl ScannerConfig {
    pub fn options(&self) -> ScannerOptions {
        ScannerOptions {
            second_pass: self.second_pass,
            prune_removed: self.prune_removed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    pub trace_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            trace_file: None,
        }
    }
}

// Serde default helpers
fn default_retries() -> u32 { 3 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_retry_time_ms() -> u64 { 1_000 }
fn default_true() -> bool { true }
fn default_level() -> String { "warn".to_string() }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or("vault-autofill.yaml");
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    }
}

/// Log filter directive: `-v` count wins over the config file level.
pub fn log_level(verbose: u8, config: &AppConfig) -> String {
    match verbose {
        0 => config.logging.level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
