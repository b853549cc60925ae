use clap::Parser;
use std::path::PathBuf;

/// Shoptalk - tool-augmented conversational agent backend
#[derive(Parser, Debug, Clone)]
#[command(name = "shoptalk", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SHOPTALK_CONFIG", default_value = "shoptalk.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "SHOPTALK_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "SHOPTALK_PORT")]
    pub port: Option<u16>,

    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, env = "SHOPTALK_LOG_LEVEL")]
    pub log_level: Option<String>,
}
