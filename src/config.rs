use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about = "A small message board backed by a JSON file", long_about = None)]
pub struct Config {
    /// Host to listen on
    #[arg(long, env = "PRIKBORD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PRIKBORD_PORT", default_value_t = 3000)]
    pub port: u16,

    /// JSON file holding all messages, created on first start
    #[arg(long, env = "PRIKBORD_DATA_FILE", default_value = "messages.json")]
    pub data_file: PathBuf,

    /// Directory with a front-end to serve under `/`
    #[arg(long, env = "PRIKBORD_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    #[arg(long, env = "PRIKBORD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
