use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

/// Adaptive learning-path and IEP risk sidecar (JSON lines over stdin/stdout).
#[derive(Debug, Parser)]
#[command(name = "learnpathd", version)]
pub struct Config {
    /// Workspace directory to open at startup instead of waiting for `workspace.select`.
    #[arg(long, env = "LEARNPATHD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    #[arg(long, env = "LEARNPATHD_LOG_FORMAT", value_enum, default_value = "plain")]
    pub log_format: LogFormat,
}

/// Logs go to stderr; stdout carries IPC responses only.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LEARNPATHD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_workspace_and_format() {
        let cfg = Config::parse_from(["learnpathd", "--workspace", "/tmp/ws", "--log-format", "json"]);
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.log_format, LogFormat::Json);
    }
}
