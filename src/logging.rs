use std::{env, io::IsTerminal};

use tracing_subscriber::EnvFilter;

pub fn init_tracing_logger() {
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let env_filter = match rust_log.is_empty() {
        true => EnvFilter::builder().parse_lossy("info,redb=warn"),
        false => EnvFilter::builder().parse_lossy(rust_log),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(detect_ansi_support())
        .init();
}

pub fn detect_ansi_support() -> bool {
    // Logs piped into a file should stay plain text.
    if !std::io::stdout().is_terminal() {
        return false;
    }

    // Return whether terminal defined in TERM supports ANSI
    env::var("TERM")
        .map(|term| term != "dumb")
        .unwrap_or(false)
}
