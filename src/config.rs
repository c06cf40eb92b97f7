use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "netpoet";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size that triggers a drain.
pub const BATCH_THRESHOLD: usize = 5;

/// How often the consumer inspects the buffer.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Cooperative pause between captured packets on the producer side.
pub const CAPTURE_PACING: Duration = Duration::from_millis(100);

/// Filename of the persisted archive artifact.
pub const ARCHIVE_FILENAME: &str = "network_poetry_archive.json";

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("info,{APP_NAME}=debug")
}

/// Network interface to capture from (NETPOET_INTERFACE, default eth0).
pub fn interface() -> String {
    std::env::var("NETPOET_INTERFACE").unwrap_or_else(|_| "eth0".to_string())
}

/// Base URL of the generation service (NETPOET_GENERATE_URL).
pub fn generate_url() -> String {
    std::env::var("NETPOET_GENERATE_URL")
        .unwrap_or_else(|_| "http://localhost:11434".to_string())
}

/// Model identifier for generation (NETPOET_MODEL).
pub fn model() -> String {
    std::env::var("NETPOET_MODEL").unwrap_or_else(|_| "llama3:8b".to_string())
}

/// Poetry style (NETPOET_STYLE, default pessoa). An unrecognized value
/// logs a warning and falls back to the default.
pub fn style() -> crate::prompt::PoetryStyle {
    use crate::prompt::PoetryStyle;
    match std::env::var("NETPOET_STYLE") {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default style");
            PoetryStyle::Pessoa
        }),
        Err(_) => PoetryStyle::Pessoa,
    }
}

/// Get the application data directory.
/// ~/netpoet/ on all platforms (user-visible).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Where the archive is written (NETPOET_ARCHIVE overrides).
pub fn archive_path() -> PathBuf {
    match std::env::var("NETPOET_ARCHIVE") {
        Ok(p) => PathBuf::from(p),
        Err(_) => app_data_dir().join(ARCHIVE_FILENAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        if let Some(home) = dirs::home_dir() {
            let dir = app_data_dir();
            assert!(dir.starts_with(home));
            assert!(dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn poll_interval_exceeds_pacing() {
        // The consumer must tick slower than the producer yields, or a
        // single slow packet would starve the drain.
        assert!(POLL_INTERVAL > CAPTURE_PACING);
    }

    #[test]
    fn threshold_is_five() {
        assert_eq!(BATCH_THRESHOLD, 5);
    }

    #[test]
    fn default_filter_mentions_crate() {
        assert!(default_log_filter().contains("netpoet"));
    }
}
