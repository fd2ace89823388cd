use bon::Builder;
use chrono::Utc;
use getset::Getters;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Sink for retention reports.
pub trait RetentionLogger {
    fn log_message(&self, text: &str);
}

/// Forwards reports to `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl RetentionLogger for TracingLogger {
    fn log_message(&self, text: &str) {
        info!("{text}");
    }
}

/// Appends reports to a file, one report per write.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct FileLogger {
    #[builder(into)]
    path: PathBuf,
    /// Prefix every report with an RFC 3339 timestamp.
    #[builder(default = true)]
    with_timestamp: bool,
}

impl FileLogger {
    fn append(&self, text: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if self.with_timestamp {
            writeln!(file, "[{}] {}", Utc::now().to_rfc3339(), text)
        } else {
            writeln!(file, "{}", text)
        }
    }
}

impl RetentionLogger for FileLogger {
    fn log_message(&self, text: &str) {
        // Reports are best effort.
        if let Err(e) = self.append(text) {
            warn!("Cannot write retention report to {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_logger_appends() {
        let dir = TempDir::new().unwrap();
        let logger = FileLogger::builder()
            .path(dir.path().join("retention.log"))
            .with_timestamp(false)
            .build();

        logger.log_message("first");
        logger.log_message("second\n\tline");

        let content = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content, "first\nsecond\n\tline\n");
    }

    #[test]
    fn test_file_logger_timestamps_by_default() {
        let dir = TempDir::new().unwrap();
        let logger = FileLogger::builder().path(dir.path().join("r.log")).build();

        logger.log_message("report");

        let content = std::fs::read_to_string(logger.path()).unwrap();
        assert!(content.starts_with('['));
        assert!(content.trim_end().ends_with("] report"));
    }

    #[test]
    fn test_file_logger_swallows_io_errors() {
        let dir = TempDir::new().unwrap();
        let logger = FileLogger::builder()
            .path(dir.path().join("missing-dir/r.log"))
            .build();
        logger.log_message("lost");
        assert!(!logger.path().exists());
    }
}
