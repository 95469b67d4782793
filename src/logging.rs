//! File-backed logging.
//!
//! Backend for the `log` facade that renders every record as
//!
//! ```text
//! 2026-01-17 08:45:10 WARNING: sensor AC1 compressor read failed, ...
//! ```
//!
//! and appends it to the daemon log.  Levels map onto the tags the
//! surrounding tooling greps for: `error!` → `ALARM`, `warn!` → `WARNING`,
//! everything else → `INFO`.  The file is opened per record so the hourly
//! log-rotation cron can move it out from under us at any time.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Default log location.
pub const LOG_FILE: &str = "/var/log/hpmd.log";

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct FileLogger {
    path: PathBuf,
}

impl FileLogger {
    fn tag(level: Level) -> &'static str {
        match level {
            Level::Error => "ALARM",
            Level::Warn => "WARNING",
            _ => "INFO",
        }
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} {}: {}",
            Local::now().format(STAMP_FORMAT),
            Self::tag(record.level()),
            record.args()
        );
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if appended.is_err() {
            // Last resort so the message is not lost entirely.
            eprintln!("{line}");
        }
    }

    fn flush(&self) {}
}

/// Install the file logger as the global backend.
pub fn init(path: &Path) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(FileLogger {
        path: path.to_path_buf(),
    }))?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

/// Format a line the way the logger does, for sinks that stamp their own
/// records (the data log).
pub fn stamped(message: &str) -> String {
    format!("{} {message}", Local::now().format(STAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tags_match_the_grep_contract() {
        assert_eq!(FileLogger::tag(Level::Error), "ALARM");
        assert_eq!(FileLogger::tag(Level::Warn), "WARNING");
        assert_eq!(FileLogger::tag(Level::Info), "INFO");
    }

    #[test]
    fn records_are_appended_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpmd.log");
        let logger = FileLogger { path: path.clone() };

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("something odd"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Error)
                .args(format_args!("something fatal"))
                .build(),
        );

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("WARNING: something odd"));
        assert!(lines[1].contains("ALARM: something fatal"));
        // leading timestamp: "YYYY-MM-DD HH:MM:SS"
        assert_eq!(lines[0].as_bytes()[4], b'-');
        assert_eq!(lines[0].as_bytes()[10], b' ');
    }

    #[test]
    fn debug_level_is_filtered() {
        let logger = FileLogger {
            path: PathBuf::from("/nonexistent"),
        };
        let meta = Metadata::builder().level(Level::Debug).build();
        assert!(!logger.enabled(&meta));
    }
}
