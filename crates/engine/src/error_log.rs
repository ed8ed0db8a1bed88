//! Process-wide append-only log of per-file failures.
//!
//! Each record becomes exactly one line:
//! `[YY/MM/DD HH:MM:SS] <absolute-file-path>: <ErrorKind>: <message>`

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Timestamp format used in log lines.
pub const TIMESTAMP_FORMAT: &str = "%y/%m/%d %H:%M:%S";

/// Classification written into each log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DiscoveryError,
    DirectoryCreationError,
    EncodeError,
    CopyError,
    /// A worker panicked while running the task.
    WorkerPanic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DiscoveryError => "DiscoveryError",
            ErrorKind::DirectoryCreationError => "DirectoryCreationError",
            ErrorKind::EncodeError => "EncodeError",
            ErrorKind::CopyError => "CopyError",
            ErrorKind::WorkerPanic => "WorkerPanic",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed file.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Local>,
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    /// Record stamped with the current local time.
    pub fn now(path: impl Into<PathBuf>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            path: path.into(),
            kind,
            message: message.into(),
        }
    }

    /// Render the record as a single log line, without the trailing newline.
    ///
    /// Newlines inside the message are flattened so a record never spans
    /// more than one line.
    pub fn to_line(&self) -> String {
        let message = self.message.replace(['\r', '\n'], " ");
        format!(
            "[{}] {}: {}: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.path.display(),
            self.kind,
            message.trim_end()
        )
    }
}

/// Append-only error log shared by all workers.
///
/// Lines are written whole, one `write_all` per record under a lock, to a file
/// opened in append mode.
#[derive(Debug)]
pub struct ErrorSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Never fails: a write error is logged and dropped.
    pub fn record(&self, record: &ErrorRecord) {
        if let Err(e) = self.try_record(record) {
            warn!(
                log = %self.path.display(),
                file = %record.path.display(),
                error = %e,
                "failed to write error log"
            );
        }
    }

    fn try_record(&self, record: &ErrorRecord) -> std::io::Result<()> {
        let mut line = record.to_line();
        line.push('\n');

        // A poisoned lock only means another writer panicked mid-append.
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixed_record() -> ErrorRecord {
        ErrorRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap(),
            path: PathBuf::from("/media/in/clip.mkv"),
            kind: ErrorKind::EncodeError,
            message: "ffmpeg exited with code 1".to_string(),
        }
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            fixed_record().to_line(),
            "[24/03/09 07:05:01] /media/in/clip.mkv: EncodeError: ffmpeg exited with code 1"
        );
    }

    #[test]
    fn test_multiline_message_is_flattened() {
        let mut record = fixed_record();
        record.message = "first\nsecond\r\n".to_string();
        let line = record.to_line();
        assert!(!line.contains('\n'));
        assert!(line.ends_with("first second"));
    }

    #[test]
    fn test_record_creates_and_appends() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("errors.txt");
        let sink = ErrorSink::new(&log);

        sink.record(&fixed_record());
        sink.record(&ErrorRecord::now("/x/y.wav", ErrorKind::CopyError, "disk full"));

        let content = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("EncodeError"));
        assert!(lines[1].ends_with("/x/y.wav: CopyError: disk full"));
    }

    #[test]
    fn test_record_never_panics_on_unwritable_log() {
        let temp = TempDir::new().unwrap();
        let sink = ErrorSink::new(temp.path().join("missing-dir/errors.txt"));
        sink.record(&fixed_record());
        assert!(!temp.path().join("missing-dir").exists());
    }

    #[test]
    fn test_concurrent_appends_keep_lines_whole() {
        let temp = TempDir::new().unwrap();
        let sink = Arc::new(ErrorSink::new(temp.path().join("errors.txt")));
        let writers = 8;
        let per_writer = 50;

        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..per_writer {
                        let record = ErrorRecord::now(
                            format!("/in/w{}/file{}.mkv", w, i),
                            ErrorKind::EncodeError,
                            "x".repeat(200),
                        );
                        sink.record(&record);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), writers * per_writer);
        for line in lines {
            assert!(line.starts_with('['));
            assert!(line.ends_with(&"x".repeat(200)));
            assert!(line.contains(": EncodeError: "));
        }
    }
}
