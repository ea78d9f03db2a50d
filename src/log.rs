//! Capture of Rx/Tx traffic to date-stamped files.

use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::buffer::to_hex_spaced;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    fn prefix(self) -> &'static str {
        match self {
            Direction::Rx => "rx",
            Direction::Tx => "tx",
        }
    }
}

#[derive(Default)]
struct CaptureFile {
    file: Option<File>,
    date: Option<NaiveDate>,
}

/// Logger that writes traffic to one file per direction and day.
pub struct TrafficLogger {
    log_dir: PathBuf,
    rx: CaptureFile,
    tx: CaptureFile,
}

impl TrafficLogger {
    /// Create a new traffic logger with the specified log directory.
    /// Returns None if log_dir is None (capture disabled).
    /// Relative paths are resolved against the current working directory.
    pub fn new(log_dir: Option<&str>) -> Option<Self> {
        let log_dir = log_dir?;
        let log_path = PathBuf::from(log_dir);

        let log_path = if log_path.is_absolute() {
            log_path
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&log_path))
                .unwrap_or(log_path)
        };

        if let Err(e) = fs::create_dir_all(&log_path) {
            warn!(
                "failed to create log directory '{}': {}",
                log_path.display(),
                e
            );
            return None;
        }

        Some(Self {
            log_dir: log_path,
            rx: CaptureFile::default(),
            tx: CaptureFile::default(),
        })
    }

    /// Get the log file path for a direction and date.
    pub fn log_file_path(log_dir: &Path, direction: Direction, date: NaiveDate) -> PathBuf {
        let filename = format!("{}-{}.log", direction.prefix(), date.format("%Y%m%d"));
        log_dir.join(filename)
    }

    /// Ensure the file for a direction is open and matches the current date.
    fn ensure_file(&mut self, direction: Direction) -> Option<&mut File> {
        let today = Local::now().date_naive();
        let capture = match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        };

        if capture.date != Some(today) {
            capture.file = None;
            capture.date = None;

            let path = Self::log_file_path(&self.log_dir, direction, today);
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    capture.file = Some(file);
                    capture.date = Some(today);
                }
                Err(e) => {
                    warn!("failed to open log file '{}': {}", path.display(), e);
                    return None;
                }
            }
        }

        capture.file.as_mut()
    }

    /// Append one timestamped line of hex bytes
    pub fn log(&mut self, direction: Direction, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let stamp = Local::now().format("%H:%M:%S%.3f");
        if let Some(file) = self.ensure_file(direction) {
            let _ = writeln!(file, "{} {}", stamp, to_hex_spaced(data).trim_end());
        }
    }
}
