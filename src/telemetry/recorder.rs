//! # Telemetry Recorder
//!
//! Writes drained eRPM batches to JSON Lines files.
//!
//! A new file is started every `max_records_per_file` records; only the last
//! `max_files_to_keep` files written by this recorder are retained.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::decoder::period_to_erpm;
use super::stats::StatsSnapshot;
use crate::config::TelemetryConfig;
use crate::dshot::protocol::TELEMETRY_MOTORS;
use crate::error::Result;

/// One line of the log
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub batch: u64,
    pub periods: [u32; TELEMETRY_MOTORS],
    pub erpm: [u32; TELEMETRY_MOTORS],
    pub stats: StatsSnapshot,
}

impl TelemetryRecord {
    /// Build a record stamped with the current time
    pub fn new(batch: u64, periods: [u32; TELEMETRY_MOTORS], stats: StatsSnapshot) -> Self {
        Self {
            timestamp: Utc::now(),
            batch,
            periods,
            erpm: periods.map(period_to_erpm),
            stats,
        }
    }
}

/// Rotating JSONL writer
pub struct JsonlRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    records_in_file: usize,
    sequence: u32,
    writer: Option<BufWriter<File>>,
    files: VecDeque<PathBuf>,
}

impl std::fmt::Debug for JsonlRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlRecorder")
            .field("dir", &self.dir)
            .field("records_in_file", &self.records_in_file)
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

impl JsonlRecorder {
    /// Create a recorder writing into `dir` (created if missing)
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            records_in_file: 0,
            sequence: 0,
            writer: None,
            files: VecDeque::new(),
        })
    }

    /// Create a recorder from the `[telemetry]` section
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        Self::new(&config.log_dir, config.max_records_per_file, config.max_files_to_keep)
    }

    /// Append one record, rotating first if the current file is full
    ///
    /// # Errors
    ///
    /// Returns error on I/O or serialization failure
    pub fn record(&mut self, record: &TelemetryRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Files currently retained, oldest first
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "erpm_{}_{:04}.jsonl",
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence
        );
        self.sequence = self.sequence.wrapping_add(1);

        let path = self.dir.join(name);
        let file = File::create(&path)?;
        info!("Recording telemetry to {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files.push_back(path);

        while self.files.len() > self.max_files_to_keep {
            if let Some(old) = self.files.pop_front() {
                debug!("Removing old telemetry file {}", old.display());
                fs::remove_file(&old)?;
            }
        }

        Ok(())
    }
}

impl Drop for JsonlRecorder {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(batch: u64) -> TelemetryRecord {
        TelemetryRecord::new(batch, [1000, 2000, 0, 65408], StatsSnapshot::default())
    }

    #[test]
    fn test_record_fields() {
        let rec = record(3);
        assert_eq!(rec.batch, 3);
        assert_eq!(rec.erpm, [60_000, 30_000, 0, 917]);
    }

    #[test]
    fn test_writes_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut recorder = JsonlRecorder::new(dir.path(), 100, 3).unwrap();

        recorder.record(&record(0)).unwrap();
        recorder.record(&record(1)).unwrap();
        recorder.flush().unwrap();

        let path = recorder.files().next().unwrap().to_path_buf();
        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["batch"], 1);
        assert_eq!(value["periods"][3], 65408);
        assert_eq!(value["stats"]["no_signal"], 0);
    }

    #[test]
    fn test_rotates_and_keeps_last_files() {
        let dir = TempDir::new().unwrap();
        let mut recorder = JsonlRecorder::new(dir.path(), 2, 2).unwrap();

        for batch in 0..7 {
            recorder.record(&record(batch)).unwrap();
        }
        recorder.flush().unwrap();

        // 7 records at 2 per file = 4 files, only 2 kept
        let kept: Vec<PathBuf> = recorder.files().map(Path::to_path_buf).collect();
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|path| path.exists()));

        let on_disk = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(on_disk, 2);

        let last = fs::read_to_string(&kept[1]).unwrap();
        assert_eq!(last.lines().count(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("logs").join("erpm");
        let recorder = JsonlRecorder::new(&nested, 10, 1).unwrap();
        assert!(nested.is_dir());
        assert_eq!(recorder.files().count(), 0);
    }
}
