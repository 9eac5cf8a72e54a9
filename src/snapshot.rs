//! # Snapshot Module
//!
//! Periodic dumps of the in-memory sample history to CSV.
//!
//! ## File Layout
//! ```text
//! <day dir>/current_out_MM-DD-YYYY_HH-MM-SS_<seq>.csv
//!   row 0: channel 0 values, oldest first
//!   row 1: channel 1 values
//!   row 2: channel 2 values
//! ```
//! Every snapshot is a new file; the sequence number keeps names unique even
//! when two snapshots land in the same second.
//!
//! ## Retention
//! Only what the history buffer still holds is written. Samples evicted
//! between two snapshots are gone, so the interval should stay at or below
//! the history capacity if a gapless record matters.

use crate::error::PersistError;
use crate::history::HistoryBuffer;
use crate::CHANNELS;
use chrono::NaiveDateTime;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct SnapshotWriter {
    /// Accepted readings between snapshots
    interval: u64,
    /// Accepted readings since the last snapshot
    pending: u64,
    /// Number for the next snapshot file
    sequence: u64,
}

impl SnapshotWriter {
    pub fn new(interval: u64) -> Self {
        Self {
            interval,
            pending: 0,
            sequence: 0,
        }
    }

    #[allow(dead_code)]
    pub fn pending(&self) -> u64 {
        self.pending
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Count one accepted reading; true when a snapshot is due
    pub fn count_sample(&mut self) -> bool {
        self.pending += 1;
        self.pending >= self.interval
    }

    pub fn snapshot_path(&self, dir: &Path, wall: NaiveDateTime) -> PathBuf {
        dir.join(format!(
            "current_out_{}_{}.csv",
            wall.format("%m-%d-%Y_%H-%M-%S"),
            self.sequence
        ))
    }

    /// Write the whole history to a new file and restart the count.
    ///
    /// The count restarts even if the write fails, so a broken disk costs one
    /// snapshot per interval instead of a retry on every reading.
    pub fn write(
        &mut self,
        history: &HistoryBuffer,
        dir: &Path,
        wall: NaiveDateTime,
    ) -> Result<PathBuf, PersistError> {
        let path = self.snapshot_path(dir, wall);
        self.sequence += 1;
        self.pending = 0;

        Self::write_rows(history, &path).map_err(|source| PersistError::Write {
            path: path.clone(),
            source,
        })?;

        log::info!(
            "Wrote {} samples to {}",
            history.len(),
            path.display()
        );
        Ok(path)
    }

    fn write_rows(history: &HistoryBuffer, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let mut out = BufWriter::new(file);

        for channel in 0..CHANNELS {
            let mut first = true;
            for value in history.channel(channel) {
                if !first {
                    out.write_all(b",")?;
                }
                write!(out, "{}", value)?;
                first = false;
            }
            out.write_all(b"\n")?;
        }

        out.flush()
    }
}
