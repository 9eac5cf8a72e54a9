//! # Acquisition Session Module
//!
//! Owns every piece of mutable monitor state and applies one link record at
//! a time to it.
//!
//! ## Per-Record Pipeline
//! 1. Decode; a discarded record stops here and changes nothing
//! 2. Background windows and history buffer take the reading
//! 3. Hitrate rotation for any hours that passed
//! 4. Snapshot when the interval is reached
//! 5. Spark detection on every channel
//! 6. Hitrate count, and capture notification on the capture channel
//!
//! ## Threading
//! All of the above runs on the thread that calls `run`. The link read and
//! the interrupt watcher live on their own threads and only send messages.

use crate::background::BackgroundEstimator;
use crate::config::Config;
use crate::detector::{SparkDetector, SparkEvent, SparkState};
use crate::error::{PersistError, SessionError};
use crate::hitrate::{HitrateAccumulator, HitrateFiles};
use crate::history::{HistoryBuffer, SampleSliceExt};
use crate::link::{parse_record, DiscardReason, LinkEvent};
use crate::notifier::{DayDirectory, EventNotifier};
use crate::snapshot::SnapshotWriter;
use crate::CHANNELS;
use chrono::NaiveDateTime;
use crossbeam_channel::{never, select, Receiver};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Samples averaged for the "average current" status figure
const STATUS_AVERAGE_SAMPLES: usize = 5_000;

/// Bytes of a rejected record quoted in the warning
const LOGGED_RECORD_PREFIX: usize = 80;

/// When a record was processed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp {
    /// Seconds since the session started; stamps history and drives rotation
    pub elapsed: f64,
    /// Local wall-clock time; names files and directories
    pub wall: NaiveDateTime,
}

/// Monotonic elapsed time paired with local wall-clock time
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp {
            elapsed: self.started.elapsed().as_secs_f64(),
            wall: chrono::Local::now().naive_local(),
        }
    }
}

/// Result of feeding one record to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Accepted(Vec<SparkEvent>),
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub name: String,
    pub average: f64,
    pub baseline: f64,
    pub state: SparkState,
    pub sparks_this_hour: u64,
}

/// Periodic summary written to the log
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub accepted: u64,
    pub discarded: u64,
    /// Hitrate hour currently open, counted from session start
    pub hour: u64,
    pub snapshots_written: u64,
    pub channels: Vec<ChannelStatus>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} readings ({} discarded), hour {}, {} snapshot(s)",
            self.accepted, self.discarded, self.hour, self.snapshots_written
        )?;
        for ch in &self.channels {
            write!(
                f,
                " | {}: avg {:.4} uA, baseline {:.4}, {} spark(s) this hour{}",
                ch.name,
                ch.average,
                ch.baseline,
                ch.sparks_this_hour,
                if ch.state == SparkState::Active { " [ACTIVE]" } else { "" }
            )?;
        }
        Ok(())
    }
}

pub struct AcquisitionSession {
    config: Config,
    background: BackgroundEstimator,
    detector: SparkDetector,
    hitrate: HitrateAccumulator,
    history: HistoryBuffer,
    snapshots: SnapshotWriter,
    notifier: EventNotifier,
    days: DayDirectory,
    accepted: u64,
    discarded: u64,
}

impl AcquisitionSession {
    /// Set up output directories and restore hitrate history from a previous run.
    ///
    /// Failing to create the first day directory is fatal.
    pub fn start(config: Config, wall: NaiveDateTime) -> Result<Self, PersistError> {
        let mut days = DayDirectory::open(&config.root_directory)?;
        let dir = days.ensure(wall)?;
        let histograms = HitrateFiles {
            dir,
            names: &config.channel_names,
        }
        .restore();

        log::info!(
            "Session started: output under {}, capture channel {} ({})",
            days.root().display(),
            config.capture_channel,
            config.channel_names[config.capture_channel]
        );

        Ok(Self {
            background: BackgroundEstimator::new(),
            detector: SparkDetector::new(),
            hitrate: HitrateAccumulator::with_histograms(histograms),
            history: HistoryBuffer::new(config.history_capacity),
            snapshots: SnapshotWriter::new(config.snapshot_interval),
            notifier: EventNotifier::new(config.signal_file.clone()),
            days,
            accepted: 0,
            discarded: 0,
            config,
        })
    }

    #[allow(dead_code)]
    pub fn background(&self) -> &BackgroundEstimator {
        &self.background
    }

    #[allow(dead_code)]
    pub fn detector(&self) -> &SparkDetector {
        &self.detector
    }

    #[allow(dead_code)]
    pub fn hitrate(&self) -> &HitrateAccumulator {
        &self.hitrate
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    #[allow(dead_code)]
    pub fn snapshots(&self) -> &SnapshotWriter {
        &self.snapshots
    }

    /// Apply one raw link record
    pub fn ingest(&mut self, raw: &[u8], at: Timestamp) -> Ingest {
        match parse_record(raw, self.config.unit_scale) {
            Ok(values) => Ingest::Accepted(self.accept(values, at)),
            Err(reason) => {
                if !reason.is_silent() {
                    self.discarded += 1;
                    let quoted = &raw[..raw.len().min(LOGGED_RECORD_PREFIX)];
                    log::warn!(
                        "Skipping bad record {:?}: {}",
                        String::from_utf8_lossy(quoted).trim_end(),
                        reason
                    );
                }
                Ingest::Discarded(reason)
            }
        }
    }

    fn accept(&mut self, values: [f64; CHANNELS], at: Timestamp) -> Vec<SparkEvent> {
        self.background.push(&values);
        self.history.push(at.elapsed, values);

        if self.hitrate.rotation_due(at.elapsed) {
            let dir = self.output_dir(at.wall);
            let mut files = HitrateFiles {
                dir: &dir,
                names: &self.config.channel_names,
            };
            self.hitrate.tick(at.elapsed, &mut files);
        }

        if self.snapshots.count_sample() {
            let dir = self.output_dir(at.wall);
            if let Err(e) = self.snapshots.write(&self.history, &dir, at.wall) {
                log::error!("Skipping snapshot: {}", e);
            }
        }

        let baselines: [f64; CHANNELS] = std::array::from_fn(|c| self.background.baseline(c));
        let events = self
            .detector
            .process(&values, &baselines, self.background.is_warmed_up());

        for event in &events {
            self.hitrate.record(event.channel);
            log::debug!(
                "Spark on {}: {:.4} uA over baseline {:.4} at t={:.3}s",
                self.config.channel_names[event.channel],
                event.value,
                event.baseline,
                at.elapsed
            );
            if event.channel == self.config.capture_channel {
                if let Err(e) = self.notifier.notify(&mut self.days, at.wall) {
                    log::error!("Capture signal not written: {}", e);
                }
            }
        }

        self.accepted += 1;
        if self.config.status_interval > 0 && self.accepted % self.config.status_interval == 0 {
            log::info!("{}", self.status());
        }

        events
    }

    /// Day directory for `wall`, or the root if it can't be created
    fn output_dir(&mut self, wall: NaiveDateTime) -> PathBuf {
        match self.days.ensure(wall) {
            Ok(dir) => dir.to_path_buf(),
            Err(e) => {
                log::error!("{}; writing to {} instead", e, self.days.root().display());
                self.days.root().to_path_buf()
            }
        }
    }

    /// Snapshot the history now, regardless of the interval
    pub fn flush(&mut self, wall: NaiveDateTime) -> Result<PathBuf, PersistError> {
        let dir = self.days.ensure(wall)?.to_path_buf();
        self.snapshots.write(&self.history, &dir, wall)
    }

    pub fn status(&self) -> StatusReport {
        let recent = self.history.last(STATUS_AVERAGE_SAMPLES);
        let channels = (0..CHANNELS)
            .map(|c| ChannelStatus {
                name: self.config.channel_names[c].clone(),
                average: recent.as_slice().channel_mean(c).unwrap_or(0.0),
                baseline: self.background.baseline(c),
                state: self.detector.state(c),
                sparks_this_hour: self.hitrate.histogram(c).current(),
            })
            .collect();

        StatusReport {
            accepted: self.accepted,
            discarded: self.discarded,
            hour: self.hitrate.hour(),
            snapshots_written: self.snapshots.sequence(),
            channels,
        }
    }

    /// Process link records until interrupted or the link ends, then flush.
    ///
    /// The final snapshot is mandatory: if it cannot be written the session
    /// fails even after a clean interrupt.
    pub fn run(
        mut self,
        records: &Receiver<LinkEvent>,
        shutdown: &Receiver<()>,
        clock: &SessionClock,
    ) -> Result<(), SessionError> {
        let detached = never();
        let mut watcher_gone = false;
        let mut link_failure = None;
        let mut sparks = 0usize;

        loop {
            let interrupt = if watcher_gone { &detached } else { shutdown };
            select! {
                recv(interrupt) -> msg => match msg {
                    Ok(()) => {
                        log::info!("Interrupt received, shutting down");
                        break;
                    }
                    Err(_) => {
                        log::warn!("Interrupt watcher gone, Ctrl-C will not flush");
                        watcher_gone = true;
                    }
                },
                recv(records) -> event => match event {
                    Ok(LinkEvent::Record(raw)) => {
                        if let Ingest::Accepted(events) = self.ingest(&raw, clock.now()) {
                            sparks += events.len();
                        }
                    }
                    Ok(LinkEvent::Failed(e)) => {
                        log::error!("{}", e);
                        link_failure = Some(e);
                        break;
                    }
                    Ok(LinkEvent::Closed) | Err(_) => {
                        log::info!("Sensor link ended, shutting down");
                        break;
                    }
                },
            }
        }

        let flushed = self.flush(clock.now().wall);
        log::info!("{} spark(s) this run; {}", sparks, self.status());

        // A dead link is the root cause; a flush failure after it is only logged
        match (link_failure, flushed) {
            (Some(link), Err(flush)) => {
                log::error!("Final snapshot not written: {}", flush);
                Err(link.into())
            }
            (Some(link), Ok(path)) => {
                log::info!("Final snapshot written to {}", path.display());
                Err(link.into())
            }
            (None, Err(flush)) => Err(flush.into()),
            (None, Ok(path)) => {
                log::info!("Final snapshot written to {}", path.display());
                Ok(())
            }
        }
    }
}
