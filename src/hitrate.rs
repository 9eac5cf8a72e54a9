//! # Hitrate Module
//!
//! Hour-bucketed spark counts for the last 48 hours, per channel.
//!
//! ## Layout
//! Index 0 is the open bucket for the current hour, index 47 the oldest
//! retained hour. Rotation pushes a fresh zero at the front and drops the
//! back, so every histogram is exactly 48 entries long at all times.
//!
//! ## Persistence
//! Before every rotation each channel's histogram is written to
//! `hitrate_<name>.csv` in the current day directory, one count per line,
//! newest first. The same files seed the histograms on restart.

use crate::error::PersistError;
use crate::CHANNELS;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

pub const HITRATE_BUCKETS: usize = 48;
pub const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitrateHistogram {
    buckets: VecDeque<u64>,
}

impl HitrateHistogram {
    pub fn new() -> Self {
        Self {
            buckets: VecDeque::from(vec![0; HITRATE_BUCKETS]),
        }
    }

    /// Build from newest-first counts; `None` unless there are exactly 48
    pub fn from_counts(counts: Vec<u64>) -> Option<Self> {
        if counts.len() != HITRATE_BUCKETS {
            return None;
        }
        Some(Self {
            buckets: VecDeque::from(counts),
        })
    }

    pub fn increment(&mut self) {
        if let Some(open) = self.buckets.front_mut() {
            *open += 1;
        }
    }

    pub fn rotate(&mut self) {
        self.buckets.pop_back();
        self.buckets.push_front(0);
    }

    /// Count in the open bucket
    pub fn current(&self) -> u64 {
        self.buckets.front().copied().unwrap_or(0)
    }

    /// Newest-first counts
    pub fn counts(&self) -> impl Iterator<Item = u64> + '_ {
        self.buckets.iter().copied()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(HITRATE_BUCKETS * 4);
        for count in self.counts() {
            out.push_str(&count.to_string());
            out.push('\n');
        }
        out
    }

    /// Parse a persisted histogram.
    ///
    /// Accepts plain integers and integral floats such as `3.0e+00`.
    pub fn parse(text: &str) -> Option<Self> {
        let counts = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_count)
            .collect::<Option<Vec<u64>>>()?;
        Self::from_counts(counts)
    }
}

fn parse_count(token: &str) -> Option<u64> {
    if let Ok(count) = token.parse::<u64>() {
        return Some(count);
    }
    let value: f64 = token.parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// Where rotated histograms go
pub trait HitrateStore {
    fn persist(&mut self, channel: usize, histogram: &HitrateHistogram) -> Result<(), PersistError>;
}

pub fn hitrate_path(dir: &Path, channel_name: &str) -> PathBuf {
    dir.join(format!("hitrate_{}.csv", channel_name))
}

/// Hitrate CSV files in one day directory
pub struct HitrateFiles<'a> {
    pub dir: &'a Path,
    pub names: &'a [String; CHANNELS],
}

impl HitrateStore for HitrateFiles<'_> {
    fn persist(&mut self, channel: usize, histogram: &HitrateHistogram) -> Result<(), PersistError> {
        let path = hitrate_path(self.dir, &self.names[channel]);
        fs::write(&path, histogram.to_csv()).map_err(|source| PersistError::Write { path, source })
    }
}

impl HitrateFiles<'_> {
    /// Read back histograms from a previous run.
    ///
    /// A file is written just before its hour closes, so each restored
    /// histogram is rotated once to open a fresh bucket. Missing files give a
    /// fresh histogram; unreadable or malformed ones are logged and replaced
    /// with a fresh histogram.
    pub fn restore(&self) -> [HitrateHistogram; CHANNELS] {
        std::array::from_fn(|channel| {
            let path = hitrate_path(self.dir, &self.names[channel]);
            match fs::read_to_string(&path) {
                Ok(text) => match HitrateHistogram::parse(&text) {
                    Some(mut histogram) => {
                        log::info!("Restored hitrate history from {}", path.display());
                        histogram.rotate();
                        histogram
                    }
                    None => {
                        log::warn!("Ignoring malformed hitrate file {}", path.display());
                        HitrateHistogram::new()
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => HitrateHistogram::new(),
                Err(source) => {
                    log::warn!("{}", PersistError::Read { path, source });
                    HitrateHistogram::new()
                }
            }
        })
    }
}

/// Histograms for every channel plus the hour counter that drives rotation
pub struct HitrateAccumulator {
    histograms: [HitrateHistogram; CHANNELS],
    /// Rotation happens once elapsed time passes `hour` hours
    hour: u64,
}

impl HitrateAccumulator {
    pub fn new() -> Self {
        Self::with_histograms(std::array::from_fn(|_| HitrateHistogram::new()))
    }

    pub fn with_histograms(histograms: [HitrateHistogram; CHANNELS]) -> Self {
        Self { histograms, hour: 1 }
    }

    pub fn record(&mut self, channel: usize) {
        self.histograms[channel].increment();
    }

    pub fn histogram(&self, channel: usize) -> &HitrateHistogram {
        &self.histograms[channel]
    }

    pub fn hour(&self) -> u64 {
        self.hour
    }

    pub fn rotation_due(&self, elapsed_secs: f64) -> bool {
        elapsed_secs > self.hour as f64 * SECONDS_PER_HOUR
    }

    /// Rotate once for every full hour passed since the last rotation.
    ///
    /// A failed write is logged and the rotation still happens, so the
    /// in-memory buckets stay aligned with wall-clock hours.
    pub fn tick(&mut self, elapsed_secs: f64, store: &mut impl HitrateStore) -> usize {
        let mut rotations = 0;
        while self.rotation_due(elapsed_secs) {
            for (channel, histogram) in self.histograms.iter().enumerate() {
                if let Err(e) = store.persist(channel, histogram) {
                    log::error!("Skipping hitrate write for channel {}: {}", channel, e);
                }
            }
            for histogram in self.histograms.iter_mut() {
                histogram.rotate();
            }
            self.hour += 1;
            rotations += 1;
        }

        if rotations > 0 {
            log::info!("Hitrate rotated {} bucket(s), now in hour {}", rotations, self.hour);
        }
        rotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingStore {
        writes: [usize; CHANNELS],
        last: Vec<Option<HitrateHistogram>>,
    }

    impl HitrateStore for CountingStore {
        fn persist(&mut self, channel: usize, histogram: &HitrateHistogram) -> Result<(), PersistError> {
            self.writes[channel] += 1;
            if self.last.len() < CHANNELS {
                self.last.resize(CHANNELS, None);
            }
            self.last[channel] = Some(histogram.clone());
            Ok(())
        }
    }

    fn names() -> [String; CHANNELS] {
        ["rd".to_string(), "cond".to_string(), "qc".to_string()]
    }

    #[test]
    fn test_rotation_shifts_toward_tail() {
        let mut histogram = HitrateHistogram::new();
        histogram.increment();
        histogram.increment();
        histogram.rotate();
        histogram.increment();

        let counts: Vec<u64> = histogram.counts().collect();
        assert_eq!(counts.len(), HITRATE_BUCKETS);
        assert_eq!(&counts[..3], &[1, 2, 0]);
    }

    #[test]
    fn test_oldest_bucket_is_dropped() {
        let mut counts = vec![0; HITRATE_BUCKETS];
        counts[HITRATE_BUCKETS - 1] = 9;
        let mut histogram = HitrateHistogram::from_counts(counts).unwrap();
        histogram.rotate();
        assert_eq!(histogram.len(), HITRATE_BUCKETS);
        assert!(histogram.counts().all(|c| c == 0));
    }

    #[test]
    fn test_forty_eight_quiet_hours() {
        let mut acc = HitrateAccumulator::new();
        let mut store = CountingStore::default();

        for hour in 1..=48u64 {
            let rotated = acc.tick(hour as f64 * SECONDS_PER_HOUR + 1.0, &mut store);
            assert_eq!(rotated, 1);
        }

        assert_eq!(store.writes, [48; CHANNELS]);
        for channel in 0..CHANNELS {
            let histogram = acc.histogram(channel);
            assert_eq!(histogram.len(), HITRATE_BUCKETS);
            assert!(histogram.counts().all(|c| c == 0));
        }
    }

    #[test]
    fn test_no_rotation_within_first_hour() {
        let mut acc = HitrateAccumulator::new();
        let mut store = CountingStore::default();
        assert_eq!(acc.tick(SECONDS_PER_HOUR, &mut store), 0);
        assert_eq!(store.writes, [0; CHANNELS]);
        assert_eq!(acc.hour(), 1);
    }

    #[test]
    fn test_outgoing_buckets_persisted_before_shift() {
        let mut acc = HitrateAccumulator::new();
        let mut store = CountingStore::default();
        acc.record(1);
        acc.record(1);

        acc.tick(SECONDS_PER_HOUR + 0.5, &mut store);

        let persisted = store.last[1].as_ref().unwrap();
        assert_eq!(persisted.current(), 2);
        assert_eq!(acc.histogram(1).current(), 0);
        assert_eq!(acc.histogram(1).counts().nth(1), Some(2));
    }

    #[test]
    fn test_stalled_link_catches_up_every_hour() {
        let mut acc = HitrateAccumulator::new();
        let mut store = CountingStore::default();
        assert_eq!(acc.tick(3.5 * SECONDS_PER_HOUR, &mut store), 3);
        assert_eq!(acc.hour(), 4);
        assert_eq!(store.writes, [3; CHANNELS]);
    }

    #[test]
    fn test_files_round_trip_and_restore() {
        let dir = tempdir().unwrap();
        let names = names();
        let mut files = HitrateFiles { dir: dir.path(), names: &names };

        let mut histogram = HitrateHistogram::new();
        histogram.increment();
        files.persist(2, &histogram).unwrap();

        let text = fs::read_to_string(dir.path().join("hitrate_qc.csv")).unwrap();
        assert_eq!(text.lines().count(), HITRATE_BUCKETS);
        assert_eq!(text.lines().next(), Some("1"));

        fs::write(dir.path().join("hitrate_rd.csv"), "1\n2\n").unwrap();
        let restored = files.restore();
        assert_eq!(restored[0], HitrateHistogram::new());
        assert_eq!(restored[1], HitrateHistogram::new());
        assert_eq!(restored[2].current(), 0);
        assert_eq!(restored[2].counts().nth(1), Some(1));
        assert_eq!(restored[2].len(), HITRATE_BUCKETS);
    }

    #[test]
    fn test_restore_drops_oldest_persisted_hour() {
        let dir = tempdir().unwrap();
        let names = names();
        let files = HitrateFiles { dir: dir.path(), names: &names };

        let mut counts = vec![0; HITRATE_BUCKETS];
        counts[0] = 4;
        counts[HITRATE_BUCKETS - 1] = 7;
        let saved = HitrateHistogram::from_counts(counts).unwrap();
        fs::write(hitrate_path(dir.path(), "rd"), saved.to_csv()).unwrap();

        let restored = files.restore();
        let counts: Vec<u64> = restored[0].counts().collect();
        assert_eq!(counts.len(), HITRATE_BUCKETS);
        assert_eq!(&counts[..2], &[0, 4]);
        assert!(!counts.contains(&7));
    }

    #[test]
    fn test_parse_accepts_float_counts() {
        let text = "3.000000000000000000e+00\n".repeat(HITRATE_BUCKETS);
        let histogram = HitrateHistogram::parse(&text).unwrap();
        assert!(histogram.counts().all(|c| c == 3));
        assert!(HitrateHistogram::parse(&"1.5\n".repeat(HITRATE_BUCKETS)).is_none());
    }
}
