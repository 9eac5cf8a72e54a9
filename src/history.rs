use crate::CHANNELS;
use std::collections::VecDeque;

/// One accepted reading, stamped with seconds since session start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub values: [f64; CHANNELS],
}

/// Bounded sample history shared by the long-term view, the short-term view
/// and the snapshot writer.
///
/// Timestamps and readings are parallel ring buffers evicted together, one
/// entry per push once full. The buffer starts full of zero placeholders so
/// consumers always see a series of `capacity` samples.
pub struct HistoryBuffer {
    times: VecDeque<f64>,
    readings: VecDeque<[f64; CHANNELS]>,
    capacity: usize,
}

pub trait SampleSliceExt {
    fn channel_mean(&self, channel: usize) -> Option<f64>;
}

impl SampleSliceExt for &[Sample] {
    fn channel_mean(&self, channel: usize) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().map(|s| s.values[channel]).sum::<f64>() / self.len() as f64)
    }
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let mut times = VecDeque::with_capacity(capacity + 1);
        let mut readings = VecDeque::with_capacity(capacity + 1);
        times.resize(capacity, 0.0);
        readings.resize(capacity, [0.0; CHANNELS]);
        Self {
            times,
            readings,
            capacity,
        }
    }

    pub fn push(&mut self, time: f64, values: [f64; CHANNELS]) {
        self.times.push_back(time);
        self.readings.push_back(values);
        if self.times.len() > self.capacity {
            self.times.pop_front();
            self.readings.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[allow(dead_code)]
    pub fn latest(&self) -> Option<Sample> {
        Some(Sample {
            time: *self.times.back()?,
            values: *self.readings.back()?,
        })
    }

    /// Oldest-first iterator over every retained sample
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.times
            .iter()
            .zip(self.readings.iter())
            .map(|(&time, &values)| Sample { time, values })
    }

    /// Oldest-first values of one channel
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().map(move |r| r[channel])
    }

    /// The most recent `n` samples, oldest first
    pub fn last(&self, n: usize) -> Vec<Sample> {
        self.iter().skip(self.len().saturating_sub(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_full_of_placeholders() {
        let history = HistoryBuffer::new(5);
        assert_eq!(history.len(), 5);
        assert!(history.iter().all(|s| s.time == 0.0 && s.values == [0.0; CHANNELS]));
    }

    #[test]
    fn test_fifo_eviction_never_exceeds_capacity() {
        let mut history = HistoryBuffer::new(4);
        for i in 1..=10 {
            history.push(i as f64, [i as f64, 0.0, -(i as f64)]);
            assert_eq!(history.len(), 4);
        }
        let times: Vec<f64> = history.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![7.0, 8.0, 9.0, 10.0]);
        assert_eq!(history.channel(2).collect::<Vec<_>>(), vec![-7.0, -8.0, -9.0, -10.0]);
        assert_eq!(history.latest().unwrap().time, 10.0);
    }

    #[test]
    fn test_last_and_mean() {
        let mut history = HistoryBuffer::new(10);
        for i in 1..=4 {
            history.push(i as f64, [i as f64, 1.0, 0.0]);
        }
        let recent = history.last(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].time, 3.0);
        assert_eq!(recent.as_slice().channel_mean(0), Some(3.5));
        assert_eq!(history.last(100).len(), 10);
        assert_eq!((&[] as &[Sample]).channel_mean(0), None);
    }
}
