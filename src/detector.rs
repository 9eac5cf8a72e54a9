//! Per-channel spark detector.
//! Two states with asymmetric hysteresis: the trigger level carries an absolute
//! offset on top of the scaled baseline, the reset level does not.

use crate::CHANNELS;

/// Baseline multiplier shared by the trigger and reset levels
pub const THRESHOLD_SCALE: f64 = 1.2;
/// Added to the trigger level only, in reading units (uA)
pub const THRESHOLD_OFFSET: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SparkState {
    #[default]
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparkEvent {
    pub channel: usize,
    pub value: f64,
    pub baseline: f64,
}

/// Level a reading must exceed to start a spark
pub fn trigger_level(baseline: f64) -> f64 {
    baseline * THRESHOLD_SCALE + THRESHOLD_OFFSET
}

/// Level a reading must drop below to end a spark
pub fn reset_level(baseline: f64) -> f64 {
    baseline * THRESHOLD_SCALE
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelDetector {
    state: SparkState,
}

impl ChannelDetector {
    pub fn state(&self) -> SparkState {
        self.state
    }

    /// Feed one reading. Returns an event only on the Idle -> Active edge.
    pub fn update(&mut self, value: f64, baseline: f64, armed: bool) -> bool {
        let fired = armed && self.state == SparkState::Idle && value > trigger_level(baseline);
        if fired {
            self.state = SparkState::Active;
        }

        // Checked on the same reading, after the trigger
        if value < reset_level(baseline) {
            self.state = SparkState::Idle;
        }

        fired
    }
}

/// Independent detectors for every channel
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparkDetector {
    channels: [ChannelDetector; CHANNELS],
}

impl SparkDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, channel: usize) -> SparkState {
        self.channels[channel].state()
    }

    /// Evaluate every channel against its own baseline
    pub fn process(
        &mut self,
        values: &[f64; CHANNELS],
        baselines: &[f64; CHANNELS],
        armed: bool,
    ) -> Vec<SparkEvent> {
        let mut events = Vec::new();
        for (channel, detector) in self.channels.iter_mut().enumerate() {
            if detector.update(values[channel], baselines[channel], armed) {
                events.push(SparkEvent {
                    channel,
                    value: values[channel],
                    baseline: baselines[channel],
                });
            }
        }
        events
    }
}
