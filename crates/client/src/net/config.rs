use serde::{Deserialize, Serialize};
use tether::{MotionParams, DEFAULT_SNAPSHOT_HISTORY};
use tether::net::{DEFAULT_MIN_SAMPLES, DEFAULT_SAMPLE_WINDOW};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub sample_window: usize,
    pub min_samples: usize,
    /// Largest drift, in ticks, corrected by time scaling instead of a snap.
    pub tolerable_tick_difference: f32,
    pub minimum_tick_buffer: u32,
    pub safe_tick_margin: f32,
    pub buffer_display_threshold: f32,
    /// Easing curve points `[normalized error, time-scale offset]`.
    pub sync_curve: Vec<[f32; 2]>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sample_window: DEFAULT_SAMPLE_WINDOW,
            min_samples: DEFAULT_MIN_SAMPLES,
            tolerable_tick_difference: 3.0,
            minimum_tick_buffer: 2,
            safe_tick_margin: 2.0,
            buffer_display_threshold: 1.5,
            sync_curve: vec![[0.0, 0.0], [0.5, 0.02], [1.0, 0.1]],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub player_id: u32,
    pub clock: ClockConfig,
    pub sync_interval_secs: f32,
    pub max_prediction_history: usize,
    pub max_baselines: usize,
    pub max_buffered_snapshots: usize,
    pub motion: MotionParams,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            player_id: 1,
            clock: ClockConfig::default(),
            sync_interval_secs: 0.25,
            max_prediction_history: 128,
            max_baselines: DEFAULT_SNAPSHOT_HISTORY,
            max_buffered_snapshots: 64,
            motion: MotionParams::default(),
        }
    }
}
