use std::collections::VecDeque;

pub const DEFAULT_SAMPLE_WINDOW: usize = 30;
pub const DEFAULT_MIN_SAMPLES: usize = 5;

/// Sliding-window estimate of one-way latency, in seconds.
///
/// Mean and sample standard deviation are recomputed on every push, so
/// readers always see statistics for the current window.
#[derive(Debug, Clone)]
pub struct LatencyEstimator {
    samples: VecDeque<f32>,
    window: usize,
    min_samples: usize,
    mean: f32,
    std_dev: f32,
}

impl Default for LatencyEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_WINDOW, DEFAULT_MIN_SAMPLES)
    }
}

impl LatencyEstimator {
    pub fn new(window: usize, min_samples: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            min_samples: min_samples.clamp(1, window),
            mean: 0.0,
            std_dev: 0.0,
        }
    }

    /// Half of a millisecond round trip, converted to seconds. The clock may
    /// wrap between send and receive.
    pub fn one_way_from_round_trip(now_ms: u32, sent_ms: u32) -> f32 {
        now_ms.wrapping_sub(sent_ms) as f32 / 2.0 / 1000.0
    }

    pub fn push(&mut self, one_way_seconds: f32) {
        if !one_way_seconds.is_finite() || one_way_seconds < 0.0 {
            log::warn!("ignoring latency sample {one_way_seconds}");
            return;
        }
        while self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(one_way_seconds);
        self.recompute();
    }

    pub fn push_round_trip(&mut self, now_ms: u32, sent_ms: u32) {
        self.push(Self::one_way_from_round_trip(now_ms, sent_ms));
    }

    fn recompute(&mut self) {
        let count = self.samples.len();
        if count == 0 {
            self.mean = 0.0;
            self.std_dev = 0.0;
            return;
        }

        let mean = self.samples.iter().map(|s| *s as f64).sum::<f64>() / count as f64;
        let variance = if count > 1 {
            self.samples
                .iter()
                .map(|s| (*s as f64 - mean).powi(2))
                .sum::<f64>()
                / (count - 1) as f64
        } else {
            0.0
        };

        self.mean = mean as f32;
        self.std_dev = variance.sqrt() as f32;
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn std_dev(&self) -> f32 {
        self.std_dev
    }

    /// Three standard deviations of the one-way latency.
    pub fn jitter(&self) -> f32 {
        3.0 * self.std_dev
    }

    pub fn is_ready(&self) -> bool {
        self.samples.len() >= self.min_samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.recompute();
    }
}
