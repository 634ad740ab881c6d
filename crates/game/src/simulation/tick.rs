use std::cmp::Ordering;
use std::fmt;

/// Snap window used when normalizing the intra-tick fraction. Repeated float
/// subtraction otherwise leaves values a hair below the interval.
const EPSILON: f64 = 1e-6;

/// Continuous time expressed as a tick count plus the seconds already spent
/// inside that tick, at a fixed tick rate.
///
/// The fraction always satisfies `0 <= fraction < 1 / rate`. Ticks of
/// different rates live in different time domains: comparing them is a
/// programming error and panics.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    count: u32,
    fraction: f32,
    rate: u32,
}

impl Tick {
    pub fn new(rate: u32) -> Self {
        assert!(rate > 0, "tick rate must be positive");
        Self {
            count: 1,
            fraction: 0.0,
            rate,
        }
    }

    pub fn at(rate: u32, count: u32, fraction: f32) -> Self {
        Self::new(rate).with_time(count, fraction)
    }

    /// Replaces count and fraction, normalizing a fraction that spills over
    /// the tick interval.
    pub fn with_time(self, count: u32, fraction: f32) -> Self {
        Self {
            count,
            fraction: 0.0,
            rate: self.rate,
        }
        .add_duration(fraction)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn interval(&self) -> f32 {
        1.0 / self.rate as f32
    }

    /// Position on the tick axis, e.g. `10.5` for halfway through tick 10.
    pub fn as_ticks(&self) -> f64 {
        self.count as f64 + self.fraction as f64 * self.rate as f64
    }

    pub fn as_seconds(&self) -> f64 {
        self.count as f64 / self.rate as f64 + self.fraction as f64
    }

    /// Integrates `duration` seconds (negative moves backwards). The count
    /// saturates at zero instead of wrapping.
    #[must_use]
    pub fn add_duration(self, duration: f32) -> Self {
        let interval = 1.0 / self.rate as f64;
        let total = self.fraction as f64 + duration as f64;

        let mut delta_ticks = (total / interval).floor();
        let mut fraction = total - delta_ticks * interval;
        if fraction >= interval - EPSILON {
            delta_ticks += 1.0;
            fraction = 0.0;
        }
        let fraction = fraction.max(0.0);

        let count = (self.count as f64 + delta_ticks).clamp(0.0, u32::MAX as f64) as u32;
        Self {
            count,
            fraction: fraction as f32,
            rate: self.rate,
        }
    }

    #[must_use]
    pub fn add_ticks(self, ticks: f32) -> Self {
        self.add_duration(ticks / self.rate as f32)
    }

    /// Signed seconds from `start` to `end`. Logs and returns zero when the
    /// rates differ.
    pub fn duration_between(start: Tick, end: Tick) -> f32 {
        if start.rate != end.rate {
            log::error!(
                "tried to measure duration between ticks of rate {} and {}",
                start.rate,
                end.rate
            );
            return 0.0;
        }
        let ticks = end.count as f64 - start.count as f64;
        (ticks / start.rate as f64 + end.fraction as f64 - start.fraction as f64) as f32
    }

    /// Signed distance from `start` to `end` measured in ticks.
    pub fn ticks_between(start: Tick, end: Tick) -> f32 {
        Self::duration_between(start, end) * start.rate as f32
    }

    fn assert_same_rate(&self, other: &Tick) {
        assert_eq!(
            self.rate, other.rate,
            "compared ticks from different rate domains"
        );
    }
}

impl PartialEq for Tick {
    fn eq(&self, other: &Self) -> bool {
        self.assert_same_rate(other);
        self.count == other.count && self.fraction == other.fraction
    }
}

impl PartialOrd for Tick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.assert_same_rate(other);
        match self.count.cmp(&other.count) {
            Ordering::Equal => self.fraction.partial_cmp(&other.fraction),
            ordering => Some(ordering),
        }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:.4}", self.count, self.fraction)
    }
}
