use tether::{LatencyEstimator, Tick};

use super::config::ClockConfig;

/// Piecewise-linear easing curve over `[0, 1]`, clamped at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCurve {
    points: Vec<(f32, f32)>,
}

impl Default for SyncCurve {
    fn default() -> Self {
        Self::from_config(&ClockConfig::default().sync_curve)
    }
}

impl SyncCurve {
    pub fn new(points: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut points: Vec<(f32, f32)> = points
            .into_iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.is_empty() {
            points = vec![(0.0, 0.0), (1.0, 0.0)];
        }
        Self { points }
    }

    pub fn from_config(points: &[[f32; 2]]) -> Self {
        Self::new(points.iter().map(|[x, y]| (*x, *y)))
    }

    pub fn sample(&self, x: f32) -> f32 {
        let (first, last) = (self.points[0], self.points[self.points.len() - 1]);
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for window in self.points.windows(2) {
            let (a, b) = (window[0], window[1]);
            if x <= b.0 {
                let span = b.0 - a.0;
                if span <= f32::EPSILON {
                    return b.1;
                }
                return a.1 + (b.1 - a.1) * (x - a.0) / span;
            }
        }
        last.1
    }

    pub fn max_value(&self) -> f32 {
        self.points
            .iter()
            .map(|(_, y)| y.abs())
            .fold(0.0, f32::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CatchUp {
    /// Drift small enough to absorb by running the clock faster or slower.
    Soft { error_ticks: f32, time_scale: f32 },
    /// The predicted tick jumped. Work buffered against the old timeline is
    /// no longer valid.
    Hard { error_ticks: f32 },
}

/// Keeps a continuously advancing estimate of the server tick, ahead by the
/// jitter buffer.
#[derive(Debug, Clone)]
pub struct ClockSynchronizer {
    predicted: Tick,
    time_scale: f32,
    tolerable_tick_difference: f32,
    minimum_tick_buffer: u32,
    curve: SyncCurve,
}

impl ClockSynchronizer {
    pub fn new(rate: u32, config: &ClockConfig) -> Self {
        Self {
            predicted: Tick::new(rate),
            time_scale: 1.0,
            tolerable_tick_difference: config.tolerable_tick_difference.max(0.0),
            minimum_tick_buffer: config.minimum_tick_buffer,
            curve: SyncCurve::from_config(&config.sync_curve),
        }
    }

    pub fn predicted(&self) -> Tick {
        self.predicted
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn rate(&self) -> u32 {
        self.predicted.rate()
    }

    pub fn curve(&self) -> &SyncCurve {
        &self.curve
    }

    pub fn advance(&mut self, frame_delta: f32) -> Tick {
        self.predicted = self.predicted.add_duration(frame_delta * self.time_scale);
        self.predicted
    }

    /// Where the predicted tick should be given a server reply: the server
    /// tick at reply time, plus the jitter buffer, plus the reply's travel time.
    pub fn preferred_tick(
        &self,
        server_tick: u32,
        server_tick_elapsed: f32,
        latency: &LatencyEstimator,
    ) -> Tick {
        let rate = self.rate();
        let interval = self.predicted.interval();
        let buffer_ticks = (latency.jitter() * rate as f32)
            .ceil()
            .max(self.minimum_tick_buffer as f32);

        Tick::at(rate, server_tick, 0.0)
            .add_duration(server_tick_elapsed.clamp(0.0, interval))
            .add_ticks(buffer_ticks)
            .add_duration(latency.mean())
    }

    pub fn catch_up(&mut self, preferred: Tick) -> CatchUp {
        let error_ticks = Tick::ticks_between(self.predicted, preferred);

        if error_ticks.abs() > self.tolerable_tick_difference {
            log::debug!(
                "hard catch-up from {} to {} ({error_ticks:+.2} ticks)",
                self.predicted,
                preferred
            );
            self.predicted = preferred;
            self.time_scale = 1.0;
            return CatchUp::Hard { error_ticks };
        }

        let offset = if self.tolerable_tick_difference > 0.0 {
            (error_ticks.abs() / self.tolerable_tick_difference).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let correction = self.curve.sample(offset);
        // Behind the preferred tick means running faster.
        self.time_scale = if error_ticks >= 0.0 {
            1.0 + correction
        } else {
            1.0 - correction
        };

        CatchUp::Soft {
            error_ticks,
            time_scale: self.time_scale,
        }
    }
}

/// Integer view of a continuous tick buffer that only moves once the value
/// leaves a hysteresis band, so the displayed size does not flicker.
#[derive(Debug, Clone)]
pub struct TickBufferGauge {
    shown: Option<u32>,
    threshold: f32,
}

impl TickBufferGauge {
    pub fn new(threshold: f32) -> Self {
        Self {
            shown: None,
            threshold,
        }
    }

    pub fn update(&mut self, ticks: f32) -> u32 {
        let ticks = ticks.max(0.0);
        let shown = match self.shown {
            Some(shown) if (ticks - shown as f32).abs() <= self.threshold => shown,
            _ => ticks.round() as u32,
        };
        self.shown = Some(shown);
        shown
    }

    pub fn shown(&self) -> u32 {
        self.shown.unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.shown = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateChange {
    Unchanged,
    Initialized(u32),
    Changed { from: u32, to: u32 },
}

/// Latency estimate plus synchronized clock, the single writer of the
/// client's notion of server time.
#[derive(Debug, Clone)]
pub struct TickClock {
    config: ClockConfig,
    latency: LatencyEstimator,
    sync: Option<ClockSynchronizer>,
    synced: bool,
    gauge: TickBufferGauge,
}

impl TickClock {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            latency: LatencyEstimator::new(config.sample_window, config.min_samples),
            gauge: TickBufferGauge::new(config.buffer_display_threshold),
            sync: None,
            synced: false,
            config,
        }
    }

    pub fn latency(&self) -> &LatencyEstimator {
        &self.latency
    }

    pub fn rate(&self) -> Option<u32> {
        self.sync.as_ref().map(ClockSynchronizer::rate)
    }

    pub fn is_ready(&self) -> bool {
        self.synced
    }

    pub fn time_scale(&self) -> f32 {
        self.sync.as_ref().map_or(1.0, ClockSynchronizer::time_scale)
    }

    pub fn on_sync_info(&mut self, rate: u32) -> RateChange {
        if rate == 0 {
            log::warn!("ignoring sync info with a zero tick rate");
            return RateChange::Unchanged;
        }
        match self.rate() {
            Some(current) if current == rate => RateChange::Unchanged,
            previous => {
                self.sync = Some(ClockSynchronizer::new(rate, &self.config));
                self.synced = false;
                self.gauge.reset();
                match previous {
                    Some(from) => {
                        log::warn!("server tick rate changed from {from} to {rate}");
                        RateChange::Changed { from, to: rate }
                    }
                    None => {
                        log::info!("server runs at {rate} ticks per second");
                        RateChange::Initialized(rate)
                    }
                }
            }
        }
    }

    /// Feeds a `Sync` reply. Returns the catch-up decision once both the
    /// rate and enough latency samples are known.
    pub fn on_sync(
        &mut self,
        now_ms: u32,
        client_send_time: u32,
        server_tick: u32,
        server_tick_elapsed: f32,
    ) -> Option<CatchUp> {
        self.latency.push_round_trip(now_ms, client_send_time);
        if !self.latency.is_ready() {
            return None;
        }
        let sync = self.sync.as_mut()?;
        let preferred = sync.preferred_tick(server_tick, server_tick_elapsed, &self.latency);
        let catch_up = sync.catch_up(preferred);
        self.synced = true;
        Some(catch_up)
    }

    pub fn advance(&mut self, delta: f32) {
        if let Some(sync) = self.sync.as_mut() {
            sync.advance(delta);
        }
        if self.synced {
            let margin = self.margin_ticks();
            self.gauge.update(margin);
        }
    }

    /// Seconds between the synchronized tick and both the render and the
    /// prediction cursors.
    pub fn margin_seconds(&self) -> f32 {
        let interval = self
            .sync
            .as_ref()
            .map_or(0.0, |sync| sync.predicted().interval());
        self.latency.jitter() + self.latency.mean() + self.config.safe_tick_margin * interval
    }

    fn margin_ticks(&self) -> f32 {
        self.rate()
            .map_or(0.0, |rate| self.margin_seconds() * rate as f32)
    }

    pub fn buffer_ticks(&self) -> u32 {
        self.gauge.shown()
    }

    pub fn predicted_tick(&self) -> Option<Tick> {
        if !self.synced {
            return None;
        }
        self.sync.as_ref().map(ClockSynchronizer::predicted)
    }

    pub fn interpolation_tick(&self) -> Option<Tick> {
        self.predicted_tick()
            .map(|tick| tick.add_duration(-self.margin_seconds()))
    }

    pub fn prediction_tick(&self) -> Option<Tick> {
        self.predicted_tick()
            .map(|tick| tick.add_duration(self.margin_seconds()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_latency(samples: &[f32]) -> LatencyEstimator {
        let mut latency = LatencyEstimator::new(30, 1);
        for sample in samples {
            latency.push(*sample);
        }
        latency
    }

    #[test]
    fn curve_interpolates_and_clamps() {
        let curve = SyncCurve::new([(0.0, 0.0), (1.0, 0.2)]);
        assert!((curve.sample(0.5) - 0.1).abs() < 1e-6);
        assert_eq!(curve.sample(-1.0), 0.0);
        assert_eq!(curve.sample(3.0), 0.2);
        assert_eq!(curve.max_value(), 0.2);
    }

    #[test]
    fn large_error_snaps() {
        let config = ClockConfig::default();
        let mut sync = ClockSynchronizer::new(60, &config);
        let preferred = sync.predicted().add_ticks(10.0);

        let catch_up = sync.catch_up(preferred);
        assert!(matches!(catch_up, CatchUp::Hard { .. }));
        assert_eq!(sync.predicted(), preferred);
        assert_eq!(sync.time_scale(), 1.0);
    }

    #[test]
    fn small_error_scales_time_without_jumping() {
        let config = ClockConfig::default();
        let mut sync = ClockSynchronizer::new(60, &config);
        sync.catch_up(Tick::at(60, 100, 0.0));
        let before = sync.predicted();

        let catch_up = sync.catch_up(Tick::at(60, 101, 0.0));
        let max = sync.curve().max_value();
        match catch_up {
            CatchUp::Soft { time_scale, .. } => {
                assert!(time_scale > 1.0);
                assert!(time_scale <= 1.0 + max);
            }
            other => panic!("expected soft catch-up, got {other:?}"),
        }
        assert_eq!(sync.predicted(), before);

        sync.catch_up(Tick::at(60, 99, 0.0));
        assert!(sync.time_scale() < 1.0);
        assert!(sync.time_scale() >= 1.0 - max);
    }

    #[test]
    fn advance_uses_time_scale() {
        let config = ClockConfig::default();
        let mut sync = ClockSynchronizer::new(10, &config);
        sync.catch_up(Tick::at(10, 50, 0.0));
        sync.catch_up(Tick::at(10, 51, 0.5 / 10.0));
        let scale = sync.time_scale();

        let start = sync.predicted();
        let end = sync.advance(1.0);
        let advanced = Tick::duration_between(start, end);
        assert!((advanced - scale).abs() < 1e-4);
    }

    #[test]
    fn preferred_tick_respects_minimum_buffer() {
        let config = ClockConfig::default();
        let sync = ClockSynchronizer::new(20, &config);
        let latency = ready_latency(&[0.1, 0.1, 0.1]);

        let preferred = sync.preferred_tick(40, 0.0, &latency);
        assert!((preferred.as_ticks() - 44.0).abs() < 1e-3);
    }

    #[test]
    fn preferred_tick_grows_with_jitter() {
        let config = ClockConfig::default();
        let sync = ClockSynchronizer::new(20, &config);
        let latency = ready_latency(&[0.0, 0.2, 0.0, 0.2]);

        let buffer = (latency.jitter() * 20.0).ceil();
        assert!(buffer > 2.0);
        let preferred = sync.preferred_tick(40, 0.0, &latency);
        let expected = 40.0 + buffer as f64 + latency.mean() as f64 * 20.0;
        assert!((preferred.as_ticks() - expected).abs() < 1e-3);
    }

    #[test]
    fn gauge_applies_hysteresis() {
        let mut gauge = TickBufferGauge::new(1.5);
        assert_eq!(gauge.update(4.2), 4);
        assert_eq!(gauge.update(5.4), 4);
        assert_eq!(gauge.update(2.6), 4);
        assert_eq!(gauge.update(5.6), 6);
    }

    #[test]
    fn clock_is_ready_after_rate_and_samples() {
        let mut clock = TickClock::new(ClockConfig {
            min_samples: 2,
            ..Default::default()
        });
        assert_eq!(clock.on_sync(100, 60, 10, 0.0), None);
        assert_eq!(clock.on_sync_info(30), RateChange::Initialized(30));
        assert!(!clock.is_ready());

        let catch_up = clock.on_sync(200, 160, 12, 0.0);
        assert!(matches!(catch_up, Some(CatchUp::Hard { .. })));
        assert!(clock.is_ready());

        let predicted = clock.predicted_tick().unwrap();
        let render = clock.interpolation_tick().unwrap();
        let prediction = clock.prediction_tick().unwrap();
        assert!(render < predicted);
        assert!(predicted < prediction);
    }

    #[test]
    fn rate_change_restarts_synchronization() {
        let mut clock = TickClock::new(ClockConfig {
            min_samples: 1,
            ..Default::default()
        });
        clock.on_sync_info(30);
        clock.on_sync(10, 0, 5, 0.0);
        assert!(clock.is_ready());

        assert_eq!(clock.on_sync_info(30), RateChange::Unchanged);
        assert_eq!(
            clock.on_sync_info(60),
            RateChange::Changed { from: 30, to: 60 }
        );
        assert!(!clock.is_ready());
        assert_eq!(clock.rate(), Some(60));
    }
}
