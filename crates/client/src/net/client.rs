use std::sync::Arc;
use std::time::{Duration, Instant};

use tether::{
    decode_message, encode_message, BodyMover, CharacterMotor, Command, DeltaCodec, DeltaError,
    DeltaStateSnapshot, Delivery, Message, PacketError, SnapshotError, SnapshotHistory,
    StateSnapshot, Tick,
};

use super::clock::{CatchUp, RateChange, TickClock};
use super::config::ClientConfig;
use super::interpolation::{FrameOutcome, InterpolationBuffer};
use super::prediction::PredictionEngine;
use crate::game::ClientWorld;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("delta against tick {baseline_tick} rejected: {source}")]
    Delta {
        baseline_tick: u32,
        #[source]
        source: DeltaError,
    },
    #[error("no baseline for tick {0}")]
    MissingBaseline(u32),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientStats {
    pub snapshots_received: u64,
    pub snapshots_rejected: u64,
    pub deltas_applied: u64,
    pub deltas_rejected: u64,
    pub hard_catch_ups: u64,
    pub last_clock_error: f32,
    pub time_scale: f32,
    pub buffer_ticks: u32,
    pub pending_commands: usize,
    pub interpolated_entities: usize,
    pub reconciliations: u64,
}

/// Client half of the netcode, free of any socket. Bytes from the server go
/// into [`receive`](Self::receive); bytes for the server come out of
/// [`drain_outgoing`](Self::drain_outgoing).
pub struct NetworkClient {
    config: ClientConfig,
    epoch: Instant,
    last_advance: Option<Instant>,
    next_sync: Option<Instant>,
    clock: TickClock,
    prediction: PredictionEngine,
    interpolation: InterpolationBuffer,
    baselines: SnapshotHistory,
    last_step_end: Option<Tick>,
    pending_reset: bool,
    outgoing: Vec<(Delivery, Vec<u8>)>,
    stats: ClientStats,
}

impl NetworkClient {
    pub fn new(config: ClientConfig, mover: Box<dyn BodyMover + Send>, now: Instant) -> Self {
        let motor = CharacterMotor::new(config.motion);
        Self {
            epoch: now,
            last_advance: None,
            next_sync: None,
            clock: TickClock::new(config.clock.clone()),
            prediction: PredictionEngine::new(motor, mover, config.max_prediction_history),
            interpolation: InterpolationBuffer::new(config.max_buffered_snapshots),
            baselines: SnapshotHistory::new(config.max_baselines),
            last_step_end: None,
            pending_reset: false,
            outgoing: Vec::new(),
            stats: ClientStats {
                time_scale: 1.0,
                ..Default::default()
            },
            config,
        }
    }

    pub fn player_id(&self) -> u32 {
        self.config.player_id
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn prediction(&self) -> &PredictionEngine {
        &self.prediction
    }

    pub fn interpolation(&self) -> &InterpolationBuffer {
        &self.interpolation
    }

    pub fn is_ready(&self) -> bool {
        self.clock.is_ready()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            time_scale: self.clock.time_scale(),
            buffer_ticks: self.clock.buffer_ticks(),
            pending_commands: self.prediction.pending_len(),
            ..self.stats
        }
    }

    /// Asks for the tick rate and fills the latency window.
    pub fn start(&mut self, now: Instant) {
        self.advance_clock(now);
        self.send(Message::SyncInfoRequest);
        for _ in 0..self.config.clock.min_samples.max(1) {
            self.send_sync_request(now);
        }
        self.next_sync = Some(now + self.sync_interval());
    }

    pub fn drain_outgoing(&mut self) -> Vec<(Delivery, Vec<u8>)> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn receive(&mut self, bytes: &[u8], now: Instant) -> Result<(), ClientError> {
        let message = decode_message(bytes)?;
        match message {
            Message::Sync {
                client_send_time,
                server_tick,
                server_tick_elapsed,
            } => self.handle_sync(now, client_send_time, server_tick, server_tick_elapsed),
            Message::SyncInfo {
                server_ticks_per_second,
            } => self.handle_sync_info(server_ticks_per_second),
            Message::StateSnapshot(snapshot) => {
                if let Err(error) = snapshot.validate() {
                    self.stats.snapshots_rejected += 1;
                    return Err(error.into());
                }
                self.accept_snapshot(snapshot);
            }
            Message::DeltaStateSnapshot(delta) => self.handle_delta(delta)?,
            other => log::warn!("client ignoring unexpected {} message", other.name()),
        }
        Ok(())
    }

    /// Render-rate update: moves the clock to `now`, keeps the pinger going
    /// and plays back interpolated state into `world`.
    pub fn frame(&mut self, now: Instant, world: &mut ClientWorld) -> FrameOutcome {
        self.advance_clock(now);
        self.poll_sync(now);

        if std::mem::take(&mut self.pending_reset) {
            self.interpolation.clear(world);
            world.clear();
        }

        let Some(render) = self.clock.interpolation_tick() else {
            return FrameOutcome::Waiting;
        };
        let outcome = self.interpolation.update(render, world);
        if let FrameOutcome::Interpolated { entities, .. } = outcome {
            self.stats.interpolated_entities = entities;
        }

        if let Some(entity) = self.prediction.entity() {
            world.apply_prediction(entity);
        }
        outcome
    }

    /// Fixed-rate update: predicts the possessed character one step ahead
    /// and sends every unacknowledged tick's merged commands. Returns the
    /// step id, or `None` while the clock is not synchronized.
    pub fn physics_step(&mut self, now: Instant, delta: f32, commands: Vec<Command>) -> Option<u32> {
        self.advance_clock(now);
        let end = self.clock.prediction_tick()?;
        let start = match self.last_step_end {
            Some(previous) if previous.rate() == end.rate() && previous < end => previous,
            _ => end.add_duration(-delta),
        };

        let id = self.prediction.step(start, end, delta, commands);
        self.last_step_end = Some(end);

        let snapshots = self.prediction.command_snapshots();
        if !snapshots.is_empty() {
            self.send(Message::RecentCommandSnapshots(snapshots));
        }
        Some(id)
    }

    fn sync_interval(&self) -> Duration {
        Duration::from_secs_f32(self.config.sync_interval_secs.max(0.01))
    }

    fn millis_since_start(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.epoch).as_millis() as u32
    }

    fn advance_clock(&mut self, now: Instant) {
        let delta = self
            .last_advance
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32());
        self.last_advance = Some(now);
        self.clock.advance(delta);
    }

    fn poll_sync(&mut self, now: Instant) {
        let Some(due) = self.next_sync else {
            return;
        };
        if now >= due {
            self.send_sync_request(now);
            self.next_sync = Some(now + self.sync_interval());
        }
    }

    fn send_sync_request(&mut self, now: Instant) {
        let client_send_time = self.millis_since_start(now);
        self.send(Message::SyncRequest { client_send_time });
    }

    fn send(&mut self, message: Message) {
        let delivery = message.delivery();
        let name = message.name();
        match encode_message(message) {
            Ok(bytes) => self.outgoing.push((delivery, bytes)),
            Err(error) => log::error!("failed to encode {name}: {error}"),
        }
    }

    fn handle_sync(&mut self, now: Instant, client_send_time: u32, server_tick: u32, elapsed: f32) {
        let now_ms = self.millis_since_start(now);
        match self.clock.on_sync(now_ms, client_send_time, server_tick, elapsed) {
            Some(CatchUp::Hard { error_ticks }) => {
                log::info!("clock jumped {error_ticks:+.2} ticks, dropping predicted work");
                self.stats.hard_catch_ups += 1;
                self.stats.last_clock_error = error_ticks;
                self.prediction.invalidate();
                self.interpolation.invalidate();
                self.last_step_end = None;
            }
            Some(CatchUp::Soft { error_ticks, .. }) => {
                self.stats.last_clock_error = error_ticks;
            }
            None => {}
        }
    }

    fn handle_sync_info(&mut self, rate: u32) {
        match self.clock.on_sync_info(rate) {
            RateChange::Changed { .. } => {
                self.baselines.clear();
                self.interpolation.invalidate();
                self.prediction.reset_timeline();
                self.last_step_end = None;
                self.pending_reset = true;
            }
            RateChange::Initialized(_) | RateChange::Unchanged => {}
        }
    }

    fn handle_delta(&mut self, delta: DeltaStateSnapshot) -> Result<(), ClientError> {
        let Some(baseline) = self.baselines.get(delta.baseline_tick).cloned() else {
            self.stats.deltas_rejected += 1;
            return Err(ClientError::MissingBaseline(delta.baseline_tick));
        };
        match DeltaCodec::decode(&baseline, &delta) {
            Ok(snapshot) => {
                self.stats.deltas_applied += 1;
                self.accept_snapshot(snapshot);
                Ok(())
            }
            Err(source) => {
                self.stats.deltas_rejected += 1;
                Err(ClientError::Delta {
                    baseline_tick: delta.baseline_tick,
                    source,
                })
            }
        }
    }

    fn accept_snapshot(&mut self, snapshot: StateSnapshot) {
        let tick = snapshot.tick;
        let snapshot = Arc::new(snapshot);
        self.stats.snapshots_received += 1;

        self.baselines.insert(Arc::clone(&snapshot));
        self.send(Message::StateSnapshotAck { tick });
        self.reconcile(&snapshot);
        self.interpolation.insert(snapshot);
    }

    fn reconcile(&mut self, snapshot: &StateSnapshot) {
        let player_id = self.config.player_id;
        let Some(entity_id) = snapshot.possessed_by(player_id) else {
            if self.prediction.entity().is_some() {
                log::info!("player {player_id} no longer possesses an entity");
                self.prediction.release();
            }
            return;
        };
        let Some(authoritative) = snapshot
            .get(entity_id)
            .and_then(|state| state.as_character())
        else {
            log::warn!("possessed entity {entity_id} missing from snapshot {}", snapshot.tick);
            return;
        };

        if self.prediction.entity_id() != Some(entity_id) {
            self.prediction.possess(authoritative.clone());
        }
        if self.prediction.reconcile(snapshot.tick, authoritative).is_some() {
            self.stats.reconciliations += 1;
        }
    }
}
