use std::collections::VecDeque;

use tether::{
    BodyMover, CharacterMotor, CharacterState, Command, CommandAggregator, CommandSnapshot, Tick,
};

/// Steps ending this close to a tick boundary count as ending on it.
const BOUNDARY_EPSILON: f64 = 1e-4;

/// One client physics step: the span it covered on the prediction timeline
/// and the commands sampled during it.
#[derive(Debug, Clone)]
pub struct SubTick {
    pub id: u32,
    pub start: Tick,
    pub end: Tick,
    pub delta: f32,
    pub commands: Vec<Command>,
}

/// Speculative simulation of the locally controlled character with
/// rollback and replay on authoritative updates.
pub struct PredictionEngine {
    history: VecDeque<SubTick>,
    next_id: u32,
    max_history: usize,
    last_acked_tick: Option<u32>,
    entity: Option<CharacterState>,
    motor: CharacterMotor,
    mover: Box<dyn BodyMover + Send>,
    invalidations: u64,
}

impl PredictionEngine {
    pub fn new(motor: CharacterMotor, mover: Box<dyn BodyMover + Send>, max_history: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history),
            next_id: 1,
            max_history: max_history.max(1),
            last_acked_tick: None,
            entity: None,
            motor,
            mover,
            invalidations: 0,
        }
    }

    pub fn entity(&self) -> Option<&CharacterState> {
        self.entity.as_ref()
    }

    pub fn entity_id(&self) -> Option<u32> {
        self.entity.as_ref().map(|entity| entity.entity_id)
    }

    pub fn pending_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_acked_tick(&self) -> Option<u32> {
        self.last_acked_tick
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Starts predicting `state`'s entity, dropping history recorded for a
    /// previously possessed one.
    pub fn possess(&mut self, state: CharacterState) {
        if self.entity_id() != Some(state.entity_id) {
            log::info!("predicting entity {}", state.entity_id);
            self.history.clear();
        }
        self.entity = Some(state);
    }

    pub fn release(&mut self) {
        self.entity = None;
        self.history.clear();
    }

    /// Drops every buffered step. Used when the timeline the steps were
    /// recorded against is no longer valid.
    pub fn invalidate(&mut self) {
        if !self.history.is_empty() {
            self.invalidations += 1;
        }
        self.history.clear();
    }

    /// Resets acknowledgement state for a new tick domain.
    pub fn reset_timeline(&mut self) {
        self.invalidate();
        self.last_acked_tick = None;
    }

    fn allocate_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if id != 0 && !self.history.iter().any(|step| step.id == id) {
                return id;
            }
        }
    }

    /// Records and simulates one physics step covering `[start, end]`.
    pub fn step(&mut self, start: Tick, end: Tick, delta: f32, commands: Vec<Command>) -> u32 {
        if let Some(last) = self.history.back() {
            let ordered = last.start.rate() == start.rate() && start > last.start;
            if !ordered {
                log::warn!(
                    "prediction step at {start} does not follow {}; dropping {} buffered steps",
                    last.start,
                    self.history.len()
                );
                self.invalidate();
            }
        }

        let id = self.allocate_id();

        if let Some(entity) = self.entity.as_mut() {
            self.motor
                .step(entity, &commands, delta, self.mover.as_mut());
        }

        self.history.push_back(SubTick {
            id,
            start,
            end,
            delta,
            commands,
        });
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        id
    }

    /// Rolls back to the authoritative state at `ack_tick` and replays the
    /// steps recorded after it. A step straddling the end of `ack_tick` is
    /// replayed only for the part past the boundary. Returns the number of
    /// replayed steps, or `None` when the update is older than one already
    /// applied.
    pub fn reconcile(&mut self, ack_tick: u32, authoritative: &CharacterState) -> Option<usize> {
        if self.last_acked_tick.is_some_and(|last| ack_tick < last) {
            return None;
        }
        self.last_acked_tick = Some(ack_tick);

        // The authoritative state includes everything simulated up to the
        // start of the next tick.
        let boundary = f64::from(ack_tick) + 1.0;
        while self
            .history
            .front()
            .is_some_and(|step| step.end.as_ticks() <= boundary + BOUNDARY_EPSILON)
        {
            self.history.pop_front();
        }

        let mut entity = authoritative.clone();
        for step in &self.history {
            let start = step.start.as_ticks();
            if start < boundary - BOUNDARY_EPSILON {
                let end = step.end.as_ticks();
                let remaining = ((end - boundary) / (end - start)).clamp(0.0, 1.0) as f32;
                let commands: Vec<Command> =
                    step.commands.iter().filter_map(Command::carried_over).collect();
                self.motor
                    .step(&mut entity, &commands, step.delta * remaining, self.mover.as_mut());
            } else {
                self.motor
                    .step(&mut entity, &step.commands, step.delta, self.mover.as_mut());
            }
        }
        self.entity = Some(entity);
        Some(self.history.len())
    }

    /// Merged per-tick commands for every tick after the last
    /// acknowledged one.
    pub fn command_snapshots(&self) -> Vec<CommandSnapshot> {
        let Some(rate) = self.history.back().map(|step| step.start.rate()) else {
            return Vec::new();
        };

        let mut aggregator = CommandAggregator::new(rate);
        for step in &self.history {
            aggregator.add_sample(step.start, step.end, &step.commands);
        }

        aggregator
            .finish()
            .into_iter()
            .filter(|snapshot| self.last_acked_tick.is_none_or(|acked| snapshot.tick > acked))
            .collect()
    }
}
