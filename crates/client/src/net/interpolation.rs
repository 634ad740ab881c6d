use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tether::{EntityState, StateSnapshot, Tick};

use crate::game::EntityContainer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// No snapshot at or before the render tick yet.
    Waiting,
    /// Past anchor adopted but nothing newer to blend towards.
    Holding { past: u32 },
    Interpolated {
        past: u32,
        future: u32,
        theta: f32,
        entities: usize,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolationStats {
    pub buffered: usize,
    pub duplicates: u64,
    pub spawn_failures: u64,
    pub mismatches: u64,
}

/// Plays back received snapshots slightly in the past, blending between the
/// two snapshots that bracket the render tick.
#[derive(Debug)]
pub struct InterpolationBuffer {
    snapshots: BTreeMap<u32, Arc<StateSnapshot>>,
    capacity: usize,
    adopted: Option<u32>,
    /// Entities currently spawned in the container, with the state they
    /// were last adopted with.
    spawned: HashMap<u32, Arc<EntityState>>,
    stats: InterpolationStats,
}

impl InterpolationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: BTreeMap::new(),
            capacity: capacity.max(2),
            adopted: None,
            spawned: HashMap::new(),
            stats: InterpolationStats::default(),
        }
    }

    pub fn insert(&mut self, snapshot: Arc<StateSnapshot>) {
        let tick = snapshot.tick;
        if self.snapshots.insert(tick, snapshot).is_some() {
            log::warn!("snapshot for tick {tick} received twice, keeping the newest copy");
            self.stats.duplicates += 1;
        }
        while self.snapshots.len() > self.capacity {
            // The adopted anchor stays until a newer one replaces it.
            let evicted = self
                .snapshots
                .keys()
                .copied()
                .find(|tick| Some(*tick) != self.adopted);
            match evicted {
                Some(tick) => self.snapshots.remove(&tick),
                None => break,
            };
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn adopted_tick(&self) -> Option<u32> {
        self.adopted
    }

    pub fn spawned_len(&self) -> usize {
        self.spawned.len()
    }

    pub fn stats(&self) -> InterpolationStats {
        InterpolationStats {
            buffered: self.snapshots.len(),
            ..self.stats
        }
    }

    /// Drops buffered snapshots and the adopted anchor. Spawned entities
    /// stay in the container until the next anchor is diffed against them.
    pub fn invalidate(&mut self) {
        self.snapshots.clear();
        self.adopted = None;
    }

    /// Despawns everything spawned so far and drops all snapshots.
    pub fn clear(&mut self, container: &mut dyn EntityContainer) {
        for entity_id in self.spawned.drain().map(|(entity_id, _)| entity_id) {
            container.despawn(entity_id);
        }
        self.snapshots.clear();
        self.adopted = None;
    }

    pub fn update(&mut self, render: Tick, container: &mut dyn EntityContainer) -> FrameOutcome {
        let Some(past_tick) = self
            .snapshots
            .range(..=render.count())
            .next_back()
            .map(|(tick, _)| *tick)
        else {
            return FrameOutcome::Waiting;
        };
        self.snapshots = self.snapshots.split_off(&past_tick);

        let Some(past) = self.snapshots.get(&past_tick).cloned() else {
            return FrameOutcome::Waiting;
        };
        if self.adopted_tick() != Some(past_tick) {
            self.adopt(Arc::clone(&past), container);
        }

        let Some(future) = self
            .snapshots
            .range(past_tick + 1..)
            .next()
            .map(|(_, snapshot)| Arc::clone(snapshot))
        else {
            return FrameOutcome::Holding { past: past_tick };
        };

        let span = (future.tick - past.tick) as f64;
        let theta = ((render.as_ticks() - past.tick as f64) / span) as f32;

        let future_states: HashMap<u32, &Arc<EntityState>> = future
            .states
            .iter()
            .map(|state| (state.entity_id(), state))
            .collect();

        let mut entities = 0;
        for state in &past.states {
            let Some(next) = future_states.get(&state.entity_id()) else {
                continue;
            };
            match state.interpolate(next, theta) {
                Ok(blended) => {
                    container.apply_state(&blended);
                    entities += 1;
                }
                Err(mismatch) => {
                    log::warn!("{mismatch}; skipping it this frame");
                    self.stats.mismatches += 1;
                }
            }
        }

        FrameOutcome::Interpolated {
            past: past.tick,
            future: future.tick,
            theta,
            entities,
        }
    }

    fn adopt(&mut self, anchor: Arc<StateSnapshot>, container: &mut dyn EntityContainer) {
        let current: HashMap<u32, &Arc<EntityState>> = anchor
            .states
            .iter()
            .map(|state| (state.entity_id(), state))
            .collect();

        let mut gone: Vec<u32> = self
            .spawned
            .iter()
            .filter(|(entity_id, old)| {
                current
                    .get(*entity_id)
                    .is_none_or(|new| !new.same_shape(old))
            })
            .map(|(entity_id, _)| *entity_id)
            .collect();
        gone.sort_unstable();
        for entity_id in gone {
            self.spawned.remove(&entity_id);
            container.despawn(entity_id);
        }

        for state in &anchor.states {
            if self.spawned.contains_key(&state.entity_id()) {
                self.spawned.insert(state.entity_id(), Arc::clone(state));
                continue;
            }
            if let Err(error) = container.spawn(state) {
                log::error!("failed to spawn entity {}: {error}", state.entity_id());
                self.stats.spawn_failures += 1;
            } else {
                container.apply_state(state);
                self.spawned.insert(state.entity_id(), Arc::clone(state));
            }
        }

        for meta in &anchor.meta {
            container.apply_meta(meta);
        }

        self.adopted = Some(anchor.tick);
    }
}
