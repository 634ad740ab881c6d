use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::transport::Delivery;

/// Impairments applied to one direction of a simulated link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl LinkConditions {
    pub fn is_perfect(&self) -> bool {
        self.loss_percent <= 0.0 && self.max_latency_ms == 0 && self.jitter_ms == 0
    }
}

#[derive(Debug)]
struct DelayedPayload {
    release_time: Instant,
    sequence: u64,
    payload: Vec<u8>,
}

impl PartialEq for DelayedPayload {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time && self.sequence == other.sequence
    }
}

impl Eq for DelayedPayload {}

impl PartialOrd for DelayedPayload {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPayload {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .cmp(&self.release_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

/// One-directional lossy, delayed link. Reliable payloads are delayed but
/// never dropped; unreliable ones may be dropped and reordered by jitter.
#[derive(Debug)]
pub struct LinkSimulator {
    conditions: LinkConditions,
    queue: BinaryHeap<DelayedPayload>,
    rng: StdRng,
    sequence: u64,
    stats: LinkStats,
}

impl LinkSimulator {
    pub fn new(conditions: LinkConditions) -> Self {
        Self::with_rng(conditions, StdRng::from_entropy())
    }

    pub fn seeded(conditions: LinkConditions, seed: u64) -> Self {
        Self::with_rng(conditions, StdRng::seed_from_u64(seed))
    }

    fn with_rng(conditions: LinkConditions, rng: StdRng) -> Self {
        Self {
            conditions,
            queue: BinaryHeap::new(),
            rng,
            sequence: 0,
            stats: LinkStats::default(),
        }
    }

    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    fn should_drop(&mut self, delivery: Delivery) -> bool {
        delivery == Delivery::Unreliable
            && self.conditions.loss_percent > 0.0
            && self.rng.gen_range(0.0..100.0) < self.conditions.loss_percent
    }

    fn delay(&mut self) -> Duration {
        let min = self.conditions.min_latency_ms;
        let max = self.conditions.max_latency_ms.max(min);
        let base = if max > min {
            self.rng.gen_range(min..=max)
        } else {
            min
        };
        let jitter = if self.conditions.jitter_ms > 0 {
            self.rng.gen_range(0..=self.conditions.jitter_ms)
        } else {
            0
        };
        Duration::from_millis((base + jitter) as u64)
    }

    pub fn send(&mut self, payload: Vec<u8>, delivery: Delivery, now: Instant) {
        self.stats.sent += 1;
        if self.should_drop(delivery) {
            self.stats.dropped += 1;
            return;
        }
        let release_time = now + self.delay();
        self.sequence += 1;
        self.queue.push(DelayedPayload {
            release_time,
            sequence: self.sequence,
            payload,
        });
    }

    pub fn take_ready(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut ready = Vec::new();
        while self
            .queue
            .peek()
            .is_some_and(|delayed| delayed.release_time <= now)
        {
            if let Some(delayed) = self.queue.pop() {
                ready.push(delayed.payload);
            }
        }
        self.stats.delivered += ready.len() as u64;
        ready
    }

    pub fn next_release(&self) -> Option<Instant> {
        self.queue.peek().map(|delayed| delayed.release_time)
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}
