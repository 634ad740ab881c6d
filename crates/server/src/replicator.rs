use std::collections::BTreeMap;
use std::sync::Arc;

use tether::{
    encode_message, DeltaCodec, Message, PacketError, PeerId, SnapshotHistory, StateSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    /// The peer has no acknowledged baseline yet.
    Full,
    Delta { baseline_tick: u32 },
    /// A baseline was acknowledged but is gone, or the delta would not be
    /// smaller than the full snapshot.
    FullFallback { baseline_tick: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Accepted,
    /// Not newer than the peer's current baseline.
    Stale,
    /// Names a tick that was never produced.
    Future,
    UnknownPeer,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicatorStats {
    pub full_sent: u64,
    pub delta_sent: u64,
    pub fallbacks: u64,
    pub evicted: u64,
}

/// Authoritative snapshot history plus the per-peer ack table. The tick
/// loop is its only writer.
#[derive(Debug)]
pub struct SnapshotReplicator {
    history: SnapshotHistory,
    acks: BTreeMap<PeerId, Option<u32>>,
    latest_tick: Option<u32>,
    stats: ReplicatorStats,
}

impl SnapshotReplicator {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: SnapshotHistory::new(max_history),
            acks: BTreeMap::new(),
            latest_tick: None,
            stats: ReplicatorStats::default(),
        }
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn stats(&self) -> ReplicatorStats {
        self.stats
    }

    pub fn has_peers(&self) -> bool {
        !self.acks.is_empty()
    }

    pub fn peer_count(&self) -> usize {
        self.acks.len()
    }

    pub fn last_ack(&self, peer: PeerId) -> Option<u32> {
        self.acks.get(&peer).copied().flatten()
    }

    pub fn add_peer(&mut self, peer: PeerId) {
        self.acks.entry(peer).or_insert(None);
    }

    pub fn remove_peer(&mut self, peer: PeerId) -> bool {
        let removed = self.acks.remove(&peer).is_some();
        if removed {
            self.prune();
        }
        removed
    }

    pub fn acknowledge(&mut self, peer: PeerId, tick: u32) -> AckOutcome {
        if self.latest_tick.is_none_or(|latest| tick > latest) {
            log::warn!("peer {peer} acknowledged tick {tick} which was never sent");
            return AckOutcome::Future;
        }
        let Some(last) = self.acks.get_mut(&peer) else {
            return AckOutcome::UnknownPeer;
        };
        if last.is_some_and(|last| tick <= last) {
            return AckOutcome::Stale;
        }
        *last = Some(tick);
        AckOutcome::Accepted
    }

    /// Stores this tick's snapshot while any peer could use it as a
    /// baseline, then prunes.
    pub fn record(&mut self, snapshot: Arc<StateSnapshot>) {
        self.latest_tick = Some(snapshot.tick);
        if self.acks.is_empty() {
            self.history.clear();
            return;
        }

        let evicted = self.history.insert(snapshot);
        if evicted > 0 {
            log::warn!(
                "snapshot history exceeded {} entries, evicted {evicted}",
                self.history.capacity()
            );
            self.stats.evicted += evicted as u64;
        }
        self.prune();
    }

    /// Keeps snapshots at or after the oldest baseline any peer might still
    /// reference. Peers without an ack hold nothing back.
    pub fn prune(&mut self) {
        if self.acks.is_empty() {
            self.history.clear();
            return;
        }
        if let Some(oldest) = self.acks.values().flatten().min() {
            self.history.retain_from(*oldest);
        }
    }

    /// Encodes `snapshot` for every peer, full or as a delta against the
    /// peer's acknowledged baseline, whichever is smaller.
    pub fn replicate(
        &mut self,
        snapshot: &StateSnapshot,
    ) -> Result<Vec<(PeerId, SendKind, Vec<u8>)>, PacketError> {
        if self.acks.is_empty() {
            return Ok(Vec::new());
        }
        let full = encode_message(Message::StateSnapshot(snapshot.clone()))?;

        let mut sends = Vec::with_capacity(self.acks.len());
        for (peer, ack) in &self.acks {
            let (kind, bytes) = match ack {
                None => (SendKind::Full, full.clone()),
                Some(baseline_tick) => match self.history.get(*baseline_tick) {
                    None => (
                        SendKind::FullFallback {
                            baseline_tick: *baseline_tick,
                        },
                        full.clone(),
                    ),
                    Some(baseline) => {
                        let delta = DeltaCodec::encode(baseline, snapshot);
                        let encoded = encode_message(Message::DeltaStateSnapshot(delta))?;
                        if encoded.len() < full.len() {
                            (
                                SendKind::Delta {
                                    baseline_tick: *baseline_tick,
                                },
                                encoded,
                            )
                        } else {
                            (
                                SendKind::FullFallback {
                                    baseline_tick: *baseline_tick,
                                },
                                full.clone(),
                            )
                        }
                    }
                },
            };
            match kind {
                SendKind::Full => self.stats.full_sent += 1,
                SendKind::Delta { .. } => self.stats.delta_sent += 1,
                SendKind::FullFallback { .. } => self.stats.fallbacks += 1,
            }
            sends.push((*peer, kind, bytes));
        }
        Ok(sends)
    }
}
