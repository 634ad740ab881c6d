use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tether::{
    decode_message, encode_message, CommandSnapshot, Delivery, Message, Outgoing, PacketError,
    PeerId, Tick, TransportError,
};

use crate::config::{ConfigError, ServerConfig};
use crate::events::ServerEvent;
use crate::inbox::{CommandInbox, InboxOutcome};
use crate::replicator::{AckOutcome, ReplicatorStats, SnapshotReplicator};
use crate::world::ServerWorld;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// Effects of incoming messages, applied at the next tick boundary.
#[derive(Debug)]
enum QueuedEffect {
    Ack { peer: PeerId, tick: u32 },
    Commands { peer: PeerId, snapshots: Vec<CommandSnapshot> },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStats {
    pub tick: u32,
    pub peers: usize,
    pub entities: usize,
    pub history: usize,
    pub stale_commands: u64,
    pub rejected_commands: u64,
    pub ignored_acks: u64,
    pub replication: ReplicatorStats,
}

/// Authoritative tick loop without any socket. Transports feed bytes into
/// [`receive`](Self::receive), call [`tick`](Self::tick) at the configured
/// rate and ship whatever [`drain_outgoing`](Self::drain_outgoing) returns.
pub struct GameServer {
    config: ServerConfig,
    tick: Tick,
    tick_started: Option<Instant>,
    world: ServerWorld,
    replicator: SnapshotReplicator,
    inboxes: BTreeMap<PeerId, CommandInbox>,
    queued: VecDeque<QueuedEffect>,
    outgoing: Vec<Outgoing>,
    events: VecDeque<ServerEvent>,
    stats: ServerStats,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        let world = ServerWorld::new(&config);
        Self::with_world(config, world)
    }

    pub fn with_world(config: ServerConfig, world: ServerWorld) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tick: Tick::at(config.tick_rate, 0, 0.0),
            tick_started: None,
            world,
            replicator: SnapshotReplicator::new(config.max_snapshot_history),
            inboxes: BTreeMap::new(),
            queued: VecDeque::new(),
            outgoing: Vec::new(),
            events: VecDeque::new(),
            stats: ServerStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn world(&self) -> &ServerWorld {
        &self.world
    }

    pub fn replicator(&self) -> &SnapshotReplicator {
        &self.replicator
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.inboxes.contains_key(&peer)
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.tick.count(),
            peers: self.inboxes.len(),
            entities: self.world.entity_count(),
            history: self.replicator.history().len(),
            replication: self.replicator.stats(),
            ..self.stats
        }
    }

    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.events.drain(..)
    }

    /// Registers `peer` and spawns its character. Returns the entity id.
    pub fn connect_peer(&mut self, peer: PeerId) -> u32 {
        let entity_id = self.world.spawn_player(peer);
        if self.inboxes.contains_key(&peer) {
            log::warn!("peer {peer} connected twice");
            return entity_id;
        }
        self.inboxes
            .insert(peer, CommandInbox::new(self.config.command_horizon_ticks));
        self.replicator.add_peer(peer);
        log::info!("peer {peer} connected, possessing entity {entity_id}");
        self.events
            .push_back(ServerEvent::PeerConnected { peer, entity_id });
        entity_id
    }

    pub fn disconnect_peer(&mut self, peer: PeerId) -> Result<(), TransportError> {
        if self.inboxes.remove(&peer).is_none() {
            return Err(TransportError::UnknownPeer(peer));
        }
        self.replicator.remove_peer(peer);
        self.queued.retain(|effect| match effect {
            QueuedEffect::Ack { peer: owner, .. } | QueuedEffect::Commands { peer: owner, .. } => {
                *owner != peer
            }
        });
        let entity_id = self.world.despawn_player(peer);
        log::info!("peer {peer} disconnected");
        self.events
            .push_back(ServerEvent::PeerDisconnected { peer, entity_id });
        Ok(())
    }

    /// Handles one datagram. Sync requests are answered right away; acks
    /// and commands wait for the next tick.
    pub fn receive(&mut self, peer: PeerId, bytes: &[u8], now: Instant) -> Result<(), ServerError> {
        if !self.inboxes.contains_key(&peer) {
            return Err(TransportError::UnknownPeer(peer).into());
        }
        let message = match decode_message(bytes) {
            Ok(message) => message,
            Err(error) => {
                self.events.push_back(ServerEvent::DecodeError {
                    peer,
                    message: error.to_string(),
                });
                return Err(error.into());
            }
        };

        match message {
            Message::SyncRequest { client_send_time } => {
                let elapsed = self
                    .tick_started
                    .map_or(0.0, |started| now.saturating_duration_since(started).as_secs_f32());
                self.send(
                    peer,
                    Message::Sync {
                        client_send_time,
                        server_tick: self.tick.count(),
                        server_tick_elapsed: elapsed,
                    },
                )?;
            }
            Message::SyncInfoRequest => {
                self.send(
                    peer,
                    Message::SyncInfo {
                        server_ticks_per_second: self.config.tick_rate,
                    },
                )?;
            }
            Message::StateSnapshotAck { tick } => {
                self.queued.push_back(QueuedEffect::Ack { peer, tick });
            }
            Message::RecentCommandSnapshots(snapshots) => {
                self.queued
                    .push_back(QueuedEffect::Commands { peer, snapshots });
            }
            other => log::warn!("peer {peer} sent unexpected {} message", other.name()),
        }
        Ok(())
    }

    /// Runs one simulation tick and queues this tick's snapshot for every
    /// peer.
    pub fn run_tick(&mut self, now: Instant) -> Result<(), PacketError> {
        self.tick = self.tick.with_time(self.tick.count() + 1, 0.0);
        self.tick_started = Some(now);
        let tick = self.tick.count();

        self.apply_queued(tick);

        let commands: BTreeMap<PeerId, _> = self
            .inboxes
            .iter_mut()
            .map(|(peer, inbox)| (*peer, inbox.take(tick)))
            .collect();
        self.world.step(&commands, self.config.tick_interval());

        let snapshot = Arc::new(self.world.capture(tick));
        self.replicator.record(Arc::clone(&snapshot));

        for (peer, kind, payload) in self.replicator.replicate(&snapshot)? {
            self.events.push_back(ServerEvent::SnapshotSent {
                peer,
                tick,
                kind,
                bytes: payload.len(),
            });
            self.outgoing
                .push(Outgoing::new(peer, Delivery::Unreliable, payload));
        }
        Ok(())
    }

    fn apply_queued(&mut self, tick: u32) {
        while let Some(effect) = self.queued.pop_front() {
            match effect {
                QueuedEffect::Ack { peer, tick: acked } => {
                    match self.replicator.acknowledge(peer, acked) {
                        AckOutcome::Accepted => {}
                        AckOutcome::Stale | AckOutcome::Future | AckOutcome::UnknownPeer => {
                            self.stats.ignored_acks += 1;
                        }
                    }
                }
                QueuedEffect::Commands { peer, snapshots } => {
                    let Some(inbox) = self.inboxes.get_mut(&peer) else {
                        continue;
                    };
                    for snapshot in snapshots {
                        match inbox.insert(tick, snapshot) {
                            InboxOutcome::Stored => {}
                            InboxOutcome::Stale => self.stats.stale_commands += 1,
                            InboxOutcome::TooFarAhead => self.stats.rejected_commands += 1,
                        }
                    }
                }
            }
        }
    }

    fn send(&mut self, peer: PeerId, message: Message) -> Result<(), PacketError> {
        let delivery = message.delivery();
        let payload = encode_message(message)?;
        self.outgoing.push(Outgoing::new(peer, delivery, payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use tether::{Command, FlatGround};

    use super::*;

    fn server() -> GameServer {
        let config = ServerConfig {
            tick_rate: 20,
            ..Default::default()
        };
        let world = ServerWorld::with_mover(&config, Box::new(FlatGround::new(config.spawn_point[1])));
        GameServer::with_world(config, world).unwrap()
    }

    fn send(server: &mut GameServer, peer: PeerId, message: Message, now: Instant) {
        server
            .receive(peer, &encode_message(message).unwrap(), now)
            .unwrap();
    }

    fn decoded(outgoing: &[Outgoing]) -> Vec<Message> {
        outgoing
            .iter()
            .map(|out| decode_message(&out.payload).unwrap())
            .collect()
    }

    #[test]
    fn sync_requests_are_answered_immediately() {
        let now = Instant::now();
        let mut server = server();
        server.connect_peer(1);
        server.run_tick(now).unwrap();
        server.drain_outgoing();

        send(&mut server, 1, Message::SyncRequest { client_send_time: 77 }, now);
        send(&mut server, 1, Message::SyncInfoRequest, now);
        let out = server.drain_outgoing();

        assert_eq!(out[1].delivery, Delivery::Reliable);
        let messages = decoded(&out);
        assert!(matches!(
            messages[0],
            Message::Sync {
                client_send_time: 77,
                server_tick: 1,
                ..
            }
        ));
        assert_eq!(
            messages[1],
            Message::SyncInfo {
                server_ticks_per_second: 20
            }
        );
    }

    #[test]
    fn unknown_peers_are_refused() {
        let mut server = server();
        let bytes = encode_message(Message::SyncInfoRequest).unwrap();
        assert!(matches!(
            server.receive(5, &bytes, Instant::now()),
            Err(ServerError::Transport(TransportError::UnknownPeer(5)))
        ));
    }

    #[test]
    fn garbage_emits_decode_event() {
        let mut server = server();
        server.connect_peer(1);
        server.drain_events().for_each(drop);
        assert!(server.receive(1, b"garbage", Instant::now()).is_err());
        assert!(matches!(
            server.drain_events().next(),
            Some(ServerEvent::DecodeError { peer: 1, .. })
        ));
    }

    #[test]
    fn every_tick_sends_a_snapshot_per_peer() {
        let now = Instant::now();
        let mut server = server();
        server.connect_peer(1);
        server.connect_peer(2);
        server.run_tick(now).unwrap();

        let out = server.drain_outgoing();
        assert_eq!(out.len(), 2);
        for message in decoded(&out) {
            let Message::StateSnapshot(snapshot) = message else {
                panic!("expected a full snapshot");
            };
            assert_eq!(snapshot.tick, 1);
            assert_eq!(snapshot.meta.len(), 2);
        }
    }

    #[test]
    fn acks_switch_to_delta_at_next_tick() {
        let now = Instant::now();
        let mut server = server();
        server.connect_peer(1);
        server.run_tick(now).unwrap();
        server.drain_outgoing();

        send(&mut server, 1, Message::StateSnapshotAck { tick: 1 }, now);
        assert_eq!(server.replicator().last_ack(1), None);
        server.run_tick(now).unwrap();

        assert_eq!(server.replicator().last_ack(1), Some(1));
        let messages = decoded(&server.drain_outgoing());
        assert!(matches!(
            messages.as_slice(),
            [Message::DeltaStateSnapshot(delta)] if delta.baseline_tick == 1
        ));
    }

    #[test]
    fn commands_apply_at_their_tick() {
        let now = Instant::now();
        let mut server = server();
        let entity = server.connect_peer(1);
        let start = server.world().character(entity).map(|state| state.position());

        let walk = vec![Command::move_towards(Vec2::X, true)];
        send(
            &mut server,
            1,
            Message::RecentCommandSnapshots(vec![
                CommandSnapshot::new(1, walk.clone()),
                CommandSnapshot::new(2, walk),
            ]),
            now,
        );
        server.run_tick(now).unwrap();
        server.run_tick(now).unwrap();

        let end = server.world().character(entity).map(|state| state.position());
        assert!(end.unwrap().x > start.unwrap().x);
    }

    #[test]
    fn disconnect_removes_character_and_peer() {
        let mut server = server();
        server.connect_peer(3);
        assert!(server.disconnect_peer(3).is_ok());
        assert_eq!(server.stats().entities, 0);
        assert!(matches!(
            server.disconnect_peer(3),
            Err(TransportError::UnknownPeer(3))
        ));
    }
}
