use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tether::{Delivery, LinkSimulator, LinkStats, Outgoing, PeerId};
use tether_client::{
    ClientConfig, ClientStats, ClientWorld, FrameOutcome, InputSampler, InputState, NetworkClient,
};
use tether_server::{build_mover, spawn_server, GameServer, ServerEvent, ServerInput, ServerStats};

use crate::config::DemoConfig;

const DOWNLINK_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct ClientReport {
    pub player_id: u32,
    pub stats: ClientStats,
    pub uplink: LinkStats,
    pub downlink: LinkStats,
    pub world_entities: usize,
    pub possessed: Option<u32>,
    pub interpolating: bool,
}

#[derive(Debug)]
pub struct SessionReport {
    pub server: ServerStats,
    pub clients: Vec<ClientReport>,
}

pub async fn run(config: DemoConfig) -> Result<SessionReport> {
    let server = GameServer::new(config.server.clone()).context("invalid server configuration")?;
    let mut handle = spawn_server(server);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut downlinks = HashMap::new();
    let mut clients = Vec::new();
    for index in 0..config.clients {
        let player_id = index + 1;
        handle
            .inputs
            .send(ServerInput::Connect(player_id))
            .await
            .context("server stopped before clients joined")?;

        let (downlink_tx, downlink_rx) = mpsc::channel(DOWNLINK_CAPACITY);
        downlinks.insert(player_id, downlink_tx);
        clients.push(spawn_client(
            &config,
            player_id,
            downlink_rx,
            handle.inputs.clone(),
            shutdown_rx.clone(),
        ));
    }

    let outgoing = std::mem::replace(&mut handle.outgoing, mpsc::channel(1).1);
    let router = tokio::spawn(route_downlinks(outgoing, downlinks));
    let events = std::mem::replace(&mut handle.events, mpsc::unbounded_channel().1);
    let observer = tokio::spawn(log_events(events));

    tokio::time::sleep(Duration::from_secs_f32(config.seconds.max(0.0))).await;
    let _ = shutdown_tx.send(true);

    let mut reports = Vec::new();
    for client in clients {
        reports.push(client.await.context("client task panicked")?);
    }
    let server = handle.shutdown().await.context("server task panicked")?;
    router.abort();
    observer.abort();

    Ok(SessionReport {
        server: server.stats(),
        clients: reports,
    })
}

async fn route_downlinks(
    mut outgoing: mpsc::Receiver<Outgoing>,
    downlinks: HashMap<PeerId, mpsc::Sender<(Delivery, Vec<u8>)>>,
) {
    while let Some(packet) = outgoing.recv().await {
        let Some(downlink) = downlinks.get(&packet.peer) else {
            log::warn!("no route to peer {}", packet.peer);
            continue;
        };
        // A full downlink behaves like a congested socket.
        if downlink.try_send((packet.delivery, packet.payload)).is_err() {
            log::debug!("downlink to peer {} overflowed", packet.peer);
        }
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<ServerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::PeerConnected { peer, entity_id } => {
                log::info!("peer {peer} joined as entity {entity_id}");
            }
            ServerEvent::PeerDisconnected { peer, .. } => log::info!("peer {peer} left"),
            ServerEvent::DecodeError { peer, message } => {
                log::warn!("undecodable packet from peer {peer}: {message}");
            }
            ServerEvent::SnapshotSent {
                peer,
                tick,
                kind,
                bytes,
            } => log::trace!("tick {tick} to peer {peer}: {kind:?}, {bytes} bytes"),
        }
    }
}

fn spawn_client(
    config: &DemoConfig,
    player_id: u32,
    mut downlink_rx: mpsc::Receiver<(Delivery, Vec<u8>)>,
    server_inputs: mpsc::Sender<ServerInput>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<ClientReport> {
    let client_config = ClientConfig {
        player_id,
        ..config.client.clone()
    };
    let mover = Box::new(build_mover(&config.server));
    let frame_rate = config.frame_rate.max(1);
    let seed = config.seed.wrapping_add(u64::from(player_id) * 2);
    let mut uplink = LinkSimulator::seeded(config.link.clone(), seed);
    let mut downlink = LinkSimulator::seeded(config.link.clone(), seed.wrapping_add(1));

    tokio::spawn(async move {
        let start = Instant::now();
        let mut client = NetworkClient::new(client_config, mover, start);
        let mut world = ClientWorld::new(player_id, ["player", "crate"]);
        let mut sampler = InputSampler::new();
        let mut outcome = FrameOutcome::Waiting;
        client.start(start);

        let delta = 1.0 / frame_rate as f32;
        let mut interval = tokio::time::interval(Duration::from_secs_f32(delta));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                packet = downlink_rx.recv() => {
                    let Some((delivery, bytes)) = packet else {
                        break;
                    };
                    downlink.send(bytes, delivery, Instant::now());
                }
                _ = interval.tick() => {
                    let now = Instant::now();
                    for bytes in downlink.take_ready(now) {
                        if let Err(error) = client.receive(&bytes, now) {
                            log::warn!("client {player_id}: {error}");
                        }
                    }

                    outcome = client.frame(now, &mut world);
                    let input = scripted_input(player_id, now.duration_since(start).as_secs_f32());
                    client.physics_step(now, delta, sampler.sample(&input));

                    for (delivery, bytes) in client.drain_outgoing() {
                        uplink.send(bytes, delivery, now);
                    }
                    for payload in uplink.take_ready(now) {
                        let datagram = ServerInput::Datagram { peer: player_id, payload };
                        if server_inputs.send(datagram).await.is_err() {
                            log::warn!("client {player_id}: server went away");
                            break;
                        }
                    }
                }
            }
        }

        ClientReport {
            player_id,
            stats: client.stats(),
            uplink: uplink.stats(),
            downlink: downlink.stats(),
            world_entities: world.len(),
            possessed: world.possessed(),
            interpolating: matches!(outcome, FrameOutcome::Interpolated { .. }),
        }
    })
}

/// Walks each player around its own circle, jumping every few seconds and
/// looking at the origin.
fn scripted_input(player_id: u32, seconds: f32) -> InputState {
    let phase = seconds * 0.8 + player_id as f32;
    let direction = Vec2::new(phase.cos(), phase.sin());
    InputState {
        move_direction: direction.into(),
        look_target: Some(Vec3::new(0.0, 1.0, 0.0).into()),
        jump: (seconds % 3.0) < 0.05,
        attack: (seconds % 5.0) < 1.0,
        interact: None,
    }
}
