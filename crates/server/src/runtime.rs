use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tether::{Outgoing, PeerId, TransportError};

use crate::events::ServerEvent;
use crate::server::GameServer;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum ServerInput {
    Connect(PeerId),
    Disconnect(PeerId),
    Datagram { peer: PeerId, payload: Vec<u8> },
}

/// Channels connecting a running tick loop to its transport.
pub struct ServerHandle {
    pub inputs: mpsc::Sender<ServerInput>,
    pub outgoing: mpsc::Receiver<Outgoing>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<GameServer>,
}

impl ServerHandle {
    /// Stops the tick loop and hands the server back for inspection.
    pub async fn shutdown(self) -> Result<GameServer, tokio::task::JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}

pub fn spawn_server(server: GameServer) -> ServerHandle {
    let (input_tx, input_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_server(
        server,
        input_rx,
        outgoing_tx,
        event_tx,
        shutdown_rx,
    ));

    ServerHandle {
        inputs: input_tx,
        outgoing: outgoing_rx,
        events: event_rx,
        shutdown: shutdown_tx,
        task,
    }
}

/// Drives `server` at its tick rate until shutdown is signalled or the
/// input channel closes.
pub async fn run_server(
    mut server: GameServer,
    mut inputs: mpsc::Receiver<ServerInput>,
    outgoing: mpsc::Sender<Outgoing>,
    events: mpsc::UnboundedSender<ServerEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> GameServer {
    let period = Duration::from_secs_f64(1.0 / server.config().tick_rate as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    log::info!(
        "server tick loop running at {} ticks per second",
        server.config().tick_rate
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            instant = interval.tick() => {
                if let Err(error) = server.run_tick(instant.into_std()) {
                    log::error!("failed to replicate tick {}: {error}", server.tick().count());
                }
            }
            input = inputs.recv() => {
                let Some(input) = input else {
                    break;
                };
                handle_input(&mut server, input);
            }
        }

        if let Err(error) = flush(&mut server, &outgoing, &events).await {
            log::warn!("stopping server loop: {error}");
            break;
        }
    }

    log::info!("server stopped at tick {}", server.tick().count());
    server
}

fn handle_input(server: &mut GameServer, input: ServerInput) {
    match input {
        ServerInput::Connect(peer) => {
            server.connect_peer(peer);
        }
        ServerInput::Disconnect(peer) => {
            if let Err(error) = server.disconnect_peer(peer) {
                log::warn!("{error}");
            }
        }
        ServerInput::Datagram { peer, payload } => {
            if let Err(error) = server.receive(peer, &payload, std::time::Instant::now()) {
                log::warn!("dropping datagram from peer {peer}: {error}");
            }
        }
    }
}

async fn flush(
    server: &mut GameServer,
    outgoing: &mpsc::Sender<Outgoing>,
    events: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), TransportError> {
    for packet in server.drain_outgoing() {
        outgoing
            .send(packet)
            .await
            .map_err(|_| TransportError::Closed)?;
    }
    for event in server.drain_events() {
        // Observers are optional; a dropped receiver is not an error.
        let _ = events.send(event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tether::{decode_message, encode_message, FlatGround, Message};

    use super::*;
    use crate::config::ServerConfig;
    use crate::world::ServerWorld;

    fn server() -> GameServer {
        let config = ServerConfig {
            tick_rate: 100,
            ..Default::default()
        };
        let world = ServerWorld::with_mover(&config, Box::new(FlatGround::new(config.spawn_point[1])));
        GameServer::with_world(config, world).unwrap()
    }

    #[tokio::test]
    async fn tick_loop_replicates_until_shutdown() {
        let mut handle = spawn_server(server());
        handle.inputs.send(ServerInput::Connect(1)).await.unwrap();

        let first = handle.outgoing.recv().await.unwrap();
        assert_eq!(first.peer, 1);
        assert!(matches!(
            decode_message(&first.payload),
            Ok(Message::StateSnapshot(_))
        ));

        let connected = handle.events.recv().await.unwrap();
        assert_eq!(connected, ServerEvent::PeerConnected { peer: 1, entity_id: 1 });

        handle
            .inputs
            .send(ServerInput::Datagram {
                peer: 1,
                payload: encode_message(Message::SyncInfoRequest).unwrap(),
            })
            .await
            .unwrap();
        let mut saw_info = false;
        for _ in 0..50 {
            let packet = handle.outgoing.recv().await.unwrap();
            if matches!(decode_message(&packet.payload), Ok(Message::SyncInfo { .. })) {
                saw_info = true;
                break;
            }
        }
        assert!(saw_info);

        let server = handle.shutdown().await.unwrap();
        assert!(server.tick().count() >= 1);
        assert!(server.is_connected(1));
    }
}
