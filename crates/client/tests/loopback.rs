//! Client and server wired back to back without a network in between.

use std::time::{Duration, Instant};

use glam::Vec2;
use tether::{Command, FlatGround};
use tether_client::{ClientConfig, ClientWorld, NetworkClient};
use tether_server::{GameServer, ServerConfig, ServerWorld};

const SERVER_RATE: u32 = 20;
const FRAME_RATE: u32 = 60;
const PLAYER: u32 = 1;

struct Session {
    start: Instant,
    server: GameServer,
    client: NetworkClient,
    world: ClientWorld,
    entity_id: u32,
}

impl Session {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let start = Instant::now();
        let config = ServerConfig {
            tick_rate: SERVER_RATE,
            ..Default::default()
        };
        let ground = config.spawn_point[1];
        let world = ServerWorld::with_mover(&config, Box::new(FlatGround::new(ground)));
        let mut server = GameServer::with_world(config, world).unwrap();
        let entity_id = server.connect_peer(PLAYER);

        let mut client = NetworkClient::new(
            ClientConfig {
                player_id: PLAYER,
                ..Default::default()
            },
            Box::new(FlatGround::new(ground)),
            start,
        );
        client.start(start);

        Self {
            start,
            server,
            client,
            world: ClientWorld::new(PLAYER, ["player"]),
            entity_id,
        }
    }

    fn run(&mut self, frames: u32, commands: impl Fn(u32) -> Vec<Command>) {
        let frames_per_tick = FRAME_RATE / SERVER_RATE;
        let delta = 1.0 / FRAME_RATE as f32;

        for frame in 0..frames {
            let now = self.start + Duration::from_secs_f64(frame as f64 / FRAME_RATE as f64);

            for (_, bytes) in self.client.drain_outgoing() {
                self.server.receive(PLAYER, &bytes, now).unwrap();
            }
            if frame % frames_per_tick == 0 {
                self.server.run_tick(now).unwrap();
            }
            for packet in self.server.drain_outgoing() {
                if let Err(error) = self.client.receive(&packet.payload, now) {
                    panic!("client rejected server packet: {error}");
                }
            }

            self.client.frame(now, &mut self.world);
            self.client.physics_step(now, delta, commands(frame));
        }
    }
}

#[test]
fn client_synchronizes_and_replicates() {
    let mut session = Session::new();
    session.run(FRAME_RATE * 3, |_| Vec::new());

    let stats = session.client.stats();
    assert!(session.client.is_ready());
    assert!(stats.snapshots_received > 0);
    assert!(stats.deltas_applied > 0);
    assert_eq!(stats.deltas_rejected, 0);

    assert!(session.server.replicator().last_ack(PLAYER).is_some());
    assert_eq!(session.world.possessed(), Some(session.entity_id));
    assert_eq!(session.client.prediction().entity_id(), Some(session.entity_id));
}

#[test]
fn walking_reaches_the_server_and_prediction_agrees() {
    let mut session = Session::new();
    session.run(FRAME_RATE * 3, |frame| {
        vec![Command::move_towards(Vec2::X, frame == 0)]
    });

    let server_x = session
        .server
        .world()
        .character(session.entity_id)
        .map(|state| state.position().x)
        .unwrap();
    let predicted_x = session
        .client
        .prediction()
        .entity()
        .map(|state| state.position().x)
        .unwrap();

    assert!(server_x > 1.0, "server never applied the walk: {server_x}");
    // The prediction runs ahead of the server, never behind it.
    assert!(predicted_x >= server_x - 0.5);
    let rendered = session.world.get(session.entity_id).unwrap();
    assert!(rendered.predicted);
}
