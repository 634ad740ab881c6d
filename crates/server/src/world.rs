use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use tether::{
    BodyMover, CharacterMotor, CharacterShape, CharacterState, Command, EntityState, Meta,
    PhysicsWorld, RapierMover, StateSnapshot, StaticState,
};

use crate::config::ServerConfig;

const CRATE_HALF_EXTENT: f32 = 0.5;

/// Collision geometry described by `config`. Clients build the same mover
/// so that replayed steps match the server's.
pub fn build_mover(config: &ServerConfig) -> RapierMover {
    let mut physics = PhysicsWorld::new(config.tick_rate);
    physics.add_ground(config.ground_height, config.ground_half_size);
    for position in &config.crates {
        physics.add_static_box(Vec3::from(*position), Vec3::splat(CRATE_HALF_EXTENT));
    }
    RapierMover::new(physics, CharacterShape::default())
}

/// Authoritative entities: one character per connected player plus static
/// scenery.
pub struct ServerWorld {
    motor: CharacterMotor,
    mover: Box<dyn BodyMover + Send>,
    character_kind: String,
    spawn_point: Vec3,
    spawn_spacing: f32,
    characters: BTreeMap<u32, CharacterState>,
    statics: Vec<StaticState>,
    possessions: BTreeMap<u32, u32>,
    next_entity_id: u32,
}

impl ServerWorld {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_mover(config, Box::new(build_mover(config)))
    }

    pub fn with_mover(config: &ServerConfig, mover: Box<dyn BodyMover + Send>) -> Self {
        let mut world = Self {
            motor: CharacterMotor::new(config.motion),
            mover,
            character_kind: config.character_kind.clone(),
            spawn_point: Vec3::from(config.spawn_point),
            spawn_spacing: config.spawn_spacing,
            characters: BTreeMap::new(),
            statics: Vec::new(),
            possessions: BTreeMap::new(),
            next_entity_id: 1,
        };
        for position in &config.crates {
            let entity_id = world.allocate_id();
            world.statics.push(StaticState::new(
                entity_id,
                "crate",
                Vec3::from(*position),
                Quat::IDENTITY,
            ));
        }
        world
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn entity_count(&self) -> usize {
        self.characters.len() + self.statics.len()
    }

    pub fn character(&self, entity_id: u32) -> Option<&CharacterState> {
        self.characters.get(&entity_id)
    }

    pub fn possessed_by(&self, player_id: u32) -> Option<u32> {
        self.possessions.get(&player_id).copied()
    }

    /// Spawns a character for `player_id`, or returns the one it already has.
    pub fn spawn_player(&mut self, player_id: u32) -> u32 {
        if let Some(entity_id) = self.possessed_by(player_id) {
            return entity_id;
        }
        let entity_id = self.allocate_id();
        let offset = Vec3::X * self.spawn_spacing * self.characters.len() as f32;
        let state = CharacterState::new(entity_id, self.character_kind.as_str(), self.spawn_point + offset);
        self.characters.insert(entity_id, state);
        self.possessions.insert(player_id, entity_id);
        entity_id
    }

    pub fn despawn_player(&mut self, player_id: u32) -> Option<u32> {
        let entity_id = self.possessions.remove(&player_id)?;
        self.characters.remove(&entity_id);
        Some(entity_id)
    }

    /// Steps every character once, each under its controlling player's
    /// commands for this tick.
    pub fn step(&mut self, commands: &BTreeMap<u32, Vec<Command>>, delta: f32) {
        let controllers: BTreeMap<u32, u32> = self
            .possessions
            .iter()
            .map(|(player, entity)| (*entity, *player))
            .collect();

        for (entity_id, state) in &mut self.characters {
            let input = controllers
                .get(entity_id)
                .and_then(|player| commands.get(player))
                .map_or(&[][..], Vec::as_slice);
            self.motor.step(state, input, delta, self.mover.as_mut());
        }
    }

    pub fn capture(&self, tick: u32) -> StateSnapshot {
        let statics = self.statics.iter().cloned().map(EntityState::Static);
        let characters = self.characters.values().cloned().map(EntityState::Character);

        let mut snapshot = StateSnapshot::with_states(tick, statics.chain(characters));
        snapshot.meta = self
            .possessions
            .iter()
            .map(|(player_id, entity_id)| Meta::PlayerPossession {
                player_id: *player_id,
                entity_id: *entity_id,
            })
            .collect();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use tether::FlatGround;

    use super::*;

    fn world(config: &ServerConfig) -> ServerWorld {
        ServerWorld::with_mover(config, Box::new(FlatGround::new(config.spawn_point[1])))
    }

    #[test]
    fn players_get_one_character_each() {
        let config = ServerConfig::default();
        let mut world = world(&config);
        let first = world.spawn_player(7);
        assert_eq!(world.spawn_player(7), first);
        let second = world.spawn_player(8);
        assert_ne!(first, second);
        assert_eq!(world.entity_count(), 2);

        assert_eq!(world.despawn_player(7), Some(first));
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.despawn_player(7), None);
    }

    #[test]
    fn capture_includes_scenery_and_possession() {
        let config = ServerConfig {
            crates: vec![[3.0, 0.5, 3.0]],
            ..Default::default()
        };
        let mut world = world(&config);
        let entity = world.spawn_player(2);

        let snapshot = world.capture(40);
        assert_eq!(snapshot.tick, 40);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.possessed_by(2), Some(entity));
        assert_eq!(snapshot.get(1).and_then(|state| state.kind()), Some("crate"));
    }

    #[test]
    fn commands_move_only_their_player() {
        let config = ServerConfig::default();
        let mut world = world(&config);
        let mover = world.spawn_player(1);
        let idle = world.spawn_player(2);
        let idle_start = world.character(idle).map(CharacterState::position);

        let mut commands = BTreeMap::new();
        commands.insert(1, vec![Command::move_towards(Vec2::X, true)]);
        for _ in 0..10 {
            world.step(&commands, config.tick_interval());
        }

        let moved = world.character(mover).map(|state| state.position().x);
        assert!(moved.is_some_and(|x| x > 0.5));
        assert_eq!(world.character(idle).map(CharacterState::position), idle_start);
    }
}
