use std::collections::{BTreeMap, HashSet};

use glam::{Quat, Vec3};
use tether::{CharacterState, EntityState, Meta};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("no template for entity kind {0:?}")]
    UnknownKind(String),
    #[error("entity {0} already exists")]
    AlreadySpawned(u32),
}

/// Receiver of interpolated world state.
pub trait EntityContainer {
    fn spawn(&mut self, state: &EntityState) -> Result<(), SpawnError>;

    fn despawn(&mut self, entity_id: u32);

    fn apply_state(&mut self, state: &EntityState);

    fn apply_meta(&mut self, meta: &Meta);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone)]
pub struct ClientEntity {
    pub state: EntityState,
    pub predicted: bool,
}

impl ClientEntity {
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.state.position(),
            rotation: self.state.rotation(),
        }
    }
}

/// Client-side view of the replicated world. Entities of unknown kinds are
/// refused; the possessed entity follows prediction instead of snapshots.
#[derive(Debug, Clone)]
pub struct ClientWorld {
    player_id: u32,
    known_kinds: HashSet<String>,
    entities: BTreeMap<u32, ClientEntity>,
    possessed: Option<u32>,
}

impl ClientWorld {
    pub fn new<I, S>(player_id: u32, known_kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            player_id,
            known_kinds: known_kinds.into_iter().map(Into::into).collect(),
            entities: BTreeMap::new(),
            possessed: None,
        }
    }

    pub fn possessed(&self) -> Option<u32> {
        self.possessed
    }

    pub fn get(&self, entity_id: u32) -> Option<&ClientEntity> {
        self.entities.get(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn transforms(&self) -> impl Iterator<Item = (u32, Transform)> + '_ {
        self.entities
            .iter()
            .map(|(id, entity)| (*id, entity.transform()))
    }

    /// Overwrites the possessed entity with the locally predicted state.
    pub fn apply_prediction(&mut self, state: &CharacterState) {
        if self.possessed != Some(state.entity_id) {
            return;
        }
        if let Some(entity) = self.entities.get_mut(&state.entity_id) {
            entity.state = EntityState::Character(state.clone());
            entity.predicted = true;
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.possessed = None;
    }
}

impl EntityContainer for ClientWorld {
    fn spawn(&mut self, state: &EntityState) -> Result<(), SpawnError> {
        let entity_id = state.entity_id();
        if self.entities.contains_key(&entity_id) {
            return Err(SpawnError::AlreadySpawned(entity_id));
        }
        if let Some(kind) = state.kind() {
            if !self.known_kinds.contains(kind) {
                return Err(SpawnError::UnknownKind(kind.to_string()));
            }
        }
        self.entities.insert(
            entity_id,
            ClientEntity {
                state: state.clone(),
                predicted: false,
            },
        );
        Ok(())
    }

    fn despawn(&mut self, entity_id: u32) {
        self.entities.remove(&entity_id);
        if self.possessed == Some(entity_id) {
            self.possessed = None;
        }
    }

    fn apply_state(&mut self, state: &EntityState) {
        let entity_id = state.entity_id();
        if self.possessed == Some(entity_id) {
            return;
        }
        if let Some(entity) = self.entities.get_mut(&entity_id) {
            entity.state = state.clone();
        }
    }

    fn apply_meta(&mut self, meta: &Meta) {
        match meta {
            Meta::PlayerPossession {
                player_id,
                entity_id,
            } if *player_id == self.player_id => {
                if self.possessed != Some(*entity_id) {
                    log::info!("player {player_id} now possesses entity {entity_id}");
                }
                self.possessed = Some(*entity_id);
            }
            Meta::PlayerPossession { .. } => {}
        }
    }
}
