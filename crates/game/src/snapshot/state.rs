use std::collections::HashSet;
use std::sync::Arc;

use rkyv::{Archive, Deserialize, Serialize};

use super::entity::{EntityState, Meta};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot {tick} lists entity {entity_id} more than once")]
    DuplicateEntity { tick: u32, entity_id: u32 },
}

/// Authoritative world state at one integer server tick.
///
/// Entity states are shared behind `Arc`, so a snapshot rebuilt from a delta
/// reuses every state the delta left untouched.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tick: u32,
    pub states: Vec<Arc<EntityState>>,
    pub meta: Vec<Meta>,
}

impl StateSnapshot {
    pub fn new(tick: u32) -> Self {
        Self {
            tick,
            states: Vec::new(),
            meta: Vec::new(),
        }
    }

    pub fn with_states(tick: u32, states: impl IntoIterator<Item = EntityState>) -> Self {
        Self {
            tick,
            states: states.into_iter().map(Arc::new).collect(),
            meta: Vec::new(),
        }
    }

    pub fn get(&self, entity_id: u32) -> Option<&Arc<EntityState>> {
        self.states
            .iter()
            .find(|state| state.entity_id() == entity_id)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.states.iter().map(|state| state.entity_id())
    }

    pub fn possessed_by(&self, player_id: u32) -> Option<u32> {
        self.meta.iter().find_map(|meta| match meta {
            Meta::PlayerPossession {
                player_id: owner,
                entity_id,
            } if *owner == player_id => Some(*entity_id),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Checks a snapshot received from the network before it is used as a
    /// baseline or rendered.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::with_capacity(self.states.len());
        for entity_id in self.entity_ids() {
            if !seen.insert(entity_id) {
                return Err(SnapshotError::DuplicateEntity {
                    tick: self.tick,
                    entity_id,
                });
            }
        }
        Ok(())
    }
}
