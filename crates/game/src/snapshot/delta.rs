use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rkyv::{Archive, Deserialize, Serialize};

use super::entity::{CharacterState, EntityState, Meta, SpatialState, StaticState};
use super::state::StateSnapshot;

/// A single replicated field value.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum FieldValue {
    U32(u32),
    F32(f32),
    Text(String),
    Vec3([f32; 3]),
    Quat([f32; 4]),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::U32(_) => "u32",
            Self::F32(_) => "f32",
            Self::Text(_) => "text",
            Self::Vec3(_) => "vec3",
            Self::Quat(_) => "quat",
        }
    }

    /// Bit-exact equality, so NaN payloads do not produce endless patches.
    pub fn same_bits(&self, other: &FieldValue) -> bool {
        fn bits<const N: usize>(a: &[f32; N], b: &[f32; N]) -> bool {
            a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
        }
        match (self, other) {
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Vec3(a), Self::Vec3(b)) => bits(a, b),
            (Self::Quat(a), Self::Quat(b)) => bits(a, b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct FieldPatch {
    pub field: u16,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntityPatch {
    pub entity_id: u32,
    pub fields: Vec<FieldPatch>,
}

/// Difference between a baseline snapshot and a newer one.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct DeltaStateSnapshot {
    pub tick: u32,
    pub baseline_tick: u32,
    pub added: Vec<EntityState>,
    pub patches: Vec<EntityPatch>,
    pub removed: Vec<u32>,
    pub meta: Vec<Meta>,
}

impl DeltaStateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.patches.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeltaError {
    #[error("delta is based on tick {expected} but baseline is tick {found}")]
    BaselineMismatch { expected: u32, found: u32 },

    #[error("patch targets entity {0} which is absent from the baseline")]
    UnknownEntity(u32),

    #[error("entity {0} is patched more than once")]
    DuplicatePatch(u32),

    #[error("entity {0} is added while still present")]
    DuplicateEntity(u32),

    #[error("entity {entity_id} has no field {field}")]
    UnknownField { entity_id: u32, field: u16 },

    #[error("field {field} of entity {entity_id} expects another type, got {found}")]
    FieldTypeMismatch {
        entity_id: u32,
        field: &'static str,
        found: &'static str,
    },
}

/// Getter and setter for one replicated field of a state struct.
pub struct FieldAccessor<T> {
    pub name: &'static str,
    pub get: fn(&T) -> FieldValue,
    pub set: fn(&mut T, FieldValue) -> Result<(), FieldValue>,
}

/// Ordered table of the fields the codec patches. Identity fields
/// (`entity_id`, `kind`) are never listed; changing them is a respawn.
pub trait StateFields: Sized + 'static {
    const FIELDS: &'static [FieldAccessor<Self>];
}

macro_rules! state_fields {
    ($ty:ty { $($field:ident: $variant:ident),+ $(,)? }) => {
        impl StateFields for $ty {
            const FIELDS: &'static [FieldAccessor<Self>] = &[
                $(FieldAccessor {
                    name: stringify!($field),
                    get: |state: &$ty| FieldValue::$variant(state.$field.clone()),
                    set: |state: &mut $ty, value| match value {
                        FieldValue::$variant(value) => {
                            state.$field = value;
                            Ok(())
                        }
                        other => Err(other),
                    },
                }),+
            ];
        }
    };
}

state_fields!(SpatialState {
    position: Vec3,
    rotation: Quat,
});

state_fields!(CharacterState {
    position: Vec3,
    rotation: Quat,
    view_rotation: F32,
    velocity: Vec3,
});

state_fields!(StaticState {
    position: Vec3,
    rotation: Quat,
});

fn diff_fields<T: StateFields>(baseline: &T, target: &T) -> Vec<FieldPatch> {
    T::FIELDS
        .iter()
        .enumerate()
        .filter_map(|(index, accessor)| {
            let value = (accessor.get)(target);
            if (accessor.get)(baseline).same_bits(&value) {
                None
            } else {
                Some(FieldPatch {
                    field: index as u16,
                    value,
                })
            }
        })
        .collect()
}

fn apply_fields<T: StateFields>(
    state: &mut T,
    entity_id: u32,
    patches: &[FieldPatch],
) -> Result<(), DeltaError> {
    for patch in patches {
        let accessor = T::FIELDS
            .get(patch.field as usize)
            .ok_or(DeltaError::UnknownField {
                entity_id,
                field: patch.field,
            })?;
        (accessor.set)(state, patch.value.clone()).map_err(|value| {
            DeltaError::FieldTypeMismatch {
                entity_id,
                field: accessor.name,
                found: value.type_name(),
            }
        })?;
    }
    Ok(())
}

fn diff_state(baseline: &EntityState, target: &EntityState) -> Vec<FieldPatch> {
    match (baseline, target) {
        (EntityState::Spatial(a), EntityState::Spatial(b)) => diff_fields(a, b),
        (EntityState::Character(a), EntityState::Character(b)) => diff_fields(a, b),
        (EntityState::Static(a), EntityState::Static(b)) => diff_fields(a, b),
        _ => unreachable!("callers only diff states of the same shape"),
    }
}

fn apply_state(state: &mut EntityState, patches: &[FieldPatch]) -> Result<(), DeltaError> {
    let entity_id = state.entity_id();
    match state {
        EntityState::Spatial(inner) => apply_fields(inner, entity_id, patches),
        EntityState::Character(inner) => apply_fields(inner, entity_id, patches),
        EntityState::Static(inner) => apply_fields(inner, entity_id, patches),
    }
}

/// Field-level snapshot delta encoding against an acknowledged baseline.
pub struct DeltaCodec;

impl DeltaCodec {
    /// Produces the delta that turns `baseline` into `target`. An entity whose
    /// variant or kind changed is sent as removed and re-added.
    pub fn encode(baseline: &StateSnapshot, target: &StateSnapshot) -> DeltaStateSnapshot {
        let baseline_states: HashMap<u32, &Arc<EntityState>> = baseline
            .states
            .iter()
            .map(|state| (state.entity_id(), state))
            .collect();
        let target_ids: HashSet<u32> = target.entity_ids().collect();

        let mut added = Vec::new();
        let mut patches = Vec::new();
        let mut removed: Vec<u32> = baseline
            .entity_ids()
            .filter(|id| !target_ids.contains(id))
            .collect();

        for state in &target.states {
            let entity_id = state.entity_id();
            match baseline_states.get(&entity_id) {
                Some(old) if Arc::ptr_eq(old, state) => {}
                Some(old) if old.same_shape(state) => {
                    let fields = diff_state(old, state);
                    if !fields.is_empty() {
                        patches.push(EntityPatch { entity_id, fields });
                    }
                }
                Some(_) => {
                    removed.push(entity_id);
                    added.push(EntityState::clone(state));
                }
                None => added.push(EntityState::clone(state)),
            }
        }

        removed.sort_unstable();

        DeltaStateSnapshot {
            tick: target.tick,
            baseline_tick: baseline.tick,
            added,
            patches,
            removed,
            meta: target.meta.clone(),
        }
    }

    /// Rebuilds the target snapshot. Fails without side effects when the
    /// delta does not fit the baseline.
    pub fn decode(
        baseline: &StateSnapshot,
        delta: &DeltaStateSnapshot,
    ) -> Result<StateSnapshot, DeltaError> {
        if delta.baseline_tick != baseline.tick {
            return Err(DeltaError::BaselineMismatch {
                expected: delta.baseline_tick,
                found: baseline.tick,
            });
        }

        let removed: HashSet<u32> = delta.removed.iter().copied().collect();
        let mut patches: HashMap<u32, &[FieldPatch]> = HashMap::with_capacity(delta.patches.len());
        for patch in &delta.patches {
            if patches.insert(patch.entity_id, &patch.fields).is_some() {
                return Err(DeltaError::DuplicatePatch(patch.entity_id));
            }
        }

        let baseline_ids: HashSet<u32> = baseline.entity_ids().collect();
        if let Some(id) = patches
            .keys()
            .find(|id| !baseline_ids.contains(*id) || removed.contains(*id))
        {
            return Err(DeltaError::UnknownEntity(*id));
        }

        let mut present = HashSet::with_capacity(baseline.len() + delta.added.len());
        let mut states = Vec::with_capacity(baseline.len() + delta.added.len());

        for state in &baseline.states {
            let entity_id = state.entity_id();
            if removed.contains(&entity_id) {
                continue;
            }
            let state = match patches.get(&entity_id) {
                Some(fields) => {
                    let mut patched = EntityState::clone(state);
                    apply_state(&mut patched, fields)?;
                    Arc::new(patched)
                }
                None => Arc::clone(state),
            };
            present.insert(entity_id);
            states.push(state);
        }

        for state in &delta.added {
            if !present.insert(state.entity_id()) {
                return Err(DeltaError::DuplicateEntity(state.entity_id()));
            }
            states.push(Arc::new(state.clone()));
        }

        Ok(StateSnapshot {
            tick: delta.tick,
            states,
            meta: delta.meta.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;

    fn world(tick: u32, player_x: f32) -> StateSnapshot {
        StateSnapshot::with_states(
            tick,
            [
                EntityState::Static(StaticState::new(1, "rock", Vec3::ZERO, Quat::IDENTITY)),
                EntityState::Character(CharacterState::new(2, "player", Vec3::new(player_x, 0.0, 0.0))),
            ],
        )
    }

    #[test]
    fn identical_snapshots_produce_empty_delta() {
        let baseline = world(1, 0.0);
        let target = world(2, 0.0);
        let delta = DeltaCodec::encode(&baseline, &target);
        assert!(delta.is_empty());
        assert_eq!(delta.baseline_tick, 1);
        assert_eq!(delta.tick, 2);
    }

    #[test]
    fn only_changed_fields_are_patched() {
        let baseline = world(1, 0.0);
        let target = world(2, 3.0);
        let delta = DeltaCodec::encode(&baseline, &target);

        assert_eq!(delta.patches.len(), 1);
        assert_eq!(delta.patches[0].entity_id, 2);
        assert_eq!(
            delta.patches[0].fields,
            vec![FieldPatch {
                field: 0,
                value: FieldValue::Vec3([3.0, 0.0, 0.0]),
            }]
        );
    }

    #[test]
    fn decode_restores_target_and_shares_untouched_states() {
        let baseline = world(1, 0.0);
        let mut target = world(2, 3.0);
        target.states.push(Arc::new(EntityState::Spatial(SpatialState::new(
            5,
            Vec3::ONE,
            Quat::IDENTITY,
        ))));
        target.meta.push(Meta::PlayerPossession {
            player_id: 1,
            entity_id: 2,
        });

        let delta = DeltaCodec::encode(&baseline, &target);
        let decoded = DeltaCodec::decode(&baseline, &delta).unwrap();

        assert_eq!(decoded, target);
        assert!(Arc::ptr_eq(&decoded.states[0], &baseline.states[0]));
    }

    #[test]
    fn removed_entities_disappear() {
        let baseline = world(1, 0.0);
        let mut target = world(2, 0.0);
        target.states.retain(|state| state.entity_id() != 1);

        let delta = DeltaCodec::encode(&baseline, &target);
        assert_eq!(delta.removed, vec![1]);

        let decoded = DeltaCodec::decode(&baseline, &delta).unwrap();
        assert_eq!(decoded.entity_ids().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn kind_change_is_sent_as_respawn() {
        let baseline = world(1, 0.0);
        let mut target = world(2, 0.0);
        target.states[0] = Arc::new(EntityState::Static(StaticState::new(
            1,
            "barrel",
            Vec3::ZERO,
            Quat::IDENTITY,
        )));

        let delta = DeltaCodec::encode(&baseline, &target);
        assert_eq!(delta.removed, vec![1]);
        assert_eq!(delta.added.len(), 1);

        let decoded = DeltaCodec::decode(&baseline, &delta).unwrap();
        assert_eq!(decoded.get(1).and_then(|s| s.kind()), Some("barrel"));
    }

    #[test]
    fn wrong_baseline_is_rejected() {
        let delta = DeltaCodec::encode(&world(1, 0.0), &world(3, 1.0));
        let error = DeltaCodec::decode(&world(2, 0.0), &delta).unwrap_err();
        assert_eq!(
            error,
            DeltaError::BaselineMismatch {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn patch_for_unknown_entity_is_rejected() {
        let baseline = world(1, 0.0);
        let mut delta = DeltaCodec::encode(&baseline, &world(2, 1.0));
        delta.patches[0].entity_id = 99;
        assert_eq!(
            DeltaCodec::decode(&baseline, &delta),
            Err(DeltaError::UnknownEntity(99))
        );
    }

    #[test]
    fn mistyped_field_is_rejected() {
        let baseline = world(1, 0.0);
        let mut delta = DeltaCodec::encode(&baseline, &world(2, 1.0));
        delta.patches[0].fields[0].value = FieldValue::U32(7);
        assert!(matches!(
            DeltaCodec::decode(&baseline, &delta),
            Err(DeltaError::FieldTypeMismatch {
                entity_id: 2,
                field: "position",
                found: "u32"
            })
        ));
    }

    #[test]
    fn out_of_range_field_is_rejected() {
        let baseline = world(1, 0.0);
        let mut delta = DeltaCodec::encode(&baseline, &world(2, 1.0));
        delta.patches[0].fields[0].field = 40;
        assert_eq!(
            DeltaCodec::decode(&baseline, &delta),
            Err(DeltaError::UnknownField {
                entity_id: 2,
                field: 40
            })
        );
    }

    #[test]
    fn field_tables_skip_identity() {
        let names: Vec<&str> = CharacterState::FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["position", "rotation", "view_rotation", "velocity"]);
    }
}
