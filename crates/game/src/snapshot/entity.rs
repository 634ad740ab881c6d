use glam::{Quat, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct SpatialState {
    pub entity_id: u32,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct CharacterState {
    pub entity_id: u32,
    pub kind: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    /// Camera pitch in radians.
    pub view_rotation: f32,
    pub velocity: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct StaticState {
    pub entity_id: u32,
    pub kind: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl SpatialState {
    pub fn new(entity_id: u32, position: Vec3, rotation: Quat) -> Self {
        Self {
            entity_id,
            position: position.into(),
            rotation: rotation.into(),
        }
    }
}

impl CharacterState {
    pub fn new(entity_id: u32, kind: impl Into<String>, position: Vec3) -> Self {
        Self {
            entity_id,
            kind: kind.into(),
            position: position.into(),
            rotation: Quat::IDENTITY.into(),
            view_rotation: 0.0,
            velocity: [0.0; 3],
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from(self.velocity)
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }
}

impl StaticState {
    pub fn new(entity_id: u32, kind: impl Into<String>, position: Vec3, rotation: Quat) -> Self {
        Self {
            entity_id,
            kind: kind.into(),
            position: position.into(),
            rotation: rotation.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVariant {
    Spatial,
    Character,
    Static,
}

/// Replicated state of one entity. The variant is fixed for the entity's
/// lifetime; `kind` names the scene template clients spawn it from.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum EntityState {
    Spatial(SpatialState),
    Character(CharacterState),
    Static(StaticState),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot interpolate entity {entity_id} between {from:?} and {to:?}")]
pub struct ShapeMismatch {
    pub entity_id: u32,
    pub from: StateVariant,
    pub to: StateVariant,
}

impl EntityState {
    pub fn entity_id(&self) -> u32 {
        match self {
            Self::Spatial(state) => state.entity_id,
            Self::Character(state) => state.entity_id,
            Self::Static(state) => state.entity_id,
        }
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Spatial(_) => None,
            Self::Character(state) => Some(&state.kind),
            Self::Static(state) => Some(&state.kind),
        }
    }

    pub fn variant(&self) -> StateVariant {
        match self {
            Self::Spatial(_) => StateVariant::Spatial,
            Self::Character(_) => StateVariant::Character,
            Self::Static(_) => StateVariant::Static,
        }
    }

    /// Same variant and same kind, so field-wise operations are meaningful.
    pub fn same_shape(&self, other: &EntityState) -> bool {
        self.variant() == other.variant() && self.kind() == other.kind()
    }

    pub fn position(&self) -> Vec3 {
        match self {
            Self::Spatial(state) => Vec3::from(state.position),
            Self::Character(state) => Vec3::from(state.position),
            Self::Static(state) => Vec3::from(state.position),
        }
    }

    pub fn rotation(&self) -> Quat {
        match self {
            Self::Spatial(state) => Quat::from_array(state.rotation),
            Self::Character(state) => Quat::from_array(state.rotation),
            Self::Static(state) => Quat::from_array(state.rotation),
        }
    }

    pub fn as_character(&self) -> Option<&CharacterState> {
        match self {
            Self::Character(state) => Some(state),
            _ => None,
        }
    }

    /// Blends towards `future` by `theta`. Positions and velocities are
    /// linear, rotations take the shortest arc, view pitch is linear.
    /// `theta` outside `[0, 1]` extrapolates.
    pub fn interpolate(&self, future: &EntityState, theta: f32) -> Result<EntityState, ShapeMismatch> {
        if !self.same_shape(future) {
            return Err(ShapeMismatch {
                entity_id: self.entity_id(),
                from: self.variant(),
                to: future.variant(),
            });
        }

        let state = match (self, future) {
            (Self::Spatial(past), Self::Spatial(next)) => Self::Spatial(SpatialState {
                entity_id: past.entity_id,
                position: lerp(past.position, next.position, theta),
                rotation: slerp(past.rotation, next.rotation, theta),
            }),
            (Self::Character(past), Self::Character(next)) => Self::Character(CharacterState {
                entity_id: past.entity_id,
                kind: past.kind.clone(),
                position: lerp(past.position, next.position, theta),
                rotation: slerp(past.rotation, next.rotation, theta),
                view_rotation: past.view_rotation + (next.view_rotation - past.view_rotation) * theta,
                velocity: lerp(past.velocity, next.velocity, theta),
            }),
            (Self::Static(past), Self::Static(next)) => Self::Static(StaticState {
                entity_id: past.entity_id,
                kind: past.kind.clone(),
                position: lerp(past.position, next.position, theta),
                rotation: slerp(past.rotation, next.rotation, theta),
            }),
            _ => unreachable!("shape checked above"),
        };
        Ok(state)
    }
}

fn lerp(from: [f32; 3], to: [f32; 3], theta: f32) -> [f32; 3] {
    Vec3::from(from).lerp(Vec3::from(to), theta).into()
}

fn slerp(from: [f32; 4], to: [f32; 4], theta: f32) -> [f32; 4] {
    let from = Quat::from_array(from);
    let mut to = Quat::from_array(to);
    if from.dot(to) < 0.0 {
        to = -to;
    }
    from.slerp(to, theta).normalize().into()
}

/// Out-of-band data attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Meta {
    PlayerPossession { player_id: u32, entity_id: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(id: u32, x: f32) -> EntityState {
        EntityState::Character(CharacterState::new(id, "player", Vec3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn positions_interpolate_linearly() {
        let blended = character(1, 0.0).interpolate(&character(1, 10.0), 0.25).unwrap();
        assert!((blended.position().x - 2.5).abs() < 1e-5);
    }

    #[test]
    fn theta_above_one_extrapolates() {
        let blended = character(1, 0.0).interpolate(&character(1, 10.0), 1.5).unwrap();
        assert!((blended.position().x - 15.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_takes_shortest_arc() {
        let past = EntityState::Spatial(SpatialState::new(2, Vec3::ZERO, Quat::from_rotation_y(0.1)));
        let flipped = -Quat::from_rotation_y(0.3);
        let future = EntityState::Spatial(SpatialState::new(2, Vec3::ZERO, flipped));

        let blended = past.interpolate(&future, 0.5).unwrap();
        let expected = Quat::from_rotation_y(0.2);
        assert!(blended.rotation().dot(expected).abs() > 0.9999);
    }

    #[test]
    fn mismatched_variants_are_rejected() {
        let past = character(3, 0.0);
        let future = EntityState::Spatial(SpatialState::new(3, Vec3::ZERO, Quat::IDENTITY));
        let error = past.interpolate(&future, 0.5).unwrap_err();
        assert_eq!(error.from, StateVariant::Character);
        assert_eq!(error.to, StateVariant::Spatial);
    }

    #[test]
    fn kind_change_is_a_shape_change() {
        let a = EntityState::Static(StaticState::new(4, "crate", Vec3::ZERO, Quat::IDENTITY));
        let b = EntityState::Static(StaticState::new(4, "barrel", Vec3::ZERO, Quat::IDENTITY));
        assert!(!a.same_shape(&b));
    }
}
