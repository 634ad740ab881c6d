use bitflags::bitflags;
use glam::Vec3;

bitflags! {
    /// Surfaces touched during a slide move.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Contacts: u8 {
        const FLOOR = 1 << 0;
        const WALL = 1 << 1;
        const CEILING = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub position: Vec3,
    pub velocity: Vec3,
    pub contacts: Contacts,
}

/// Collision queries the character motor relies on.
///
/// Implementations must be deterministic: identical inputs yield identical
/// outcomes, otherwise client replay diverges from the server.
pub trait BodyMover {
    fn on_floor(&self, position: Vec3) -> bool;

    fn move_and_slide(&mut self, position: Vec3, velocity: Vec3, delta: f32) -> MoveOutcome;
}

/// Infinite horizontal plane. `height` is where a resting body's origin sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatGround {
    pub height: f32,
    pub snap_distance: f32,
}

impl Default for FlatGround {
    fn default() -> Self {
        Self {
            height: 0.0,
            snap_distance: 0.05,
        }
    }
}

impl FlatGround {
    pub fn new(height: f32) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }
}

impl BodyMover for FlatGround {
    fn on_floor(&self, position: Vec3) -> bool {
        position.y - self.height <= self.snap_distance
    }

    fn move_and_slide(&mut self, position: Vec3, velocity: Vec3, delta: f32) -> MoveOutcome {
        let mut position = position + velocity * delta;
        let mut velocity = velocity;
        let mut contacts = Contacts::empty();

        if position.y <= self.height {
            position.y = self.height;
            velocity.y = velocity.y.max(0.0);
            contacts |= Contacts::FLOOR;
        }

        MoveOutcome {
            position,
            velocity,
            contacts,
        }
    }
}
