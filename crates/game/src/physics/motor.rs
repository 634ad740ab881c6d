use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::mover::{BodyMover, Contacts};
use crate::simulation::Command;
use crate::snapshot::CharacterState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    pub gravity: f32,
    pub jump_velocity: f32,
    pub walking_speed: f32,
    /// Horizontal acceleration towards the target walking velocity.
    pub walking_strength: f32,
    pub view_pitch_limit_degrees: f32,
    /// Height of the view point above the body origin.
    pub eye_height: f32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            gravity: 10.0,
            jump_velocity: 10.0,
            walking_speed: 10.0,
            walking_strength: 60.0,
            view_pitch_limit_degrees: 85.0,
            eye_height: 0.7,
        }
    }
}

/// Deterministic character step shared by the server simulation and client
/// prediction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterMotor {
    params: MotionParams,
}

impl CharacterMotor {
    pub fn new(params: MotionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    /// Advances `state` by `delta` seconds under `commands`.
    pub fn step(
        &self,
        state: &mut CharacterState,
        commands: &[Command],
        delta: f32,
        mover: &mut dyn BodyMover,
    ) -> Contacts {
        let position = state.position();
        let on_floor = mover.on_floor(position);
        let velocity = self.velocity(state.velocity(), on_floor, commands, delta);

        if let Some(target) = commands.iter().rev().find_map(|command| match command {
            Command::LookAt { target } => Some(Vec3::from(*target)),
            _ => None,
        }) {
            self.look_at(state, target);
        }

        let outcome = mover.move_and_slide(position, velocity, delta);
        state.position = outcome.position.into();
        state.velocity = outcome.velocity.into();
        outcome.contacts
    }

    fn velocity(&self, current: Vec3, on_floor: bool, commands: &[Command], delta: f32) -> Vec3 {
        let mut velocity = current;

        if !on_floor {
            velocity.y -= self.params.gravity * delta;
        } else if commands.iter().any(|command| matches!(command, Command::Jump)) {
            velocity.y = self.params.jump_velocity;
        }

        let direction = commands
            .iter()
            .find_map(|command| match command {
                Command::Move { direction, .. } => Some(Vec2::from(*direction)),
                _ => None,
            })
            .unwrap_or(Vec2::ZERO);
        let direction = direction.clamp_length_max(1.0);

        let target = Vec2::new(direction.x, direction.y) * self.params.walking_speed;
        let horizontal = Vec2::new(velocity.x, velocity.z);
        let countering = target - horizontal;
        let strength = self.params.walking_strength * delta;

        let horizontal = if strength * strength > countering.length_squared() {
            target
        } else {
            horizontal + countering.normalize_or_zero() * strength
        };

        velocity.x = horizontal.x;
        velocity.z = horizontal.y;
        velocity
    }

    fn look_at(&self, state: &mut CharacterState, target: Vec3) {
        let eye = state.position() + Vec3::Y * self.params.eye_height;
        let direction = target - eye;
        let flat = Vec2::new(direction.x, direction.z);

        if flat.length_squared() > 1e-8 {
            let yaw = (-direction.x).atan2(-direction.z);
            state.rotation = Quat::from_rotation_y(yaw).into();
        }

        if direction.length_squared() > 1e-8 {
            let limit = self.params.view_pitch_limit_degrees.to_radians();
            state.view_rotation = direction.y.atan2(flat.length()).clamp(-limit, limit);
        }
    }
}
