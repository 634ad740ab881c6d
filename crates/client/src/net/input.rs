use glam::{Vec2, Vec3};
use tether::Command;

/// Raw controls for one physics step.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub move_direction: [f32; 2],
    pub look_target: Option<[f32; 3]>,
    pub jump: bool,
    pub attack: bool,
    pub interact: Option<u32>,
}

/// Turns successive [`InputState`]s into commands, marking held commands
/// with `just_started` on the first step they appear.
#[derive(Debug, Clone, Default)]
pub struct InputSampler {
    was_moving: bool,
    was_attacking: bool,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, input: &InputState) -> Vec<Command> {
        let mut commands = Vec::new();

        let mut direction = Vec2::from(input.move_direction);
        if direction.length_squared() > 1.0 {
            direction = direction.normalize();
        }
        let moving = direction != Vec2::ZERO;
        if moving {
            commands.push(Command::move_towards(direction, !self.was_moving));
        }
        self.was_moving = moving;

        if input.attack {
            commands.push(Command::Attack {
                just_started: !self.was_attacking,
            });
        }
        self.was_attacking = input.attack;

        if input.jump {
            commands.push(Command::Jump);
        }
        if let Some(target) = input.look_target {
            commands.push(Command::look_at(Vec3::from(target)));
        }
        if let Some(target) = input.interact {
            commands.push(Command::InteractWith { target });
        }

        commands
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
