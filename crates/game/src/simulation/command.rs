use std::collections::BTreeMap;

use glam::{Vec2, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

/// A single player intent sampled during a physics step.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Command {
    Move {
        direction: [f32; 2],
        just_started: bool,
    },
    Attack {
        just_started: bool,
    },
    Jump,
    LookAt {
        target: [f32; 3],
    },
    InteractWith {
        target: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandKind {
    LookAt,
    Jump,
    InteractWith,
    Move,
    Attack,
}

/// How repeated samples of one command kind collapse into a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Continuous input, averaged by sample weight.
    Weighted,
    /// Edge-triggered input, present once if it occurred at all.
    Momentary,
    /// Last sample overwrites earlier ones.
    LatestWins,
    /// Every occurrence is kept in order.
    PassThrough,
}

impl CommandKind {
    pub fn merge_policy(self) -> MergePolicy {
        match self {
            Self::Move | Self::Attack => MergePolicy::Weighted,
            Self::Jump => MergePolicy::Momentary,
            Self::LookAt => MergePolicy::LatestWins,
            Self::InteractWith => MergePolicy::PassThrough,
        }
    }
}

impl Command {
    pub fn move_towards(direction: Vec2, just_started: bool) -> Self {
        Self::Move {
            direction: direction.into(),
            just_started,
        }
    }

    pub fn look_at(target: Vec3) -> Self {
        Self::LookAt {
            target: target.into(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Move { .. } => CommandKind::Move,
            Self::Attack { .. } => CommandKind::Attack,
            Self::Jump => CommandKind::Jump,
            Self::LookAt { .. } => CommandKind::LookAt,
            Self::InteractWith { .. } => CommandKind::InteractWith,
        }
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.kind().merge_policy()
    }

    /// What remains of this command past a tick boundary: continuous
    /// commands without their edge flag, nothing for edges.
    pub fn carried_over(&self) -> Option<Command> {
        match self.merge_policy() {
            MergePolicy::Weighted | MergePolicy::LatestWins => {
                let mut command = self.clone();
                command.clear_just_started();
                Some(command)
            }
            MergePolicy::Momentary | MergePolicy::PassThrough => None,
        }
    }

    /// Clears the edge flag carried by continuous commands.
    pub fn clear_just_started(&mut self) {
        match self {
            Self::Move { just_started, .. } | Self::Attack { just_started } => {
                *just_started = false
            }
            _ => {}
        }
    }
}

/// Merged commands for one integer tick.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct CommandSnapshot {
    pub tick: u32,
    pub commands: Vec<Command>,
}

impl CommandSnapshot {
    pub fn new(tick: u32, commands: Vec<Command>) -> Self {
        Self { tick, commands }
    }

    pub fn has(&self, kind: CommandKind) -> bool {
        self.commands.iter().any(|command| command.kind() == kind)
    }
}

/// Collapses weighted command samples into one command list.
///
/// Output order is stable: latest-wins and momentary kinds first, then
/// pass-through commands in arrival order, then the weighted kinds.
pub fn merge_commands<'a, I>(samples: I) -> Vec<Command>
where
    I: IntoIterator<Item = (f32, &'a [Command])>,
{
    let mut singles: BTreeMap<CommandKind, Command> = BTreeMap::new();
    let mut passed = Vec::new();
    let mut total_weight = 0.0;
    let mut movement: Option<(Vec2, bool)> = None;
    let mut attack: Option<bool> = None;

    for (weight, commands) in samples {
        total_weight += weight;
        for command in commands {
            match command {
                Command::Move {
                    direction,
                    just_started,
                } => {
                    let (sum, started) = movement.get_or_insert((Vec2::ZERO, false));
                    *sum += Vec2::from(*direction) * weight;
                    *started |= *just_started;
                }
                Command::Attack { just_started } => {
                    let started = attack.get_or_insert(false);
                    *started |= *just_started;
                }
                Command::Jump => {
                    singles.entry(CommandKind::Jump).or_insert(Command::Jump);
                }
                Command::LookAt { .. } => {
                    singles.insert(CommandKind::LookAt, command.clone());
                }
                Command::InteractWith { .. } => passed.push(command.clone()),
            }
        }
    }

    let mut merged: Vec<Command> = singles.into_values().collect();
    merged.extend(passed);

    if let Some((sum, just_started)) = movement {
        let direction = if total_weight > f32::EPSILON {
            sum / total_weight
        } else {
            sum
        };
        merged.push(Command::move_towards(direction, just_started));
    }
    if let Some(just_started) = attack {
        merged.push(Command::Attack { just_started });
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direction_of(commands: &[Command]) -> Option<Vec2> {
        commands.iter().find_map(|command| match command {
            Command::Move { direction, .. } => Some(Vec2::from(*direction)),
            _ => None,
        })
    }

    #[test]
    fn move_is_weighted_by_sample_coverage() {
        let forward = [Command::move_towards(Vec2::new(0.0, 1.0), false)];
        let right = [Command::move_towards(Vec2::new(1.0, 0.0), false)];

        let merged = merge_commands([(0.75, &forward[..]), (0.25, &right[..])]);
        let direction = direction_of(&merged).unwrap();
        assert!((direction - Vec2::new(0.25, 0.75)).length() < 1e-6);
    }

    #[test]
    fn idle_samples_dilute_movement() {
        let forward = [Command::move_towards(Vec2::new(0.0, 1.0), false)];
        let merged = merge_commands([(0.5, &forward[..]), (0.5, &[][..])]);
        assert!((direction_of(&merged).unwrap().y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn just_started_is_ored() {
        let first = [Command::move_towards(Vec2::X, true), Command::Attack { just_started: false }];
        let second = [Command::move_towards(Vec2::X, false), Command::Attack { just_started: true }];
        let merged = merge_commands([(0.5, &first[..]), (0.5, &second[..])]);

        assert!(merged.contains(&Command::move_towards(Vec2::X, true)));
        assert!(merged.contains(&Command::Attack { just_started: true }));
    }

    #[test]
    fn jump_appears_once() {
        let jump = [Command::Jump];
        let merged = merge_commands([(0.3, &jump[..]), (0.3, &jump[..]), (0.4, &[][..])]);
        assert_eq!(merged, vec![Command::Jump]);
    }

    #[test]
    fn look_at_keeps_latest_sample() {
        let first = [Command::look_at(Vec3::X)];
        let second = [Command::look_at(Vec3::Z)];
        let merged = merge_commands([(0.5, &first[..]), (0.5, &second[..])]);
        assert_eq!(merged, vec![Command::look_at(Vec3::Z)]);
    }

    #[test]
    fn interactions_pass_through_in_order() {
        let first = [Command::InteractWith { target: 4 }];
        let second = [Command::InteractWith { target: 9 }, Command::InteractWith { target: 4 }];
        let merged = merge_commands([(0.5, &first[..]), (0.5, &second[..])]);
        assert_eq!(
            merged,
            vec![
                Command::InteractWith { target: 4 },
                Command::InteractWith { target: 9 },
                Command::InteractWith { target: 4 },
            ]
        );
    }

    #[test]
    fn edges_do_not_carry_over() {
        assert_eq!(
            Command::Attack { just_started: true }.carried_over(),
            Some(Command::Attack { just_started: false })
        );
        assert_eq!(Command::Jump.carried_over(), None);
        assert_eq!(Command::InteractWith { target: 4 }.carried_over(), None);
        let look = Command::look_at(Vec3::Y);
        assert_eq!(look.carried_over(), Some(look));
    }

    #[test]
    fn clear_just_started_only_touches_continuous_commands() {
        let mut movement = Command::move_towards(Vec2::Y, true);
        movement.clear_just_started();
        assert_eq!(movement, Command::move_towards(Vec2::Y, false));

        let mut jump = Command::Jump;
        jump.clear_just_started();
        assert_eq!(jump, Command::Jump);
    }
}
