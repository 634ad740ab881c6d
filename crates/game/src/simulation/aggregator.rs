use std::collections::BTreeMap;

use super::command::{merge_commands, Command, CommandSnapshot};
use super::tick::Tick;

#[derive(Debug, Clone)]
struct WeightedSample {
    weight: f32,
    commands: Vec<Command>,
}

/// Splits sub-tick command samples along integer tick boundaries and merges
/// each tick's share into a single [`CommandSnapshot`].
///
/// A sample spanning `[10.7, 11.2)` contributes 0.3 of its weight to tick 10
/// and 0.2 to tick 11. Momentary and pass-through commands are edges, so they
/// land only in the tick where the sample starts. Continuous commands reach
/// every tick, but their `just_started` flag only survives in the first.
#[derive(Debug, Clone)]
pub struct CommandAggregator {
    rate: u32,
    buckets: BTreeMap<u32, Vec<WeightedSample>>,
}

impl CommandAggregator {
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            buckets: BTreeMap::new(),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn add_sample(&mut self, start: Tick, end: Tick, commands: &[Command]) {
        if start.rate() != self.rate || end.rate() != self.rate {
            log::error!(
                "dropping command sample from rate {} in a {} Hz aggregator",
                start.rate(),
                self.rate
            );
            return;
        }

        let mut cursor = start.as_ticks();
        let end = end.as_ticks();

        if end <= cursor {
            self.push(cursor.floor() as u32, 0.0, commands.to_vec());
            return;
        }

        let mut first = true;
        while cursor < end {
            let bucket = cursor.floor();
            let segment_end = (bucket + 1.0).min(end);
            let weight = (segment_end - cursor) as f32;

            let share = if first {
                commands.to_vec()
            } else {
                continuous_only(commands)
            };
            self.push(bucket as u32, weight, share);

            first = false;
            cursor = segment_end;
        }
    }

    fn push(&mut self, tick: u32, weight: f32, commands: Vec<Command>) {
        self.buckets
            .entry(tick)
            .or_default()
            .push(WeightedSample { weight, commands });
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn finish(&self) -> Vec<CommandSnapshot> {
        self.buckets
            .iter()
            .map(|(tick, samples)| {
                let merged = merge_commands(
                    samples
                        .iter()
                        .map(|sample| (sample.weight, sample.commands.as_slice())),
                );
                CommandSnapshot::new(*tick, merged)
            })
            .collect()
    }
}

fn continuous_only(commands: &[Command]) -> Vec<Command> {
    commands.iter().filter_map(Command::carried_over).collect()
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::simulation::CommandKind;

    const RATE: u32 = 10;

    fn tick(at: f32) -> Tick {
        Tick::at(RATE, at.floor() as u32, (at - at.floor()) / RATE as f32)
    }

    #[test]
    fn sample_is_split_across_tick_boundary() {
        let mut aggregator = CommandAggregator::new(RATE);
        aggregator.add_sample(
            tick(10.7),
            tick(11.2),
            &[Command::move_towards(Vec2::Y, false)],
        );

        let snapshots = aggregator.finish();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].tick, 10);
        assert_eq!(snapshots[1].tick, 11);
        assert!(snapshots.iter().all(|s| s.has(CommandKind::Move)));
    }

    #[test]
    fn weights_follow_covered_fraction() {
        let mut aggregator = CommandAggregator::new(RATE);
        aggregator.add_sample(tick(5.0), tick(5.5), &[Command::move_towards(Vec2::X, false)]);
        aggregator.add_sample(tick(5.5), tick(6.0), &[]);

        let snapshots = aggregator.finish();
        assert_eq!(snapshots.len(), 1);
        match &snapshots[0].commands[0] {
            Command::Move { direction, .. } => assert!((direction[0] - 0.5).abs() < 1e-4),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn jump_lands_in_starting_tick_only() {
        let mut aggregator = CommandAggregator::new(RATE);
        aggregator.add_sample(tick(3.5), tick(4.5), &[Command::Jump]);

        let snapshots = aggregator.finish();
        assert!(snapshots[0].has(CommandKind::Jump));
        assert!(!snapshots[1].has(CommandKind::Jump));
    }

    #[test]
    fn just_started_stays_in_starting_tick() {
        let mut aggregator = CommandAggregator::new(RATE);
        aggregator.add_sample(
            tick(10.7),
            tick(11.2),
            &[
                Command::Attack { just_started: true },
                Command::move_towards(Vec2::X, true),
            ],
        );

        let snapshots = aggregator.finish();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].commands.contains(&Command::Attack { just_started: true }));
        assert!(snapshots[0].commands.iter().any(|command| matches!(
            command,
            Command::Move { just_started: true, .. }
        )));

        assert!(snapshots[1].commands.contains(&Command::Attack { just_started: false }));
        assert!(snapshots[1].commands.iter().any(|command| matches!(
            command,
            Command::Move { just_started: false, .. }
        )));
    }

    #[test]
    fn zero_length_sample_still_counts_edges() {
        let mut aggregator = CommandAggregator::new(RATE);
        aggregator.add_sample(tick(2.25), tick(2.25), &[Command::Jump]);

        let snapshots = aggregator.finish();
        assert_eq!(snapshots, vec![CommandSnapshot::new(2, vec![Command::Jump])]);
    }

    #[test]
    fn mismatched_rate_is_dropped() {
        let mut aggregator = CommandAggregator::new(RATE);
        aggregator.add_sample(Tick::at(60, 1, 0.0), Tick::at(60, 2, 0.0), &[Command::Jump]);
        assert!(aggregator.is_empty());
    }
}
