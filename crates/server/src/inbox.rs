use std::collections::BTreeMap;

use tether::{Command, CommandSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
    Stored,
    /// The tick was already simulated.
    Stale,
    /// The tick is further ahead than the horizon allows.
    TooFarAhead,
}

/// Per-player commands keyed by the server tick they apply to. A later
/// write for the same tick replaces the earlier one, so clients can resend
/// unacknowledged ticks freely.
#[derive(Debug, Clone)]
pub struct CommandInbox {
    commands: BTreeMap<u32, Vec<Command>>,
    applied_tick: Option<u32>,
    horizon: u32,
}

impl CommandInbox {
    pub fn new(horizon: u32) -> Self {
        Self {
            commands: BTreeMap::new(),
            applied_tick: None,
            horizon,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn applied_tick(&self) -> Option<u32> {
        self.applied_tick
    }

    pub fn insert(&mut self, current_tick: u32, snapshot: CommandSnapshot) -> InboxOutcome {
        if self.applied_tick.is_some_and(|applied| snapshot.tick <= applied) {
            return InboxOutcome::Stale;
        }
        if snapshot.tick > current_tick.saturating_add(self.horizon) {
            log::warn!(
                "commands for tick {} are more than {} ticks past {current_tick}, rejecting",
                snapshot.tick,
                self.horizon
            );
            return InboxOutcome::TooFarAhead;
        }
        self.commands.insert(snapshot.tick, snapshot.commands);
        InboxOutcome::Stored
    }

    /// Removes and returns the commands for `tick`, discarding anything
    /// older. A missing entry means no input for this tick.
    pub fn take(&mut self, tick: u32) -> Vec<Command> {
        let mut remaining = self.commands.split_off(&tick);
        let commands = remaining.remove(&tick).unwrap_or_default();
        self.commands = remaining;
        self.applied_tick = Some(tick);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tick: u32, commands: Vec<Command>) -> CommandSnapshot {
        CommandSnapshot::new(tick, commands)
    }

    #[test]
    fn latest_write_wins() {
        let mut inbox = CommandInbox::new(16);
        inbox.insert(10, snapshot(12, vec![Command::Jump]));
        inbox.insert(10, snapshot(12, vec![]));
        assert_eq!(inbox.len(), 1);
        assert!(inbox.take(12).is_empty());
    }

    #[test]
    fn take_drops_older_ticks() {
        let mut inbox = CommandInbox::new(16);
        for tick in 5..9 {
            inbox.insert(4, snapshot(tick, vec![Command::Jump]));
        }
        assert_eq!(inbox.take(7), vec![Command::Jump]);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.applied_tick(), Some(7));
    }

    #[test]
    fn stale_and_distant_ticks_are_refused() {
        let mut inbox = CommandInbox::new(4);
        inbox.take(10);
        assert_eq!(inbox.insert(11, snapshot(10, vec![])), InboxOutcome::Stale);
        assert_eq!(inbox.insert(11, snapshot(16, vec![])), InboxOutcome::TooFarAhead);
        assert_eq!(inbox.insert(11, snapshot(15, vec![])), InboxOutcome::Stored);
    }

    #[test]
    fn missing_tick_means_no_input() {
        let mut inbox = CommandInbox::new(4);
        assert!(inbox.take(3).is_empty());
    }
}
