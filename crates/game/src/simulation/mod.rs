mod aggregator;
mod command;
mod tick;

pub use aggregator::CommandAggregator;
pub use command::{
    merge_commands, ArchivedCommand, ArchivedCommandSnapshot, Command, CommandKind,
    CommandSnapshot, MergePolicy,
};
pub use tick::Tick;
