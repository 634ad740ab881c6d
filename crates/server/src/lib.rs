pub mod config;
pub mod events;
pub mod inbox;
pub mod replicator;
pub mod runtime;
pub mod server;
pub mod world;

pub use config::{ConfigError, ServerConfig};
pub use events::ServerEvent;
pub use inbox::{CommandInbox, InboxOutcome};
pub use replicator::{AckOutcome, ReplicatorStats, SendKind, SnapshotReplicator};
pub use runtime::{run_server, spawn_server, ServerHandle, ServerInput};
pub use server::{GameServer, ServerError, ServerStats};
pub use world::{build_mover, ServerWorld};
