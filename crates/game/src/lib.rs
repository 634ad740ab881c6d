pub mod net;
pub mod physics;
pub mod simulation;
pub mod snapshot;

pub use net::{
    decode_message, encode_message, Delivery, LatencyEstimator, LinkConditions, LinkSimulator,
    LinkStats, Message, Outgoing, Packet, PacketError, PacketHeader, PeerId, TransportError,
    DEFAULT_SNAPSHOT_HISTORY, DEFAULT_TICK_RATE,
};
pub use physics::{
    BodyMover, CharacterMotor, CharacterShape, Contacts, FlatGround, MotionParams, MoveOutcome,
    PhysicsWorld, RapierMover,
};
pub use simulation::{
    merge_commands, Command, CommandAggregator, CommandKind, CommandSnapshot, MergePolicy, Tick,
};
pub use snapshot::{
    CharacterState, DeltaCodec, DeltaError, DeltaStateSnapshot, EntityPatch, EntityState,
    FieldPatch, FieldValue, Meta, ShapeMismatch, SnapshotError, SnapshotHistory, SpatialState,
    StateSnapshot, StateVariant, StaticState,
};
