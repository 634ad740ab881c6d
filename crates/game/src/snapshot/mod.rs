mod buffer;
mod delta;
mod entity;
mod state;

pub use buffer::SnapshotHistory;
pub use delta::{
    DeltaCodec, DeltaError, DeltaStateSnapshot, EntityPatch, FieldAccessor, FieldPatch,
    FieldValue, StateFields,
};
pub use entity::{
    CharacterState, EntityState, Meta, ShapeMismatch, SpatialState, StateVariant, StaticState,
};
pub use state::{SnapshotError, StateSnapshot};
