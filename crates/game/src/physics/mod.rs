mod motor;
mod mover;
mod world;

pub use motor::{CharacterMotor, MotionParams};
pub use mover::{BodyMover, Contacts, FlatGround, MoveOutcome};
pub use world::{CharacterShape, PhysicsWorld, RapierMover};
