mod world;

pub use world::{ClientEntity, ClientWorld, EntityContainer, SpawnError, Transform};
