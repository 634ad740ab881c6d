pub mod game;
pub mod net;

pub use game::{ClientWorld, EntityContainer, SpawnError, Transform};
pub use net::{
    CatchUp, ClientConfig, ClientError, ClientStats, ClockConfig, FrameOutcome, InputSampler,
    InputState, InterpolationBuffer, NetworkClient, PredictionEngine, TickClock,
};
