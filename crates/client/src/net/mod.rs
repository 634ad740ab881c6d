pub mod client;
pub mod clock;
pub mod config;
pub mod input;
pub mod interpolation;
pub mod prediction;

pub use client::{ClientError, ClientStats, NetworkClient};
pub use clock::{CatchUp, ClockSynchronizer, RateChange, SyncCurve, TickBufferGauge, TickClock};
pub use config::{ClientConfig, ClockConfig};
pub use input::{InputSampler, InputState};
pub use interpolation::{FrameOutcome, InterpolationBuffer, InterpolationStats};
pub use prediction::{PredictionEngine, SubTick};
