use serde::{Deserialize, Serialize};
use tether::{DEFAULT_SNAPSHOT_HISTORY, DEFAULT_TICK_RATE, MotionParams};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("tick rate must be positive")]
    ZeroTickRate,
    #[error("snapshot history must hold at least one snapshot")]
    EmptyHistory,
    #[error("command horizon must be at least one tick")]
    ZeroCommandHorizon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tick_rate: u32,
    /// Hard cap on stored snapshots, even when a peer never acknowledges.
    pub max_snapshot_history: usize,
    /// How far past the current tick client commands are still accepted.
    pub command_horizon_ticks: u32,
    pub character_kind: String,
    pub spawn_point: [f32; 3],
    pub spawn_spacing: f32,
    pub ground_height: f32,
    pub ground_half_size: f32,
    /// Positions of static crates placed in the world at startup.
    pub crates: Vec<[f32; 3]>,
    pub motion: MotionParams,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_snapshot_history: DEFAULT_SNAPSHOT_HISTORY,
            command_horizon_ticks: 128,
            character_kind: "player".to_string(),
            spawn_point: [0.0, 0.9, 0.0],
            spawn_spacing: 2.0,
            ground_height: 0.0,
            ground_half_size: 100.0,
            crates: Vec::new(),
            motion: MotionParams::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.max_snapshot_history == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        if self.command_horizon_ticks == 0 {
            return Err(ConfigError::ZeroCommandHorizon);
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}
