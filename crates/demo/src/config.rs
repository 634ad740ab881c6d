use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tether::LinkConditions;
use tether_client::ClientConfig;
use tether_server::ServerConfig;

use crate::Args;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub clients: u32,
    pub seconds: f32,
    pub frame_rate: u32,
    pub seed: u64,
    pub server: ServerConfig,
    pub client: ClientConfig,
    /// Applied to both directions of every client's link.
    pub link: LinkConditions,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            clients: 2,
            seconds: 10.0,
            frame_rate: 60,
            seed: 7,
            server: ServerConfig {
                crates: vec![[4.0, 0.5, 0.0], [-3.0, 0.5, 5.0]],
                ..Default::default()
            },
            client: ClientConfig::default(),
            link: LinkConditions {
                loss_percent: 0.0,
                min_latency_ms: 50,
                max_latency_ms: 50,
                jitter_ms: 10,
            },
        }
    }
}

impl DemoConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Command-line flags win over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(clients) = args.clients {
            self.clients = clients;
        }
        if let Some(seconds) = args.seconds {
            self.seconds = seconds;
        }
        if let Some(tick_rate) = args.tick_rate {
            self.server.tick_rate = tick_rate;
        }
        if let Some(latency) = args.latency_ms {
            self.link.min_latency_ms = latency;
            self.link.max_latency_ms = latency;
        }
        if let Some(jitter) = args.jitter_ms {
            self.link.jitter_ms = jitter;
        }
        if let Some(loss) = args.loss {
            self.link.loss_percent = loss.clamp(0.0, 100.0);
        }
        if let Some(seed) = args.seed {
            self.seed = seed;
        }
    }
}
