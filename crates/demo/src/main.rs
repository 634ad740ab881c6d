mod config;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use config::DemoConfig;

#[derive(Parser, Debug)]
#[command(name = "tether-demo")]
#[command(about = "Runs a server and several clients over a simulated network")]
pub struct Args {
    #[arg(short, long, help = "TOML file with demo, server, client and link settings")]
    config: Option<PathBuf>,

    #[arg(long)]
    clients: Option<u32>,

    #[arg(long, help = "How long to run, in seconds")]
    seconds: Option<f32>,

    #[arg(long)]
    tick_rate: Option<u32>,

    #[arg(long, help = "One-way latency in ms")]
    latency_ms: Option<u32>,

    #[arg(long, help = "Extra random delay in ms")]
    jitter_ms: Option<u32>,

    #[arg(long, help = "Packet loss percentage (0-100)")]
    loss: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = DemoConfig::load(args.config.as_deref())?;
    config.apply_args(&args);

    log::info!(
        "running {} clients for {:.1}s at {} ticks per second ({}-{}ms latency, {}ms jitter, {:.1}% loss)",
        config.clients,
        config.seconds,
        config.server.tick_rate,
        config.link.min_latency_ms,
        config.link.max_latency_ms,
        config.link.jitter_ms,
        config.link.loss_percent
    );

    let report = session::run(config).await?;

    let server = &report.server;
    log::info!(
        "server: tick {}, {} peers, {} entities, {} snapshots kept, {} full / {} delta / {} fallback sends",
        server.tick,
        server.peers,
        server.entities,
        server.history,
        server.replication.full_sent,
        server.replication.delta_sent,
        server.replication.fallbacks
    );
    if server.stale_commands + server.rejected_commands + server.ignored_acks > 0 {
        log::info!(
            "server: {} stale and {} rejected command ticks, {} ignored acks",
            server.stale_commands,
            server.rejected_commands,
            server.ignored_acks
        );
    }

    for client in &report.clients {
        let stats = &client.stats;
        log::info!(
            "client {}: clock error {:+.2} ticks, scale {:.3}, buffer {} ticks, {} pending steps, {} hard catch-ups",
            client.player_id,
            stats.last_clock_error,
            stats.time_scale,
            stats.buffer_ticks,
            stats.pending_commands,
            stats.hard_catch_ups
        );
        log::info!(
            "client {}: {} snapshots ({} deltas, {} rejected), {} interpolated of {} entities, possessing {:?}, interpolating {}",
            client.player_id,
            stats.snapshots_received,
            stats.deltas_applied,
            stats.deltas_rejected,
            stats.interpolated_entities,
            client.world_entities,
            client.possessed,
            client.interpolating
        );
        log::info!(
            "client {}: uplink {}/{} dropped, downlink {}/{} dropped",
            client.player_id,
            client.uplink.dropped,
            client.uplink.sent,
            client.downlink.dropped,
            client.downlink.sent
        );
    }

    Ok(())
}
