use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use voxlive::channel::RealtimeChannel;
use voxlive::{create_router, AppState, Config, NatsAgentChannel};

#[derive(Parser, Debug)]
#[command(name = "voxlive", about = "Live voice conversation service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/voxlive")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v0.1.0", cfg.service.name);
    info!(
        "Audio: capture {}Hz, playback {}Hz",
        cfg.audio.capture_sample_rate, cfg.audio.playback_sample_rate
    );
    info!("Agent transport: {}", cfg.agent.nats_url);

    let channel: Arc<dyn RealtimeChannel> =
        Arc::new(NatsAgentChannel::new(cfg.agent.nats_url.clone()));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg, channel);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
