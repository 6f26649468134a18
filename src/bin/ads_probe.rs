//! Ad probe CLI
//!
//! Plays a short scripted conversation against a live ad server and prints
//! every ad result the session publishes.
//!
//! Usage:
//!   ADS_PUBLISHER_TOKEN=... ADS_USER_ID=u1 ADS_CONVERSATION_ID=c1 \
//!   ADS_PLACEMENT_CODES=inlineAd \
//!   cargo run --features cli --bin ads_probe -- --turns 2
//!
//! Configuration is read from the environment (and `.env` if present); flags
//! override the server URL and timings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use chat_ads::domain::DeviceInfo;
use chat_ads::surface::{SurfaceBackend, SurfacePool};
use chat_ads::telemetry::{init_tracing, parse_remote_level};
use chat_ads::{
    AdResult, AdSession, AdsConfig, EngineSettings, HttpAdsRepository, Message,
    StaticDeviceInfo,
};

#[derive(Parser, Debug)]
#[command(name = "ads_probe")]
#[command(about = "Run a scripted conversation against an ad server")]
struct Args {
    /// Ad server base URL (overrides ADS_SERVER_URL)
    #[arg(long, env = "ADS_SERVER_URL")]
    server: Option<String>,

    /// Number of user/assistant exchanges to play
    #[arg(long, default_value = "1")]
    turns: usize,

    /// How long to wait for each result, in milliseconds
    #[arg(long, default_value = "8000")]
    wait_ms: u64,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,
}

/// The probe renders nothing; a surface is just its message id.
struct HeadlessBackend;

impl SurfaceBackend for HeadlessBackend {
    type Handle = String;

    fn create(&self, key: &str) -> String {
        key.to_string()
    }
    fn detach(&self, _handle: &String) {}
    fn destroy(&self, _handle: String) {}
    fn post_message(&self, handle: &String, message: &str) {
        tracing::debug!(surface = %handle, payload = message, "Surface message");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("chat_ads=info,ads_probe=info");

    let args = Args::parse();

    let mut config = AdsConfig::from_env().context("Loading ADS_* configuration")?;
    if let Some(server) = args.server {
        config = config
            .with_ad_server_url(&server)
            .context("Invalid --server")?;
    }
    let settings = EngineSettings::from_env();

    let repository = Arc::new(
        HttpAdsRepository::new(config.ad_server_url.clone()).context("Creating HTTP client")?,
    );
    let pool = Arc::new(SurfacePool::new(
        HeadlessBackend,
        settings.surface_pool_capacity,
    ));
    let device = DeviceInfo {
        os: std::env::consts::OS.to_string(),
        device_type: "desktop".to_string(),
        locale: "en-US".to_string(),
        timezone: "UTC".to_string(),
        ..DeviceInfo::default()
    };

    let session = AdSession::new(
        config,
        settings,
        repository,
        Arc::new(StaticDeviceInfo(device)),
        pool,
    );
    let mut results = session.subscribe();
    let wait = Duration::from_millis(args.wait_ms);

    let mut transcript = Vec::new();
    for turn in 0..args.turns {
        transcript.push(Message::user(format!(
            "Any recommendations for a weekend trip? (turn {})",
            turn + 1
        )));
        transcript.push(Message::assistant(
            "A few ideas: a coastal hike, a city museum day, or a lake cabin.",
        ));
        session.set_messages(transcript.clone());

        match tokio::time::timeout(wait, results.changed()).await {
            Ok(Ok(())) => {
                let result = results.borrow_and_update().clone();
                print_result(turn + 1, result.as_ref(), args.json)?;
            }
            Ok(Err(_)) => break,
            Err(_) => println!("turn {}: no result within {} ms", turn + 1, args.wait_ms),
        }
    }

    if let Some(level) = session.remote_log_level() {
        println!(
            "remote log level: {level} ({:?})",
            parse_remote_level(&level)
        );
    }
    println!("session id: {}", session.session_id().unwrap_or_else(|| "-".into()));

    session.close();
    Ok(())
}

fn print_result(turn: usize, result: Option<&AdResult>, json: bool) -> Result<()> {
    let Some(result) = result else {
        println!("turn {turn}: pending");
        return Ok(());
    };

    match result {
        AdResult::Success(map) if json => {
            let urls: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .map(|(id, placements)| {
                    let urls = placements
                        .iter()
                        .map(|p| serde_json::Value::from(p.render_url.clone()))
                        .collect();
                    (id.clone(), serde_json::Value::Array(urls))
                })
                .collect();
            println!("{}", serde_json::to_string(&urls)?);
        }
        AdResult::Success(map) if map.is_empty() => println!("turn {turn}: no placements"),
        AdResult::Success(map) => {
            for (message_id, placements) in map {
                for placement in placements {
                    println!(
                        "turn {turn}: {message_id} <- {} [{}] {}",
                        placement.bid.bid_id, placement.bid.code, placement.render_url
                    );
                }
            }
        }
        AdResult::Error(e) => println!("turn {turn}: {e}"),
    }
    Ok(())
}
