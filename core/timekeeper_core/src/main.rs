mod accounting;
mod api;
mod clock;
mod model;
mod store;
mod timer;

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use clap::Parser;
use tracing::info;

use crate::{api::AppState, clock::SystemClock, store::JsonStore};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TZ_OFFSET_MINUTES: i32 = 5 * 60 + 30;
const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;

#[derive(Parser, Debug)]
#[command(name = "timekeeper_core", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:5000
    /// - ip (implies port 5000), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: String,

    /// JSON storage document. Created with an empty, stopped timer if missing.
    #[arg(long, default_value = "./data/storage.json")]
    data: PathBuf,

    /// Fixed local offset in minutes used for day/week/month/year boundaries, e.g. 330 for UTC+5:30.
    #[arg(long, default_value_t = DEFAULT_TZ_OFFSET_MINUTES, allow_negative_numbers = true)]
    tz_offset_minutes: i32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timekeeper_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let tz_offset = tz_offset_from_minutes(normalize_tz_offset_minutes(args.tz_offset_minutes));

    let store = JsonStore::open(&args.data)?;
    info!("Data: {}", store.path().display());
    let state = AppState::new(store, Arc::new(SystemClock), tz_offset);
    let app = api::router(state);

    let addr = parse_listen(&args.listen)?;
    info!("Timekeeper listening on http://{addr}");
    info!("Local offset: {tz_offset}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some((host, port_str)) = input.rsplit_once(':') {
        let ip = if host == "localhost" {
            Some(IpAddr::from([127, 0, 0, 1]))
        } else {
            // bare IPv6 host followed by :port
            host.parse::<IpAddr>().ok()
        };
        if let Some(ip) = ip {
            let port: u16 = port_str.parse().map_err(|_| {
                anyhow::anyhow!(
                    "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                    input,
                    DEFAULT_PORT
                )
            })?;
            return Ok(SocketAddr::new(ip, port));
        }
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

fn normalize_tz_offset_minutes(v: i32) -> i32 {
    v.clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX)
}

fn tz_offset_from_minutes(minutes: i32) -> time::UtcOffset {
    time::UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
        .unwrap_or(time::UtcOffset::UTC)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
