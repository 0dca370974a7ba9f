use std::{fmt::Write as _, io::Write as _};

use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset, NaiveDate};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(name = "timekeeper_cli", version)]
struct Args {
    /// Core base URL, e.g. http://127.0.0.1:5000
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    core_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the timer. Does nothing if it is already running.
    Start,
    /// Stop the timer and record the session.
    Stop,
    /// Remove today's sessions and discard a running timer.
    Reset,
    /// Show the timer state, today's elapsed time and recorded sessions.
    Status {
        /// Only list sessions that started on this local date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show totals for today, the last 7 days, this month and this year.
    Report,
    /// Keep printing today's elapsed time.
    Watch {
        /// Poll interval (milliseconds).
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },
}

#[derive(Debug, Deserialize)]
struct ActionReply {
    ok: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionReply {
    start: String,
    #[serde(default)]
    stop: Option<String>,
    #[serde(default)]
    duration_ms: i64,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    running: bool,
    current_start: Option<String>,
    sessions: Vec<SessionReply>,
    base_elapsed_ms: i64,
    running_elapsed_ms: i64,
    server_now: String,
}

impl StatusReply {
    fn elapsed_today_ms(&self) -> i64 {
        self.base_elapsed_ms + self.running_elapsed_ms
    }
}

#[derive(Debug, Deserialize)]
struct BreakdownReply {
    hours: String,
    minutes: String,
    seconds: String,
}

#[derive(Debug, Deserialize)]
struct ReportsReply {
    today: BreakdownReply,
    week: BreakdownReply,
    month: BreakdownReply,
    year: BreakdownReply,
}

struct CoreClient {
    http: Client,
    base: String,
}

impl CoreClient {
    fn new(core_url: &str) -> Self {
        Self {
            http: Client::new(),
            base: core_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = self.endpoint(path);
        debug!("GET {url}");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Failed actions still carry a `{ok: false, error}` body, so it is decoded whatever the
    /// HTTP status.
    async fn post_action(&self, path: &str) -> anyhow::Result<ActionReply> {
        let url = self.endpoint(path);
        debug!("POST {url}");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        let body = resp.bytes().await.with_context(|| format!("POST {url}"))?;
        serde_json::from_slice(&body)
            .with_context(|| format!("POST {url}: unexpected {status} reply"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timekeeper_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = CoreClient::new(&args.core_url);

    match args.command {
        Command::Start => {
            let reply = client.post_action("/api/start").await?;
            println!("{}", action_text("started", reply)?);
        }
        Command::Stop => {
            let reply = client.post_action("/api/stop").await?;
            println!("{}", action_text("stopped", reply)?);
        }
        Command::Reset => {
            let reply = client.post_action("/api/reset").await?;
            println!("{}", action_text("reset", reply)?);
        }
        Command::Status { date } => {
            let status: StatusReply = client.get("/api/status").await?;
            print!("{}", render_status(&status, date));
        }
        Command::Report => {
            let reports: ReportsReply = client.get("/api/reports").await?;
            print!("{}", render_report(&reports));
        }
        Command::Watch { poll_ms } => watch(&client, poll_ms).await,
    }
    Ok(())
}

async fn watch(client: &CoreClient, poll_ms: u64) {
    let mut stdout = std::io::stdout();
    loop {
        match client.get::<StatusReply>("/api/status").await {
            Ok(status) => {
                let marker = if status.running { "running" } else { "stopped" };
                let _ = write!(stdout, "\r{} {marker} ", fmt_hms(status.elapsed_today_ms()));
                let _ = stdout.flush();
            }
            Err(err) => error!("status poll failed: {err:#}"),
        }
        sleep(Duration::from_millis(poll_ms.max(100))).await;
    }
}

fn action_text(done: &str, reply: ActionReply) -> anyhow::Result<String> {
    if !reply.ok {
        bail!(
            "request failed: {}",
            reply.error.or(reply.message).unwrap_or_else(|| "unknown error".into())
        );
    }
    Ok(reply.message.unwrap_or_else(|| format!("Timer {done}")))
}

/// Calendar date of `rfc3339` in `offset`, or in its own offset when none is known.
fn local_date(rfc3339: &str, offset: Option<FixedOffset>) -> Option<NaiveDate> {
    let t = DateTime::parse_from_rfc3339(rfc3339).ok()?;
    Some(match offset {
        Some(offset) => t.with_timezone(&offset).date_naive(),
        None => t.date_naive(),
    })
}

fn render_status(status: &StatusReply, date: Option<NaiveDate>) -> String {
    let mut out = String::new();
    match (status.running, status.current_start.as_deref()) {
        (true, Some(start)) => {
            let _ = writeln!(out, "Running since {}", fmt_local(start));
        }
        (true, None) => {
            let _ = writeln!(out, "Running");
        }
        (false, _) => {
            let _ = writeln!(out, "Stopped");
        }
    }
    let _ = writeln!(out, "Today: {}", fmt_hms(status.elapsed_today_ms()));
    let _ = writeln!(out, "Server time: {}", fmt_local(&status.server_now));

    // Day boundaries follow the server's configured offset.
    let offset = DateTime::parse_from_rfc3339(&status.server_now)
        .ok()
        .map(|t| *t.offset());
    let sessions: Vec<_> = status
        .sessions
        .iter()
        .filter(|s| date.is_none() || local_date(&s.start, offset) == date)
        .collect();

    match date {
        Some(day) if sessions.is_empty() => {
            let _ = writeln!(out, "No sessions on {day}");
        }
        Some(day) => {
            let _ = writeln!(out, "Sessions on {day}:");
        }
        None if sessions.is_empty() => {}
        None => {
            let _ = writeln!(out, "Sessions:");
        }
    }
    for (i, s) in sessions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {}  ->  {}  {}",
            i + 1,
            fmt_local(&s.start),
            s.stop.as_deref().map(fmt_local).unwrap_or_else(|| "-".to_string()),
            fmt_hms(s.duration_ms)
        );
    }
    out
}

fn render_report(reports: &ReportsReply) -> String {
    let mut out = String::new();
    for (label, b) in [
        ("Today", &reports.today),
        ("Last 7 days", &reports.week),
        ("This month", &reports.month),
        ("This year", &reports.year),
    ] {
        let _ = writeln!(out, "{label:<12} {} {} {}", b.hours, b.minutes, b.seconds);
    }
    out
}

fn fmt_hms(ms: i64) -> String {
    let s = ms.max(0) / 1000;
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

/// Renders a server timestamp in its own offset, dropping sub-second digits.
fn fmt_local(rfc3339: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}
