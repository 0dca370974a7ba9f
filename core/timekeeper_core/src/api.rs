use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::{
    accounting::{start_of_day, total_ms_in_window, Breakdown, BreakdownText, Window, WindowTotals},
    clock::Clock,
    model::{Session, TimerDocument},
    store::JsonStore,
    timer::{StartOutcome, StopOutcome},
};

#[derive(Clone)]
pub struct AppState {
    /// Held for the whole load/mutate/save sequence of a request.
    pub store: Arc<Mutex<JsonStore>>,
    pub clock: Arc<dyn Clock>,
    pub tz_offset: UtcOffset,
}

impl AppState {
    pub fn new(store: JsonStore, clock: Arc<dyn Clock>, tz_offset: UtcOffset) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            clock,
            tz_offset,
        }
    }

    fn now(&self) -> OffsetDateTime {
        self.clock.now_utc().to_offset(self.tz_offset)
    }
}

#[derive(Serialize)]
struct ActionResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

#[derive(Serialize)]
struct HealthInfo {
    status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    now: OffsetDateTime,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct StatusSnapshot {
    running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    current_start: Option<OffsetDateTime>,
    sessions: Vec<Session>,
    /// Closed sessions only, clipped to today up to now.
    base_elapsed_ms: i64,
    /// Running interval clipped to today up to now.
    running_elapsed_ms: i64,
    #[serde(with = "time::serde::rfc3339")]
    server_now: OffsetDateTime,
}

#[derive(Serialize)]
struct Reports {
    today: BreakdownText,
    week: BreakdownText,
    month: BreakdownText,
    year: BreakdownText,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/start", post(post_start).options(options_ok))
        .route("/api/stop", post(post_stop).options(options_ok))
        .route("/api/reset", post(post_reset).options(options_ok))
        .route("/api/status", get(get_status))
        .route("/api/reports", get(get_reports))
        .with_state(state)
        .layer(cors)
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthInfo {
        status: "ok",
        now: state.now(),
        service: "timekeeper_core",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn ack(message: Option<&'static str>) -> Response {
    Json(ActionResponse { ok: true, message }).into_response()
}

fn failure(error: &'static str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrResponse { ok: false, error }),
    )
        .into_response()
}

fn storage_error(err: anyhow::Error) -> Response {
    error!("storage failed: {err:#}");
    failure("storage_error")
}

async fn post_start(State(state): State<AppState>) -> Response {
    let store = state.store.lock().await;
    let mut doc = match store.load() {
        Ok(doc) => doc,
        Err(err) => return storage_error(err),
    };

    let now = state.now();
    if doc.start(now) == StartOutcome::AlreadyRunning {
        return ack(Some("Already running"));
    }
    if let Err(err) = store.save(&doc) {
        return storage_error(err);
    }

    info!(start = %now, "timer started");
    ack(None)
}

async fn post_stop(State(state): State<AppState>) -> Response {
    let store = state.store.lock().await;
    let mut doc = match store.load() {
        Ok(doc) => doc,
        Err(err) => return storage_error(err),
    };

    let message = match doc.stop(state.now()) {
        StopOutcome::AlreadyStopped => return ack(Some("Already stopped")),
        StopOutcome::Stopped(session) => {
            info!(duration_ms = session.duration_ms, "timer stopped");
            None
        }
        StopOutcome::Recovered => {
            warn!("timer was running without a start time; forced to stopped");
            Some("Recovered state")
        }
    };
    if let Err(err) = store.save(&doc) {
        return storage_error(err);
    }
    ack(message)
}

async fn post_reset(State(state): State<AppState>) -> Response {
    let store = state.store.lock().await;
    let mut doc = match store.load() {
        Ok(doc) => doc,
        Err(err) => return storage_error(err),
    };

    let outcome = doc.reset(state.now(), state.tz_offset);
    if let Err(err) = store.save(&doc) {
        return storage_error(err);
    }

    info!(
        sessions_removed = outcome.sessions_removed,
        discarded_running = outcome.discarded_running,
        "today's sessions reset"
    );
    ack(Some("Today's timer reset completed"))
}

async fn load_snapshot(state: &AppState) -> anyhow::Result<TimerDocument> {
    let store = state.store.lock().await;
    store.load()
}

async fn get_status(State(state): State<AppState>) -> Response {
    let doc = match load_snapshot(&state).await {
        Ok(doc) => doc,
        Err(err) => return storage_error(err),
    };

    let now = state.now();
    let so_far = Window {
        start: start_of_day(now, state.tz_offset),
        end: now,
    };
    let base_elapsed_ms = total_ms_in_window(&doc.sessions, so_far, false, None, now);
    let running_elapsed_ms = match (doc.running, doc.current_start) {
        (true, Some(start)) => so_far.clip_ms(start, now),
        _ => 0,
    };

    Json(StatusSnapshot {
        running: doc.running,
        current_start: doc.current_start.map(|t| t.to_offset(state.tz_offset)),
        sessions: doc.sessions,
        base_elapsed_ms,
        running_elapsed_ms,
        server_now: now,
    })
    .into_response()
}

async fn get_reports(State(state): State<AppState>) -> Response {
    let doc = match load_snapshot(&state).await {
        Ok(doc) => doc,
        Err(err) => return storage_error(err),
    };

    let now = state.now();
    let totals = match WindowTotals::compute(
        &doc.sessions,
        doc.running,
        doc.current_start,
        now,
        state.tz_offset,
    ) {
        Ok(t) => t,
        Err(err) => {
            error!("report window out of range: {err:#}");
            return failure("time_range_error");
        }
    };

    let text = |ms: i64| BreakdownText::from(Breakdown::from_ms(ms));
    Json(Reports {
        today: text(totals.today_ms),
        week: text(totals.week_ms),
        month: text(totals.month_ms),
        year: text(totals.year_ms),
    })
    .into_response()
}
