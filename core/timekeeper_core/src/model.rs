use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// A closed recording interval. Created only when a running timer is stopped.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Session {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    /// Always present for sessions written by this service; older documents may lack it.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub stop: Option<OffsetDateTime>,
    #[serde(default)]
    pub duration_ms: i64,
}

/// The whole persisted state. One document per storage file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TimerDocument {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub running: bool,
    /// Present iff `running`, unless the file was edited by hand.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub current_start: Option<OffsetDateTime>,
    /// Reserved. Carried through load/save untouched.
    #[serde(default)]
    pub last_reset_date: Value,
}
