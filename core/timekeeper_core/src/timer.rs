use time::{OffsetDateTime, UtcOffset};
use tracing::warn;

use crate::{
    accounting::start_of_day,
    model::{Session, TimerDocument},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(Session),
    AlreadyStopped,
    /// `running` was set without a start timestamp. The timer is forced to stopped and nothing is
    /// recorded.
    Recovered,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetOutcome {
    pub sessions_removed: usize,
    pub discarded_running: bool,
}

impl TimerDocument {
    pub fn start(&mut self, now: OffsetDateTime) -> StartOutcome {
        if self.running {
            return StartOutcome::AlreadyRunning;
        }
        self.running = true;
        self.current_start = Some(now);
        StartOutcome::Started
    }

    pub fn stop(&mut self, now: OffsetDateTime) -> StopOutcome {
        if !self.running {
            return StopOutcome::AlreadyStopped;
        }
        self.running = false;
        let Some(start) = self.current_start.take() else {
            return StopOutcome::Recovered;
        };

        let elapsed = (now - start).whole_milliseconds();
        if elapsed < 0 {
            warn!(%start, %now, "clock is behind the running start, recording a zero-length session");
        }
        // Both ends in the offset of `now`.
        let session = Session {
            start: start.to_offset(now.offset()),
            stop: Some(now),
            duration_ms: i64::try_from(elapsed.max(0)).unwrap_or(i64::MAX),
        };
        self.sessions.push(session.clone());
        StopOutcome::Stopped(session)
    }

    /// Drops sessions that started today (local midnight onward) and discards a running interval
    /// without recording it. Earlier days are kept.
    pub fn reset(&mut self, now: OffsetDateTime, offset: UtcOffset) -> ResetOutcome {
        let today_start = start_of_day(now, offset);
        let before = self.sessions.len();
        self.sessions.retain(|s| s.start < today_start);

        let discarded_running = self.running;
        self.running = false;
        self.current_start = None;

        ResetOutcome {
            sessions_removed: before - self.sessions.len(),
            discarded_running,
        }
    }
}
