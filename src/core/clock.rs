use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::{DurationMs, TimestampMs};

/// Source of authoritative wall time.
pub trait WallClock: Send + Sync {
    /// Current time in Unix milliseconds.
    fn now_ms(&self) -> TimestampMs;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as TimestampMs)
            .unwrap_or(0)
    }
}

/// Hand-driven clock for replays and tests. Clones share one instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Clock frozen at `start` until moved.
    pub fn new(start: TimestampMs) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jumps to `at`, forwards or backwards.
    pub fn set(&self, at: TimestampMs) {
        self.now.store(at, Ordering::SeqCst);
    }

    /// Moves forward by `by` and returns the new instant.
    pub fn advance(&self, by: DurationMs) -> TimestampMs {
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now.load(Ordering::SeqCst)
    }
}

/// Race clock lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ClockState {
    /// No `actual_start` yet.
    #[default]
    NotStarted,
    /// Clock is running from `started_at`.
    Running {
        /// The race's `actual_start`.
        started_at: TimestampMs,
    },
    /// Clock stopped; elapsed is frozen at `stopped_at`.
    Stopped {
        /// The race's `actual_start`.
        started_at: TimestampMs,
        /// Instant the clock was stopped.
        stopped_at: TimestampMs,
    },
}

impl ClockState {
    /// Stable lowercase name, as logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running { .. } => "running",
            Self::Stopped { .. } => "stopped",
        }
    }

    /// True between start and stop.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Start instant once the clock has started.
    pub fn actual_start(&self) -> Option<TimestampMs> {
        match self {
            Self::NotStarted => None,
            Self::Running { started_at } | Self::Stopped { started_at, .. } => Some(*started_at),
        }
    }

    /// Milliseconds on the race clock as of `now`.
    pub fn elapsed_ms(&self, now: TimestampMs) -> DurationMs {
        match self {
            Self::NotStarted => 0,
            Self::Running { started_at } => (now - started_at).max(0),
            Self::Stopped {
                started_at,
                stopped_at,
            } => (stopped_at - started_at).max(0),
        }
    }
}

/// Renders a race-clock reading as `HH:MM:SS.t`.
pub fn format_elapsed(ms: DurationMs) -> String {
    let ms = ms.max(0);
    let total_secs = ms / 1000;
    let tenths = (ms % 1000) / 100;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{tenths}")
}
