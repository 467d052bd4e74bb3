//! Shared primitive IDs and the race/entry status lifecycle.

use serde::{Deserialize, Serialize};

/// Race identifier.
pub type RaceId = u64;
/// Team identifier.
pub type TeamId = u64;
/// Entry (one boat in one race) identifier.
pub type EntryId = u64;
/// Timing record identifier.
pub type RecordId = u64;
/// Race-scoped bow number.
pub type BowNumber = u32;
/// Instant in milliseconds since the Unix epoch.
pub type TimestampMs = i64;
/// Signed duration in milliseconds.
pub type DurationMs = i64;

/// Lifecycle of a race as owned by race administration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    /// Registered, bow numbers may still change.
    #[default]
    Scheduled,
    /// Crews are marshalling.
    Ready,
    /// Race clock is running.
    Started,
    /// Race clock has been stopped.
    Finished,
    /// Race was called off before starting.
    Cancelled,
    /// Race was halted after starting.
    Abandoned,
}

impl RaceStatus {
    /// Column value stored in `races.race_status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Ready => "ready",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
            Self::Abandoned => "abandoned",
        }
    }

    /// Parses the stored snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "scheduled" => Self::Scheduled,
            "ready" => Self::Ready,
            "started" => Self::Started,
            "finished" => Self::Finished,
            "cancelled" => Self::Cancelled,
            "abandoned" => Self::Abandoned,
            _ => return None,
        })
    }

    /// True once the race can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Abandoned)
    }
}

/// Race format. Only head races are timed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceKind {
    /// Individual time trial.
    TimeTrial,
    /// Staggered-start head race.
    HeadRace,
    /// Side-by-side sprint.
    Sprint,
}

impl RaceKind {
    /// Column value stored in `races.race_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeTrial => "time_trial",
            Self::HeadRace => "head_race",
            Self::Sprint => "sprint",
        }
    }

    /// Parses the stored snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "time_trial" => Self::TimeTrial,
            "head_race" => Self::HeadRace,
            "sprint" => Self::Sprint,
            _ => return None,
        })
    }
}

/// A boat's participation status in one race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Registered.
    #[default]
    Entered,
    /// At the start area.
    Ready,
    /// Started and racing.
    OnWater,
    /// Crossed the finish line.
    Finished,
    /// Did not start.
    Dns,
    /// Did not finish.
    Dnf,
    /// Disqualified.
    Dsq,
}

impl EntryStatus {
    /// Column value stored in `entries.boat_status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entered => "entered",
            Self::Ready => "ready",
            Self::OnWater => "on_water",
            Self::Finished => "finished",
            Self::Dns => "dns",
            Self::Dnf => "dnf",
            Self::Dsq => "dsq",
        }
    }

    /// Parses the stored snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "entered" => Self::Entered,
            "ready" => Self::Ready,
            "on_water" => Self::OnWater,
            "finished" => Self::Finished,
            "dns" => Self::Dns,
            "dnf" => Self::Dnf,
            "dsq" => Self::Dsq,
            _ => return None,
        })
    }

    /// True for DNS, DNF and DSQ, which never appear in ranked results.
    pub fn is_non_finish(&self) -> bool {
        matches!(self, Self::Dns | Self::Dnf | Self::Dsq)
    }
}

/// Status carried by a timing record; a subset of [`EntryStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Started, no end time yet.
    OnWater,
    /// End time recorded.
    Finished,
}

impl RecordStatus {
    /// Column value stored in `race_results.status`.
    pub fn as_str(&self) -> &'static str {
        EntryStatus::from(*self).as_str()
    }

    /// Parses the stored snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        match EntryStatus::parse(s)? {
            EntryStatus::OnWater => Some(Self::OnWater),
            EntryStatus::Finished => Some(Self::Finished),
            _ => None,
        }
    }
}

impl From<RecordStatus> for EntryStatus {
    fn from(value: RecordStatus) -> Self {
        match value {
            RecordStatus::OnWater => Self::OnWater,
            RecordStatus::Finished => Self::Finished,
        }
    }
}

/// Which line an operator action stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingKind {
    /// Boat crossed the start line.
    Start,
    /// Boat crossed the finish line.
    Finish,
}

impl TimingKind {
    /// Lowercase name, as logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Finish => "finish",
        }
    }
}
