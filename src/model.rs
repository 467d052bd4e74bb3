//! Race, entry, and timing record types shared with the store layer.

use serde::{Deserialize, Serialize};

use crate::types::{
    BowNumber, DurationMs, EntryId, EntryStatus, RaceId, RaceKind, RaceStatus, RecordId,
    RecordStatus, TeamId, TimestampMs,
};

/// A race as seen by the timing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Race {
    /// Stable race identifier.
    pub id: RaceId,
    /// Display name.
    pub name: String,
    /// Race format.
    pub kind: RaceKind,
    /// Administrative status.
    pub status: RaceStatus,
    /// Planned start, if published.
    pub scheduled_start: Option<TimestampMs>,
    /// Instant the race clock was started. Immutable once set.
    pub actual_start: Option<TimestampMs>,
}

/// A team that owns entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Stable team identifier.
    pub id: TeamId,
    /// Display name.
    pub name: String,
    /// Optional abbreviation.
    pub short_name: Option<String>,
}

/// One boat's participation in one race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable entry identifier.
    pub id: EntryId,
    /// Race this entry belongs to.
    pub race_id: RaceId,
    /// Owning team.
    pub team_id: TeamId,
    /// Race-scoped bow number, if assigned.
    pub bow_number: Option<BowNumber>,
    /// Participation status.
    pub status: EntryStatus,
}

/// Entry joined with its team's display name, as listed for a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// The entry row.
    pub entry: Entry,
    /// Owning team's display name.
    pub team_name: String,
}

/// Persisted start/end pair for one entry's attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Stable record identifier.
    pub id: RecordId,
    /// Entry this record times.
    pub entry_id: EntryId,
    /// Start-line crossing.
    pub start_time: Option<TimestampMs>,
    /// Finish-line crossing.
    pub end_time: Option<TimestampMs>,
    /// Passthrough adjustment in milliseconds.
    pub adjustment_ms: Option<DurationMs>,
    /// Racing status.
    pub status: Option<RecordStatus>,
}

impl TimingRecord {
    /// True while the boat is racing on this record.
    pub fn is_on_water(&self) -> bool {
        self.status == Some(RecordStatus::OnWater)
    }

    /// `end - start` when both are set.
    pub fn elapsed_ms(&self) -> Option<DurationMs> {
        Some(self.end_time? - self.start_time?)
    }
}

/// Insert payload used to create a [`TimingRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimingRecordDraft {
    /// Entry to time.
    pub entry_id: EntryId,
    /// Start-line crossing.
    pub start_time: Option<TimestampMs>,
    /// Finish-line crossing.
    pub end_time: Option<TimestampMs>,
    /// Passthrough adjustment in milliseconds.
    pub adjustment_ms: Option<DurationMs>,
    /// Initial status.
    pub status: Option<RecordStatus>,
}

impl TimingRecordDraft {
    /// Draft for a boat that just crossed the start line.
    pub fn started(entry_id: EntryId, start_time: TimestampMs) -> Self {
        Self {
            entry_id,
            start_time: Some(start_time),
            status: Some(RecordStatus::OnWater),
            ..Self::default()
        }
    }

    /// Materializes the draft under `id`.
    pub fn into_record(self, id: RecordId) -> TimingRecord {
        TimingRecord {
            id,
            entry_id: self.entry_id,
            start_time: self.start_time,
            end_time: self.end_time,
            adjustment_ms: self.adjustment_ms,
            status: self.status,
        }
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimingRecordPatch {
    /// Optional replacement start time.
    pub start_time: Option<TimestampMs>,
    /// Optional replacement end time.
    pub end_time: Option<TimestampMs>,
    /// Optional replacement adjustment.
    pub adjustment_ms: Option<DurationMs>,
    /// Optional replacement status.
    pub status: Option<RecordStatus>,
}

impl TimingRecordPatch {
    /// Patch that closes an on-water record.
    pub fn finished(end_time: TimestampMs) -> Self {
        Self {
            end_time: Some(end_time),
            status: Some(RecordStatus::Finished),
            ..Self::default()
        }
    }

    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut TimingRecord) {
        if let Some(v) = self.start_time {
            rec.start_time = Some(v);
        }
        if let Some(v) = self.end_time {
            rec.end_time = Some(v);
        }
        if let Some(v) = self.adjustment_ms {
            rec.adjustment_ms = Some(v);
        }
        if let Some(v) = self.status {
            rec.status = Some(v);
        }
    }
}

/// Timing record joined with entry and team display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceResultRow {
    /// The record.
    pub record: TimingRecord,
    /// Bow number of the owning entry.
    pub bow_number: Option<BowNumber>,
    /// Team display name.
    pub team_name: String,
    /// Current entry status.
    pub entry_status: EntryStatus,
}
