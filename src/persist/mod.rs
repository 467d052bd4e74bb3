pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    model::{Race, RaceResultRow, RosterEntry, TimingRecord, TimingRecordDraft, TimingRecordPatch},
    types::{EntryId, EntryStatus, RaceId, RaceStatus, RecordId, TimestampMs},
};

/// Store adapter failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or offline.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The backend did not answer in time.
    #[error("store operation timed out")]
    Timeout,
    /// Referenced row does not exist.
    #[error("{what} {id} not found")]
    NotFound {
        /// Kind of row, e.g. `"race"`.
        what: &'static str,
        /// Id that was looked up.
        id: u64,
    },
    /// Write would break a uniqueness or lifecycle rule.
    #[error("conflict: {0}")]
    Conflict(String),
    /// SQLite driver error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Stored value could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-side settings shared by the bundled implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a write waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Capacity of the change-notice channel created by [`StoreConfig::feed`].
    pub feed_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 2_000,
            feed_capacity: 256,
        }
    }
}

impl StoreConfig {
    /// New change feed sized by `feed_capacity`.
    pub fn feed(&self) -> crate::feed::ChangeFeed {
        crate::feed::ChangeFeed::new(self.feed_capacity)
    }
}

/// Timing record access consumed by the engine.
pub trait ResultStore: Send {
    /// Inserts a record and returns it with its assigned id.
    fn create_timing_record(&mut self, draft: &TimingRecordDraft) -> StoreResult<TimingRecord>;
    /// Applies `patch` to record `id`.
    fn update_timing_record(&mut self, id: RecordId, patch: &TimingRecordPatch) -> StoreResult<()>;
    /// Records for one entry, any status.
    fn list_records_for_entry(&self, entry_id: EntryId) -> StoreResult<Vec<TimingRecord>>;
    /// Records for a race joined with entry display data.
    fn list_records_for_race(&self, race_id: RaceId) -> StoreResult<Vec<RaceResultRow>>;
}

/// Race and entry access consumed by the engine.
pub trait RaceStore: Send {
    /// Race row, or `None` when missing.
    fn get_race(&self, race_id: RaceId) -> StoreResult<Option<Race>>;
    /// Sets `actual_start` and moves the race to STARTED.
    fn set_race_actual_start(&mut self, race_id: RaceId, at: TimestampMs) -> StoreResult<()>;
    /// Moves the race to `status`.
    fn set_race_status(&mut self, race_id: RaceId, status: RaceStatus) -> StoreResult<()>;
    /// Updates one entry's lifecycle status.
    fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) -> StoreResult<()>;
    /// Entries with team names, ordered by entry id.
    fn list_entries_for_race(&self, race_id: RaceId) -> StoreResult<Vec<RosterEntry>>;
}

/// Everything a timing engine needs from its backing store.
pub trait TimingStore: ResultStore + RaceStore {}

impl<T: ResultStore + RaceStore> TimingStore for T {}
