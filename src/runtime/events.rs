//! Runtime update stream payloads.

use crate::{
    event::EventId,
    types::{BowNumber, EntryId, EntryStatus, TimestampMs, TimingKind},
};

/// Updates emitted from the single-writer timing loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimingUpdate {
    /// The race clock started (locally or on another station).
    ClockStarted {
        /// The race's `actual_start`.
        started_at: TimestampMs,
    },
    /// The race clock stopped.
    ClockStopped {
        /// Instant elapsed time froze at.
        stopped_at: TimestampMs,
    },
    /// An operator action was captured.
    EventRecorded {
        /// New event id.
        event_id: EventId,
        /// Start or finish.
        kind: TimingKind,
        /// True when no bow number was given.
        pending: bool,
    },
    /// A pending event was bound to a boat.
    EventAssigned {
        /// Event id.
        event_id: EventId,
        /// Bow number it was bound to.
        bow_number: BowNumber,
    },
    /// A timing record was saved but the entry's status row was not.
    ///
    /// The roster shows `status` and reconciliation keeps deriving it from the
    /// record, so only other readers of the entry row see the stale value.
    EntryStatusNotSaved {
        /// Entry whose status row is stale.
        entry_id: EntryId,
        /// Status that failed to save.
        status: EntryStatus,
        /// Store error text.
        reason: String,
    },
    /// An operator action did not take effect.
    ActionRejected {
        /// Operator-facing reason.
        reason: String,
        /// False when retrying may succeed.
        operator_error: bool,
    },
    /// A change-feed reconciliation pass finished.
    Reconciled {
        /// Events that appeared from the store.
        added: usize,
        /// Events dropped by the store.
        removed: usize,
        /// Local events kept as newer than the snapshot.
        retained: usize,
    },
    /// Ranked results differ from the previous projection.
    ResultsChanged,
    /// Presentation tick while the clock runs.
    Tick {
        /// Race clock as `HH:MM:SS.t`.
        elapsed: String,
    },
}
