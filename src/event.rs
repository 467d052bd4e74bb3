//! Operator timing events with late identity binding.

use serde::{Deserialize, Serialize};

use crate::types::{BowNumber, EntryId, RecordId, TimestampMs, TimingKind};

/// Engine-local event identifier, monotonic per engine.
pub type EventId = u64;

/// Display status of a [`TimingEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Time captured, boat not yet identified.
    Pending,
    /// Bound to a record that is still on the water.
    Assigned,
    /// Bound to a record that has an end time.
    Finished,
}

/// Identity a pending event acquires once a bow number resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Resolved entry.
    pub entry_id: EntryId,
    /// Bow number the operator supplied.
    pub bow_number: BowNumber,
    /// Team display name.
    pub team_name: String,
    /// Backing timing record.
    pub record_id: RecordId,
    /// True once the backing record has an end time.
    pub finished: bool,
    /// Local mutation generation that produced this binding.
    pub generation: u64,
}

/// One operator action on the timing console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingEvent {
    /// Captured without a bow number.
    Pending {
        /// Event identifier.
        id: EventId,
        /// Start or finish.
        kind: TimingKind,
        /// Operator-action instant.
        captured_at: TimestampMs,
    },
    /// Bound to an entry and a backing record.
    Assigned {
        /// Event identifier.
        id: EventId,
        /// Start or finish.
        kind: TimingKind,
        /// Operator-action instant.
        captured_at: TimestampMs,
        /// Resolved identity.
        assignment: Assignment,
    },
}

impl TimingEvent {
    /// Local event id.
    pub fn id(&self) -> EventId {
        match self {
            Self::Pending { id, .. } | Self::Assigned { id, .. } => *id,
        }
    }

    /// Start or finish.
    pub fn kind(&self) -> TimingKind {
        match self {
            Self::Pending { kind, .. } | Self::Assigned { kind, .. } => *kind,
        }
    }

    /// Instant the operator pressed the button.
    pub fn captured_at(&self) -> TimestampMs {
        match self {
            Self::Pending { captured_at, .. } | Self::Assigned { captured_at, .. } => *captured_at,
        }
    }

    /// Boat binding, if any.
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            Self::Pending { .. } => None,
            Self::Assigned { assignment, .. } => Some(assignment),
        }
    }

    /// True until a bow number is assigned.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Display status.
    pub fn status(&self) -> EventStatus {
        match self {
            Self::Pending { .. } => EventStatus::Pending,
            Self::Assigned { assignment, .. } if assignment.finished => EventStatus::Finished,
            Self::Assigned { .. } => EventStatus::Assigned,
        }
    }

    /// Record identity used to merge rebuilt history with local history.
    pub(crate) fn record_key(&self) -> Option<(RecordId, TimingKind)> {
        self.assignment().map(|a| (a.record_id, self.kind()))
    }
}

/// Sorts history most-recent-first by capture time, ties by id.
pub(crate) fn sort_history(events: &mut [TimingEvent]) {
    events.sort_by(|a, b| {
        b.captured_at()
            .cmp(&a.captured_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
}
