use thiserror::Error;

use crate::{
    core::clock::ClockState,
    event::EventId,
    persist::StoreError,
    types::{BowNumber, RaceId, TimestampMs},
};

/// Reason an operator action did not take effect.
#[derive(Debug, Error)]
pub enum TimingError {
    /// No boat in the roster carries this bow number.
    #[error("bow number {0} is not in this race")]
    UnknownBowNumber(BowNumber),

    /// The boat already has a start time.
    #[error("bow number {0} has already started")]
    AlreadyStarted(BowNumber),

    /// The boat already has a finish time.
    #[error("bow number {0} has already finished")]
    AlreadyFinished(BowNumber),

    /// A finish was marked for a boat that never started.
    #[error("bow number {0} has not started yet")]
    NotYetStarted(BowNumber),

    /// Finish capture time earlier than the boat's start.
    #[error("finish at {finish} precedes bow number {bow}'s start at {start}")]
    FinishBeforeStart {
        /// Boat being finished.
        bow: BowNumber,
        /// Recorded start.
        start: TimestampMs,
        /// Rejected finish.
        finish: TimestampMs,
    },

    /// The action is not allowed in the current clock state.
    #[error("cannot {action} while the clock is {}", state.as_str())]
    InvalidClockTransition {
        /// Clock state at the time of the call.
        state: ClockState,
        /// What the operator tried to do.
        action: &'static str,
    },

    /// No event with this id in the history.
    #[error("timing event {0} does not exist")]
    UnknownEvent(EventId),

    /// The event is already bound to a boat.
    #[error("timing event {0} is already assigned")]
    AlreadyAssigned(EventId),

    /// The store has no race with this id.
    #[error("race {0} not found")]
    RaceNotFound(RaceId),

    /// The race uses side-by-side timing.
    #[error("race {0} is not a head race")]
    NotHeadRace(RaceId),

    /// Store read or write failed; retrying may succeed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl TimingError {
    /// True for input/precondition errors; false for store failures worth retrying.
    pub fn is_operator_error(&self) -> bool {
        !matches!(self, Self::StoreUnavailable(_))
    }
}

/// Result alias for engine operations.
pub type TimingResult<T> = Result<T, TimingError>;
