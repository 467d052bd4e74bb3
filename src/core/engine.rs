use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    core::{
        clock::{ClockState, WallClock, format_elapsed},
        error::{TimingError, TimingResult},
        roster::Roster,
    },
    event::{Assignment, EventId, TimingEvent, sort_history},
    model::{Race, RaceResultRow, TimingRecord, TimingRecordDraft, TimingRecordPatch},
    persist::{StoreError, TimingStore},
    results::projector::{RankedResult, project},
    types::{
        BowNumber, DurationMs, EntryId, EntryStatus, RaceId, RaceKind, RaceStatus, RecordId,
        TimestampMs, TimingKind,
    },
};

/// Entry-status write that failed after its timing record was saved.
///
/// The record stays authoritative; reconciliation derives the racing status
/// from it until the entry row catches up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsavedStatus {
    /// Entry whose status row is stale.
    pub entry_id: EntryId,
    /// Status the engine tried to write.
    pub status: EntryStatus,
    /// Store error text.
    pub reason: String,
}

/// Live timing state for one head race.
///
/// Every mutating call validates against local state and freshly fetched
/// records before issuing its store write. Local state changes only after the
/// write succeeds.
pub struct TimingEngine<S> {
    pub(crate) race: Race,
    pub(crate) store: S,
    pub(crate) wall: Arc<dyn WallClock>,
    pub(crate) clock: ClockState,
    pub(crate) roster: Roster,
    pub(crate) events: Vec<TimingEvent>,
    pub(crate) next_event_id: EventId,
    pub(crate) generation: u64,
    pub(crate) unsaved: Vec<UnsavedStatus>,
}

impl<S: TimingStore> TimingEngine<S> {
    /// Loads `race_id` and rebuilds clock, roster, and history from the store.
    pub fn load(race_id: RaceId, store: S, wall: Arc<dyn WallClock>) -> TimingResult<Self> {
        let race = store
            .get_race(race_id)?
            .ok_or(TimingError::RaceNotFound(race_id))?;
        if race.kind != RaceKind::HeadRace {
            return Err(TimingError::NotHeadRace(race_id));
        }

        let mut engine = Self {
            race,
            store,
            wall,
            clock: ClockState::NotStarted,
            roster: Roster::default(),
            events: Vec::new(),
            next_event_id: 1,
            generation: 0,
            unsaved: Vec::new(),
        };
        let snapshot = engine.fetch_snapshot()?;
        let report = engine.apply_external_change(snapshot);
        info!(
            race_id,
            clock = engine.clock.as_str(),
            events = report.events,
            boats = engine.roster.len(),
            "timing engine loaded"
        );
        Ok(engine)
    }

    /// Starts the race clock at the current wall time.
    ///
    /// If another station already started the race, its start is adopted and
    /// the call fails with [`TimingError::InvalidClockTransition`].
    pub fn start_clock(&mut self) -> TimingResult<TimestampMs> {
        if self.clock != ClockState::NotStarted {
            return Err(TimingError::InvalidClockTransition {
                state: self.clock,
                action: "start the clock",
            });
        }

        let stored = self
            .store
            .get_race(self.race.id)?
            .ok_or(TimingError::RaceNotFound(self.race.id))?;
        if let Some(started_at) = stored.actual_start {
            info!(race_id = self.race.id, started_at, "race already started elsewhere");
            self.reconcile()?;
            return Err(TimingError::InvalidClockTransition {
                state: self.clock,
                action: "start the clock",
            });
        }

        let now = self.wall.now_ms();
        self.store
            .set_race_actual_start(self.race.id, now)
            .inspect_err(|err| warn!(race_id = self.race.id, %err, "failed to persist race start"))?;

        self.race.actual_start = Some(now);
        self.race.status = RaceStatus::Started;
        self.clock = ClockState::Running { started_at: now };
        self.generation += 1;
        info!(race_id = self.race.id, started_at = now, "race clock started");
        Ok(now)
    }

    /// Stops the race clock, freezing elapsed time and further marking.
    pub fn stop_clock(&mut self) -> TimingResult<TimestampMs> {
        let ClockState::Running { started_at } = self.clock else {
            return Err(TimingError::InvalidClockTransition {
                state: self.clock,
                action: "stop the clock",
            });
        };

        let now = self.wall.now_ms().max(started_at);
        self.store
            .set_race_status(self.race.id, RaceStatus::Finished)
            .inspect_err(|err| warn!(race_id = self.race.id, %err, "failed to persist race finish"))?;

        self.race.status = RaceStatus::Finished;
        self.clock = ClockState::Stopped {
            started_at,
            stopped_at: now,
        };
        self.generation += 1;
        info!(
            race_id = self.race.id,
            elapsed = %format_elapsed(now - started_at),
            "race clock stopped"
        );
        Ok(now)
    }

    /// Records an operator action captured at `captured_at`.
    ///
    /// Without a bow number the event is kept pending and nothing is written.
    pub fn mark_time(
        &mut self,
        kind: TimingKind,
        captured_at: TimestampMs,
        bow: Option<BowNumber>,
    ) -> TimingResult<EventId> {
        self.require_running("mark a time")?;

        let Some(bow) = bow else {
            let id = self.take_event_id();
            self.insert_event(TimingEvent::Pending {
                id,
                kind,
                captured_at,
            });
            debug!(race_id = self.race.id, event_id = id, kind = kind.as_str(), captured_at, "pending event captured");
            return Ok(id);
        };

        let assignment = self.bind(kind, captured_at, bow)?;
        let id = self.take_event_id();
        self.insert_event(TimingEvent::Assigned {
            id,
            kind,
            captured_at,
            assignment,
        });
        Ok(id)
    }

    /// [`Self::mark_time`] stamped with the engine's wall clock.
    pub fn mark_now(&mut self, kind: TimingKind, bow: Option<BowNumber>) -> TimingResult<EventId> {
        let now = self.wall.now_ms();
        self.mark_time(kind, now, bow)
    }

    /// Binds a pending event to `bow`, using the event's original capture time.
    pub fn assign_bow_number(&mut self, event_id: EventId, bow: BowNumber) -> TimingResult<()> {
        self.require_running("assign a bow number")?;

        let (kind, captured_at) = match self.event(event_id) {
            None => return Err(TimingError::UnknownEvent(event_id)),
            Some(TimingEvent::Assigned { .. }) => return Err(TimingError::AlreadyAssigned(event_id)),
            Some(TimingEvent::Pending {
                kind, captured_at, ..
            }) => (*kind, *captured_at),
        };

        let assignment = self.bind(kind, captured_at, bow)?;
        if let Some(slot) = self.events.iter_mut().find(|e| e.id() == event_id) {
            *slot = TimingEvent::Assigned {
                id: event_id,
                kind,
                captured_at,
                assignment,
            };
        }
        Ok(())
    }

    /// Ranked finishers from the store's current records.
    pub fn results(&self) -> TimingResult<Vec<RankedResult>> {
        Ok(project(&self.result_rows()?))
    }

    /// Records for this race joined with entry display data.
    pub fn result_rows(&self) -> TimingResult<Vec<RaceResultRow>> {
        Ok(self.store.list_records_for_race(self.race.id)?)
    }

    /// Resolves `bow`, validates against fresh records, and writes the record.
    fn bind(&mut self, kind: TimingKind, captured_at: TimestampMs, bow: BowNumber) -> TimingResult<Assignment> {
        let boat = self
            .roster
            .resolve(bow)
            .ok_or(TimingError::UnknownBowNumber(bow))?;
        let entry_id = boat.entry.id;
        let team_name = boat.display_name();

        let records = self.store.list_records_for_entry(entry_id)?;
        let (record_id, finished) = match kind {
            TimingKind::Start => (self.apply_start(entry_id, bow, captured_at, &records)?, false),
            TimingKind::Finish => (self.apply_finish(entry_id, bow, captured_at, &records)?, true),
        };

        self.generation += 1;
        debug!(
            race_id = self.race.id,
            bow,
            record_id,
            kind = kind.as_str(),
            captured_at,
            "timing event assigned"
        );
        Ok(Assignment {
            entry_id,
            bow_number: bow,
            team_name,
            record_id,
            finished,
            generation: self.generation,
        })
    }

    fn apply_start(
        &mut self,
        entry_id: EntryId,
        bow: BowNumber,
        captured_at: TimestampMs,
        records: &[TimingRecord],
    ) -> TimingResult<RecordId> {
        if records.iter().any(|r| r.start_time.is_some()) {
            return Err(TimingError::AlreadyStarted(bow));
        }

        let record = self
            .store
            .create_timing_record(&TimingRecordDraft::started(entry_id, captured_at))
            .inspect_err(|err| warn!(bow, %err, "failed to create timing record"))?;
        self.set_entry_status(entry_id, EntryStatus::OnWater);
        Ok(record.id)
    }

    fn apply_finish(
        &mut self,
        entry_id: EntryId,
        bow: BowNumber,
        captured_at: TimestampMs,
        records: &[TimingRecord],
    ) -> TimingResult<RecordId> {
        let active: Vec<&TimingRecord> = records.iter().filter(|r| r.is_on_water()).collect();
        let record = match active.as_slice() {
            [] if records.iter().any(|r| r.end_time.is_some()) => {
                return Err(TimingError::AlreadyFinished(bow));
            }
            [] => return Err(TimingError::NotYetStarted(bow)),
            [one] => *one,
            _ => {
                return Err(StoreError::Conflict(format!(
                    "bow number {bow} has {} on-water records",
                    active.len()
                ))
                .into());
            }
        };

        if record.end_time.is_some() {
            return Err(TimingError::AlreadyFinished(bow));
        }
        if let Some(start) = record.start_time {
            if captured_at < start {
                return Err(TimingError::FinishBeforeStart {
                    bow,
                    start,
                    finish: captured_at,
                });
            }
        }

        let record_id = record.id;
        self.store
            .update_timing_record(record_id, &TimingRecordPatch::finished(captured_at))
            .inspect_err(|err| warn!(bow, record_id, %err, "failed to close timing record"))?;
        self.set_entry_status(entry_id, EntryStatus::Finished);

        for event in &mut self.events {
            if let TimingEvent::Assigned { assignment, .. } = event {
                if assignment.record_id == record_id {
                    assignment.finished = true;
                }
            }
        }
        Ok(record_id)
    }

    /// Secondary write; the timing record is authoritative, so a failure here
    /// is queued for [`Self::take_unsaved_statuses`] and the local roster is
    /// updated regardless.
    fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) {
        if let Err(err) = self.store.set_entry_status(entry_id, status) {
            warn!(entry_id, status = status.as_str(), %err, "failed to update entry status");
            self.unsaved.push(UnsavedStatus {
                entry_id,
                status,
                reason: err.to_string(),
            });
        }
        self.roster.set_status(entry_id, status);
    }
}

impl<S> TimingEngine<S> {
    /// Id of the race this engine times.
    pub fn race_id(&self) -> RaceId {
        self.race.id
    }

    /// Race row as of the last local write or reconciliation.
    pub fn race(&self) -> &Race {
        &self.race
    }

    /// Current race clock state.
    pub fn clock(&self) -> ClockState {
        self.clock
    }

    /// Boats in this race.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// History ordered by capture time, most recent first.
    pub fn events(&self) -> &[TimingEvent] {
        &self.events
    }

    /// Looks up an event by id.
    pub fn event(&self, id: EventId) -> Option<&TimingEvent> {
        self.events.iter().find(|e| e.id() == id)
    }

    /// Events still waiting for a bow number.
    pub fn pending_events(&self) -> impl Iterator<Item = &TimingEvent> {
        self.events.iter().filter(|e| e.is_pending())
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the backing store.
    ///
    /// Writes made through it are only seen locally after [`Self::reconcile`].
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Local mutation counter; bumps on every successful write.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reads the injected wall clock.
    pub fn now_ms(&self) -> TimestampMs {
        self.wall.now_ms()
    }

    /// Race clock elapsed time; frozen once stopped, 0 before the start.
    pub fn elapsed_ms(&self) -> DurationMs {
        self.clock.elapsed_ms(self.wall.now_ms())
    }

    /// Race clock as `HH:MM:SS.t`.
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_ms())
    }

    fn require_running(&self, action: &'static str) -> TimingResult<()> {
        if self.clock.is_running() {
            Ok(())
        } else {
            Err(TimingError::InvalidClockTransition {
                state: self.clock,
                action,
            })
        }
    }

    /// Drains entry-status writes that failed since the last call.
    pub fn take_unsaved_statuses(&mut self) -> Vec<UnsavedStatus> {
        std::mem::take(&mut self.unsaved)
    }

    pub(crate) fn take_event_id(&mut self) -> EventId {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    fn insert_event(&mut self, event: TimingEvent) {
        self.events.push(event);
        sort_history(&mut self.events);
    }
}
