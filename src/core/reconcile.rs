//! Rebuilds engine state from the authoritative store.
//!
//! Reconciliation merges rather than replaces: events keep their ids when the
//! store still holds their record, pending events always survive, and events
//! written locally after the snapshot was fetched survive until a newer
//! snapshot confirms or drops them.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    core::{
        clock::ClockState,
        engine::TimingEngine,
        error::{TimingError, TimingResult},
        roster::Roster,
    },
    event::{Assignment, EventId, TimingEvent, sort_history},
    model::{Race, RaceResultRow, RosterEntry},
    persist::TimingStore,
    types::{EntryStatus, RaceStatus, RecordId, TimestampMs, TimingKind},
};

/// Authoritative race state as fetched from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSnapshot {
    /// Race row.
    pub race: Race,
    /// Roster rows.
    pub entries: Vec<RosterEntry>,
    /// Timing records joined with entry display data.
    pub records: Vec<RaceResultRow>,
    /// Engine generation when the fetch began.
    pub generation: u64,
    /// Wall time of the fetch.
    pub fetched_at: TimestampMs,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Clock state before the pass.
    pub clock_before: ClockState,
    /// Clock state after the pass.
    pub clock_after: ClockState,
    /// Events that appeared from the store.
    pub added: usize,
    /// Assigned events dropped because the store no longer holds them.
    pub removed: usize,
    /// Local events kept because they are newer than the snapshot.
    pub retained: usize,
    /// Pending events carried over.
    pub pending: usize,
    /// History length after the pass.
    pub events: usize,
}

impl ReconcileReport {
    /// True when the pass moved the clock.
    pub fn clock_changed(&self) -> bool {
        self.clock_before != self.clock_after
    }

    /// True when events appeared or disappeared.
    pub fn history_changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

impl<S: TimingStore> TimingEngine<S> {
    /// Reads race, roster, and records for this race.
    pub fn fetch_snapshot(&self) -> TimingResult<ExternalSnapshot> {
        let race_id = self.race.id;
        let race = self
            .store
            .get_race(race_id)?
            .ok_or(TimingError::RaceNotFound(race_id))?;
        let entries = self.store.list_entries_for_race(race_id)?;
        let records = self.store.list_records_for_race(race_id)?;
        Ok(ExternalSnapshot {
            race,
            entries,
            records,
            generation: self.generation,
            fetched_at: self.wall.now_ms(),
        })
    }

    /// Re-fetches and applies the authoritative state.
    pub fn reconcile(&mut self) -> TimingResult<ReconcileReport> {
        let snapshot = self.fetch_snapshot()?;
        Ok(self.apply_external_change(snapshot))
    }
}

impl<S> TimingEngine<S> {
    /// Merges `snapshot` into local state.
    pub fn apply_external_change(&mut self, snapshot: ExternalSnapshot) -> ReconcileReport {
        let mut report = ReconcileReport {
            clock_before: self.clock,
            ..ReconcileReport::default()
        };

        self.clock = advance_clock(self.clock, &snapshot);
        report.clock_after = self.clock;
        self.race = merged_race(snapshot.race.clone(), self.clock);
        self.roster = Roster::from_entries(snapshot.entries);
        // Record status wins over a stale entry row, except for DNS/DNF/DSQ.
        for row in &snapshot.records {
            let Some(status) = row.record.status.map(EntryStatus::from) else {
                continue;
            };
            let entry_id = row.record.entry_id;
            if self
                .roster
                .get(entry_id)
                .is_some_and(|b| !b.entry.status.is_non_finish())
            {
                self.roster.set_status(entry_id, status);
            }
        }

        let existing: HashMap<(RecordId, TimingKind), EventId> = self
            .events
            .iter()
            .filter_map(|e| e.record_key().map(|key| (key, e.id())))
            .collect();

        let mut rebuilt = Vec::with_capacity(snapshot.records.len() * 2);
        for row in &snapshot.records {
            for (kind, captured_at) in reconstructed_events(row) {
                let Some(bow_number) = row.bow_number else {
                    debug!(record_id = row.record.id, "skipping record without bow number");
                    continue;
                };
                let key = (row.record.id, kind);
                let id = match existing.get(&key) {
                    Some(id) => *id,
                    None => {
                        report.added += 1;
                        self.take_event_id()
                    }
                };
                let team_name = self
                    .roster
                    .get(row.record.entry_id)
                    .map(|b| b.display_name())
                    .unwrap_or_else(|| row.team_name.clone());
                rebuilt.push(TimingEvent::Assigned {
                    id,
                    kind,
                    captured_at,
                    assignment: Assignment {
                        entry_id: row.record.entry_id,
                        bow_number,
                        team_name,
                        record_id: row.record.id,
                        finished: row.record.end_time.is_some(),
                        generation: 0,
                    },
                });
            }
        }

        let confirmed: HashSet<(RecordId, TimingKind)> =
            rebuilt.iter().filter_map(TimingEvent::record_key).collect();

        let mut retained_finishes: Vec<RecordId> = Vec::new();
        for event in std::mem::take(&mut self.events) {
            match &event {
                TimingEvent::Pending { .. } => {
                    report.pending += 1;
                    rebuilt.push(event);
                }
                TimingEvent::Assigned { kind, assignment, .. } => {
                    let key = (assignment.record_id, *kind);
                    if confirmed.contains(&key) {
                        continue;
                    }
                    if assignment.generation > snapshot.generation {
                        let status = match kind {
                            TimingKind::Start if !assignment.finished => EntryStatus::OnWater,
                            _ => EntryStatus::Finished,
                        };
                        if *kind == TimingKind::Finish {
                            retained_finishes.push(assignment.record_id);
                        }
                        self.roster.set_status(assignment.entry_id, status);
                        report.retained += 1;
                        rebuilt.push(event);
                    } else {
                        report.removed += 1;
                    }
                }
            }
        }

        for event in &mut rebuilt {
            if let TimingEvent::Assigned { assignment, .. } = event {
                if retained_finishes.contains(&assignment.record_id) {
                    assignment.finished = true;
                }
            }
        }

        sort_history(&mut rebuilt);
        self.events = rebuilt;
        report.events = self.events.len();

        debug!(
            race_id = self.race.id,
            added = report.added,
            removed = report.removed,
            retained = report.retained,
            pending = report.pending,
            clock = self.clock.as_str(),
            "reconciled with store"
        );
        report
    }
}

/// Start and finish events implied by one stored record.
fn reconstructed_events(row: &RaceResultRow) -> Vec<(TimingKind, TimestampMs)> {
    let Some(start) = row.record.start_time else {
        return Vec::new();
    };
    let mut out = vec![(TimingKind::Start, start)];
    if let Some(end) = row.record.end_time {
        out.push((TimingKind::Finish, end));
    }
    out
}

/// Moves the local clock forward to what the store reports; never backwards.
fn advance_clock(local: ClockState, snapshot: &ExternalSnapshot) -> ClockState {
    let Some(started_at) = snapshot.race.actual_start else {
        return local;
    };

    let stored = if snapshot.race.status.is_terminal() {
        let stopped_at = match local {
            ClockState::Stopped { stopped_at, .. } => stopped_at,
            ClockState::Running { .. } => snapshot.fetched_at,
            ClockState::NotStarted => snapshot
                .records
                .iter()
                .filter_map(|r| r.record.end_time.or(r.record.start_time))
                .max()
                .unwrap_or(started_at),
        };
        ClockState::Stopped {
            started_at,
            stopped_at: stopped_at.max(started_at),
        }
    } else {
        ClockState::Running { started_at }
    };

    match (local, stored) {
        (ClockState::Stopped { .. }, _) => local,
        (_, ClockState::Stopped { .. }) => stored,
        (ClockState::NotStarted, _) | (ClockState::Running { .. }, ClockState::Running { .. }) => stored,
        _ => local,
    }
}

/// Keeps race fields consistent with a local clock that is ahead of the store.
fn merged_race(mut race: Race, clock: ClockState) -> Race {
    match clock {
        ClockState::NotStarted => {}
        ClockState::Running { started_at } => {
            race.actual_start = Some(started_at);
            if !matches!(race.status, RaceStatus::Started) && !race.status.is_terminal() {
                race.status = RaceStatus::Started;
            }
        }
        ClockState::Stopped { started_at, .. } => {
            race.actual_start = Some(started_at);
            if !race.status.is_terminal() {
                race.status = RaceStatus::Finished;
            }
        }
    }
    race
}
