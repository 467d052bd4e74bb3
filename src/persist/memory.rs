//! Shared in-memory store.
//!
//! Clones share one backing state, so several engines built on clones of the
//! same [`MemoryStore`] behave like operator stations on one database.

use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;

use crate::{
    feed::{ChangeFeed, Table},
    model::{
        Entry, Race, RaceResultRow, RosterEntry, Team, TimingRecord, TimingRecordDraft,
        TimingRecordPatch,
    },
    types::{
        BowNumber, EntryId, EntryStatus, RaceId, RaceKind, RaceStatus, RecordId, TeamId,
        TimestampMs,
    },
};

use super::{RaceStore, ResultStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    races: HashMap<RaceId, Race>,
    teams: HashMap<TeamId, Team>,
    entries: HashMap<EntryId, Entry>,
    records: Vec<TimingRecord>,
    next_id: u64,
    offline: bool,
    writes: usize,
}

impl Inner {
    fn take_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn team_name(&self, team_id: TeamId) -> String {
        self.teams
            .get(&team_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| "Unknown Team".to_string())
    }

    fn bow_taken(&self, race_id: RaceId, bow: BowNumber, except: Option<EntryId>) -> bool {
        self.entries.values().any(|e| {
            e.race_id == race_id && e.bow_number == Some(bow) && Some(e.id) != except
        })
    }
}

/// In-memory [`ResultStore`] + [`RaceStore`] with change notices.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    feed: Option<ChangeFeed>,
}

impl MemoryStore {
    /// Empty store with no feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a [`crate::feed::ChangeNotice`] after every successful write.
    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Feed attached with [`Self::with_feed`].
    pub fn feed(&self) -> Option<&ChangeFeed> {
        self.feed.as_ref()
    }

    /// Simulates an outage: every read and write fails until cleared.
    pub fn set_offline(&self, offline: bool) -> StoreResult<()> {
        self.lock()?.offline = offline;
        Ok(())
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.writes)
    }

    /// Adds a team and returns its id.
    pub fn register_team(&self, name: &str, short_name: Option<&str>) -> StoreResult<TeamId> {
        let mut inner = self.lock()?;
        inner.check_online()?;
        let id = inner.take_id();
        inner.teams.insert(
            id,
            Team {
                id,
                name: name.to_string(),
                short_name: short_name.map(str::to_string),
            },
        );
        Ok(id)
    }

    /// Adds a SCHEDULED race.
    pub fn register_race(
        &self,
        name: &str,
        kind: RaceKind,
        scheduled_start: Option<TimestampMs>,
    ) -> StoreResult<RaceId> {
        let id = {
            let mut inner = self.lock()?;
            inner.check_online()?;
            let id = inner.take_id();
            inner.races.insert(
                id,
                Race {
                    id,
                    name: name.to_string(),
                    kind,
                    status: RaceStatus::Scheduled,
                    scheduled_start,
                    actual_start: None,
                },
            );
            id
        };
        self.notify(Table::Races);
        Ok(id)
    }

    /// Registers a boat. Bow numbers are unique per race.
    pub fn register_entry(
        &self,
        race_id: RaceId,
        team_id: TeamId,
        bow_number: Option<BowNumber>,
    ) -> StoreResult<EntryId> {
        let id = {
            let mut inner = self.lock()?;
            inner.check_online()?;
            if !inner.races.contains_key(&race_id) {
                return Err(StoreError::NotFound { what: "race", id: race_id });
            }
            if !inner.teams.contains_key(&team_id) {
                return Err(StoreError::NotFound { what: "team", id: team_id });
            }
            if let Some(bow) = bow_number {
                if inner.bow_taken(race_id, bow, None) {
                    return Err(StoreError::Conflict(format!(
                        "bow number {bow} already used in race {race_id}"
                    )));
                }
            }
            let id = inner.take_id();
            inner.entries.insert(
                id,
                Entry {
                    id,
                    race_id,
                    team_id,
                    bow_number,
                    status: EntryStatus::Entered,
                },
            );
            id
        };
        self.notify(Table::Entries);
        Ok(id)
    }

    /// Changes an entry's bow number. Only allowed while the race is SCHEDULED.
    pub fn set_bow_number(&self, entry_id: EntryId, bow_number: BowNumber) -> StoreResult<()> {
        {
            let mut inner = self.lock()?;
            inner.check_online()?;
            let entry = inner
                .entries
                .get(&entry_id)
                .ok_or(StoreError::NotFound { what: "entry", id: entry_id })?;
            let race_id = entry.race_id;
            let status = inner
                .races
                .get(&race_id)
                .map(|r| r.status)
                .ok_or(StoreError::NotFound { what: "race", id: race_id })?;
            if status != RaceStatus::Scheduled {
                return Err(StoreError::Conflict(format!(
                    "bow numbers are frozen once race {race_id} is {}",
                    status.as_str()
                )));
            }
            if inner.bow_taken(race_id, bow_number, Some(entry_id)) {
                return Err(StoreError::Conflict(format!(
                    "bow number {bow_number} already used in race {race_id}"
                )));
            }
            if let Some(entry) = inner.entries.get_mut(&entry_id) {
                entry.bow_number = Some(bow_number);
            }
            inner.writes += 1;
        }
        self.notify(Table::Entries);
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn notify(&self, table: Table) {
        if let Some(feed) = &self.feed {
            feed.publish(table);
        }
    }
}

impl ResultStore for MemoryStore {
    fn create_timing_record(&mut self, draft: &TimingRecordDraft) -> StoreResult<TimingRecord> {
        let record = {
            let mut inner = self.lock()?;
            inner.check_online()?;
            if !inner.entries.contains_key(&draft.entry_id) {
                return Err(StoreError::NotFound { what: "entry", id: draft.entry_id });
            }
            let id = inner.take_id();
            let record = draft.clone().into_record(id);
            inner.records.push(record.clone());
            inner.writes += 1;
            record
        };
        self.notify(Table::Results);
        Ok(record)
    }

    fn update_timing_record(&mut self, id: RecordId, patch: &TimingRecordPatch) -> StoreResult<()> {
        {
            let mut inner = self.lock()?;
            inner.check_online()?;
            let rec = inner
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(StoreError::NotFound { what: "timing record", id })?;
            patch.apply_to(rec);
            inner.writes += 1;
        }
        self.notify(Table::Results);
        Ok(())
    }

    fn list_records_for_entry(&self, entry_id: EntryId) -> StoreResult<Vec<TimingRecord>> {
        let inner = self.lock()?;
        inner.check_online()?;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.entry_id == entry_id)
            .cloned()
            .collect())
    }

    fn list_records_for_race(&self, race_id: RaceId) -> StoreResult<Vec<RaceResultRow>> {
        let inner = self.lock()?;
        inner.check_online()?;
        Ok(inner
            .records
            .iter()
            .filter_map(|rec| {
                let entry = inner.entries.get(&rec.entry_id)?;
                (entry.race_id == race_id).then(|| RaceResultRow {
                    record: rec.clone(),
                    bow_number: entry.bow_number,
                    team_name: inner.team_name(entry.team_id),
                    entry_status: entry.status,
                })
            })
            .collect())
    }
}

impl RaceStore for MemoryStore {
    fn get_race(&self, race_id: RaceId) -> StoreResult<Option<Race>> {
        let inner = self.lock()?;
        inner.check_online()?;
        Ok(inner.races.get(&race_id).cloned())
    }

    fn set_race_actual_start(&mut self, race_id: RaceId, at: TimestampMs) -> StoreResult<()> {
        {
            let mut inner = self.lock()?;
            inner.check_online()?;
            let race = inner
                .races
                .get_mut(&race_id)
                .ok_or(StoreError::NotFound { what: "race", id: race_id })?;
            if let Some(existing) = race.actual_start {
                return Err(StoreError::Conflict(format!(
                    "race {race_id} already started at {existing}"
                )));
            }
            race.actual_start = Some(at);
            race.status = RaceStatus::Started;
            inner.writes += 1;
        }
        self.notify(Table::Races);
        Ok(())
    }

    fn set_race_status(&mut self, race_id: RaceId, status: RaceStatus) -> StoreResult<()> {
        {
            let mut inner = self.lock()?;
            inner.check_online()?;
            let race = inner
                .races
                .get_mut(&race_id)
                .ok_or(StoreError::NotFound { what: "race", id: race_id })?;
            race.status = status;
            inner.writes += 1;
        }
        self.notify(Table::Races);
        Ok(())
    }

    fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) -> StoreResult<()> {
        {
            let mut inner = self.lock()?;
            inner.check_online()?;
            let entry = inner
                .entries
                .get_mut(&entry_id)
                .ok_or(StoreError::NotFound { what: "entry", id: entry_id })?;
            entry.status = status;
            inner.writes += 1;
        }
        self.notify(Table::Entries);
        Ok(())
    }

    fn list_entries_for_race(&self, race_id: RaceId) -> StoreResult<Vec<RosterEntry>> {
        let inner = self.lock()?;
        inner.check_online()?;
        let mut out: Vec<RosterEntry> = inner
            .entries
            .values()
            .filter(|e| e.race_id == race_id)
            .map(|e| RosterEntry {
                entry: e.clone(),
                team_name: inner.team_name(e.team_id),
            })
            .collect();
        out.sort_by_key(|r| r.entry.id);
        Ok(out)
    }
}
