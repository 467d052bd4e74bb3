//! SQLite-backed race, entry, and timing record store.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use crate::{
    feed::{ChangeFeed, Table},
    model::{
        Entry, Race, RaceResultRow, RosterEntry, TimingRecord, TimingRecordDraft,
        TimingRecordPatch,
    },
    types::{
        BowNumber, EntryId, EntryStatus, RaceId, RaceKind, RaceStatus, RecordId, RecordStatus,
        TeamId, TimestampMs,
    },
};

use super::{RaceStore, ResultStore, StoreConfig, StoreError, StoreResult};

const RECORD_COLUMNS: &str = "r.id, r.entry_id, r.start_time, r.end_time, r.adjustment_ms, r.status";

/// SQLite implementation of [`ResultStore`] and [`RaceStore`].
///
/// Several stores may open the same database file; attach one shared
/// [`ChangeFeed`] to all of them so every station hears every write.
pub struct SqliteStore {
    conn: Connection,
    feed: Option<ChangeFeed>,
}

impl SqliteStore {
    /// Opens or creates a store at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Opens or creates a store at `path`.
    ///
    /// Enables WAL mode, sets `synchronous=NORMAL`, and applies the busy
    /// timeout from `config`.
    pub fn open_with(path: impl AsRef<Path>, config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn, config)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn, &StoreConfig::default())
    }

    fn init_connection(conn: Connection, config: &StoreConfig) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn, feed: None })
    }

    /// Publishes a change notice after every successful write.
    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Adds a team and returns its id.
    pub fn register_team(&mut self, name: &str, short_name: Option<&str>) -> StoreResult<TeamId> {
        let id = self.write(None, |conn| {
            conn.execute(
                "INSERT INTO teams(team_name, team_short_name) VALUES (?1, ?2)",
                params![name, short_name],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(id as TeamId)
    }

    /// Adds a SCHEDULED race.
    pub fn register_race(
        &mut self,
        name: &str,
        kind: RaceKind,
        scheduled_start: Option<TimestampMs>,
    ) -> StoreResult<RaceId> {
        let id = self.write(Some(Table::Races), |conn| {
            conn.execute(
                "INSERT INTO races(race_name, race_type, race_status, scheduled_start) VALUES (?1, ?2, ?3, ?4)",
                params![name, kind.as_str(), RaceStatus::Scheduled.as_str(), scheduled_start],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(id as RaceId)
    }

    /// Registers a boat. Duplicate bow numbers within a race are a conflict.
    pub fn register_entry(
        &mut self,
        race_id: RaceId,
        team_id: TeamId,
        bow_number: Option<BowNumber>,
    ) -> StoreResult<EntryId> {
        let id = self.write(Some(Table::Entries), |conn| {
            conn.execute(
                "INSERT INTO entries(race_id, team_id, bow_number, boat_status) VALUES (?1, ?2, ?3, ?4)",
                params![race_id as i64, team_id as i64, bow_number, EntryStatus::Entered.as_str()],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(id as EntryId)
    }

    /// Changes an entry's bow number. Only allowed while the race is SCHEDULED.
    pub fn set_bow_number(&mut self, entry_id: EntryId, bow_number: BowNumber) -> StoreResult<()> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT ra.race_status FROM entries e JOIN races ra ON ra.id = e.race_id WHERE e.id = ?1",
                params![entry_id as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify)?;
        let Some(status) = status else {
            return Err(StoreError::NotFound { what: "entry", id: entry_id });
        };
        if RaceStatus::parse(&status) != Some(RaceStatus::Scheduled) {
            return Err(StoreError::Conflict(format!(
                "bow numbers are frozen once the race is {status}"
            )));
        }
        self.write(Some(Table::Entries), |conn| {
            conn.execute(
                "UPDATE entries SET bow_number = ?1 WHERE id = ?2",
                params![bow_number, entry_id as i64],
            )
        })?;
        Ok(())
    }

    fn write<T>(
        &mut self,
        table: Option<Table>,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let out = f(&self.conn).map_err(classify)?;
        if let (Some(table), Some(feed)) = (table, &self.feed) {
            feed.publish(table);
        }
        Ok(out)
    }

    fn write_one(
        &mut self,
        table: Table,
        what: &'static str,
        id: u64,
        f: impl FnOnce(&Connection) -> rusqlite::Result<usize>,
    ) -> StoreResult<()> {
        let changed = f(&self.conn).map_err(classify)?;
        if changed == 0 {
            return Err(StoreError::NotFound { what, id });
        }
        if let Some(feed) = &self.feed {
            feed.publish(table);
        }
        Ok(())
    }
}

impl ResultStore for SqliteStore {
    fn create_timing_record(&mut self, draft: &TimingRecordDraft) -> StoreResult<TimingRecord> {
        let id = self.write(Some(Table::Results), |conn| {
            conn.execute(
                "INSERT INTO race_results(entry_id, start_time, end_time, adjustment_ms, status) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    draft.entry_id as i64,
                    draft.start_time,
                    draft.end_time,
                    draft.adjustment_ms,
                    draft.status.map(|s| s.as_str()),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(draft.clone().into_record(id as RecordId))
    }

    fn update_timing_record(&mut self, id: RecordId, patch: &TimingRecordPatch) -> StoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.write_one(Table::Results, "timing record", id, |conn| {
            conn.execute(
                "UPDATE race_results SET
                    start_time = COALESCE(?1, start_time),
                    end_time = COALESCE(?2, end_time),
                    adjustment_ms = COALESCE(?3, adjustment_ms),
                    status = COALESCE(?4, status)
                 WHERE id = ?5",
                params![
                    patch.start_time,
                    patch.end_time,
                    patch.adjustment_ms,
                    patch.status.map(|s| s.as_str()),
                    id as i64,
                ],
            )
        })
    }

    fn list_records_for_entry(&self, entry_id: EntryId) -> StoreResult<Vec<TimingRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM race_results r WHERE r.entry_id = ?1 ORDER BY r.id ASC");
        let mut stmt = self.conn.prepare(&sql).map_err(classify)?;
        let rows = stmt
            .query_map(params![entry_id as i64], record_from_row)
            .map_err(classify)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(classify)?);
        }
        Ok(out)
    }

    fn list_records_for_race(&self, race_id: RaceId) -> StoreResult<Vec<RaceResultRow>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}, e.bow_number, t.team_name, e.boat_status
             FROM race_results r
             JOIN entries e ON e.id = r.entry_id
             LEFT JOIN teams t ON t.id = e.team_id
             WHERE e.race_id = ?1
             ORDER BY r.id ASC"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(classify)?;
        let rows = stmt
            .query_map(params![race_id as i64], |row| {
                let record = record_from_row(row)?;
                let team_name: Option<String> = row.get(7)?;
                let status: String = row.get(8)?;
                Ok(RaceResultRow {
                    record,
                    bow_number: row.get(6)?,
                    team_name: team_name.unwrap_or_else(|| "Unknown Team".to_string()),
                    entry_status: parse_col(8, &status, EntryStatus::parse)?,
                })
            })
            .map_err(classify)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(classify)?);
        }
        Ok(out)
    }
}

impl RaceStore for SqliteStore {
    fn get_race(&self, race_id: RaceId) -> StoreResult<Option<Race>> {
        self.conn
            .query_row(
                "SELECT id, race_name, race_type, race_status, scheduled_start, actual_start FROM races WHERE id = ?1",
                params![race_id as i64],
                |row| {
                    let id: i64 = row.get(0)?;
                    let kind: String = row.get(2)?;
                    let status: String = row.get(3)?;
                    Ok(Race {
                        id: id as RaceId,
                        name: row.get(1)?,
                        kind: parse_col(2, &kind, RaceKind::parse)?,
                        status: parse_col(3, &status, RaceStatus::parse)?,
                        scheduled_start: row.get(4)?,
                        actual_start: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(classify)
    }

    /// Fails with [`StoreError::Conflict`] when `actual_start` is already set.
    fn set_race_actual_start(&mut self, race_id: RaceId, at: TimestampMs) -> StoreResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE races SET actual_start = ?1, race_status = ?2 WHERE id = ?3 AND actual_start IS NULL",
                params![at, RaceStatus::Started.as_str(), race_id as i64],
            )
            .map_err(classify)?;
        if changed == 0 {
            return match self.get_race(race_id)? {
                Some(race) => Err(StoreError::Conflict(format!(
                    "race {race_id} already started at {}",
                    race.actual_start.unwrap_or_default()
                ))),
                None => Err(StoreError::NotFound { what: "race", id: race_id }),
            };
        }
        if let Some(feed) = &self.feed {
            feed.publish(Table::Races);
        }
        Ok(())
    }

    fn set_race_status(&mut self, race_id: RaceId, status: RaceStatus) -> StoreResult<()> {
        self.write_one(Table::Races, "race", race_id, |conn| {
            conn.execute(
                "UPDATE races SET race_status = ?1 WHERE id = ?2",
                params![status.as_str(), race_id as i64],
            )
        })
    }

    fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) -> StoreResult<()> {
        self.write_one(Table::Entries, "entry", entry_id, |conn| {
            conn.execute(
                "UPDATE entries SET boat_status = ?1 WHERE id = ?2",
                params![status.as_str(), entry_id as i64],
            )
        })
    }

    fn list_entries_for_race(&self, race_id: RaceId) -> StoreResult<Vec<RosterEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT e.id, e.race_id, e.team_id, e.bow_number, e.boat_status, t.team_name
                 FROM entries e
                 LEFT JOIN teams t ON t.id = e.team_id
                 WHERE e.race_id = ?1
                 ORDER BY e.id ASC",
            )
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![race_id as i64], |row| {
                let id: i64 = row.get(0)?;
                let race_id: i64 = row.get(1)?;
                let team_id: i64 = row.get(2)?;
                let status: String = row.get(4)?;
                let team_name: Option<String> = row.get(5)?;
                Ok(RosterEntry {
                    entry: Entry {
                        id: id as EntryId,
                        race_id: race_id as RaceId,
                        team_id: team_id as TeamId,
                        bow_number: row.get(3)?,
                        status: parse_col(4, &status, EntryStatus::parse)?,
                    },
                    team_name: team_name.unwrap_or_else(|| "Unknown Team".to_string()),
                })
            })
            .map_err(classify)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(classify)?);
        }
        Ok(out)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TimingRecord> {
    let id: i64 = row.get(0)?;
    let entry_id: i64 = row.get(1)?;
    let status: Option<String> = row.get(5)?;
    let status = match status {
        Some(s) => Some(parse_col(5, &s, RecordStatus::parse)?),
        None => None,
    };
    Ok(TimingRecord {
        id: id as RecordId,
        entry_id: entry_id as EntryId,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        adjustment_ms: row.get(4)?,
        status,
    })
}

fn parse_col<T>(idx: usize, raw: &str, parse: impl FnOnce(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(format!("unknown status value: {raw}"))),
        )
    })
}

/// Maps lock contention to [`StoreError::Timeout`] and constraint failures to
/// [`StoreError::Conflict`].
fn classify(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(e, msg) = &err {
        match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => return StoreError::Timeout,
            ErrorCode::ConstraintViolation => {
                return StoreError::Conflict(
                    msg.clone().unwrap_or_else(|| "constraint violation".to_string()),
                );
            }
            _ => {}
        }
    }
    if matches!(err, rusqlite::Error::FromSqlConversionFailure(..)) {
        return StoreError::Corrupt(err.to_string());
    }
    StoreError::Sqlite(err)
}
