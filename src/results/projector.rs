use serde::{Deserialize, Serialize};

use crate::{
    model::RaceResultRow,
    types::{BowNumber, DurationMs, EntryId, RecordId, TimestampMs},
};

/// One finisher in the ranked list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedResult {
    /// 1-based position.
    pub rank: usize,
    /// Entry identity, the tie-breaker.
    pub entry_id: EntryId,
    /// Backing record.
    pub record_id: RecordId,
    /// Bow number, if the entry has one.
    pub bow_number: Option<BowNumber>,
    /// Team display name.
    pub team_name: String,
    /// Start-line crossing.
    pub start_time: TimestampMs,
    /// Finish-line crossing.
    pub end_time: TimestampMs,
    /// `end_time - start_time`.
    pub elapsed_ms: DurationMs,
    /// Passthrough adjustment.
    pub adjustment_ms: Option<DurationMs>,
}

impl RankedResult {
    /// Elapsed time rendered like the results board.
    pub fn race_time(&self) -> String {
        format_race_time(self.elapsed_ms)
    }
}

/// Ranks completed records fastest first, ties by entry id.
///
/// Records missing either timestamp are left out, as are entries marked
/// DNS, DNF or DSQ even when their record is complete.
pub fn project(rows: &[RaceResultRow]) -> Vec<RankedResult> {
    let mut out: Vec<RankedResult> = rows
        .iter()
        .filter(|row| !row.entry_status.is_non_finish())
        .filter_map(|row| {
            let start_time = row.record.start_time?;
            let end_time = row.record.end_time?;
            Some(RankedResult {
                rank: 0,
                entry_id: row.record.entry_id,
                record_id: row.record.id,
                bow_number: row.bow_number,
                team_name: row.team_name.clone(),
                start_time,
                end_time,
                elapsed_ms: end_time - start_time,
                adjustment_ms: row.record.adjustment_ms,
            })
        })
        .collect();

    out.sort_by(|a, b| {
        a.elapsed_ms
            .cmp(&b.elapsed_ms)
            .then_with(|| a.entry_id.cmp(&b.entry_id))
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
    for (idx, result) in out.iter_mut().enumerate() {
        result.rank = idx + 1;
    }
    out
}

/// Keeps the last projection so callers only redraw on change.
#[derive(Debug, Clone, Default)]
pub struct ResultsBoard {
    ranked: Vec<RankedResult>,
}

impl ResultsBoard {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes from `rows`; returns true when the ranking changed.
    pub fn refresh(&mut self, rows: &[RaceResultRow]) -> bool {
        let next = project(rows);
        if next == self.ranked {
            return false;
        }
        self.ranked = next;
        true
    }

    /// Current ranking, fastest first.
    pub fn ranked(&self) -> &[RankedResult] {
        &self.ranked
    }

    /// Fastest finisher so far.
    pub fn leader(&self) -> Option<&RankedResult> {
        self.ranked.first()
    }
}

/// `M:SS.cc`, or `S.cc` under a minute.
pub fn format_race_time(ms: DurationMs) -> String {
    let ms = ms.max(0);
    let total_secs = ms / 1000;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    let centis = (ms % 1000) / 10;
    if minutes > 0 {
        format!("{minutes}:{seconds:02}.{centis:02}")
    } else {
        format!("{seconds}.{centis:02}")
    }
}
