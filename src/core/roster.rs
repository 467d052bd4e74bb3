use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    model::{Entry, RosterEntry},
    types::{BowNumber, EntryId, EntryStatus, TeamId},
};

/// Roster line as displayed on the timing console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterBoat {
    /// Entry row.
    pub entry: Entry,
    /// Team display name.
    pub team_name: String,
    /// Crew letter within the team for this race (A, B, ...).
    pub level: String,
    /// True when the team has more than one boat in the race.
    pub shares_team: bool,
}

impl RosterBoat {
    /// "Team" or "Team B" when the team races several boats.
    pub fn display_name(&self) -> String {
        if self.shares_team {
            format!("{} {}", self.team_name, self.level)
        } else {
            self.team_name.clone()
        }
    }
}

/// Snapshot of one race's entries, indexed for bow-number resolution.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    boats: HashMap<EntryId, RosterBoat>,
    by_bow: HashMap<BowNumber, EntryId>,
}

impl Roster {
    /// Builds the roster and assigns crew letters per team by entry id.
    pub fn from_entries(entries: Vec<RosterEntry>) -> Self {
        let mut by_team: HashMap<TeamId, Vec<EntryId>> = HashMap::new();
        for row in &entries {
            by_team.entry(row.entry.team_id).or_default().push(row.entry.id);
        }
        for ids in by_team.values_mut() {
            ids.sort_unstable();
        }

        let mut roster = Self::default();
        for row in entries {
            let siblings = by_team.get(&row.entry.team_id).map(Vec::as_slice).unwrap_or(&[]);
            let idx = siblings.iter().position(|id| *id == row.entry.id).unwrap_or(0);
            if let Some(bow) = row.entry.bow_number {
                roster.by_bow.insert(bow, row.entry.id);
            }
            roster.boats.insert(
                row.entry.id,
                RosterBoat {
                    level: level_letter(idx),
                    shares_team: siblings.len() > 1,
                    entry: row.entry,
                    team_name: row.team_name,
                },
            );
        }
        roster
    }

    /// Looks up the boat carrying `bow` in this race.
    pub fn resolve(&self, bow: BowNumber) -> Option<&RosterBoat> {
        self.by_bow.get(&bow).and_then(|id| self.boats.get(id))
    }

    /// Looks up a boat by entry id.
    pub fn get(&self, entry_id: EntryId) -> Option<&RosterBoat> {
        self.boats.get(&entry_id)
    }

    pub(crate) fn set_status(&mut self, entry_id: EntryId, status: EntryStatus) {
        if let Some(boat) = self.boats.get_mut(&entry_id) {
            boat.entry.status = status;
        }
    }

    /// Boats ordered by bow number; unnumbered boats last.
    pub fn boats(&self) -> Vec<&RosterBoat> {
        let mut out: Vec<&RosterBoat> = self.boats.values().collect();
        out.sort_by_key(|b| (b.entry.bow_number.is_none(), b.entry.bow_number, b.entry.id));
        out
    }

    /// Number of boats.
    pub fn len(&self) -> usize {
        self.boats.len()
    }

    /// True when the race has no entries.
    pub fn is_empty(&self) -> bool {
        self.boats.is_empty()
    }
}

fn level_letter(idx: usize) -> String {
    if idx < 26 {
        char::from(b'A' + idx as u8).to_string()
    } else {
        (idx + 1).to_string()
    }
}
