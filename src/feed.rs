//! Change notifications published by stores.
//!
//! A notice only says which table changed. Consumers must re-fetch rather
//! than trust any payload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Table touched by a store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Race rows.
    Races,
    /// Entry rows.
    Entries,
    /// Timing record rows.
    Results,
}

/// "Table X changed."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    /// Changed table.
    pub table: Table,
}

/// Broadcast fan-out for [`ChangeNotice`]s.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeNotice>,
}

impl ChangeFeed {
    /// Creates a feed; slow subscribers lag after `capacity` notices.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New receiver for notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.tx.subscribe()
    }

    /// Publishes a notice. Having no subscribers is not an error.
    pub fn publish(&self, table: Table) {
        let _ = self.tx.send(ChangeNotice { table });
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
