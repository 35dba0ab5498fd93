use std::collections::BTreeMap;

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::user;

/// Free-form key/value context stored next to an entry.
pub type Metadata = BTreeMap<String, Value>;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub action: String,
    pub description: String,
    pub performed_by: user::Id,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Append-only journal of a ticket.
///
/// There is no way to edit or remove an entry: corrections are new entries.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ActivityLog(Vec<Entry>);

impl ActivityLog {
    /// Appends `entry`.
    ///
    /// The timestamp is raised to the one of the last entry if the clock went
    /// backwards, so append order and time order never disagree.
    pub fn append(&mut self, mut entry: Entry) -> &Entry {
        if let Some(last) = self.0.last() {
            entry.timestamp = entry.timestamp.max(last.timestamp);
        }
        self.0.push(entry);
        &self.0[self.0.len() - 1]
    }

    /// Entries ordered by timestamp, ties kept in append order.
    pub fn entries(&self) -> Vec<&Entry> {
        self.0.iter().sorted_by_key(|e| e.timestamp).collect()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
