//! Returning-guest lookup over a directory snapshot.

use serde::Serialize;

use crate::store::GuestRecord;

/// Most matches shown for one query.
pub const RESULT_LIMIT: usize = 10;

/// What a returning-guest search found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// Matching guests in directory order. Empty for a blank query.
    Matches { guests: Vec<GuestRecord> },
    /// Nothing matched; the query split into a name to start a new profile.
    NotFound {
        first_name: String,
        last_name: String,
    },
}

/// Every guest in the directory, fetched once per session, newest first.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    guests: Vec<GuestRecord>,
}

impl DirectorySnapshot {
    pub fn new(guests: Vec<GuestRecord>) -> Self {
        Self { guests }
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }

    /// Guests whose `"first last"` contains the query, ignoring case.
    pub fn filter(&self, query: &str) -> Vec<GuestRecord> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.guests
            .iter()
            .filter(|g| g.full_name().to_lowercase().contains(&query))
            .take(RESULT_LIMIT)
            .cloned()
            .collect()
    }

    pub fn search(&self, query: &str) -> SearchOutcome {
        if query.trim().is_empty() {
            return SearchOutcome::Matches { guests: Vec::new() };
        }
        let guests = self.filter(query);
        if guests.is_empty() {
            let (first_name, last_name) = parse_name_from_search(query);
            SearchOutcome::NotFound {
                first_name,
                last_name,
            }
        } else {
            SearchOutcome::Matches { guests }
        }
    }

    pub fn get(&self, id: uuid::Uuid) -> Option<&GuestRecord> {
        self.guests.iter().find(|g| g.id == id)
    }
}

/// Split a search query into first name (first word) and last name (the
/// rest, single-spaced).
pub fn parse_name_from_search(query: &str) -> (String, String) {
    let mut words = query.split_whitespace();
    let first = words.next().unwrap_or_default().to_string();
    let last = words.collect::<Vec<_>>().join(" ");
    (first, last)
}
