use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, trace};

use crate::types::{SessionId, Substitution, Term};

/// Identity of a goal within a session: its predicate symbol plus the
/// canonical JSON rendering of its argument list. Variable names are taken
/// literally; goals are not renamed before keying.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GoalKey {
    session: SessionId,
    symbol: String,
    args: String,
}

impl GoalKey {
    /// `None` when the goal has no predicate symbol or its arguments do not
    /// serialize; the solver then bypasses the cache for that goal.
    pub fn for_goal(session: SessionId, goal: &Term) -> Option<GoalKey> {
        let symbol = goal.symbol()?.to_string();
        let args = match goal {
            Term::Compound { args, .. } => serde_json::to_string(args).ok()?,
            _ => String::new(),
        };
        Some(GoalKey { session, symbol, args })
    }
}

/// Solution set committed for a goal. Entries are immutable once
/// published; `complete` is only ever written as `true`, with the full
/// fact-solution set in place.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub solutions: Vec<Substitution>,
    pub complete: bool,
}

/// Goal-keyed memo of committed solutions, shared by every query on an
/// engine. One global lock; the expected workload is short critical
/// sections around whole-entry reads and writes.
#[derive(Debug, Default)]
pub struct SolutionCache {
    entries: Mutex<HashMap<GoalKey, CacheEntry>>,
}

impl SolutionCache {
    pub fn new() -> Self {
        SolutionCache::default()
    }

    /// The completed entry for this key, if one was published.
    pub fn lookup(&self, key: &GoalKey) -> Option<CacheEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key).filter(|entry| entry.complete).cloned();
        trace!(hit = entry.is_some(), key = ?key, "cache lookup");
        entry
    }

    /// Publish the committed solution set for a goal.
    pub fn publish(&self, key: GoalKey, solutions: Vec<Substitution>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(key = ?key, solutions = solutions.len(), "publishing tabled solutions");
        entries.insert(key, CacheEntry { solutions, complete: true });
    }

    /// Drop every entry, for all sessions.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
