use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::types::{Fact, Rule, SessionId};

/// Read contract the solver consumes. Lookups return clauses in a stable
/// but otherwise unspecified order; implementations log and swallow their
/// own retrieval problems and surface them as empty results.
pub trait KnowledgeStore {
    /// Every stored fact whose predicate symbol matches, for that session.
    fn facts_with_symbol(&self, session: SessionId, symbol: &str) -> Vec<Fact>;

    /// Every stored rule whose head symbol matches, for that session.
    fn rules_with_head_symbol(&self, session: SessionId, symbol: &str) -> Vec<Rule>;
}

/// Stores that also accept insertions. Clauses are read-only during a
/// query; mutations between queries must be followed by a cache clear.
pub trait KnowledgeStoreMut: KnowledgeStore {
    fn insert_fact(&self, fact: Fact);
    fn insert_rule(&self, rule: Rule);
}

/// In-memory knowledge store, keyed per session with insertion order
/// preserved. Interior locking keeps it shareable across concurrent
/// queries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    facts: HashMap<SessionId, Vec<Fact>>,
    rules: HashMap<SessionId, Vec<Rule>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// All facts stored for a session, in insertion order.
    pub fn facts(&self, session: SessionId) -> Vec<Fact> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.facts.get(&session).cloned().unwrap_or_default()
    }

    /// All rules stored for a session, in insertion order.
    pub fn rules(&self, session: SessionId) -> Vec<Rule> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.rules.get(&session).cloned().unwrap_or_default()
    }

    /// Remove every fact with the given predicate symbol. Returns how many
    /// were dropped.
    pub fn remove_facts_with_symbol(&self, session: SessionId, symbol: &str) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(facts) = inner.facts.get_mut(&session) else {
            return 0;
        };
        let before = facts.len();
        facts.retain(|fact| fact.predicate.symbol() != Some(symbol));
        before - facts.len()
    }

    /// Remove every rule with the given head symbol. Returns how many were
    /// dropped.
    pub fn remove_rules_with_head_symbol(&self, session: SessionId, symbol: &str) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(rules) = inner.rules.get_mut(&session) else {
            return 0;
        };
        let before = rules.len();
        rules.retain(|rule| rule.head.symbol() != Some(symbol));
        before - rules.len()
    }

    /// Drop all facts and rules for a session.
    pub fn clear_session(&self, session: SessionId) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.facts.remove(&session);
        inner.rules.remove(&session);
        debug!(session = ?session, "cleared session clauses");
    }
}

impl KnowledgeStore for MemoryStore {
    fn facts_with_symbol(&self, session: SessionId, symbol: &str) -> Vec<Fact> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .facts
            .get(&session)
            .map(|facts| {
                facts
                    .iter()
                    .filter(|fact| fact.predicate.symbol() == Some(symbol))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn rules_with_head_symbol(&self, session: SessionId, symbol: &str) -> Vec<Rule> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .rules
            .get(&session)
            .map(|rules| {
                rules
                    .iter()
                    .filter(|rule| rule.head.symbol() == Some(symbol))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl KnowledgeStoreMut for MemoryStore {
    fn insert_fact(&self, fact: Fact) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.facts.entry(fact.session).or_default().push(fact);
    }

    fn insert_rule(&self, rule: Rule) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.rules.entry(rule.session).or_default().push(rule);
    }
}
