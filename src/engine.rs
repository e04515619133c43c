use std::collections::HashSet;

use tracing::debug;

use crate::cache::SolutionCache;
use crate::error::Error;
use crate::solver::Solver;
use crate::store::{KnowledgeStore, KnowledgeStoreMut, MemoryStore};
use crate::types::{Fact, QueryResult, Rule, SessionId, Solution, Substitution, Term};
use crate::unify::instantiate;

/// Query façade over a knowledge store, with a tabling cache shared by
/// every query on this engine.
pub struct Engine<S> {
    store: S,
    cache: SolutionCache,
}

impl Engine<MemoryStore> {
    /// Engine over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Engine::new(MemoryStore::new())
    }
}

impl<S: KnowledgeStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Engine {
            store,
            cache: SolutionCache::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Prove the conjunction of `goals` against the session's knowledge
    /// base. Produces one successful entry per solution, with bindings
    /// restricted to the variables appearing in the query, or a single
    /// failed entry when the conjunction has no solutions.
    pub fn query(&self, session: SessionId, goals: &[Term]) -> QueryResult {
        let query_vars = collect_variables(goals);
        let mut solver = Solver::new(&self.store, &self.cache, session);
        let solutions = solver.solve(goals, &Substitution::new(), 0);
        debug!(session = ?session, solutions = solutions.len(), "query finished");

        if solutions.is_empty() {
            return QueryResult {
                solutions: vec![Solution {
                    bindings: Substitution::new(),
                    success: false,
                }],
            };
        }

        let solutions = solutions
            .iter()
            .map(|subst| {
                let bindings = query_vars
                    .iter()
                    .filter(|name| subst.contains_key(*name))
                    .map(|name| (name.clone(), instantiate(&Term::Var(name.clone()), subst)))
                    .collect();
                Solution {
                    bindings,
                    success: true,
                }
            })
            .collect();
        QueryResult { solutions }
    }

    /// Drop every tabled solution, for all sessions. Required after any
    /// store mutation between queries.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl<S: KnowledgeStoreMut> Engine<S> {
    /// Validate and store a fact. The predicate must be an atom or a
    /// compound with a non-empty symbol.
    pub fn add_fact(&self, session: SessionId, predicate: Term) -> Result<(), Error> {
        if !is_predicate(&predicate) {
            return Err(Error::InvalidPredicate);
        }
        self.store.insert_fact(Fact { session, predicate });
        Ok(())
    }

    /// Validate and store a rule. The head must be an atom or a compound
    /// with a non-empty symbol.
    pub fn add_rule(&self, session: SessionId, head: Term, body: Vec<Term>) -> Result<(), Error> {
        if !is_predicate(&head) {
            return Err(Error::InvalidRuleHead);
        }
        self.store.insert_rule(Rule { session, head, body });
        Ok(())
    }
}

fn is_predicate(term: &Term) -> bool {
    match term {
        Term::Atom(name) => !name.is_empty(),
        Term::Compound { functor, .. } => !functor.is_empty(),
        _ => false,
    }
}

/// Names of every variable appearing anywhere in the goals.
fn collect_variables(goals: &[Term]) -> HashSet<String> {
    fn walk(term: &Term, vars: &mut HashSet<String>) {
        match term {
            Term::Var(name) => {
                vars.insert(name.clone());
            }
            Term::Compound { args, .. } => args.iter().for_each(|arg| walk(arg, vars)),
            _ => {}
        }
    }

    let mut vars = HashSet::new();
    goals.iter().for_each(|goal| walk(goal, &mut vars));
    vars
}
