use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::builtins;
use crate::cache::{GoalKey, SolutionCache};
use crate::store::KnowledgeStore;
use crate::types::{Rule, SessionId, Substitution, Term};
use crate::unify::{compose, unify};

/// Upper bound on goal-reduction depth. A search that reaches it is
/// truncated rather than allowed to overflow the stack.
const MAX_DEPTH: usize = 1024;

/// Depth-first SLD resolution over one session's knowledge base. Created
/// per query; the store and the tabling cache outlive it.
pub(crate) struct Solver<'a, S: KnowledgeStore> {
    store: &'a S,
    cache: &'a SolutionCache,
    session: SessionId,
    rename_seq: u64,
}

impl<'a, S: KnowledgeStore> Solver<'a, S> {
    pub(crate) fn new(store: &'a S, cache: &'a SolutionCache, session: SessionId) -> Self {
        Solver {
            store,
            cache,
            session,
            rename_seq: 0,
        }
    }

    /// Prove the conjunction left to right, returning every substitution
    /// under which it holds. An empty result is a normal outcome.
    pub(crate) fn solve(
        &mut self,
        goals: &[Term],
        subst: &Substitution,
        depth: usize,
    ) -> Vec<Substitution> {
        if depth > MAX_DEPTH {
            warn!(depth, "goal reduction depth limit reached, truncating search");
            return Vec::new();
        }

        let Some((goal, rest)) = goals.split_first() else {
            return vec![subst.clone()];
        };

        if let Some(solutions) = builtins::eval(self, goal, subst, depth) {
            let mut results = Vec::new();
            for solution in &solutions {
                results.extend(self.solve(rest, solution, depth + 1));
            }
            return results;
        }

        self.solve_user_defined(goal, rest, subst, depth)
    }

    fn solve_user_defined(
        &mut self,
        goal: &Term,
        rest: &[Term],
        subst: &Substitution,
        depth: usize,
    ) -> Vec<Substitution> {
        let key = GoalKey::for_goal(self.session, goal);
        let tabled = key.as_ref().and_then(|key| self.cache.lookup(key));

        let mut results = Vec::new();
        let mut fact_solutions = Vec::new();

        // A table hit replays the committed fact matches and skips fact
        // retrieval; rule reduction still runs below, since rule-derived
        // solutions are never tabled.
        if let Some(entry) = &tabled {
            trace!(goal = %goal, "tabled goal, replaying committed solutions");
            for cached in &entry.solutions {
                let merged = compose(subst, cached);
                results.extend(self.solve(rest, &merged, depth + 1));
            }
        }

        if let Some(symbol) = goal.symbol() {
            if tabled.is_none() {
                for fact in self.store.facts_with_symbol(self.session, symbol) {
                    if let Some(solution) = unify(goal, &fact.predicate, subst) {
                        fact_solutions.push(solution);
                    }
                }
            }

            for rule in self.store.rules_with_head_symbol(self.session, symbol) {
                let fresh = self.rename_rule(&rule);
                if let Some(solution) = unify(goal, &fresh.head, subst) {
                    trace!(head = %fresh.head, "reducing goal through rule");
                    let mut goals = fresh.body;
                    goals.extend(rest.iter().cloned());
                    results.extend(self.solve(&goals, &solution, depth + 1));
                }
            }
        }

        if tabled.is_none() {
            // Remaining conjuncts continue only from the fact matches
            // here; rule branches already carried them in their goal
            // lists.
            for solution in &fact_solutions {
                results.extend(self.solve(rest, solution, depth + 1));
            }

            // Only fact matches are tabled. Rule-derived solutions carry
            // fresh renamed variables that would alias across unrelated
            // invocations.
            if let Some(key) = key {
                debug!(goal = %goal, solutions = fact_solutions.len(), "committing tabled solutions");
                self.cache.publish(key, fact_solutions);
            }
        }

        results
    }

    /// Fresh copy of a rule: every variable `X` becomes `X_k` with `k`
    /// drawn from the solver's counter. Occurrences of one source variable
    /// share one fresh name, so the rule's internal links survive.
    fn rename_rule(&mut self, rule: &Rule) -> Rule {
        self.rename_seq += 1;
        let seq = self.rename_seq;
        let mut renames: HashMap<String, String> = HashMap::new();

        fn rename(term: &Term, renames: &mut HashMap<String, String>, seq: u64) -> Term {
            match term {
                Term::Var(name) => {
                    let fresh = renames
                        .entry(name.clone())
                        .or_insert_with(|| format!("{name}_{seq}"))
                        .clone();
                    Term::Var(fresh)
                }
                Term::Compound { functor, args } => Term::Compound {
                    functor: functor.clone(),
                    args: args.iter().map(|arg| rename(arg, renames, seq)).collect(),
                },
                _ => term.clone(),
            }
        }

        Rule {
            session: rule.session,
            head: rename(&rule.head, &mut renames, seq),
            body: rule.body.iter().map(|t| rename(t, &mut renames, seq)).collect(),
        }
    }
}
