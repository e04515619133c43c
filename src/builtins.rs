use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use strum_macros::EnumString;
use tracing::trace;

use crate::solver::Solver;
use crate::store::KnowledgeStore;
use crate::types::{self, Substitution, Term};
use crate::unify::{deref, instantiate, unify};

/// Reserved predicate symbols. Shadowing one with a user fact or rule is
/// undefined; the dispatcher always claims these functors first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Builtin {
    #[strum(serialize = "=")]
    Unify,
    Atom,
    Var,
    Number,
    Now,
    DateBefore,
    DateAfter,
    DaysBetween,
    Count,
    Sum,
    Max,
    Min,
}

enum Fold {
    Sum,
    Max,
    Min,
}

/// Evaluate `goal` if its functor is reserved. `None` means the goal is
/// not a builtin and resolution falls through to the knowledge store. A
/// reserved functor at the wrong arity is handled and yields no solutions.
pub(crate) fn eval<S: KnowledgeStore>(
    solver: &mut Solver<'_, S>,
    goal: &Term,
    subst: &Substitution,
    depth: usize,
) -> Option<Vec<Substitution>> {
    let Term::Compound { functor, args } = goal else {
        return None;
    };
    let builtin = Builtin::from_str(functor).ok()?;
    trace!(functor = %functor, "dispatching builtin");

    let solutions = match builtin {
        Builtin::Unify => eval_unify(args, subst),
        Builtin::Atom => type_test(args, subst, |t| matches!(t, Term::Atom(_))),
        Builtin::Var => type_test(args, subst, |t| matches!(t, Term::Var(_))),
        Builtin::Number => type_test(args, subst, |t| matches!(t, Term::Number(_))),
        Builtin::Now => eval_now(args, subst),
        Builtin::DateBefore => date_compare(args, subst, |a, b| a < b),
        Builtin::DateAfter => date_compare(args, subst, |a, b| a > b),
        Builtin::DaysBetween => eval_days_between(args, subst),
        Builtin::Count => eval_count(solver, args, subst, depth),
        Builtin::Sum => eval_fold(solver, args, subst, depth, Fold::Sum),
        Builtin::Max => eval_fold(solver, args, subst, depth, Fold::Max),
        Builtin::Min => eval_fold(solver, args, subst, depth, Fold::Min),
    };
    Some(solutions)
}

fn eval_unify(args: &[Term], subst: &Substitution) -> Vec<Substitution> {
    match args {
        [lhs, rhs] => unify(lhs, rhs, subst).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn type_test(args: &[Term], subst: &Substitution, test: impl Fn(&Term) -> bool) -> Vec<Substitution> {
    match args {
        [arg] if test(deref(arg, subst)) => vec![subst.clone()],
        _ => Vec::new(),
    }
}

fn eval_now(args: &[Term], subst: &Substitution) -> Vec<Substitution> {
    match args {
        [out] => {
            let now = types::date(Utc::now().fixed_offset());
            unify(out, &now, subst).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn date_compare(
    args: &[Term],
    subst: &Substitution,
    ordered: impl Fn(&DateTime<FixedOffset>, &DateTime<FixedOffset>) -> bool,
) -> Vec<Substitution> {
    match args {
        [lhs, rhs] => match (deref(lhs, subst), deref(rhs, subst)) {
            (Term::Date(a), Term::Date(b)) if ordered(a, b) => vec![subst.clone()],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn eval_days_between(args: &[Term], subst: &Substitution) -> Vec<Substitution> {
    match args {
        [from, to, out] => match (deref(from, subst), deref(to, subst)) {
            (Term::Date(a), Term::Date(b)) => {
                let days = (*b - *a).num_seconds() as f64 / 86_400.0;
                unify(out, &Term::Number(days), subst).into_iter().collect()
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// `count(Template, Goal, N)`. The template argument is accepted and
/// ignored; N counts solutions, not numeric instantiations.
fn eval_count<S: KnowledgeStore>(
    solver: &mut Solver<'_, S>,
    args: &[Term],
    subst: &Substitution,
    depth: usize,
) -> Vec<Substitution> {
    match args {
        [_template, goal, out] => {
            let solutions = solver.solve(std::slice::from_ref(goal), subst, depth + 1);
            let count = Term::Number(solutions.len() as f64);
            unify(out, &count, subst).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// `sum`/`max`/`min` over the numeric instantiations of the template, one
/// per solution of the goal. Non-numeric instantiations are skipped.
/// `sum` of nothing is 0; `max` and `min` of nothing fail.
fn eval_fold<S: KnowledgeStore>(
    solver: &mut Solver<'_, S>,
    args: &[Term],
    subst: &Substitution,
    depth: usize,
    fold: Fold,
) -> Vec<Substitution> {
    let [template, goal, out] = args else {
        return Vec::new();
    };

    let solutions = solver.solve(std::slice::from_ref(goal), subst, depth + 1);
    if matches!(fold, Fold::Max | Fold::Min) && solutions.is_empty() {
        return Vec::new();
    }

    let mut picked: Option<f64> = None;
    for solution in &solutions {
        let Term::Number(value) = instantiate(template, solution) else {
            continue;
        };
        picked = Some(match picked {
            None => value,
            Some(acc) => match fold {
                Fold::Sum => acc + value,
                Fold::Max => {
                    if value > acc {
                        value
                    } else {
                        acc
                    }
                }
                Fold::Min => {
                    if value < acc {
                        value
                    } else {
                        acc
                    }
                }
            },
        });
    }

    let reduced = match fold {
        Fold::Sum => Some(picked.unwrap_or(0.0)),
        Fold::Max | Fold::Min => picked,
    };
    match reduced {
        Some(value) => unify(out, &Term::Number(value), subst).into_iter().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SolutionCache;
    use crate::store::{KnowledgeStoreMut, MemoryStore};
    use crate::types::{atom, compound, date_from_rfc3339, num, var, Fact, SessionId};

    const SESSION: SessionId = SessionId(1);

    fn score_store() -> MemoryStore {
        let store = MemoryStore::new();
        for (name, score) in [("john", 85.0), ("mary", 92.0), ("bob", 78.0)] {
            store.insert_fact(Fact {
                session: SESSION,
                predicate: compound("score", vec![atom(name), num(score)]),
            });
        }
        store
    }

    fn eval_goal(store: &MemoryStore, goal: &Term) -> Option<Vec<Substitution>> {
        let cache = SolutionCache::new();
        let mut solver = Solver::new(store, &cache, SESSION);
        eval(&mut solver, goal, &Substitution::new(), 0)
    }

    // ===== dispatch =====

    #[test]
    fn unreserved_functors_fall_through() {
        let store = MemoryStore::new();
        assert!(eval_goal(&store, &compound("nonexistent", vec![atom("x")])).is_none());
    }

    #[test]
    fn non_compound_goals_fall_through() {
        let store = MemoryStore::new();
        assert!(eval_goal(&store, &atom("now")).is_none());
        assert!(eval_goal(&store, &var("X")).is_none());
    }

    #[test]
    fn wrong_arity_is_handled_with_no_solutions() {
        let store = MemoryStore::new();
        let count = compound("count", vec![var("X")]);
        assert_eq!(eval_goal(&store, &count), Some(Vec::new()));

        let eq = compound("=", vec![atom("a")]);
        assert_eq!(eval_goal(&store, &eq), Some(Vec::new()));
    }

    // ===== equality =====

    #[test]
    fn equality_binds_a_variable() {
        let store = MemoryStore::new();
        let goal = compound("=", vec![var("X"), atom("test")]);
        let solutions = eval_goal(&store, &goal).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("X"), Some(&atom("test")));
    }

    #[test]
    fn equality_of_distinct_atoms_fails() {
        let store = MemoryStore::new();
        let goal = compound("=", vec![atom("test"), atom("different")]);
        assert_eq!(eval_goal(&store, &goal), Some(Vec::new()));
    }

    #[test]
    fn equality_respects_the_occurs_check() {
        let store = MemoryStore::new();
        let goal = compound("=", vec![var("X"), compound("f", vec![var("X")])]);
        assert_eq!(eval_goal(&store, &goal), Some(Vec::new()));
    }

    // ===== type tests =====

    #[test]
    fn type_tests_inspect_the_dereferenced_argument() {
        let store = MemoryStore::new();
        assert_eq!(eval_goal(&store, &compound("atom", vec![atom("t")])).unwrap().len(), 1);
        assert_eq!(eval_goal(&store, &compound("atom", vec![num(42.0)])).unwrap().len(), 0);
        assert_eq!(eval_goal(&store, &compound("var", vec![var("X")])).unwrap().len(), 1);
        assert_eq!(eval_goal(&store, &compound("var", vec![atom("t")])).unwrap().len(), 0);
        assert_eq!(eval_goal(&store, &compound("number", vec![num(42.0)])).unwrap().len(), 1);
        assert_eq!(eval_goal(&store, &compound("number", vec![atom("t")])).unwrap().len(), 0);
    }

    #[test]
    fn bound_variables_pass_the_test_of_their_value() {
        let store = MemoryStore::new();
        let cache = SolutionCache::new();
        let mut solver = Solver::new(&store, &cache, SESSION);
        let mut subst = Substitution::new();
        subst.insert("X".to_string(), atom("bound"));

        let as_atom = eval(&mut solver, &compound("atom", vec![var("X")]), &subst, 0).unwrap();
        assert_eq!(as_atom.len(), 1);
        let as_var = eval(&mut solver, &compound("var", vec![var("X")]), &subst, 0).unwrap();
        assert_eq!(as_var.len(), 0);
    }

    // ===== temporal =====

    #[test]
    fn now_binds_a_date() {
        let store = MemoryStore::new();
        let solutions = eval_goal(&store, &compound("now", vec![var("X")])).unwrap();
        assert_eq!(solutions.len(), 1);
        assert!(matches!(solutions[0].get("X"), Some(Term::Date(_))));
    }

    #[test]
    fn date_ordering_predicates() {
        let store = MemoryStore::new();
        let earlier = date_from_rfc3339("2023-01-01T00:00:00Z").unwrap();
        let later = date_from_rfc3339("2023-12-31T00:00:00Z").unwrap();

        let before = compound("date_before", vec![earlier.clone(), later.clone()]);
        assert_eq!(eval_goal(&store, &before).unwrap().len(), 1);

        let backwards = compound("date_before", vec![later.clone(), earlier.clone()]);
        assert_eq!(eval_goal(&store, &backwards).unwrap().len(), 0);

        let after = compound("date_after", vec![later.clone(), earlier.clone()]);
        assert_eq!(eval_goal(&store, &after).unwrap().len(), 1);
    }

    #[test]
    fn date_comparison_rejects_non_dates() {
        let store = MemoryStore::new();
        let goal = compound(
            "date_before",
            vec![atom("yesterday"), date_from_rfc3339("2023-01-01T00:00:00Z").unwrap()],
        );
        assert_eq!(eval_goal(&store, &goal).unwrap().len(), 0);
    }

    #[test]
    fn days_between_computes_fractional_days() {
        let store = MemoryStore::new();
        let from = date_from_rfc3339("2023-01-01T00:00:00Z").unwrap();
        let to = date_from_rfc3339("2023-12-31T00:00:00Z").unwrap();

        let goal = compound("days_between", vec![from.clone(), to.clone(), var("D")]);
        let solutions = eval_goal(&store, &goal).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("D"), Some(&num(364.0)));

        let half = date_from_rfc3339("2023-01-01T12:00:00Z").unwrap();
        let goal = compound("days_between", vec![from, half, var("D")]);
        let solutions = eval_goal(&store, &goal).unwrap();
        assert_eq!(solutions[0].get("D"), Some(&num(0.5)));
    }

    #[test]
    fn days_between_is_signed() {
        let store = MemoryStore::new();
        let from = date_from_rfc3339("2023-01-02T00:00:00Z").unwrap();
        let to = date_from_rfc3339("2023-01-01T00:00:00Z").unwrap();
        let goal = compound("days_between", vec![from, to, var("D")]);
        let solutions = eval_goal(&store, &goal).unwrap();
        assert_eq!(solutions[0].get("D"), Some(&num(-1.0)));
    }

    // ===== aggregation =====

    fn score_goal() -> Term {
        compound("score", vec![var("S"), var("V")])
    }

    #[test]
    fn count_counts_solutions() {
        let store = score_store();
        let goal = compound("count", vec![var("_"), score_goal(), var("N")]);
        let solutions = eval_goal(&store, &goal).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("N"), Some(&num(3.0)));
    }

    #[test]
    fn sum_totals_numeric_instantiations() {
        let store = score_store();
        let goal = compound("sum", vec![var("V"), score_goal(), var("T")]);
        let solutions = eval_goal(&store, &goal).unwrap();
        assert_eq!(solutions[0].get("T"), Some(&num(255.0)));
    }

    #[test]
    fn max_and_min_pick_extrema() {
        let store = score_store();
        let goal = compound("max", vec![var("V"), score_goal(), var("M")]);
        assert_eq!(eval_goal(&store, &goal).unwrap()[0].get("M"), Some(&num(92.0)));

        let goal = compound("min", vec![var("V"), score_goal(), var("L")]);
        assert_eq!(eval_goal(&store, &goal).unwrap()[0].get("L"), Some(&num(78.0)));
    }

    #[test]
    fn max_and_min_fail_over_no_data() {
        let store = MemoryStore::new();
        let missing = compound("missing", vec![var("V")]);
        let goal = compound("max", vec![var("V"), missing.clone(), var("M")]);
        assert_eq!(eval_goal(&store, &goal), Some(Vec::new()));

        let goal = compound("min", vec![var("V"), missing, var("M")]);
        assert_eq!(eval_goal(&store, &goal), Some(Vec::new()));
    }

    #[test]
    fn sum_over_no_data_is_zero() {
        let store = MemoryStore::new();
        let missing = compound("missing", vec![var("V")]);
        let goal = compound("sum", vec![var("V"), missing, var("T")]);
        let solutions = eval_goal(&store, &goal).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("T"), Some(&num(0.0)));
    }

    #[test]
    fn non_numeric_instantiations_are_skipped() {
        let store = MemoryStore::new();
        store.insert_fact(Fact {
            session: SESSION,
            predicate: compound("age", vec![atom("alice"), num(30.0)]),
        });
        store.insert_fact(Fact {
            session: SESSION,
            predicate: compound("age", vec![atom("bob"), atom("unknown")]),
        });

        let age_goal = compound("age", vec![var("S"), var("V")]);
        let goal = compound("sum", vec![var("V"), age_goal.clone(), var("T")]);
        assert_eq!(eval_goal(&store, &goal).unwrap()[0].get("T"), Some(&num(30.0)));

        // count still counts both solutions.
        let goal = compound("count", vec![var("_"), age_goal.clone(), var("N")]);
        assert_eq!(eval_goal(&store, &goal).unwrap()[0].get("N"), Some(&num(2.0)));

        let goal = compound("max", vec![var("V"), age_goal, var("M")]);
        assert_eq!(eval_goal(&store, &goal).unwrap()[0].get("M"), Some(&num(30.0)));
    }

    #[test]
    fn max_fails_when_no_instantiation_is_numeric() {
        let store = MemoryStore::new();
        store.insert_fact(Fact {
            session: SESSION,
            predicate: compound("tag", vec![atom("x")]),
        });
        let tag_goal = compound("tag", vec![var("V")]);
        let goal = compound("max", vec![var("V"), tag_goal, var("M")]);
        assert_eq!(eval_goal(&store, &goal), Some(Vec::new()));
    }

    #[test]
    fn aggregation_goal_runs_under_the_callers_bindings() {
        let store = score_store();
        let cache = SolutionCache::new();
        let mut solver = Solver::new(&store, &cache, SESSION);
        let mut subst = Substitution::new();
        subst.insert("S".to_string(), atom("mary"));

        let goal = compound("count", vec![var("_"), score_goal(), var("N")]);
        let solutions = eval(&mut solver, &goal, &subst, 0).unwrap();
        assert_eq!(solutions[0].get("N"), Some(&num(1.0)));
    }
}
