use crate::types::{Substitution, Term};

/// Resolve a variable through the substitution, following binding chains.
/// Non-variables and unbound variables come back unchanged.
pub fn deref<'a>(term: &'a Term, subst: &'a Substitution) -> &'a Term {
    if let Term::Var(name) = term {
        if let Some(bound) = subst.get(name) {
            return deref(bound, subst);
        }
    }
    term
}

/// Deep dereference: resolve the whole term, including compound arguments.
/// The result contains no variable that the substitution resolves.
pub fn instantiate(term: &Term, subst: &Substitution) -> Term {
    let term = deref(term, subst);
    match term {
        Term::Compound { functor, args } => Term::Compound {
            functor: functor.clone(),
            args: args.iter().map(|arg| instantiate(arg, subst)).collect(),
        },
        _ => term.clone(),
    }
}

fn occurs(name: &str, term: &Term, subst: &Substitution) -> bool {
    match deref(term, subst) {
        Term::Var(n) => n == name,
        Term::Compound { args, .. } => args.iter().any(|arg| occurs(name, arg, subst)),
        _ => false,
    }
}

/// Extend the substitution with `name ↦ term`. The caller guarantees the
/// variable is unbound. Fails when the occurs-check fires; binding chains
/// therefore never cycle.
pub fn bind(name: &str, term: &Term, subst: &Substitution) -> Option<Substitution> {
    if occurs(name, term, subst) {
        return None;
    }
    let mut extended = subst.clone();
    extended.insert(name.to_string(), term.clone());
    Some(extended)
}

/// Right-biased union of two substitutions: bindings in `overlay` win on
/// conflict.
pub fn compose(base: &Substitution, overlay: &Substitution) -> Substitution {
    let mut merged = base.clone();
    for (name, term) in overlay {
        merged.insert(name.clone(), term.clone());
    }
    merged
}

/// Robinson unification with occurs-check. Returns the extended
/// substitution, or `None` when the terms do not unify. The input
/// substitution is never mutated.
pub fn unify(t1: &Term, t2: &Term, subst: &Substitution) -> Option<Substitution> {
    let t1 = deref(t1, subst);
    let t2 = deref(t2, subst);

    if t1 == t2 {
        return Some(subst.clone());
    }

    if let Term::Var(name) = t1 {
        return bind(name, t2, subst);
    }
    if let Term::Var(name) = t2 {
        return bind(name, t1, subst);
    }

    match (t1, t2) {
        (
            Term::Compound { functor: f1, args: args1 },
            Term::Compound { functor: f2, args: args2 },
        ) if f1 == f2 && args1.len() == args2.len() => {
            let mut current = subst.clone();
            for (a1, a2) in args1.iter().zip(args2) {
                current = unify(a1, a2, &current)?;
            }
            Some(current)
        }
        _ => None,
    }
}
