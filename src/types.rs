use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat, SubsecRound};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Opaque identity scoping facts, rules, and tabled solutions. The engine
/// never looks inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// A first-order term.
///
/// Dates are kept at whole-second precision so a term always round-trips
/// bit-identically through its wire rendering.
#[derive(Debug, Clone)]
pub enum Term {
    Atom(String),
    Var(String),
    Number(f64),
    Date(DateTime<FixedOffset>),
    Compound { functor: String, args: Vec<Term> },
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Term::Atom(a), Term::Atom(b)) => a == b,
            (Term::Var(a), Term::Var(b)) => a == b,
            (Term::Number(a), Term::Number(b)) => a == b,
            // Dates compare like their canonical rendering: the same instant
            // at a different offset is a different term.
            (Term::Date(a), Term::Date(b)) => a == b && a.offset() == b.offset(),
            (
                Term::Compound { functor: f1, args: a1 },
                Term::Compound { functor: f2, args: a2 },
            ) => f1 == f2 && a1 == a2,
            _ => false,
        }
    }
}

impl Term {
    /// Retrieval symbol of a goal: the functor of a compound or the name of
    /// an atom. Variables, numbers, and dates have none and match nothing
    /// in the knowledge store.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            Term::Compound { functor, .. } => Some(functor),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(name) => write!(f, "{name}"),
            Term::Var(name) => write!(f, "{name}"),
            Term::Number(value) => write!(f, "{value}"),
            Term::Date(instant) => write!(f, "{}", format_date(instant)),
            Term::Compound { functor, args } => {
                write!(f, "{functor}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Convenience helper for building an atom term.
pub fn atom(name: impl Into<String>) -> Term {
    Term::Atom(name.into())
}

/// Convenience helper for building a variable term.
pub fn var(name: impl Into<String>) -> Term {
    Term::Var(name.into())
}

/// Convenience helper for building a number term.
pub fn num(value: f64) -> Term {
    Term::Number(value)
}

/// Convenience helper for building a compound term.
pub fn compound(functor: impl Into<String>, args: Vec<Term>) -> Term {
    Term::Compound {
        functor: functor.into(),
        args,
    }
}

/// Build a date term, truncating to whole seconds.
pub fn date(instant: DateTime<FixedOffset>) -> Term {
    Term::Date(instant.trunc_subsecs(0))
}

/// Parse an RFC 3339 string into a date term.
pub fn date_from_rfc3339(s: &str) -> Result<Term, Error> {
    DateTime::parse_from_rfc3339(s)
        .map(date)
        .map_err(|_| Error::InvalidDate(s.to_string()))
}

pub(crate) fn format_date(instant: &DateTime<FixedOffset>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Finite mapping from variable name to term. Extension always produces a
/// new value; earlier versions stay valid for backtracking.
pub type Substitution = HashMap<String, Term>;

/// A predicate asserted to hold within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub session: SessionId,
    pub predicate: Term,
}

/// `head :- body₁, …, bodyₙ`. Variables in head and body share one scope
/// local to the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub session: SessionId,
    pub head: Term,
    pub body: Vec<Term>,
}

/// One answer to a query: bindings for the variables that appear in the
/// query's goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub bindings: HashMap<String, Term>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub solutions: Vec<Solution>,
}

// Wire format: every term is an object with a `type` tag, a `value`, and
// (for compounds only) an `args` array. Validation happens on the way in.

#[derive(Serialize, Deserialize)]
struct WireTerm {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<WireTerm>>,
}

impl From<&Term> for WireTerm {
    fn from(term: &Term) -> WireTerm {
        let (kind, value, args) = match term {
            Term::Atom(name) => ("atom", serde_json::Value::from(name.clone()), None),
            Term::Var(name) => ("variable", serde_json::Value::from(name.clone()), None),
            Term::Number(value) => ("number", serde_json::Value::from(*value), None),
            Term::Date(instant) => ("date", serde_json::Value::from(format_date(instant)), None),
            Term::Compound { functor, args } => (
                "compound",
                serde_json::Value::from(functor.clone()),
                Some(args.iter().map(WireTerm::from).collect()),
            ),
        };
        WireTerm {
            kind: Some(kind.to_string()),
            value: Some(value),
            args,
        }
    }
}

impl TryFrom<WireTerm> for Term {
    type Error = Error;

    fn try_from(wire: WireTerm) -> Result<Term, Error> {
        let kind = wire.kind.ok_or(Error::MissingType)?;
        match kind.as_str() {
            "atom" => Ok(Term::Atom(expect_string(wire.value, "atom")?)),
            "variable" => Ok(Term::Var(expect_string(wire.value, "variable")?)),
            "number" => {
                let value = wire
                    .value
                    .as_ref()
                    .and_then(serde_json::Value::as_f64)
                    .ok_or(Error::InvalidValue("number", "numeric"))?;
                Ok(Term::Number(value))
            }
            "date" => {
                let raw = expect_string(wire.value, "date")?;
                date_from_rfc3339(&raw)
            }
            "compound" => {
                let functor = expect_string(wire.value, "compound").map_err(|_| Error::MissingFunctor)?;
                if functor.is_empty() {
                    return Err(Error::MissingFunctor);
                }
                let args = wire
                    .args
                    .unwrap_or_default()
                    .into_iter()
                    .map(Term::try_from)
                    .collect::<Result<Vec<Term>, Error>>()?;
                Ok(Term::Compound { functor, args })
            }
            other => Err(Error::UnknownType(other.to_string())),
        }
    }
}

fn expect_string(value: Option<serde_json::Value>, kind: &'static str) -> Result<String, Error> {
    match value {
        Some(serde_json::Value::String(s)) => Ok(s),
        _ => Err(Error::InvalidValue(kind, "string")),
    }
}

impl Serialize for Term {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireTerm::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Term {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Term, D::Error> {
        let wire = WireTerm::deserialize(deserializer)?;
        Term::try_from(wire).map_err(serde::de::Error::custom)
    }
}
