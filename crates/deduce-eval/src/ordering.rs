//! Join ordering.
//!
//! A body is evaluated left to right, so every literal must be evaluable once
//! the literals before it have bound their variables. [`ValidRule::make`]
//! reorders a body greedily: at each position it takes the evaluable literal
//! with the highest [`score`], the earliest one on ties.

use std::fmt;
use std::sync::Arc;

use deduce_ir::{Atom, Literal, Term};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::Optimization;
use crate::error::SetupError;
use crate::semi_naive::{BodyLiteral, SemiNaiveRule, write_rule};

pub type VarSet = FxHashSet<Arc<str>>;

/// Score of literals that should run as soon as they can.
const FIRST: i32 = i32::MAX;

fn is_bound(term: &Term, bound: &VarSet) -> bool {
    term.var_set().is_subset(bound)
}

/// Whether `term` can be matched against a value: every variable under a
/// function call must already be bound.
fn is_matchable(term: &Term, bound: &VarSet) -> bool {
    let mut vars = VarSet::default();
    term.collect_call_vars(&mut vars);
    vars.is_subset(bound)
}

/// A bare variable that occurs nowhere else in the rule.
pub(crate) fn is_singleton(term: &Term, counts: &FxHashMap<Arc<str>, usize>) -> bool {
    term.as_var()
        .is_some_and(|name| counts.get(name).copied().unwrap_or(0) == 1)
}

fn percent_bound(atom: &Atom, bound: &VarSet) -> i32 {
    if atom.args.is_empty() {
        return 0;
    }
    let n = atom.args.iter().filter(|arg| is_bound(arg, bound)).count();
    (n * 100 / atom.args.len()) as i32
}

/// Preference for placing `literal` next, given the variables bound so far.
pub fn score(optimization: Optimization, literal: &BodyLiteral, bound: &VarSet) -> i32 {
    let atom = match &literal.literal {
        Literal::Unification { .. } => {
            return match optimization {
                Optimization::AsWritten => 0,
                _ => FIRST,
            };
        }
        Literal::Predicate(atom) => atom,
    };
    match optimization {
        Optimization::AsWritten => 0,
        Optimization::BoundRatio => {
            if atom.negated {
                FIRST
            } else if literal.delta {
                100
            } else if atom.args.is_empty() {
                150
            } else {
                percent_bound(atom, bound)
            }
        }
        Optimization::BoundRatioPlain => {
            if atom.args.is_empty() {
                150
            } else {
                percent_bound(atom, bound)
            }
        }
        Optimization::BoundRatioDeltaFirst => {
            if atom.negated || atom.args.is_empty() {
                FIRST
            } else if literal.delta {
                125
            } else {
                percent_bound(atom, bound)
            }
        }
        Optimization::FiltersFirst => {
            if atom.negated || literal.delta {
                FIRST
            } else {
                0
            }
        }
    }
}

/// Whether `literal` can be evaluated once `bound` are bound.
///
/// - A negated literal needs all of its variables bound, except arguments
///   that are singleton variables, which are ignored.
/// - A positive predicate needs the variables under function calls bound.
/// - An equation needs one side fully bound and the other matchable.
pub fn can_bind_vars(literal: &Literal, bound: &VarSet, counts: &FxHashMap<Arc<str>, usize>) -> bool {
    match literal {
        Literal::Unification {
            lhs,
            rhs,
            negated: true,
        } => is_bound(lhs, bound) && is_bound(rhs, bound),
        Literal::Unification {
            lhs,
            rhs,
            negated: false,
        } => {
            (is_bound(lhs, bound) && is_matchable(rhs, bound))
                || (is_bound(rhs, bound) && is_matchable(lhs, bound))
        }
        Literal::Predicate(atom) if atom.negated => atom
            .args
            .iter()
            .all(|arg| is_bound(arg, bound) || is_singleton(arg, counts)),
        Literal::Predicate(atom) => atom.args.iter().all(|arg| is_matchable(arg, bound)),
    }
}

/// Reorder `body` in place. Returns the variables bound by the whole body, or
/// `None` when some literal can never be evaluated.
fn order(
    body: &mut Vec<BodyLiteral>,
    optimization: Optimization,
    counts: &FxHashMap<Arc<str>, usize>,
) -> Option<VarSet> {
    let mut bound = VarSet::default();
    for pos in 0..body.len() {
        let mut best: Option<(usize, i32)> = None;
        for (i, literal) in body.iter().enumerate().skip(pos) {
            if !can_bind_vars(&literal.literal, &bound, counts) {
                continue;
            }
            let s = score(optimization, literal, &bound);
            if best.is_none_or(|(_, top)| s > top) {
                best = Some((i, s));
            }
        }
        let (i, _) = best?;
        let literal = body.remove(i);
        bound.extend(literal.literal.var_set());
        body.insert(pos, literal);
    }
    Some(bound)
}

/// A rule whose body is in an evaluable order and whose head is fully bound
/// by its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRule {
    pub head: Atom,
    pub body: Vec<BodyLiteral>,
}

impl ValidRule {
    pub fn make(rule: SemiNaiveRule, optimization: Optimization) -> Result<Self, SetupError> {
        let counts = rule.var_counts();
        let mut body = rule.body.clone();
        let bound = order(&mut body, optimization, &counts).ok_or_else(|| {
            SetupError::NoEvaluableOrdering {
                rule: rule.to_string(),
            }
        })?;

        let mut unbound: Vec<_> = rule
            .head
            .var_set()
            .into_iter()
            .filter(|v| !bound.contains(v))
            .collect();
        if !unbound.is_empty() {
            unbound.sort();
            return Err(SetupError::UnboundHeadVariables {
                vars: unbound.join(", "),
                rule: rule.to_string(),
            });
        }

        Ok(Self {
            head: rule.head,
            body,
        })
    }

    pub fn var_counts(&self) -> FxHashMap<Arc<str>, usize> {
        SemiNaiveRule {
            head: self.head.clone(),
            body: self.body.clone(),
        }
        .var_counts()
    }

    pub fn delta_position(&self) -> Option<usize> {
        self.body.iter().position(|l| l.delta)
    }
}

impl fmt::Display for ValidRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rule(f, &self.head, &self.body)
    }
}
