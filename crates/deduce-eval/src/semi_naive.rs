//! Semi-naive rewriting of rules.
//!
//! A rule whose body mentions relations of its own stratum is split into one
//! variant per such occurrence. In each variant that occurrence reads only
//! the tuples derived in the previous round (the *delta*); the other
//! occurrences read the whole relation.

use std::fmt;
use std::sync::Arc;

use deduce_ir::{Atom, Literal, Rule, Stratum, Term};
use rustc_hash::FxHashMap;

use crate::error::SetupError;
use crate::ordering::ValidRule;

/// A body literal, tagged when it reads the delta of its relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyLiteral {
    pub literal: Literal,
    pub delta: bool,
}

impl BodyLiteral {
    pub fn plain(literal: Literal) -> Self {
        Self {
            literal,
            delta: false,
        }
    }

    pub fn delta(atom: Atom) -> Self {
        Self {
            literal: Literal::Predicate(atom),
            delta: true,
        }
    }
}

impl fmt::Display for BodyLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.delta {
            f.write_str("Δ")?;
        }
        write!(f, "{}", self.literal)
    }
}

/// A rule with at most one delta literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemiNaiveRule {
    pub head: Atom,
    pub body: Vec<BodyLiteral>,
}

impl SemiNaiveRule {
    /// The rule unchanged, without delta literals.
    pub fn plain(rule: &Rule) -> Self {
        Self {
            head: rule.head.clone(),
            body: rule.body.iter().cloned().map(BodyLiteral::plain).collect(),
        }
    }

    pub fn delta_position(&self) -> Option<usize> {
        self.body.iter().position(|l| l.delta)
    }

    /// Occurrences of each variable across head and body.
    pub fn var_counts(&self) -> FxHashMap<Arc<str>, usize> {
        let rule = Rule::new(
            self.head.clone(),
            self.body.iter().map(|l| l.literal.clone()).collect(),
        );
        rule.var_counts()
    }
}

pub(crate) fn write_rule(f: &mut fmt::Formatter<'_>, head: &Atom, body: &[BodyLiteral]) -> fmt::Result {
    write!(f, "{head}")?;
    if body.is_empty() {
        return f.write_str(".");
    }
    f.write_str(" :-")?;
    for (i, literal) in body.iter().enumerate() {
        let sep = if i + 1 == body.len() { "." } else { "," };
        write!(f, "\n    {literal}{sep}")?;
    }
    Ok(())
}

impl fmt::Display for SemiNaiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rule(f, &self.head, &self.body)
    }
}

/// Produce the semi-naive variants of `rule` for evaluation within
/// `stratum`.
///
/// Each positive occurrence of a stratum relation yields a variant with that
/// occurrence marked delta. A rule without such occurrences is returned
/// unchanged.
pub fn specialize(rule: &Rule, stratum: &Stratum) -> Vec<SemiNaiveRule> {
    let recursive: Vec<usize> = rule
        .body
        .iter()
        .enumerate()
        .filter_map(|(i, literal)| match literal {
            Literal::Predicate(atom) if !atom.negated && stratum.contains(&atom.symbol) => Some(i),
            _ => None,
        })
        .collect();

    if recursive.is_empty() {
        return vec![SemiNaiveRule::plain(rule)];
    }

    recursive
        .into_iter()
        .map(|pos| {
            let mut variant = SemiNaiveRule::plain(rule);
            variant.body[pos].delta = true;
            variant
        })
        .collect()
}

/// Replace delta-literal arguments that contain function calls with fresh
/// variables constrained by equations.
///
/// Eager evaluation matches a delta literal directly against a new tuple, so
/// its arguments must be patterns that never need evaluating first.
pub fn isolate_delta_calls(rule: SemiNaiveRule) -> SemiNaiveRule {
    let mut fresh = 0;
    let mut body = Vec::with_capacity(rule.body.len());
    for literal in rule.body {
        match literal {
            BodyLiteral {
                literal: Literal::Predicate(mut atom),
                delta: true,
            } => {
                for arg in &mut atom.args {
                    if arg.contains_call() {
                        let var = Term::Var(format!("$d{fresh}").into());
                        fresh += 1;
                        let call = std::mem::replace(arg, var.clone());
                        body.push(BodyLiteral::plain(Literal::eq(var, call)));
                    }
                }
                body.push(BodyLiteral::delta(atom));
            }
            other => body.push(other),
        }
    }
    SemiNaiveRule {
        head: rule.head,
        body,
    }
}

/// Reject an ordered rule whose delta literal is preceded by another
/// predicate.
pub fn check_delta_first(rule: &ValidRule) -> Result<(), SetupError> {
    let mut seen_predicate = false;
    for literal in &rule.body {
        if let Literal::Predicate(_) = literal.literal {
            if seen_predicate && literal.delta {
                return Err(SetupError::DeltaPlacement {
                    rule: rule.to_string(),
                });
            }
            seen_predicate = true;
        }
    }
    Ok(())
}
