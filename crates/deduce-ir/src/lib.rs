//! Intermediate representation for the deduce evaluator.
//!
//! Programs arrive here already desugared: every relation is declared with an
//! arity, rules are a head atom over a flat list of literals, and terms are one
//! of a small closed set of shapes. Parsing and type checking happen elsewhere;
//! [`source`] offers a JSON description for tools and tests.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

pub mod source;
mod stratify;

pub use stratify::{Stratum, stratify};

/// Errors raised while assembling a [`Program`].
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("invalid program source: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown relation `{0}`")]
    UnknownRelation(String),
    #[error("relation `{relation}` has arity {expected} but was used with {found} arguments")]
    ArityMismatch {
        relation: String,
        expected: usize,
        found: usize,
    },
    #[error("relation `{name}` declared with arity {first} and again with arity {second}")]
    DuplicateRelation {
        name: String,
        first: usize,
        second: usize,
    },
    #[error("fact `{0}` contains variables")]
    NonGroundFact(String),
    #[error("invalid term: {0}")]
    InvalidTerm(String),
}

// ─── Symbols and terms ──────────────────────────────────────────────

/// A relation name paired with its arity.
///
/// Symbols are created once when the relation is declared and then cloned
/// freely; cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationSymbol {
    name: Arc<str>,
    arity: usize,
}

impl RelationSymbol {
    pub fn new(name: impl Into<Arc<str>>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Display for RelationSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A term appearing in a fact or rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Logic variable.
    Var(Arc<str>),
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    /// Constructed value: `name(args..)`.
    Ctor(Arc<str>, Vec<Term>),
    /// Function call evaluated at runtime: `@name(args..)`.
    Call(Arc<str>, Vec<Term>),
}

impl Term {
    pub fn var(name: &str) -> Self {
        Term::Var(name.into())
    }

    pub fn int(value: i64) -> Self {
        Term::Int(value)
    }

    pub fn str(value: &str) -> Self {
        Term::Str(value.into())
    }

    pub fn ctor(name: &str, args: Vec<Term>) -> Self {
        Term::Ctor(name.into(), args)
    }

    pub fn call(name: &str, args: Vec<Term>) -> Self {
        Term::Call(name.into(), args)
    }

    pub fn as_var(&self) -> Option<&Arc<str>> {
        match self {
            Term::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Collect every variable of this term into `out`.
    pub fn collect_vars(&self, out: &mut FxHashSet<Arc<str>>) {
        match self {
            Term::Var(name) => {
                out.insert(name.clone());
            }
            Term::Ctor(_, args) | Term::Call(_, args) => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
            Term::Bool(_) | Term::Int(_) | Term::Str(_) => {}
        }
    }

    pub fn var_set(&self) -> FxHashSet<Arc<str>> {
        let mut vars = FxHashSet::default();
        self.collect_vars(&mut vars);
        vars
    }

    /// Collect the variables that occur underneath a function call.
    ///
    /// These must all be bound before the term can be matched, because a call
    /// cannot be inverted.
    pub fn collect_call_vars(&self, out: &mut FxHashSet<Arc<str>>) {
        match self {
            Term::Call(..) => self.collect_vars(out),
            Term::Ctor(_, args) => {
                for arg in args {
                    arg.collect_call_vars(out);
                }
            }
            Term::Var(_) | Term::Bool(_) | Term::Int(_) | Term::Str(_) => {}
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Ctor(_, args) | Term::Call(_, args) => args.iter().all(Term::is_ground),
            Term::Bool(_) | Term::Int(_) | Term::Str(_) => true,
        }
    }

    pub fn contains_call(&self) -> bool {
        match self {
            Term::Call(..) => true,
            Term::Ctor(_, args) => args.iter().any(Term::contains_call),
            Term::Var(_) | Term::Bool(_) | Term::Int(_) | Term::Str(_) => false,
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Term]) -> fmt::Result {
    f.write_str("(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) => f.write_str(name),
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(n) => write!(f, "{n}"),
            Term::Str(s) => write!(f, "{s:?}"),
            Term::Ctor(name, args) if args.is_empty() => f.write_str(name),
            Term::Ctor(name, args) => {
                f.write_str(name)?;
                write_args(f, args)
            }
            Term::Call(name, args) => {
                write!(f, "@{name}")?;
                write_args(f, args)
            }
        }
    }
}

// ─── Literals and rules ─────────────────────────────────────────────

/// A relation applied to arguments, possibly negated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub symbol: RelationSymbol,
    pub args: Vec<Term>,
    pub negated: bool,
}

impl Atom {
    pub fn new(symbol: RelationSymbol, args: Vec<Term>) -> Self {
        Self {
            symbol,
            args,
            negated: false,
        }
    }

    pub fn negated(symbol: RelationSymbol, args: Vec<Term>) -> Self {
        Self {
            symbol,
            args,
            negated: true,
        }
    }

    pub fn var_set(&self) -> FxHashSet<Arc<str>> {
        let mut vars = FxHashSet::default();
        for arg in &self.args {
            arg.collect_vars(&mut vars);
        }
        vars
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        write!(f, "{}", self.symbol)?;
        write_args(f, &self.args)
    }
}

/// One conjunct of a rule body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// `lhs = rhs`, or `lhs != rhs` when negated.
    Unification { lhs: Term, rhs: Term, negated: bool },
    /// A lookup in a relation.
    Predicate(Atom),
}

impl Literal {
    pub fn eq(lhs: Term, rhs: Term) -> Self {
        Literal::Unification {
            lhs,
            rhs,
            negated: false,
        }
    }

    pub fn neq(lhs: Term, rhs: Term) -> Self {
        Literal::Unification {
            lhs,
            rhs,
            negated: true,
        }
    }

    pub fn is_negated(&self) -> bool {
        match self {
            Literal::Unification { negated, .. } => *negated,
            Literal::Predicate(atom) => atom.negated,
        }
    }

    /// The terms this literal mentions, in argument order.
    pub fn terms(&self) -> Vec<&Term> {
        match self {
            Literal::Unification { lhs, rhs, .. } => vec![lhs, rhs],
            Literal::Predicate(atom) => atom.args.iter().collect(),
        }
    }

    pub fn var_set(&self) -> FxHashSet<Arc<str>> {
        let mut vars = FxHashSet::default();
        for term in self.terms() {
            term.collect_vars(&mut vars);
        }
        vars
    }
}

impl From<Atom> for Literal {
    fn from(atom: Atom) -> Self {
        Literal::Predicate(atom)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Unification { lhs, rhs, negated } => {
                let op = if *negated { "!=" } else { "=" };
                write!(f, "{lhs} {op} {rhs}")
            }
            Literal::Predicate(atom) => write!(f, "{atom}"),
        }
    }
}

/// A rule: `head :- body`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<Literal>,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<Literal>) -> Self {
        Self { head, body }
    }

    /// Number of occurrences of each variable across head and body.
    pub fn var_counts(&self) -> FxHashMap<Arc<str>, usize> {
        fn walk(term: &Term, counts: &mut FxHashMap<Arc<str>, usize>) {
            match term {
                Term::Var(name) => *counts.entry(name.clone()).or_default() += 1,
                Term::Ctor(_, args) | Term::Call(_, args) => {
                    for arg in args {
                        walk(arg, counts);
                    }
                }
                Term::Bool(_) | Term::Int(_) | Term::Str(_) => {}
            }
        }

        let mut counts = FxHashMap::default();
        for arg in &self.head.args {
            walk(arg, &mut counts);
        }
        for literal in &self.body {
            for term in literal.terms() {
                walk(term, &mut counts);
            }
        }
        counts
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if self.body.is_empty() {
            return f.write_str(".");
        }
        f.write_str(" :-")?;
        for (i, literal) in self.body.iter().enumerate() {
            let sep = if i + 1 == self.body.len() { "." } else { "," };
            write!(f, "\n    {literal}{sep}")?;
        }
        Ok(())
    }
}

// ─── Programs ───────────────────────────────────────────────────────

/// A complete program: declared relations, base facts, rules and an optional
/// query atom.
#[derive(Debug, Clone, Default)]
pub struct Program {
    relations: Vec<RelationSymbol>,
    by_name: FxHashMap<Arc<str>, RelationSymbol>,
    facts: FxHashMap<RelationSymbol, Vec<Vec<Term>>>,
    rules: Vec<Rule>,
    query: Option<Atom>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a relation. Redeclaring with the same arity returns the
    /// existing symbol.
    pub fn declare(&mut self, name: &str, arity: usize) -> Result<RelationSymbol, IrError> {
        if let Some(existing) = self.by_name.get(name) {
            if existing.arity() != arity {
                return Err(IrError::DuplicateRelation {
                    name: name.to_string(),
                    first: existing.arity(),
                    second: arity,
                });
            }
            return Ok(existing.clone());
        }
        let symbol = RelationSymbol::new(name, arity);
        self.by_name.insert(symbol.name.clone(), symbol.clone());
        self.relations.push(symbol.clone());
        Ok(symbol)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSymbol> {
        self.by_name.get(name)
    }

    /// All declared relations, in declaration order.
    pub fn relations(&self) -> &[RelationSymbol] {
        &self.relations
    }

    fn check_atom(&self, symbol: &RelationSymbol, args: &[Term]) -> Result<(), IrError> {
        match self.by_name.get(symbol.name()) {
            Some(declared) if declared == symbol => {}
            Some(declared) => {
                return Err(IrError::ArityMismatch {
                    relation: symbol.name().to_string(),
                    expected: declared.arity(),
                    found: symbol.arity(),
                });
            }
            None => return Err(IrError::UnknownRelation(symbol.name().to_string())),
        }
        if args.len() != symbol.arity() {
            return Err(IrError::ArityMismatch {
                relation: symbol.name().to_string(),
                expected: symbol.arity(),
                found: args.len(),
            });
        }
        Ok(())
    }

    /// Add a base fact. Arguments must be ground; they may still contain
    /// function calls, which are evaluated when facts are loaded.
    pub fn add_fact(&mut self, symbol: &RelationSymbol, args: Vec<Term>) -> Result<(), IrError> {
        self.check_atom(symbol, &args)?;
        if !args.iter().all(Term::is_ground) {
            return Err(IrError::NonGroundFact(
                Atom::new(symbol.clone(), args).to_string(),
            ));
        }
        self.facts.entry(symbol.clone()).or_default().push(args);
        Ok(())
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<(), IrError> {
        self.check_atom(&rule.head.symbol, &rule.head.args)?;
        for literal in &rule.body {
            if let Literal::Predicate(atom) = literal {
                self.check_atom(&atom.symbol, &atom.args)?;
            }
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn set_query(&mut self, query: Atom) -> Result<(), IrError> {
        self.check_atom(&query.symbol, &query.args)?;
        self.query = Some(query);
        Ok(())
    }

    pub fn query(&self) -> Option<&Atom> {
        self.query.as_ref()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules whose head is `symbol`.
    pub fn rules_for<'a>(&'a self, symbol: &'a RelationSymbol) -> impl Iterator<Item = &'a Rule> {
        self.rules.iter().filter(move |r| &r.head.symbol == symbol)
    }

    /// Base facts of `symbol`.
    pub fn facts_for(&self, symbol: &RelationSymbol) -> &[Vec<Term>] {
        self.facts.get(symbol).map(Vec::as_slice).unwrap_or_default()
    }

    /// Base facts grouped by relation, in declaration order.
    pub fn facts(&self) -> impl Iterator<Item = (&RelationSymbol, &[Vec<Term>])> {
        self.relations
            .iter()
            .filter_map(|s| self.facts.get(s).map(|f| (s, f.as_slice())))
    }

    /// Relations defined by at least one rule, in declaration order.
    pub fn rule_symbols(&self) -> Vec<RelationSymbol> {
        let heads: FxHashSet<&RelationSymbol> = self.rules.iter().map(|r| &r.head.symbol).collect();
        self.relations
            .iter()
            .filter(|s| heads.contains(s))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_path() -> Program {
        let mut prog = Program::new();
        let edge = prog.declare("edge", 2).unwrap();
        let path = prog.declare("path", 2).unwrap();
        prog.add_fact(&edge, vec![Term::int(1), Term::int(2)]).unwrap();
        prog.add_rule(Rule::new(
            Atom::new(path.clone(), vec![Term::var("X"), Term::var("Y")]),
            vec![Atom::new(edge.clone(), vec![Term::var("X"), Term::var("Y")]).into()],
        ))
        .unwrap();
        prog.add_rule(Rule::new(
            Atom::new(path.clone(), vec![Term::var("X"), Term::var("Z")]),
            vec![
                Atom::new(edge, vec![Term::var("X"), Term::var("Y")]).into(),
                Atom::new(path, vec![Term::var("Y"), Term::var("Z")]).into(),
            ],
        ))
        .unwrap();
        prog
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut prog = Program::new();
        let a = prog.declare("edge", 2).unwrap();
        let b = prog.declare("edge", 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(prog.relations().len(), 1);
        assert!(matches!(
            prog.declare("edge", 3),
            Err(IrError::DuplicateRelation { first: 2, second: 3, .. })
        ));
    }

    #[test]
    fn test_fact_arity_checked() {
        let mut prog = Program::new();
        let edge = prog.declare("edge", 2).unwrap();
        let err = prog.add_fact(&edge, vec![Term::int(1)]).unwrap_err();
        assert!(matches!(
            err,
            IrError::ArityMismatch { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn test_non_ground_fact_rejected() {
        let mut prog = Program::new();
        let edge = prog.declare("edge", 2).unwrap();
        let err = prog
            .add_fact(&edge, vec![Term::int(1), Term::var("X")])
            .unwrap_err();
        assert!(matches!(err, IrError::NonGroundFact(_)));
    }

    #[test]
    fn test_undeclared_relation_rejected() {
        let mut prog = Program::new();
        let ghost = RelationSymbol::new("ghost", 1);
        assert!(matches!(
            prog.add_fact(&ghost, vec![Term::int(1)]),
            Err(IrError::UnknownRelation(_))
        ));
    }

    #[test]
    fn test_rule_symbols_follow_declaration_order() {
        let prog = edge_path();
        let names: Vec<_> = prog.rule_symbols().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["path"]);
        assert_eq!(prog.rules_for(&prog.rule_symbols()[0]).count(), 2);
        assert_eq!(prog.facts().count(), 1);
    }

    #[test]
    fn test_term_vars() {
        let t = Term::ctor(
            "pair",
            vec![Term::var("X"), Term::call("add", vec![Term::var("Y"), Term::int(1)])],
        );
        assert_eq!(t.var_set().len(), 2);
        assert!(!t.is_ground());
        assert!(t.contains_call());

        let mut call_vars = FxHashSet::default();
        t.collect_call_vars(&mut call_vars);
        assert_eq!(call_vars.len(), 1);
        assert!(call_vars.contains("Y"));
    }

    #[test]
    fn test_display() {
        let prog = edge_path();
        let rule = &prog.rules()[1];
        assert_eq!(
            rule.to_string(),
            "path(X, Z) :-\n    edge(X, Y),\n    path(Y, Z)."
        );
        let lit = Literal::neq(Term::call("add", vec![Term::var("X"), Term::int(1)]), Term::str("a"));
        assert_eq!(lit.to_string(), "@add(X, 1) != \"a\"");
        assert_eq!(Term::ctor("nil", vec![]).to_string(), "nil");
    }

    #[test]
    fn test_var_counts() {
        let prog = edge_path();
        let counts = prog.rules()[1].var_counts();
        assert_eq!(counts["X"], 2);
        assert_eq!(counts["Y"], 2);
        assert_eq!(counts["Z"], 2);
    }
}
