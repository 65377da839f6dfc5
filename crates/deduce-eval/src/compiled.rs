//! Rules compiled against a fact store.
//!
//! Compilation resolves variables to substitution slots, interns ground
//! subterms, fixes the binding pattern of every predicate and registers the
//! index each one will be looked up through.

use std::fmt;
use std::sync::Arc;

use deduce_ir::{Atom, Literal, RelationSymbol, Term};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::db::BindingType;
use crate::error::{EvalError, SetupError};
use crate::functions::FunctionRegistry;
use crate::ordering::{ValidRule, VarSet, is_singleton};
use crate::terms::{GroundTerm, TermId, TermStore};

/// A term whose variables are substitution slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CTerm {
    Var(usize),
    Const(TermId),
    Ctor(Arc<str>, Box<[CTerm]>),
    Call(Arc<str>, Box<[CTerm]>),
}

/// A predicate together with the index it reads.
#[derive(Debug, Clone)]
pub(crate) struct CAtom {
    pub(crate) symbol: RelationSymbol,
    pub(crate) args: Box<[CTerm]>,
    pub(crate) pattern: Box<[BindingType]>,
    pub(crate) index: usize,
    pub(crate) delta: bool,
}

impl CAtom {
    /// Arguments in bound columns, in column order.
    pub(crate) fn bound_args(&self) -> impl Iterator<Item = &CTerm> {
        self.args
            .iter()
            .zip(self.pattern.iter())
            .filter(|(_, ty)| **ty == BindingType::Bound)
            .map(|(arg, _)| arg)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CLiteral {
    /// Evaluate `eval`, then match the value against `pattern`.
    Unify { eval: CTerm, pattern: CTerm },
    /// Both sides are ground; succeed when they differ.
    Disunify { lhs: CTerm, rhs: CTerm },
    /// Enumerate the tuples matching a positive predicate.
    Scan(CAtom),
    /// Succeed when no tuple matches a negated predicate.
    Absent(CAtom),
}

/// A rule ready for evaluation.
#[derive(Debug)]
pub struct IndexedRule {
    head_symbol: RelationSymbol,
    pub(crate) head: Box<[CTerm]>,
    pub(crate) body: Vec<CLiteral>,
    pub(crate) num_vars: usize,
    pub(crate) first_scan: Option<usize>,
    delta: Option<usize>,
    source: ValidRule,
}

struct Compiler<'a> {
    terms: &'a TermStore,
    functions: &'a FunctionRegistry,
    slots: FxHashMap<Arc<str>, usize>,
    counts: FxHashMap<Arc<str>, usize>,
    bound: VarSet,
    text: &'a dyn fmt::Display,
}

impl Compiler<'_> {
    fn slot(&mut self, name: &Arc<str>) -> usize {
        let next = self.slots.len();
        *self.slots.entry(name.clone()).or_insert(next)
    }

    fn term(&mut self, term: &Term) -> Result<CTerm, SetupError> {
        Ok(match term {
            Term::Var(name) => CTerm::Var(self.slot(name)),
            Term::Bool(b) => CTerm::Const(self.terms.bool(*b)),
            Term::Int(n) => CTerm::Const(self.terms.int(*n)),
            Term::Str(s) => CTerm::Const(self.terms.intern(GroundTerm::Str(s.clone()))),
            Term::Ctor(name, args) => {
                let args = self.terms_of(args)?;
                let consts: Option<SmallVec<[TermId; 4]>> = args
                    .iter()
                    .map(|arg| match arg {
                        CTerm::Const(id) => Some(*id),
                        _ => None,
                    })
                    .collect();
                match consts {
                    Some(ids) => CTerm::Const(self.terms.intern(GroundTerm::Ctor(name.clone(), ids))),
                    None => CTerm::Ctor(name.clone(), args),
                }
            }
            Term::Call(name, args) => {
                if !self.functions.contains(name) {
                    return Err(SetupError::UnknownFunction {
                        function: name.to_string(),
                        rule: self.text.to_string(),
                    });
                }
                CTerm::Call(name.clone(), self.terms_of(args)?)
            }
        })
    }

    fn terms_of(&mut self, terms: &[Term]) -> Result<Box<[CTerm]>, SetupError> {
        terms.iter().map(|t| self.term(t)).collect()
    }

    fn binding(&self, arg: &Term) -> BindingType {
        if arg.var_set().is_subset(&self.bound) {
            BindingType::Bound
        } else if is_singleton(arg, &self.counts) {
            BindingType::Ignored
        } else {
            BindingType::Free
        }
    }

    fn atom<F>(&mut self, atom: &Atom, delta: bool, make_index: &mut F) -> Result<CAtom, SetupError>
    where
        F: FnMut(&RelationSymbol, &[BindingType], bool) -> Result<usize, SetupError>,
    {
        if atom.args.len() != atom.symbol.arity() {
            return Err(SetupError::ArityMismatch {
                relation: atom.symbol.name().to_string(),
                expected: atom.symbol.arity(),
                found: atom.args.len(),
            });
        }
        let pattern: Box<[BindingType]> = atom.args.iter().map(|a| self.binding(a)).collect();
        let args = self.terms_of(&atom.args)?;
        let index = make_index(&atom.symbol, &pattern, delta)?;
        Ok(CAtom {
            symbol: atom.symbol.clone(),
            args,
            pattern,
            index,
            delta,
        })
    }
}

impl IndexedRule {
    /// Compile an ordered rule. `make_index` registers a binding pattern for
    /// a relation and returns the index id; its last argument tells whether
    /// the lookup reads a delta.
    pub(crate) fn compile<F>(
        rule: ValidRule,
        terms: &TermStore,
        functions: &FunctionRegistry,
        mut make_index: F,
    ) -> Result<Self, SetupError>
    where
        F: FnMut(&RelationSymbol, &[BindingType], bool) -> Result<usize, SetupError>,
    {
        let mut c = Compiler {
            terms,
            functions,
            slots: FxHashMap::default(),
            counts: rule.var_counts(),
            bound: VarSet::default(),
            text: &rule,
        };

        let mut body = Vec::with_capacity(rule.body.len());
        for literal in &rule.body {
            let compiled = match &literal.literal {
                Literal::Unification {
                    lhs,
                    rhs,
                    negated: true,
                } => CLiteral::Disunify {
                    lhs: c.term(lhs)?,
                    rhs: c.term(rhs)?,
                },
                Literal::Unification {
                    lhs,
                    rhs,
                    negated: false,
                } => {
                    let (eval, pattern) = if lhs.var_set().is_subset(&c.bound) {
                        (lhs, rhs)
                    } else {
                        (rhs, lhs)
                    };
                    CLiteral::Unify {
                        eval: c.term(eval)?,
                        pattern: c.term(pattern)?,
                    }
                }
                Literal::Predicate(atom) => {
                    let compiled = c.atom(atom, literal.delta, &mut make_index)?;
                    if atom.negated {
                        CLiteral::Absent(compiled)
                    } else {
                        CLiteral::Scan(compiled)
                    }
                }
            };
            c.bound.extend(literal.literal.var_set());
            body.push(compiled);
        }

        let head = c.terms_of(&rule.head.args)?;
        let num_vars = c.slots.len();
        let first_scan = body.iter().position(|l| matches!(l, CLiteral::Scan(_)));
        let delta = rule.delta_position();
        Ok(Self {
            head_symbol: rule.head.symbol.clone(),
            head,
            body,
            num_vars,
            first_scan,
            delta,
            source: rule,
        })
    }

    pub fn head_symbol(&self) -> &RelationSymbol {
        &self.head_symbol
    }

    /// Position of the delta literal in the ordered body.
    pub fn delta_position(&self) -> Option<usize> {
        self.delta
    }

    pub fn is_delta_rule(&self) -> bool {
        self.delta.is_some()
    }

    /// Symbol read by the delta literal.
    pub fn delta_symbol(&self) -> Option<&RelationSymbol> {
        match &self.body[self.delta?] {
            CLiteral::Scan(atom) => Some(&atom.symbol),
            _ => None,
        }
    }

    /// The ordered rule this was compiled from.
    pub fn source(&self) -> &ValidRule {
        &self.source
    }
}

/// The rule in body order, each predicate annotated with its index id and
/// binding pattern.
impl fmt::Display for IndexedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.head)?;
        if self.body.is_empty() {
            return f.write_str(".");
        }
        f.write_str(" :-")?;
        let last = self.body.len() - 1;
        for (i, (literal, compiled)) in self.source.body.iter().zip(&self.body).enumerate() {
            write!(f, "\n    {literal}")?;
            if let CLiteral::Scan(atom) | CLiteral::Absent(atom) = compiled {
                let pattern: String = atom
                    .pattern
                    .iter()
                    .map(|b| match b {
                        BindingType::Bound => 'b',
                        BindingType::Free => 'f',
                        BindingType::Ignored => '_',
                    })
                    .collect();
                write!(f, " <#{} {pattern}>", atom.index)?;
            }
            f.write_str(if i == last { "." } else { "," })?;
        }
        Ok(())
    }
}

/// A query atom compiled for filtering the tuples of its relation.
#[derive(Debug, Clone)]
pub(crate) struct QueryPattern {
    pub(crate) symbol: RelationSymbol,
    pub(crate) args: Box<[CTerm]>,
    pub(crate) num_vars: usize,
}

impl QueryPattern {
    pub(crate) fn compile(
        atom: &Atom,
        terms: &TermStore,
        functions: &FunctionRegistry,
    ) -> Result<Self, SetupError> {
        let mut c = Compiler {
            terms,
            functions,
            slots: FxHashMap::default(),
            counts: FxHashMap::default(),
            bound: VarSet::default(),
            text: atom,
        };
        if atom.args.len() != atom.symbol.arity() {
            return Err(SetupError::ArityMismatch {
                relation: atom.symbol.name().to_string(),
                expected: atom.symbol.arity(),
                found: atom.args.len(),
            });
        }
        let args = c.terms_of(&atom.args)?;
        Ok(Self {
            symbol: atom.symbol.clone(),
            args,
            num_vars: c.slots.len(),
        })
    }
}

/// Evaluate a ground term of the input program.
pub(crate) fn normalize(
    term: &Term,
    terms: &TermStore,
    functions: &FunctionRegistry,
) -> Result<TermId, EvalError> {
    let args_of = |args: &[Term]| -> Result<SmallVec<[TermId; 4]>, EvalError> {
        args.iter().map(|a| normalize(a, terms, functions)).collect()
    };
    match term {
        Term::Var(name) => Err(EvalError::NonGround(name.to_string())),
        Term::Bool(b) => Ok(terms.bool(*b)),
        Term::Int(n) => Ok(terms.int(*n)),
        Term::Str(s) => Ok(terms.intern(GroundTerm::Str(s.clone()))),
        Term::Ctor(name, args) => Ok(terms.intern(GroundTerm::Ctor(name.clone(), args_of(args)?))),
        Term::Call(name, args) => functions.call(name, &args_of(args)?, terms),
    }
}
