//! Rule evaluation.
//!
//! A [`RuleEvaluator`] runs compiled rules against the stores of one
//! stratum. The first scan of each rule is split into tasks on the pool; the
//! rest of the body is a nested loop with an undo-log substitution.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use deduce_ir::RelationSymbol;
use log::trace;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::compiled::{CAtom, CLiteral, CTerm, IndexedRule, QueryPattern};
use crate::db::{BindingType, IndexedFactDb, View};
use crate::error::EvalError;
use crate::functions::FunctionRegistry;
use crate::pool::Spawner;
use crate::terms::{GroundTerm, TermId, TermStore, Tuple};

// ─── Substitution ────────────────────────────────────────────────────────────

/// Variable bindings by slot, with a trail for cheap rollback.
#[derive(Debug, Clone)]
pub(crate) struct Substitution {
    slots: Vec<Option<TermId>>,
    trail: Vec<usize>,
}

impl Substitution {
    pub(crate) fn new(num_vars: usize) -> Self {
        Self {
            slots: vec![None; num_vars],
            trail: Vec::new(),
        }
    }

    pub(crate) fn get(&self, slot: usize) -> Option<TermId> {
        self.slots[slot]
    }

    fn bind(&mut self, slot: usize, value: TermId) {
        self.slots[slot] = Some(value);
        self.trail.push(slot);
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.trail.len()
    }

    /// Undo every binding made since `checkpoint`.
    pub(crate) fn rollback(&mut self, checkpoint: usize) {
        for slot in self.trail.drain(checkpoint..) {
            self.slots[slot] = None;
        }
    }
}

// ─── Terms ───────────────────────────────────────────────────────────────────

/// Evaluation and matching of compiled terms.
#[derive(Clone, Copy)]
pub(crate) struct TermEnv<'a> {
    pub(crate) terms: &'a TermStore,
    pub(crate) functions: &'a FunctionRegistry,
}

impl TermEnv<'_> {
    /// Evaluate a term whose variables are all bound.
    pub(crate) fn eval(&self, term: &CTerm, subst: &Substitution) -> Result<TermId, EvalError> {
        match term {
            CTerm::Var(slot) => subst
                .get(*slot)
                .ok_or_else(|| EvalError::NonGround(format!("variable slot {slot}"))),
            CTerm::Const(id) => Ok(*id),
            CTerm::Ctor(name, args) => {
                let ids = self.eval_args(args, subst)?;
                Ok(self.terms.intern(GroundTerm::Ctor(name.clone(), ids)))
            }
            CTerm::Call(name, args) => {
                let ids = self.eval_args(args, subst)?;
                self.functions.call(name, &ids, self.terms)
            }
        }
    }

    fn eval_args(
        &self,
        args: &[CTerm],
        subst: &Substitution,
    ) -> Result<SmallVec<[TermId; 4]>, EvalError> {
        args.iter().map(|a| self.eval(a, subst)).collect()
    }

    /// Match `term` against `value`, binding unbound variables. On failure
    /// some bindings may have been made; callers roll back.
    pub(crate) fn matches(
        &self,
        term: &CTerm,
        value: TermId,
        subst: &mut Substitution,
    ) -> Result<bool, EvalError> {
        match term {
            CTerm::Var(slot) => match subst.get(*slot) {
                Some(bound) => Ok(bound == value),
                None => {
                    subst.bind(*slot, value);
                    Ok(true)
                }
            },
            CTerm::Const(id) => Ok(*id == value),
            CTerm::Ctor(name, args) => match self.terms.resolve(value) {
                Some(GroundTerm::Ctor(other, values))
                    if other == *name && values.len() == args.len() =>
                {
                    for (arg, value) in args.iter().zip(values) {
                        if !self.matches(arg, value, subst)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
            CTerm::Call(..) => Ok(self.eval(term, subst)? == value),
        }
    }

    /// Match the columns of `tuple` read by `atom`. Bound columns are only
    /// compared when `check_bound` is set; a lookup has already matched them.
    fn matches_tuple(
        &self,
        atom: &CAtom,
        tuple: &[TermId],
        subst: &mut Substitution,
        check_bound: bool,
    ) -> Result<bool, EvalError> {
        for ((arg, ty), &value) in atom.args.iter().zip(atom.pattern.iter()).zip(tuple) {
            let skip = match ty {
                BindingType::Ignored => true,
                BindingType::Bound => !check_bound,
                BindingType::Free => false,
            };
            if !skip && !self.matches(arg, value, subst)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Whether `tuple` is an answer to `query`.
pub(crate) fn matches_query(
    env: TermEnv<'_>,
    query: &QueryPattern,
    tuple: &[TermId],
) -> Result<bool, EvalError> {
    let mut subst = Substitution::new(query.num_vars);
    for (arg, &value) in query.args.iter().zip(tuple) {
        if !env.matches(arg, value, &mut subst)? {
            return Ok(false);
        }
    }
    Ok(true)
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Where derived head tuples go.
pub(crate) enum Sink {
    /// Round-based: new tuples collect in the next delta.
    NextDelta(Arc<IndexedFactDb>),
    /// Eager: new tuples go straight into the main store and trigger the
    /// delta rules reading their relation.
    Eager(FxHashMap<RelationSymbol, Vec<Arc<IndexedRule>>>),
}

pub(crate) struct RuleEvaluator {
    terms: Arc<TermStore>,
    functions: Arc<FunctionRegistry>,
    db: Arc<IndexedFactDb>,
    /// Store read by delta literals. Eager evaluation reads the main store.
    delta: Option<Arc<IndexedFactDb>>,
    sink: Sink,
    task_size: usize,
    derived: AtomicUsize,
}

impl RuleEvaluator {
    pub(crate) fn round_based(
        terms: Arc<TermStore>,
        functions: Arc<FunctionRegistry>,
        db: Arc<IndexedFactDb>,
        delta: Arc<IndexedFactDb>,
        next_delta: Arc<IndexedFactDb>,
        task_size: usize,
    ) -> Self {
        Self {
            terms,
            functions,
            db,
            delta: Some(delta),
            sink: Sink::NextDelta(next_delta),
            task_size,
            derived: AtomicUsize::new(0),
        }
    }

    pub(crate) fn eager(
        terms: Arc<TermStore>,
        functions: Arc<FunctionRegistry>,
        db: Arc<IndexedFactDb>,
        delta_rules: FxHashMap<RelationSymbol, Vec<Arc<IndexedRule>>>,
        task_size: usize,
    ) -> Self {
        Self {
            terms,
            functions,
            db,
            delta: None,
            sink: Sink::Eager(delta_rules),
            task_size,
            derived: AtomicUsize::new(0),
        }
    }

    /// Number of new tuples reported so far.
    pub(crate) fn derived(&self) -> usize {
        self.derived.load(Ordering::Acquire)
    }

    fn env(&self) -> TermEnv<'_> {
        TermEnv {
            terms: &self.terms,
            functions: &self.functions,
        }
    }

    /// Evaluate `rule` against the current stores, splitting its first scan
    /// over tasks of at most `task_size` tuples.
    pub(crate) fn evaluate(
        self: &Arc<Self>,
        rule: &Arc<IndexedRule>,
        spawner: &Spawner,
    ) -> Result<(), EvalError> {
        let mut subst = Substitution::new(rule.num_vars);
        let Some(pos) = rule.first_scan else {
            return self.eval_body(rule, 0, &mut subst, spawner);
        };
        if !self.eval_prefix(rule, pos, &mut subst)? {
            return Ok(());
        }
        let view = self.lookup(scan_atom(rule, pos), &subst)?;
        self.spawn_scan(Arc::clone(rule), pos, subst, view, spawner);
        Ok(())
    }

    /// Evaluate a delta rule with its delta literal bound to `tuple`.
    pub(crate) fn evaluate_with_fact(
        self: &Arc<Self>,
        rule: &IndexedRule,
        tuple: &[TermId],
        spawner: &Spawner,
    ) -> Result<(), EvalError> {
        let Some(pos) = rule.delta_position() else {
            return Ok(());
        };
        let mut subst = Substitution::new(rule.num_vars);
        if !self.eval_prefix(rule, pos, &mut subst)? {
            return Ok(());
        }
        if !self
            .env()
            .matches_tuple(scan_atom(rule, pos), tuple, &mut subst, true)?
        {
            return Ok(());
        }
        self.eval_body(rule, pos + 1, &mut subst, spawner)
    }

    fn spawn_scan(
        self: &Arc<Self>,
        rule: Arc<IndexedRule>,
        pos: usize,
        subst: Substitution,
        view: View,
        spawner: &Spawner,
    ) {
        let this = Arc::clone(self);
        spawner.spawn_fn(move |spawner| {
            if view.len() > this.task_size
                && let Some((left, right)) = view.split()
            {
                this.spawn_scan(Arc::clone(&rule), pos, subst.clone(), left, spawner);
                this.spawn_scan(rule, pos, subst, right, spawner);
                return Ok(());
            }
            let mut subst = subst;
            this.scan(&rule, pos, &view, &mut subst, spawner)
        });
    }

    /// Run the filters in front of position `end`, keeping their bindings.
    fn eval_prefix(
        &self,
        rule: &IndexedRule,
        end: usize,
        subst: &mut Substitution,
    ) -> Result<bool, EvalError> {
        for literal in &rule.body[..end] {
            if !self.filter(literal, subst)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn scan(
        self: &Arc<Self>,
        rule: &IndexedRule,
        pos: usize,
        view: &View,
        subst: &mut Substitution,
        spawner: &Spawner,
    ) -> Result<(), EvalError> {
        let atom = scan_atom(rule, pos);
        let env = self.env();
        for tuple in view {
            let checkpoint = subst.checkpoint();
            if env.matches_tuple(atom, &tuple, subst, false)? {
                self.eval_body(rule, pos + 1, subst, spawner)?;
            }
            subst.rollback(checkpoint);
        }
        Ok(())
    }

    fn eval_body(
        self: &Arc<Self>,
        rule: &IndexedRule,
        pos: usize,
        subst: &mut Substitution,
        spawner: &Spawner,
    ) -> Result<(), EvalError> {
        let Some(literal) = rule.body.get(pos) else {
            return self.report(rule, subst, spawner);
        };
        if let CLiteral::Scan(atom) = literal {
            let view = self.lookup(atom, subst)?;
            return self.scan(rule, pos, &view, subst, spawner);
        }
        let checkpoint = subst.checkpoint();
        if self.filter(literal, subst)? {
            self.eval_body(rule, pos + 1, subst, spawner)?;
        }
        subst.rollback(checkpoint);
        Ok(())
    }

    /// Evaluate a literal that yields at most one extension of `subst`.
    fn filter(&self, literal: &CLiteral, subst: &mut Substitution) -> Result<bool, EvalError> {
        let env = self.env();
        match literal {
            CLiteral::Unify { eval, pattern } => {
                let value = env.eval(eval, subst)?;
                env.matches(pattern, value, subst)
            }
            CLiteral::Disunify { lhs, rhs } => Ok(env.eval(lhs, subst)? != env.eval(rhs, subst)?),
            CLiteral::Absent(atom) => Ok(self.lookup(atom, subst)?.is_empty()),
            CLiteral::Scan(_) => unreachable!("positive predicates are scanned, not filtered"),
        }
    }

    fn lookup(&self, atom: &CAtom, subst: &Substitution) -> Result<View, EvalError> {
        let env = self.env();
        let key: SmallVec<[TermId; 4]> = atom
            .bound_args()
            .map(|arg| env.eval(arg, subst))
            .collect::<Result<_, _>>()?;
        let store = match (&self.delta, atom.delta) {
            (Some(delta), true) => delta,
            _ => &self.db,
        };
        Ok(store.get(&atom.symbol, &key, atom.index))
    }

    fn report(
        self: &Arc<Self>,
        rule: &IndexedRule,
        subst: &Substitution,
        spawner: &Spawner,
    ) -> Result<(), EvalError> {
        let env = self.env();
        let tuple: Tuple = rule
            .head
            .iter()
            .map(|arg| env.eval(arg, subst))
            .collect::<Result<Vec<_>, _>>()?
            .into();
        let symbol = rule.head_symbol();
        match &self.sink {
            Sink::NextDelta(next_delta) => {
                if !self.db.has_fact(symbol, &tuple) && next_delta.add(symbol, tuple) {
                    self.derived.fetch_add(1, Ordering::AcqRel);
                }
            }
            Sink::Eager(delta_rules) => {
                if !self.db.add(symbol, Arc::clone(&tuple)) {
                    return Ok(());
                }
                self.derived.fetch_add(1, Ordering::AcqRel);
                trace!("derived {}{}", symbol, self.terms.render_tuple(&tuple));
                for rule in delta_rules.get(symbol).into_iter().flatten() {
                    let this = Arc::clone(self);
                    let rule = Arc::clone(rule);
                    let tuple = Arc::clone(&tuple);
                    spawner.spawn_fn(move |spawner| this.evaluate_with_fact(&rule, &tuple, spawner));
                }
            }
        }
        Ok(())
    }
}

fn scan_atom(rule: &IndexedRule, pos: usize) -> &CAtom {
    match &rule.body[pos] {
        CLiteral::Scan(atom) => atom,
        _ => unreachable!("scan position does not hold a positive predicate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution_rollback() {
        let mut subst = Substitution::new(3);
        subst.bind(0, TermId::from_raw(7));
        let cp = subst.checkpoint();
        subst.bind(1, TermId::from_raw(8));
        subst.bind(2, TermId::from_raw(9));
        subst.rollback(cp);
        assert_eq!(subst.get(0), Some(TermId::from_raw(7)));
        assert_eq!(subst.get(1), None);
        assert_eq!(subst.get(2), None);
        assert_eq!(subst.checkpoint(), 1);
    }

    #[test]
    fn test_match_constructor_binds_subterms() {
        let terms = TermStore::new();
        let functions = FunctionRegistry::with_builtins();
        let env = TermEnv {
            terms: &terms,
            functions: &functions,
        };
        let one = terms.int(1);
        let two = terms.int(2);
        let value = terms.ctor("pair", &[one, two]);

        let pattern = CTerm::Ctor("pair".into(), vec![CTerm::Var(0), CTerm::Const(two)].into());
        let mut subst = Substitution::new(1);
        assert!(env.matches(&pattern, value, &mut subst).unwrap());
        assert_eq!(subst.get(0), Some(one));

        let other = CTerm::Ctor("pair".into(), vec![CTerm::Var(0), CTerm::Const(one)].into());
        let mut subst = Substitution::new(1);
        assert!(!env.matches(&other, value, &mut subst).unwrap());
        assert!(!env.matches(&pattern, one, &mut Substitution::new(1)).unwrap());
    }

    #[test]
    fn test_call_in_pattern_is_evaluated() {
        let terms = TermStore::new();
        let functions = FunctionRegistry::with_builtins();
        let env = TermEnv {
            terms: &terms,
            functions: &functions,
        };
        let call = CTerm::Call("add".into(), vec![CTerm::Var(0), CTerm::Const(terms.int(1))].into());
        let mut subst = Substitution::new(1);
        subst.bind(0, terms.int(41));
        assert!(env.matches(&call, terms.int(42), &mut subst).unwrap());
        assert!(!env.matches(&call, terms.int(41), &mut subst).unwrap());
        assert!(matches!(
            env.eval(&CTerm::Var(0), &Substitution::new(1)),
            Err(EvalError::NonGround(_))
        ));
    }
}
