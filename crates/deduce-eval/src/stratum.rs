//! Fixpoint evaluation of a single stratum.

use std::sync::Arc;

use deduce_ir::{RelationSymbol, Stratum};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::compiled::IndexedRule;
use crate::db::IndexedFactDb;
use crate::error::EvalError;
use crate::eval::RuleEvaluator;
use crate::functions::FunctionRegistry;
use crate::pool::TaskPool;
use crate::terms::TermStore;

/// Counters for one evaluated stratum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StratumStats {
    pub rank: usize,
    /// New tuples per round. Eager evaluation records one entry for the
    /// initial pass and one per verification sweep.
    pub round_deltas: Vec<usize>,
    /// Verification sweeps run by eager evaluation.
    pub sweeps: usize,
    /// Tuples added to the main store by this stratum.
    pub derived: usize,
}

impl StratumStats {
    fn new(rank: usize) -> Self {
        Self {
            rank,
            ..Self::default()
        }
    }
}

/// State shared by both strategies.
pub(crate) struct StratumContext<'a> {
    pub(crate) stratum: &'a Stratum,
    pub(crate) rules: Vec<Arc<IndexedRule>>,
    pub(crate) terms: &'a Arc<TermStore>,
    pub(crate) functions: &'a Arc<FunctionRegistry>,
    pub(crate) db: &'a Arc<IndexedFactDb>,
    pub(crate) pool: &'a TaskPool,
    pub(crate) task_size: usize,
}

impl StratumContext<'_> {
    fn symbols(&self) -> impl Iterator<Item = &RelationSymbol> {
        self.stratum.symbols().iter()
    }

    fn run(
        &self,
        evaluator: &Arc<RuleEvaluator>,
        rules: impl IntoIterator<Item = Arc<IndexedRule>>,
    ) -> Result<(), EvalError> {
        for rule in rules {
            let evaluator = Arc::clone(evaluator);
            self.pool
                .spawn_fn(move |spawner| evaluator.evaluate(&rule, spawner));
        }
        self.pool.block_until_finished();
        match self.pool.failure_cause() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn delta_rules(&self) -> impl Iterator<Item = Arc<IndexedRule>> + '_ {
        self.rules
            .iter()
            .filter(|r| r.is_delta_rule())
            .map(Arc::clone)
    }
}

/// Semi-naive evaluation in synchronized rounds.
///
/// Round one runs every rule; later rounds run only the delta rules. Each
/// round reads the previous round's new tuples from `delta` and collects its
/// own in `next_delta`, which is then merged into the main store.
pub(crate) struct RoundBasedStratumEvaluator<'a> {
    pub(crate) ctx: StratumContext<'a>,
    pub(crate) delta: &'a mut Arc<IndexedFactDb>,
    pub(crate) next_delta: &'a mut Arc<IndexedFactDb>,
}

impl RoundBasedStratumEvaluator<'_> {
    pub(crate) fn evaluate(mut self) -> Result<StratumStats, EvalError> {
        let rank = self.ctx.stratum.rank();
        let mut stats = StratumStats::new(rank);

        self.seed();
        let mut round = 0;
        loop {
            round += 1;
            let new = self.round(round)?;
            debug!("stratum {rank} round {round}: {new} new tuples");
            stats.round_deltas.push(new);
            stats.derived += new;
            if new == 0 {
                break;
            }
        }
        self.delta.clear();
        Ok(stats)
    }

    /// Load every known fact of the stratum into `delta`.
    fn seed(&mut self) {
        self.delta.clear();
        self.next_delta.clear();
        for symbol in self.ctx.symbols() {
            self.delta.add_all(symbol, self.ctx.db.all(symbol).iter());
        }
    }

    /// Run one round and merge its tuples into the main store. Afterwards
    /// `delta` holds exactly the tuples the round derived.
    fn round(&mut self, round: usize) -> Result<usize, EvalError> {
        let ctx = &self.ctx;
        let evaluator = Arc::new(RuleEvaluator::round_based(
            Arc::clone(ctx.terms),
            Arc::clone(ctx.functions),
            Arc::clone(ctx.db),
            Arc::clone(&*self.delta),
            Arc::clone(&*self.next_delta),
            ctx.task_size,
        ));
        if round == 1 {
            ctx.run(&evaluator, ctx.rules.iter().cloned())?;
        } else {
            ctx.run(&evaluator, ctx.delta_rules())?;
        }
        drop(evaluator);

        std::mem::swap(&mut *self.delta, &mut *self.next_delta);
        self.next_delta.clear();
        let mut new = 0;
        for symbol in ctx.symbols() {
            new += ctx.db.add_all(symbol, self.delta.all(symbol).iter());
        }
        Ok(new)
    }
}

/// Semi-naive evaluation without rounds.
///
/// A derived tuple enters the main store at once and spawns the delta rules
/// reading its relation with the tuple bound. Sweeps that re-run every delta
/// rule over the whole store repeat until one adds nothing, which covers
/// tuples whose triggered rules ran before a concurrent insert was visible.
pub(crate) struct EagerStratumEvaluator<'a> {
    pub(crate) ctx: StratumContext<'a>,
}

impl EagerStratumEvaluator<'_> {
    pub(crate) fn evaluate(self) -> Result<StratumStats, EvalError> {
        let ctx = &self.ctx;
        let rank = ctx.stratum.rank();
        let mut stats = StratumStats::new(rank);

        let mut by_symbol: FxHashMap<RelationSymbol, Vec<Arc<IndexedRule>>> = FxHashMap::default();
        for rule in ctx.delta_rules() {
            if let Some(symbol) = rule.delta_symbol() {
                by_symbol.entry(symbol.clone()).or_default().push(Arc::clone(&rule));
            }
        }
        let evaluator = Arc::new(RuleEvaluator::eager(
            Arc::clone(ctx.terms),
            Arc::clone(ctx.functions),
            Arc::clone(ctx.db),
            by_symbol,
            ctx.task_size,
        ));

        ctx.run(&evaluator, ctx.rules.iter().cloned())?;
        let mut total = evaluator.derived();
        debug!("stratum {rank} eager pass: {total} new tuples");
        stats.round_deltas.push(total);

        loop {
            stats.sweeps += 1;
            ctx.run(&evaluator, ctx.delta_rules())?;
            let now = evaluator.derived();
            let added = now - total;
            total = now;
            trace!("stratum {rank} sweep {}: {added} new tuples", stats.sweeps);
            stats.round_deltas.push(added);
            if added == 0 {
                break;
            }
        }
        stats.derived = total;
        Ok(stats)
    }
}
