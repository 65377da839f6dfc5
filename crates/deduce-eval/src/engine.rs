//! Semi-naive evaluation of a whole program.
//!
//! [`SemiNaiveEvaluation::setup`] validates and compiles every rule, builds
//! the stores and loads the base facts. [`SemiNaiveEvaluation::run`] then
//! evaluates the strata in order, each to its fixpoint.

use std::sync::Arc;

use deduce_ir::{Atom, Program, RelationSymbol, Stratum, stratify};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::compiled::{IndexedRule, QueryPattern, normalize};
use crate::config::EvalConfig;
use crate::db::{IndexedFactDb, IndexedFactDbBuilder, View};
use crate::error::{Error, EvalError, Result, SetupError};
use crate::eval::{TermEnv, matches_query};
use crate::functions::FunctionRegistry;
use crate::ordering::ValidRule;
use crate::pool::TaskPool;
use crate::semi_naive::{check_delta_first, isolate_delta_calls, specialize};
use crate::stratum::{
    EagerStratumEvaluator, RoundBasedStratumEvaluator, StratumContext, StratumStats,
};
use crate::terms::{GroundTerm, TermId, TermStore, Tuple};

/// Store diagnostics for one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationStats {
    pub distinct: usize,
    /// Entries summed over every index of the relation.
    pub duplicates: usize,
    pub indices: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationStats {
    pub strata: Vec<StratumStats>,
}

impl EvaluationStats {
    /// Tuples derived across all strata.
    pub fn derived(&self) -> usize {
        self.strata.iter().map(|s| s.derived).sum()
    }
}

/// Owns the stores, compiled rules, strata and task pool of one evaluation.
pub struct SemiNaiveEvaluation {
    config: EvalConfig,
    terms: Arc<TermStore>,
    functions: Arc<FunctionRegistry>,
    db: Arc<IndexedFactDb>,
    delta: Arc<IndexedFactDb>,
    next_delta: Arc<IndexedFactDb>,
    rules: FxHashMap<RelationSymbol, Vec<Arc<IndexedRule>>>,
    strata: Vec<Stratum>,
    by_name: FxHashMap<Arc<str>, RelationSymbol>,
    query: Option<QueryPattern>,
    pool: TaskPool,
    stats: Option<EvaluationStats>,
}

impl SemiNaiveEvaluation {
    /// Stratify `program` and set it up.
    pub fn from_program(
        program: &Program,
        functions: FunctionRegistry,
        config: EvalConfig,
    ) -> Result<Self> {
        Self::setup(program, stratify(program), functions, config)
    }

    /// Compile the rules of every stratum, build the stores and load the
    /// base facts of `program`.
    pub fn setup(
        program: &Program,
        strata: Vec<Stratum>,
        functions: FunctionRegistry,
        config: EvalConfig,
    ) -> Result<Self> {
        let eager = config.eager;
        let optimization = config.effective_optimization();
        let terms = Arc::new(TermStore::new());

        let mut db_builder = IndexedFactDbBuilder::new(program.relations().iter().cloned());
        let mut delta_builder = IndexedFactDbBuilder::new(program.rule_symbols());
        let mut rules = FxHashMap::default();

        for stratum in &strata {
            if stratum.has_recursive_negation() {
                let relations: Vec<&str> = stratum.symbols().iter().map(|s| s.name()).collect();
                return Err(SetupError::UnsafeStratum {
                    rank: stratum.rank(),
                    relations: relations.join(", "),
                }
                .into());
            }
            debug!("setting up {stratum}");
            for symbol in stratum.symbols() {
                let mut compiled = Vec::new();
                for rule in program.rules_for(symbol) {
                    for variant in specialize(rule, stratum) {
                        let variant = if eager {
                            isolate_delta_calls(variant)
                        } else {
                            variant
                        };
                        let valid = ValidRule::make(variant, optimization)?;
                        if eager {
                            check_delta_first(&valid)?;
                        }
                        let indexed =
                            IndexedRule::compile(valid, &terms, &functions, |sym, pattern, delta| {
                                if delta && !eager {
                                    delta_builder.make_index(sym, pattern)
                                } else {
                                    db_builder.make_index(sym, pattern)
                                }
                            })?;
                        debug!("final rule:\n{indexed}");
                        compiled.push(Arc::new(indexed));
                    }
                }
                rules.insert(symbol.clone(), compiled);
            }
        }

        let query = program
            .query()
            .map(|atom| QueryPattern::compile(atom, &terms, &functions))
            .transpose()?;

        let by_name: FxHashMap<Arc<str>, RelationSymbol> = program
            .relations()
            .iter()
            .map(|s| (Arc::from(s.name()), s.clone()))
            .collect();
        for name in &config.tracked_relations {
            if !by_name.contains_key(name.as_str()) {
                warn!("tracked relation `{name}` is not declared");
            }
        }

        let pool = TaskPool::new(&config)?;
        let eval = Self {
            db: Arc::new(db_builder.build(&config)),
            delta: Arc::new(delta_builder.build(&config)),
            next_delta: Arc::new(delta_builder.build(&config)),
            terms,
            functions: Arc::new(functions),
            rules,
            strata,
            by_name,
            query,
            pool,
            stats: None,
            config,
        };
        eval.load_facts(program)?;
        Ok(eval)
    }

    /// Normalize and insert the base facts, in batches of `task_size`.
    fn load_facts(&self, program: &Program) -> Result<()> {
        let mut total = 0;
        for (symbol, facts) in program.facts() {
            total += facts.len();
            for batch in facts.chunks(self.config.task_size.max(1)) {
                let batch = batch.to_vec();
                let symbol = symbol.clone();
                let terms = Arc::clone(&self.terms);
                let functions = Arc::clone(&self.functions);
                let db = Arc::clone(&self.db);
                self.pool.spawn_fn(move |_| {
                    for args in &batch {
                        let tuple = args
                            .iter()
                            .map(|arg| normalize(arg, &terms, &functions))
                            .collect::<std::result::Result<Vec<TermId>, _>>()
                            .map_err(|source| EvalError::Normalize {
                                fact: Atom::new(symbol.clone(), args.clone()).to_string(),
                                source: Box::new(source),
                            })?;
                        db.add(&symbol, tuple.into());
                    }
                    Ok(())
                });
            }
        }
        self.pool.block_until_finished();
        match self.pool.failure_cause() {
            Some(err) => Err(Error::Load(err)),
            None => {
                debug!("loaded {total} base facts");
                Ok(())
            }
        }
    }

    /// Evaluate every stratum to its fixpoint. Only the first call does any
    /// work; later calls return the recorded stats.
    pub fn run(&mut self) -> Result<&EvaluationStats> {
        let stats = match self.stats.take() {
            Some(stats) => stats,
            None => self.evaluate_strata()?,
        };
        Ok(self.stats.insert(stats))
    }

    fn evaluate_strata(&mut self) -> Result<EvaluationStats> {
        let mut stats = EvaluationStats::default();
        for stratum in &self.strata {
            let rules: Vec<Arc<IndexedRule>> = stratum
                .symbols()
                .iter()
                .filter_map(|s| self.rules.get(s))
                .flatten()
                .cloned()
                .collect();
            let ctx = StratumContext {
                stratum,
                rules,
                terms: &self.terms,
                functions: &self.functions,
                db: &self.db,
                pool: &self.pool,
                task_size: self.config.task_size.max(1),
            };
            let result = if self.config.eager {
                EagerStratumEvaluator { ctx }.evaluate()
            } else {
                RoundBasedStratumEvaluator {
                    ctx,
                    delta: &mut self.delta,
                    next_delta: &mut self.next_delta,
                }
                .evaluate()
            };
            let stratum_stats = result.map_err(Error::Evaluation)?;
            debug!(
                "{stratum}: {} new tuples in {} rounds",
                stratum_stats.derived,
                stratum_stats.round_deltas.len()
            );
            for symbol in stratum.symbols() {
                debug!("  {symbol}: {} tuples", self.db.count_distinct(symbol));
            }
            self.log_tracked(stratum);
            stats.strata.push(stratum_stats);
        }
        Ok(stats)
    }

    fn log_tracked(&self, stratum: &Stratum) {
        for name in &self.config.tracked_relations {
            let Some(symbol) = self.by_name.get(name.as_str()) else {
                continue;
            };
            if !stratum.contains(symbol) {
                continue;
            }
            for tuple in self.result().rendered(symbol) {
                info!("[{symbol}] {tuple}");
            }
        }
    }

    pub fn result(&self) -> EvaluationResult<'_> {
        EvaluationResult { eval: self }
    }

    /// Stats of the completed run, if any.
    pub fn stats(&self) -> Option<&EvaluationStats> {
        self.stats.as_ref()
    }

    /// Compiled rules deriving `symbol`.
    pub fn rules(&self, symbol: &RelationSymbol) -> &[Arc<IndexedRule>] {
        self.rules.get(symbol).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn strata(&self) -> &[Stratum] {
        &self.strata
    }

    pub fn db(&self) -> &IndexedFactDb {
        &self.db
    }

    pub fn terms(&self) -> &TermStore {
        &self.terms
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }
}

/// Read access to the facts of an evaluation.
#[derive(Clone, Copy)]
pub struct EvaluationResult<'a> {
    eval: &'a SemiNaiveEvaluation,
}

impl<'a> EvaluationResult<'a> {
    pub fn symbol(&self, name: &str) -> Option<&'a RelationSymbol> {
        self.eval.by_name.get(name)
    }

    pub fn all(&self, symbol: &RelationSymbol) -> View {
        self.eval.db.all(symbol)
    }

    /// Every tuple of the relation named `name`.
    pub fn relation(&self, name: &str) -> Option<View> {
        self.symbol(name).map(|s| self.all(s))
    }

    /// Tuples of the query relation that match the query atom, or `None`
    /// when the program has no query.
    pub fn query_answer(&self) -> std::result::Result<Option<Vec<Tuple>>, EvalError> {
        let Some(query) = &self.eval.query else {
            return Ok(None);
        };
        let env = TermEnv {
            terms: &self.eval.terms,
            functions: &self.eval.functions,
        };
        let mut answer = Vec::new();
        for tuple in &self.all(&query.symbol) {
            if matches_query(env, query, &tuple)? {
                answer.push(tuple);
            }
        }
        Ok(Some(answer))
    }

    pub fn query_symbol(&self) -> Option<&'a RelationSymbol> {
        self.eval.query.as_ref().map(|q| &q.symbol)
    }

    pub fn decode(&self, tuple: &[TermId]) -> Vec<GroundTerm> {
        tuple
            .iter()
            .filter_map(|&id| self.eval.terms.resolve(id))
            .collect()
    }

    pub fn render(&self, tuple: &[TermId]) -> String {
        self.eval.terms.render_tuple(tuple)
    }

    /// The relation's tuples, rendered and sorted by value.
    pub fn rendered(&self, symbol: &RelationSymbol) -> Vec<String> {
        self.sorted(self.all(symbol).to_vec())
    }

    /// Sort `tuples` by value and render them.
    pub fn sorted(&self, tuples: Vec<Tuple>) -> Vec<String> {
        let mut decoded: Vec<(Vec<GroundTerm>, Tuple)> = tuples
            .into_iter()
            .map(|t| (self.decode(&t), t))
            .collect();
        decoded.sort();
        decoded.into_iter().map(|(_, t)| self.render(&t)).collect()
    }

    pub fn relation_stats(&self, symbol: &RelationSymbol) -> RelationStats {
        let db = &self.eval.db;
        RelationStats {
            distinct: db.count_distinct(symbol),
            duplicates: db.count_duplicates(symbol),
            indices: db.num_indices(symbol),
        }
    }

    pub fn terms(&self) -> &'a TermStore {
        &self.eval.terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Optimization;
    use deduce_ir::source::parse_program;
    use deduce_ir::{Literal, Rule, Term};
    use std::collections::BTreeSet;

    const EDGE_PATH: &str = r#"{
        "relations": [{ "name": "edge", "arity": 2 }, { "name": "path", "arity": 2 }],
        "facts": { "edge": [[1, 2], [2, 3], [3, 4]] },
        "rules": [
            { "head": { "rel": "path", "args": ["X", "Y"] },
              "body": [{ "rel": "edge", "args": ["X", "Y"] }] },
            { "head": { "rel": "path", "args": ["X", "Z"] },
              "body": [{ "rel": "edge", "args": ["X", "Y"] },
                       { "rel": "path", "args": ["Y", "Z"] }] }
        ],
        "query": { "rel": "path", "args": [1, "Y"] }
    }"#;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn configs() -> Vec<EvalConfig> {
        let small = |c: EvalConfig| c.with_task_size(2).with_max_array_size(3);
        vec![
            EvalConfig::sequential(),
            small(EvalConfig::default()),
            small(EvalConfig::sequential().with_optimization(Optimization::BoundRatio)),
            EvalConfig::sequential().with_eager(true),
            small(EvalConfig::default().with_eager(true)),
        ]
    }

    fn evaluate(program: &Program, config: EvalConfig) -> SemiNaiveEvaluation {
        init();
        let mut eval =
            SemiNaiveEvaluation::from_program(program, FunctionRegistry::with_builtins(), config)
                .unwrap();
        eval.run().unwrap();
        eval
    }

    fn ints(eval: &SemiNaiveEvaluation, name: &str) -> BTreeSet<Vec<i64>> {
        let result = eval.result();
        result
            .relation(name)
            .unwrap()
            .iter()
            .map(|t| t.iter().map(|&id| result.terms().as_int(id).unwrap()).collect())
            .collect()
    }

    fn var(name: &str) -> Term {
        Term::var(name)
    }

    /// `edge` is a chain over `0..n` plus a back edge, `path` its closure.
    fn chain_program(n: i64) -> Program {
        let mut program = Program::new();
        let edge = program.declare("edge", 2).unwrap();
        let path = program.declare("path", 2).unwrap();
        for i in 0..n - 1 {
            program.add_fact(&edge, vec![Term::int(i), Term::int(i + 1)]).unwrap();
        }
        program.add_fact(&edge, vec![Term::int(n - 1), Term::int(n / 2)]).unwrap();
        program
            .add_rule(Rule::new(
                Atom::new(path.clone(), vec![var("X"), var("Y")]),
                vec![Atom::new(edge.clone(), vec![var("X"), var("Y")]).into()],
            ))
            .unwrap();
        program
            .add_rule(Rule::new(
                Atom::new(path.clone(), vec![var("X"), var("Z")]),
                vec![
                    Atom::new(path.clone(), vec![var("X"), var("Y")]).into(),
                    Atom::new(path.clone(), vec![var("Y"), var("Z")]).into(),
                ],
            ))
            .unwrap();
        program
    }

    #[test]
    fn test_edge_path_round_deltas() {
        let program = parse_program(EDGE_PATH).unwrap();
        let mut eval = evaluate(&program, EvalConfig::sequential());
        let stats = eval.run().unwrap();
        assert_eq!(stats.strata.len(), 1);
        assert_eq!(stats.strata[0].round_deltas, vec![3, 2, 1, 0]);
        assert_eq!(stats.derived(), 6);
        let expected: BTreeSet<Vec<i64>> = [[1, 2], [2, 3], [3, 4], [1, 3], [2, 4], [1, 4]]
            .iter()
            .map(|t| t.to_vec())
            .collect();
        assert_eq!(ints(&eval, "path"), expected);
    }

    #[test]
    fn test_query_answer() {
        let program = parse_program(EDGE_PATH).unwrap();
        let eval = evaluate(&program, EvalConfig::sequential());
        let result = eval.result();
        let answer = result.query_answer().unwrap().unwrap();
        assert_eq!(result.sorted(answer), ["(1, 2)", "(1, 3)", "(1, 4)"]);
        assert_eq!(result.query_symbol().map(|s| s.name()), Some("path"));
    }

    #[test]
    fn test_run_is_idempotent() {
        let program = parse_program(EDGE_PATH).unwrap();
        let mut eval = evaluate(&program, EvalConfig::sequential());
        let first = eval.stats().cloned().unwrap();
        let again = eval.run().unwrap().clone();
        assert_eq!(first, again);
        assert_eq!(ints(&eval, "path").len(), 6);
    }

    #[test]
    fn test_strategies_agree() {
        let program = chain_program(24);
        let reference = ints(&evaluate(&program, EvalConfig::sequential()), "path");
        // 0..11 reach everything after them; 12..23 reach 12..23
        assert_eq!(reference.len(), (0..12).map(|i| 23 - i).sum::<i64>() as usize + 12 * 12);
        for config in configs() {
            let eval = evaluate(&program, config.clone());
            assert_eq!(ints(&eval, "path"), reference, "config {config:?}");
            eval.db().check_consistency().unwrap();
        }
    }

    #[test]
    fn test_eager_runs_sweeps() {
        let program = chain_program(10);
        let mut eval = evaluate(&program, EvalConfig::sequential().with_eager(true));
        let stats = eval.run().unwrap();
        assert!(stats.strata[0].sweeps >= 1);
        assert_eq!(stats.strata[0].round_deltas.last(), Some(&0));
    }

    #[test]
    fn test_stratified_negation() {
        let program = parse_program(
            r#"{
            "relations": [
                { "name": "node", "arity": 1 }, { "name": "edge", "arity": 2 },
                { "name": "reach", "arity": 1 }, { "name": "unreached", "arity": 1 }
            ],
            "facts": { "node": [[1], [2], [3], [4]], "edge": [[1, 2], [2, 1], [3, 4]] },
            "rules": [
                { "head": { "rel": "reach", "args": [1] } },
                { "head": { "rel": "reach", "args": ["Y"] },
                  "body": [{ "rel": "reach", "args": ["X"] }, { "rel": "edge", "args": ["X", "Y"] }] },
                { "head": { "rel": "unreached", "args": ["X"] },
                  "body": [{ "rel": "node", "args": ["X"] },
                           { "rel": "reach", "args": ["X"], "negated": true }] }
            ]
        }"#,
        )
        .unwrap();
        for config in configs() {
            let eval = evaluate(&program, config);
            let expected: BTreeSet<Vec<i64>> = [vec![3], vec![4]].into_iter().collect();
            assert_eq!(ints(&eval, "unreached"), expected);
            assert_eq!(eval.strata().len(), 2);
        }
    }

    #[test]
    fn test_functions_in_rules() {
        let program = parse_program(
            r#"{
            "relations": [{ "name": "n", "arity": 1 }],
            "facts": { "n": [[0]] },
            "rules": [
                { "head": { "rel": "n", "args": [{ "call": "add", "args": ["X", 1] }] },
                  "body": [{ "rel": "n", "args": ["X"] },
                           { "eq": [{ "call": "lt", "args": ["X", 5] }, true] }] }
            ]
        }"#,
        )
        .unwrap();
        for config in configs() {
            let eval = evaluate(&program, config);
            let expected: BTreeSet<Vec<i64>> = (0..=5).map(|i| vec![i]).collect();
            assert_eq!(ints(&eval, "n"), expected);
        }
    }

    #[test]
    fn test_ignored_columns_use_projection_index() {
        let program = parse_program(
            r#"{
            "relations": [{ "name": "edge", "arity": 2 }, { "name": "source", "arity": 1 }],
            "facts": { "edge": [[1, 2], [1, 3], [2, 3]] },
            "rules": [
                { "head": { "rel": "source", "args": ["X"] },
                  "body": [{ "rel": "edge", "args": ["X", "_"] }] }
            ]
        }"#,
        )
        .unwrap();
        let eval = evaluate(&program, EvalConfig::sequential());
        let expected: BTreeSet<Vec<i64>> = [vec![1], vec![2]].into_iter().collect();
        assert_eq!(ints(&eval, "source"), expected);
        let edge = eval.result().symbol("edge").unwrap().clone();
        let stats = eval.result().relation_stats(&edge);
        assert_eq!(stats.distinct, 3);
        assert_eq!(stats.indices, 2);
        assert_eq!(stats.duplicates, 5);
    }

    #[test]
    fn test_load_failure_names_fact() {
        init();
        let program = parse_program(
            r#"{
            "relations": [{ "name": "p", "arity": 1 }],
            "facts": { "p": [[1], [{ "call": "div", "args": [1, 0] }]] }
        }"#,
        )
        .unwrap();
        let err = SemiNaiveEvaluation::from_program(
            &program,
            FunctionRegistry::with_builtins(),
            EvalConfig::sequential(),
        )
        .err()
        .unwrap();
        let Error::Load(EvalError::Normalize { fact, .. }) = &err else {
            panic!("expected a load error, got {err}");
        };
        assert_eq!(fact, "p(@div(1, 0))");
        assert!(err.to_string().starts_with("fact loading failed: cannot normalize fact"));
    }

    #[test]
    fn test_unsafe_stratum_rejected() {
        init();
        let program = parse_program(
            r#"{
            "relations": [{ "name": "p", "arity": 1 }, { "name": "q", "arity": 1 }, { "name": "r", "arity": 1 }],
            "rules": [
                { "head": { "rel": "p", "args": ["X"] },
                  "body": [{ "rel": "r", "args": ["X"] }, { "rel": "q", "args": ["X"], "negated": true }] },
                { "head": { "rel": "q", "args": ["X"] },
                  "body": [{ "rel": "r", "args": ["X"] }, { "rel": "p", "args": ["X"], "negated": true }] }
            ]
        }"#,
        )
        .unwrap();
        let err = SemiNaiveEvaluation::from_program(
            &program,
            FunctionRegistry::new(),
            EvalConfig::sequential(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Setup(SetupError::UnsafeStratum { .. })));
    }

    #[test]
    fn test_negated_only_body_rejected() {
        init();
        let mut program = Program::new();
        let h = program.declare("h", 1).unwrap();
        let p = program.declare("p", 1).unwrap();
        program
            .add_rule(Rule::new(
                Atom::new(h, vec![var("X")]),
                vec![Literal::Predicate(Atom::negated(p, vec![var("X")]))],
            ))
            .unwrap();
        for config in configs() {
            let err = SemiNaiveEvaluation::from_program(&program, FunctionRegistry::new(), config)
                .err()
                .unwrap();
            assert!(matches!(
                err,
                Error::Setup(SetupError::NoEvaluableOrdering { .. })
            ));
        }
    }

    #[test]
    fn test_unknown_function_rejected_at_setup() {
        init();
        let program = parse_program(
            r#"{
            "relations": [{ "name": "n", "arity": 1 }],
            "rules": [
                { "head": { "rel": "n", "args": [{ "call": "nope", "args": ["X"] }] },
                  "body": [{ "rel": "n", "args": ["X"] }] }
            ]
        }"#,
        )
        .unwrap();
        let err = SemiNaiveEvaluation::from_program(
            &program,
            FunctionRegistry::with_builtins(),
            EvalConfig::sequential(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Setup(SetupError::UnknownFunction { .. })));
    }

    #[test]
    fn test_evaluation_failure_is_reported_after_quiescence() {
        let program = parse_program(
            r#"{
            "relations": [{ "name": "n", "arity": 1 }, { "name": "inv", "arity": 1 }],
            "facts": { "n": [[2], [1], [0]] },
            "rules": [
                { "head": { "rel": "inv", "args": [{ "call": "div", "args": [100, "X"] }] },
                  "body": [{ "rel": "n", "args": ["X"] }] }
            ]
        }"#,
        )
        .unwrap();
        for config in configs() {
            init();
            let mut eval =
                SemiNaiveEvaluation::from_program(&program, FunctionRegistry::with_builtins(), config)
                    .unwrap();
            let err = eval.run().unwrap_err();
            assert!(matches!(
                &err,
                Error::Evaluation(EvalError::Function { function, .. }) if function == "div"
            ));
            assert!(err.to_string().starts_with("evaluation failed:"));
        }
    }

    #[test]
    fn test_eager_rejects_delta_after_predicate() {
        init();
        let program = parse_program(
            r#"{
            "relations": [{ "name": "edge", "arity": 2 }, { "name": "path", "arity": 2 },
                          { "name": "blocked", "arity": 1 }],
            "rules": [
                { "head": { "rel": "path", "args": ["X", "Y"] },
                  "body": [{ "rel": "edge", "args": ["X", "Y"] }] },
                { "head": { "rel": "path", "args": ["X", "Z"] },
                  "body": [{ "rel": "blocked", "args": ["_"], "negated": true },
                           { "rel": "edge", "args": ["X", "Y"] },
                           { "rel": "path", "args": ["Y", "Z"] }] }
            ]
        }"#,
        )
        .unwrap();
        let eager = SemiNaiveEvaluation::from_program(
            &program,
            FunctionRegistry::new(),
            EvalConfig::sequential().with_eager(true),
        );
        assert!(matches!(
            eager.err(),
            Some(Error::Setup(SetupError::DeltaPlacement { .. }))
        ));
        assert!(
            SemiNaiveEvaluation::from_program(&program, FunctionRegistry::new(), EvalConfig::sequential())
                .is_ok()
        );
    }
}
