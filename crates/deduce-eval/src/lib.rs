//! Parallel semi-naive fixpoint evaluation for deduce programs.
//!
//! Strata are evaluated in order. Within a stratum, rules run as tasks on a
//! counting fork-join pool against a relation store that keeps one sorted
//! index per binding pattern the rules look up through.
//!
//! # Example
//!
//! ```
//! use deduce_eval::{EvalConfig, FunctionRegistry, SemiNaiveEvaluation};
//! use deduce_ir::source::parse_program;
//!
//! let program = parse_program(r#"{
//!     "relations": [{ "name": "edge", "arity": 2 }, { "name": "path", "arity": 2 }],
//!     "facts": { "edge": [[1, 2], [2, 3]] },
//!     "rules": [
//!         { "head": { "rel": "path", "args": ["X", "Y"] },
//!           "body": [{ "rel": "edge", "args": ["X", "Y"] }] },
//!         { "head": { "rel": "path", "args": ["X", "Z"] },
//!           "body": [{ "rel": "edge", "args": ["X", "Y"] },
//!                    { "rel": "path", "args": ["Y", "Z"] }] }
//!     ]
//! }"#).unwrap();
//!
//! let mut eval = SemiNaiveEvaluation::from_program(
//!     &program,
//!     FunctionRegistry::with_builtins(),
//!     EvalConfig::default(),
//! ).unwrap();
//! eval.run().unwrap();
//!
//! let path = eval.result().relation("path").unwrap();
//! assert_eq!(path.len(), 3); // (1,2), (2,3), (1,3)
//! ```

mod compiled;
pub mod config;
pub mod db;
mod engine;
pub mod error;
mod eval;
pub mod functions;
pub mod ordering;
pub mod pool;
pub mod semi_naive;
mod stratum;
pub mod terms;

pub use compiled::IndexedRule;
pub use config::{EvalConfig, Optimization};
pub use engine::{EvaluationResult, EvaluationStats, RelationStats, SemiNaiveEvaluation};
pub use error::{Error, EvalError, SetupError};
pub use functions::{FunctionRegistry, Solver, SolverResult};
pub use stratum::StratumStats;
pub use terms::{GroundTerm, TermId, TermStore, Tuple};
