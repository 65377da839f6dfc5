//! Error types.
//!
//! Errors are fatal: nothing is retried, and the contents of the fact store
//! after a failure are unspecified.

/// The program cannot be evaluated as given.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SetupError {
    #[error("cannot handle recursive negation in stratum {rank} ({relations})")]
    UnsafeStratum { rank: usize, relations: String },
    #[error("no evaluable ordering for the literals of rule:\n{rule}")]
    NoEvaluableOrdering { rule: String },
    #[error("there are unbound variables in the head of a rule ({vars}):\n{rule}")]
    UnboundHeadVariables { vars: String, rule: String },
    #[error("delta literal could not be placed first in rule:\n{rule}")]
    DeltaPlacement { rule: String },
    #[error("relation `{0}` is not registered with the fact store")]
    UnknownRelation(String),
    #[error("relation `{relation}` has arity {expected} but was used with {found} arguments")]
    ArityMismatch {
        relation: String,
        expected: usize,
        found: usize,
    },
    #[error("unknown function `{function}` in rule:\n{rule}")]
    UnknownFunction { function: String, rule: String },
    #[error("cannot start worker threads: {0}")]
    WorkerStart(String),
}

/// A failure while evaluating terms, loading facts or running rules.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("function `{function}` failed: {message}")]
    Function { function: String, message: String },
    #[error("solver call `{function}` failed: {message}")]
    Solver { function: String, message: String },
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("cannot normalize fact {fact}: {source}")]
    Normalize {
        fact: String,
        #[source]
        source: Box<EvalError>,
    },
    #[error("term `{0}` is not ground")]
    NonGround(String),
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Outcome of a full run, tagged with the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),
    #[error("fact loading failed: {0}")]
    Load(#[source] EvalError),
    #[error("evaluation failed: {0}")]
    Evaluation(#[source] EvalError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
