//! Functions callable from rule bodies and heads.
//!
//! A call `@name(args..)` is evaluated once all its arguments are ground. The
//! registry maps names to Rust closures over interned terms; a constraint
//! solver plugs in through [`Solver`] and is exposed as `is_sat` / `is_valid`.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::EvalError;
use crate::terms::{TermId, TermStore};

/// A registered function. Errors are plain messages; the caller attaches the
/// function name.
pub type Function = Arc<dyn Fn(&[TermId], &TermStore) -> Result<TermId, String> + Send + Sync>;

/// Answer of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverResult {
    Sat,
    Unsat,
    Unknown,
}

/// An external constraint solver.
///
/// Calls block the task that issued them. Implementations must be safe to
/// call from several worker threads at once.
pub trait Solver: Send + Sync {
    /// Check whether the formula `assertion` is satisfiable.
    fn check(&self, assertion: TermId, terms: &TermStore) -> Result<SolverResult, String>;
}

#[derive(Clone)]
enum Entry {
    Native(Function),
    SolverCheck { solver: Arc<dyn Solver>, negate: bool },
}

/// Name → function table shared by every task of an evaluation.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<Arc<str>, Entry>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().map(|k| &**k).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the integer, comparison and string builtins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("add", int_op(|a, b| a.checked_add(b).ok_or("overflow")));
        registry.register("sub", int_op(|a, b| a.checked_sub(b).ok_or("overflow")));
        registry.register("mul", int_op(|a, b| a.checked_mul(b).ok_or("overflow")));
        registry.register(
            "div",
            int_op(|a, b| {
                if b == 0 {
                    Err("division by zero")
                } else {
                    a.checked_div(b).ok_or("overflow")
                }
            }),
        );
        registry.register("lt", int_cmp(|a, b| a < b));
        registry.register("le", int_cmp(|a, b| a <= b));
        registry.register("concat", |args: &[TermId], terms: &TermStore| {
            let mut out = String::new();
            for &arg in args {
                let s = terms
                    .as_str(arg)
                    .ok_or_else(|| format!("expected string, got {}", terms.render(arg)))?;
                out.push_str(&s);
            }
            Ok(terms.string(&out))
        });
        registry
    }

    /// Register `is_sat(p)` and `is_valid(p)` backed by `solver`.
    ///
    /// `is_valid(p)` holds when `not(p)` is unsatisfiable.
    pub fn with_solver(mut self, solver: Arc<dyn Solver>) -> Self {
        self.functions.insert(
            "is_sat".into(),
            Entry::SolverCheck {
                solver: Arc::clone(&solver),
                negate: false,
            },
        );
        self.functions.insert(
            "is_valid".into(),
            Entry::SolverCheck {
                solver,
                negate: true,
            },
        );
        self
    }

    /// Register (or replace) a function.
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[TermId], &TermStore) -> Result<TermId, String> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.into(), Entry::Native(Arc::new(function)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Apply `name` to ground arguments.
    pub fn call(&self, name: &str, args: &[TermId], terms: &TermStore) -> Result<TermId, EvalError> {
        match self.functions.get(name) {
            None => Err(EvalError::UnknownFunction(name.to_string())),
            Some(Entry::Native(function)) => {
                function(args, terms).map_err(|message| EvalError::Function {
                    function: name.to_string(),
                    message,
                })
            }
            Some(Entry::SolverCheck { solver, negate }) => {
                let solver_error = |message: String| EvalError::Solver {
                    function: name.to_string(),
                    message,
                };
                let [formula] = args else {
                    return Err(solver_error(format!("expected 1 argument, got {}", args.len())));
                };
                let assertion = if *negate {
                    terms.ctor("not", &[*formula])
                } else {
                    *formula
                };
                match solver.check(assertion, terms).map_err(solver_error)? {
                    SolverResult::Sat => Ok(terms.bool(!*negate)),
                    SolverResult::Unsat => Ok(terms.bool(*negate)),
                    SolverResult::Unknown => Err(solver_error("solver returned unknown".to_string())),
                }
            }
        }
    }
}

fn int_args(args: &[TermId], terms: &TermStore) -> Result<(i64, i64), String> {
    let [a, b] = args else {
        return Err(format!("expected 2 arguments, got {}", args.len()));
    };
    let int = |id: TermId| {
        terms
            .as_int(id)
            .ok_or_else(|| format!("expected integer, got {}", terms.render(id)))
    };
    Ok((int(*a)?, int(*b)?))
}

fn int_op(
    op: impl Fn(i64, i64) -> Result<i64, &'static str> + Send + Sync + 'static,
) -> impl Fn(&[TermId], &TermStore) -> Result<TermId, String> + Send + Sync + 'static {
    move |args: &[TermId], terms: &TermStore| {
        let (a, b) = int_args(args, terms)?;
        Ok(terms.int(op(a, b)?))
    }
}

fn int_cmp(
    op: impl Fn(i64, i64) -> bool + Send + Sync + 'static,
) -> impl Fn(&[TermId], &TermStore) -> Result<TermId, String> + Send + Sync + 'static {
    move |args: &[TermId], terms: &TermStore| {
        let (a, b) = int_args(args, terms)?;
        Ok(terms.bool(op(a, b)))
    }
}
