//! JSON description of a program.
//!
//! ```json
//! {
//!   "relations": [{ "name": "edge", "arity": 2 }, { "name": "path", "arity": 2 }],
//!   "facts": { "edge": [[1, 2], [2, 3]] },
//!   "rules": [
//!     { "head": { "rel": "path", "args": ["X", "Y"] },
//!       "body": [{ "rel": "edge", "args": ["X", "Y"] }] },
//!     { "head": { "rel": "path", "args": ["X", "Z"] },
//!       "body": [{ "rel": "edge", "args": ["X", "Y"] },
//!                { "rel": "path", "args": ["Y", "Z"] }] }
//!   ],
//!   "query": { "rel": "path", "args": ["X", "Y"] }
//! }
//! ```
//!
//! Bare names starting with an uppercase letter or `_` are variables; `_` on
//! its own is a fresh variable at every occurrence. Other bare names are
//! nullary constructors. Strings are written `{"str": ".."}`, constructed
//! values `{"ctor": "pair", "args": [..]}` and function calls
//! `{"call": "add", "args": [..]}`. Body literals are atoms (optionally
//! `"negated": true`), `{"eq": [lhs, rhs]}` or `{"neq": [lhs, rhs]}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Atom, IrError, Literal, Program, Rule, Term};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramSource {
    pub relations: Vec<RelationDecl>,
    #[serde(default)]
    pub facts: BTreeMap<String, Vec<Vec<TermSource>>>,
    #[serde(default)]
    pub rules: Vec<RuleSource>,
    #[serde(default)]
    pub query: Option<AtomSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDecl {
    pub name: String,
    pub arity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSource {
    pub head: AtomSource,
    #[serde(default)]
    pub body: Vec<LiteralSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomSource {
    pub rel: String,
    #[serde(default)]
    pub args: Vec<TermSource>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralSource {
    Eq { eq: [TermSource; 2] },
    Neq { neq: [TermSource; 2] },
    Atom(AtomSource),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermSource {
    Bool(bool),
    Int(i64),
    Name(String),
    Str {
        str: String,
    },
    Ctor {
        ctor: String,
        #[serde(default)]
        args: Vec<TermSource>,
    },
    Call {
        call: String,
        #[serde(default)]
        args: Vec<TermSource>,
    },
}

/// Parse a JSON program and validate it.
pub fn parse_program(text: &str) -> Result<Program, IrError> {
    ProgramSource::from_json(text)?.into_program()
}

impl ProgramSource {
    pub fn from_json(text: &str) -> Result<Self, IrError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn into_program(self) -> Result<Program, IrError> {
        let mut program = Program::new();
        for decl in &self.relations {
            program.declare(&decl.name, decl.arity)?;
        }

        let mut fresh = FreshVars::default();
        for (name, facts) in self.facts {
            let symbol = lookup(&program, &name)?;
            for args in facts {
                let args = args
                    .into_iter()
                    .map(|t| t.into_term(&mut fresh))
                    .collect::<Result<Vec<_>, _>>()?;
                program.add_fact(&symbol, args)?;
            }
        }

        for rule in self.rules {
            let head = rule.head.into_atom(&program, &mut fresh)?;
            let body = rule
                .body
                .into_iter()
                .map(|l| l.into_literal(&program, &mut fresh))
                .collect::<Result<Vec<_>, _>>()?;
            program.add_rule(Rule::new(head, body))?;
        }

        if let Some(query) = self.query {
            let query = query.into_atom(&program, &mut fresh)?;
            program.set_query(query)?;
        }
        Ok(program)
    }
}

fn lookup(program: &Program, name: &str) -> Result<crate::RelationSymbol, IrError> {
    program
        .relation(name)
        .cloned()
        .ok_or_else(|| IrError::UnknownRelation(name.to_string()))
}

#[derive(Default)]
struct FreshVars(usize);

impl FreshVars {
    fn next(&mut self) -> Term {
        self.0 += 1;
        Term::Var(format!("_#{}", self.0).into())
    }
}

impl AtomSource {
    fn into_atom(self, program: &Program, fresh: &mut FreshVars) -> Result<Atom, IrError> {
        let symbol = lookup(program, &self.rel)?;
        let args = self
            .args
            .into_iter()
            .map(|t| t.into_term(fresh))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Atom {
            symbol,
            args,
            negated: self.negated,
        })
    }
}

impl LiteralSource {
    fn into_literal(self, program: &Program, fresh: &mut FreshVars) -> Result<Literal, IrError> {
        Ok(match self {
            LiteralSource::Eq { eq: [lhs, rhs] } => {
                Literal::eq(lhs.into_term(fresh)?, rhs.into_term(fresh)?)
            }
            LiteralSource::Neq { neq: [lhs, rhs] } => {
                Literal::neq(lhs.into_term(fresh)?, rhs.into_term(fresh)?)
            }
            LiteralSource::Atom(atom) => Literal::Predicate(atom.into_atom(program, fresh)?),
        })
    }
}

impl TermSource {
    fn into_term(self, fresh: &mut FreshVars) -> Result<Term, IrError> {
        Ok(match self {
            TermSource::Bool(b) => Term::Bool(b),
            TermSource::Int(n) => Term::Int(n),
            TermSource::Name(name) if name == "_" => fresh.next(),
            TermSource::Name(name) => match name.chars().next() {
                Some(c) if c.is_uppercase() || c == '_' => Term::Var(name.into()),
                Some(_) => Term::Ctor(name.into(), vec![]),
                None => return Err(IrError::InvalidTerm("empty name".to_string())),
            },
            TermSource::Str { str } => Term::Str(str.into()),
            TermSource::Ctor { ctor, args } => Term::Ctor(ctor.into(), convert_all(args, fresh)?),
            TermSource::Call { call, args } => Term::Call(call.into(), convert_all(args, fresh)?),
        })
    }
}

fn convert_all(args: Vec<TermSource>, fresh: &mut FreshVars) -> Result<Vec<Term>, IrError> {
    args.into_iter().map(|t| t.into_term(fresh)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

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
        "query": { "rel": "path", "args": ["X", "Y"] }
    }"#;

    #[test]
    fn test_parse_edge_path() {
        let prog = parse_program(EDGE_PATH).unwrap();
        assert_eq!(prog.relations().len(), 2);
        let edge = prog.relation("edge").unwrap().clone();
        assert_eq!(prog.facts_for(&edge).len(), 3);
        assert_eq!(prog.rules().len(), 2);
        assert_eq!(prog.query().unwrap().symbol.name(), "path");
    }

    #[test]
    fn test_term_shapes() {
        let prog = parse_program(
            r#"{
            "relations": [{ "name": "r", "arity": 1 }, { "name": "s", "arity": 2 }],
            "rules": [
                { "head": { "rel": "s", "args": ["X", { "call": "add", "args": ["X", 1] }] },
                  "body": [
                      { "rel": "r", "args": ["X"] },
                      { "neq": ["X", { "str": "a" }] },
                      { "rel": "s", "args": ["_", "_"], "negated": true },
                      { "eq": ["Y", { "ctor": "pair", "args": ["X", "nil"] }] }
                  ] }
            ]
        }"#,
        )
        .unwrap();

        let rule = &prog.rules()[0];
        assert!(matches!(&rule.head.args[1], Term::Call(name, _) if &**name == "add"));
        assert!(matches!(
            &rule.body[1],
            Literal::Unification { rhs: Term::Str(_), negated: true, .. }
        ));
        let Literal::Predicate(neg) = &rule.body[2] else {
            panic!("expected predicate");
        };
        assert!(neg.negated);
        assert_ne!(neg.args[0], neg.args[1], "each `_` is a fresh variable");
        let Literal::Unification { rhs, .. } = &rule.body[3] else {
            panic!("expected unification");
        };
        assert_eq!(rhs.to_string(), "pair(X, nil)");
    }

    #[test]
    fn test_unknown_relation() {
        let err = parse_program(
            r#"{ "relations": [], "facts": { "edge": [[1, 2]] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, IrError::UnknownRelation(name) if name == "edge"));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = parse_program(
            r#"{
            "relations": [{ "name": "edge", "arity": 2 }],
            "rules": [{ "head": { "rel": "edge", "args": ["X"] }, "body": [] }]
        }"#,
        )
        .unwrap_err();
        assert!(matches!(err, IrError::ArityMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_program("{"), Err(IrError::Json(_))));
        assert!(matches!(
            parse_program(r#"{ "relations": [], "extra": 1 }"#),
            Err(IrError::Json(_))
        ));
    }
}
