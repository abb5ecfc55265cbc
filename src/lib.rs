#![forbid(unsafe_code)]
#![allow(unused_parens)]

//! Embeddable runtime core for a λProlog-family logic programming
//! language : λ-terms with explicit de Bruijn levels, higher-order
//! pattern unification with constraint delay outside the fragment,
//! SLD resolution with chronological backtracking, implication and
//! universal quantification in goals.
//!
//! The host feeds compiled `Program`/`Query` values in and consumes
//! `Solution` values (variable assignments plus the residual constraint
//! store). Surface syntax, the compiler and pretty-printing live in the
//! embedding application; this crate is the term model and the solver.

use std::sync::Arc;

use indexmap::IndexMap;

pub mod symbols;
pub mod cdata;
pub mod term;
pub mod errors;
pub mod state;
pub mod constraints;
pub mod store;
pub mod motion;
pub mod unify;
pub mod index;
pub mod clause;
pub mod eval;
pub mod builtins;
pub mod solver;
pub mod cli;

pub use crate::cdata::{ CData, Loc, HostData, declare_cdata_type };
pub use crate::clause::{ Clause, ClauseDb, Graft, Program, Query };
pub use crate::cli::Options;
pub use crate::errors::{ RunErr, RunResult, Signal };
pub use crate::solver::{ Machine, Outcome, Solution, SuspendedGoal };
pub use crate::state::{ ComponentDecl, ComponentId, StateMap, StateValue };
pub use crate::symbols::{ ConstId, intern };
pub use crate::term::Term;

use crate::builtins::{ BuiltinFn, BuiltinRegistry };
use crate::eval::Evaluator;
use crate::term::BuiltinId;

/// Hook the external parser calls to lower an embedded DSL fragment
/// into a core term during compilation.
pub type QuotFn =
    Box<dyn Fn(usize, &mut StateMap, &Loc, &str) -> RunResult<Term> + Send + Sync>;

/// Construction-time registration surface. Builtins, evaluable symbols,
/// state components and quotations are fixed before the first query
/// runs; only the interned-symbol and CData tables are process-wide.
pub struct InterpreterBuilder {
    options : Options,
    builtins : BuiltinRegistry,
    evaluator : Evaluator,
    components : Vec<ComponentDecl>,
    quotations : IndexMap<String, QuotFn>,
}

impl InterpreterBuilder {
    pub fn new() -> Self {
        InterpreterBuilder {
            options : Options::default(),
            builtins : BuiltinRegistry::standard(),
            evaluator : Evaluator::standard(),
            components : Vec::new(),
            quotations : IndexMap::new(),
        }
    }

    pub fn options(mut self, options : Options) -> Self {
        self.options = options;
        self
    }

    pub fn register_builtin(&mut self, name : &str, arity : Option<usize>, docs : &str,
                            run : BuiltinFn) -> BuiltinId {
        self.builtins.register(name, arity, docs, run)
    }

    pub fn register_evaluable(&mut self, name : &'static str, arity : usize,
                              run : fn(&[CData]) -> RunResult<CData>) {
        self.evaluator.register(name, arity, run)
    }

    pub fn declare_state_component(&mut self, decl : ComponentDecl) -> ComponentId {
        self.components.push(decl);
        ComponentId(self.components.len() - 1)
    }

    pub fn register_quotation(&mut self, name : &str, f : QuotFn) {
        self.quotations.insert(String::from(name), f);
    }

    pub fn build(self) -> Interpreter {
        Interpreter {
            options : self.options,
            db : ClauseDb::base(),
            builtins : Arc::new(self.builtins),
            evaluator : Arc::new(self.evaluator),
            components : Arc::new(self.components),
            quotations : self.quotations,
        }
    }
}

/// The embedder-facing façade : an append-only program database plus
/// the registries every solver run shares.
pub struct Interpreter {
    options : Options,
    db : ClauseDb,
    builtins : Arc<BuiltinRegistry>,
    evaluator : Arc<Evaluator>,
    components : Arc<Vec<ComponentDecl>>,
    quotations : IndexMap<String, QuotFn>,
}

impl Interpreter {
    /// An interpreter with the standard builtins and default options.
    pub fn standard() -> Self {
        InterpreterBuilder::new().build()
    }

    pub fn load(&mut self, p : Program) -> RunResult<()> {
        self.db.load(p)
    }

    /// Start a solver over `query`; call `Machine::next` for solutions.
    pub fn solver(&self, query : Query) -> RunResult<Machine> {
        Machine::new(
            Arc::new(self.db.clone()),
            self.builtins.clone(),
            self.evaluator.clone(),
            self.components.clone(),
            self.options.clone(),
            query,
        )
    }

    /// Run to the first outcome.
    pub fn run_query(&self, query : Query) -> RunResult<Outcome> {
        self.solver(query)?.next()
    }

    pub fn quotation(&self, name : &str) -> Option<&QuotFn> {
        self.quotations.get(name)
    }

    pub fn document_builtins(&self) -> String {
        self.builtins.document()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}
