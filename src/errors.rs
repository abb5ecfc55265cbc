use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::cdata::Loc;

/// The interpreter distinguishes four disjoint failure kinds. `NoClause`
/// is logical failure; it drives backtracking and is so frequent that it
/// gets its own `Signal` variant instead of living in the error enum.
/// The three fatal kinds below unwind past every choice point and hand
/// control back to the host. `Anomaly` means an internal invariant was
/// violated and indicates a bug in this crate, not in the user's program.
pub type RunResult<T> = Result<T, RunErr>;

#[derive(Debug, Clone, PartialEq)]
pub enum RunErr {
    /// A built-in or the evaluator received arguments violating its
    /// declared signature.
    Type { msg : String, loc : Option<Loc> },
    /// Well-formed but illegal program state at run time, e.g. unification
    /// outside the pattern fragment with delaying disabled, evaluation of
    /// a non-closed term, or an I/O failure.
    Regular { msg : String },
    /// Violated internal invariant.
    Anomaly { msg : String },
}

impl std::fmt::Display for RunErr {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RunErr::Type { msg, loc : Some(l) } => write!(f, "type error at {} : {}", l, msg),
            RunErr::Type { msg, loc : None } => write!(f, "type error : {}", msg),
            RunErr::Regular { msg } => write!(f, "error : {}", msg),
            RunErr::Anomaly { msg } => write!(f, "anomaly (please report this as a bug) : {}", msg),
        }
    }
}

impl std::error::Error for RunErr {}

/// Result type for built-in predicate handlers. `NoClause` behaves exactly
/// like running out of matching clauses : the solver backtracks.
#[derive(Debug)]
pub enum Signal {
    NoClause,
    Fatal(RunErr),
}

impl From<RunErr> for Signal {
    fn from(e : RunErr) -> Signal {
        Signal::Fatal(e)
    }
}

/// Reporter sinks. The defaults write to stderr; an embedder that wants
/// its own propagation discipline (collect warnings, forward them to a
/// UI, ...) replaces them once at startup. Fatal errors are *also*
/// propagated through `RunResult`, so replacing the sinks never loses
/// the error value itself.
pub struct Sinks {
    pub warn : Arc<dyn Fn(&str) + Send + Sync>,
    pub error : Arc<dyn Fn(&RunErr) + Send + Sync>,
}

static SINKS : Lazy<RwLock<Sinks>> = Lazy::new(|| {
    RwLock::new(Sinks {
        warn : Arc::new(|msg| eprintln!("warning : {}", msg)),
        error : Arc::new(|e| eprintln!("{}", e)),
    })
});

pub fn set_warn_sink(f : Arc<dyn Fn(&str) + Send + Sync>) {
    SINKS.write().warn = f;
}

pub fn set_error_sink(f : Arc<dyn Fn(&RunErr) + Send + Sync>) {
    SINKS.write().error = f;
}

pub fn warn(msg : &str) {
    (SINKS.read().warn)(msg)
}

fn report(e : RunErr) -> RunErr {
    (SINKS.read().error)(&e);
    e
}

pub fn type_error(msg : impl Into<String>) -> RunErr {
    report(RunErr::Type { msg : msg.into(), loc : None })
}

pub fn type_error_at(loc : Loc, msg : impl Into<String>) -> RunErr {
    report(RunErr::Type { msg : msg.into(), loc : Some(loc) })
}

pub fn error(msg : impl Into<String>) -> RunErr {
    report(RunErr::Regular { msg : msg.into() })
}

pub fn anomaly(msg : impl Into<String>) -> RunErr {
    report(RunErr::Anomaly { msg : msg.into() })
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn kinds_are_disjoint() {
        let t = type_error("mismatch");
        let r = error("illegal");
        let a = anomaly("broken");
        assert!(matches!(t, RunErr::Type { .. }));
        assert!(matches!(r, RunErr::Regular { .. }));
        assert!(matches!(a, RunErr::Anomaly { .. }));
        assert_ne!(t, r);
    }
}
