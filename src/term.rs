use std::sync::Arc;

use crate::cdata::CData;
use crate::symbols::{ self, ConstId, NILC, CONSC };
use crate::errors::{ RunResult, type_error };

use InnerTerm::*;

/// Index of a unification-variable cell in the solver's arena. Two term
/// nodes denote the same logic variable iff they carry the same ref;
/// everything else about the variable lives in the arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UVarRef(pub(crate) u32);

impl UVarRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Id of a registered built-in predicate (index into the registry).
pub type BuiltinId = usize;

/// Arc wrapper around `InnerTerm`. See InnerTerm's docs.
#[derive(Clone, PartialEq, Eq)]
pub struct Term(Arc<InnerTerm>);

/// The runtime term language, with explicit de Bruijn levels.
///
/// `Const c` is a global symbol when `c < 0` and a bound variable when
/// `c ≥ 0`; a `Lam` entered at depth `d` binds occurrences of `Const d`
/// in its body. `App` heads are constants (global or bound level) and
/// applications always carry at least one argument. `UVar` is a
/// unification variable η-expanded over the `nargs` bound variables
/// `from .. from+nargs-1` (the pattern-fragment form); `AppUVar` is the
/// general applied form. `from` records the binding depth at the point
/// of creation and is what makes lifting to a different depth correct.
///
/// `Arg`/`AppArg` are clause/query slots produced by the external
/// compiler. They are eliminated when a clause or query is instantiated;
/// one reaching the dereference machinery is an anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InnerTerm {
    Const { c : ConstId },
    Lam { body : Term },
    App { hd : ConstId, args : Vec<Term> },
    Cons { hd : Term, tl : Term },
    Nil,
    Builtin { bid : BuiltinId, args : Vec<Term> },
    Data { data : CData },
    UVar { cell : UVarRef, from : usize, nargs : usize },
    AppUVar { cell : UVarRef, from : usize, args : Vec<Term> },
    Arg { slot : usize },
    AppArg { slot : usize, args : Vec<Term> },
    Discard,
}

pub fn mk_const(c : ConstId) -> Term {
    if c == NILC {
        return mk_nil()
    }
    Const { c }.into()
}

pub fn mk_lam(body : Term) -> Term {
    Lam { body }.into()
}

/// Build an application. Empty argument lists collapse to the bare
/// constant, and the list constructor is canonicalised into `Cons` so
/// the unifier and the index only ever see one spelling of a list.
pub fn mk_app(hd : ConstId, args : Vec<Term>) -> Term {
    if args.is_empty() {
        return mk_const(hd)
    }
    if hd == CONSC && args.len() == 2 {
        let mut it = args.into_iter();
        let h = it.next().unwrap();
        let t = it.next().unwrap();
        return mk_cons(h, t)
    }
    App { hd, args }.into()
}

pub fn mk_cons(hd : Term, tl : Term) -> Term {
    Cons { hd, tl }.into()
}

pub fn mk_nil() -> Term {
    Nil.into()
}

pub fn mk_builtin(bid : BuiltinId, args : Vec<Term>) -> Term {
    Builtin { bid, args }.into()
}

pub fn mk_cdata(data : CData) -> Term {
    Data { data }.into()
}

pub fn mk_int(i : i64) -> Term {
    mk_cdata(CData::Int(i))
}

pub fn mk_float(x : f64) -> Term {
    mk_cdata(CData::Float(x))
}

pub fn mk_str(s : &str) -> Term {
    mk_cdata(CData::Str(Arc::new(String::from(s))))
}

pub fn mk_uvar(cell : UVarRef, from : usize, nargs : usize) -> Term {
    UVar { cell, from, nargs }.into()
}

/// General applied unification variable. An empty argument list is the
/// plain η-zero form.
pub fn mk_app_uvar(cell : UVarRef, from : usize, args : Vec<Term>) -> Term {
    if args.is_empty() {
        return mk_uvar(cell, from, 0)
    }
    AppUVar { cell, from, args }.into()
}

pub fn mk_arg(slot : usize) -> Term {
    Arg { slot }.into()
}

pub fn mk_app_arg(slot : usize, args : Vec<Term>) -> Term {
    if args.is_empty() {
        return mk_arg(slot)
    }
    AppArg { slot, args }.into()
}

pub fn mk_discard() -> Term {
    Discard.into()
}

/// Convenience constructors for the reserved connectives; used heavily by
/// hosts building queries programmatically and by the test suite.
pub fn mk_eq(a : Term, b : Term) -> Term {
    mk_app(symbols::EQ, vec![a, b])
}

pub fn mk_conj(a : Term, b : Term) -> Term {
    mk_app(symbols::AND, vec![a, b])
}

pub fn mk_disj(a : Term, b : Term) -> Term {
    mk_app(symbols::OR, vec![a, b])
}

pub fn mk_impl(hyp : Term, goal : Term) -> Term {
    mk_app(symbols::IMPL, vec![hyp, goal])
}

pub fn mk_pi(body : Term) -> Term {
    mk_app(symbols::PI, vec![mk_lam(body)])
}

pub fn mk_sigma(body : Term) -> Term {
    mk_app(symbols::SIGMA, vec![mk_lam(body)])
}

pub fn mk_cut() -> Term {
    mk_const(symbols::CUT)
}

/// Build a `Cons`/`Nil` spine from a Rust vector.
pub fn mk_list(items : Vec<Term>) -> Term {
    let mut acc = mk_nil();
    for t in items.into_iter().rev() {
        acc = mk_cons(t, acc);
    }
    acc
}

impl Term {
    pub fn check_ptr_eq(&self, other : &Term) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_flex(&self) -> bool {
        match self.as_ref() {
            UVar {..} | AppUVar {..} | Discard => true,
            _ => false,
        }
    }

    pub fn is_lam(&self) -> bool {
        match self.as_ref() {
            Lam {..} => true,
            _ => false,
        }
    }

    pub fn get_const(&self) -> Option<ConstId> {
        match self.as_ref() {
            Const { c } => Some(*c),
            _ => None,
        }
    }

    /// The head constant of a `Const` or `App` node, if any.
    pub fn head_const(&self) -> Option<ConstId> {
        match self.as_ref() {
            Const { c } => Some(*c),
            App { hd, .. } => Some(*hd),
            _ => None,
        }
    }

    /// Collect a `Cons`/`Nil` spine into a Rust vector. Fails on an open
    /// or non-list tail.
    pub fn as_list(&self) -> RunResult<Vec<Term>> {
        let mut acc = Vec::new();
        let mut cur = self.clone();
        loop {
            match cur.as_ref() {
                Nil => return Ok(acc),
                Cons { hd, tl } => {
                    acc.push(hd.clone());
                    let next = tl.clone();
                    cur = next;
                },
                _ => return Err(type_error(format!("expected a closed list, got {}", cur))),
            }
        }
    }
}

impl std::convert::AsRef<InnerTerm> for Term {
    fn as_ref(&self) -> &InnerTerm {
        match self {
            Term(arc) => arc.as_ref()
        }
    }
}

impl From<InnerTerm> for Term {
    fn from(x : InnerTerm) -> Term {
        Term(Arc::new(x))
    }
}

impl std::fmt::Debug for Term {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Raw display of a term's current spine. Unification variables render
/// as `_<slot>`; publishing a solution expands assignments first, so the
/// host only ever sees unbound cells printed this way.
impl std::fmt::Display for Term {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.as_ref() {
            Const { c } => write!(f, "{}", symbols::show_const(*c)),
            Lam { body } => write!(f, "(\\ {})", body),
            App { hd, args } => {
                write!(f, "({}", symbols::show_const(*hd))?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            },
            Cons { hd, tl } => {
                write!(f, "[{}", hd)?;
                let mut cur = tl;
                loop {
                    match cur.as_ref() {
                        Cons { hd, tl } => {
                            write!(f, ", {}", hd)?;
                            cur = tl;
                        },
                        Nil => return write!(f, "]"),
                        _ => return write!(f, "|{}]", cur),
                    }
                }
            },
            Nil => write!(f, "[]"),
            Builtin { bid, args } => {
                write!(f, "(#b{}", bid)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            },
            Data { data } => write!(f, "{}", data.pp()),
            UVar { cell, nargs, from } => {
                if *nargs == 0 {
                    write!(f, "_{}", cell.0)
                } else {
                    write!(f, "(_{}", cell.0)?;
                    for i in 0..*nargs {
                        write!(f, " x{}", from + i)?;
                    }
                    write!(f, ")")
                }
            },
            AppUVar { cell, args, .. } => {
                write!(f, "(_{}", cell.0)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            },
            Arg { slot } => write!(f, "A{}", slot),
            AppArg { slot, args } => {
                write!(f, "(A{}", slot)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            },
            Discard => write!(f, "_"),
        }
    }
}

#[cfg(test)]
mod term_tests {
    use super::*;
    use crate::symbols::intern;

    #[test]
    fn app_with_no_args_collapses() {
        let c = intern("f");
        assert_eq!(mk_app(c, vec![]), mk_const(c));
    }

    #[test]
    fn list_constructor_is_canonical() {
        let spelled = mk_app(CONSC, vec![mk_int(1), mk_nil()]);
        let direct = mk_cons(mk_int(1), mk_nil());
        assert_eq!(spelled, direct);
        assert_eq!(mk_const(NILC), mk_nil());
    }

    #[test]
    fn list_roundtrip() {
        let l = mk_list(vec![mk_int(1), mk_int(2), mk_int(3)]);
        let back = l.as_list().unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[2], mk_int(3));
    }

    #[test]
    fn display_shows_levels_and_symbols() {
        let f = intern("f");
        let t = mk_lam(mk_app(f, vec![mk_const(0)]));
        assert_eq!(format!("{}", t), "(\\ (f x0))");
    }
}
