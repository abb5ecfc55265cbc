use std::sync::Arc;

use fxhash::FxHashMap;
use indexmap::IndexMap;

use crate::cdata::CData;
use crate::clause::ClauseDb;
use crate::cli::Options;
use crate::constraints::Suspension;
use crate::errors::{ Signal, error, type_error };
use crate::eval::{ self, Evaluator };
use crate::motion;
use crate::store::Store;
use crate::symbols::{ self, ConstId };
use crate::term::{ Term, InnerTerm::*, BuiltinId, mk_eq, mk_int, mk_str };

/// What a built-in handler sees : the current binding depth, the
/// hypothetical program in force, the whole mutable store (constraint
/// store and host state components included) and the evaluator. A
/// handler returns extra goals — typically equalities asserting its
/// outputs — or signals `NoClause` to backtrack, or a fatal error.
pub struct BuiltinCtx<'a> {
    pub depth : usize,
    pub hyps : &'a Arc<ClauseDb>,
    pub store : &'a mut Store,
    pub evaluator : &'a Evaluator,
    pub options : &'a Options,
}

pub type BuiltinFn = Box<dyn Fn(&mut BuiltinCtx, &[Term]) -> Result<Vec<Term>, Signal> + Send + Sync>;

pub struct BuiltinDecl {
    pub name : String,
    /// `None` means variadic.
    pub arity : Option<usize>,
    pub docs : String,
    run : BuiltinFn,
}

/// Registry of foreign predicates, fixed at interpreter construction.
/// Heads are dispatched either through an explicit `Builtin` node or by
/// constant id, whichever the compiler produced.
pub struct BuiltinRegistry {
    items : Vec<BuiltinDecl>,
    by_name : IndexMap<String, BuiltinId>,
    by_const : FxHashMap<ConstId, BuiltinId>,
}

impl BuiltinRegistry {
    pub fn empty() -> Self {
        BuiltinRegistry {
            items : Vec::new(),
            by_name : IndexMap::new(),
            by_const : FxHashMap::default(),
        }
    }

    pub fn register(&mut self, name : &str, arity : Option<usize>, docs : &str, run : BuiltinFn)
        -> BuiltinId
    {
        let bid = self.items.len();
        let c = symbols::intern(name);
        self.items.push(BuiltinDecl {
            name : String::from(name),
            arity,
            docs : String::from(docs),
            run,
        });
        self.by_name.insert(String::from(name), bid);
        self.by_const.insert(c, bid);
        bid
    }

    pub fn lookup_const(&self, c : ConstId) -> Option<BuiltinId> {
        self.by_const.get(&c).copied()
    }

    pub fn lookup_name(&self, name : &str) -> Option<BuiltinId> {
        self.by_name.get(name).copied()
    }

    /// Dispatch a call. The declared arity is enforced here, so handlers
    /// can index their arguments without checking.
    pub fn run(&self, bid : BuiltinId, ctx : &mut BuiltinCtx, args : &[Term])
        -> Result<Vec<Term>, Signal>
    {
        let decl = match self.items.get(bid) {
            Some(d) => d,
            None => return Err(Signal::Fatal(error(format!("unknown builtin id {}", bid)))),
        };
        if let Some(n) = decl.arity {
            if n != args.len() {
                return Err(Signal::Fatal(type_error(format!(
                    "{} expects {} arguments, got {}", decl.name, n, args.len()))))
            }
        }
        (decl.run)(ctx, args)
    }

    /// Render the registry for `-document-builtins`.
    pub fn document(&self) -> String {
        let mut out = String::new();
        for d in self.items.iter() {
            match d.arity {
                Some(n) => out.push_str(&format!("{}/{}\n    {}\n", d.name, n, d.docs)),
                None => out.push_str(&format!("{}/...\n    {}\n", d.name, d.docs)),
            }
        }
        out
    }

    /// The standard library every interpreter starts from.
    pub fn standard() -> Self {
        let mut reg = BuiltinRegistry::empty();

        reg.register("is", Some(2), "unifies its first argument with the value of its second",
            Box::new(|ctx, args| {
                let v = ctx.evaluator.eval(ctx.store, ctx.depth, &args[1])?;
                Ok(vec![mk_eq(args[0].clone(), crate::term::mk_cdata(v))])
            }));

        fn comparison(name : &'static str, int_ok : fn(i64, i64) -> bool,
                      float_ok : fn(f64, f64) -> bool, str_ok : fn(&str, &str) -> bool)
            -> BuiltinFn
        {
            Box::new(move |ctx, args| {
                let a = ctx.evaluator.eval(ctx.store, ctx.depth, &args[0])?;
                let b = ctx.evaluator.eval(ctx.store, ctx.depth, &args[1])?;
                let holds = match (&a, &b) {
                    (CData::Int(x), CData::Int(y)) => int_ok(*x, *y),
                    (CData::Float(x), CData::Float(y)) => float_ok(*x, *y),
                    (CData::Str(x), CData::Str(y)) => str_ok(x, y),
                    _ => return Err(Signal::Fatal(type_error(format!(
                        "{} : arguments must be two ints, two floats or two strings", name)))),
                };
                if holds { Ok(vec![]) } else { Err(Signal::NoClause) }
            })
        }
        reg.register("<", Some(2), "arithmetic/string strict less-than",
            comparison("<", |a, b| a < b, |a, b| a < b, |a, b| a < b));
        reg.register("=<", Some(2), "arithmetic/string less-or-equal",
            comparison("=<", |a, b| a <= b, |a, b| a <= b, |a, b| a <= b));
        reg.register(">", Some(2), "arithmetic/string strict greater-than",
            comparison(">", |a, b| a > b, |a, b| a > b, |a, b| a > b));
        reg.register(">=", Some(2), "arithmetic/string greater-or-equal",
            comparison(">=", |a, b| a >= b, |a, b| a >= b, |a, b| a >= b));

        reg.register("var", Some(1), "succeeds when its argument is an unbound variable",
            Box::new(|ctx, args| {
                let t = motion::deref(ctx.store, ctx.depth, &args[0])
                    .map_err(Signal::Fatal)?;
                if t.is_flex() { Ok(vec![]) } else { Err(Signal::NoClause) }
            }));

        reg.register("fail", Some(0), "always fails",
            Box::new(|_ctx, _args| Err(Signal::NoClause)));

        reg.register("halt", None, "aborts the query with an error",
            Box::new(|_ctx, _args| Err(Signal::Fatal(error("halt")))));

        reg.register("print", None, "prints its arguments to standard output",
            Box::new(|ctx, args| {
                let mut line = String::new();
                for (i, a) in args.iter().enumerate() {
                    let a = motion::expand(ctx.store, ctx.depth, a).map_err(Signal::Fatal)?;
                    if i > 0 {
                        line.push(' ');
                    }
                    line.push_str(&format!("{}", a));
                }
                line.push('\n');
                eval::output(1, &line)?;
                Ok(vec![])
            }));

        reg.register("declare_constraint", Some(2),
            "suspends its first argument until one of the listed variables is assigned",
            Box::new(|ctx, args| {
                let keys = motion::expand(ctx.store, ctx.depth, &args[1])
                    .map_err(Signal::Fatal)?;
                let keys = keys.as_list().map_err(Signal::Fatal)?;
                let mut blockers = Vec::new();
                for k in keys {
                    match k.as_ref() {
                        UVar { cell, .. } | AppUVar { cell, .. } => {
                            if ctx.store.is_unbound(*cell) && !blockers.contains(cell) {
                                blockers.push(*cell);
                            }
                        },
                        _ => (),
                    }
                }
                if blockers.is_empty() {
                    // nothing to wait for : run the goal now
                    return Ok(vec![args[0].clone()])
                }
                ctx.store.suspend(Suspension {
                    goal : args[0].clone(),
                    depth : ctx.depth,
                    program : ctx.hyps.clone(),
                    blockers,
                });
                Ok(vec![])
            }));

        reg.register("open_in", Some(2), "opens a file for reading, unifying a stream handle",
            Box::new(|ctx, args| {
                let path = string_arg(ctx, "open_in", &args[0])?;
                let h = eval::open_in(&path)?;
                Ok(vec![mk_eq(args[1].clone(), mk_int(h))])
            }));

        reg.register("open_out", Some(2), "opens a file for writing, unifying a stream handle",
            Box::new(|ctx, args| {
                let path = string_arg(ctx, "open_out", &args[0])?;
                let h = eval::open_out(&path)?;
                Ok(vec![mk_eq(args[1].clone(), mk_int(h))])
            }));

        reg.register("output", Some(2), "writes a string to an output stream handle",
            Box::new(|ctx, args| {
                let h = int_arg(ctx, "output", &args[0])?;
                let s = string_arg(ctx, "output", &args[1])?;
                eval::output(h, &s)?;
                Ok(vec![])
            }));

        reg.register("flush", Some(1), "flushes an output stream handle",
            Box::new(|ctx, args| {
                let h = int_arg(ctx, "flush", &args[0])?;
                eval::flush(h)?;
                Ok(vec![])
            }));

        reg.register("input_line", Some(2), "reads one line from an input stream handle",
            Box::new(|ctx, args| {
                let h = int_arg(ctx, "input_line", &args[0])?;
                let line = eval::input_line(h)?;
                Ok(vec![mk_eq(args[1].clone(), mk_str(&line))])
            }));

        reg.register("close_in", Some(1), "closes an input stream handle",
            Box::new(|ctx, args| {
                let h = int_arg(ctx, "close_in", &args[0])?;
                eval::close_stream(h)?;
                Ok(vec![])
            }));

        reg.register("close_out", Some(1), "closes an output stream handle",
            Box::new(|ctx, args| {
                let h = int_arg(ctx, "close_out", &args[0])?;
                eval::close_stream(h)?;
                Ok(vec![])
            }));

        reg
    }
}

fn int_arg(ctx : &mut BuiltinCtx, who : &str, t : &Term) -> Result<i64, Signal> {
    let t = motion::deref(ctx.store, ctx.depth, t).map_err(Signal::Fatal)?;
    match t.as_ref() {
        Data { data : CData::Int(i) } => Ok(*i),
        _ => Err(Signal::Fatal(type_error(format!("{} : expected an int, got {}", who, t)))),
    }
}

fn string_arg(ctx : &mut BuiltinCtx, who : &str, t : &Term) -> Result<String, Signal> {
    let t = motion::deref(ctx.store, ctx.depth, t).map_err(Signal::Fatal)?;
    match t.as_ref() {
        Data { data : CData::Str(s) } => Ok(String::from(s.as_str())),
        _ => Err(Signal::Fatal(type_error(format!("{} : expected a string, got {}", who, t)))),
    }
}

#[cfg(test)]
mod builtin_tests {
    use super::*;
    use crate::state::StateMap;

    fn fixture() -> (Arc<ClauseDb>, Store, Evaluator, Options) {
        (Arc::new(ClauseDb::base()),
         Store::new(StateMap::new(Arc::new(vec![]))),
         Evaluator::standard(),
         Options::default())
    }

    #[test]
    fn is_returns_an_output_equality() {
        let (db, mut store, ev, opts) = fixture();
        let reg = BuiltinRegistry::standard();
        let bid = reg.lookup_name("is").unwrap();
        let x = store.fresh_uvar(0);
        let mut ctx = BuiltinCtx {
            depth : 0, hyps : &db, store : &mut store, evaluator : &ev, options : &opts,
        };
        let plus = symbols::intern("+");
        let goal = [crate::term::mk_uvar(x, 0, 0),
                    crate::term::mk_app(plus, vec![mk_int(3), mk_int(4)])];
        let extra = reg.run(bid, &mut ctx, &goal).unwrap();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0], mk_eq(goal[0].clone(), mk_int(7)));
    }

    #[test]
    fn comparisons_signal_no_clause_on_false() {
        let (db, mut store, ev, opts) = fixture();
        let reg = BuiltinRegistry::standard();
        let lt = reg.lookup_name("<").unwrap();
        let mut ctx = BuiltinCtx {
            depth : 0, hyps : &db, store : &mut store, evaluator : &ev, options : &opts,
        };
        assert!(reg.run(lt, &mut ctx, &[mk_int(1), mk_int(2)]).is_ok());
        match reg.run(lt, &mut ctx, &[mk_int(2), mk_int(1)]) {
            Err(Signal::NoClause) => (),
            other => panic!("expected NoClause, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn arity_is_enforced_at_the_call_site() {
        let (db, mut store, ev, opts) = fixture();
        let reg = BuiltinRegistry::standard();
        let lt = reg.lookup_name("<").unwrap();
        let mut ctx = BuiltinCtx {
            depth : 0, hyps : &db, store : &mut store, evaluator : &ev, options : &opts,
        };
        match reg.run(lt, &mut ctx, &[mk_int(1)]) {
            Err(Signal::Fatal(crate::errors::RunErr::Type {..})) => (),
            other => panic!("expected type error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn declare_constraint_suspends_on_unbound_keys() {
        let (db, mut store, ev, opts) = fixture();
        let reg = BuiltinRegistry::standard();
        let dc = reg.lookup_name("declare_constraint").unwrap();
        let x = store.fresh_uvar(0);
        let goal = mk_int(0);
        let keys = crate::term::mk_list(vec![crate::term::mk_uvar(x, 0, 0)]);
        let mut ctx = BuiltinCtx {
            depth : 0, hyps : &db, store : &mut store, evaluator : &ev, options : &opts,
        };
        let extra = reg.run(dc, &mut ctx, &[goal, keys]).unwrap();
        assert!(extra.is_empty());
        assert_eq!(store.constraints.live_count(), 1);
    }
}
