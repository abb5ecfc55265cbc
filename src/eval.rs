use std::io::{ BufRead, BufReader, Write };
use std::sync::Arc;

use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::cdata::CData;
use crate::errors::{ RunResult, error, type_error };
use crate::motion;
use crate::store::Store;
use crate::symbols::{ self, ConstId };
use crate::term::{ Term, InnerTerm::* };

/// Side-effect-free reduction of arithmetic and string expressions, used
/// by `is` and the comparison built-ins. Evaluable symbols form their own
/// table, separate from the predicate database; every symbol has a fixed
/// arity and dispatches on the exact argument types. Mixed numeric
/// arguments are a type error, never an implicit coercion.
pub struct Evaluator {
    table : FxHashMap<ConstId, EvalEntry>,
}

struct EvalEntry {
    name : &'static str,
    arity : usize,
    run : fn(&[CData]) -> RunResult<CData>,
}

fn int2(name : &str, args : &[CData]) -> RunResult<(i64, i64)> {
    match (&args[0], &args[1]) {
        (CData::Int(a), CData::Int(b)) => Ok((*a, *b)),
        _ => Err(type_error(format!("{} : expected two integers", name))),
    }
}

impl Evaluator {
    pub fn standard() -> Self {
        let mut ev = Evaluator { table : FxHashMap::default() };
        ev.entry("+", 2, |args| match (&args[0], &args[1]) {
            (CData::Int(a), CData::Int(b)) => Ok(CData::Int(a.wrapping_add(*b))),
            (CData::Float(a), CData::Float(b)) => Ok(CData::Float(a + b)),
            _ => Err(type_error("+ : arguments must both be int or both be float")),
        });
        ev.entry("-", 2, |args| match (&args[0], &args[1]) {
            (CData::Int(a), CData::Int(b)) => Ok(CData::Int(a.wrapping_sub(*b))),
            (CData::Float(a), CData::Float(b)) => Ok(CData::Float(a - b)),
            _ => Err(type_error("- : arguments must both be int or both be float")),
        });
        ev.entry("*", 2, |args| match (&args[0], &args[1]) {
            (CData::Int(a), CData::Int(b)) => Ok(CData::Int(a.wrapping_mul(*b))),
            (CData::Float(a), CData::Float(b)) => Ok(CData::Float(a * b)),
            _ => Err(type_error("* : arguments must both be int or both be float")),
        });
        ev.entry("div", 2, |args| {
            let (a, b) = int2("div", args)?;
            if b == 0 {
                return Err(error("div : division by zero"))
            }
            Ok(CData::Int(a / b))
        });
        ev.entry("/", 2, |args| match (&args[0], &args[1]) {
            (CData::Float(a), CData::Float(b)) => Ok(CData::Float(a / b)),
            _ => Err(type_error("/ : arguments must both be float (use div on int)")),
        });
        ev.entry("mod", 2, |args| {
            let (a, b) = int2("mod", args)?;
            if b == 0 {
                return Err(error("mod : division by zero"))
            }
            Ok(CData::Int(a.rem_euclid(b)))
        });
        ev.entry("min", 2, |args| match (&args[0], &args[1]) {
            (CData::Int(a), CData::Int(b)) => Ok(CData::Int(*a.min(b))),
            (CData::Float(a), CData::Float(b)) => Ok(CData::Float(a.min(*b))),
            _ => Err(type_error("min : arguments must both be int or both be float")),
        });
        ev.entry("max", 2, |args| match (&args[0], &args[1]) {
            (CData::Int(a), CData::Int(b)) => Ok(CData::Int(*a.max(b))),
            (CData::Float(a), CData::Float(b)) => Ok(CData::Float(a.max(*b))),
            _ => Err(type_error("max : arguments must both be int or both be float")),
        });
        ev.entry("abs", 1, |args| match &args[0] {
            CData::Int(a) => Ok(CData::Int(a.wrapping_abs())),
            CData::Float(a) => Ok(CData::Float(a.abs())),
            _ => Err(type_error("abs : expected a number")),
        });
        ev.entry("sqrt", 1, |args| match &args[0] {
            CData::Float(a) => Ok(CData::Float(a.sqrt())),
            _ => Err(type_error("sqrt : expected a float")),
        });
        ev.entry("int_to_real", 1, |args| match &args[0] {
            CData::Int(a) => Ok(CData::Float(*a as f64)),
            _ => Err(type_error("int_to_real : expected an int")),
        });
        ev.entry("real_to_int", 1, |args| match &args[0] {
            CData::Float(a) => Ok(CData::Int(*a as i64)),
            _ => Err(type_error("real_to_int : expected a float")),
        });
        ev.entry("^", 2, |args| match (&args[0], &args[1]) {
            (CData::Str(a), CData::Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(CData::Str(Arc::new(s)))
            },
            _ => Err(type_error("^ : expected two strings")),
        });
        ev.entry("size", 1, |args| match &args[0] {
            CData::Str(a) => Ok(CData::Int(a.chars().count() as i64)),
            _ => Err(type_error("size : expected a string")),
        });
        ev
    }

    fn entry(&mut self, name : &'static str, arity : usize, run : fn(&[CData]) -> RunResult<CData>) {
        let c = symbols::intern(name);
        self.table.insert(c, EvalEntry { name, arity, run });
    }

    /// Register a host evaluable symbol; construction-time only.
    pub fn register(&mut self, name : &'static str, arity : usize,
                    run : fn(&[CData]) -> RunResult<CData>) {
        self.entry(name, arity, run)
    }

    /// Evaluate `t` to a primitive datum. `t` must dereference to a tree
    /// of registered evaluable symbols over primitive leaves; an unbound
    /// variable anywhere is a regular error (the term is not closed).
    pub fn eval(&self, store : &mut Store, depth : usize, t : &Term) -> RunResult<CData> {
        let t = motion::deref(store, depth, t)?;
        match t.as_ref() {
            Data { data } => Ok(data.clone()),
            Const { c } => {
                let e = self.table.get(c)
                    .ok_or_else(|| type_error(format!("{} is not evaluable", t)))?;
                if e.arity != 0 {
                    return Err(type_error(format!("{} expects {} arguments", e.name, e.arity)))
                }
                (e.run)(&[])
            },
            App { hd, args } => {
                let e = self.table.get(hd)
                    .ok_or_else(|| type_error(format!("{} is not evaluable",
                                                      symbols::show_const(*hd))))?;
                if e.arity != args.len() {
                    return Err(type_error(format!("{} expects {} arguments, got {}",
                                                  e.name, e.arity, args.len())))
                }
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(self.eval(store, depth, a)?);
                }
                (e.run)(&vals)
            },
            UVar {..} | AppUVar {..} | Discard => {
                Err(error("cannot evaluate a non-closed term"))
            },
            _ => Err(type_error(format!("{} is not an arithmetic expression", t))),
        }
    }
}

/// Process-wide stream handle tables. Handle 0 is standard input, 1 is
/// standard output, 2 is standard error; `open_in`/`open_out` hand out
/// handles from 3 upward. Closing is explicit : backtracking never
/// closes a stream, by design — side-effecting built-ins live outside
/// the logical model.
enum StreamEntry {
    In(BufReader<Box<dyn std::io::Read + Send>>),
    Out(Box<dyn Write + Send>),
}

struct Streams {
    table : FxHashMap<i64, StreamEntry>,
    next : i64,
}

static STREAMS : Lazy<Mutex<Streams>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    table.insert(0, StreamEntry::In(BufReader::new(
        Box::new(std::io::stdin()) as Box<dyn std::io::Read + Send>)));
    table.insert(1, StreamEntry::Out(Box::new(std::io::stdout())));
    table.insert(2, StreamEntry::Out(Box::new(std::io::stderr())));
    Mutex::new(Streams { table, next : 3 })
});

pub fn open_in(path : &str) -> RunResult<i64> {
    let f = std::fs::File::open(path)
        .map_err(|e| error(format!("open_in {:?} : {}", path, e)))?;
    let mut streams = STREAMS.lock();
    let h = streams.next;
    streams.next += 1;
    streams.table.insert(h, StreamEntry::In(BufReader::new(
        Box::new(f) as Box<dyn std::io::Read + Send>)));
    Ok(h)
}

pub fn open_out(path : &str) -> RunResult<i64> {
    let f = std::fs::File::create(path)
        .map_err(|e| error(format!("open_out {:?} : {}", path, e)))?;
    let mut streams = STREAMS.lock();
    let h = streams.next;
    streams.next += 1;
    streams.table.insert(h, StreamEntry::Out(Box::new(f)));
    Ok(h)
}

pub fn output(h : i64, s : &str) -> RunResult<()> {
    let mut streams = STREAMS.lock();
    match streams.table.get_mut(&h) {
        Some(StreamEntry::Out(w)) => {
            w.write_all(s.as_bytes()).map_err(|e| error(format!("output : {}", e)))
        },
        Some(StreamEntry::In(_)) => Err(type_error("output : handle is an input stream")),
        None => Err(error(format!("output : unknown stream handle {}", h))),
    }
}

pub fn flush(h : i64) -> RunResult<()> {
    let mut streams = STREAMS.lock();
    match streams.table.get_mut(&h) {
        Some(StreamEntry::Out(w)) => {
            w.flush().map_err(|e| error(format!("flush : {}", e)))
        },
        Some(StreamEntry::In(_)) => Err(type_error("flush : handle is an input stream")),
        None => Err(error(format!("flush : unknown stream handle {}", h))),
    }
}

pub fn input_line(h : i64) -> RunResult<String> {
    let mut streams = STREAMS.lock();
    match streams.table.get_mut(&h) {
        Some(StreamEntry::In(r)) => {
            let mut line = String::new();
            r.read_line(&mut line).map_err(|e| error(format!("input_line : {}", e)))?;
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            Ok(line)
        },
        Some(StreamEntry::Out(_)) => Err(type_error("input_line : handle is an output stream")),
        None => Err(error(format!("input_line : unknown stream handle {}", h))),
    }
}

pub fn close_stream(h : i64) -> RunResult<()> {
    if h <= 2 {
        return Err(error("cannot close a standard stream"))
    }
    let mut streams = STREAMS.lock();
    match streams.table.remove(&h) {
        Some(_) => Ok(()),
        None => Err(error(format!("close : unknown stream handle {}", h))),
    }
}
