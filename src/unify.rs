use log::trace;
use smallvec::SmallVec;

use crate::errors::{ RunErr, anomaly };
use crate::motion::{ deref, beta_apply, mov, relocate, prune_positions, LevelMap, MoveFail };
use crate::store::Store;
use crate::symbols::ConstId;
use crate::term::{ Term, InnerTerm::*, UVarRef,
                   mk_const, mk_lam, mk_app_uvar };

/// Why a unification did not succeed. `Fail` is ordinary logical failure
/// (rigid mismatch, occurs check, scope extrusion) and sends the solver
/// back to the last choice point. `Delay` means the equation fell
/// outside the higher-order pattern fragment; the solver parks it on the
/// returned blockers when delaying is enabled.
#[derive(Debug)]
pub enum UnifFail {
    Fail,
    Delay { blockers : Vec<UVarRef> },
    Err(RunErr),
}

impl From<RunErr> for UnifFail {
    fn from(e : RunErr) -> UnifFail {
        UnifFail::Err(e)
    }
}

/// Entry point. Takes a trail mark on entry; a failing or delayed
/// unification leaves the trail unwound to it, so partial bindings never
/// leak. On `Delay` the blockers are the unbound cells of the original
/// equation, collected after the rollback.
pub fn unify(store : &mut Store, depth : usize, a : &Term, b : &Term) -> Result<(), UnifFail> {
    trace!("unify @{} {} = {}", depth, a, b);
    let mark = store.mark();
    match unif(store, depth, a, b) {
        Ok(()) => Ok(()),
        Err(UnifFail::Fail) => {
            store.undo_to(mark);
            Err(UnifFail::Fail)
        },
        Err(UnifFail::Delay {..}) => {
            store.undo_to(mark);
            let mut blockers = Vec::new();
            collect_unbound(store, a, &mut blockers);
            collect_unbound(store, b, &mut blockers);
            if blockers.is_empty() {
                return Err(UnifFail::Fail)
            }
            Err(UnifFail::Delay { blockers })
        },
        Err(e) => Err(e),
    }
}

fn collect_unbound(store : &Store, t : &Term, acc : &mut Vec<UVarRef>) {
    match t.as_ref() {
        UVar { cell, .. } => match store.value_of(*cell) {
            None => {
                if !acc.contains(cell) {
                    acc.push(*cell);
                }
            },
            Some(v) => {
                let v = v.clone();
                collect_unbound(store, &v, acc)
            },
        },
        AppUVar { cell, args, .. } => {
            match store.value_of(*cell) {
                None => {
                    if !acc.contains(cell) {
                        acc.push(*cell);
                    }
                },
                Some(v) => {
                    let v = v.clone();
                    collect_unbound(store, &v, acc)
                },
            }
            for a in args {
                collect_unbound(store, a, acc);
            }
        },
        Lam { body } => collect_unbound(store, body, acc),
        App { args, .. } | Builtin { args, .. } | AppArg { args, .. } => {
            for a in args {
                collect_unbound(store, a, acc);
            }
        },
        Cons { hd, tl } => {
            collect_unbound(store, hd, acc);
            collect_unbound(store, tl, acc);
        },
        _ => (),
    }
}

enum FlexArgs {
    Eta(usize),
    Explicit(Vec<Term>),
}

struct FlexView {
    cell : UVarRef,
    from : usize,
    args : FlexArgs,
}

fn flex_view(t : &Term) -> Option<FlexView> {
    match t.as_ref() {
        UVar { cell, from, nargs } => {
            Some(FlexView { cell : *cell, from : *from, args : FlexArgs::Eta(*nargs) })
        },
        AppUVar { cell, from, args } => {
            Some(FlexView { cell : *cell, from : *from, args : FlexArgs::Explicit(args.clone()) })
        },
        _ => None,
    }
}

/// The pattern-fragment test : every argument must dereference to a
/// distinct bound variable at a level in `[from, depth)`. The η form
/// satisfies it by construction.
type PatternLevels = SmallVec<[usize; 8]>;

fn pattern_args(store : &mut Store, depth : usize, v : &FlexView)
    -> Result<Option<PatternLevels>, UnifFail>
{
    match &v.args {
        FlexArgs::Eta(n) => Ok(Some((v.from..v.from + *n).collect())),
        FlexArgs::Explicit(args) => {
            let mut levels = PatternLevels::new();
            for a in args {
                let a = deref(store, depth, a)?;
                match a.get_const() {
                    Some(c) if c >= 0 => {
                        let u = c as usize;
                        if u < v.from || u >= depth || levels.contains(&u) {
                            return Ok(None)
                        }
                        levels.push(u);
                    },
                    _ => return Ok(None),
                }
            }
            Ok(Some(levels))
        },
    }
}

fn unif(store : &mut Store, depth : usize, a : &Term, b : &Term) -> Result<(), UnifFail> {
    let a = deref(store, depth, a)?;
    let b = deref(store, depth, b)?;
    if a.check_ptr_eq(&b) {
        return Ok(())
    }
    match (a.as_ref(), b.as_ref()) {
        (Discard, _) | (_, Discard) => return Ok(()),
        _ => (),
    }
    match (flex_view(&a), flex_view(&b)) {
        (Some(x), Some(y)) => flex_flex(store, depth, &x, &y),
        (Some(x), None) => flex_rigid(store, depth, &x, &b),
        (None, Some(y)) => flex_rigid(store, depth, &y, &a),
        (None, None) => rigid_rigid(store, depth, &a, &b),
    }
}

fn rigid_rigid(store : &mut Store, depth : usize, a : &Term, b : &Term) -> Result<(), UnifFail> {
    match (a.as_ref(), b.as_ref()) {
        (Discard, _) | (_, Discard) => Ok(()),
        (Const { c : c1 }, Const { c : c2 }) => {
            if c1 == c2 { Ok(()) } else { Err(UnifFail::Fail) }
        },
        (Lam { body : b1 }, Lam { body : b2 }) => unif(store, depth + 1, b1, b2),
        (Lam { body }, _) => {
            // η : unify the body against the other side applied to the
            // binder's level
            let applied = beta_apply(store, depth, b, &[mk_const(depth as ConstId)], depth + 1)?;
            unif(store, depth + 1, body, &applied)
        },
        (_, Lam { body }) => {
            let applied = beta_apply(store, depth, a, &[mk_const(depth as ConstId)], depth + 1)?;
            unif(store, depth + 1, &applied, body)
        },
        (App { hd : h1, args : a1 }, App { hd : h2, args : a2 }) => {
            if h1 != h2 || a1.len() != a2.len() {
                return Err(UnifFail::Fail)
            }
            for (x, y) in a1.iter().zip(a2.iter()) {
                unif(store, depth, x, y)?;
            }
            Ok(())
        },
        (Cons { hd : h1, tl : t1 }, Cons { hd : h2, tl : t2 }) => {
            unif(store, depth, h1, h2)?;
            unif(store, depth, t1, t2)
        },
        (Nil, Nil) => Ok(()),
        (Data { data : d1 }, Data { data : d2 }) => {
            if d1 == d2 { Ok(()) } else { Err(UnifFail::Fail) }
        },
        (Builtin { bid : b1, args : a1 }, Builtin { bid : b2, args : a2 }) => {
            if b1 != b2 || a1.len() != a2.len() {
                return Err(UnifFail::Fail)
            }
            for (x, y) in a1.iter().zip(a2.iter()) {
                unif(store, depth, x, y)?;
            }
            Ok(())
        },
        (Arg {..}, _) | (_, Arg {..}) | (AppArg {..}, _) | (_, AppArg {..}) => {
            Err(UnifFail::Err(anomaly("compile-time slot reached the unifier")))
        },
        _ => Err(UnifFail::Fail),
    }
}

fn flex_rigid(store : &mut Store, depth : usize, x : &FlexView, rigid : &Term)
    -> Result<(), UnifFail>
{
    match pattern_args(store, depth, x)? {
        Some(levels) => bind(store, depth, x.cell, x.from, &levels, rigid),
        None => Err(UnifFail::Delay { blockers : vec![] }),
    }
}

fn flex_flex(store : &mut Store, depth : usize, x : &FlexView, y : &FlexView)
    -> Result<(), UnifFail>
{
    if x.cell == y.cell {
        // same cell : keep the argument positions on which both sides
        // agree, prune the rest
        let la = match pattern_args(store, depth, x)? {
            Some(l) => l,
            None => return Err(UnifFail::Delay { blockers : vec![] }),
        };
        let lb = match pattern_args(store, depth, y)? {
            Some(l) => l,
            None => return Err(UnifFail::Delay { blockers : vec![] }),
        };
        if la == lb {
            return Ok(())
        }
        if la.len() != lb.len() {
            return Err(UnifFail::Delay { blockers : vec![] })
        }
        let survivors : Vec<usize> = (0..la.len()).filter(|i| la[*i] == lb[*i]).collect();
        prune_positions(store, x.cell, x.from, la.len(), &survivors);
        return Ok(())
    }
    let la = match pattern_args(store, depth, x)? {
        Some(l) => l,
        None => return Err(UnifFail::Delay { blockers : vec![] }),
    };
    let lb = match pattern_args(store, depth, y)? {
        Some(l) => l,
        None => return Err(UnifFail::Delay { blockers : vec![] }),
    };
    // bind both sides to one fresh variable over the common arguments
    let commons : Vec<usize> = la.iter().cloned().filter(|l| lb.contains(l)).collect();
    let zf = x.from.min(y.from);
    let z = store.fresh_uvar(zf);
    let assign_side = |store : &mut Store, cell : UVarRef, from : usize, levels : &[usize]| {
        let args : Vec<Term> = commons.iter().map(|l| {
            let pos = levels.iter().position(|x| x == l).unwrap();
            mk_const((from + pos) as ConstId)
        }).collect();
        let mut body = mk_app_uvar(z, zf, args);
        for _ in 0..levels.len() {
            body = mk_lam(body);
        }
        store.assign(cell, body);
    };
    assign_side(store, x.cell, x.from, &la);
    assign_side(store, y.cell, y.from, &lb);
    Ok(())
}

/// Pattern binding : solve `X l1 … ln = rhs` where the `li` are distinct
/// bound levels in `[X.from, depth)`. With no explicit arguments the
/// assignment is a plain `move` of `rhs` down to the variable's depth;
/// otherwise the value is `λ^n body` with each `li` renamed to the
/// matching binder through the `Pattern` level map. Pruning and the
/// occurs check happen inside the relocation.
fn bind(store : &mut Store, depth : usize, cell : UVarRef, from : usize, levels : &[usize],
        rhs : &Term) -> Result<(), UnifFail> {
    let body = if levels.is_empty() {
        mov(store, depth, from, Some(cell), rhs)
    } else {
        relocate(store, &LevelMap::Pattern { from, levels, depth }, Some(cell), rhs)
    };
    match body {
        Ok(body) => {
            let mut value = body;
            for _ in 0..levels.len() {
                value = mk_lam(value);
            }
            trace!("bind _{:?} := {}", cell, value);
            store.assign(cell, value);
            Ok(())
        },
        Err(MoveFail::Occurs) | Err(MoveFail::Scope) => Err(UnifFail::Fail),
        Err(MoveFail::Outside) => Err(UnifFail::Delay { blockers : vec![] }),
        Err(MoveFail::Fatal(e)) => Err(UnifFail::Err(e)),
    }
}

/// Convenience wrapper asserting a plain first-order equation holds.
#[cfg(test)]
fn must_unify(store : &mut Store, depth : usize, a : &Term, b : &Term) {
    match unify(store, depth, a, b) {
        Ok(()) => (),
        other => panic!("expected success, got {:?}", other),
    }
}
