use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::errors::{ RunResult, error, anomaly };
use crate::index::{ IndexKey, PredIndex };
use crate::store::Store;
use crate::symbols::{ self, ConstId };
use crate::term::{ Term, InnerTerm::*, mk_const };
use crate::motion;

/// A compiled clause. `head_args`/`body` may contain `Arg` slots numbered
/// below `nvars`; those are replaced by fresh unification variables when
/// the clause is selected. `depth` is the binding depth the clause was
/// created at : 0 for program clauses, the current depth for clauses
/// loaded hypothetically by `=>`. Clauses are immutable once built.
#[derive(Debug, Clone)]
pub struct Clause {
    pub depth : usize,
    pub head_const : ConstId,
    pub head_args : Vec<Term>,
    pub body : Term,
    pub nvars : usize,
    pub graft : Option<Graft>,
    pub name : Option<String>,
}

/// Placement annotation resolved at load time : the clause is spliced
/// into the predicate's list relative to the named anchor clause instead
/// of appended in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Graft {
    Before(String),
    After(String),
}

impl Clause {
    pub fn fact(depth : usize, head_const : ConstId, head_args : Vec<Term>) -> Self {
        Clause {
            depth,
            head_const,
            head_args,
            body : mk_const(symbols::TRUE),
            nvars : 0,
            graft : None,
            name : None,
        }
    }

    /// First-argument index key, or `None` when the clause must be a
    /// wildcard (no first argument, or a flex/slot first argument).
    pub fn index_key(&self) -> Option<IndexKey> {
        let arg = self.head_args.get(0)?;
        match arg.as_ref() {
            Const { c } => Some(IndexKey::ConstK(*c)),
            App { hd, .. } => Some(IndexKey::ConstK(*hd)),
            Cons {..} => Some(IndexKey::ConsK),
            Nil => Some(IndexKey::NilK),
            Lam {..} => Some(IndexKey::LamK),
            Data { data } => Some(IndexKey::DataK(data.class())),
            _ => None,
        }
    }
}

/// An ordered program as produced by the external compiler.
pub struct Program {
    pub clauses : Vec<Clause>,
}

/// A compiled query : a goal over `nvars` slots plus the mapping from the
/// user-visible variable names to slots, used to publish assignments.
pub struct Query {
    pub nvars : usize,
    pub var_names : IndexMap<String, usize>,
    pub goal : Term,
}

/// The clause database. The base layer is append-only and built at load
/// time; `=>` stacks immutable hypothetical layers above it at run time,
/// so discarding a layer on backtrack is just dropping an `Arc`.
#[derive(Clone)]
pub struct ClauseDb {
    parent : Option<Arc<ClauseDb>>,
    preds : HashMap<ConstId, PredIndex>,
}

impl ClauseDb {
    pub fn base() -> Self {
        ClauseDb { parent : None, preds : HashMap::new() }
    }

    /// Load a program into the base layer, resolving graft annotations.
    /// Splicing is by clause name within the same predicate; a dangling
    /// anchor is an error, not a warning, since silently appending would
    /// reorder the user's clauses.
    pub fn load(&mut self, p : Program) -> RunResult<()> {
        let mut ordered : IndexMap<ConstId, Vec<Arc<Clause>>> = IndexMap::new();
        for (c, idx) in self.preds.drain() {
            ordered.insert(c, idx.all().to_vec());
        }
        for clause in p.clauses {
            let list = ordered.entry(clause.head_const).or_insert_with(Vec::new);
            match clause.graft.clone() {
                None => list.push(Arc::new(clause)),
                Some(g) => {
                    let anchor = match &g {
                        Graft::Before(n) | Graft::After(n) => n.clone(),
                    };
                    let pos = list.iter().position(|c| {
                        c.name.as_ref().map(|n| n == &anchor).unwrap_or(false)
                    });
                    match (pos, g) {
                        (Some(i), Graft::Before(_)) => list.insert(i, Arc::new(clause)),
                        (Some(i), Graft::After(_)) => list.insert(i + 1, Arc::new(clause)),
                        (None, _) => {
                            return Err(error(format!(
                                "graft anchor {:?} not found for clause of {}",
                                anchor, symbols::show_const(clause.head_const))))
                        },
                    }
                },
            }
        }
        for (c, list) in ordered {
            self.preds.insert(c, PredIndex::build(list));
        }
        Ok(())
    }

    /// Stack a hypothetical layer holding `clauses` above `parent`.
    pub fn hypothetical(parent : &Arc<ClauseDb>, clauses : Vec<Clause>) -> Arc<ClauseDb> {
        let mut grouped : IndexMap<ConstId, Vec<Arc<Clause>>> = IndexMap::new();
        for c in clauses {
            grouped.entry(c.head_const).or_insert_with(Vec::new).push(Arc::new(c));
        }
        let mut preds = HashMap::new();
        for (c, list) in grouped {
            preds.insert(c, PredIndex::build(list));
        }
        Arc::new(ClauseDb { parent : Some(parent.clone()), preds })
    }

    /// Candidate clauses for a call, newest layer first, in source order
    /// within each layer.
    pub fn candidates(&self, c : ConstId, key : Option<IndexKey>) -> Vec<Arc<Clause>> {
        let mut out = Vec::new();
        let mut layer = Some(self);
        while let Some(db) = layer {
            if let Some(idx) = db.preds.get(&c) {
                out.extend(idx.candidates(key));
            }
            layer = db.parent.as_ref().map(|p| p.as_ref());
        }
        out
    }

    pub fn has_pred(&self, c : ConstId) -> bool {
        if self.preds.contains_key(&c) {
            return true
        }
        match &self.parent {
            Some(p) => p.has_pred(c),
            None => false,
        }
    }
}

/// Turn a runtime term into clauses, as `=>` requires. Accepts a single
/// clause, a conjunction or list of clauses, `pi`-bound clauses (which
/// raise the clause depth), and `head :- body`. The head must be rigid.
pub fn clauses_of_term(store : &mut Store, depth : usize, t : &Term) -> RunResult<Vec<Clause>> {
    let mut out = Vec::new();
    clauses_of_term_core(store, depth, t, &mut out)?;
    Ok(out)
}

fn clauses_of_term_core(store : &mut Store, depth : usize, t : &Term, out : &mut Vec<Clause>)
    -> RunResult<()>
{
    let t = motion::deref(store, depth, t)?;
    match t.as_ref() {
        App { hd, args } if *hd == symbols::AND || *hd == symbols::AMP => {
            for a in args {
                clauses_of_term_core(store, depth, a, out)?;
            }
            Ok(())
        },
        Cons { hd, tl } => {
            clauses_of_term_core(store, depth, hd, out)?;
            clauses_of_term_core(store, depth, tl, out)
        },
        Nil => Ok(()),
        App { hd, args } if *hd == symbols::PI && args.len() == 1 => {
            let inner = motion::deref(store, depth, &args[0])?;
            match inner.as_ref() {
                Lam { body } => clauses_of_term_core(store, depth + 1, body, out),
                _ => Err(error("pi in clause position expects a lambda")),
            }
        },
        App { hd, args } if *hd == symbols::RIMPL && args.len() == 2 => {
            let mut c = head_to_clause(store, depth, &args[0])?;
            c.body = args[1].clone();
            out.push(c);
            Ok(())
        },
        _ => {
            out.push(head_to_clause(store, depth, &t)?);
            Ok(())
        },
    }
}

fn head_to_clause(store : &mut Store, depth : usize, t : &Term) -> RunResult<Clause> {
    let t = motion::deref(store, depth, t)?;
    match t.as_ref() {
        Const { c } => Ok(Clause::fact(depth, *c, vec![])),
        App { hd, args } => Ok(Clause::fact(depth, *hd, args.clone())),
        UVar {..} | AppUVar {..} | Discard => {
            Err(error("cannot load a clause with a flexible head"))
        },
        Builtin {..} => Err(error("cannot load a clause for a built-in predicate")),
        Arg {..} | AppArg {..} => Err(anomaly("compile-time slot in clause head at run time")),
        _ => Err(error("illegal clause head")),
    }
}

#[cfg(test)]
mod clause_tests {
    use super::*;
    use crate::symbols::intern;
    use crate::term::{ mk_app, mk_int, mk_conj, mk_pi };
    use crate::state::StateMap;

    fn store() -> Store {
        Store::new(StateMap::new(Arc::new(vec![])))
    }

    #[test]
    fn graft_before_splices_in_front_of_anchor() {
        let p = intern("gp");
        let mut db = ClauseDb::base();
        let mut base = Clause::fact(0, p, vec![mk_int(1)]);
        base.name = Some(String::from("one"));
        db.load(Program { clauses : vec![base] }).unwrap();
        let mut grafted = Clause::fact(0, p, vec![mk_int(0)]);
        grafted.graft = Some(Graft::Before(String::from("one")));
        db.load(Program { clauses : vec![grafted] }).unwrap();
        let cands = db.candidates(p, None);
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].head_args[0], mk_int(0));
        assert_eq!(cands[1].head_args[0], mk_int(1));
    }

    #[test]
    fn dangling_graft_anchor_is_an_error() {
        let p = intern("gq");
        let mut db = ClauseDb::base();
        let mut c = Clause::fact(0, p, vec![mk_int(0)]);
        c.graft = Some(Graft::After(String::from("missing")));
        assert!(db.load(Program { clauses : vec![c] }).is_err());
    }

    #[test]
    fn hypothetical_layers_shadow_in_front() {
        let p = intern("gr");
        let mut db = ClauseDb::base();
        db.load(Program { clauses : vec![Clause::fact(0, p, vec![mk_int(1)])] }).unwrap();
        let base = Arc::new(db);
        let layered = ClauseDb::hypothetical(&base, vec![Clause::fact(0, p, vec![mk_int(2)])]);
        let cands = layered.candidates(p, None);
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].head_args[0], mk_int(2));
    }

    #[test]
    fn conj_and_rule_terms_clausify() {
        let p = intern("gs");
        let q = intern("gt");
        let mut st = store();
        let t = mk_conj(
            mk_app(p, vec![mk_int(1)]),
            mk_app(symbols::RIMPL, vec![mk_app(q, vec![mk_int(2)]), mk_app(p, vec![mk_int(1)])]),
        );
        let cs = clauses_of_term(&mut st, 0, &t).unwrap();
        assert_eq!(cs.len(), 2);
        assert_eq!(cs[0].head_const, p);
        assert_eq!(cs[1].head_const, q);
        assert_eq!(cs[1].body, mk_app(p, vec![mk_int(1)]));
    }

    #[test]
    fn pi_raises_clause_depth() {
        let p = intern("gu");
        let mut st = store();
        // pi x\ p x
        let t = mk_pi(mk_app(p, vec![crate::term::mk_const(0)]));
        let cs = clauses_of_term(&mut st, 0, &t).unwrap();
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0].depth, 1);
    }
}
