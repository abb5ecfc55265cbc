use std::sync::Arc;

use indexmap::IndexMap;
use log::{ debug, trace };

use crate::builtins::{ BuiltinCtx, BuiltinRegistry };
use crate::clause::{ Clause, ClauseDb, Query, clauses_of_term };
use crate::cli::Options;
use crate::constraints::Suspension;
use crate::errors::{ RunResult, Signal, anomaly, error, type_error };
use crate::eval::Evaluator;
use crate::index::IndexKey;
use crate::motion;
use crate::state::{ ComponentDecl, StateMap, StateValue };
use crate::store::{ Store, TrailMark };
use crate::symbols::{ self, ConstId };
use crate::term::{ Term, InnerTerm::*, mk_eq, mk_uvar };
use crate::unify::{ unify, UnifFail };

/// A goal waiting on the stack, with everything needed to dispatch it :
/// its binding depth, the program in force (base layer plus whatever
/// `=>` stacked on top), and the choice-stack height a `!` inside it
/// cuts back to.
#[derive(Clone)]
struct Goal {
    depth : usize,
    program : Arc<ClauseDb>,
    term : Term,
    cut_to : usize,
}

enum Alternative {
    /// Remaining candidate clauses for a predicate call.
    Clauses { goal : Goal, cands : Vec<Arc<Clause>>, next : usize },
    /// The right branch of `;`.
    Disjunct { goal : Goal },
}

struct ChoicePoint {
    trail_mark : TrailMark,
    goals : Vec<Goal>,
    alt : Alternative,
    constraint_mark : usize,
}

/// A live constraint published with a solution.
pub struct SuspendedGoal {
    pub goal : Term,
    pub depth : usize,
}

pub struct Solution {
    pub assignments : IndexMap<String, Term>,
    pub constraints : Vec<SuspendedGoal>,
    pub state : Vec<(String, StateValue)>,
}

pub enum Outcome {
    Success(Solution),
    Failure,
    /// The `max_steps` bound ran out between two goal dispatches. The
    /// machine is internally consistent but can only be restarted, not
    /// resumed.
    NoMoreSteps,
}

/// One SLD resolution run over a query. Created by the interpreter
/// facade; `next` produces the first solution, then one more per call
/// by backtracking into the remaining choice points.
pub struct Machine {
    store : Store,
    goals : Vec<Goal>,
    choices : Vec<ChoicePoint>,
    builtins : Arc<BuiltinRegistry>,
    evaluator : Arc<Evaluator>,
    options : Options,
    steps : usize,
    var_names : IndexMap<String, usize>,
    env : Vec<Term>,
    started : bool,
}

impl Machine {
    pub fn new(program : Arc<ClauseDb>,
               builtins : Arc<BuiltinRegistry>,
               evaluator : Arc<Evaluator>,
               components : Arc<Vec<ComponentDecl>>,
               options : Options,
               query : Query) -> RunResult<Machine> {
        let mut store = Store::new(StateMap::new(components));
        let env : Vec<Term> = (0..query.nvars)
            .map(|_| {
                let r = store.fresh_uvar(0);
                mk_uvar(r, 0, 0)
            })
            .collect();
        let term = motion::instantiate(&mut store, 0, 0, &env, &query.goal)?;
        let goals = vec![Goal { depth : 0, program, term, cut_to : 0 }];
        Ok(Machine {
            store,
            goals,
            choices : Vec::new(),
            builtins,
            evaluator,
            options,
            steps : 0,
            var_names : query.var_names,
            env,
            started : false,
        })
    }

    /// Produce the next solution. The first call runs the query; later
    /// calls backtrack for an alternative. After `Failure` the machine
    /// is exhausted and keeps answering `Failure`.
    pub fn next(&mut self) -> RunResult<Outcome> {
        if self.started {
            if !self.backtrack()? {
                return Ok(Outcome::Failure)
            }
        }
        self.started = true;
        self.run()
    }

    fn run(&mut self) -> RunResult<Outcome> {
        loop {
            // woken suspensions re-enter the goal stack before anything
            // else happens, in particular before any choice point is
            // installed
            while let Some(susp) = self.store.drain_one() {
                let cut_to = self.choices.len();
                trace!("resume @{} {}", susp.depth, susp.goal);
                self.goals.push(Goal {
                    depth : susp.depth,
                    program : susp.program,
                    term : susp.goal,
                    cut_to,
                });
            }
            let goal = match self.goals.pop() {
                Some(g) => g,
                None => {
                    let solution = self.solution()?;
                    return Ok(Outcome::Success(solution))
                },
            };
            if let Some(max) = self.options.max_steps {
                if self.steps >= max {
                    debug!("step bound {} exhausted", max);
                    return Ok(Outcome::NoMoreSteps)
                }
            }
            self.steps += 1;
            if !self.dispatch(goal)? {
                if !self.backtrack()? {
                    return Ok(Outcome::Failure)
                }
            }
        }
    }

    /// Dispatch one goal. `Ok(false)` is logical failure.
    fn dispatch(&mut self, goal : Goal) -> RunResult<bool> {
        let t = motion::deref(&mut self.store, goal.depth, &goal.term)?;
        if self.options.trace {
            trace!("step {} @{} : {}", self.steps, goal.depth, t);
        }
        match t.as_ref() {
            Const { c } => self.dispatch_const(&goal, *c),
            App { hd, args } => {
                let (hd, args) = (*hd, args.clone());
                self.dispatch_app(&goal, hd, args)
            },
            Builtin { bid, args } => {
                let (bid, args) = (*bid, args.clone());
                self.call_builtin(&goal, bid, &args)
            },
            UVar {..} | AppUVar {..} | Discard => {
                Err(error("the goal is a flexible term"))
            },
            Arg {..} | AppArg {..} => {
                Err(anomaly("compile-time slot dispatched as a goal"))
            },
            _ => Err(type_error(format!("{} is not a predicate", t))),
        }
    }

    fn dispatch_const(&mut self, goal : &Goal, c : ConstId) -> RunResult<bool> {
        if c == symbols::TRUE {
            return Ok(true)
        }
        if c == symbols::CUT {
            trace!("cut to {}", goal.cut_to);
            self.choices.truncate(goal.cut_to);
            return Ok(true)
        }
        if let Some(bid) = self.builtins.lookup_const(c) {
            return self.call_builtin(goal, bid, &[])
        }
        self.user_call(goal, c, &[])
    }

    fn dispatch_app(&mut self, goal : &Goal, hd : ConstId, args : Vec<Term>) -> RunResult<bool> {
        if hd == symbols::AND || hd == symbols::AMP {
            for a in args.into_iter().rev() {
                self.goals.push(Goal { term : a, ..goal.clone() });
            }
            return Ok(true)
        }
        if hd == symbols::OR {
            if args.len() != 2 {
                return Err(type_error("; expects two arguments"))
            }
            self.choices.push(ChoicePoint {
                trail_mark : self.store.mark(),
                goals : self.goals.clone(),
                alt : Alternative::Disjunct {
                    goal : Goal { term : args[1].clone(), ..goal.clone() },
                },
                constraint_mark : self.store.constraints.mark(),
            });
            self.goals.push(Goal { term : args[0].clone(), ..goal.clone() });
            return Ok(true)
        }
        if hd == symbols::IMPL {
            if args.len() != 2 {
                return Err(type_error("=> expects two arguments"))
            }
            let hyps = clauses_of_term(&mut self.store, goal.depth, &args[0])?;
            let program = ClauseDb::hypothetical(&goal.program, hyps);
            self.goals.push(Goal {
                depth : goal.depth,
                program,
                term : args[1].clone(),
                cut_to : goal.cut_to,
            });
            return Ok(true)
        }
        if hd == symbols::PI {
            if args.len() != 1 {
                return Err(type_error("pi expects one argument"))
            }
            let inner = motion::deref(&mut self.store, goal.depth, &args[0])?;
            return match inner.as_ref() {
                Lam { body } => {
                    self.goals.push(Goal {
                        depth : goal.depth + 1,
                        program : goal.program.clone(),
                        term : body.clone(),
                        cut_to : goal.cut_to,
                    });
                    Ok(true)
                },
                _ => Err(type_error("pi expects a lambda")),
            }
        }
        if hd == symbols::SIGMA {
            if args.len() != 1 {
                return Err(type_error("sigma expects one argument"))
            }
            let inner = motion::deref(&mut self.store, goal.depth, &args[0])?;
            return match inner.as_ref() {
                Lam { body } => {
                    let body = body.clone();
                    let x = self.store.fresh_uvar(goal.depth);
                    let xt = mk_uvar(x, goal.depth, 0);
                    let instantiated =
                        motion::subst(&mut self.store, goal.depth, &[xt], goal.depth, &body)?;
                    self.goals.push(Goal { term : instantiated, ..goal.clone() });
                    Ok(true)
                },
                _ => Err(type_error("sigma expects a lambda")),
            }
        }
        if hd == symbols::EQ {
            if args.len() != 2 {
                return Err(type_error("= expects two arguments"))
            }
            return self.unify_or_suspend(goal, &args[0], &args[1])
        }
        if hd == symbols::RIMPL {
            return Err(type_error(":- cannot be used as a goal"))
        }
        if let Some(bid) = self.builtins.lookup_const(hd) {
            return self.call_builtin(goal, bid, &args)
        }
        self.user_call(goal, hd, &args)
    }

    /// Run the unifier on `a = b`. On delay the equation is parked on
    /// its unbound variables — or, when delaying is disabled, raising
    /// falling outside the fragment is a solver error, not failure.
    fn unify_or_suspend(&mut self, goal : &Goal, a : &Term, b : &Term) -> RunResult<bool> {
        match unify(&mut self.store, goal.depth, a, b) {
            Ok(()) => Ok(true),
            Err(UnifFail::Fail) => Ok(false),
            Err(UnifFail::Delay { blockers }) => {
                if !self.options.delay_outside_fragment {
                    return Err(error(
                        "unification outside the pattern fragment (no delaying requested)"))
                }
                debug!("delay @{} {} = {}", goal.depth, a, b);
                self.store.suspend(Suspension {
                    goal : mk_eq(a.clone(), b.clone()),
                    depth : goal.depth,
                    program : goal.program.clone(),
                    blockers,
                });
                Ok(true)
            },
            Err(UnifFail::Err(e)) => Err(e),
        }
    }

    fn call_builtin(&mut self, goal : &Goal, bid : usize, args : &[Term]) -> RunResult<bool> {
        let mut ctx = BuiltinCtx {
            depth : goal.depth,
            hyps : &goal.program,
            store : &mut self.store,
            evaluator : &self.evaluator,
            options : &self.options,
        };
        match self.builtins.run(bid, &mut ctx, args) {
            Ok(extra) => {
                for g in extra.into_iter().rev() {
                    self.goals.push(Goal { term : g, ..goal.clone() });
                }
                Ok(true)
            },
            Err(Signal::NoClause) => Ok(false),
            Err(Signal::Fatal(e)) => Err(e),
        }
    }

    fn index_key_of(&mut self, depth : usize, args : &[Term]) -> RunResult<Option<IndexKey>> {
        let a0 = match args.get(0) {
            None => return Ok(None),
            Some(a) => a,
        };
        let a0 = motion::deref(&mut self.store, depth, a0)?;
        Ok(match a0.as_ref() {
            Const { c } => Some(IndexKey::ConstK(*c)),
            App { hd, .. } => Some(IndexKey::ConstK(*hd)),
            Cons {..} => Some(IndexKey::ConsK),
            Nil => Some(IndexKey::NilK),
            Lam {..} => Some(IndexKey::LamK),
            Data { data } => Some(IndexKey::DataK(data.class())),
            _ => None,
        })
    }

    fn user_call(&mut self, goal : &Goal, c : ConstId, args : &[Term]) -> RunResult<bool> {
        let key = self.index_key_of(goal.depth, args)?;
        let cands = goal.program.candidates(c, key);
        if cands.is_empty() {
            debug!("no clause for {}", symbols::show_const(c));
            return Ok(false)
        }
        self.try_alternatives(goal.clone(), cands, 0)
    }

    /// Attempt candidate `start`, installing a choice point over the
    /// tail first. A failed head unification simply reports failure;
    /// the choice point just installed makes backtracking retry the
    /// next candidate against the identical machine state.
    fn try_alternatives(&mut self, goal : Goal, cands : Vec<Arc<Clause>>, start : usize)
        -> RunResult<bool>
    {
        let barrier = self.choices.len();
        if start + 1 < cands.len() {
            self.choices.push(ChoicePoint {
                trail_mark : self.store.mark(),
                goals : self.goals.clone(),
                alt : Alternative::Clauses {
                    goal : goal.clone(),
                    cands : cands.clone(),
                    next : start + 1,
                },
                constraint_mark : self.store.constraints.mark(),
            });
        }
        let clause = cands[start].clone();
        self.try_clause(&goal, &clause, barrier)
    }

    fn try_clause(&mut self, goal : &Goal, clause : &Clause, barrier : usize) -> RunResult<bool> {
        let depth = goal.depth;
        let call = motion::deref(&mut self.store, depth, &goal.term)?;
        let call_args : &[Term] = match call.as_ref() {
            App { args, .. } => args,
            _ => &[],
        };
        if clause.head_args.len() != call_args.len() {
            return Ok(false)
        }
        let mark = self.store.mark();
        let env : Vec<Term> = (0..clause.nvars)
            .map(|_| {
                let r = self.store.fresh_uvar(depth);
                mk_uvar(r, depth, 0)
            })
            .collect();
        for (garg, harg) in call_args.iter().zip(clause.head_args.iter()) {
            let harg = motion::instantiate(&mut self.store, clause.depth, depth, &env, harg)?;
            match unify(&mut self.store, depth, garg, &harg) {
                Ok(()) => (),
                Err(UnifFail::Fail) => {
                    self.store.undo_to(mark);
                    return Ok(false)
                },
                Err(UnifFail::Delay { blockers }) => {
                    if !self.options.delay_outside_fragment {
                        return Err(error(
                            "unification outside the pattern fragment (no delaying requested)"))
                    }
                    self.store.suspend(Suspension {
                        goal : mk_eq(garg.clone(), harg),
                        depth,
                        program : goal.program.clone(),
                        blockers,
                    });
                },
                Err(UnifFail::Err(e)) => return Err(e),
            }
        }
        let body = motion::instantiate(&mut self.store, clause.depth, depth, &env, &clause.body)?;
        self.goals.push(Goal {
            depth,
            program : goal.program.clone(),
            term : body,
            cut_to : barrier,
        });
        Ok(true)
    }

    /// Pop the youngest choice point, rewind the trail, restore the goal
    /// stack, and set up its next alternative. `Ok(false)` means the
    /// search space is exhausted.
    fn backtrack(&mut self) -> RunResult<bool> {
        while let Some(cp) = self.choices.pop() {
            self.store.undo_to(cp.trail_mark);
            debug_assert!(self.store.constraints.mark() >= cp.constraint_mark);
            self.goals = cp.goals;
            match cp.alt {
                Alternative::Disjunct { goal } => {
                    trace!("backtrack into ; @{}", goal.depth);
                    self.goals.push(goal);
                    return Ok(true)
                },
                Alternative::Clauses { goal, cands, next } => {
                    trace!("backtrack, candidate {} of {}", next + 1, cands.len());
                    if self.try_alternatives(goal, cands, next)? {
                        return Ok(true)
                    }
                    // that head failed too; the freshly installed choice
                    // point (if any) is on top and the loop retries it
                },
            }
        }
        Ok(false)
    }

    fn solution(&mut self) -> RunResult<Solution> {
        let mut assignments = IndexMap::new();
        for (name, slot) in self.var_names.clone() {
            let t = match self.env.get(slot) {
                Some(t) => t.clone(),
                None => return Err(anomaly("query variable slot out of range")),
            };
            let t = motion::expand(&mut self.store, 0, &t)?;
            assignments.insert(name, t);
        }
        let live : Vec<Suspension> = self.store.constraints.live().cloned().collect();
        let mut constraints = Vec::with_capacity(live.len());
        for s in live {
            let goal = motion::expand(&mut self.store, s.depth, &s.goal)?;
            constraints.push(SuspendedGoal { goal, depth : s.depth });
        }
        Ok(Solution {
            assignments,
            constraints,
            state : self.store.state.snapshot(),
        })
    }
}

#[cfg(test)]
mod solver_tests {
    use super::*;
    use crate::clause::{ Clause, Program };
    use crate::symbols::intern;
    use crate::term::{ mk_app, mk_arg, mk_app_arg, mk_cons, mk_conj, mk_const, mk_cut,
                       mk_disj, mk_eq, mk_impl, mk_int, mk_lam, mk_list, mk_pi, mk_sigma };

    fn machine_for(clauses : Vec<Clause>, query : Query, options : Options) -> Machine {
        let mut db = ClauseDb::base();
        db.load(Program { clauses }).unwrap();
        Machine::new(
            Arc::new(db),
            Arc::new(BuiltinRegistry::standard()),
            Arc::new(Evaluator::standard()),
            Arc::new(vec![]),
            options,
            query,
        ).unwrap()
    }

    fn query1(name : &str, goal : Term) -> Query {
        let mut var_names = IndexMap::new();
        var_names.insert(String::from(name), 0);
        Query { nvars : 1, var_names, goal }
    }

    fn closed_query(goal : Term) -> Query {
        Query { nvars : 0, var_names : IndexMap::new(), goal }
    }

    /// The standard append clause pair over Arg slots :
    ///   append [] L L.
    ///   append (H :: T) L (H :: R) :- append T L R.
    fn append_clauses() -> (ConstId, Vec<Clause>) {
        let app = intern("append");
        let base = Clause {
            depth : 0,
            head_const : app,
            head_args : vec![crate::term::mk_nil(), mk_arg(0), mk_arg(0)],
            body : mk_const(symbols::TRUE),
            nvars : 1,
            graft : None,
            name : None,
        };
        let step = Clause {
            depth : 0,
            head_const : app,
            head_args : vec![
                mk_cons(mk_arg(0), mk_arg(1)),
                mk_arg(2),
                mk_cons(mk_arg(0), mk_arg(3)),
            ],
            body : mk_app(app, vec![mk_arg(1), mk_arg(2), mk_arg(3)]),
            nvars : 4,
            graft : None,
            name : None,
        };
        (app, vec![base, step])
    }

    fn first_assignment(m : &mut Machine, name : &str) -> Term {
        match m.next().unwrap() {
            Outcome::Success(s) => s.assignments.get(name).unwrap().clone(),
            Outcome::Failure => panic!("unexpected failure"),
            Outcome::NoMoreSteps => panic!("unexpected step bound"),
        }
    }

    #[test]
    fn append_concatenates() {
        let (app, clauses) = append_clauses();
        let goal = mk_app(app, vec![
            mk_list(vec![mk_int(1), mk_int(2)]),
            mk_list(vec![mk_int(3)]),
            mk_arg(0),
        ]);
        let mut m = machine_for(clauses, query1("X", goal), Options::default());
        let x = first_assignment(&mut m, "X");
        assert_eq!(x, mk_list(vec![mk_int(1), mk_int(2), mk_int(3)]));
        match m.next().unwrap() {
            Outcome::Failure => (),
            _ => panic!("append of ground lists must be deterministic"),
        }
    }

    #[test]
    fn append_enumerates_every_split() {
        // search exhaustiveness : iterating `next` visits each split of
        // [1,2] exactly once
        let (app, clauses) = append_clauses();
        let goal = mk_app(app, vec![mk_arg(0), mk_arg(1), mk_list(vec![mk_int(1), mk_int(2)])]);
        let mut var_names = IndexMap::new();
        var_names.insert(String::from("A"), 0);
        var_names.insert(String::from("B"), 1);
        let q = Query { nvars : 2, var_names, goal };
        let mut m = machine_for(clauses, q, Options::default());
        let mut splits = Vec::new();
        loop {
            match m.next().unwrap() {
                Outcome::Success(s) => {
                    splits.push((s.assignments["A"].clone(), s.assignments["B"].clone()));
                },
                Outcome::Failure => break,
                Outcome::NoMoreSteps => panic!("unexpected step bound"),
            }
        }
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].0, mk_list(vec![]));
        assert_eq!(splits[2].0, mk_list(vec![mk_int(1), mk_int(2)]));
    }

    #[test]
    fn locally_quantified_constants_do_not_commute() {
        // pi x\ pi y\ (f x y = f y x)  fails : x and y are distinct
        let f = intern("scf");
        let eqn = mk_eq(
            mk_app(f, vec![mk_const(0), mk_const(1)]),
            mk_app(f, vec![mk_const(1), mk_const(0)]),
        );
        let goal = mk_pi(mk_pi(eqn));
        let mut m = machine_for(vec![], closed_query(goal), Options::default());
        match m.next().unwrap() {
            Outcome::Failure => (),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn sigma_introduces_a_fresh_variable() {
        // sigma X\ (X = 3, Y is X + 4)  ==>  Y = 7
        let plus = intern("+");
        let is = intern("is");
        let body = mk_conj(
            mk_eq(mk_const(0), mk_int(3)),
            mk_app(is, vec![mk_arg(0), mk_app(plus, vec![mk_const(0), mk_int(4)])]),
        );
        let goal = mk_sigma(body);
        let mut m = machine_for(vec![], query1("Y", goal), Options::default());
        assert_eq!(first_assignment(&mut m, "Y"), mk_int(7));
    }

    #[test]
    fn beta_reduction_through_an_assigned_variable() {
        // X = (x\ x), Y = X 5  ==>  Y = 5
        let goal = mk_conj(
            mk_eq(mk_arg(0), mk_lam(mk_const(0))),
            mk_eq(mk_arg(1), mk_app_arg(0, vec![mk_int(5)])),
        );
        let mut var_names = IndexMap::new();
        var_names.insert(String::from("X"), 0);
        var_names.insert(String::from("Y"), 1);
        let q = Query { nvars : 2, var_names, goal };
        let mut m = machine_for(vec![], q, Options::default());
        match m.next().unwrap() {
            Outcome::Success(s) => assert_eq!(s.assignments["Y"], mk_int(5)),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn pattern_equations_solve_under_pi() {
        // pi a\ pi b\ (F a = g a a, F b = g b b)
        //   ==>  F = x\ g x x  with an empty constraint store
        let g = intern("scg");
        let body = mk_conj(
            mk_eq(mk_app_arg(0, vec![mk_const(0)]),
                  mk_app(g, vec![mk_const(0), mk_const(0)])),
            mk_eq(mk_app_arg(0, vec![mk_const(1)]),
                  mk_app(g, vec![mk_const(1), mk_const(1)])),
        );
        let goal = mk_pi(mk_pi(body));
        let mut opts = Options::default();
        opts.delay_outside_fragment = true;
        let mut m = machine_for(vec![], query1("F", goal), opts);
        match m.next().unwrap() {
            Outcome::Success(s) => {
                assert_eq!(s.assignments["F"],
                           mk_lam(mk_app(g, vec![mk_const(0), mk_const(0)])));
                assert!(s.constraints.is_empty());
            },
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn cut_commits_to_the_first_disjunct() {
        // (p 1 ; p 2), !, p X  against p 1. p 2.
        let p = intern("scp");
        let clauses = vec![
            Clause::fact(0, p, vec![mk_int(1)]),
            Clause::fact(0, p, vec![mk_int(2)]),
        ];
        let goal = mk_conj(
            mk_disj(mk_app(p, vec![mk_int(1)]), mk_app(p, vec![mk_int(2)])),
            mk_conj(mk_cut(), mk_app(p, vec![mk_arg(0)])),
        );
        let mut m = machine_for(clauses, query1("X", goal), Options::default());
        assert_eq!(first_assignment(&mut m, "X"), mk_int(1));
    }

    #[test]
    fn cut_never_reaches_the_right_disjunct_after_success() {
        // (p X, !, fail) ; r  : p succeeds once, the cut commits, fail
        // kills the query — r is never tried
        let p = intern("scq");
        let r = intern("scr");
        let fail = intern("fail");
        let clauses = vec![
            Clause::fact(0, p, vec![mk_int(1)]),
            Clause::fact(0, p, vec![mk_int(2)]),
            Clause::fact(0, r, vec![]),
        ];
        let goal = mk_disj(
            mk_conj(mk_app(p, vec![mk_arg(0)]), mk_conj(mk_cut(), mk_const(fail))),
            mk_const(r),
        );
        let mut m = machine_for(clauses, query1("X", goal), Options::default());
        match m.next().unwrap() {
            Outcome::Failure => (),
            _ => panic!("cut must prune the right disjunct"),
        }
    }

    #[test]
    fn implication_loads_a_local_layer() {
        // (p 1 => p X) finds the hypothetical clause first, and the
        // layer is gone once the implication is left behind
        let p = intern("scs");
        let clauses = vec![Clause::fact(0, p, vec![mk_int(2)])];
        let goal = mk_impl(mk_app(p, vec![mk_int(1)]), mk_app(p, vec![mk_arg(0)]));
        let mut m = machine_for(clauses.clone(), query1("X", goal), Options::default());
        assert_eq!(first_assignment(&mut m, "X"), mk_int(1));
        // backtracking into the call retries the base program
        match m.next().unwrap() {
            Outcome::Success(s) => assert_eq!(s.assignments["X"], mk_int(2)),
            _ => panic!("expected the base clause on backtracking"),
        }
    }

    #[test]
    fn pi_constant_clauses_resolve_locally() {
        // pi x\ (q x => q x)
        let q = intern("sct");
        let goal = mk_pi(mk_impl(
            mk_app(q, vec![mk_const(0)]),
            mk_app(q, vec![mk_const(0)]),
        ));
        let mut m = machine_for(vec![], closed_query(goal), Options::default());
        match m.next().unwrap() {
            Outcome::Success(_) => (),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn delayed_equation_wakes_and_discharges() {
        // F 1 = g 1 1 is outside the fragment and suspends; once F is
        // known the equation resumes and holds
        let g = intern("scu");
        let body = mk_conj(
            mk_eq(mk_app_arg(0, vec![mk_int(1)]),
                  mk_app(g, vec![mk_int(1), mk_int(1)])),
            mk_eq(mk_arg(0), mk_lam(mk_app(g, vec![mk_const(0), mk_const(0)]))),
        );
        let mut opts = Options::default();
        opts.delay_outside_fragment = true;
        let mut m = machine_for(vec![], query1("F", body), opts);
        match m.next().unwrap() {
            Outcome::Success(s) => {
                assert!(s.constraints.is_empty());
                assert_eq!(s.assignments["F"],
                           mk_lam(mk_app(g, vec![mk_const(0), mk_const(0)])));
            },
            _ => panic!("expected success after wake-up"),
        }
    }

    #[test]
    fn unresolved_suspensions_are_published() {
        let g = intern("scv");
        let goal = mk_eq(mk_app_arg(0, vec![mk_int(1)]), mk_const(g));
        let mut opts = Options::default();
        opts.delay_outside_fragment = true;
        let mut m = machine_for(vec![], query1("F", goal), opts);
        match m.next().unwrap() {
            Outcome::Success(s) => {
                assert_eq!(s.constraints.len(), 1);
            },
            _ => panic!("expected success with a live constraint"),
        }
    }

    #[test]
    fn outside_fragment_without_delaying_is_an_error() {
        let g = intern("scw");
        let goal = mk_eq(mk_app_arg(0, vec![mk_int(1)]), mk_const(g));
        let mut m = machine_for(vec![], query1("F", goal), Options::default());
        match m.next() {
            Err(crate::errors::RunErr::Regular {..}) => (),
            other => panic!("expected a solver error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn declare_constraint_survives_until_publication() {
        let q = intern("scx");
        let dc = intern("declare_constraint");
        let clauses = vec![Clause::fact(0, q, vec![])];
        let goal = mk_app(dc, vec![mk_const(q), mk_list(vec![mk_arg(0)])]);
        let mut m = machine_for(clauses, query1("X", goal), Options::default());
        match m.next().unwrap() {
            Outcome::Success(s) => assert_eq!(s.constraints.len(), 1),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn declare_constraint_wakes_on_assignment() {
        let q = intern("scy");
        let dc = intern("declare_constraint");
        let clauses = vec![Clause::fact(0, q, vec![])];
        let goal = mk_conj(
            mk_app(dc, vec![mk_const(q), mk_list(vec![mk_arg(0)])]),
            mk_eq(mk_arg(0), mk_int(1)),
        );
        let mut m = machine_for(clauses, query1("X", goal), Options::default());
        match m.next().unwrap() {
            Outcome::Success(s) => assert!(s.constraints.is_empty()),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn step_bound_stops_divergence() {
        let lp = intern("scz");
        let looping = Clause {
            depth : 0,
            head_const : lp,
            head_args : vec![],
            body : mk_const(lp),
            nvars : 0,
            graft : None,
            name : None,
        };
        let mut opts = Options::default();
        opts.max_steps = Some(100);
        let mut m = machine_for(vec![looping], closed_query(mk_const(lp)), opts);
        match m.next().unwrap() {
            Outcome::NoMoreSteps => (),
            _ => panic!("expected the step bound to fire"),
        }
    }

    #[test]
    fn occurs_check_makes_the_query_fail() {
        let f = intern("sda");
        let goal = mk_eq(mk_arg(0), mk_app(f, vec![mk_arg(0)]));
        let mut m = machine_for(vec![], query1("X", goal), Options::default());
        match m.next().unwrap() {
            Outcome::Failure => (),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn flexible_goals_are_a_solver_error() {
        let goal = mk_arg(0);
        let mut m = machine_for(vec![], query1("X", goal), Options::default());
        match m.next() {
            Err(crate::errors::RunErr::Regular {..}) => (),
            other => panic!("expected an error, got {:?}", other.map(|_| ())),
        }
    }
}
