use crate::constraints::{ ConstraintStore, SuspId, Suspension };
use crate::state::{ ComponentId, StateMap, StateValue };
use crate::term::{ Term, UVarRef };

/// One arena slot per unification variable. `from` is the binding depth
/// at allocation; every term ever stored in the slot has all its free
/// bound-variable levels below it.
struct UVarCell {
    value : Option<Term>,
    from : usize,
}

/// One undo record per mutation between two choice points. The trail is
/// the *only* backtracking mechanism : everything else the solver keeps
/// is either immutable, or snapshotted inside the choice point itself.
enum Undo {
    Assign { cell : UVarRef, prior : Option<Term> },
    ConstraintAdd { id : SuspId },
    ConstraintRemove { id : SuspId, susp : Suspension },
    ResumePush,
    ResumeDrain { susp : Suspension },
    StateSet { id : ComponentId, prior : StateValue },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrailMark(usize);

/// The mutable half of the solver : the unification-variable arena, the
/// trail, the constraint store, the wake-up queue, and the host state
/// components. Everything here moves together under `mark`/`undo_to`.
pub struct Store {
    cells : Vec<UVarCell>,
    trail : Vec<Undo>,
    pub constraints : ConstraintStore,
    pub state : StateMap,
    resumed : Vec<Suspension>,
}

impl Store {
    pub fn new(state : StateMap) -> Self {
        Store {
            cells : Vec::with_capacity(64),
            trail : Vec::with_capacity(64),
            constraints : ConstraintStore::new(),
            state,
            resumed : Vec::new(),
        }
    }

    /// Allocate a fresh unbound variable scoped at `from`. Allocation is
    /// deliberately not trailed; a cell orphaned by backtracking is
    /// unreachable garbage, not a soundness problem.
    pub fn fresh_uvar(&mut self, from : usize) -> UVarRef {
        let r = UVarRef(self.cells.len() as u32);
        self.cells.push(UVarCell { value : None, from });
        r
    }

    pub fn value_of(&self, r : UVarRef) -> Option<&Term> {
        self.cells[r.index()].value.as_ref()
    }

    pub fn from_of(&self, r : UVarRef) -> usize {
        self.cells[r.index()].from
    }

    pub fn is_unbound(&self, r : UVarRef) -> bool {
        self.cells[r.index()].value.is_none()
    }

    /// Assign a cell and wake everything blocked on it. The woken
    /// suspensions move to the resume queue; the solver drains that
    /// queue before it installs the next choice point, which is what
    /// makes the store quiescent at every choice point.
    pub fn assign(&mut self, r : UVarRef, t : Term) {
        let cell = &mut self.cells[r.index()];
        debug_assert!(cell.value.is_none(), "uvar cell assigned twice without undo");
        self.trail.push(Undo::Assign { cell : r, prior : cell.value.take() });
        cell.value = Some(t);
        for id in self.constraints.blocked_on(r) {
            if let Some(susp) = self.constraints.remove(id) {
                self.trail.push(Undo::ConstraintRemove { id, susp : susp.clone() });
                self.trail.push(Undo::ResumePush);
                self.resumed.push(susp);
            }
        }
    }

    /// Park a goal on its blockers.
    pub fn suspend(&mut self, susp : Suspension) -> SuspId {
        let id = self.constraints.add(susp);
        self.trail.push(Undo::ConstraintAdd { id });
        id
    }

    /// Take the oldest woken suspension, if any.
    pub fn drain_one(&mut self) -> Option<Suspension> {
        if self.resumed.is_empty() {
            return None
        }
        let susp = self.resumed.remove(0);
        self.trail.push(Undo::ResumeDrain { susp : susp.clone() });
        Some(susp)
    }

    pub fn has_resumed(&self) -> bool {
        !self.resumed.is_empty()
    }

    /// Update a host state component, trailing the prior value.
    pub fn set_state(&mut self, id : ComponentId, v : StateValue) {
        let prior = self.state.swap(id, v);
        self.trail.push(Undo::StateSet { id, prior });
    }

    pub fn mark(&self) -> TrailMark {
        TrailMark(self.trail.len())
    }

    /// Pop undo records down to `m`, restoring each mutation in reverse
    /// order. Afterwards the heap, constraint store, resume queue and
    /// state components are bit-identical to their shape at `m`.
    pub fn undo_to(&mut self, m : TrailMark) {
        while self.trail.len() > m.0 {
            match self.trail.pop().unwrap() {
                Undo::Assign { cell, prior } => {
                    self.cells[cell.index()].value = prior;
                },
                Undo::ConstraintAdd { id } => {
                    self.constraints.remove(id);
                },
                Undo::ConstraintRemove { id, susp } => {
                    self.constraints.restore(id, susp);
                },
                Undo::ResumePush => {
                    self.resumed.pop();
                },
                Undo::ResumeDrain { susp } => {
                    self.resumed.insert(0, susp);
                },
                Undo::StateSet { id, prior } => {
                    self.state.swap(id, prior);
                },
            }
        }
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;
    use std::sync::Arc;
    use crate::clause::ClauseDb;
    use crate::term::{ mk_int, mk_uvar };

    fn empty_store() -> Store {
        Store::new(StateMap::new(Arc::new(vec![])))
    }

    fn susp_on(store : &Store, r : UVarRef) -> Suspension {
        let _ = store;
        Suspension {
            goal : mk_int(0),
            depth : 0,
            program : Arc::new(ClauseDb::base()),
            blockers : vec![r],
        }
    }

    #[test]
    fn undo_restores_the_heap_exactly() {
        let mut st = empty_store();
        let a = st.fresh_uvar(0);
        let b = st.fresh_uvar(0);
        let m = st.mark();
        st.assign(a, mk_int(1));
        st.assign(b, mk_uvar(a, 0, 0));
        assert!(st.value_of(a).is_some());
        st.undo_to(m);
        assert!(st.value_of(a).is_none());
        assert!(st.value_of(b).is_none());
    }

    #[test]
    fn assignment_wakes_blocked_suspensions() {
        let mut st = empty_store();
        let r = st.fresh_uvar(0);
        let s = susp_on(&st, r);
        st.suspend(s);
        assert_eq!(st.constraints.live_count(), 1);
        st.assign(r, mk_int(3));
        assert_eq!(st.constraints.live_count(), 0);
        assert!(st.has_resumed());
    }

    #[test]
    fn undo_restores_constraints_and_resume_queue() {
        let mut st = empty_store();
        let r = st.fresh_uvar(0);
        let m0 = st.mark();
        st.suspend(susp_on(&st, r));
        let m1 = st.mark();
        st.assign(r, mk_int(3));
        let drained = st.drain_one();
        assert!(drained.is_some());
        assert!(!st.has_resumed());

        // rewind over assignment + drain : suspension is back in the store
        st.undo_to(m1);
        assert_eq!(st.constraints.live_count(), 1);
        assert!(!st.has_resumed());
        assert!(st.value_of(r).is_none());

        // rewind over the suspension itself
        st.undo_to(m0);
        assert_eq!(st.constraints.live_count(), 0);
    }

    #[test]
    fn state_updates_roll_back() {
        use crate::state::ComponentDecl;
        let decls : Arc<Vec<ComponentDecl>> = Arc::new(vec![ComponentDecl {
            name : String::from("n"),
            init : Box::new(|| Arc::new(0usize) as StateValue),
            pp : Box::new(|_| String::new()),
        }]);
        let mut st = Store::new(StateMap::new(decls));
        let id = st.state.lookup("n").unwrap();
        let m = st.mark();
        st.set_state(id, Arc::new(5usize));
        assert_eq!(st.state.get(id).unwrap().downcast_ref::<usize>(), Some(&5));
        st.undo_to(m);
        assert_eq!(st.state.get(id).unwrap().downcast_ref::<usize>(), Some(&0));
    }
}
