use std::sync::Arc;

use crate::clause::ClauseDb;
use crate::term::{ Term, UVarRef };

/// A goal the solver could not dispatch yet, parked until one of its
/// blockers is assigned. The goal keeps the depth and hypothetical
/// program it was suspended under, so resuming replays it in the right
/// context.
#[derive(Clone)]
pub struct Suspension {
    pub goal : Term,
    pub depth : usize,
    pub program : Arc<ClauseDb>,
    pub blockers : Vec<UVarRef>,
}

pub type SuspId = usize;

/// The constraint store. Slots are stable and never reused : removal
/// leaves a hole, so a trail record `(id, suspension)` can restore the
/// exact store shape on backtrack. The store itself never decides when
/// to wake anything; `Store::assign` drives that.
pub struct ConstraintStore {
    slots : Vec<Option<Suspension>>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        ConstraintStore { slots : Vec::new() }
    }

    pub(crate) fn add(&mut self, s : Suspension) -> SuspId {
        let id = self.slots.len();
        self.slots.push(Some(s));
        id
    }

    pub(crate) fn remove(&mut self, id : SuspId) -> Option<Suspension> {
        self.slots.get_mut(id).and_then(|slot| slot.take())
    }

    pub(crate) fn restore(&mut self, id : SuspId, s : Suspension) {
        debug_assert!(self.slots[id].is_none());
        self.slots[id] = Some(s);
    }

    /// Ids of live suspensions blocked on `r`, in insertion order.
    pub fn blocked_on(&self, r : UVarRef) -> Vec<SuspId> {
        let mut out = Vec::new();
        for (id, slot) in self.slots.iter().enumerate() {
            if let Some(s) = slot {
                if s.blockers.contains(&r) {
                    out.push(id);
                }
            }
        }
        out
    }

    pub fn live(&self) -> impl Iterator<Item = &Suspension> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// High-water mark recorded in choice points for consistency checks.
    pub fn mark(&self) -> usize {
        self.slots.len()
    }
}
