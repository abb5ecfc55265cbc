use std::any::Any;
use std::sync::Arc;

/// Host-visible solver state. Embedders declare named components before
/// solving; the solver threads the component map through every reduction
/// step. Each update is functional (the slot is replaced, never mutated
/// in place) and records the prior value on the trail, so state rolls
/// back with everything else on backtrack.
pub type StateValue = Arc<dyn Any + Send + Sync>;

pub struct ComponentDecl {
    pub name : String,
    pub init : Box<dyn Fn() -> StateValue + Send + Sync>,
    pub pp : Box<dyn Fn(&StateValue) -> String + Send + Sync>,
}

/// Index of a declared component; handed out at declaration time and
/// used by built-ins to address their slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) usize);

pub struct StateMap {
    decls : Arc<Vec<ComponentDecl>>,
    values : Vec<StateValue>,
}

impl StateMap {
    pub fn new(decls : Arc<Vec<ComponentDecl>>) -> Self {
        let values = decls.iter().map(|d| (d.init)()).collect();
        StateMap { decls, values }
    }

    pub fn lookup(&self, name : &str) -> Option<ComponentId> {
        self.decls.iter().position(|d| d.name == name).map(ComponentId)
    }

    pub fn get(&self, id : ComponentId) -> Option<&StateValue> {
        self.values.get(id.0)
    }

    /// Replace a component's value, returning the prior one so the caller
    /// can trail it. Use `Store::set_state` from solver code; this raw
    /// accessor exists for the trail itself.
    pub(crate) fn swap(&mut self, id : ComponentId, v : StateValue) -> StateValue {
        std::mem::replace(&mut self.values[id.0], v)
    }

    /// Snapshot for publishing in a `Solution`.
    pub fn snapshot(&self) -> Vec<(String, StateValue)> {
        self.decls.iter()
            .zip(self.values.iter())
            .map(|(d, v)| (d.name.clone(), v.clone()))
            .collect()
    }

    pub fn pp(&self, id : ComponentId) -> Option<String> {
        let d = self.decls.get(id.0)?;
        let v = self.values.get(id.0)?;
        Some((d.pp)(v))
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;

    fn counter_decl() -> ComponentDecl {
        ComponentDecl {
            name : String::from("counter"),
            init : Box::new(|| Arc::new(0usize) as StateValue),
            pp : Box::new(|v| {
                match v.downcast_ref::<usize>() {
                    Some(n) => format!("{}", n),
                    None => String::from("?"),
                }
            }),
        }
    }

    #[test]
    fn components_initialise_and_swap() {
        let mut map = StateMap::new(Arc::new(vec![counter_decl()]));
        let id = map.lookup("counter").unwrap();
        assert_eq!(map.pp(id).unwrap(), "0");
        let prior = map.swap(id, Arc::new(7usize));
        assert_eq!(prior.downcast_ref::<usize>(), Some(&0));
        assert_eq!(map.pp(id).unwrap(), "7");
    }
}
