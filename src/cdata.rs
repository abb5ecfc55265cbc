use std::any::Any;
use std::hash::{ Hash, Hasher };
use std::sync::{ Arc, Weak };

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Opaque host data injected into terms. The primitive classes (machine
/// integers, floats, strings, source locations) are built in; anything
/// else goes through a host-declared type descriptor and a trait object
/// carrying the host's own equality/hash/printer. Equality is pure by
/// contract : it must not consult the unification or constraint store.
#[derive(Debug, Clone)]
pub enum CData {
    Int(i64),
    Float(f64),
    Str(Arc<String>),
    Loc(Loc),
    Custom { ty : CDataTypeId, value : Arc<dyn HostData> },
}

/// A source position, carried on terms produced by the external compiler
/// and attached to type errors when known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    pub source : Arc<String>,
    pub line : u32,
    pub col : u32,
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.col)
    }
}

/// Host payload behind a user-declared CData type. `eq_dyn`/`hash64` are
/// supplied by the host and must agree with each other.
pub trait HostData : Any + Send + Sync + std::fmt::Debug {
    fn eq_dyn(&self, other : &dyn HostData) -> bool;
    fn hash64(&self) -> u64;
    fn pp(&self) -> String;
    fn as_any(&self) -> &dyn Any;
}

pub type CDataTypeId = usize;

pub struct CDataType {
    pub name : String,
    pub hconsed : bool,
}

/// The CData type registry and the weak intern table for hconsed types.
/// Both are process-wide and grow-only, initialised before solving starts
/// (registration is a construction-time step for embedders).
static CDATA_TYPES : Lazy<RwLock<Vec<CDataType>>> = Lazy::new(|| RwLock::new(Vec::new()));

static HCONS : Lazy<RwLock<HashMap<(CDataTypeId, u64), Vec<Weak<dyn HostData>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn declare_cdata_type(name : &str, hconsed : bool) -> CDataTypeId {
    let mut types = CDATA_TYPES.write();
    let id = types.len();
    types.push(CDataType { name : String::from(name), hconsed });
    id
}

pub fn cdata_type_name(ty : CDataTypeId) -> String {
    match CDATA_TYPES.read().get(ty) {
        Some(d) => d.name.clone(),
        None => format!("cdata#{}", ty),
    }
}

/// Inject a host value. For an hconsed type the weak intern table is
/// consulted first, keyed on the host-supplied hash and discriminated by
/// the host-supplied equality, so equal payloads share one allocation.
pub fn inject(ty : CDataTypeId, value : Arc<dyn HostData>) -> CData {
    let hconsed = CDATA_TYPES.read().get(ty).map(|d| d.hconsed).unwrap_or(false);
    if !hconsed {
        return CData::Custom { ty, value }
    }
    let key = (ty, value.hash64());
    let mut table = HCONS.write();
    let bucket = table.entry(key).or_insert_with(Vec::new);
    for weak in bucket.iter() {
        if let Some(existing) = weak.upgrade() {
            if existing.eq_dyn(value.as_ref()) {
                return CData::Custom { ty, value : existing }
            }
        }
    }
    bucket.retain(|w| w.upgrade().is_some());
    bucket.push(Arc::downgrade(&value));
    CData::Custom { ty, value }
}

impl CData {
    /// Coarse classification used by the first-argument clause index.
    pub fn class(&self) -> u8 {
        match self {
            CData::Int(_) => 0,
            CData::Float(_) => 1,
            CData::Str(_) => 2,
            CData::Loc(_) => 3,
            CData::Custom { ty, .. } => 4 + *ty as u8,
        }
    }

    pub fn pp(&self) -> String {
        match self {
            CData::Int(i) => format!("{}", i),
            CData::Float(x) => format!("{}", x),
            CData::Str(s) => format!("{:?}", s),
            CData::Loc(l) => format!("{}", l),
            CData::Custom { value, .. } => value.pp(),
        }
    }
}

impl PartialEq for CData {
    fn eq(&self, other : &CData) -> bool {
        match (self, other) {
            (CData::Int(a), CData::Int(b)) => a == b,
            (CData::Float(a), CData::Float(b)) => a.to_bits() == b.to_bits(),
            (CData::Str(a), CData::Str(b)) => a == b,
            (CData::Loc(a), CData::Loc(b)) => a == b,
            (CData::Custom { ty : t1, value : v1 }, CData::Custom { ty : t2, value : v2 }) => {
                t1 == t2 && v1.eq_dyn(v2.as_ref())
            },
            _ => false,
        }
    }
}

impl Eq for CData {}

impl Hash for CData {
    fn hash<H : Hasher>(&self, state : &mut H) {
        match self {
            CData::Int(i) => { 0u8.hash(state); i.hash(state) },
            CData::Float(x) => { 1u8.hash(state); x.to_bits().hash(state) },
            CData::Str(s) => { 2u8.hash(state); s.hash(state) },
            CData::Loc(l) => { 3u8.hash(state); l.hash(state) },
            CData::Custom { ty, value } => {
                4u8.hash(state);
                ty.hash(state);
                value.hash64().hash(state)
            },
        }
    }
}

#[cfg(test)]
mod cdata_tests {
    use super::*;
    use fxhash::hash64;

    #[derive(Debug)]
    struct Token(u64);

    impl HostData for Token {
        fn eq_dyn(&self, other : &dyn HostData) -> bool {
            match other.as_any().downcast_ref::<Token>() {
                Some(t) => t.0 == self.0,
                None => false,
            }
        }
        fn hash64(&self) -> u64 { hash64(&self.0) }
        fn pp(&self) -> String { format!("<token {}>", self.0) }
        fn as_any(&self) -> &dyn Any { self }
    }

    #[test]
    fn primitive_equality_is_exact() {
        assert_eq!(CData::Int(3), CData::Int(3));
        assert_ne!(CData::Int(3), CData::Float(3.0));
        assert_eq!(CData::Float(0.5), CData::Float(0.5));
    }

    #[test]
    fn hconsed_injection_shares_the_allocation() {
        let ty = declare_cdata_type("token", true);
        let a = inject(ty, Arc::new(Token(77)));
        let b = inject(ty, Arc::new(Token(77)));
        match (a, b) {
            (CData::Custom { value : v1, .. }, CData::Custom { value : v2, .. }) => {
                assert!(Arc::ptr_eq(&v1, &v2));
            },
            _ => panic!("expected custom cdata"),
        }
    }

    #[test]
    fn custom_equality_goes_through_the_host() {
        let ty = declare_cdata_type("token2", false);
        let a = inject(ty, Arc::new(Token(1)));
        let b = inject(ty, Arc::new(Token(1)));
        let c = inject(ty, Arc::new(Token(2)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
