use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// A constant is a signed integer id. Negative ids denote globally
/// interned symbols, handed out from -1 downward. Non-negative ids denote
/// bound variables as de Bruijn *levels* : the distance from the root of
/// the containing term to the binder, growing inward. The level flavor
/// (rather than index flavor) is what makes context extension free : a
/// term well formed at depth `d` is well formed unchanged at any `d' > d`.
pub type ConstId = i64;

/// Ids for the language's logical connectives and structural symbols,
/// reserved before any user symbol is interned. Their values are fixed by
/// the seeding order in `SymbolTable::with_reserved` below.
pub const EQ : ConstId = -1;
pub const AND : ConstId = -2;
pub const OR : ConstId = -3;
pub const AMP : ConstId = -4;
pub const RIMPL : ConstId = -5;
pub const PI : ConstId = -6;
pub const SIGMA : ConstId = -7;
pub const IMPL : ConstId = -8;
pub const CUT : ConstId = -9;
pub const NILC : ConstId = -10;
pub const CONSC : ConstId = -11;
pub const TRUE : ConstId = -12;
pub const CTYPE : ConstId = -13;
pub const SPILL : ConstId = -14;
pub const AS : ConstId = -15;
pub const UVARC : ConstId = -16;

const RESERVED : [(&str, ConstId); 16] = [
    ("=", EQ),
    (",", AND),
    (";", OR),
    ("&", AMP),
    (":-", RIMPL),
    ("pi", PI),
    ("sigma", SIGMA),
    ("=>", IMPL),
    ("!", CUT),
    ("[]", NILC),
    ("::", CONSC),
    ("true", TRUE),
    ("ctype", CTYPE),
    ("%spill", SPILL),
    ("as", AS),
    ("uvar", UVARC),
];

/// Bidirectional interning of symbol names. Process-wide and grow-only :
/// it is seeded with the reserved table before anything else runs, user
/// symbols are added during program/query compilation, and during solving
/// it is only read. Hosts serialise their calls into the library, so a
/// plain RwLock is all the synchronisation this needs.
pub struct SymbolTable {
    by_name : HashMap<String, ConstId>,
    // id -1 lives at index 0, -2 at index 1, ...
    by_id : Vec<String>,
}

impl SymbolTable {
    fn with_reserved() -> Self {
        let mut table = SymbolTable {
            by_name : HashMap::with_capacity(256),
            by_id : Vec::with_capacity(256),
        };
        for (name, id) in RESERVED.iter() {
            let got = table.intern(name);
            assert_eq!(got, *id);
        }
        table
    }

    fn intern(&mut self, name : &str) -> ConstId {
        if let Some(id) = self.by_name.get(name) {
            return *id
        }
        let id = -(self.by_id.len() as i64) - 1;
        self.by_id.push(String::from(name));
        self.by_name.insert(String::from(name), id);
        id
    }

    fn name_of(&self, c : ConstId) -> Option<&str> {
        if c >= 0 {
            return None
        }
        self.by_id.get((-c - 1) as usize).map(|s| s.as_str())
    }
}

static SYMBOLS : Lazy<RwLock<SymbolTable>> = Lazy::new(|| {
    RwLock::new(SymbolTable::with_reserved())
});

/// Intern `name`, returning its (negative) global id. Idempotent.
pub fn intern(name : &str) -> ConstId {
    SYMBOLS.write().intern(name)
}

/// Render a constant for display. Global symbols show their interned
/// name; bound-variable levels show as `x0`, `x1`, ...
pub fn show_const(c : ConstId) -> String {
    if c >= 0 {
        return format!("x{}", c)
    }
    match SYMBOLS.read().name_of(c) {
        Some(s) => String::from(s),
        None => format!("?{}", c),
    }
}

pub fn is_interned(name : &str) -> Option<ConstId> {
    SYMBOLS.read().by_name.get(name).copied()
}

#[cfg(test)]
mod symbol_tests {
    use super::*;

    #[test]
    fn reserved_ids_are_stable() {
        assert_eq!(intern("="), EQ);
        assert_eq!(intern(","), AND);
        assert_eq!(intern("pi"), PI);
        assert_eq!(intern("!"), CUT);
        assert_eq!(intern("::"), CONSC);
    }

    #[test]
    fn interning_roundtrip() {
        let c = intern("append");
        assert!(c < 0);
        assert_eq!(intern("append"), c);
        assert_eq!(show_const(c), "append");
    }

    #[test]
    fn levels_display_positionally() {
        assert_eq!(show_const(0), "x0");
        assert_eq!(show_const(3), "x3");
    }
}
