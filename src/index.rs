use std::sync::Arc;

use hashbrown::HashMap;

use crate::clause::Clause;
use crate::symbols::ConstId;

/// Second level of the clause index : the top constructor of the first
/// head argument. Primitive data indexes by class, not by value; a flex
/// first argument makes the clause a wildcard that joins every bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKey {
    ConstK(ConstId),
    DataK(u8),
    ConsK,
    NilK,
    LamK,
}

/// Ordered clause list for one predicate plus the first-argument buckets.
/// Candidate selection merges the matching bucket with the wildcard list
/// by source position, so declaration order is preserved exactly.
#[derive(Clone)]
pub struct PredIndex {
    clauses : Vec<Arc<Clause>>,
    by_key : HashMap<IndexKey, Vec<u32>>,
    flex : Vec<u32>,
}

impl PredIndex {
    pub fn build(clauses : Vec<Arc<Clause>>) -> Self {
        let mut by_key : HashMap<IndexKey, Vec<u32>> = HashMap::new();
        let mut flex = Vec::new();
        for (pos, c) in clauses.iter().enumerate() {
            match c.index_key() {
                Some(k) => by_key.entry(k).or_insert_with(Vec::new).push(pos as u32),
                None => flex.push(pos as u32),
            }
        }
        PredIndex { clauses, by_key, flex }
    }

    pub fn all(&self) -> &[Arc<Clause>] {
        &self.clauses
    }

    /// Candidates for a call whose first argument has the given key
    /// (`None` when the call's first argument is flex or absent, which
    /// makes every clause a candidate).
    pub fn candidates(&self, key : Option<IndexKey>) -> Vec<Arc<Clause>> {
        let k = match key {
            None => return self.clauses.clone(),
            Some(k) => k,
        };
        let keyed = self.by_key.get(&k).map(|v| v.as_slice()).unwrap_or(&[]);
        let mut out = Vec::with_capacity(keyed.len() + self.flex.len());
        let (mut i, mut j) = (0, 0);
        while i < keyed.len() || j < self.flex.len() {
            let next = match (keyed.get(i), self.flex.get(j)) {
                (Some(a), Some(b)) => {
                    if a < b { i += 1; *a } else { j += 1; *b }
                },
                (Some(a), None) => { i += 1; *a },
                (None, Some(b)) => { j += 1; *b },
                (None, None) => break,
            };
            out.push(self.clauses[next as usize].clone());
        }
        out
    }
}

#[cfg(test)]
mod index_tests {
    use super::*;
    use crate::clause::Clause;
    use crate::symbols::intern;
    use crate::term::{ mk_const, mk_int, mk_discard, mk_nil };

    fn fact(head : ConstId, arg : crate::term::Term) -> Arc<Clause> {
        Arc::new(Clause::fact(0, head, vec![arg]))
    }

    #[test]
    fn wildcards_join_every_bucket_in_order() {
        let p = intern("idxp");
        let a = intern("a");
        let b = intern("b");
        let idx = PredIndex::build(vec![
            fact(p, mk_const(a)),
            fact(p, mk_discard()),
            fact(p, mk_const(b)),
        ]);
        let on_a = idx.candidates(Some(IndexKey::ConstK(a)));
        assert_eq!(on_a.len(), 2);
        assert_eq!(on_a[0].head_args[0], mk_const(a));
        let on_b = idx.candidates(Some(IndexKey::ConstK(b)));
        assert_eq!(on_b.len(), 2);
        assert_eq!(on_b[1].head_args[0], mk_const(b));
    }

    #[test]
    fn data_indexes_by_class_and_flex_call_sees_all() {
        let p = intern("idxq");
        let idx = PredIndex::build(vec![
            fact(p, mk_int(1)),
            fact(p, mk_int(2)),
            fact(p, mk_nil()),
        ]);
        assert_eq!(idx.candidates(Some(IndexKey::DataK(0))).len(), 2);
        assert_eq!(idx.candidates(Some(IndexKey::NilK)).len(), 1);
        assert_eq!(idx.candidates(None).len(), 3);
    }
}
