use std::hash::{BuildHasher, Hasher};
use std::mem;

use ahash::{AHashMap, RandomState};

use crate::aggregator::state::AggState;

const NIL: usize = usize::MAX;

/// One aggregation group: an owned copy of its key tuple plus the state of
/// every aggregator instance, in registration order. `prev`/`next` thread
/// the group through the table's LRU list.
pub struct Clump {
    pub keys: Box<[Option<Box<str>>]>,
    pub states: Box<[AggState]>,
    hash: u64,
    prev: usize,
    next: usize,
}

/// Group table: hash buckets over key tuples plus an intrusive LRU list
/// threaded through the clump slab. A `capacity` of `None` is perfect
/// mode: the table grows without bound and nothing is ever evicted.
///
/// Key tuples compare per position; an absent key equals only another
/// absent key, and absent positions contribute nothing to the hash.
pub struct ClumpTable {
    clumps: Vec<Clump>,
    buckets: AHashMap<u64, Vec<usize>>,
    build_hasher: RandomState,
    head: usize,
    tail: usize,
    capacity: Option<usize>,
}

impl ClumpTable {
    pub fn new(capacity: Option<usize>) -> Self {
        ClumpTable {
            clumps: Vec::new(),
            buckets: AHashMap::new(),
            build_hasher: RandomState::new(),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    /// Looks the key tuple up, creating the clump on a miss. In bounded
    /// mode a miss at capacity reuses the LRU tail's slot; the displaced
    /// clump is handed back so the caller can emit it. The touched clump
    /// always ends up at the head of the LRU list.
    pub fn find_or_create<F>(
        &mut self,
        key_vals: &[Option<&str>],
        init_states: F,
    ) -> (usize, Option<Clump>)
    where
        F: FnOnce() -> Box<[AggState]>,
    {
        let hash = self.hash_key_tuple(key_vals);
        if let Some(indices) = self.buckets.get(&hash) {
            let hit = indices
                .iter()
                .copied()
                .find(|&idx| keys_match(&self.clumps[idx].keys, key_vals));
            if let Some(idx) = hit {
                self.unlink(idx);
                self.push_front(idx);
                return (idx, None);
            }
        }

        let fresh = Clump {
            keys: key_vals.iter().map(|v| v.map(Box::from)).collect(),
            states: init_states(),
            hash,
            prev: NIL,
            next: NIL,
        };
        let (idx, evicted) = match self.capacity {
            Some(capacity) if self.clumps.len() >= capacity => {
                let victim = self.tail;
                self.unlink(victim);
                self.remove_from_bucket(victim);
                let old = mem::replace(&mut self.clumps[victim], fresh);
                (victim, Some(old))
            }
            _ => {
                self.clumps.push(fresh);
                (self.clumps.len() - 1, None)
            }
        };
        self.buckets.entry(hash).or_default().push(idx);
        self.push_front(idx);
        (idx, evicted)
    }

    pub fn clump(&self, idx: usize) -> &Clump {
        &self.clumps[idx]
    }

    pub fn clump_mut(&mut self, idx: usize) -> &mut Clump {
        &mut self.clumps[idx]
    }

    pub fn len(&self) -> usize {
        self.clumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clumps.is_empty()
    }

    /// Slab-order iteration: first-creation order in perfect mode, slot
    /// order under eviction reuse.
    pub fn iter(&self) -> impl Iterator<Item = &Clump> {
        self.clumps.iter()
    }

    fn hash_key_tuple(&self, key_vals: &[Option<&str>]) -> u64 {
        let mut hasher = self.build_hasher.build_hasher();
        for value in key_vals.iter().flatten() {
            hasher.write_usize(value.len());
            hasher.write(value.as_bytes());
        }
        hasher.finish()
    }

    fn remove_from_bucket(&mut self, idx: usize) {
        let hash = self.clumps[idx].hash;
        let bucket = self
            .buckets
            .get_mut(&hash)
            .expect("an evicted clump is always bucketed");
        bucket.retain(|&i| i != idx);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.clumps[idx].prev, self.clumps[idx].next);
        match next {
            NIL => self.tail = prev,
            n => self.clumps[n].prev = prev,
        }
        match prev {
            NIL => self.head = next,
            p => self.clumps[p].next = next,
        }
    }

    fn push_front(&mut self, idx: usize) {
        self.clumps[idx].prev = NIL;
        self.clumps[idx].next = self.head;
        match self.head {
            NIL => self.tail = idx,
            h => self.clumps[h].prev = idx,
        }
        self.head = idx;
    }
}

fn keys_match(stored: &[Option<Box<str>>], probe: &[Option<&str>]) -> bool {
    stored.len() == probe.len()
        && stored.iter().zip(probe).all(|(a, b)| match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => **a == **b,
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_states() -> Box<[AggState]> {
        Box::from(vec![])
    }

    fn touch(table: &mut ClumpTable, keys: &[Option<&str>]) -> Option<Vec<Option<String>>> {
        let (_, evicted) = table.find_or_create(keys, no_states);
        evicted.map(|clump| {
            clump
                .keys
                .iter()
                .map(|k| k.as_deref().map(str::to_string))
                .collect()
        })
    }

    #[test]
    fn bounded_table_never_exceeds_capacity() {
        let mut table = ClumpTable::new(Some(2));
        assert_eq!(touch(&mut table, &[Some("a")]), None);
        assert_eq!(touch(&mut table, &[Some("b")]), None);
        assert_eq!(table.len(), 2);
        // "a" is the least recently touched and gets displaced
        let evicted = touch(&mut table, &[Some("c")]);
        assert_eq!(evicted, Some(vec![Some("a".to_string())]));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn a_hit_refreshes_lru_position() {
        let mut table = ClumpTable::new(Some(2));
        touch(&mut table, &[Some("a")]);
        touch(&mut table, &[Some("b")]);
        touch(&mut table, &[Some("a")]);
        // "b" is now the tail
        let evicted = touch(&mut table, &[Some("c")]);
        assert_eq!(evicted, Some(vec![Some("b".to_string())]));
    }

    #[test]
    fn perfect_mode_never_evicts() {
        let mut table = ClumpTable::new(None);
        for n in 0..1000 {
            let key = n.to_string();
            assert_eq!(touch(&mut table, &[Some(&key)]), None);
        }
        assert_eq!(table.len(), 1000);
    }

    #[test]
    fn absent_keys_equal_only_themselves() {
        let mut table = ClumpTable::new(None);
        touch(&mut table, &[None, Some("x")]);
        touch(&mut table, &[Some("ALL"), Some("x")]);
        touch(&mut table, &[None, Some("x")]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn a_single_clump_table_cycles_in_place() {
        let mut table = ClumpTable::new(Some(1));
        assert_eq!(touch(&mut table, &[Some("a")]), None);
        assert_eq!(touch(&mut table, &[Some("a")]), None);
        assert_eq!(
            touch(&mut table, &[Some("b")]),
            Some(vec![Some("a".to_string())])
        );
        assert_eq!(
            touch(&mut table, &[Some("a")]),
            Some(vec![Some("b".to_string())])
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn zero_key_fields_collapse_to_one_clump() {
        let mut table = ClumpTable::new(None);
        touch(&mut table, &[]);
        touch(&mut table, &[]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn iteration_follows_first_creation_order_in_perfect_mode() {
        let mut table = ClumpTable::new(None);
        touch(&mut table, &[Some("b")]);
        touch(&mut table, &[Some("a")]);
        touch(&mut table, &[Some("b")]);
        let order: Vec<_> = table
            .iter()
            .map(|c| c.keys[0].as_deref().map(str::to_string))
            .collect();
        assert_eq!(order, vec![Some("b".to_string()), Some("a".to_string())]);
    }
}
