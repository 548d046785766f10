//! ChainMap: separately chained table over a node arena.
//!
//! Root slots index into a `SlotMap` of nodes; each node carries its cached
//! hash, an occupancy tag and the key of the next node in its chain.

use crate::error::{Error, Result};
use crate::reentrancy::DebugReentrancy;
use slotmap::SlotMap;

/// Bucket count of a freshly built map.
pub const INITIAL_CAPACITY: usize = 256;

/// Occupancy fraction at which the table is grown.
pub const FILL_RATE: f64 = 0.6;

/// Factor the bucket count is multiplied by on growth.
pub const GROWTH_FACTOR: usize = 4;

/// Computes the hash of a key. Any value, including `0`, is allowed.
pub type HashFn<K> = fn(&K) -> u32;

/// Decides whether two keys are the same key.
pub type EqualFn<K> = fn(&K, &K) -> bool;

/// Receives ownership of a key or value the map is letting go of.
pub type FreeFn<T> = Box<dyn FnMut(T)>;

slotmap::new_key_type! {
    struct NodeKey;
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
}

#[derive(Debug)]
struct Node<K, V> {
    hash: u32,
    // `None` marks a tombstone: the node keeps its chain position and can be
    // claimed by a later insert into the same bucket.
    entry: Option<Entry<K, V>>,
    next: Option<NodeKey>,
}

fn threshold_for(capacity: usize) -> usize {
    (capacity as f64 * FILL_RATE) as usize
}

fn alloc_roots(capacity: usize) -> Result<Vec<Option<NodeKey>>> {
    let mut roots = Vec::new();
    roots.try_reserve_exact(capacity)?;
    roots.resize(capacity, None);
    Ok(roots)
}

/// Construction-time configuration for a [`ChainMap`].
pub struct Builder<K, V> {
    hash_fn: Option<HashFn<K>>,
    equal_fn: Option<EqualFn<K>>,
    key_free: Option<FreeFn<K>>,
    value_free: Option<FreeFn<V>>,
    initial_capacity: usize,
    max_capacity: usize,
}

impl<K, V> Default for Builder<K, V> {
    fn default() -> Self {
        Self {
            hash_fn: None,
            equal_fn: None,
            key_free: None,
            value_free: None,
            initial_capacity: INITIAL_CAPACITY,
            max_capacity: usize::MAX,
        }
    }
}

impl<K, V> Builder<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(mut self, hash_fn: HashFn<K>) -> Self {
        self.hash_fn = Some(hash_fn);
        self
    }

    pub fn equal(mut self, equal_fn: EqualFn<K>) -> Self {
        self.equal_fn = Some(equal_fn);
        self
    }

    /// Called with every key the map replaces, removes or tears down.
    pub fn key_free(mut self, free: impl FnMut(K) + 'static) -> Self {
        self.key_free = Some(Box::new(free));
        self
    }

    /// Called with every value the map replaces, removes or tears down.
    pub fn value_free(mut self, free: impl FnMut(V) + 'static) -> Self {
        self.value_free = Some(Box::new(free));
        self
    }

    /// Starting bucket count, rounded up to a power of two.
    pub fn initial_capacity(mut self, buckets: usize) -> Self {
        self.initial_capacity = buckets;
        self
    }

    /// Upper bound on the bucket count; growth past it fails the `put`
    /// that needed it with [`Error::CapacityOverflow`].
    pub fn max_capacity(mut self, buckets: usize) -> Self {
        self.max_capacity = buckets;
        self
    }

    /// Allocate the map.
    ///
    /// # Panics
    ///
    /// If no hash or no equality function was supplied.
    pub fn build(self) -> Result<ChainMap<K, V>> {
        let hash_fn = self.hash_fn.expect("ChainMap requires a hash function");
        let equal_fn = self.equal_fn.expect("ChainMap requires an equality function");

        let capacity = self
            .initial_capacity
            .max(1)
            .checked_next_power_of_two()
            .ok_or(Error::CapacityOverflow)?;
        if capacity > self.max_capacity {
            return Err(Error::CapacityOverflow);
        }

        let table = Table {
            roots: alloc_roots(capacity)?,
            nodes: SlotMap::with_key(),
            count: 0,
            mask: capacity - 1,
            resize_threshold: threshold_for(capacity),
            max_capacity: self.max_capacity,
            hash_fn,
            equal_fn,
            key_free: self.key_free,
            value_free: self.value_free,
        };
        Ok(ChainMap {
            table,
            reentrancy: DebugReentrancy::new(),
        })
    }
}

// Structural state. Kept apart from the reentrancy guard so a guard can be
// held across `&mut Table` calls.
struct Table<K, V> {
    roots: Vec<Option<NodeKey>>,
    nodes: SlotMap<NodeKey, Node<K, V>>,
    count: usize,
    mask: usize,
    resize_threshold: usize,
    max_capacity: usize,
    hash_fn: HashFn<K>,
    equal_fn: EqualFn<K>,
    key_free: Option<FreeFn<K>>,
    value_free: Option<FreeFn<V>>,
}

impl<K, V> Table<K, V> {
    fn chain_head(&self, hash: u32) -> Option<NodeKey> {
        self.roots[hash as usize & self.mask]
    }

    // Node holding a live entry for `key`, if any.
    fn locate(&self, key: &K) -> Option<NodeKey> {
        let hash = (self.hash_fn)(key);
        let mut cursor = self.chain_head(hash);
        while let Some(k) = cursor {
            let node = &self.nodes[k];
            if let Some(e) = &node.entry {
                if node.hash == hash && (self.equal_fn)(&e.key, key) {
                    return Some(k);
                }
            }
            cursor = node.next;
        }
        None
    }

    fn get(&self, key: &K) -> Option<&V> {
        let k = self.locate(key)?;
        self.nodes[k].entry.as_ref().map(|e| &e.value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let k = self.locate(key)?;
        self.nodes[k].entry.as_mut().map(|e| &mut e.value)
    }

    /// Grow the table if the live count has reached the fill threshold.
    fn reserve_one(&mut self) -> Result<()> {
        if self.count >= self.resize_threshold {
            self.resize()?;
        }
        Ok(())
    }

    fn insert(&mut self, key: K, value: V) {
        let hash = (self.hash_fn)(&key);
        self.insert_hashed(hash, key, value);
    }

    fn insert_hashed(&mut self, hash: u32, key: K, value: V) {
        let slot = hash as usize & self.mask;
        let Some(head) = self.roots[slot] else {
            let k = self.nodes.insert(Node {
                hash,
                entry: Some(Entry { key, value }),
                next: None,
            });
            self.roots[slot] = Some(k);
            self.count += 1;
            return;
        };

        // The whole chain is walked before a tombstone is claimed, so a key
        // stored past a tombstone is replaced rather than duplicated.
        let equal = self.equal_fn;
        let mut tombstone = None;
        let mut found = None;
        let mut cursor = Some(head);
        while let Some(k) = cursor {
            let node = &self.nodes[k];
            match &node.entry {
                None => {
                    tombstone.get_or_insert(k);
                }
                Some(e) if node.hash == hash && equal(&e.key, &key) => {
                    found = Some(k);
                    break;
                }
                Some(_) => {}
            }
            cursor = node.next;
        }

        if let Some(k) = found {
            // New pair goes in first so destructors see a consistent table.
            let old = self.nodes[k].entry.replace(Entry { key, value });
            if let Some(old) = old {
                self.release(old);
            }
            return;
        }

        if let Some(k) = tombstone {
            let node = &mut self.nodes[k];
            node.hash = hash;
            node.entry = Some(Entry { key, value });
            self.count += 1;
            return;
        }

        // No reusable slot: link a new node right behind the chain head.
        let next = self.nodes[head].next;
        let k = self.nodes.insert(Node {
            hash,
            entry: Some(Entry { key, value }),
            next,
        });
        self.nodes[head].next = Some(k);
        self.count += 1;
    }

    /// Rebuild the root table at `GROWTH_FACTOR` times the size.
    ///
    /// Live nodes are relinked by their cached hash, tombstones are freed.
    /// Only the new table allocation can fail, and it happens before any
    /// node is touched.
    fn resize(&mut self) -> Result<()> {
        let old_capacity = self.roots.len();
        let capacity = match old_capacity.checked_mul(GROWTH_FACTOR) {
            Some(c) if c <= self.max_capacity => c,
            _ => {
                log::debug!(
                    "refusing to grow ChainMap past {old_capacity} buckets (limit {})",
                    self.max_capacity
                );
                return Err(Error::CapacityOverflow);
            }
        };
        let mut roots = alloc_roots(capacity)?;
        let mask = capacity - 1;
        let old_roots = std::mem::take(&mut self.roots);

        let mut purged = 0usize;
        for root in old_roots {
            let mut cursor = root;
            while let Some(k) = cursor {
                cursor = self.nodes[k].next;

                if self.nodes[k].entry.is_none() {
                    self.nodes.remove(k);
                    purged += 1;
                    continue;
                }

                let slot = self.nodes[k].hash as usize & mask;
                match roots[slot] {
                    None => {
                        self.nodes[k].next = None;
                        roots[slot] = Some(k);
                    }
                    Some(head) => {
                        let next = self.nodes[head].next;
                        self.nodes[k].next = next;
                        self.nodes[head].next = Some(k);
                    }
                }
            }
        }

        log::trace!(
            "grew ChainMap from {old_capacity} to {capacity} buckets ({} live, {purged} tombstones purged)",
            self.count
        );

        self.roots = roots;
        self.mask = mask;
        self.resize_threshold = threshold_for(capacity);
        Ok(())
    }

    // The node stays linked; a later insert into the same bucket reuses it.
    fn tombstone(&mut self, key: &K) -> Option<Entry<K, V>> {
        let k = self.locate(key)?;
        let node = &mut self.nodes[k];
        let old = node.entry.take()?;
        node.hash = 0;
        self.count -= 1;
        Some(old)
    }

    fn release(&mut self, entry: Entry<K, V>) {
        let Entry { key, value } = entry;
        if let Some(free) = self.key_free.as_mut() {
            free(key);
        }
        if let Some(free) = self.value_free.as_mut() {
            free(value);
        }
    }

    // Detaches every node before any destructor runs; the table is empty
    // and consistent even if one of them panics. Flat arena iteration, so
    // chain length never translates into stack depth.
    fn release_all(&mut self) {
        let nodes = std::mem::take(&mut self.nodes);
        self.roots.fill(None);
        self.count = 0;
        for (_, node) in nodes {
            if let Some(e) = node.entry {
                self.release(e);
            }
        }
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        if self.key_free.is_some() || self.value_free.is_some() {
            self.release_all();
        }
    }
}

/// Hash map with caller-supplied hashing, equality and optional destructors.
///
/// Keys and values are moved in and never cloned. When a key or value
/// leaves the map because it was replaced, removed or the map was torn down,
/// it is handed to the configured destructor, or dropped if there is none.
pub struct ChainMap<K, V> {
    table: Table<K, V>,
    reentrancy: DebugReentrancy,
}

impl<K, V> ChainMap<K, V> {
    pub fn builder() -> Builder<K, V> {
        Builder::new()
    }

    /// Map with default sizing and no destructors.
    pub fn new(hash_fn: HashFn<K>, equal_fn: EqualFn<K>) -> Result<Self> {
        Self::new_full(hash_fn, equal_fn, None, None)
    }

    /// Map with default sizing and the given destructors.
    pub fn new_full(
        hash_fn: HashFn<K>,
        equal_fn: EqualFn<K>,
        key_free: Option<FreeFn<K>>,
        value_free: Option<FreeFn<V>>,
    ) -> Result<Self> {
        let mut builder = Builder::new().hash(hash_fn).equal(equal_fn);
        builder.key_free = key_free;
        builder.value_free = value_free;
        builder.build()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.table.count
    }

    pub fn is_empty(&self) -> bool {
        self.table.count == 0
    }

    /// Number of root buckets.
    pub fn capacity(&self) -> usize {
        self.table.roots.len()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let _g = self.reentrancy.enter("get");
        self.table.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let _g = self.reentrancy.enter("get_mut");
        self.table.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let _g = self.reentrancy.enter("contains_key");
        self.table.locate(key).is_some()
    }

    /// Store `value` under `key`, replacing any entry with an equal key.
    ///
    /// A replaced key and value go through the destructors once the new
    /// pair is stored. If the table has to grow first and cannot, the error
    /// is returned and the map is unchanged.
    pub fn put(&mut self, key: K, value: V) -> Result<()> {
        let _g = self.reentrancy.enter("put");
        self.table.reserve_one()?;
        self.table.insert(key, value);
        Ok(())
    }

    /// Remove the entry for `key`, passing its key and value to the
    /// destructors. Returns whether an entry was found.
    pub fn remove(&mut self, key: &K) -> bool {
        let _g = self.reentrancy.enter("remove");
        match self.table.tombstone(key) {
            Some(old) => {
                self.table.release(old);
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `key` and hand it back without running the
    /// destructors.
    pub fn take(&mut self, key: &K) -> Option<(K, V)> {
        let _g = self.reentrancy.enter("take");
        self.table.tombstone(key).map(|e| (e.key, e.value))
    }

    /// Release every live entry through the destructors. The bucket count is
    /// kept.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        self.table.release_all();
    }

    /// Tear the map down; every live key and value goes through the
    /// destructors exactly once. Equivalent to dropping the map.
    pub fn free(self) {
        drop(self);
    }

    /// Iterate live entries in unspecified order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.table.nodes.iter(),
        }
    }

    /// Iterate live entries with mutable values, in unspecified order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.table.nodes.iter_mut(),
        }
    }
}

impl<K, V> ChainMap<Option<K>, Option<V>> {
    /// Insert a pair in a map with nullable keys and values.
    ///
    /// A pair with neither key nor value is accepted and ignored, after the
    /// table has been grown if it was due.
    pub fn put_pair(&mut self, key: Option<K>, value: Option<V>) -> Result<()> {
        let _g = self.reentrancy.enter("put_pair");
        self.table.reserve_one()?;
        if key.is_none() && value.is_none() {
            return Ok(());
        }
        self.table.insert(key, value);
        Ok(())
    }
}

impl<K: core::fmt::Debug, V: core::fmt::Debug> core::fmt::Debug for ChainMap<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over live entries of a `ChainMap`.
pub struct Iter<'a, K, V> {
    it: slotmap::basic::Iter<'a, NodeKey, Node<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .by_ref()
            .find_map(|(_, n)| n.entry.as_ref().map(|e| (&e.key, &e.value)))
    }
}

/// Iterator over live entries of a `ChainMap` with mutable values.
pub struct IterMut<'a, K, V> {
    it: slotmap::basic::IterMut<'a, NodeKey, Node<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .by_ref()
            .find_map(|(_, n)| n.entry.as_mut().map(|e| (&e.key, &mut e.value)))
    }
}

#[cfg(test)]
impl<K, V> ChainMap<K, V> {
    /// Panics if the table structure is inconsistent.
    pub(crate) fn check_invariants(&self) {
        let t = &self.table;
        assert_eq!(t.roots.len(), t.mask + 1);
        assert!(t.roots.len().is_power_of_two());
        assert_eq!(t.resize_threshold, threshold_for(t.roots.len()));

        let mut seen = 0usize;
        let mut live: Vec<&K> = Vec::new();
        for (slot, root) in t.roots.iter().enumerate() {
            let mut cursor = *root;
            while let Some(k) = cursor {
                let node = t.nodes.get(k).expect("chain links to a freed node");
                seen += 1;
                if let Some(e) = &node.entry {
                    assert_eq!(node.hash as usize & t.mask, slot, "node in wrong bucket");
                    assert_eq!(node.hash, (t.hash_fn)(&e.key), "stale cached hash");
                    assert!(
                        live.iter().all(|other| !(t.equal_fn)(*other, &e.key)),
                        "duplicate key"
                    );
                    live.push(&e.key);
                }
                cursor = node.next;
            }
        }
        assert_eq!(seen, t.nodes.len(), "orphaned arena nodes");
        assert_eq!(live.len(), t.count, "count out of sync");
    }

    pub(crate) fn node_count(&self) -> usize {
        self.table.nodes.len()
    }
}
