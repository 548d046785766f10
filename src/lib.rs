//! chain-hashmap: a single-threaded, separately chained hash map whose
//! hashing, key equality and entry destruction are supplied by the caller.
//!
//! Internal Design:
//!
//! Summary
//! - `ChainMap<K, V>` owns a power-of-two table of root slots. Each root
//!   slot is either empty or names the head node of a chain; every node,
//!   head or not, lives in one `slotmap` arena and links to the next node
//!   by arena key.
//! - Every node caches the 32-bit hash of its key. Lookups compare cached
//!   hashes before calling the equality function, and growth relinks nodes
//!   by their cached hash without calling the hash function again.
//!
//! Occupancy and tombstones
//! - A node's entry is either present or absent. Removing a key takes the
//!   entry out and leaves the node linked as a tombstone; the next insert
//!   into that bucket claims the first tombstone it walks past before it
//!   allocates a new node.
//! - Since occupancy is explicit, any `u32` (including `0`) is a valid hash.
//! - `len()` counts live entries only; removal lowers it.
//!
//! Growth
//! - Before every insert, if the live count has reached 60% of the bucket
//!   count, the table grows fourfold. The new root table is allocated
//!   fallibly before anything else is touched, so a failed growth leaves
//!   the map as it was and surfaces as an `Err` from `put`.
//! - Growth frees tombstoned nodes; live nodes are relinked, not copied.
//!
//! Ownership
//! - Keys and values are moved into the map and never cloned. A key or value
//!   leaving the map (replaced, removed, cleared, torn down) is passed to the
//!   configured destructor, or dropped when none is configured. `take` hands
//!   the pair back to the caller instead.
//!
//! Reentrancy
//! - User hash/equal/destructor code runs while chains are being walked.
//!   A debug-only guard panics if such code re-enters the same map.
//!
//! Notes and non-goals
//! - Single-threaded; no internal locking.
//! - No iteration order guarantees, no persistence.

pub mod chain_map;
mod chain_map_proptest;
pub mod error;
pub mod hashers;
mod reentrancy;

// Public surface
pub use chain_map::{Builder, ChainMap, EqualFn, FreeFn, HashFn, Iter, IterMut};
pub use error::{Error, Result};
