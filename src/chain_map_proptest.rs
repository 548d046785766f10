#![cfg(test)]

// Property tests for ChainMap kept inside the crate so they can check the
// chain structure after every step.

use crate::chain_map::ChainMap;
use crate::hashers::{direct_equal, direct_hash};
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug)]
enum Op {
    Put(usize, u32),
    Remove(usize),
    Take(usize),
    Get(usize),
    Clear,
}

fn arb_ops(keys: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        6 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        3 => (0..keys).prop_map(Op::Remove),
        1 => (0..keys).prop_map(Op::Take),
        3 => (0..keys).prop_map(Op::Get),
        1 => Just(Op::Clear),
    ];
    proptest::collection::vec(op, 1..200)
}

// Few buckets so chains form and the map grows several times.
fn small_hash(k: &usize) -> u32 {
    direct_hash(&(k % 7))
}

type Freed = Rc<RefCell<Vec<u32>>>;

fn instrumented(hash: fn(&usize) -> u32) -> (ChainMap<usize, u32>, Freed) {
    let freed: Freed = Rc::new(RefCell::new(Vec::new()));
    let sink = freed.clone();
    let map = ChainMap::<usize, u32>::builder()
        .hash(hash)
        .equal(direct_equal)
        .value_free(move |v| sink.borrow_mut().push(v))
        .initial_capacity(2)
        .build()
        .unwrap();
    (map, freed)
}

fn run(hash: fn(&usize) -> u32, ops: Vec<Op>) -> std::result::Result<(), TestCaseError> {
    let (mut sut, freed) = instrumented(hash);
    let mut model: HashMap<usize, u32> = HashMap::new();
    let mut expected_freed: Vec<u32> = Vec::new();

    for op in ops {
        match op {
            Op::Put(k, v) => {
                sut.put(k, v).unwrap();
                if let Some(old) = model.insert(k, v) {
                    expected_freed.push(old);
                }
            }
            Op::Remove(k) => {
                let removed = sut.remove(&k);
                let old = model.remove(&k);
                prop_assert_eq!(removed, old.is_some());
                expected_freed.extend(old);
                prop_assert!(sut.get(&k).is_none());
            }
            Op::Take(k) => {
                prop_assert_eq!(sut.take(&k), model.remove(&k).map(|v| (k, v)));
            }
            Op::Get(k) => {
                prop_assert_eq!(sut.get(&k), model.get(&k));
            }
            Op::Clear => {
                sut.clear();
                expected_freed.extend(model.drain().map(|(_, v)| v));
            }
        }
        sut.check_invariants();
        prop_assert_eq!(sut.len(), model.len());
        let mut got = freed.borrow().clone();
        let mut want = expected_freed.clone();
        got.sort_unstable();
        want.sort_unstable();
        prop_assert_eq!(got, want);
    }

    for (k, v) in &model {
        prop_assert_eq!(sut.get(k), Some(v));
    }

    // Teardown releases each remaining value exactly once.
    drop(sut);
    let mut tail: Vec<u32> = freed.borrow()[expected_freed.len()..].to_vec();
    let mut remaining: Vec<u32> = model.into_values().collect();
    tail.sort_unstable();
    remaining.sort_unstable();
    prop_assert_eq!(tail, remaining);
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants checked after every operation:
// - every live node sits in the bucket its cached hash selects;
// - no key is live twice; `len` equals the number of live nodes;
// - each displaced, removed or cleared value reaches the destructor
//   exactly once; taken values never do.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_state_machine_direct_hash(ops in arb_ops(64)) {
        run(direct_hash, ops)?;
    }

    #[test]
    fn prop_state_machine_colliding_hash(ops in arb_ops(64)) {
        run(small_hash, ops)?;
    }
}
