use fixpool::*;
use proptest::prelude::*;
use std::{cell::Cell, rc::Rc};

struct Tracked {
    value: u32,
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Allocate(u32),
    /// Frees the live handle at this position, modulo the number of handles.
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u32>().prop_map(Op::Allocate),
        any::<usize>().prop_map(Op::Free),
    ]
}

proptest! {
    #[test]
    fn pool_follows_free_stack_model(
        capacity in 0usize..16,
        ops in prop::collection::vec(op(), 0..64),
    ) {
        let drops = Rc::new(Cell::new(0));
        let mut expected_drops = 0;
        {
            let pool = Pool::new(capacity);
            let mut free: Vec<usize> = (0..capacity).collect();
            let mut live = Vec::new();

            for op in ops {
                match op {
                    Op::Allocate(value) => {
                        let tracked = Tracked { value, drops: drops.clone() };
                        match pool.allocate(tracked) {
                            Ok(handle) => {
                                prop_assert_eq!(Some(handle.index()), free.pop());
                                prop_assert_eq!(handle.value, value);
                                prop_assert!(pool.owns(&handle));
                                live.push(handle);
                            }
                            Err(err) => {
                                prop_assert!(free.is_empty());
                                prop_assert_eq!(err, PoolError::Exhausted { capacity });
                                expected_drops += 1;
                            }
                        }
                    }
                    Op::Free(pick) if !live.is_empty() => {
                        let handle = live.swap_remove(pick % live.len());
                        let index = handle.index();
                        prop_assert!(pool.free(handle).is_ok());
                        free.push(index);
                        expected_drops += 1;
                    }
                    Op::Free(_) => {}
                }
                prop_assert_eq!(pool.len(), live.len());
                prop_assert_eq!(pool.available(), free.len());
                prop_assert_eq!(drops.get(), expected_drops);
            }

            expected_drops += live.len();
            drop(live);
        }
        prop_assert_eq!(drops.get(), expected_drops);
    }
}
