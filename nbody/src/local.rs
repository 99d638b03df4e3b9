use std::any::Any;
use std::sync::{Arc, Barrier, Mutex};

use crate::comm::{CommData, Communicator};

/// A communicator group of `size` threads inside one process. Collectives
/// rendezvous over per-rank exchange slots: contributions are published,
/// a barrier makes them visible, readers take clones, and a second barrier
/// retires the round before anyone publishes again.
///
/// This is the default runtime backend and the harness the multi-rank test
/// suites run on.
pub struct LocalGroup;

impl LocalGroup {
    /// Spawn `size` ranks, run `f` on each, and collect the per-rank results
    /// in rank order.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Send + Sync,
        R: Send,
    {
        assert!(size > 0, "a communicator group needs at least one rank");
        let shared = Arc::new(Shared::new(size));
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let comm = LocalComm {
                        rank,
                        shared: Arc::clone(&shared),
                    };
                    scope.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("rank panicked"))
                .collect()
        })
    }
}

struct Shared {
    barrier: Barrier,
    slots: Vec<Mutex<Option<Box<dyn Any + Send>>>>,
}

impl Shared {
    fn new(size: usize) -> Self {
        Self {
            barrier: Barrier::new(size),
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
        }
    }
}

/// One rank's handle on a [`LocalGroup`].
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalComm {
    fn publish<T: CommData>(&self, value: T) {
        let mut slot = self.shared.slots[self.rank]
            .lock()
            .expect("exchange slot poisoned");
        *slot = Some(Box::new(value));
    }

    fn peek<T: CommData>(&self, rank: usize) -> T {
        let slot = self.shared.slots[rank]
            .lock()
            .expect("exchange slot poisoned");
        slot.as_ref()
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .expect("collective entered with mismatched types across ranks")
            .clone()
    }

    fn retire(&self) {
        self.shared.barrier.wait();
        let mut slot = self.shared.slots[self.rank]
            .lock()
            .expect("exchange slot poisoned");
        *slot = None;
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.slots.len()
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn broadcast<T: CommData>(&self, value: &mut T, root: usize) {
        if self.rank == root {
            self.publish(value.clone());
        }
        self.shared.barrier.wait();
        *value = self.peek(root);
        self.retire();
    }

    fn scatter<T: CommData>(&self, values: Option<Vec<T>>, root: usize) -> T {
        if self.rank == root {
            let values = values.expect("scatter root must supply one value per rank");
            assert_eq!(values.len(), self.size(), "scatter needs one value per rank");
            self.publish(values);
        }
        self.shared.barrier.wait();
        let values: Vec<T> = self.peek(root);
        let value = values[self.rank].clone();
        self.retire();
        value
    }

    fn all_gather<T: CommData>(&self, local: &[T]) -> Vec<T> {
        self.publish(local.to_vec());
        self.shared.barrier.wait();
        let mut gathered = Vec::with_capacity(local.len() * self.size());
        for rank in 0..self.size() {
            gathered.extend(self.peek::<Vec<T>>(rank));
        }
        self.retire();
        gathered
    }

    fn all_reduce<T, F>(&self, value: T, op: F) -> T
    where
        T: CommData,
        F: Fn(T, T) -> T,
    {
        // Binomial combining tree: in the round at distance d the rank at
        // the even multiple of 2d folds in its partner at rank + d. Ranks
        // that already contributed keep publishing so every rank passes the
        // same barriers.
        let size = self.size();
        let mut accumulated = value;
        let mut distance = 1;
        while distance < size {
            self.publish(accumulated.clone());
            self.shared.barrier.wait();
            let partner = self.rank + distance;
            if self.rank % (2 * distance) == 0 && partner < size {
                let contribution = self.peek::<T>(partner);
                accumulated = op(accumulated, contribution);
            }
            self.retire();
            distance *= 2;
        }

        let mut result = accumulated;
        self.broadcast(&mut result, 0);
        result
    }

    fn abort(&self, code: i32) -> ! {
        // The group shares this process; ending it ends every rank.
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_all_ranks() {
        let results = LocalGroup::run(4, |comm| {
            let mut value = if comm.rank() == 0 { 42u64 } else { 0 };
            comm.broadcast(&mut value, 0);
            value
        });
        assert_eq!(results, vec![42, 42, 42, 42]);
    }

    #[test]
    fn test_scatter_hands_out_one_value_per_rank() {
        let results = LocalGroup::run(3, |comm| {
            let values = (comm.rank() == 0).then(|| vec![10u64, 11, 12]);
            comm.scatter(values, 0)
        });
        assert_eq!(results, vec![10, 11, 12]);
    }

    #[test]
    fn test_all_gather_preserves_rank_order() {
        let results = LocalGroup::run(4, |comm| {
            let local = vec![comm.rank() as u64 * 2, comm.rank() as u64 * 2 + 1];
            comm.all_gather(&local)
        });
        for gathered in results {
            assert_eq!(gathered, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        }
    }

    #[test]
    fn test_all_reduce_sums_on_every_rank() {
        for size in [1, 2, 3, 4, 7, 8] {
            let results = LocalGroup::run(size, |comm| {
                comm.all_reduce(comm.rank() as u64 + 1, |a, b| a + b)
            });
            let expected = (size as u64) * (size as u64 + 1) / 2;
            assert_eq!(results, vec![expected; size]);
        }
    }

    #[test]
    fn test_all_reduce_combines_lower_before_higher() {
        // String concatenation is associative but not commutative, so the
        // result records the combining order.
        let results = LocalGroup::run(4, |comm| {
            comm.all_reduce(comm.rank().to_string(), |a, b| a + &b)
        });
        assert_eq!(results, vec!["0123"; 4]);
    }
}
