use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Conventional root rank of every collective.
pub const ROOT: usize = 0;

/// Payload bound shared by all backends: values must be cloneable for the
/// in-process group and serialisable so a messaging backend can move them
/// between address spaces.
pub trait CommData: Clone + Send + Serialize + DeserializeOwned + 'static {}

impl<T> CommData for T where T: Clone + Send + Serialize + DeserializeOwned + 'static {}

/// The collective substrate the engine runs on: a fixed symmetric group of
/// `size` ranks. Every operation is a blocking rendezvous and must be entered
/// by all ranks in the same program order; entering with unequal arguments
/// across ranks is undefined behaviour.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn barrier(&self);

    /// Replace `value` on every rank with the root's value.
    fn broadcast<T: CommData>(&self, value: &mut T, root: usize);

    /// Distribute one element per rank from the root's vector, which must
    /// hold exactly `size` elements. Non-root ranks pass `None`.
    fn scatter<T: CommData>(&self, values: Option<Vec<T>>, root: usize) -> T;

    /// Concatenate equal-length contributions in rank order; every rank
    /// receives the full result.
    fn all_gather<T: CommData>(&self, local: &[T]) -> Vec<T>;

    /// Reduce with an associative operator over a fixed binary tree of ranks
    /// (`op(lower, higher)` at every combining step, log2(size) rounds),
    /// then hand the identical result to every rank.
    fn all_reduce<T, F>(&self, value: T, op: F) -> T
    where
        T: CommData,
        F: Fn(T, T) -> T;

    /// Terminal group abort; ends all ranks.
    fn abort(&self, code: i32) -> !;
}

impl<C: Communicator> Communicator for &C {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn barrier(&self) {
        (**self).barrier()
    }

    fn broadcast<T: CommData>(&self, value: &mut T, root: usize) {
        (**self).broadcast(value, root)
    }

    fn scatter<T: CommData>(&self, values: Option<Vec<T>>, root: usize) -> T {
        (**self).scatter(values, root)
    }

    fn all_gather<T: CommData>(&self, local: &[T]) -> Vec<T> {
        (**self).all_gather(local)
    }

    fn all_reduce<T, F>(&self, value: T, op: F) -> T
    where
        T: CommData,
        F: Fn(T, T) -> T,
    {
        (**self).all_reduce(value, op)
    }

    fn abort(&self, code: i32) -> ! {
        (**self).abort(code)
    }
}

/// This rank's contiguous share of `total` items. The engine requires the
/// total to divide evenly so downstream all-gathers keep uniform counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Division {
    pub begin: usize,
    pub end: usize,
    pub count: usize,
}

impl Division {
    pub fn new<C: Communicator>(comm: &C, total: usize) -> Result<Self> {
        let rank = comm.rank();
        let size = comm.size();

        if total % size != 0 {
            return Err(Error::Divisibility {
                number: total,
                size,
            });
        }

        let local_count = total / size;
        let division = Division {
            begin: local_count * rank,
            end: local_count * (rank + 1),
            count: local_count,
        };
        debug!(
            rank,
            begin = division.begin,
            end = division.end,
            count = division.count,
            "division"
        );
        Ok(division)
    }
}
