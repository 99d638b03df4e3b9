use ::mpi::datatype::PartitionMut;
use ::mpi::environment::Universe;
use ::mpi::topology::SimpleCommunicator;
use ::mpi::traits::*;
use ::mpi::Count;

use crate::comm::CommData;

fn encode<T: CommData>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("wire encoding failed")
}

fn decode<T: CommData>(bytes: &[u8]) -> T {
    bincode::deserialize(bytes).expect("wire decoding failed")
}

/// The world communicator of an MPI run. Payloads travel as byte buffers so
/// one code path covers every payload type; the deserialised values are
/// bit-identical to what the sender encoded.
pub struct WorldComm {
    world: SimpleCommunicator,
}

impl WorldComm {
    pub fn new(universe: &Universe) -> Self {
        Self {
            world: universe.world(),
        }
    }
}

impl crate::comm::Communicator for WorldComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn broadcast<T: CommData>(&self, value: &mut T, root: usize) {
        let root_process = self.world.process_at_rank(root as Count);

        let mut bytes = if self.rank() == root {
            encode(value)
        } else {
            Vec::new()
        };
        let mut length = bytes.len() as u64;
        root_process.broadcast_into(&mut length);
        bytes.resize(length as usize, 0);
        root_process.broadcast_into(&mut bytes[..]);

        if self.rank() != root {
            *value = decode(&bytes);
        }
    }

    fn scatter<T: CommData>(&self, values: Option<Vec<T>>, root: usize) -> T {
        if self.rank() == root {
            let values = values.expect("scatter root must supply one value per rank");
            assert_eq!(values.len(), self.size(), "scatter needs one value per rank");
            let mut own = None;
            for (rank, value) in values.into_iter().enumerate() {
                if rank == root {
                    own = Some(value);
                } else {
                    let bytes = encode(&value);
                    self.world.process_at_rank(rank as Count).send(&bytes[..]);
                }
            }
            own.expect("scatter root receives its own value")
        } else {
            let (bytes, _status) = self.world.process_at_rank(root as Count).receive_vec::<u8>();
            decode(&bytes)
        }
    }

    fn all_gather<T: CommData>(&self, local: &[T]) -> Vec<T> {
        let size = self.size();
        let bytes = encode(&local.to_vec());

        let local_count = bytes.len() as Count;
        let mut counts = vec![0 as Count; size];
        self.world.all_gather_into(&local_count, &mut counts[..]);

        let displacements: Vec<Count> = counts
            .iter()
            .scan(0, |acc, &count| {
                let displacement = *acc;
                *acc += count;
                Some(displacement)
            })
            .collect();
        let total: Count = counts.iter().sum();

        let mut buffer = vec![0u8; total as usize];
        {
            let mut partition =
                PartitionMut::new(&mut buffer[..], counts.clone(), &displacements[..]);
            self.world
                .all_gather_varcount_into(&bytes[..], &mut partition);
        }

        let mut gathered = Vec::with_capacity(local.len() * size);
        for rank in 0..size {
            let begin = displacements[rank] as usize;
            let end = begin + counts[rank] as usize;
            gathered.extend(decode::<Vec<T>>(&buffer[begin..end]));
        }
        gathered
    }

    fn all_reduce<T, F>(&self, value: T, op: F) -> T
    where
        T: CommData,
        F: Fn(T, T) -> T,
    {
        // Binomial combining tree rooted at rank 0, identical to the
        // in-process backend: the even multiple of 2d folds in its partner
        // at distance d, the partner hands over its accumulation and drops
        // out.
        let rank = self.rank();
        let size = self.size();

        let mut accumulated = value;
        let mut distance = 1;
        while distance < size {
            if rank % (2 * distance) == distance {
                let bytes = encode(&accumulated);
                self.world
                    .process_at_rank((rank - distance) as Count)
                    .send(&bytes[..]);
                break;
            }
            if rank % (2 * distance) == 0 && rank + distance < size {
                let (bytes, _status) = self
                    .world
                    .process_at_rank((rank + distance) as Count)
                    .receive_vec::<u8>();
                accumulated = op(accumulated, decode(&bytes));
            }
            distance *= 2;
        }

        let mut result = accumulated;
        self.broadcast(&mut result, 0);
        result
    }

    fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}
