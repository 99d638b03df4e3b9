use rand::{Rng, RngCore};
use tracing::debug;

use crate::comm::Communicator;

/// Modulus of the minimum-standard stream, 2^31 - 1.
pub const MODULUS: u64 = 2_147_483_647;

/// Multiplier of the minimum-standard stream.
const MULTIPLIER: u64 = 48_271;

/// Increment of the minimum-standard stream.
const INCREMENT: u64 = 0;

fn advance(multiplier: u64, increment: u64, x: u64) -> u64 {
    (multiplier * x + increment) % MODULUS
}

/// The minimum-standard linear congruential stream, split so that rank `r`
/// of a group of `P` draws every `P`-th value of the root stream starting at
/// draw `r`, without any rank driving the stream for the others.
///
/// If `x_{i+1} = a0 * x_i + c0 (mod m)` then
/// `x_{i+P} = A * x_i + C (mod m)` with `A = a0^P mod m` and
/// `C = c0 * (1 + a0 + ... + a0^(P-1)) mod m`, so each rank only needs its
/// starting value plus the composed coefficients. The root expands the seed
/// into the `P` starting values and the coefficients, scatters the former and
/// broadcasts the latter. Construction is collective: every rank must enter
/// it in the same program order.
pub struct ParallelMinStd {
    multiplier: u64,
    increment: u64,
    state: u64,
}

impl ParallelMinStd {
    /// Collective construction from a seed known on the root rank. The seed
    /// must lie in `[1, MODULUS - 1]`; other ranks may pass anything.
    pub fn from_seed<C: Communicator>(comm: &C, root: usize, seed: u64) -> Self {
        let size = comm.size();

        let starts = (comm.rank() == root).then(|| {
            debug_assert!(seed >= 1 && seed < MODULUS);
            let mut starts = Vec::with_capacity(size);
            starts.push(seed);
            for i in 1..size {
                starts.push(advance(MULTIPLIER, INCREMENT, starts[i - 1]));
            }
            starts
        });

        let mut coefficients = [0u64; 2];
        if comm.rank() == root {
            let (mut a, mut c) = (1u64, 0u64);
            for _ in 0..size {
                c = (c + a) % MODULUS;
                a = (a * MULTIPLIER) % MODULUS;
            }
            c = (c * INCREMENT) % MODULUS;
            coefficients = [a, c];
        }

        let state = comm.scatter(starts, root);
        comm.broadcast(&mut coefficients, root);
        debug!(
            rank = comm.rank(),
            multiplier = coefficients[0],
            increment = coefficients[1],
            "parallel random stream ready"
        );

        Self {
            multiplier: coefficients[0],
            increment: coefficients[1],
            state,
        }
    }

    /// Collective construction with a fresh entropy seed drawn on the root.
    pub fn new<C: Communicator>(comm: &C, root: usize) -> Self {
        let seed = if comm.rank() == root {
            rand::thread_rng().gen_range(1..MODULUS)
        } else {
            0
        };
        Self::from_seed(comm, root, seed)
    }

    /// Next value of this rank's substream, in `[1, MODULUS - 1]`.
    pub fn draw(&mut self) -> u64 {
        self.state = advance(self.multiplier, self.increment, self.state);
        self.state
    }
}

impl RngCore for ParallelMinStd {
    fn next_u32(&mut self) -> u32 {
        // The raw 31-bit draw; the missing top bit is irrelevant for
        // initialising body distributions and keeps the substream exactly
        // the decimated root stream.
        self.draw() as u32
    }

    fn next_u64(&mut self) -> u64 {
        (self.draw() << 32) | self.draw()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
