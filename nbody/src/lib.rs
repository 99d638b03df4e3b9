//! Distributed Barnes-Hut n-body simulation.
//!
//! A population of point masses is advanced under mutual gravity by a fixed
//! group of rank-addressed processes. Each step the group agrees on a global
//! bounding box, builds one spatial tree through a merge reduction, and
//! integrates its slice of the bodies before an all-gather restores the full
//! population on every rank.

/// Body and body-sequence data model.
pub mod body;

/// Collective communication seam and work division across ranks.
pub mod comm;

/// Configuration and the command line surface.
pub mod config;

/// Engine driver: initialise, run, finalise.
pub mod engine;

/// Error kinds and their group abort codes.
pub mod error;

/// Partitioned body generation and canned initial states.
pub mod generate;

/// Decoding of body input documents.
pub mod input;

/// Thread-backed communicator group for single-process runs.
pub mod local;

/// Logging setup with rank-aware events.
pub mod logging;

/// MPI-backed communicator group.
#[cfg(feature = "mpi")]
pub mod mpi;

/// Output layout written by the root rank.
pub mod output;

/// Force approximation and the per-step integrator.
pub mod physics;

/// Deterministic parallel random number generation.
pub mod random;

/// Axis-aligned spaces, part indexing and the collective bounding box.
pub mod space;

/// The 2^D-way body tree: insertion, merge and the parallel build.
pub mod tree;

/// Fixed-dimension vector algebra.
pub mod vector;
