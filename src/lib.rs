//! In-place memory allocators and a benchmark driver for comparing them.
//!
//! Two allocators share the [`allocator::Allocator`] contract over a
//! caller-supplied backing region: a binary [`buddy`] allocator and a
//! bucket-and-page allocator in the style of [`mckusick_karels`]. The
//! [`benchmark`] module drives identical random workloads against either
//! one and reports alloc/free latency and memory utilization.

pub mod allocator;
pub mod benchmark;
pub mod buddy;
pub mod error;
pub mod mckusick_karels;
pub mod region;

pub use allocator::Allocator;
pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkResult};
pub use buddy::BuddyAllocator;
pub use error::BackingMemoryError;
pub use mckusick_karels::McKusickKarelsAllocator;
pub use region::BackingMemory;

/// Crate version, exposed for reports and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
