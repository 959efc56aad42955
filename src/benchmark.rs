//! Workload driver: allocate a batch of random sizes, sample utilization,
//! then free everything back in shuffled order while timing both phases.

use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::allocator::Allocator;

/// Workload shape for one [`run_benchmark`] call.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkConfig {
    /// Number of `alloc` calls to issue.
    pub num_operations: usize,
    /// Inclusive lower bound on requested size.
    pub min_size: usize,
    /// Inclusive upper bound on requested size.
    pub max_size: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            num_operations: 100_000,
            min_size: 16,
            max_size: 4096,
        }
    }
}

/// Timing and utilization summary of one [`run_benchmark`] run.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub allocator_name: &'static str,
    pub avg_alloc_time_ns: f64,
    pub avg_free_time_ns: f64,
    pub utilization_factor: f64,
    pub successful_allocs: usize,
    pub failed_allocs: usize,
}

/// Run `config`'s workload against `allocator` using `rng` for both the
/// size draws and the subsequent free-order shuffle.
///
/// Utilization is sampled immediately after the allocation phase, before
/// any frees, so it reflects worst-case fragmentation for the workload.
pub fn run_benchmark(
    allocator: &mut dyn Allocator,
    config: &BenchmarkConfig,
    rng: &mut impl Rng,
) -> BenchmarkResult {
    let mut successful_allocs = 0usize;
    let mut failed_allocs = 0usize;
    let mut allocations = Vec::with_capacity(config.num_operations);

    let alloc_start = Instant::now();
    for _ in 0..config.num_operations {
        let size = rng.gen_range(config.min_size..=config.max_size);
        match allocator.alloc(size) {
            Some(ptr) => {
                allocations.push(ptr);
                successful_allocs += 1;
            }
            None => failed_allocs += 1,
        }
    }
    let alloc_duration = alloc_start.elapsed();

    let utilization_factor = allocator.used_bytes() as f64 / allocator.total_bytes() as f64;

    // Shuffle with the same rng used to draw sizes, so the free order is
    // unrelated to allocation order.
    allocations.shuffle(rng);

    let free_start = Instant::now();
    for ptr in &allocations {
        allocator.free(Some(*ptr));
    }
    let free_duration = free_start.elapsed();

    let avg_alloc_time_ns = alloc_duration.as_nanos() as f64 / config.num_operations as f64;
    let avg_free_time_ns =
        free_duration.as_nanos() as f64 / allocations.len().max(1) as f64;

    BenchmarkResult {
        allocator_name: allocator.name(),
        avg_alloc_time_ns,
        avg_free_time_ns,
        utilization_factor,
        successful_allocs,
        failed_allocs,
    }
}

/// Render a side-by-side comparison table for two benchmark runs.
pub fn format_comparison(r1: &BenchmarkResult, r2: &BenchmarkResult) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "\n=============== benchmark comparison ===============\n");
    let _ = writeln!(
        out,
        "{:<42} | {:>20} | {:>20}",
        "metric", r1.allocator_name, r2.allocator_name
    );
    let _ = writeln!(out, "{}", "-".repeat(87));
    let _ = writeln!(
        out,
        "{:<42} | {:>20.2} | {:>20.2}",
        "avg alloc time (ns)", r1.avg_alloc_time_ns, r2.avg_alloc_time_ns
    );
    let _ = writeln!(
        out,
        "{:<42} | {:>20.2} | {:>20.2}",
        "avg free time (ns)", r1.avg_free_time_ns, r2.avg_free_time_ns
    );
    let _ = writeln!(
        out,
        "{:<42} | {:>19.2}% | {:>19.2}%",
        "utilization factor",
        r1.utilization_factor * 100.0,
        r2.utilization_factor * 100.0
    );
    let _ = writeln!(
        out,
        "{:<42} | {:>20} | {:>20}",
        "successful allocs", r1.successful_allocs, r2.successful_allocs
    );
    let _ = writeln!(
        out,
        "{:<42} | {:>20} | {:>20}",
        "failed allocs", r1.failed_allocs, r2.failed_allocs
    );
    let _ = writeln!(out, "{}", "=".repeat(87));

    out
}
