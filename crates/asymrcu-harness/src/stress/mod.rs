//! Publish/read stress workload.
//!
//! One updater thread republishes a monotonically increasing sequence
//! number through an [`RcuCell`], waits a grace period after each swap,
//! poisons the retired buffer with [`SENTINEL`], and frees it. Reader
//! threads spin on `read_lock / load / read_unlock`, counting iterations
//! and asserting they never observe the sentinel: seeing it would mean a
//! buffer was reclaimed while still reachable inside a critical section.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use asymrcu_core::{RcuCell, RcuDomain, RcuInitError, ReaderRegistration};

/// Written into retired buffers after their grace period, before the free.
pub const SENTINEL: u64 = u64::MAX;

/// Knobs for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of reader threads.
    pub readers: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Sleep between updates; zero means update back to back.
    pub update_interval: Duration,
    /// Enter a nested read-side section on every reader iteration.
    pub nested: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            readers: 64,
            duration: Duration::from_secs(5),
            update_interval: Duration::from_micros(10),
            nested: false,
        }
    }
}

/// Counters collected from a stress run.
#[derive(Debug, Clone)]
pub struct StressOutcome {
    /// Iterations completed by each reader thread.
    pub reader_iterations: Vec<u64>,
    /// Updates (replace + grace period + reclaim) completed.
    pub updates: u64,
    /// Longest observed grace-period latency.
    pub max_grace_period: Duration,
}

impl StressOutcome {
    /// Every reader made progress and at least one update landed.
    #[must_use]
    pub fn all_progressed(&self) -> bool {
        self.updates > 0 && self.reader_iterations.iter().all(|&count| count > 0)
    }
}

/// Run the workload to completion.
pub fn run(config: &StressConfig) -> Result<StressOutcome, RcuInitError> {
    let domain = RcuDomain::new()?;
    let cell = RcuCell::new(Box::new(1u64));
    let stop = AtomicBool::new(false);

    let outcome = std::thread::scope(|scope| {
        let readers: Vec<_> = (0..config.readers)
            .map(|_| scope.spawn(|| reader_loop(&domain, &cell, &stop, config.nested)))
            .collect();

        let mut updates = 0u64;
        let mut max_grace_period = Duration::ZERO;
        let mut sequence = 2u64;
        let deadline = Instant::now() + config.duration;

        while Instant::now() < deadline {
            let retired = cell.replace(Some(Box::new(sequence)));
            sequence += 1;

            let begun = Instant::now();
            domain.synchronize();
            max_grace_period = max_grace_period.max(begun.elapsed());

            // SAFETY: the grace period above outlasted every reader that
            // could still hold this buffer.
            if let Some(mut old) = unsafe { retired.into_box() } {
                *old = SENTINEL;
            }
            updates += 1;

            if !config.update_interval.is_zero() {
                std::thread::sleep(config.update_interval);
            }
        }
        stop.store(true, Ordering::Relaxed);

        let reader_iterations = readers
            .into_iter()
            .map(|handle| handle.join().expect("reader thread panicked"))
            .collect();
        StressOutcome {
            reader_iterations,
            updates,
            max_grace_period,
        }
    });

    Ok(outcome)
}

fn reader_loop(
    domain: &RcuDomain,
    cell: &RcuCell<u64>,
    stop: &AtomicBool,
    nested: bool,
) -> u64 {
    let registration: ReaderRegistration<'_> = domain.register_reader();
    let mut iterations = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let outer = registration.read_lock();
        let inner = nested.then(|| registration.read_lock());

        // SAFETY: the guards above span the load and the use of the value.
        let value = unsafe { cell.load() }
            .copied()
            .expect("cell is never emptied");
        assert_ne!(
            value, SENTINEL,
            "observed a reclaimed buffer inside a critical section"
        );

        drop(inner);
        drop(outer);
        iterations += 1;
    }
    iterations
}
