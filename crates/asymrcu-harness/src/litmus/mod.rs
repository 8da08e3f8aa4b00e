//! Store-buffering litmus driver.
//!
//! Probes the sequential-consistency half of the grace-period contract:
//! with thread A running `read_lock; x = 1; fence(SeqCst); read y;
//! read_unlock` and thread B running `y = 1; synchronize; read x`, the
//! outcome where both sides read zero must never occur. Each trial runs
//! the two sides in barrier lockstep from freshly reset locations, so a
//! long run samples many interleavings.

use std::sync::Barrier;
use std::sync::atomic::{AtomicU64, Ordering, fence};

use asymrcu_core::{RcuDomain, RcuInitError};

/// Knobs for a litmus run.
#[derive(Debug, Clone)]
pub struct LitmusConfig {
    /// Number of lockstep trials.
    pub trials: u64,
}

impl Default for LitmusConfig {
    fn default() -> Self {
        Self { trials: 1_000_000 }
    }
}

/// Counters collected from a litmus run.
#[derive(Debug, Clone)]
pub struct LitmusOutcome {
    pub trials: u64,
    /// Trials where both sides read zero. Any value above zero is a
    /// memory-ordering bug in the engine.
    pub forbidden: u64,
}

/// Run the experiment to completion.
pub fn run(config: &LitmusConfig) -> Result<LitmusOutcome, RcuInitError> {
    let domain = RcuDomain::new()?;
    let x = AtomicU64::new(0);
    let y = AtomicU64::new(0);
    let y_seen_by_reader = AtomicU64::new(u64::MAX);
    let start = Barrier::new(2);
    let finish = Barrier::new(2);
    let mut forbidden = 0u64;

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let registration = domain.register_reader();
            for _ in 0..config.trials {
                start.wait();
                let guard = registration.read_lock();
                x.store(1, Ordering::Relaxed);
                fence(Ordering::SeqCst);
                y_seen_by_reader.store(y.load(Ordering::Relaxed), Ordering::Relaxed);
                drop(guard);
                finish.wait();
            }
        });

        for _ in 0..config.trials {
            x.store(0, Ordering::Relaxed);
            y.store(0, Ordering::Relaxed);
            start.wait();

            y.store(1, Ordering::Relaxed);
            domain.synchronize();
            let x_seen = x.load(Ordering::Relaxed);

            finish.wait();
            if x_seen == 0 && y_seen_by_reader.load(Ordering::Relaxed) == 0 {
                forbidden += 1;
            }
        }
    });

    Ok(LitmusOutcome {
        trials: config.trials,
        forbidden,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_outcome_stays_at_zero() {
        let outcome = run(&LitmusConfig { trials: 5_000 })
            .expect("host must support the heavy fence");
        assert_eq!(outcome.trials, 5_000);
        assert_eq!(outcome.forbidden, 0);
    }
}
