//! Scaled-down end-to-end runs of the harness workloads.

use std::time::Duration;

use asymrcu_harness::litmus::{self, LitmusConfig};
use asymrcu_harness::report::{LitmusSummary, StressSummary, Verdict};
use asymrcu_harness::stress::{self, StressConfig};

#[test]
fn stress_run_passes_and_summarizes() {
    let config = StressConfig {
        readers: 8,
        duration: Duration::from_millis(300),
        update_interval: Duration::from_micros(10),
        nested: false,
    };
    let outcome = stress::run(&config).expect("host must support the heavy fence");
    assert!(outcome.all_progressed());

    let summary = StressSummary::new(&config, &outcome);
    assert_eq!(summary.verdict, Verdict::Pass);
    assert_eq!(summary.readers, 8);
    assert!(summary.min_reader_iterations > 0);
    assert!(summary.updates > 0);
}

#[test]
fn litmus_run_never_hits_the_forbidden_outcome() {
    let config = LitmusConfig { trials: 20_000 };
    let outcome = litmus::run(&config).expect("host must support the heavy fence");
    assert_eq!(outcome.forbidden, 0);

    let summary = LitmusSummary::new(&outcome);
    assert_eq!(summary.verdict, Verdict::Pass);
}
