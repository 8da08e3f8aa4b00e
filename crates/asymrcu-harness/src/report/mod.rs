//! JSON run summaries.
//!
//! One line of JSON per run, written to stdout or a file, so long stress
//! campaigns can be scraped and aggregated without parsing the human
//! output.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::litmus::LitmusOutcome;
use crate::stress::{StressConfig, StressOutcome};

/// Run verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Summary record for a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressSummary {
    pub verdict: Verdict,
    pub readers: usize,
    pub duration_secs: f64,
    pub nested: bool,
    pub updates: u64,
    pub total_reader_iterations: u64,
    pub min_reader_iterations: u64,
    pub max_grace_period_micros: u128,
}

impl StressSummary {
    #[must_use]
    pub fn new(config: &StressConfig, outcome: &StressOutcome) -> Self {
        Self {
            verdict: if outcome.all_progressed() {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
            readers: config.readers,
            duration_secs: config.duration.as_secs_f64(),
            nested: config.nested,
            updates: outcome.updates,
            total_reader_iterations: outcome.reader_iterations.iter().sum(),
            min_reader_iterations: outcome.reader_iterations.iter().copied().min().unwrap_or(0),
            max_grace_period_micros: outcome.max_grace_period.as_micros(),
        }
    }
}

/// Summary record for a litmus run.
#[derive(Debug, Clone, Serialize)]
pub struct LitmusSummary {
    pub verdict: Verdict,
    pub trials: u64,
    pub forbidden: u64,
}

impl LitmusSummary {
    #[must_use]
    pub fn new(outcome: &LitmusOutcome) -> Self {
        Self {
            verdict: if outcome.forbidden == 0 {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
            trials: outcome.trials,
            forbidden: outcome.forbidden,
        }
    }
}

/// Serialize `summary` as one JSON line to `path`, or stdout when `path`
/// is `None`.
pub fn emit<T: Serialize>(summary: &T, path: Option<&Path>) -> std::io::Result<()> {
    let line = serde_json::to_string(summary)?;
    match path {
        Some(path) => std::fs::write(path, format!("{line}\n")),
        None => {
            let stdout = std::io::stdout();
            writeln!(stdout.lock(), "{line}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stress_summary_flags_a_stalled_reader() {
        let config = StressConfig {
            readers: 2,
            duration: Duration::from_secs(1),
            update_interval: Duration::ZERO,
            nested: false,
        };
        let stalled = StressOutcome {
            reader_iterations: vec![10, 0],
            updates: 5,
            max_grace_period: Duration::from_micros(80),
        };
        let summary = StressSummary::new(&config, &stalled);
        assert_eq!(summary.verdict, Verdict::Fail);
        assert_eq!(summary.min_reader_iterations, 0);
        assert_eq!(summary.total_reader_iterations, 10);
    }

    #[test]
    fn litmus_summary_round_trips_as_json() {
        let summary = LitmusSummary::new(&LitmusOutcome {
            trials: 100,
            forbidden: 0,
        });
        let json = serde_json::to_string(&summary).expect("serializable");
        assert!(json.contains("\"verdict\":\"pass\""));
        assert!(json.contains("\"trials\":100"));
    }
}
