//! CLI entrypoint for the asymrcu stress harness.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use asymrcu_harness::litmus::{self, LitmusConfig};
use asymrcu_harness::report::{self, LitmusSummary, StressSummary, Verdict};
use asymrcu_harness::stress::{self, StressConfig};

/// Stress and litmus driver for asymrcu.
#[derive(Debug, Parser)]
#[command(name = "asymrcu-stress")]
#[command(about = "Stress and litmus driver for asymrcu")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Publish/read stress run with sentinel poisoning of retired buffers.
    Stress {
        /// Number of reader threads.
        #[arg(long, default_value_t = 64)]
        readers: usize,
        /// Run duration in seconds.
        #[arg(long, default_value_t = 5.0)]
        duration_secs: f64,
        /// Microseconds to sleep between updates (0 = back to back).
        #[arg(long, default_value_t = 10)]
        update_interval_us: u64,
        /// Enter a nested read-side section on every reader iteration.
        #[arg(long)]
        nested: bool,
        /// Write the JSON summary here instead of stdout.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Store-buffering litmus trials.
    Litmus {
        /// Number of lockstep trials.
        #[arg(long, default_value_t = 1_000_000)]
        trials: u64,
        /// Write the JSON summary here instead of stdout.
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(verdict) => match verdict {
            Verdict::Pass => ExitCode::SUCCESS,
            Verdict::Fail => ExitCode::FAILURE,
        },
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Verdict, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Stress {
            readers,
            duration_secs,
            update_interval_us,
            nested,
            json,
        } => {
            let config = StressConfig {
                readers,
                duration: Duration::from_secs_f64(duration_secs),
                update_interval: Duration::from_micros(update_interval_us),
                nested,
            };
            eprintln!(
                "starting stress run: {} readers, {:.1}s, {}us update interval",
                config.readers,
                config.duration.as_secs_f64(),
                config.update_interval.as_micros()
            );

            let outcome = stress::run(&config)?;
            for (index, iterations) in outcome.reader_iterations.iter().enumerate() {
                eprintln!("thread {index}: {iterations} iterations");
            }
            eprintln!(
                "{} updates, max grace period {}us",
                outcome.updates,
                outcome.max_grace_period.as_micros()
            );

            let summary = StressSummary::new(&config, &outcome);
            report::emit(&summary, json.as_deref())?;
            Ok(summary.verdict)
        }
        Command::Litmus { trials, json } => {
            let config = LitmusConfig { trials };
            eprintln!("starting litmus run: {trials} trials");

            let outcome = litmus::run(&config)?;
            eprintln!(
                "{} trials, {} forbidden outcomes",
                outcome.trials, outcome.forbidden
            );

            let summary = LitmusSummary::new(&outcome);
            report::emit(&summary, json.as_deref())?;
            Ok(summary.verdict)
        }
    }
}
