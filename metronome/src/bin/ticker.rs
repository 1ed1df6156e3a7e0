//! Ticker: a small driver program for the metronome.
//!
//! Starts a metronome, prints a line per tick, and closes it on exit.
//!
//! # Usage
//!
//! ```sh
//! ticker --period 2 --count 10
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use metronome::{Metronome, MetronomeConfig, MetronomeError};

/// Default tick period in seconds.
const DEFAULT_PERIOD_SECS: f64 = 1.0;

/// Default number of ticks to print before exiting.
const DEFAULT_COUNT: u64 = 10;

fn main() {
    if let Err(e) = run() {
        eprintln!("ticker: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), MetronomeError> {
    metronome::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let (config, count) = parse_args(&args)?;

    let period = config.period;
    let mut ticker = Metronome::new(config)?;
    ticker.start()?;

    eprintln!(
        "ticker: started with period {}s, printing {count} tick(s)",
        period.as_secs_f64()
    );

    // The Drop impl on Metronome closes the timing loop even if a consumer
    // panics mid-loop, so every exit path releases the worker thread.
    for _ in 0..count {
        let t = ticker.get();
        println!("tick at {t}");
    }

    ticker.close();
    eprintln!("ticker: stopped");

    Ok(())
}

/// Parses command line arguments into a metronome configuration and a tick
/// count.
fn parse_args(args: &[String]) -> Result<(MetronomeConfig, u64), MetronomeError> {
    let mut period_secs = DEFAULT_PERIOD_SECS;
    let mut count = DEFAULT_COUNT;
    let mut capacity: Option<NonZeroUsize> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--period" | "-p" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    MetronomeError::InvalidConfiguration("missing value for --period".to_string())
                })?;
                period_secs = value.parse().map_err(|e| {
                    MetronomeError::InvalidConfiguration(format!("bad period {value:?}: {e}"))
                })?;
            }
            "--count" | "-n" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    MetronomeError::InvalidConfiguration("missing value for --count".to_string())
                })?;
                count = value.parse().map_err(|e| {
                    MetronomeError::InvalidConfiguration(format!("bad count {value:?}: {e}"))
                })?;
            }
            "--capacity" | "-c" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    MetronomeError::InvalidConfiguration("missing value for --capacity".to_string())
                })?;
                let parsed: usize = value.parse().map_err(|e| {
                    MetronomeError::InvalidConfiguration(format!("bad capacity {value:?}: {e}"))
                })?;
                capacity = Some(NonZeroUsize::new(parsed).ok_or_else(|| {
                    MetronomeError::InvalidConfiguration("capacity must be at least 1".to_string())
                })?);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => {
                return Err(MetronomeError::InvalidConfiguration(format!(
                    "unknown argument: {arg}"
                )));
            }
        }
        i += 1;
    }

    if !(period_secs.is_finite() && period_secs > 0.0) {
        return Err(MetronomeError::InvalidConfiguration(format!(
            "period must be a positive number of seconds, got {period_secs}"
        )));
    }

    let config = MetronomeConfig::default()
        .with_period(Duration::from_secs_f64(period_secs))
        .with_name("ticker")
        .with_capacity(capacity);

    Ok((config, count))
}

fn print_usage() {
    eprintln!(
        r#"ticker - print periodic metronome ticks

USAGE:
    ticker [OPTIONS]

OPTIONS:
    -p, --period <SECS>     Tick period in seconds (default: 1)
    -n, --count <N>         Number of ticks to print before exiting (default: 10)
    -c, --capacity <N>      Bound the tick queue; overflow ticks are dropped (default: unbounded)
    -h, --help              Print this help message

EXAMPLE:
    ticker --period 2 --count 5
    ticker -p 0.25 -c 8
"#
    );
}
