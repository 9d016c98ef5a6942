use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use shmvec::config::{
    DEFAULT_GROWTH_RATE, DEFAULT_ITERATIONS, DEFAULT_NAME, DEFAULT_PERIOD_MS, DEFAULT_RECORDS,
};
use shmvec::{install_stop_handler, Config, StopFlag};

/// Writes a growing array of 3-float vectors into a named shared-memory object.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Opts {
    /// Name of the shared-memory object
    #[arg(long, default_value = DEFAULT_NAME)]
    name: String,

    /// Number of vector records in the region
    #[arg(long, default_value_t = DEFAULT_RECORDS)]
    records: usize,

    /// Fraction each active record grows by per pass
    #[arg(long, default_value_t = DEFAULT_GROWTH_RATE)]
    growth_rate: f32,

    /// Sleep between passes, in milliseconds
    #[arg(long, default_value_t = DEFAULT_PERIOD_MS)]
    period_ms: u64,

    /// Number of passes before exiting
    #[arg(long, default_value_t = DEFAULT_ITERATIONS, conflicts_with = "unbounded")]
    iterations: u64,

    /// Run until SIGINT/SIGTERM instead of a fixed number of passes
    #[arg(long)]
    unbounded: bool,
}

impl From<Opts> for Config {
    fn from(opts: Opts) -> Self {
        Config {
            name: opts.name,
            records: opts.records,
            growth_rate: opts.growth_rate,
            period: Duration::from_millis(opts.period_ms),
            iterations: (!opts.unbounded).then_some(opts.iterations),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from(Opts::parse());
    if let Err(msg) = config.validate() {
        error!("invalid configuration: {}", msg);
        return ExitCode::FAILURE;
    }

    let stop = StopFlag::new();
    if let Err(e) = install_stop_handler(&stop) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    match shmvec::run(&config, stop) {
        Ok(report) => {
            info!("done after {} passes", report.passes);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_yields_default_config() {
        let config = Config::from(Opts::parse_from(["shmvec"]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unbounded_drops_iteration_cap() {
        let config = Config::from(Opts::parse_from(["shmvec", "--unbounded", "--period-ms", "5"]));
        assert_eq!(config.iterations, None);
        assert_eq!(config.period, Duration::from_millis(5));
    }
}
