use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::buffer::SharedVectorBuffer;
use crate::config::Config;
use crate::error::Result;
use crate::record::VectorRecord;
use crate::signal::StopFlag;

/// Longest stretch the loop sleeps without looking at its stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Acquires the buffer described by `config`, zeroes it, runs the update loop
/// until its bound or `stop`, then releases the buffer.
pub fn run(config: &Config, stop: StopFlag) -> Result<LoopReport> {
    let mut buffer = SharedVectorBuffer::acquire(&config.name, config.records)?;
    buffer.initialize();

    let report = UpdateLoop::new(config.growth_rate, config.period)
        .iterations(config.iterations)
        .stop_flag(stop)
        .run(buffer.records_mut());

    buffer.release()?;
    Ok(report)
}

/// Grows every active record by `growth_rate` and returns how many grew.
///
/// Inactive records (component sum exactly zero) are left untouched. The pass
/// takes no lock and writes each record in place, so an outside reader can
/// observe it half done.
pub fn update_pass(records: &mut [VectorRecord], growth_rate: f32) -> usize {
    let factor = 1.0 + growth_rate;
    let mut active = 0;
    for record in records.iter_mut().filter(|r| r.is_active()) {
        record.grow(factor);
        active += 1;
    }
    active
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopReport {
    pub passes: u64,
    pub stopped: bool,
}

/// Repeated [`update_pass`] with a fixed sleep between passes.
#[derive(Clone, Debug)]
pub struct UpdateLoop {
    growth_rate: f32,
    period: Duration,
    iterations: Option<u64>,
    stop: StopFlag,
}

impl UpdateLoop {
    /// An unbounded loop; it only ends through its stop flag.
    pub fn new(growth_rate: f32, period: Duration) -> Self {
        Self {
            growth_rate,
            period,
            iterations: None,
            stop: StopFlag::new(),
        }
    }

    /// Caps the number of passes. `None` runs until stopped.
    pub fn iterations(mut self, iterations: Option<u64>) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn run(&self, records: &mut [VectorRecord]) -> LoopReport {
        info!(
            "updating {} records, growth_rate={} period={:?} iterations={}",
            records.len(),
            self.growth_rate,
            self.period,
            self.iterations
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
        );

        let mut passes = 0;
        let stopped = loop {
            if self.iterations.is_some_and(|n| passes >= n) {
                break false;
            }
            if self.stop.is_requested() {
                break true;
            }

            let active = update_pass(records, self.growth_rate);
            passes += 1;
            trace!("pass {}: {} active records", passes, active);

            if !self.period.is_zero() {
                self.pause();
            }
        };

        if stopped {
            info!("stop requested after {} passes", passes);
        } else {
            debug!("finished {} passes", passes);
        }
        LoopReport { passes, stopped }
    }

    /// Sleeps for one period, returning early once a stop is requested.
    fn pause(&self) {
        let deadline = Instant::now() + self.period;
        loop {
            if self.stop.is_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(STOP_POLL));
        }
    }
}
