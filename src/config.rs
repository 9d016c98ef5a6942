use std::time::Duration;

pub const DEFAULT_NAME: &str = "/SharedMemory";
pub const DEFAULT_RECORDS: usize = 393218;
pub const DEFAULT_GROWTH_RATE: f32 = 0.001;
pub const DEFAULT_PERIOD_MS: u64 = 16;
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(DEFAULT_PERIOD_MS);
pub const DEFAULT_ITERATIONS: u64 = 60_000_000;

/// Everything the updater needs to run one lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub name: String,
    pub records: usize,
    pub growth_rate: f32,
    pub period: Duration,
    pub iterations: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            records: DEFAULT_RECORDS,
            growth_rate: DEFAULT_GROWTH_RATE,
            period: DEFAULT_PERIOD,
            iterations: Some(DEFAULT_ITERATIONS),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        let bare = self.name.strip_prefix('/').unwrap_or(&self.name);
        if bare.is_empty() {
            return Err("name must not be empty".into());
        }
        if bare.contains('/') {
            return Err(format!("name {:?} may only contain a leading '/'", self.name));
        }
        if self.records == 0 {
            return Err("records must be greater than zero".into());
        }
        if !self.growth_rate.is_finite() {
            return Err(format!("growth rate {} is not finite", self.growth_rate));
        }
        Ok(())
    }
}
