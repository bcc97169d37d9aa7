use std::{env, time::Duration};

use crate::error::HarnessError;

pub const WAIT_VAR: &str = "FAIR_RWLOCK_WAIT_MS";
pub const STAGGER_BASE_VAR: &str = "FAIR_RWLOCK_STAGGER_BASE_MS";
pub const STAGGER_STEP_VAR: &str = "FAIR_RWLOCK_STAGGER_STEP_MS";

/// Pacing of an [super::ExecutionGroup]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupConfig {
    /// how long the driver sleeps between polls / after letting a task complete
    pub default_wait: Duration,
    /// task #0 sleeps that long before going to the starting line...
    pub stagger_base: Duration,
    /// ... and every next task sleeps this much less
    pub stagger_step: Duration,
}

impl GroupConfig {
    pub const DEFAULT_WAIT: Duration = Duration::from_millis(100);

    pub fn with_default_wait(default_wait: Duration) -> Self {
        Self {
            default_wait,
            ..Default::default()
        }
    }

    /// Later tasks reach the starting line first: 500ms for #0, 50ms less for every next one.
    pub fn staggered() -> Self {
        Self {
            stagger_base: Duration::from_millis(500),
            stagger_step: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Defaults overridden by the `FAIR_RWLOCK_*_MS` environment variables
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HarnessError> {
        let millis = |key: &'static str, default: Duration| match lookup(key) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| HarnessError::InvalidSetting { key, value }),
        };

        let defaults = Self::default();
        Ok(Self {
            default_wait: millis(WAIT_VAR, defaults.default_wait)?,
            stagger_base: millis(STAGGER_BASE_VAR, defaults.stagger_base)?,
            stagger_step: millis(STAGGER_STEP_VAR, defaults.stagger_step)?,
        })
    }

    /// the delay before the task `seq` arrives at the starting line
    pub fn start_delay(&self, seq: usize) -> Duration {
        let seq = u32::try_from(seq).unwrap_or(u32::MAX);
        self.stagger_base
            .saturating_sub(self.stagger_step.saturating_mul(seq))
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            default_wait: Self::DEFAULT_WAIT,
            stagger_base: Duration::ZERO,
            stagger_step: Duration::ZERO,
        }
    }
}
