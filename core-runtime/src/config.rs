//! # Planner Configuration
//!
//! Settings consumed by the planning core.
//!
//! ## Overview
//!
//! [`PlannerConfig`] is built with a builder and validated before any worker
//! starts. Every invalid value fails fast with an [`Error::Config`] naming
//! the offending setting.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::PlannerConfig;
//! use std::time::Duration;
//!
//! let config = PlannerConfig::builder()
//!     .target_user_id("planner-admin")
//!     .publish_window_size(3)
//!     .sync_interval(Duration::from_secs(1))
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.publish_window_size, 3);
//! ```
//!
//! ## Environment
//!
//! [`PlannerConfig::from_env`] reads `TASK_ASSIGNING_*` variables on top of
//! the defaults. Durations accept ISO-8601 (`PT2S`, `PT1H30M`) or a plain
//! number of milliseconds.
//!
//! ```should_panic
//! use core_runtime::config::PlannerConfig;
//!
//! // Missing target user
//! PlannerConfig::builder().build().expect("target user is required");
//! ```

use crate::error::{Error, Result};
use std::time::Duration;

pub const ENV_TARGET_USER: &str = "TASK_ASSIGNING_TARGET_USER";
pub const ENV_PUBLISH_WINDOW_SIZE: &str = "TASK_ASSIGNING_PUBLISH_WINDOW_SIZE";
pub const ENV_SYNC_INTERVAL: &str = "TASK_ASSIGNING_SYNC_INTERVAL";
pub const ENV_USERS_SYNC_INTERVAL: &str = "TASK_ASSIGNING_USERS_SYNC_INTERVAL";
pub const ENV_SYNC_QUERIES_SHIFT: &str = "TASK_ASSIGNING_SYNC_QUERIES_SHIFT";
pub const ENV_WAIT_FOR_IMPROVED_SOLUTION: &str =
    "TASK_ASSIGNING_WAIT_FOR_IMPROVED_SOLUTION_DURATION";
pub const ENV_IMPROVE_SOLUTION_ON_BACKGROUND: &str =
    "TASK_ASSIGNING_IMPROVE_SOLUTION_ON_BACKGROUND_DURATION";
pub const ENV_INIT_DELAY: &str = "TASK_ASSIGNING_INIT_DELAY";
pub const ENV_DESTROY_TIMEOUT: &str = "TASK_ASSIGNING_DESTROY_TIMEOUT";

const DEFAULT_PUBLISH_WINDOW_SIZE: usize = 2;
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_USERS_SYNC_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);
const DEFAULT_SYNC_QUERIES_SHIFT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_IMPROVE_SOLUTION_ON_BACKGROUND: Duration = Duration::from_secs(60);
const DEFAULT_DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the planning core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// User on whose behalf plans are executed in the external runtime
    pub target_user_id: String,

    /// Maximum number of unpinned assignments published per user and cycle
    pub publish_window_size: usize,

    /// Pause between synchronizer passes
    pub sync_interval: Duration,

    /// Period of full user directory refreshes; zero disables them
    pub users_sync_interval: Duration,

    /// Safety margin subtracted from every poll timestamp
    pub sync_queries_shift: Duration,

    /// Debounce applied before publishing a new best solution; zero publishes immediately
    pub wait_for_improved_solution_duration: Duration,

    /// How long the solver may keep improving once the runtime goes quiet; zero disables
    pub improve_solution_on_background_duration: Duration,

    /// Delay before the first cold start
    pub init_delay: Duration,

    /// Upper bound on waiting for workers during destroy
    pub destroy_timeout: Duration,
}

impl PlannerConfig {
    /// Creates a new builder for constructing a `PlannerConfig`.
    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }

    /// Builds a configuration from `TASK_ASSIGNING_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration reading each setting through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(user) = lookup(ENV_TARGET_USER) {
            builder = builder.target_user_id(user);
        }
        if let Some(size) = lookup(ENV_PUBLISH_WINDOW_SIZE) {
            let size = size.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("{} must be a positive integer: {}", ENV_PUBLISH_WINDOW_SIZE, e))
            })?;
            builder = builder.publish_window_size(size);
        }

        let duration = |key: &str| -> Result<Option<Duration>> {
            lookup(key).map(|raw| parse_duration(key, &raw)).transpose()
        };

        if let Some(value) = duration(ENV_SYNC_INTERVAL)? {
            builder = builder.sync_interval(value);
        }
        if let Some(value) = duration(ENV_USERS_SYNC_INTERVAL)? {
            builder = builder.users_sync_interval(value);
        }
        if let Some(value) = duration(ENV_SYNC_QUERIES_SHIFT)? {
            builder = builder.sync_queries_shift(value);
        }
        if let Some(value) = duration(ENV_WAIT_FOR_IMPROVED_SOLUTION)? {
            builder = builder.wait_for_improved_solution_duration(value);
        }
        if let Some(value) = duration(ENV_IMPROVE_SOLUTION_ON_BACKGROUND)? {
            builder = builder.improve_solution_on_background_duration(value);
        }
        if let Some(value) = duration(ENV_INIT_DELAY)? {
            builder = builder.init_delay(value);
        }
        if let Some(value) = duration(ENV_DESTROY_TIMEOUT)? {
            builder = builder.destroy_timeout(value);
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Target user is not blank
    /// - Publish window is greater than zero
    /// - Sync interval and query shift are strictly positive
    /// - Destroy timeout is strictly positive
    pub fn validate(&self) -> Result<()> {
        if self.target_user_id.trim().is_empty() {
            return Err(Error::Config(
                "Target user id is required to execute plans in the external runtime".to_string(),
            ));
        }

        if self.publish_window_size == 0 {
            return Err(Error::Config(
                "Publish window size must be greater than 0".to_string(),
            ));
        }

        if self.sync_interval.is_zero() {
            return Err(Error::Config(
                "Sync interval must be greater than 0".to_string(),
            ));
        }

        if self.sync_queries_shift.is_zero() {
            return Err(Error::Config(
                "Sync queries shift must be greater than 0".to_string(),
            ));
        }

        if self.destroy_timeout.is_zero() {
            return Err(Error::Config(
                "Destroy timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn has_users_sync(&self) -> bool {
        !self.users_sync_interval.is_zero()
    }

    pub fn has_publish_debounce(&self) -> bool {
        !self.wait_for_improved_solution_duration.is_zero()
    }

    pub fn has_background_improvement(&self) -> bool {
        !self.improve_solution_on_background_duration.is_zero()
    }
}

/// Builder for [`PlannerConfig`].
///
/// Unset values fall back to the defaults; only the target user is required.
#[derive(Debug, Default, Clone)]
pub struct PlannerConfigBuilder {
    target_user_id: Option<String>,
    publish_window_size: Option<usize>,
    sync_interval: Option<Duration>,
    users_sync_interval: Option<Duration>,
    sync_queries_shift: Option<Duration>,
    wait_for_improved_solution_duration: Option<Duration>,
    improve_solution_on_background_duration: Option<Duration>,
    init_delay: Option<Duration>,
    destroy_timeout: Option<Duration>,
}

impl PlannerConfigBuilder {
    pub fn target_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.target_user_id = Some(user_id.into());
        self
    }

    /// Default: 2
    pub fn publish_window_size(mut self, size: usize) -> Self {
        self.publish_window_size = Some(size);
        self
    }

    /// Default: 2 seconds
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Default: 2 hours
    pub fn users_sync_interval(mut self, interval: Duration) -> Self {
        self.users_sync_interval = Some(interval);
        self
    }

    /// Default: 10 minutes
    pub fn sync_queries_shift(mut self, shift: Duration) -> Self {
        self.sync_queries_shift = Some(shift);
        self
    }

    /// Default: zero (publish immediately)
    pub fn wait_for_improved_solution_duration(mut self, duration: Duration) -> Self {
        self.wait_for_improved_solution_duration = Some(duration);
        self
    }

    /// Default: 1 minute
    pub fn improve_solution_on_background_duration(mut self, duration: Duration) -> Self {
        self.improve_solution_on_background_duration = Some(duration);
        self
    }

    pub fn init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    /// Default: 5 seconds
    pub fn destroy_timeout(mut self, timeout: Duration) -> Self {
        self.destroy_timeout = Some(timeout);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<PlannerConfig> {
        let target_user_id = self.target_user_id.ok_or_else(|| {
            Error::Config(
                "Target user id is required to execute plans in the external runtime".to_string(),
            )
        })?;

        let config = PlannerConfig {
            target_user_id,
            publish_window_size: self
                .publish_window_size
                .unwrap_or(DEFAULT_PUBLISH_WINDOW_SIZE),
            sync_interval: self.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL),
            users_sync_interval: self
                .users_sync_interval
                .unwrap_or(DEFAULT_USERS_SYNC_INTERVAL),
            sync_queries_shift: self
                .sync_queries_shift
                .unwrap_or(DEFAULT_SYNC_QUERIES_SHIFT),
            wait_for_improved_solution_duration: self
                .wait_for_improved_solution_duration
                .unwrap_or(Duration::ZERO),
            improve_solution_on_background_duration: self
                .improve_solution_on_background_duration
                .unwrap_or(DEFAULT_IMPROVE_SOLUTION_ON_BACKGROUND),
            init_delay: self.init_delay.unwrap_or(Duration::ZERO),
            destroy_timeout: self.destroy_timeout.unwrap_or(DEFAULT_DESTROY_TIMEOUT),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Parses `PT..H..M..S` or a plain millisecond count.
pub fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let invalid = || {
        Error::Config(format!(
            "{} has an invalid duration '{}': expected ISO-8601 like PT2S or milliseconds",
            key, raw
        ))
    };

    if let Ok(millis) = raw.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }

    let body = raw
        .strip_prefix("PT")
        .or_else(|| raw.strip_prefix("pt"))
        .ok_or_else(invalid)?;
    if body.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    for c in body.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            'H' | 'h' | 'M' | 'm' | 'S' | 's' => {
                let value: f64 = number.parse().map_err(|_| invalid())?;
                let unit = match c.to_ascii_uppercase() {
                    'H' => 3600.0,
                    'M' => 60.0,
                    _ => 1.0,
                };
                let part = Duration::try_from_secs_f64(value * unit).map_err(|_| invalid())?;
                total = total.checked_add(part).ok_or_else(invalid)?;
                number.clear();
            }
            _ => return Err(invalid()),
        }
    }
    if !number.is_empty() {
        return Err(invalid());
    }

    Ok(total)
}
