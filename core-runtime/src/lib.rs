//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the task assigning core:
//! - Planner configuration with fail-fast validation
//! - Logging and tracing bootstrap
//!
//! ## Overview
//!
//! Nothing in this crate runs on its own. The planning core consumes a
//! validated [`PlannerConfig`](config::PlannerConfig), and hosts call
//! [`init_logging`](logging::init_logging) once at startup.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{PlannerConfig, PlannerConfigBuilder};
pub use error::{Error, Result};
