//! spinup core - platform-independent launch engine and abstractions
//!
//! This crate provides the configuration, error types, process-control
//! traits, and the retrying launch engine shared across platform-specific
//! implementations.

mod config;
mod error;
mod launcher;
mod log_watch;
mod manager;
mod process;

pub use config::*;
pub use error::*;
pub use launcher::{AttemptOutcome, Launched, Launcher};
pub use log_watch::LogWatcher;
pub use manager::{ServiceProcessManager, ServiceProcessManagerFactory};
pub use process::*;
