//! Downloads, verifies and applies framework and game updates for an
//! installed Matchstick game, and manages its shell integration.

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod shell;
pub mod tasks;
pub mod utils;

pub use errors::{Result, UpdaterError};
pub use tasks::{LongRunningTask, TaskResult};
