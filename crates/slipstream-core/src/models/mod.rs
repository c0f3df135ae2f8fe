//! Data models and configuration.

pub mod config;
pub mod outcome;
pub mod receipt;
