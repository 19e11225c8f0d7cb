//! Modux CLI library: config loading, store inspection and the demo session

pub mod commands;
pub mod demo;

pub use commands::*;
pub use demo::run_demo;
