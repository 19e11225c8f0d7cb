//! modux Core Library
//!
//! Core types, traits, and configuration shared by the modux store engine
//! and its persistence layer.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
