//! Modux Persistence
//!
//! Strategies that store serialized module state under string keys, and the
//! manager that keeps a [`modux_state::Store`] in sync with one of them.

pub mod codec;
pub mod filter;
pub mod manager;
pub mod memory;
pub mod persistent;
pub mod sink;

pub use codec::JsonSerializer;
pub use filter::PathFilter;
pub use manager::{PersistenceManager, PersistenceOptions};
pub use memory::MemoryStrategy;
pub use persistent::SledStrategy;
pub use sink::FileUnloadSink;
