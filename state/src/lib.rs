//! Modux Store
//!
//! A single state tree assembled from independently registered modules.
//! State changes only through synchronous mutations; asynchronous work runs
//! in actions that commit mutations. Getters are memoized against the
//! modules they read, and every non-silent commit can be undone.

pub mod context;
pub mod engine;
pub mod getters;
pub mod history;
pub mod module;
mod registry;
pub mod subscription;
pub mod tree;

pub use context::ActionContext;
pub use engine::Store;
pub use getters::GetterContext;
pub use history::{History, StateSnapshot};
pub use module::*;
pub use subscription::{
    ActionEvent, ActionPhase, ActionSubscriber, MutationSubscriber, Subscription, WatchOptions,
};
