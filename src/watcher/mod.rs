//! Watcher module for upstream branch monitoring
//!
//! The BranchWatcher polls every registered target periodically and offers
//! commits it has not seen before to its listeners. Progress and failures are
//! broadcast as `WatchSignal`s.

mod branch_watcher;
mod config;
mod listener;
mod signal;
mod target;

pub use branch_watcher::{BranchWatcher, TickReport, WatcherHandle};
pub use config::WatcherConfig;
pub use listener::CommitListener;
pub use signal::{NewCommit, WatchError, WatchSignal};
pub use target::{PathFilter, Target, TargetId, TargetRegistry, parse_target};
