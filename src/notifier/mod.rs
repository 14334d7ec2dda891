//! Downstream consumers of new-commit events

mod issue;
mod log;

pub use issue::IssueNotifier;
pub use log::LogNotifier;
