//! Clopus Common - Shared storage and log access for the watcher dashboard
//!
//! The watcher process writes runs, fixes and its log file; everything in
//! this crate reads (and for the watcher's benefit, writes) that shared state.

pub mod error;
pub mod log_tail;
pub mod models;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use log_tail::{LogTail, LOG_PLACEHOLDER, TAIL_LINES};
pub use models::{Fix, FixStats, NamespaceStats, NewFix, Run, RunCompletion, RunStatus};
pub use store::Store;
