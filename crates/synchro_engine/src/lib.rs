//! # SynchroConnectr Sync Engine
//!
//! Two-way reconciliation between a device address book and a CRM contact
//! store.
//!
//! This crate provides:
//! - Run state machine (fetching → indexing → device→remote → remote→device)
//! - Priority matching over normalized identifiers
//! - Device and remote adapter traits with in-memory implementations
//! - An HTTP contact store over a pluggable client
//! - Cooperative cancellation and per-record retry
//! - A serializable per-run report
//!
//! ## Architecture
//!
//! A full run has two phases:
//! 1. Device → remote: import new device contacts, link matched ones
//! 2. Remote → device: push remote values onto linked device contacts,
//!    link or create the rest
//!
//! ## Key Invariants
//!
//! - An existing remote device link is never overwritten by matching
//! - A device contact already linked from the remote side is never re-imported
//! - The remote side is authoritative for field values
//! - One failing contact never aborts the batch
//! - Re-running with no changes performs no writes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod error;
mod http;
pub mod matching;
mod memory;
mod report;
mod source;
mod state;
mod store;

pub use cancel::CancelToken;
pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpContactStore, HttpMethod, HttpRequest, HttpResponse, LoopbackClient,
    LoopbackServer,
};
pub use matching::{Correspondence, MatchStrategy, Matcher};
pub use memory::{MemoryContactSource, MemoryContactStore};
pub use report::{SyncMode, SyncReport};
pub use source::{ContactSource, DevicePermission, NullContactSource};
pub use state::{SyncEngine, SyncState, SyncStats};
pub use store::ContactStore;
