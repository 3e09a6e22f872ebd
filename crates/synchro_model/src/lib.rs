//! # SynchroConnectr Model
//!
//! Contact data model shared by the sync engine and its adapters.
//!
//! This crate provides:
//! - `DeviceContact` for records in the device address book
//! - `RemoteContact` for records in the CRM store
//! - `DeviceFields` / `RemoteFields` partial-write patches
//! - `PipelineStage` outreach tiers and `Birthday` dates
//! - Identifier normalization used as matching keys
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod birthday;
mod contact;
mod error;
mod fields;
pub mod normalize;
mod stage;

pub use birthday::Birthday;
pub use contact::{DeviceContact, RemoteContact};
pub use error::{ModelError, ModelResult};
pub use fields::{DeviceFields, RemoteFields};
pub use normalize::{normalize_email, normalize_name, normalize_phone, MIN_PHONE_DIGITS};
pub use stage::PipelineStage;
