//! rfe-core: Core traits, types, and error definitions for rfe.
//!
//! This crate defines the abstractions shared by the transport, the
//! protocol engine and applications: the [`Transport`] trait, the device
//! vocabulary ([`Model`], [`Mode`], [`Calculator`], ...), session events and
//! unit conversion helpers.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`DeviceEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod helpers;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use rfe_core::*`.
pub use error::{Error, Result};
pub use events::DeviceEvent;
pub use helpers::{
    dbm_to_dbuv, dbm_to_mw, dbm_to_watt, dbuv_to_dbm, decorate_serial_number, format_freq_mhz,
    mw_to_dbm, watt_to_dbm,
};
pub use transport::Transport;
pub use types::*;
