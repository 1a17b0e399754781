//! Asynchronous device event types.
//!
//! Events are emitted by the device session through a
//! [`tokio::sync::broadcast`] channel. Edge-triggered conditions such as an
//! acknowledgement or a firmware reset are delivered exactly once per
//! subscriber instead of being left in a flag for the caller to clear.

use crate::types::{Mode, Model};

/// An event emitted by a device session when device state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The session is connected and the IO task is running.
    Connected,

    /// The session was closed or the link dropped.
    Disconnected,

    /// The device identified its boards.
    ModelIdentified {
        main: Model,
        expansion: Model,
        firmware: String,
    },

    /// A new configuration was applied.
    ConfigurationChanged {
        mode: Mode,
        /// `true` when start or step frequency moved by at least 1 kHz.
        plan_changed: bool,
    },

    /// A sweep was appended to the sweep buffer.
    SweepAdded {
        /// Number of sweeps held after the append.
        count: usize,
    },

    /// The device acknowledged a command (`#ACK`).
    Acknowledged,

    /// The firmware reset banner was seen; the device must be reconfigured.
    ResetDetected,

    /// The sweep buffer hit its hard cap and the session entered hold mode.
    BufferFull,

    /// A text line the session did not recognize.
    Text(String),
}
