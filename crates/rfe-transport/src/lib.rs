//! Transport implementations for rfe.
//!
//! This crate provides the concrete [`Transport`](rfe_core::Transport)
//! used to talk to real hardware:
//!
//! - [`SerialTransport`]: the USB virtual COM port of an RF Explorer
//!
//! # Example
//!
//! ```no_run
//! use rfe_transport::{SerialTransport, DEFAULT_BAUD_RATE};
//! use rfe_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> rfe_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", DEFAULT_BAUD_RATE).await?;
//!
//! let mut buf = [0u8; 512];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{
    DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits, DEFAULT_BAUD_RATE,
    LOW_SPEED_BAUD_RATE,
};
