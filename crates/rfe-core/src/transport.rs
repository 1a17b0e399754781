//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the physical link to an RF
//! Explorer. The serial implementation lives in `rfe-transport`; a mock
//! for deterministic tests lives in `rfe-test-harness`.
//!
//! The IO task in `rfe-explorer` owns a `Box<dyn Transport>` exclusively,
//! so implementations never need internal locking.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device, returning once all of them are written.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data to
    /// arrive; returns [`Error::Timeout`](crate::error::Error::Timeout) if
    /// nothing arrived within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
