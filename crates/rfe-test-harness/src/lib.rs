//! rfe-test-harness: Test utilities and mock transports for rfe.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the protocol engine and device session without a real instrument, and
//! [`MockHandle`] for feeding it bytes after it has been moved into an IO
//! task.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport};
