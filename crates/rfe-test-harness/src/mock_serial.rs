//! Mock transport for deterministic testing of protocol engines.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs and a queue of unsolicited inbound bytes. RF
//! Explorer devices stream sweeps without being asked, so besides the
//! command/response expectations the mock can be fed raw chunks that the
//! IO task reads during idle polling.
//!
//! The state lives behind a shared lock so a [`MockHandle`] obtained before
//! the mock is moved into an IO task can still inject bytes and inspect
//! what was sent.
//!
//! # Example
//!
//! ```
//! use rfe_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // Request configuration, device answers with a model line.
//! mock.expect(b"#\x04C0", b"#C2-M:003,255,01.12\r\n");
//! // A sweep arriving later without a request.
//! mock.queue_inbound(b"$S\x03\x10\x20\x30\r\n");
//! let handle = mock.handle();
//! assert_eq!(handle.remaining_expectations(), 1);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rfe_core::error::{Error, Result};
use rfe_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes to return when the matching request is received.
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// Chunks waiting to be returned by `receive()`, in order.
    inbound: VecDeque<Vec<u8>>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Accept sends that match no expectation instead of failing them.
    accept_unexpected: bool,
    /// Log of all bytes sent through this transport.
    sent_log: Vec<Vec<u8>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock [`Transport`] for testing protocol engines without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; the matching
/// response is queued behind any inbound bytes already waiting.
///
/// If no expectation matches, `send()` returns [`Error::Protocol`] unless
/// [`accept_unexpected_sends`](Self::accept_unexpected_sends) is enabled.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Cloneable view of a [`MockTransport`] that stays usable after the mock
/// itself has been boxed and handed to an IO task.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                inbound: VecDeque::new(),
                connected: true,
                accept_unexpected: false,
                sent_log: Vec::new(),
            })),
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue unsolicited bytes returned by subsequent `receive()` calls.
    pub fn queue_inbound(&mut self, data: &[u8]) {
        self.handle().push_inbound(data);
    }

    /// Queue unsolicited bytes split into chunks of at most `chunk` bytes,
    /// one chunk per `receive()` call.
    pub fn queue_inbound_chunked(&mut self, data: &[u8], chunk: usize) {
        let chunk = chunk.max(1);
        let mut state = lock(&self.state);
        for piece in data.chunks(chunk) {
            state.inbound.push_back(piece.to_vec());
        }
    }

    /// Record sends that match no expectation instead of failing them.
    pub fn accept_unexpected_sends(&mut self, accept: bool) {
        lock(&self.state).accept_unexpected = accept;
    }

    /// A handle sharing this mock's state.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// All data sent through this transport, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        lock(&self.state).connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Push unsolicited bytes as a single chunk.
    pub fn push_inbound(&self, data: &[u8]) {
        lock(&self.state).inbound.push_back(data.to_vec());
    }

    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    /// Number of inbound chunks not yet read.
    pub fn pending_inbound(&self) -> usize {
        lock(&self.state).inbound.len()
    }

    /// Simulate the link dropping (`false`) or coming back (`true`).
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        let matches_next = state
            .expectations
            .front()
            .map(|e| e.request.as_slice() == data)
            .unwrap_or(false);

        if matches_next {
            if let Some(expectation) = state.expectations.pop_front() {
                if !expectation.response.is_empty() {
                    state.inbound.push_back(expectation.response);
                }
            }
            return Ok(());
        }

        if state.accept_unexpected {
            return Ok(());
        }

        match state.expectations.pop_front() {
            Some(expectation) => Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            ))),
            None => Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        let Some(mut chunk) = state.inbound.pop_front() else {
            return Err(Error::Timeout);
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            // Leave the unread tail at the front for the next call.
            state.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        mock.expect(b"#\x04C0", b"#C2-M:003,255,01.12\r\n");

        mock.send(b"#\x04C0").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"#C2-M:003,255,01.12\r\n");
    }

    #[tokio::test]
    async fn mock_transport_tracks_sent_data() {
        let mut mock = MockTransport::new();
        mock.expect(b"#\x04C0", b"");
        mock.expect(b"#\x04CH", b"");

        mock.send(b"#\x04C0").await.unwrap();
        mock.send(b"#\x04CH").await.unwrap();

        let sent = mock.sent_data();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], b"#\x04C0");
        assert_eq!(sent[1], b"#\x04CH");
    }

    #[tokio::test]
    async fn mock_transport_wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"#\x04C0", b"");

        let result = mock.send(b"#\x04CH").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(b"#\x04C0").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_accepts_unexpected_when_enabled() {
        let mut mock = MockTransport::new();
        mock.accept_unexpected_sends(true);
        mock.send(b"#\x04L1").await.unwrap();
        assert_eq!(mock.sent_data(), vec![b"#\x04L1".to_vec()]);
    }

    #[tokio::test]
    async fn mock_transport_receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 64];

        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn mock_transport_unsolicited_chunks_in_order() {
        let mut mock = MockTransport::new();
        mock.queue_inbound_chunked(b"#ACK\r\n", 2);

        let mut buf = [0u8; 16];
        let mut collected = Vec::new();
        while let Ok(n) = mock.receive(&mut buf, Duration::from_millis(1)).await {
            assert!(n <= 2);
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"#ACK\r\n");
    }

    #[tokio::test]
    async fn mock_transport_partial_receive() {
        let mut mock = MockTransport::new();
        mock.queue_inbound(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::from_millis(1)).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);

        let n = mock.receive(&mut buf, Duration::from_millis(1)).await.unwrap();
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn mock_handle_shares_state() {
        let mut mock = MockTransport::new();
        mock.accept_unexpected_sends(true);
        let handle = mock.handle();

        let mut boxed: Box<dyn Transport> = Box::new(mock);
        handle.push_inbound(b"$D");
        boxed.send(b"#\x04D0").await.unwrap();

        assert_eq!(handle.sent_data(), vec![b"#\x04D0".to_vec()]);
        assert_eq!(handle.pending_inbound(), 1);

        handle.set_connected(false);
        assert!(!boxed.is_connected());
        let mut buf = [0u8; 8];
        let result = boxed.receive(&mut buf, Duration::from_millis(1)).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }

    #[tokio::test]
    async fn mock_transport_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());

        let result = mock.send(b"#\x04C0").await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }
}
