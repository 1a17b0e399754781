//! SessionBuilder -- fluent builder for constructing [`DeviceSession`]s.
//!
//! Separates session policy (auto-configure, sweep storage, close timeout)
//! from establishing the serial connection.
//!
//! # Example
//!
//! ```no_run
//! use rfe_explorer::builder::SessionBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> rfe_core::Result<()> {
//! let mut session = SessionBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .store_sweeps(false)
//!     .build()
//!     .await?;
//! let model = session.wait_for_model(Duration::from_secs(3)).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rfe_core::error::{Error, Result};
use rfe_core::transport::Transport;
use rfe_core::types::DeviceKind;
use rfe_transport::DEFAULT_BAUD_RATE;

use crate::session::{DeviceSession, SessionConfig};
use crate::sweep_buffer::Growth;

/// Fluent builder for [`DeviceSession`].
pub struct SessionBuilder {
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    config: SessionConfig,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        SessionBuilder {
            serial_port: None,
            baud_rate: None,
            config: SessionConfig::default(),
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default 500 000 baud.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Request the device configuration on connect (default: on).
    pub fn auto_configure(mut self, enabled: bool) -> Self {
        self.config.auto_configure = enabled;
        self
    }

    pub fn auto_clean(mut self, enabled: bool) -> Self {
        self.config.auto_clean = enabled;
        self
    }

    pub fn store_sweeps(mut self, enabled: bool) -> Self {
        self.config.store_sweeps = enabled;
        self
    }

    pub fn use_max_hold(mut self, enabled: bool) -> Self {
        self.config.use_max_hold = enabled;
        self
    }

    /// Device kind to assume until the board reports its model.
    pub fn intended_device(mut self, kind: DeviceKind) -> Self {
        self.config.intended_device = kind;
        self
    }

    /// Keep at most `sweeps` sweeps, evicting the oldest.
    pub fn sweep_capacity(mut self, sweeps: usize) -> Self {
        self.config.growth = Growth::Window(sweeps);
        self
    }

    pub fn growth(mut self, growth: Growth) -> Self {
        self.config.growth = growth;
        self
    }

    /// Keep the undecoded bytes of every sweep.
    pub fn capture_raw(mut self, enabled: bool) -> Self {
        self.config.io.capture_raw = enabled;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Bounded wait for the IO task on close (default: 2s).
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    pub fn config_settle(mut self, settle: Duration) -> Self {
        self.config.config_settle = settle;
        self
    }

    /// Build a [`DeviceSession`] over a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `rfe-test-harness`) and for links the caller opens itself.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<DeviceSession> {
        if self.config.close_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "close_timeout must be greater than zero".into(),
            ));
        }
        DeviceSession::connect(transport, self.config).await
    }

    /// Build a [`DeviceSession`] over a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<DeviceSession> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let baud = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

        let transport = rfe_transport::SerialTransport::open(port, baud).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use rfe_test_harness::MockTransport;

    #[tokio::test]
    async fn builder_defaults() {
        let mut mock = MockTransport::new();
        mock.expect(b"#\x04C0", b"");
        let handle = mock.handle();

        let mut session = SessionBuilder::new()
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::AwaitingConfig);
        assert!(session.config().auto_clean);
        assert!(session.config().store_sweeps);
        assert_eq!(handle.remaining_expectations(), 0);

        session.close().await;
        let sent = handle.sent_data();
        assert_eq!(sent[0], b"#\x04C0".to_vec());
        assert_eq!(sent.last(), Some(&b"#\x04D0".to_vec()));
    }

    #[tokio::test]
    async fn builder_custom_settings() {
        let mut mock = MockTransport::new();
        mock.accept_unexpected_sends(true);
        let handle = mock.handle();

        let mut session = SessionBuilder::new()
            .serial_port("/dev/ttyUSB0")
            .baud_rate(2_400)
            .auto_configure(false)
            .auto_clean(false)
            .store_sweeps(false)
            .use_max_hold(false)
            .intended_device(DeviceKind::Generator)
            .sweep_capacity(10)
            .capture_raw(true)
            .command_timeout(Duration::from_millis(200))
            .close_timeout(Duration::from_millis(300))
            .config_settle(Duration::ZERO)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        assert!(handle.sent_data().is_empty());
        assert!(session.is_generator());
        let config = session.config();
        assert!(!config.auto_clean);
        assert!(!config.store_sweeps);
        assert!(!config.use_max_hold);
        assert!(config.io.capture_raw);
        assert_eq!(config.growth, Growth::Window(10));
        assert_eq!(session.sweeps().growth(), Growth::Window(10));
        assert_eq!(config.close_timeout, Duration::from_millis(300));
        session.close().await;
    }

    #[tokio::test]
    async fn builder_serial_port_required_for_build() {
        let result = SessionBuilder::new().build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn builder_rejects_zero_close_timeout() {
        let result = SessionBuilder::new()
            .close_timeout(Duration::ZERO)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn builder_fluent_chain() {
        let mut mock = MockTransport::new();
        mock.accept_unexpected_sends(true);

        let mut session = SessionBuilder::new()
            .serial_port("/dev/ttyUSB0")
            .baud_rate(500_000)
            .growth(Growth::AutoGrow { chunk: 50 })
            .auto_configure(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        assert!(session.is_analyzer());
        assert_eq!(session.sweeps().growth(), Growth::AutoGrow { chunk: 50 });
        session.close().await;
    }
}
