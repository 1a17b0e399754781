//! Error types for rfe.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, framing and decode
//! failures, resynchronization and buffer capacity are all captured here.

/// The error type for all rfe operations.
///
/// Variants follow the layers a byte travels through: the physical
/// transport, the stream framer, the message decoders and finally the
/// session that owns device state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port missing, open failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected reply, rejected command).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A malformed or undersized frame.
    #[error("frame error: {0}")]
    Frame(String),

    /// A frame with a recognized prefix whose body could not be parsed.
    ///
    /// The previously held configuration is never modified when this
    /// error is produced.
    #[error("decode error: {0}")]
    Decode(String),

    /// The stream lost framing and had to be resynchronized.
    #[error("protocol desync: {0}")]
    Desync(String),

    /// A bounded container reached its hard capacity.
    #[error("capacity of {0} elements reached")]
    Capacity(usize),

    /// Timed out waiting for the device or for the IO task.
    #[error("timeout waiting for response")]
    Timeout,

    /// The requested operation is not supported by the connected device.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to a device command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the device has been established, or it was closed.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_frame() {
        let e = Error::Frame("short $S payload".into());
        assert_eq!(e.to_string(), "frame error: short $S payload");
    }

    #[test]
    fn error_display_decode() {
        let e = Error::Decode("bad start frequency".into());
        assert_eq!(e.to_string(), "decode error: bad start frequency");
    }

    #[test]
    fn error_display_desync() {
        let e = Error::Desync("missing CRLF".into());
        assert_eq!(e.to_string(), "protocol desync: missing CRLF");
    }

    #[test]
    fn error_display_capacity() {
        let e = Error::Capacity(1000);
        assert_eq!(e.to_string(), "capacity of 1000 elements reached");
    }

    #[test]
    fn error_display_simple_variants() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("generator command on analyzer".into());
        assert_eq!(
            e.to_string(),
            "unsupported operation: generator command on analyzer"
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
