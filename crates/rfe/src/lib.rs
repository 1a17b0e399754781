//! # rfe -- async client for RF Explorer instruments
//!
//! `rfe` talks to RF Explorer handheld spectrum analyzers and signal
//! generators over their USB serial port. It decodes the device's mixed
//! text/binary stream into configurations, sweeps and status messages, and
//! sends the command set that reconfigures the instrument.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rfe::SessionBuilder;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> rfe::Result<()> {
//!     let mut session = SessionBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     let model = session.wait_for_model(Duration::from_secs(3)).await?;
//!     println!("connected to {model}, firmware {}", session.firmware());
//!
//!     session.wait_received(Duration::from_secs(2)).await?;
//!     if let Some((mhz, dbm)) = session.peak() {
//!         println!("peak {mhz:.3} MHz at {dbm:.1} dBm");
//!     }
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate              | Purpose                                          |
//! |--------------------|--------------------------------------------------|
//! | `rfe-core`         | `Transport` trait, device enums, errors, events  |
//! | `rfe-transport`    | Serial transport over `tokio-serial`             |
//! | `rfe-explorer`     | Framer, decoders, IO task, commands, session     |
//! | **`rfe`**          | This facade crate -- re-exports everything       |
//!
//! ## Event Subscription
//!
//! Acknowledgements, firmware resets and a full sweep buffer are reported
//! once through a broadcast channel:
//!
//! ```no_run
//! use rfe::{DeviceEvent, DeviceSession, ProcessMode};
//! # async fn example(session: &mut DeviceSession) -> rfe::Result<()> {
//! let mut events = session.subscribe();
//! session.process_received(ProcessMode::All).await?;
//! while let Ok(event) = events.try_recv() {
//!     if event == DeviceEvent::ResetDetected {
//!         session.request_config().await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use rfe_core::*;
pub use rfe_explorer::*;

/// The serial transport.
pub mod serial {
    pub use rfe_transport::*;
}
