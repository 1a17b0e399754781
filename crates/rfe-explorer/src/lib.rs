//! RF Explorer protocol engine and device session.
//!
//! The device talks over a serial link with a mix of CRLF-terminated text
//! lines and length-prefixed binary frames. This crate splits that stream,
//! decodes every frame into typed values, and keeps the per-device state a
//! client needs.
//!
//! # Architecture
//!
//! - [`framer`] -- splits the byte stream into [`Token`]s
//! - [`config`] / [`message`] / [`sweep`] -- frame decoders
//! - [`io`] -- the IO task that owns the transport
//! - [`commands`] -- outgoing command framing and builders
//! - [`sweep_buffer`] -- sweep storage with max-hold, average and median
//! - [`calibration`] -- amplitude calibration tables and generator calibration
//! - [`session`] / [`builder`] -- the caller-facing [`DeviceSession`]

pub mod builder;
pub mod calibration;
pub mod commands;
pub mod config;
pub mod cursor;
pub mod framer;
pub mod io;
pub mod message;
pub mod session;
pub mod sweep;
pub mod sweep_buffer;

pub use builder::SessionBuilder;
pub use calibration::{CalibrationTable, GeneratorCalibration};
pub use commands::{AmplitudeSweep, FrequencySweep, PowerSetting};
pub use config::{Configuration, FrequencyPlan};
pub use framer::{FrameSplitter, Token};
pub use message::Message;
pub use session::{
    AnalyzerState, DeviceSession, GeneratorState, ProcessMode, SessionConfig, SessionState,
    SnifferState,
};
pub use sweep::SweepRecord;
pub use sweep_buffer::{Growth, SweepBuffer};
