//! Stream framing for the RF Explorer serial protocol.
//!
//! The device interleaves CRLF-terminated text lines (`#C2-F:...`, `#ACK`)
//! with length-prefixed binary frames (`$S`, `$s`, `$z` sweeps, `$q`/`$Q`
//! calibration dumps, `$D` screen dumps). [`FrameSplitter`] accumulates raw
//! bytes and cuts them into [`Token`]s, tolerating partial arrivals and
//! resynchronizing after corruption.
//!
//! # Frame types
//!
//! | Start          | Length                                      |
//! |----------------|---------------------------------------------|
//! | `#`            | up to CRLF                                  |
//! | `$Cc`          | `2 + byte[3] + 4`                           |
//! | `$Cb`          | `2 + (byte[4] + 1) * 16 + 10`               |
//! | `$C?` (other)  | up to CRLF                                  |
//! | `$q`           | `3 + byte[2] + 2`                           |
//! | `$Q`           | `4 + byte[2] + 256 * byte[3] + 2`           |
//! | `$D`           | `4 + 128 * 8`, discarded                    |
//! | `$S`           | `3 + byte[2] + 2`                           |
//! | `$s`           | `3 + 16 * byte[2] + 2` (0 means 256)        |
//! | `$z`           | `4 + 256 * byte[2] + byte[3] + 2`           |
//! | EEOT           | 5 byte marker, dropped                      |
//! | anything else  | up to CRLF                                  |

use std::sync::Arc;

use bytes::{Buf, BytesMut};

use rfe_core::error::Error;
use rfe_core::types::EEOT;

use crate::config::{decode_configuration, is_config_candidate, Configuration};
use crate::message::latin1_to_string;
use crate::sweep::{decode_sweep, SweepRecord};

/// Unprocessed bytes above this bound are thrown away.
pub const DEFAULT_MAX_BUFFER: usize = 66 * 1024;

/// Consecutive corrupted sweep frames tolerated before the whole buffer
/// is cleared.
pub const DEFAULT_RESYNC_LIMIT: u32 = 8;

/// Size of a `$D` screen dump.
const SCREEN_DUMP_LEN: usize = 4 + 128 * 8;

/// Sweeps with this many points or fewer are partial tracking steps.
const MIN_EMITTED_SWEEP_POINTS: usize = 5;

const CRLF: &[u8] = b"\r\n";

/// A complete unit cut from the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A configuration frame that decoded successfully.
    Configuration(Arc<Configuration>),
    /// A sweep decoded against the last known configuration.
    Sweep(SweepRecord),
    /// Any other text line, without CRLF.
    Line(String),
    /// A `$C` calibration chunk, without trailing CRLF.
    CalibrationChunk(Vec<u8>),
    /// A `$q` / `$Q` internal calibration dump, header included.
    InternalCalibration(Vec<u8>),
}

/// Framer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Frames consumed, including discarded screen dumps.
    pub frames: u64,
    /// Corrupted sweep frames skipped.
    pub resyncs: u64,
    /// Whole-buffer clears after repeated corruption.
    pub resets: u64,
    /// Whole-buffer clears after exceeding the size bound.
    pub overflows: u64,
}

/// Result of attempting to cut one frame from the front of the buffer.
#[derive(Debug)]
enum DecodeResult {
    /// A complete frame. `token` is `None` for frames that produce nothing.
    Frame {
        token: Option<Token>,
        consumed: usize,
    },
    /// Corrupted bytes to drop.
    Resync { consumed: usize },
    /// More bytes are needed.
    Incomplete,
}

/// Incremental splitter from raw bytes to [`Token`]s.
///
/// Keeps the last successfully decoded configuration, which sizes and
/// offsets subsequent sweeps.
#[derive(Debug)]
pub struct FrameSplitter {
    buf: BytesMut,
    config: Option<Arc<Configuration>>,
    capture_raw: bool,
    max_buffer: usize,
    resync_limit: u32,
    consecutive_corrupt: u32,
    last_error: Option<Error>,
    stats: FramerStats,
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_BUFFER, DEFAULT_RESYNC_LIMIT)
    }

    pub fn with_limits(max_buffer: usize, resync_limit: u32) -> Self {
        FrameSplitter {
            buf: BytesMut::with_capacity(4096),
            config: None,
            capture_raw: false,
            max_buffer,
            resync_limit: resync_limit.max(1),
            consecutive_corrupt: 0,
            last_error: None,
            stats: FramerStats::default(),
        }
    }

    /// Keep the undecoded payload on every emitted sweep.
    pub fn set_capture_raw(&mut self, capture: bool) {
        self.capture_raw = capture;
    }

    /// The configuration sweeps are currently decoded against.
    pub fn configuration(&self) -> Option<&Arc<Configuration>> {
        self.config.as_ref()
    }

    pub fn set_configuration(&mut self, config: Option<Arc<Configuration>>) {
        self.config = config;
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// The most recent corruption seen: [`Error::Frame`] for a skipped
    /// sweep frame, [`Error::Desync`] once the buffer had to be cleared.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.consecutive_corrupt = 0;
    }

    /// Append received bytes and return every frame completed by them.
    pub fn push(&mut self, data: &[u8]) -> Vec<Token> {
        self.buf.extend_from_slice(data);

        if self.buf.len() > self.max_buffer {
            tracing::warn!(
                len = self.buf.len(),
                max = self.max_buffer,
                "receive buffer overflow, resetting"
            );
            self.stats.overflows += 1;
            self.clear();
            return Vec::new();
        }

        let mut tokens = Vec::new();
        loop {
            match self.decode_next() {
                DecodeResult::Frame { token, consumed } => {
                    self.buf.advance(consumed);
                    self.stats.frames += 1;
                    if let Some(token) = token {
                        tokens.push(token);
                    }
                }
                DecodeResult::Resync { consumed } => {
                    self.buf.advance(consumed);
                }
                DecodeResult::Incomplete => break,
            }
        }
        tokens
    }

    fn decode_next(&mut self) -> DecodeResult {
        let buf = &self.buf[..];
        if buf.is_empty() {
            return DecodeResult::Incomplete;
        }

        if buf.starts_with(EEOT) {
            tracing::debug!("EEOT marker dropped");
            return DecodeResult::Resync {
                consumed: EEOT.len(),
            };
        }
        if buf.len() < EEOT.len() && EEOT.starts_with(buf) {
            return DecodeResult::Incomplete;
        }

        match buf[0] {
            b'#' => self.decode_text(),
            b'$' => self.decode_binary(),
            _ => decode_plain_line(buf),
        }
    }

    fn decode_text(&mut self) -> DecodeResult {
        let Some(end) = find_crlf(&self.buf) else {
            return DecodeResult::Incomplete;
        };
        let line = latin1_to_string(&self.buf[..end]);
        let consumed = end + CRLF.len();

        if !is_config_candidate(&line) {
            return DecodeResult::Frame {
                token: Some(Token::Line(line)),
                consumed,
            };
        }

        match decode_configuration(&line) {
            Ok(config) => {
                tracing::debug!(
                    mode = %config.mode,
                    start_mhz = config.plan.start_mhz,
                    step_mhz = config.plan.step_mhz,
                    points = config.plan.points,
                    "configuration received"
                );
                let config = Arc::new(config);
                self.config = Some(Arc::clone(&config));
                DecodeResult::Frame {
                    token: Some(Token::Configuration(config)),
                    consumed,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "configuration frame rejected");
                DecodeResult::Frame {
                    token: Some(Token::Line(line)),
                    consumed,
                }
            }
        }
    }

    fn decode_binary(&mut self) -> DecodeResult {
        let buf = &self.buf[..];
        if buf.len() < 2 {
            return DecodeResult::Incomplete;
        }

        match buf[1] {
            b'C' => decode_calibration_chunk(buf),
            b'q' | b'Q' => decode_internal_calibration(buf),
            b'D' => {
                if buf.len() < SCREEN_DUMP_LEN {
                    return DecodeResult::Incomplete;
                }
                tracing::debug!("screen dump discarded");
                DecodeResult::Frame {
                    token: None,
                    consumed: SCREEN_DUMP_LEN,
                }
            }
            b'S' | b's' | b'z' => self.decode_sweep_frame(),
            _ => decode_plain_line(buf),
        }
    }

    fn decode_sweep_frame(&mut self) -> DecodeResult {
        let buf = &self.buf[..];
        let (header, points) = match buf[1] {
            b'S' if buf.len() >= 3 => (3, buf[2] as usize),
            b's' if buf.len() >= 3 => {
                let count = if buf[2] == 0 { 256 } else { buf[2] as usize };
                (3, count * 16)
            }
            b'z' if buf.len() >= 4 => (4, buf[2] as usize * 256 + buf[3] as usize),
            _ => return DecodeResult::Incomplete,
        };

        let total = header + points + CRLF.len();
        if buf.len() < total {
            return DecodeResult::Incomplete;
        }

        if &buf[header + points..total] != CRLF {
            return self.resync_after_corruption(points);
        }

        self.consecutive_corrupt = 0;
        let payload = &buf[header..header + points];
        let token = match &self.config {
            None => {
                tracing::debug!(points, "sweep received before any configuration, dropped");
                None
            }
            Some(config) if config.plan.points != points => Some(Token::Line(format!(
                "Ignored $S of size {} expected {}",
                points, config.plan.points
            ))),
            Some(_) if points <= MIN_EMITTED_SWEEP_POINTS => {
                tracing::debug!(points, "partial tracking sweep dropped");
                None
            }
            Some(config) => match decode_sweep(payload, config, self.capture_raw) {
                Ok(record) => Some(Token::Sweep(record)),
                Err(e) => {
                    tracing::warn!(error = %e, "sweep decode failed");
                    None
                }
            },
        };

        DecodeResult::Frame {
            token,
            consumed: total,
        }
    }

    /// The declared length is buffered but the CRLF is missing: skip to the
    /// next EEOT marker, or failing that the next CRLF.
    fn resync_after_corruption(&mut self, points: usize) -> DecodeResult {
        let buf = &self.buf[..];
        let consumed = if let Some(pos) = find_subslice(buf, EEOT) {
            pos + EEOT.len()
        } else if let Some(pos) = find_crlf(buf) {
            pos + CRLF.len()
        } else {
            return DecodeResult::Incomplete;
        };

        self.stats.resyncs += 1;
        self.consecutive_corrupt += 1;
        let frame_error = Error::Frame(format!("{points}-point sweep frame without CRLF"));
        tracing::warn!(
            error = %frame_error,
            skipped = consumed,
            consecutive = self.consecutive_corrupt,
            "corrupted sweep frame, resynchronizing"
        );

        if self.consecutive_corrupt >= self.resync_limit {
            let desync = Error::Desync(format!(
                "{} corrupted sweep frames in a row",
                self.consecutive_corrupt
            ));
            tracing::warn!(error = %desync, len = buf.len(), "clearing receive buffer");
            let consumed = buf.len();
            self.stats.resets += 1;
            self.consecutive_corrupt = 0;
            self.last_error = Some(desync);
            return DecodeResult::Resync { consumed };
        }

        self.last_error = Some(frame_error);
        DecodeResult::Resync { consumed }
    }
}

fn decode_calibration_chunk(buf: &[u8]) -> DecodeResult {
    if buf.len() < 5 {
        return DecodeResult::Incomplete;
    }

    let total = match buf[2] {
        b'c' => 2 + buf[3] as usize + 4,
        b'b' => 2 + (buf[4] as usize + 1) * 16 + 10,
        _ => {
            let Some(end) = find_crlf(buf) else {
                return DecodeResult::Incomplete;
            };
            return DecodeResult::Frame {
                token: Some(Token::CalibrationChunk(buf[..end].to_vec())),
                consumed: end + CRLF.len(),
            };
        }
    };

    if buf.len() < total {
        return DecodeResult::Incomplete;
    }
    DecodeResult::Frame {
        token: Some(Token::CalibrationChunk(buf[..total - CRLF.len()].to_vec())),
        consumed: total,
    }
}

fn decode_internal_calibration(buf: &[u8]) -> DecodeResult {
    let (header, len) = match buf[1] {
        b'q' if buf.len() >= 3 => (3, buf[2] as usize),
        b'Q' if buf.len() >= 4 => (4, buf[2] as usize + 256 * buf[3] as usize),
        _ => return DecodeResult::Incomplete,
    };

    let total = header + len + CRLF.len();
    if buf.len() < total {
        return DecodeResult::Incomplete;
    }
    DecodeResult::Frame {
        token: Some(Token::InternalCalibration(buf[..header + len].to_vec())),
        consumed: total,
    }
}

fn decode_plain_line(buf: &[u8]) -> DecodeResult {
    let Some(end) = find_crlf(buf) else {
        return DecodeResult::Incomplete;
    };
    let token = (end > 0).then(|| Token::Line(latin1_to_string(&buf[..end])));
    DecodeResult::Frame {
        token,
        consumed: end + CRLF.len(),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    find_subslice(buf, CRLF)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
