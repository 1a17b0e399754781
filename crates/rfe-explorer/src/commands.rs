//! Outgoing command builders.
//!
//! Every command is an ASCII payload wrapped as `'#' + length + payload`,
//! where the length byte counts the two framing bytes too. The builders
//! here are pure: they produce the framed bytes and leave sending to the
//! session.
//!
//! # Command reference
//!
//! | Payload                                   | Effect                          |
//! |-------------------------------------------|---------------------------------|
//! | `C0`                                      | request configuration           |
//! | `CH`                                      | hold (stop sweeping)            |
//! | `C+\x00` / `C+\x04`                       | realtime / max-hold calculator  |
//! | `Cr`                                      | reset internal buffers          |
//! | `Cq`                                      | request internal calibration    |
//! | `CJ` + points/16                          | sweep data points               |
//! | `L1` / `L0`                               | screen on / off                 |
//! | `D0`                                      | disable screen dump             |
//! | `CP1` / `CP0`                             | generator RF power on / off     |
//! | `C2-F:SSSSSSS,EEEEEEE,TTTT,BBBB[,NNNNN]`  | analyzer frequency/amplitude    |
//! | `C3-F:CCCCCCC,H,L`                        | generator CW                    |
//! | `C3-F:` / `C3-T:` + sweep fields          | generator frequency sweep       |
//! | `C3-A:` + sweep fields                    | generator amplitude sweep       |
//! | `a` + digit                               | input stage                     |

use rfe_core::error::{Error, Result};
use rfe_core::types::{InputStage, MAX_SPECTRUM_STEPS, MIN_SWEEP_POINTS};

/// Start byte of every outgoing command.
pub const COMMAND_START: u8 = b'#';

/// Longest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 2;

/// Sweep point count limits accepted by `CJ`.
pub const MIN_DATA_POINTS: u16 = 16;
pub const MAX_DATA_POINTS: u16 = 4096;

/// RBW range (kHz) for which a step count is derived.
const RBW_REQUEST_RANGE_KHZ: (f64, f64) = (3.0, 670.0);
/// RBW range (kHz) the firmware accepts once the step count is rounded.
const RBW_ACCEPT_RANGE_KHZ: (f64, f64) = (3.0, 620.0);

/// Highest generator power level digit.
pub const MAX_POWER_LEVEL: u8 = 3;

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Frame a payload as `'#' + (len + 2) + payload`.
pub fn encode_command(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::InvalidParameter(format!(
            "command payload of {} bytes cannot be framed",
            payload.len()
        )));
    }
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(COMMAND_START);
    out.push((payload.len() + 2) as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Fixed commands
// ---------------------------------------------------------------------------

/// Ask the device to report its configuration and start streaming (`C0`).
pub fn cmd_request_config() -> Result<Vec<u8>> {
    encode_command(b"C0")
}

/// Stop sweeping (`CH`).
pub fn cmd_hold() -> Result<Vec<u8>> {
    encode_command(b"CH")
}

/// Switch the analyzer calculator to realtime (`C+\x00`).
pub fn cmd_realtime() -> Result<Vec<u8>> {
    encode_command(b"C+\x00")
}

/// Switch the analyzer calculator to max hold (`C+\x04`).
pub fn cmd_max_hold() -> Result<Vec<u8>> {
    encode_command(b"C+\x04")
}

/// Reset the device's internal sweep buffers (`Cr`).
pub fn cmd_reset_buffers() -> Result<Vec<u8>> {
    encode_command(b"Cr")
}

/// Request the internal calibration dump (`Cq`).
pub fn cmd_request_calibration() -> Result<Vec<u8>> {
    encode_command(b"Cq")
}

/// Turn the device screen on (`L1`) or off (`L0`).
pub fn cmd_screen(on: bool) -> Result<Vec<u8>> {
    if on {
        encode_command(b"L1")
    } else {
        encode_command(b"L0")
    }
}

/// Stop `$D` screen dumps (`D0`).
pub fn cmd_disable_screen_dump() -> Result<Vec<u8>> {
    encode_command(b"D0")
}

/// Generator RF output on (`CP1`) or off (`CP0`).
pub fn cmd_rf_power(on: bool) -> Result<Vec<u8>> {
    if on {
        encode_command(b"CP1")
    } else {
        encode_command(b"CP0")
    }
}

/// Select the RF input stage (`a` + digit).
pub fn cmd_input_stage(stage: InputStage) -> Result<Vec<u8>> {
    encode_command(&[b'a', b'0' + stage.code()])
}

/// Set the analyzer sweep point count (`CJ` + points/16).
///
/// The count must be within 16..=4096; it is truncated to a multiple of 16.
pub fn cmd_sweep_points(points: u16) -> Result<Vec<u8>> {
    if !(MIN_DATA_POINTS..=MAX_DATA_POINTS).contains(&points) {
        return Err(Error::InvalidParameter(format!(
            "sweep points {points} outside {MIN_DATA_POINTS}..={MAX_DATA_POINTS}"
        )));
    }
    // 4096 / 16 = 256 does not fit a byte; the firmware reads it as 0.
    let code = ((points / 16) & 0xFF) as u8;
    encode_command(&[b'C', b'J', code])
}

// ---------------------------------------------------------------------------
// Analyzer configuration
// ---------------------------------------------------------------------------

/// Reconfigure the analyzer span and amplitude window.
///
/// `rbw_khz` requests a resolution bandwidth: when it lies in 3..=670 kHz a
/// step count is derived from it (clamped to 112..=65535) and appended,
/// provided the RBW that step count really yields is within 3..=620 kHz.
/// Otherwise the request is ignored and the device keeps its own RBW.
pub fn cmd_analyzer_config(
    start_mhz: f64,
    end_mhz: f64,
    top_dbm: f64,
    bottom_dbm: f64,
    rbw_khz: Option<f64>,
) -> Result<Vec<u8>> {
    if !(start_mhz >= 0.0 && end_mhz > start_mhz) {
        return Err(Error::InvalidParameter(format!(
            "frequency range {start_mhz}..{end_mhz} MHz"
        )));
    }
    if bottom_dbm >= top_dbm {
        return Err(Error::InvalidParameter(format!(
            "amplitude range {bottom_dbm}..{top_dbm} dBm"
        )));
    }

    let mut payload = format!(
        "C2-F:{:07},{:07},{},{}",
        mhz_to_khz(start_mhz),
        mhz_to_khz(end_mhz),
        amplitude_field(top_dbm),
        amplitude_field(bottom_dbm)
    );

    if let Some(rbw) = rbw_khz {
        match steps_for_rbw(start_mhz, end_mhz, rbw) {
            Some(steps) => payload.push_str(&format!(",{steps:05}")),
            None => tracing::warn!(rbw_khz = rbw, "Ignored RBW request"),
        }
    }

    encode_command(payload.as_bytes())
}

/// Step count giving `rbw_khz` over the span, if the firmware accepts it.
pub fn steps_for_rbw(start_mhz: f64, end_mhz: f64, rbw_khz: f64) -> Option<u32> {
    let (lo, hi) = RBW_REQUEST_RANGE_KHZ;
    if !(lo..=hi).contains(&rbw_khz) {
        return None;
    }
    let span_khz = (end_mhz - start_mhz) * 1000.0;
    let steps = ((span_khz / rbw_khz).round() as u32)
        .clamp(MIN_SWEEP_POINTS as u32, MAX_SPECTRUM_STEPS as u32);
    let actual = span_khz.round() / steps as f64;
    let (lo, hi) = RBW_ACCEPT_RANGE_KHZ;
    (lo..=hi).contains(&actual).then_some(steps)
}

/// Amplitudes are four characters, sign included: `-030`, `0005`.
fn amplitude_field(dbm: f64) -> String {
    format!("{:04}", dbm.trunc() as i64)
}

fn mhz_to_khz(mhz: f64) -> u64 {
    (mhz * 1000.0).round() as u64
}

// ---------------------------------------------------------------------------
// Signal generator
// ---------------------------------------------------------------------------

/// Output power selection: the high power switch plus a level digit 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerSetting {
    pub high_power: bool,
    pub level: u8,
}

impl PowerSetting {
    pub fn new(high_power: bool, level: u8) -> Self {
        PowerSetting { high_power, level }
    }

    fn validate(&self) -> Result<()> {
        if self.level > MAX_POWER_LEVEL {
            return Err(Error::InvalidParameter(format!(
                "power level {} above {MAX_POWER_LEVEL}",
                self.level
            )));
        }
        Ok(())
    }

    /// `H,L` as sent on the wire.
    fn field(&self) -> String {
        format!("{},{}", u8::from(self.high_power), self.level)
    }
}

/// Start a CW carrier (`C3-F:CCCCCCC,H,L`).
pub fn cmd_generator_cw(cw_mhz: f64, power: PowerSetting) -> Result<Vec<u8>> {
    power.validate()?;
    check_generator_freq(cw_mhz)?;
    encode_command(format!("C3-F:{:07},{}", mhz_to_khz(cw_mhz), power.field()).as_bytes())
}

/// Parameters of a generator frequency sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySweep {
    pub start_mhz: f64,
    pub stop_mhz: f64,
    pub steps: u16,
    pub power: PowerSetting,
    pub step_wait_ms: u32,
}

impl FrequencySweep {
    /// Frequency increment between steps.
    pub fn step_mhz(&self) -> f64 {
        if self.steps == 0 {
            return 0.0;
        }
        (self.stop_mhz - self.start_mhz) / self.steps as f64
    }
}

/// Start a frequency sweep (`C3-F:`), or a tracking sweep (`C3-T:`) used for
/// scalar network analysis.
///
/// Layout: `SSSSSSS,H,L,NNNN,PPPPPPP,WWWWWWW`.
pub fn cmd_generator_sweep_freq(sweep: &FrequencySweep, tracking: bool) -> Result<Vec<u8>> {
    sweep.power.validate()?;
    check_generator_freq(sweep.start_mhz)?;
    if sweep.steps == 0 || sweep.steps > 9999 {
        return Err(Error::InvalidParameter(format!(
            "sweep steps {} outside 1..=9999",
            sweep.steps
        )));
    }
    let step = sweep.step_mhz();
    if step < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "sweep stop {} MHz below start {} MHz",
            sweep.stop_mhz, sweep.start_mhz
        )));
    }

    let payload = format!(
        "C3-{}:{:07},{},{:04},{:07},{:07}",
        if tracking { 'T' } else { 'F' },
        mhz_to_khz(sweep.start_mhz),
        sweep.power.field(),
        sweep.steps,
        mhz_to_khz(step),
        sweep.step_wait_ms
    );
    encode_command(payload.as_bytes())
}

/// Parameters of a generator amplitude sweep at a fixed frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeSweep {
    pub cw_mhz: f64,
    pub start: PowerSetting,
    pub stop: PowerSetting,
    pub steps: u16,
    pub step_wait_ms: u32,
}

/// Start an amplitude sweep (`C3-A:CCCCCCC,H,L,NNNN,H,L,WWWWW`).
pub fn cmd_generator_sweep_amp(sweep: &AmplitudeSweep) -> Result<Vec<u8>> {
    sweep.start.validate()?;
    sweep.stop.validate()?;
    check_generator_freq(sweep.cw_mhz)?;
    if sweep.steps > 9999 {
        return Err(Error::InvalidParameter(format!(
            "sweep steps {} above 9999",
            sweep.steps
        )));
    }
    if sweep.step_wait_ms > 99_999 {
        return Err(Error::InvalidParameter(format!(
            "step wait {} ms above 99999",
            sweep.step_wait_ms
        )));
    }

    let payload = format!(
        "C3-A:{:07},{},{:04},{},{:05}",
        mhz_to_khz(sweep.cw_mhz),
        sweep.start.field(),
        sweep.steps,
        sweep.stop.field(),
        sweep.step_wait_ms
    );
    encode_command(payload.as_bytes())
}

fn check_generator_freq(mhz: f64) -> Result<()> {
    if !(mhz > 0.0 && mhz < 10_000.0) {
        return Err(Error::InvalidParameter(format!(
            "generator frequency {mhz} MHz"
        )));
    }
    Ok(())
}
