//! Sweep records and sweep payload decoding.
//!
//! A sweep payload carries one byte per point; the amplitude of point `i`
//! is `-byte[i] / 2 + offset_db` dBm, where the offset comes from the
//! analyzer configuration in force when the sweep arrived.

use chrono::{DateTime, Local};

use rfe_core::error::{Error, Result};
use rfe_core::helpers::{dbm_to_mw, mw_to_dbm};
use rfe_core::types::{MAX_AMPLITUDE_DBM, MIN_AMPLITUDE_DBM};

use crate::calibration::CalibrationTable;
use crate::config::{Configuration, FrequencyPlan, PLAN_TOLERANCE_MHZ};

/// One sweep: amplitudes in dBm at `start + i * step` MHz.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRecord {
    start_mhz: f64,
    step_mhz: f64,
    amplitudes: Vec<f64>,
    captured_at: DateTime<Local>,
    raw: Option<Vec<u8>>,
}

impl SweepRecord {
    /// A record with every point at [`MIN_AMPLITUDE_DBM`].
    pub fn new(start_mhz: f64, step_mhz: f64, points: usize) -> Self {
        Self::from_amplitudes(start_mhz, step_mhz, vec![MIN_AMPLITUDE_DBM; points])
    }

    pub fn from_amplitudes(start_mhz: f64, step_mhz: f64, amplitudes: Vec<f64>) -> Self {
        SweepRecord {
            start_mhz,
            step_mhz,
            amplitudes,
            captured_at: Local::now(),
            raw: None,
        }
    }

    pub fn start_mhz(&self) -> f64 {
        self.start_mhz
    }

    pub fn step_mhz(&self) -> f64 {
        self.step_mhz
    }

    /// Frequency of the last point.
    pub fn end_mhz(&self) -> f64 {
        self.frequency_mhz(self.points().saturating_sub(1))
    }

    pub fn points(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn plan(&self) -> FrequencyPlan {
        FrequencyPlan {
            start_mhz: self.start_mhz,
            step_mhz: self.step_mhz,
            points: self.points(),
        }
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn set_captured_at(&mut self, at: DateTime<Local>) {
        self.captured_at = at;
    }

    /// Undecoded payload bytes, when raw capture was requested.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Amplitude at `index`, or [`MIN_AMPLITUDE_DBM`] when out of range.
    pub fn amplitude(&self, index: usize) -> f64 {
        self.amplitudes
            .get(index)
            .copied()
            .unwrap_or(MIN_AMPLITUDE_DBM)
    }

    /// Amplitude at `index` with the calibration correction for its
    /// frequency applied.
    pub fn corrected_amplitude(&self, index: usize, table: &CalibrationTable) -> f64 {
        if index >= self.points() {
            return MIN_AMPLITUDE_DBM;
        }
        self.amplitudes[index] + table.amplitude_correction(self.frequency_mhz(index).trunc())
    }

    /// Set the amplitude at `index`; out of range indices are ignored.
    pub fn set_amplitude(&mut self, index: usize, dbm: f64) {
        if let Some(slot) = self.amplitudes.get_mut(index) {
            *slot = dbm;
        }
    }

    /// Frequency at `index`, or `0.0` when out of range.
    pub fn frequency_mhz(&self, index: usize) -> f64 {
        if index < self.points() {
            self.start_mhz + self.step_mhz * index as f64
        } else {
            0.0
        }
    }

    /// Distance between the first and last point.
    pub fn span_mhz(&self) -> f64 {
        self.step_mhz * self.points().saturating_sub(1) as f64
    }

    /// Index of the highest amplitude (first one on ties).
    pub fn peak_index(&self) -> usize {
        let mut best = 0;
        let mut peak = MIN_AMPLITUDE_DBM;
        for (i, &value) in self.amplitudes.iter().enumerate() {
            if value > peak {
                peak = value;
                best = i;
            }
        }
        best
    }

    /// Index of the lowest amplitude (first one on ties).
    pub fn min_index(&self) -> usize {
        let mut best = 0;
        let mut low = MAX_AMPLITUDE_DBM;
        for (i, &value) in self.amplitudes.iter().enumerate() {
            if value < low {
                low = value;
                best = i;
            }
        }
        best
    }

    /// Total power across the sweep, dBm. Sums in the linear domain.
    pub fn channel_power_dbm(&self) -> f64 {
        let total: f64 = self.amplitudes.iter().map(|&a| dbm_to_mw(a)).sum();
        if total > 0.0 {
            mw_to_dbm(total)
        } else {
            MIN_AMPLITUDE_DBM
        }
    }

    /// Same start and step (within 1 kHz) and the same point count.
    pub fn is_same_configuration(&self, other: &SweepRecord) -> bool {
        (self.start_mhz - other.start_mhz).abs() < PLAN_TOLERANCE_MHZ
            && (self.step_mhz - other.step_mhz).abs() < PLAN_TOLERANCE_MHZ
            && self.points() == other.points()
    }

    /// Human readable dump: a header line, then sixteen values per line.
    pub fn dump(&self) -> String {
        let mut out = format!(
            "Sweep data: {:.3} MHz {:.3} MHz - Steps: {}",
            self.start_mhz,
            self.step_mhz,
            self.points().saturating_sub(1)
        );
        for (i, value) in self.amplitudes.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if i % 16 == 0 {
                out.push('\n');
            }
            out.push_str(&format!("{value:04.1}"));
        }
        out
    }
}

/// Decode a sweep payload (the bytes between header and CRLF) against the
/// configuration in force.
///
/// The payload length must match the configured point count exactly.
pub fn decode_sweep(
    payload: &[u8],
    config: &Configuration,
    capture_raw: bool,
) -> Result<SweepRecord> {
    if payload.len() != config.plan.points {
        return Err(Error::Decode(format!(
            "sweep has {} points, configuration expects {}",
            payload.len(),
            config.plan.points
        )));
    }

    let offset = config.offset_db();
    let amplitudes = payload
        .iter()
        .map(|&b| -(b as f64) / 2.0 + offset)
        .collect();

    let mut record =
        SweepRecord::from_amplitudes(config.plan.start_mhz, config.plan.step_mhz, amplitudes);
    if capture_raw {
        record.raw = Some(payload.to_vec());
    }
    Ok(record)
}
