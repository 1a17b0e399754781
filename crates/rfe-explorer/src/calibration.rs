//! External amplitude calibration tables.
//!
//! A calibration file corrects the analyzer reading per MHz, for example to
//! compensate a known attenuator or antenna response, and optionally lists
//! the compression point used for overload warnings:
//!
//! ```text
//! --RFEAT01
//! -- comment lines start with two dashes
//! 100   -2.5
//! 500   -3.0   -12.0
//! ```
//!
//! Positive corrections are added to a measurement (compensating loss),
//! negative ones subtracted (compensating gain).
//!
//! Signal generators carry their own factory calibration, read back with
//! `Cq` as a `$q` dump and decoded by [`GeneratorCalibration`].

use rfe_core::error::{Error, Result};
use rfe_core::types::{RFGEN_MAX_FREQ_MHZ, RFGEN_MIN_FREQ_MHZ};

use crate::commands::{PowerSetting, MAX_POWER_LEVEL};

/// File header literal.
pub const CALIBRATION_HEADER: &str = "--RFEAT01";

/// One entry per MHz from 0 to 6100 MHz.
pub const CALIBRATION_ENTRIES: usize = 6101;

/// Compression level used where the file gives none, dBm.
pub const DEFAULT_COMPRESSION_DBM: f64 = -10.0;

/// Amplitude correction used where the table has no data, dB.
pub const DEFAULT_AMPLITUDE_CORRECTION_DB: f64 = 0.0;

/// Per-MHz amplitude correction and compression data.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    id: String,
    amplitude_db: Vec<Option<f64>>,
    compression_dbm: Vec<Option<f64>>,
    has_compression: bool,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        CalibrationTable {
            id: String::new(),
            amplitude_db: vec![None; CALIBRATION_ENTRIES],
            compression_dbm: vec![None; CALIBRATION_ENTRIES],
            has_compression: false,
        }
    }
}

impl CalibrationTable {
    /// Parse the text of a calibration file.
    ///
    /// The header must be present on the first line. Blank lines and `--`
    /// comments are skipped; any other line must be `MHz amplitude
    /// [compression]`, otherwise the whole parse fails and nothing is kept.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next().map(str::trim_end) {
            Some(CALIBRATION_HEADER) => {}
            other => {
                return Err(Error::Decode(format!(
                    "calibration header {:?} not found, got {:?}",
                    CALIBRATION_HEADER,
                    other.unwrap_or("")
                )))
            }
        }

        let mut table = CalibrationTable::default();

        for (index, line) in lines.enumerate() {
            let line_no = index + 2;
            let line = line.trim();
            if line.is_empty() || line.starts_with("--") {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 {
                return Err(Error::Decode(format!(
                    "calibration line {line_no}: expected 'MHz amplitude [compression]'"
                )));
            }

            let mhz: usize = fields[0].parse().map_err(|_| {
                Error::Decode(format!(
                    "calibration line {line_no}: bad frequency {:?}",
                    fields[0]
                ))
            })?;
            if mhz >= CALIBRATION_ENTRIES {
                return Err(Error::Decode(format!(
                    "calibration line {line_no}: {mhz} MHz out of range"
                )));
            }

            let amplitude: f64 = fields[1].parse().map_err(|_| {
                Error::Decode(format!(
                    "calibration line {line_no}: bad amplitude {:?}",
                    fields[1]
                ))
            })?;
            table.amplitude_db[mhz] = Some(amplitude);

            if let Some(text) = fields.get(2) {
                let compression: f64 = text.parse().map_err(|_| {
                    Error::Decode(format!(
                        "calibration line {line_no}: bad compression {text:?}"
                    ))
                })?;
                table.compression_dbm[mhz] = Some(compression);
                table.has_compression = true;
            }
        }

        table.normalize();
        Ok(table)
    }

    /// Read and parse a calibration file; the file stem becomes the table id.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut table = Self::parse(&text)?;
        if let Some(stem) = path.file_stem() {
            table.id = stem.to_string_lossy().to_uppercase();
        }
        tracing::debug!(path = %path.display(), id = %table.id, "Loaded calibration table");
        Ok(table)
    }

    /// Fill amplitude gaps by linear interpolation between known points.
    /// Points before the first known value become 0 dB, points after the
    /// last known value repeat it. Compression gets default endpoints.
    fn normalize(&mut self) {
        let mut previous: Option<(usize, f64)> = None;
        for index in 0..self.amplitude_db.len() {
            match (self.amplitude_db[index], previous) {
                (Some(value), Some((prev_index, prev_value))) => {
                    let span = (index - prev_index) as f64;
                    for gap in prev_index + 1..index {
                        let t = (gap - prev_index) as f64 / span;
                        self.amplitude_db[gap] = Some(prev_value + (value - prev_value) * t);
                    }
                    previous = Some((index, value));
                }
                (Some(value), None) => previous = Some((index, value)),
                (None, _) => {}
            }
        }

        let first_known = self.amplitude_db.iter().position(Option::is_some);
        let last_known = self.amplitude_db.iter().rposition(Option::is_some);
        match (first_known, last_known) {
            (Some(first), Some(last)) => {
                let last_value = self.amplitude_db[last];
                for entry in &mut self.amplitude_db[..first] {
                    *entry = Some(DEFAULT_AMPLITUDE_CORRECTION_DB);
                }
                for entry in &mut self.amplitude_db[last + 1..] {
                    *entry = last_value;
                }
            }
            _ => {
                self.amplitude_db.fill(Some(DEFAULT_AMPLITUDE_CORRECTION_DB));
            }
        }

        for index in [0, CALIBRATION_ENTRIES - 1] {
            if self.compression_dbm[index].is_none() {
                self.compression_dbm[index] = Some(DEFAULT_COMPRESSION_DBM);
            }
        }
    }

    /// Name of the table, usually the file stem.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_compression_data(&self) -> bool {
        self.has_compression
    }

    /// Correction for `mhz`, dB. Out of range frequencies get no correction.
    pub fn amplitude_correction(&self, mhz: f64) -> f64 {
        index_for(mhz)
            .and_then(|i| self.amplitude_db[i])
            .unwrap_or(DEFAULT_AMPLITUDE_CORRECTION_DB)
    }

    /// Compression level for `mhz`, dBm.
    pub fn compression(&self, mhz: f64) -> f64 {
        index_for(mhz)
            .and_then(|i| self.compression_dbm[i])
            .unwrap_or(DEFAULT_COMPRESSION_DBM)
    }
}

fn index_for(mhz: f64) -> Option<usize> {
    if !(0.0..CALIBRATION_ENTRIES as f64).contains(&mhz) {
        return None;
    }
    Some(mhz as usize)
}

// ---------------------------------------------------------------------------
// Signal generator calibration
// ---------------------------------------------------------------------------

/// Minimum size of a generator calibration dump (`$q` + length + entries).
pub const GENERATOR_CALIBRATION_MIN_LEN: usize = 164;

/// Resolution of one calibration entry, dB.
const GENERATOR_ENTRY_STEP_DB: f64 = 0.1;

/// Nominal output per power level, dBm: attenuated, then high power switch.
const GENERATOR_NOMINAL_DBM: [[f64; 4]; 2] = [
    [-40.0, -37.0, -34.0, -31.0],
    [-10.0, -7.0, -4.0, -1.0],
];

/// Factory output calibration of an RFE6GEN.
///
/// Each entry is a signed byte in tenths of a dB, the deviation of the
/// real output from the nominal level. Entries are spread evenly over
/// the generator range, first entry at [`RFGEN_MIN_FREQ_MHZ`], last at
/// [`RFGEN_MAX_FREQ_MHZ`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorCalibration {
    raw: Vec<u8>,
    deltas_db: Vec<f64>,
}

impl GeneratorCalibration {
    /// Decode a `$q` dump (header included, CRLF stripped).
    pub fn parse(dump: &[u8]) -> Result<Self> {
        if !dump.starts_with(b"$q") {
            return Err(Error::Decode("generator calibration must start with $q".into()));
        }
        if dump.len() < GENERATOR_CALIBRATION_MIN_LEN {
            return Err(Error::Decode(format!(
                "generator calibration of {} bytes, need {GENERATOR_CALIBRATION_MIN_LEN}",
                dump.len()
            )));
        }

        let declared = dump[2] as usize;
        let entries = dump.get(3..3 + declared).ok_or_else(|| {
            Error::Decode(format!(
                "generator calibration declares {declared} entries, {} present",
                dump.len() - 3
            ))
        })?;
        if entries.len() < 2 {
            return Err(Error::Decode(format!(
                "generator calibration needs at least 2 entries, got {}",
                entries.len()
            )));
        }

        Ok(GeneratorCalibration {
            raw: dump.to_vec(),
            deltas_db: entries
                .iter()
                .map(|&b| b as i8 as f64 * GENERATOR_ENTRY_STEP_DB)
                .collect(),
        })
    }

    /// [`parse`](Self::parse), logging and dropping a dump that does not decode.
    pub fn from_dump(dump: &[u8]) -> Option<Self> {
        match Self::parse(dump) {
            Ok(cal) => Some(cal),
            Err(e) => {
                tracing::debug!(error = %e, len = dump.len(), "not a generator calibration");
                None
            }
        }
    }

    /// The dump as received.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn entries(&self) -> usize {
        self.deltas_db.len()
    }

    /// Output deviation at `mhz`, interpolated between neighbouring
    /// entries and clamped to the generator range.
    pub fn correction_db(&self, mhz: f64) -> f64 {
        let last = self.deltas_db.len() - 1;
        let span = RFGEN_MAX_FREQ_MHZ - RFGEN_MIN_FREQ_MHZ;
        let position = ((mhz - RFGEN_MIN_FREQ_MHZ) / span * last as f64).clamp(0.0, last as f64);
        let index = (position.floor() as usize).min(last - 1);
        let fraction = position - index as f64;
        let (low, high) = (self.deltas_db[index], self.deltas_db[index + 1]);
        low + (high - low) * fraction
    }

    /// Expected output level at `mhz` for a power setting, dBm.
    pub fn estimated_amplitude_dbm(&self, mhz: f64, power: PowerSetting) -> f64 {
        let level = power.level.min(MAX_POWER_LEVEL) as usize;
        GENERATOR_NOMINAL_DBM[usize::from(power.high_power)][level] + self.correction_db(mhz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn parse_interpolates_between_points() {
        let table = CalibrationTable::parse("--RFEAT01\n100 -2\n110 -4\n").unwrap();
        assert!(close(table.amplitude_correction(100.0), -2.0));
        assert!(close(table.amplitude_correction(105.0), -3.0));
        assert!(close(table.amplitude_correction(105.9), -3.0));
        assert!(close(table.amplitude_correction(110.0), -4.0));
    }

    #[test]
    fn leading_and_trailing_gaps() {
        let table = CalibrationTable::parse("--RFEAT01\n100 -2\n110 -4\n").unwrap();
        assert!(close(table.amplitude_correction(0.0), 0.0));
        assert!(close(table.amplitude_correction(99.0), 0.0));
        assert!(close(table.amplitude_correction(6000.0), -4.0));
    }

    #[test]
    fn comments_tabs_and_blank_lines() {
        let text = "--RFEAT01\n-- antenna\n\n  200\t\t1.5   -20\n";
        let table = CalibrationTable::parse(text).unwrap();
        assert!(close(table.amplitude_correction(200.0), 1.5));
        assert!(table.has_compression_data());
        assert!(close(table.compression(200.0), -20.0));
    }

    #[test]
    fn compression_defaults() {
        let table = CalibrationTable::parse("--RFEAT01\n200 1\n").unwrap();
        assert!(!table.has_compression_data());
        assert!(close(table.compression(0.0), DEFAULT_COMPRESSION_DBM));
        assert!(close(table.compression(6100.0), DEFAULT_COMPRESSION_DBM));
        assert!(close(table.compression(300.0), DEFAULT_COMPRESSION_DBM));
    }

    #[test]
    fn out_of_range_lookups() {
        let table = CalibrationTable::parse("--RFEAT01\n200 1\n").unwrap();
        assert!(close(table.amplitude_correction(-1.0), 0.0));
        assert!(close(table.amplitude_correction(7000.0), 0.0));
        assert!(close(table.compression(f64::NAN), DEFAULT_COMPRESSION_DBM));
    }

    #[test]
    fn missing_header_fails() {
        assert!(CalibrationTable::parse("100 -2\n").is_err());
        assert!(CalibrationTable::parse("").is_err());
    }

    #[test]
    fn malformed_line_fails_whole_parse() {
        assert!(CalibrationTable::parse("--RFEAT01\n100 -2\n110\n").is_err());
        assert!(CalibrationTable::parse("--RFEAT01\nabc -2\n").is_err());
        assert!(CalibrationTable::parse("--RFEAT01\n100 x\n").is_err());
        assert!(CalibrationTable::parse("--RFEAT01\n9000 1\n").is_err());
    }

    #[test]
    fn empty_table_is_neutral() {
        let table = CalibrationTable::parse("--RFEAT01\n").unwrap();
        assert!(close(table.amplitude_correction(433.0), 0.0));
    }

    #[test]
    fn load_uses_file_stem_as_id() {
        let path = std::env::temp_dir().join(format!("rfe-cal-{}.rfa", std::process::id()));
        std::fs::write(&path, "--RFEAT01\n100 -1\n").unwrap();
        let table = CalibrationTable::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(table.id().starts_with("RFE-CAL-"));
    }

    // =======================================================================
    // Generator calibration
    // =======================================================================

    /// `$q` dump with `entries` deltas of `delta` tenths of a dB, except
    /// the last which is `last`.
    fn generator_dump(entries: usize, delta: i8, last: i8) -> Vec<u8> {
        let mut dump = vec![b'$', b'q', entries as u8];
        dump.extend(std::iter::repeat(delta as u8).take(entries - 1));
        dump.push(last as u8);
        dump
    }

    #[test]
    fn generator_calibration_decodes_signed_tenths() {
        let cal = GeneratorCalibration::parse(&generator_dump(161, -15, 20)).unwrap();
        assert_eq!(cal.entries(), 161);
        assert_eq!(cal.raw().len(), 164);
        assert!(close(cal.correction_db(RFGEN_MIN_FREQ_MHZ), -1.5));
        assert!(close(cal.correction_db(RFGEN_MAX_FREQ_MHZ), 2.0));
        // Outside the range the end entries apply.
        assert!(close(cal.correction_db(1.0), -1.5));
        assert!(close(cal.correction_db(7000.0), 2.0));
    }

    #[test]
    fn generator_calibration_interpolates() {
        let cal = GeneratorCalibration::parse(&generator_dump(161, 0, 10)).unwrap();
        let step = (RFGEN_MAX_FREQ_MHZ - RFGEN_MIN_FREQ_MHZ) / 160.0;
        let halfway = RFGEN_MAX_FREQ_MHZ - step / 2.0;
        assert!(close(cal.correction_db(halfway), 0.5));
    }

    #[test]
    fn generator_estimated_amplitude() {
        let cal = GeneratorCalibration::parse(&generator_dump(161, -15, -15)).unwrap();
        let high = PowerSetting::new(true, 3);
        let low = PowerSetting::new(false, 0);
        assert!(close(cal.estimated_amplitude_dbm(1000.0, high), -2.5));
        assert!(close(cal.estimated_amplitude_dbm(1000.0, low), -41.5));
        // Levels above the last one use the last one.
        assert!(close(
            cal.estimated_amplitude_dbm(1000.0, PowerSetting::new(true, 9)),
            -2.5
        ));
    }

    #[test]
    fn generator_calibration_rejects_bad_dumps() {
        assert!(GeneratorCalibration::parse(b"$q\x02\x01\x02").is_err());
        assert!(GeneratorCalibration::parse(&[b'$'; 200]).is_err());
        // Declares more entries than were received.
        let mut short = generator_dump(161, 0, 0);
        short[2] = 250;
        assert!(matches!(
            GeneratorCalibration::parse(&short),
            Err(Error::Decode(_))
        ));
        assert!(GeneratorCalibration::from_dump(&short).is_none());
    }
}
