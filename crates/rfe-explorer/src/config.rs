//! Configuration frame decoding.
//!
//! The device announces its state with `#C2-F:` (analyzer), `#C3-*` (signal
//! generator), `#C4-F:` (sniffer) and `#C5-*` (expansion-board generator)
//! text frames. Each successful decode produces a fresh, immutable
//! [`Configuration`]; fields not carried by the frame keep their defaults.
//!
//! # Analyzer frame layout
//!
//! ```text
//! #C2-F:SSSSSSS,PPPPPPP,TTTT,BBBB,NNNN,E,MMM,LLLLLLL,HHHHHHH,WWWWWWW[,RRRRR[,OOOO[,CCC]]]
//!       start   step    top  bot  pts  exp mode min  max     span    rbw   offs calc
//!       kHz     Hz      dBm  dBm                kHz  kHz     kHz     kHz   dB
//! ```
//!
//! `#C2-f:` carries a five digit point count (`NNNNN`); every later field
//! shifts right by one.

use rfe_core::error::{Error, Result};
use rfe_core::types::{Calculator, Mode, Modulation, FCY_CLOCK};

use crate::cursor::FieldCursor;

/// Offset of the first field after any `#Cx-y:` prefix.
const BODY_OFFSET: usize = 6;

const ANALYZER_MIN_LEN: usize = 60;
const GENERATOR_MIN_LEN: usize = 29;
const SNIFFER_MIN_LEN: usize = 10;

/// Frequency plans closer than this are considered identical, MHz.
pub const PLAN_TOLERANCE_MHZ: f64 = 0.001;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Start, step and point count of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrequencyPlan {
    pub start_mhz: f64,
    pub step_mhz: f64,
    pub points: usize,
}

impl FrequencyPlan {
    /// Frequency of the last point.
    pub fn end_mhz(&self) -> f64 {
        self.start_mhz + self.step_mhz * self.points.saturating_sub(1) as f64
    }

    /// Whether start or step moved by at least [`PLAN_TOLERANCE_MHZ`].
    pub fn differs_from(&self, other: &FrequencyPlan) -> bool {
        (self.start_mhz - other.start_mhz).abs() >= PLAN_TOLERANCE_MHZ
            || (self.step_mhz - other.step_mhz).abs() >= PLAN_TOLERANCE_MHZ
    }
}

/// Which frame produced a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Analyzer,
    Sniffer,
    Generator(GeneratorFrame),
}

/// The generator frame variants (`#C3-*`, `#C3-A`, `#C3-F`, `#C3-G`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorFrame {
    /// Complete generator status, mode not implied.
    Full,
    SweepAmplitude,
    SweepFrequency,
    Cw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    pub top_dbm: f64,
    pub bottom_dbm: f64,
    pub min_freq_mhz: f64,
    pub max_freq_mhz: f64,
    pub max_span_mhz: f64,
    /// Resolution bandwidth, kHz. Zero on firmware that does not report it.
    pub rbw_khz: f64,
    /// Amplitude offset applied to every sweep point, dB.
    pub offset_db: f64,
    pub calculator: Calculator,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        AnalyzerSettings {
            top_dbm: 0.0,
            bottom_dbm: 0.0,
            min_freq_mhz: 0.0,
            max_freq_mhz: 0.0,
            max_span_mhz: 0.0,
            rbw_khz: 0.0,
            offset_db: 0.0,
            calculator: Calculator::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnifferSettings {
    pub baud_rate: u32,
    pub modulation: Modulation,
    pub rbw_khz: f64,
    pub threshold_dbm: f64,
}

impl Default for SnifferSettings {
    fn default() -> Self {
        SnifferSettings {
            baud_rate: 0,
            modulation: Modulation::None,
            rbw_khz: 0.0,
            threshold_dbm: 0.0,
        }
    }
}

/// Signal generator output settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub cw_mhz: f64,
    pub high_power: bool,
    pub power_level: u8,
    pub start_high_power: bool,
    pub start_power_level: u8,
    pub stop_high_power: bool,
    pub stop_power_level: u8,
    pub sweep_power_steps: u16,
    pub step_wait_ms: u32,
    pub rf_power_on: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            cw_mhz: 0.0,
            high_power: false,
            power_level: 0,
            start_high_power: false,
            start_power_level: 0,
            stop_high_power: false,
            stop_power_level: 1,
            sweep_power_steps: 0,
            step_wait_ms: 0,
            rf_power_on: false,
        }
    }
}

/// An immutable snapshot of the device configuration.
///
/// Only the settings group matching [`source`](Self::source) carries data
/// from the frame; the others hold defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub mode: Mode,
    pub source: ConfigSource,
    pub plan: FrequencyPlan,
    pub expansion_active: bool,
    pub analyzer: AnalyzerSettings,
    pub sniffer: SnifferSettings,
    pub generator: GeneratorSettings,
    /// The frame exactly as received, without CRLF.
    pub raw: String,
}

impl Configuration {
    fn empty(source: ConfigSource, raw: &str) -> Self {
        Configuration {
            mode: Mode::None,
            source,
            plan: FrequencyPlan::default(),
            expansion_active: false,
            analyzer: AnalyzerSettings::default(),
            sniffer: SnifferSettings::default(),
            generator: GeneratorSettings::default(),
            raw: raw.to_string(),
        }
    }

    /// Amplitude offset applied when decoding sweeps.
    pub fn offset_db(&self) -> f64 {
        self.analyzer.offset_db
    }

    pub fn is_generator(&self) -> bool {
        matches!(self.source, ConfigSource::Generator(_))
    }
}

// ---------------------------------------------------------------------------
// Prefix classification
// ---------------------------------------------------------------------------

/// Whether a text line looks like a configuration frame.
///
/// Model lines (`#C2-M:`, `#C3-M:`, `#C5-M:`) share the prefix family but
/// are not configurations.
pub fn is_config_candidate(line: &str) -> bool {
    if line.len() <= 5 {
        return false;
    }
    line.starts_with("#C2-F:")
        || line.starts_with("#C2-f:")
        || line.starts_with("#C4-F:")
        || ((line.starts_with("#C3-") || line.starts_with("#C5-"))
            && line.as_bytes()[4] != b'M')
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a configuration frame (without CRLF).
///
/// Unknown mode, calculator or modulation numbers decode to their
/// `Unknown` variants; a truncated or non-numeric field fails the whole
/// frame with [`Error::Decode`].
pub fn decode_configuration(line: &str) -> Result<Configuration> {
    if line.starts_with("#C2-F") || line.starts_with("#C2-f") {
        decode_analyzer(line)
    } else if line.starts_with("#C3-") {
        decode_generator(line, false)
    } else if line.starts_with("#C5-") {
        decode_generator(line, true)
    } else if line.starts_with("#C4-F:") {
        decode_sniffer(line)
    } else {
        Err(Error::Decode(format!(
            "not a configuration frame: {:?}",
            line.get(..6).unwrap_or(line)
        )))
    }
}

fn too_short(kind: &str, line: &str, min: usize) -> Error {
    Error::Decode(format!(
        "{kind} frame too short: {} bytes, need {min}",
        line.len()
    ))
}

fn decode_analyzer(line: &str) -> Result<Configuration> {
    if line.len() < ANALYZER_MIN_LEN {
        return Err(too_short("analyzer", line, ANALYZER_MIN_LEN));
    }

    let mut c = FieldCursor::new(line, BODY_OFFSET);
    let long = line.as_bytes()[4] == b'f' || c.byte_at(36) != Some(b',');
    let mut cfg = Configuration::empty(ConfigSource::Analyzer, line);

    cfg.plan.start_mhz = c.uint("start", 7)? as f64 / 1000.0;
    c.sep()?;
    cfg.plan.step_mhz = c.uint("step", 7)? as f64 / 1_000_000.0;
    c.sep()?;
    cfg.analyzer.top_dbm = c.int("top", 4)? as f64;
    c.sep()?;
    cfg.analyzer.bottom_dbm = c.int("bottom", 4)? as f64;
    c.sep()?;
    cfg.plan.points = c.uint("points", if long { 5 } else { 4 })? as usize;
    c.sep()?;
    cfg.expansion_active = c.flag("expansion")?;
    c.sep()?;
    cfg.mode = Mode::from_code(c.uint("mode", 3)? as u16);
    c.sep()?;
    cfg.analyzer.min_freq_mhz = c.uint("min", 7)? as f64 / 1000.0;
    c.sep()?;
    cfg.analyzer.max_freq_mhz = c.uint("max", 7)? as f64 / 1000.0;
    c.sep()?;
    cfg.analyzer.max_span_mhz = c.uint("span", 7)? as f64 / 1000.0;

    if let Some(rbw) = c.optional_int("rbw", 5)? {
        cfg.analyzer.rbw_khz = rbw as f64;
    }
    if let Some(offset) = c.optional_int("offset", 4)? {
        cfg.analyzer.offset_db = offset as f64;
    }
    if let Some(calc) = c.optional_int("calculator", 3)? {
        cfg.analyzer.calculator = Calculator::from_code(calc.clamp(0, u16::MAX as i64) as u16);
    }

    Ok(cfg)
}

fn decode_generator(line: &str, expansion: bool) -> Result<Configuration> {
    if line.len() < GENERATOR_MIN_LEN {
        return Err(too_short("generator", line, GENERATOR_MIN_LEN));
    }

    let variant = match line.as_bytes()[4] {
        b'*' => GeneratorFrame::Full,
        b'A' => GeneratorFrame::SweepAmplitude,
        b'F' => GeneratorFrame::SweepFrequency,
        b'G' => GeneratorFrame::Cw,
        other => {
            return Err(Error::Decode(format!(
                "unknown generator frame variant {:?}",
                other as char
            )))
        }
    };

    let mut cfg = Configuration::empty(ConfigSource::Generator(variant), line);
    cfg.expansion_active = expansion;
    let g = &mut cfg.generator;
    let mut c = FieldCursor::new(line, BODY_OFFSET);

    match variant {
        GeneratorFrame::Full => {
            cfg.plan.start_mhz = c.uint("start", 7)? as f64 / 1000.0;
            c.sep()?;
            g.cw_mhz = c.uint("cw", 7)? as f64 / 1000.0;
            c.sep()?;
            cfg.plan.points = c.uint("steps", 4)? as usize;
            c.sep()?;
            cfg.plan.step_mhz = c.uint("step", 7)? as f64 / 1000.0;
            c.sep()?;
            g.high_power = c.flag("high power")?;
            c.sep()?;
            g.power_level = c.digit("power level")?;
            c.sep()?;
            g.sweep_power_steps = c.uint("power steps", 4)? as u16;
            c.sep()?;
            g.start_high_power = c.flag("start high power")?;
            c.sep()?;
            g.start_power_level = c.digit("start power level")?;
            c.sep()?;
            g.stop_high_power = c.flag("stop high power")?;
            c.sep()?;
            g.stop_power_level = c.digit("stop power level")?;
            c.sep()?;
            g.rf_power_on = c.flag("rf power")?;
            c.sep()?;
            g.step_wait_ms = c.uint("wait", 5)? as u32;
            cfg.mode = Mode::None;
        }
        GeneratorFrame::SweepAmplitude => {
            g.cw_mhz = c.uint("cw", 7)? as f64 / 1000.0;
            c.sep()?;
            g.sweep_power_steps = c.uint("power steps", 4)? as u16;
            c.sep()?;
            g.start_high_power = c.flag("start high power")?;
            c.sep()?;
            g.start_power_level = c.digit("start power level")?;
            c.sep()?;
            g.stop_high_power = c.flag("stop high power")?;
            c.sep()?;
            g.stop_power_level = c.digit("stop power level")?;
            c.sep()?;
            g.rf_power_on = c.flag("rf power")?;
            c.sep()?;
            g.step_wait_ms = c.uint("wait", 5)? as u32;
            cfg.mode = Mode::GenSweepAmp;
        }
        GeneratorFrame::SweepFrequency => {
            cfg.plan.start_mhz = c.uint("start", 7)? as f64 / 1000.0;
            c.sep()?;
            cfg.plan.points = c.uint("steps", 4)? as usize;
            c.sep()?;
            cfg.plan.step_mhz = c.uint("step", 7)? as f64 / 1000.0;
            c.sep()?;
            g.high_power = c.flag("high power")?;
            c.sep()?;
            g.power_level = c.digit("power level")?;
            c.sep()?;
            g.rf_power_on = c.flag("rf power")?;
            c.sep()?;
            g.step_wait_ms = c.uint("wait", 5)? as u32;
            cfg.mode = Mode::GenSweepFreq;
        }
        GeneratorFrame::Cw => {
            // Leading start frequency is repeated by the firmware and ignored.
            c.raw("start", 7)?;
            c.sep()?;
            g.cw_mhz = c.uint("cw", 7)? as f64 / 1000.0;
            c.sep()?;
            cfg.plan.points = c.uint("steps", 4)? as usize;
            c.sep()?;
            cfg.plan.step_mhz = c.uint("step", 7)? as f64 / 1000.0;
            c.sep()?;
            g.high_power = c.flag("high power")?;
            c.sep()?;
            g.power_level = c.digit("power level")?;
            c.sep()?;
            g.rf_power_on = c.flag("rf power")?;
            cfg.mode = Mode::GenCw;
        }
    }

    Ok(cfg)
}

fn decode_sniffer(line: &str) -> Result<Configuration> {
    if line.len() < SNIFFER_MIN_LEN {
        return Err(too_short("sniffer", line, SNIFFER_MIN_LEN));
    }

    let mut cfg = Configuration::empty(ConfigSource::Sniffer, line);
    let mut c = FieldCursor::new(line, BODY_OFFSET);

    cfg.plan.start_mhz = c.uint("start", 7)? as f64 / 1000.0;
    c.sep()?;
    cfg.expansion_active = c.flag("expansion")?;
    c.sep()?;
    cfg.mode = Mode::from_code(c.uint("mode", 3)? as u16);
    c.sep()?;
    let delay = c.uint("delay", 5)?;
    if delay == 0 {
        return Err(Error::Decode("sniffer delay is zero".into()));
    }
    cfg.sniffer.baud_rate = (FCY_CLOCK as f64 / delay as f64).round() as u32;
    c.sep()?;
    cfg.sniffer.modulation = Modulation::from_code(c.uint("modulation", 1)? as u16);
    c.sep()?;
    cfg.sniffer.rbw_khz = c.uint("rbw", 5)? as f64;
    c.sep()?;
    cfg.sniffer.threshold_dbm = -0.5 * c.uint("threshold", 3)? as f64;

    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Render an analyzer configuration back into its frame form.
///
/// Used to synthesize device traffic for offline sessions and tests. The
/// five digit `#C2-f:` variant is chosen when the point count needs it.
pub fn encode_analyzer_frame(cfg: &Configuration) -> String {
    let a = &cfg.analyzer;
    let long = cfg.plan.points > 9999;
    format!(
        "#C2-{}:{:07},{:07},{:04},{:04},{:0width$},{},{:03},{:07},{:07},{:07},{:05},{:04},{:03}",
        if long { 'f' } else { 'F' },
        (cfg.plan.start_mhz * 1000.0).round() as u64,
        (cfg.plan.step_mhz * 1_000_000.0).round() as u64,
        a.top_dbm.round() as i64,
        a.bottom_dbm.round() as i64,
        cfg.plan.points,
        if cfg.expansion_active { 1 } else { 0 },
        cfg.mode.code(),
        (a.min_freq_mhz * 1000.0).round() as u64,
        (a.max_freq_mhz * 1000.0).round() as u64,
        (a.max_span_mhz * 1000.0).round() as u64,
        a.rbw_khz.round() as u64,
        a.offset_db.round() as i64,
        calculator_code(a.calculator),
        width = if long { 5 } else { 4 },
    )
}

fn calculator_code(calc: Calculator) -> u16 {
    match calc {
        Calculator::Normal => 0,
        Calculator::Max => 1,
        Calculator::Avg => 2,
        Calculator::Overwrite => 3,
        Calculator::MaxHold => 4,
        Calculator::MaxHistorical => 5,
        Calculator::Unknown => 255,
    }
}

/// Build an analyzer configuration from its frequency plan and amplitude
/// window, with the remaining settings at their defaults.
pub fn analyzer_configuration(
    plan: FrequencyPlan,
    top_dbm: f64,
    bottom_dbm: f64,
) -> Configuration {
    let mut cfg = Configuration::empty(ConfigSource::Analyzer, "");
    cfg.mode = Mode::SpectrumAnalyzer;
    cfg.plan = plan;
    cfg.analyzer.top_dbm = top_dbm;
    cfg.analyzer.bottom_dbm = bottom_dbm;
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ANALYZER: &str =
        "#C2-F:0500000,0500000,-030,-120,0112,0,000,0015000,2700000,0600000,00600,0000,004";

    // =======================================================================
    // Analyzer frames
    // =======================================================================

    #[test]
    fn analyzer_basic_fields() {
        let cfg = decode_configuration(ANALYZER).unwrap();
        assert_eq!(cfg.source, ConfigSource::Analyzer);
        assert_eq!(cfg.mode, Mode::SpectrumAnalyzer);
        assert!((cfg.plan.start_mhz - 500.0).abs() < 1e-9);
        assert!((cfg.plan.step_mhz - 0.5).abs() < 1e-9);
        assert_eq!(cfg.analyzer.top_dbm, -30.0);
        assert_eq!(cfg.analyzer.bottom_dbm, -120.0);
        assert_eq!(cfg.plan.points, 112);
        assert!(!cfg.expansion_active);
        assert!((cfg.analyzer.min_freq_mhz - 15.0).abs() < 1e-9);
        assert!((cfg.analyzer.max_freq_mhz - 2700.0).abs() < 1e-9);
        assert!((cfg.analyzer.max_span_mhz - 600.0).abs() < 1e-9);
        assert_eq!(cfg.analyzer.rbw_khz, 600.0);
        assert_eq!(cfg.analyzer.offset_db, 0.0);
        assert_eq!(cfg.analyzer.calculator, Calculator::MaxHold);
        assert_eq!(cfg.raw, ANALYZER);
    }

    #[test]
    fn analyzer_without_optional_tail() {
        let line = &ANALYZER[..66];
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.analyzer.rbw_khz, 0.0);
        assert_eq!(cfg.analyzer.calculator, Calculator::Unknown);
    }

    #[test]
    fn analyzer_negative_offset() {
        let line =
            "#C2-F:0500000,0500000,-030,-120,0112,1,000,0015000,2700000,0600000,00600,-010,000";
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.analyzer.offset_db, -10.0);
        assert!(cfg.expansion_active);
        assert_eq!(cfg.analyzer.calculator, Calculator::Normal);
    }

    #[test]
    fn analyzer_long_variant_five_digit_points() {
        let line =
            "#C2-f:0500000,0100000,-030,-120,10240,0,000,0015000,2700000,0600000,00100,0000,000";
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.plan.points, 10240);
        assert!((cfg.analyzer.max_span_mhz - 600.0).abs() < 1e-9);
        assert_eq!(cfg.analyzer.rbw_khz, 100.0);
    }

    #[test]
    fn analyzer_unknown_mode_is_not_failure() {
        let line = ANALYZER.replace(",0,000,", ",0,077,");
        let cfg = decode_configuration(&line).unwrap();
        assert_eq!(cfg.mode, Mode::Unknown(77));
    }

    #[test]
    fn analyzer_truncated_fails() {
        assert!(matches!(
            decode_configuration("#C2-F:0500000,0500000"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn analyzer_garbage_field_fails() {
        let line = ANALYZER.replace("-030", "-0x0");
        assert!(decode_configuration(&line).is_err());
    }

    #[test]
    fn analyzer_spec_example_round_trip() {
        let plan = FrequencyPlan {
            start_mhz: 500.0,
            step_mhz: 0.5,
            points: 112,
        };
        let line = encode_analyzer_frame(&analyzer_configuration(plan, -30.0, -120.0));
        let cfg = decode_configuration(&line).unwrap();
        assert_eq!(cfg.plan, plan);
        assert_eq!(cfg.analyzer.top_dbm, -30.0);
        assert_eq!(cfg.analyzer.bottom_dbm, -120.0);
    }

    proptest! {
        #[test]
        fn analyzer_plan_round_trips(
            start_khz in 0u64..9_999_999,
            step_hz in 1u64..9_999_999,
            top in -120i64..=50,
            bottom in -120i64..=50,
            points in 112usize..65_535,
        ) {
            let plan = FrequencyPlan {
                start_mhz: start_khz as f64 / 1000.0,
                step_mhz: step_hz as f64 / 1_000_000.0,
                points,
            };
            let line = encode_analyzer_frame(&analyzer_configuration(plan, top as f64, bottom as f64));
            let cfg = decode_configuration(&line).unwrap();
            prop_assert!((cfg.plan.start_mhz - plan.start_mhz).abs() < 0.001);
            prop_assert!((cfg.plan.step_mhz - plan.step_mhz).abs() < 0.001);
            prop_assert_eq!(cfg.plan.points, points);
            prop_assert!((cfg.analyzer.top_dbm - top as f64).abs() <= 1.0);
            prop_assert!((cfg.analyzer.bottom_dbm - bottom as f64).abs() <= 1.0);
        }
    }

    // =======================================================================
    // Generator frames
    // =======================================================================

    #[test]
    fn generator_full_status() {
        let line = "#C3-*:0221000,0432144,0020,0000100,1,3,0005,0,0,1,3,1,00150";
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.source, ConfigSource::Generator(GeneratorFrame::Full));
        assert_eq!(cfg.mode, Mode::None);
        assert!((cfg.plan.start_mhz - 221.0).abs() < 1e-9);
        assert!((cfg.generator.cw_mhz - 432.144).abs() < 1e-9);
        assert_eq!(cfg.plan.points, 20);
        assert!((cfg.plan.step_mhz - 0.1).abs() < 1e-9);
        assert!(cfg.generator.high_power);
        assert_eq!(cfg.generator.power_level, 3);
        assert_eq!(cfg.generator.sweep_power_steps, 5);
        assert!(!cfg.generator.start_high_power);
        assert_eq!(cfg.generator.start_power_level, 0);
        assert!(cfg.generator.stop_high_power);
        assert_eq!(cfg.generator.stop_power_level, 3);
        assert!(cfg.generator.rf_power_on);
        assert_eq!(cfg.generator.step_wait_ms, 150);
    }

    #[test]
    fn generator_sweep_frequency() {
        let line = "#C3-F:0221000,0020,0000100,0,0,1,00150";
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.mode, Mode::GenSweepFreq);
        assert!((cfg.plan.start_mhz - 221.0).abs() < 1e-9);
        assert_eq!(cfg.plan.points, 20);
        assert!((cfg.plan.step_mhz - 0.1).abs() < 1e-9);
        assert!(cfg.generator.rf_power_on);
        assert_eq!(cfg.generator.step_wait_ms, 150);
    }

    #[test]
    fn generator_sweep_amplitude() {
        let line = "#C3-A:0432144,0010,0,0,1,3,1,00100";
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.mode, Mode::GenSweepAmp);
        assert!((cfg.generator.cw_mhz - 432.144).abs() < 1e-9);
        assert_eq!(cfg.generator.sweep_power_steps, 10);
        assert!(cfg.generator.stop_high_power);
        assert_eq!(cfg.generator.stop_power_level, 3);
        assert_eq!(cfg.generator.step_wait_ms, 100);
    }

    #[test]
    fn generator_cw() {
        let line = "#C3-G:0432144,0432144,0020,0000100,0,2,0";
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.mode, Mode::GenCw);
        assert!((cfg.generator.cw_mhz - 432.144).abs() < 1e-9);
        assert_eq!(cfg.generator.power_level, 2);
        assert!(!cfg.generator.rf_power_on);
        // Not carried by CW frames.
        assert_eq!(cfg.generator.stop_power_level, 1);
    }

    #[test]
    fn generator_unknown_variant_fails() {
        let line = "#C3-Q:0432144,0432144,0020,0000100,0,2,0";
        assert!(decode_configuration(line).is_err());
    }

    #[test]
    fn expansion_generator_marks_expansion() {
        let line = "#C5-G:0432144,0432144,0020,0000100,0,2,1";
        let cfg = decode_configuration(line).unwrap();
        assert!(cfg.expansion_active);
        assert!(cfg.is_generator());
    }

    // =======================================================================
    // Sniffer frames
    // =======================================================================

    #[test]
    fn sniffer_fields() {
        let line = "#C4-F:0433920,0,006,01667,2,00100,160";
        let cfg = decode_configuration(line).unwrap();
        assert_eq!(cfg.source, ConfigSource::Sniffer);
        assert_eq!(cfg.mode, Mode::Sniffer);
        assert!((cfg.plan.start_mhz - 433.92).abs() < 1e-9);
        assert_eq!(cfg.sniffer.baud_rate, 9598);
        assert_eq!(cfg.sniffer.modulation, Modulation::OokStd);
        assert_eq!(cfg.sniffer.rbw_khz, 100.0);
        assert_eq!(cfg.sniffer.threshold_dbm, -80.0);
    }

    #[test]
    fn sniffer_zero_delay_fails() {
        let line = "#C4-F:0433920,0,006,00000,2,00100,160";
        assert!(decode_configuration(line).is_err());
    }

    // =======================================================================
    // Classification and plans
    // =======================================================================

    #[test]
    fn config_candidates() {
        assert!(is_config_candidate(ANALYZER));
        assert!(is_config_candidate("#C2-f:123"));
        assert!(is_config_candidate("#C3-G:1"));
        assert!(is_config_candidate("#C4-F:1"));
        assert!(!is_config_candidate("#C3-M:060,255,01.15"));
        assert!(!is_config_candidate("#C2-M:003,255,01.12"));
        assert!(!is_config_candidate("#ACK"));
        assert!(!is_config_candidate("#C3-"));
    }

    #[test]
    fn plan_change_tolerance() {
        let a = FrequencyPlan { start_mhz: 100.0, step_mhz: 0.1, points: 112 };
        let mut b = a;
        b.start_mhz += 0.0005;
        assert!(!a.differs_from(&b));
        b.start_mhz = 100.002;
        assert!(a.differs_from(&b));
        assert!((a.end_mhz() - 111.1).abs() < 1e-9);
    }
}
