//! Device vocabulary shared by every rfe crate.
//!
//! The wire protocol identifies boards, operating modes, calculators and
//! modulations by small integers. Each is mapped here onto a closed enum
//! with an explicit `Unknown` variant so that a firmware reporting a value
//! this library has never seen degrades to "unknown" instead of failing the
//! whole configuration frame.

use std::fmt;
use std::str::FromStr;

/// Lowest amplitude the instruments report. Also the sentinel returned for
/// out-of-range sweep points.
pub const MIN_AMPLITUDE_DBM: f64 = -120.0;

/// Highest amplitude the instruments report.
pub const MAX_AMPLITUDE_DBM: f64 = 50.0;

/// Largest sweep point count any frame can carry.
pub const MAX_SPECTRUM_STEPS: usize = 65_535;

/// Instruction clock used to derive the sniffer baud rate from its delay field.
pub const FCY_CLOCK: u32 = 16_000_000;

/// Smallest point count an analyzer sweep is configured with.
pub const MIN_SWEEP_POINTS: usize = 112;

/// Signal generator frequency range, MHz.
pub const RFGEN_MIN_FREQ_MHZ: f64 = 23.438;
pub const RFGEN_MAX_FREQ_MHZ: f64 = 6000.0;

/// Expansion-board signal generator frequency range, MHz.
pub const RFGEN_EXPANSION_MIN_FREQ_MHZ: f64 = 0.1;
pub const RFGEN_EXPANSION_MAX_FREQ_MHZ: f64 = 6000.0;

/// Acknowledgement literal sent by the device.
pub const ACKNOWLEDGE: &str = "#ACK";

/// Banner printed by the firmware after a reset.
pub const RESET_BANNER: &str = "(C) Ariel Rocholl ";

/// Early End Of Transmission marker: an aborted binary frame.
pub const EEOT: &[u8; 5] = b"\xFF\xFE\xFF\xFE\x00";

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Hardware board model, as reported in `#C2-M:` / `#C3-M:` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Mhz433,
    Mhz868,
    Mhz915,
    WSub1G,
    Ghz2400,
    WSub3G,
    Ghz6,
    WSub1GPlus,
    AudioPro,
    Ghz2400Plus,
    Ghz4Plus,
    Ghz6Plus,
    W5G3G,
    W5G4G,
    W5G5G,
    RfGen,
    RfGenExpansion,
    /// No board present, or not yet reported.
    None,
    /// A code this library does not know.
    Unknown(u16),
}

impl Model {
    /// Map a wire code to a model.
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Model::Mhz433,
            1 => Model::Mhz868,
            2 => Model::Mhz915,
            3 => Model::WSub1G,
            4 => Model::Ghz2400,
            5 => Model::WSub3G,
            6 => Model::Ghz6,
            10 => Model::WSub1GPlus,
            11 => Model::AudioPro,
            12 => Model::Ghz2400Plus,
            13 => Model::Ghz4Plus,
            14 => Model::Ghz6Plus,
            16 => Model::W5G3G,
            17 => Model::W5G4G,
            18 => Model::W5G5G,
            60 => Model::RfGen,
            61 => Model::RfGenExpansion,
            255 => Model::None,
            other => Model::Unknown(other),
        }
    }

    /// The wire code of this model.
    pub fn code(&self) -> u16 {
        match self {
            Model::Mhz433 => 0,
            Model::Mhz868 => 1,
            Model::Mhz915 => 2,
            Model::WSub1G => 3,
            Model::Ghz2400 => 4,
            Model::WSub3G => 5,
            Model::Ghz6 => 6,
            Model::WSub1GPlus => 10,
            Model::AudioPro => 11,
            Model::Ghz2400Plus => 12,
            Model::Ghz4Plus => 13,
            Model::Ghz6Plus => 14,
            Model::W5G3G => 16,
            Model::W5G4G => 17,
            Model::W5G5G => 18,
            Model::RfGen => 60,
            Model::RfGenExpansion => 61,
            Model::None => 255,
            Model::Unknown(code) => *code,
        }
    }

    /// Whether this board is a signal generator.
    pub fn is_generator(&self) -> bool {
        matches!(self, Model::RfGen | Model::RfGenExpansion)
    }

    /// Short normalized identifier, e.g. `"433M"` or `"WSUB1G"`.
    ///
    /// Only the classic boards have a short name; everything else reads
    /// `"UNKWN"`.
    pub fn short_name(&self) -> &'static str {
        match self {
            Model::Mhz433 => "433M",
            Model::Mhz868 => "868M",
            Model::Mhz915 => "915M",
            Model::WSub1G => "WSUB1G",
            Model::Ghz2400 => "2.4G",
            Model::WSub3G => "WSUB3G",
            Model::Ghz6 => "6G",
            Model::RfGen => "RFE6GEN",
            Model::None => "NONE",
            _ => "UNKWN",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl FromStr for Model {
    type Err = std::convert::Infallible;

    /// Reverse of [`Model::short_name`]. Unrecognized text maps to
    /// [`Model::None`].
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let model = match s.to_uppercase().as_str() {
            "433M" => Model::Mhz433,
            "868M" => Model::Mhz868,
            "915M" => Model::Mhz915,
            "WSUB1G" => Model::WSub1G,
            "2.4G" => Model::Ghz2400,
            "WSUB3G" => Model::WSub3G,
            "6G" => Model::Ghz6,
            "RFE6GEN" => Model::RfGen,
            _ => Model::None,
        };
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Operating mode reported in configuration frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    SpectrumAnalyzer,
    Transmitter,
    WifiAnalyzer,
    Tracking,
    Sniffer,
    GenCw,
    GenSweepFreq,
    GenSweepAmp,
    None,
    Unknown(u16),
}

impl Mode {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Mode::SpectrumAnalyzer,
            1 => Mode::Transmitter,
            2 => Mode::WifiAnalyzer,
            5 => Mode::Tracking,
            6 => Mode::Sniffer,
            60 => Mode::GenCw,
            61 => Mode::GenSweepFreq,
            62 => Mode::GenSweepAmp,
            255 => Mode::None,
            other => Mode::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Mode::SpectrumAnalyzer => 0,
            Mode::Transmitter => 1,
            Mode::WifiAnalyzer => 2,
            Mode::Tracking => 5,
            Mode::Sniffer => 6,
            Mode::GenCw => 60,
            Mode::GenSweepFreq => 61,
            Mode::GenSweepAmp => 62,
            Mode::None => 255,
            Mode::Unknown(code) => *code,
        }
    }

    /// Whether this is one of the signal generator modes.
    pub fn is_generator(&self) -> bool {
        matches!(self, Mode::GenCw | Mode::GenSweepFreq | Mode::GenSweepAmp)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::SpectrumAnalyzer => write!(f, "Spectrum Analyzer"),
            Mode::Transmitter => write!(f, "Transmitter"),
            Mode::WifiAnalyzer => write!(f, "WiFi Analyzer"),
            Mode::Tracking => write!(f, "Tracking"),
            Mode::Sniffer => write!(f, "Sniffer"),
            Mode::GenCw => write!(f, "Generator CW"),
            Mode::GenSweepFreq => write!(f, "Generator Sweep Frequency"),
            Mode::GenSweepAmp => write!(f, "Generator Sweep Amplitude"),
            Mode::None => write!(f, "None"),
            Mode::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Calculator, modulation, DSP, input stage
// ---------------------------------------------------------------------------

/// Trace calculator configured on the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Calculator {
    Normal,
    Max,
    Avg,
    Overwrite,
    MaxHold,
    MaxHistorical,
    Unknown,
}

impl Calculator {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Calculator::Normal,
            1 => Calculator::Max,
            2 => Calculator::Avg,
            3 => Calculator::Overwrite,
            4 => Calculator::MaxHold,
            5 => Calculator::MaxHistorical,
            _ => Calculator::Unknown,
        }
    }
}

/// Sniffer demodulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modulation {
    OokRaw,
    PskRaw,
    OokStd,
    PskStd,
    None,
    Unknown,
}

impl Modulation {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Modulation::OokRaw,
            1 => Modulation::PskRaw,
            2 => Modulation::OokStd,
            3 => Modulation::PskStd,
            255 => Modulation::None,
            _ => Modulation::Unknown,
        }
    }
}

/// DSP mode reported by `DSP:` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DspMode {
    Auto,
    Filter,
    Fast,
    NoImage,
    Unknown,
}

impl DspMode {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => DspMode::Auto,
            1 => DspMode::Filter,
            2 => DspMode::Fast,
            3 => DspMode::NoImage,
            _ => DspMode::Unknown,
        }
    }
}

/// RF input stage selectable on the Plus models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputStage {
    Direct,
    Attenuator30dB,
    Lna25dB,
    Attenuator60dB,
    Lna12dB,
}

impl InputStage {
    /// The digit sent on the wire for this stage.
    pub fn code(&self) -> u8 {
        match self {
            InputStage::Direct => 0,
            InputStage::Attenuator30dB => 1,
            InputStage::Lna25dB => 2,
            InputStage::Attenuator60dB => 3,
            InputStage::Lna12dB => 4,
        }
    }
}

/// The kind of instrument a session expects before the board reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceKind {
    #[default]
    Analyzer,
    Generator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_codes_round_trip() {
        for code in [0u16, 1, 2, 3, 4, 5, 6, 10, 11, 12, 13, 14, 16, 17, 18, 60, 61, 255] {
            assert_eq!(Model::from_code(code).code(), code);
        }
    }

    #[test]
    fn model_unknown_code_is_preserved() {
        assert_eq!(Model::from_code(42), Model::Unknown(42));
        assert_eq!(Model::Unknown(42).code(), 42);
        assert_eq!(Model::Unknown(42).short_name(), "UNKWN");
    }

    #[test]
    fn model_short_names() {
        assert_eq!(Model::Mhz433.to_string(), "433M");
        assert_eq!(Model::Ghz2400.to_string(), "2.4G");
        assert_eq!(Model::RfGen.to_string(), "RFE6GEN");
        assert_eq!(Model::None.to_string(), "NONE");
        assert_eq!(Model::Ghz6Plus.to_string(), "UNKWN");
    }

    #[test]
    fn model_from_text() {
        assert_eq!("wsub1g".parse::<Model>().unwrap(), Model::WSub1G);
        assert_eq!("6G".parse::<Model>().unwrap(), Model::Ghz6);
        assert_eq!("nonsense".parse::<Model>().unwrap(), Model::None);
    }

    #[test]
    fn model_is_generator() {
        assert!(Model::RfGen.is_generator());
        assert!(Model::RfGenExpansion.is_generator());
        assert!(!Model::WSub3G.is_generator());
    }

    #[test]
    fn mode_codes() {
        assert_eq!(Mode::from_code(0), Mode::SpectrumAnalyzer);
        assert_eq!(Mode::from_code(6), Mode::Sniffer);
        assert_eq!(Mode::from_code(62), Mode::GenSweepAmp);
        assert_eq!(Mode::from_code(255), Mode::None);
        assert_eq!(Mode::from_code(7), Mode::Unknown(7));
        assert!(Mode::GenCw.is_generator());
        assert!(!Mode::Tracking.is_generator());
    }

    #[test]
    fn calculator_and_modulation_codes() {
        assert_eq!(Calculator::from_code(4), Calculator::MaxHold);
        assert_eq!(Calculator::from_code(99), Calculator::Unknown);
        assert_eq!(Modulation::from_code(2), Modulation::OokStd);
        assert_eq!(Modulation::from_code(255), Modulation::None);
        assert_eq!(Modulation::from_code(9), Modulation::Unknown);
    }

    #[test]
    fn dsp_and_input_stage() {
        assert_eq!(DspMode::from_code(3), DspMode::NoImage);
        assert_eq!(DspMode::from_code(8), DspMode::Unknown);
        assert_eq!(InputStage::Lna12dB.code(), 4);
    }

    #[test]
    fn eeot_marker_bytes() {
        assert_eq!(EEOT, &[0xFF, 0xFE, 0xFF, 0xFE, 0x00]);
    }
}
