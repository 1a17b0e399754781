//! Decoding of non-configuration text lines.
//!
//! Everything the framer emits as a plain line ends up here: model
//! identification, serial numbers, acknowledgements, DSP mode reports, the
//! reset banner and free-form human readable text.

use rfe_core::error::{Error, Result};
use rfe_core::types::{DspMode, Model, ACKNOWLEDGE, RESET_BANNER};

use crate::calibration::{GeneratorCalibration, GENERATOR_CALIBRATION_MIN_LEN};
use crate::config::is_config_candidate;
use crate::cursor::FieldCursor;

/// A decoded text line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `#ACK`
    Ack,
    /// `DSP:n`
    Dsp(DspMode),
    /// `#Sn` followed by sixteen serial number characters.
    SerialNumber(String),
    /// `#C2-M:` (analyzer) or `#C3-M:` (generator) model report.
    Model {
        main: Model,
        expansion: Model,
        firmware: String,
        generator: bool,
    },
    /// Signal generator calibration sent as a text line.
    GeneratorCalibration(GeneratorCalibration),
    /// The firmware reset banner.
    ResetBanner,
    /// `#C1-F:` configuration from firmware too old to be supported.
    Obsolete(String),
    /// A configuration-looking line that did not decode.
    UnexpectedConfig(String),
    /// Anything else, usually human readable text from the device.
    Text(String),
}

/// Convert received bytes to text one byte per character (ISO-8859-1).
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`latin1_to_string`]; characters above U+00FF become `?`.
pub fn string_to_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect()
}

/// Classify one text line (without CRLF).
///
/// Returns [`Error::Decode`] only when a line has a recognized prefix but
/// its fields cannot be parsed (e.g. `#C2-M:0x3,...`).
pub fn decode_line(line: &str) -> Result<Message> {
    if line.starts_with(ACKNOWLEDGE) {
        return Ok(Message::Ack);
    }

    if line.len() > 4 && line.starts_with("DSP:") {
        let mut c = FieldCursor::new(line, 4);
        return Ok(Message::Dsp(DspMode::from_code(c.digit("dsp")? as u16)));
    }

    if line.len() > 16 && line.starts_with("#Sn") {
        let serial: String = line.chars().skip(3).take(16).collect();
        return Ok(Message::SerialNumber(serial));
    }

    if line.len() > 5 && (line.starts_with("#C2-M:") || line.starts_with("#C3-M:")) {
        return decode_model(line);
    }

    if line.len() >= GENERATOR_CALIBRATION_MIN_LEN && line.starts_with("$q") {
        return Ok(Message::GeneratorCalibration(GeneratorCalibration::parse(
            &string_to_latin1(line),
        )?));
    }

    if line.len() > RESET_BANNER.len() && line.starts_with(RESET_BANNER) {
        return Ok(Message::ResetBanner);
    }

    if line.starts_with("#C1-F:") {
        return Ok(Message::Obsolete(line.to_string()));
    }

    if is_config_candidate(line) {
        return Ok(Message::UnexpectedConfig(line.to_string()));
    }

    Ok(Message::Text(line.to_string()))
}

fn decode_model(line: &str) -> Result<Message> {
    let mut c = FieldCursor::new(line, 6);
    let main = Model::from_code(model_code(c.uint("main model", 3)?)?);
    c.sep()?;
    let expansion = Model::from_code(model_code(c.uint("expansion model", 3)?)?);
    c.sep()?;
    let firmware = c.raw("firmware", 5)?.to_string();

    Ok(Message::Model {
        main,
        expansion,
        firmware,
        generator: line.starts_with("#C3-"),
    })
}

fn model_code(value: u64) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::Decode(format!("model code {value} out of range")))
}
