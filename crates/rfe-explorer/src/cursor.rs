//! Sequential reader over fixed-width, comma separated configuration fields.
//!
//! Configuration frames are positional: `#C2-F:0500000,0500000,-030,-120,0112,...`.
//! Instead of slicing the line at hard-coded offsets, decoders walk it with a
//! [`FieldCursor`], naming each field as they go so a malformed frame
//! reports which field broke and where.

use rfe_core::error::{Error, Result};

/// Field separator inside configuration frames.
pub const SEPARATOR: u8 = b',';

/// A forward-only cursor over a configuration line.
#[derive(Debug, Clone)]
pub struct FieldCursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    /// Start reading `line` at byte offset `pos` (usually just past the
    /// `#Cx-y:` prefix).
    pub fn new(line: &'a str, pos: usize) -> Self {
        FieldCursor { line, pos }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.line.len().saturating_sub(self.pos)
    }

    /// Byte at `offset` from the start of the line, if any.
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.line.as_bytes().get(offset).copied()
    }

    /// Take the next `width` bytes as text.
    pub fn raw(&mut self, name: &str, width: usize) -> Result<&'a str> {
        let end = self.pos + width;
        let field = self.line.get(self.pos..end).ok_or_else(|| {
            Error::Decode(format!(
                "field '{name}' truncated at offset {} (need {width} bytes, line is {})",
                self.pos,
                self.line.len()
            ))
        })?;
        self.pos = end;
        Ok(field)
    }

    /// Consume one separator.
    pub fn sep(&mut self) -> Result<()> {
        match self.byte_at(self.pos) {
            Some(SEPARATOR) => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(Error::Decode(format!(
                "expected ',' at offset {}, found {:?}",
                self.pos, other as char
            ))),
            None => Err(Error::Decode(format!(
                "expected ',' at offset {}, line ended",
                self.pos
            ))),
        }
    }

    /// A signed decimal field (`-030`, `0500000`).
    pub fn int(&mut self, name: &str, width: usize) -> Result<i64> {
        let start = self.pos;
        let text = self.raw(name, width)?;
        text.trim().parse::<i64>().map_err(|_| {
            Error::Decode(format!(
                "field '{name}' at offset {start} is not a number: {text:?}"
            ))
        })
    }

    /// An unsigned decimal field.
    pub fn uint(&mut self, name: &str, width: usize) -> Result<u64> {
        let start = self.pos;
        let text = self.raw(name, width)?;
        text.trim().parse::<u64>().map_err(|_| {
            Error::Decode(format!(
                "field '{name}' at offset {start} is not an unsigned number: {text:?}"
            ))
        })
    }

    /// A single-character switch: `'1'` is on, anything else is off.
    pub fn flag(&mut self, name: &str) -> Result<bool> {
        Ok(self.raw(name, 1)? == "1")
    }

    /// A single decimal digit.
    pub fn digit(&mut self, name: &str) -> Result<u8> {
        let start = self.pos;
        let text = self.raw(name, 1)?;
        match text.as_bytes()[0] {
            b @ b'0'..=b'9' => Ok(b - b'0'),
            other => Err(Error::Decode(format!(
                "field '{name}' at offset {start} is not a digit: {:?}",
                other as char
            ))),
        }
    }

    /// An optional trailing field: `None` when the line ends at the cursor,
    /// otherwise a separator followed by a `width`-wide signed number.
    pub fn optional_int(&mut self, name: &str, width: usize) -> Result<Option<i64>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        self.sep()?;
        self.int(name, width).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_in_sequence() {
        let mut c = FieldCursor::new("#C2-F:0500000,-030,1", 6);
        assert_eq!(c.uint("start", 7).unwrap(), 500_000);
        c.sep().unwrap();
        assert_eq!(c.int("top", 4).unwrap(), -30);
        c.sep().unwrap();
        assert!(c.flag("expansion").unwrap());
        assert_eq!(c.remaining(), 0);
        assert_eq!(c.position(), 20);
    }

    #[test]
    fn truncated_field_names_the_field() {
        let mut c = FieldCursor::new("#C2-F:05000", 6);
        let err = c.uint("start", 7).unwrap_err();
        assert!(err.to_string().contains("'start'"));
    }

    #[test]
    fn non_numeric_field_is_decode_error() {
        let mut c = FieldCursor::new("#C2-F:05x0000", 6);
        assert!(matches!(c.uint("start", 7), Err(Error::Decode(_))));
    }

    #[test]
    fn separator_is_checked() {
        let mut c = FieldCursor::new("12;34", 2);
        assert!(c.sep().is_err());
        let mut c = FieldCursor::new("12", 2);
        assert!(c.sep().is_err());
    }

    #[test]
    fn digit_rejects_letters() {
        let mut c = FieldCursor::new("7A", 0);
        assert_eq!(c.digit("level").unwrap(), 7);
        assert!(c.digit("level").is_err());
    }

    #[test]
    fn optional_tail() {
        let mut c = FieldCursor::new("x,00100", 1);
        assert_eq!(c.optional_int("rbw", 5).unwrap(), Some(100));
        assert_eq!(c.optional_int("offset", 4).unwrap(), None);
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let mut c = FieldCursor::new("#C2-F:\u{e9}\u{e9}\u{e9}\u{e9}", 6);
        assert!(c.uint("start", 7).is_err());
    }
}
