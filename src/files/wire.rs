//! Big-endian field readers and writers shared by the file codecs.

use super::MAX_STRING_FIELD_SIZE;
use crate::error::{CodecError, CodecResult};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

/// Length-prefixed, NUL-terminated string as stored on the wire
#[derive(Clone, PartialEq, Eq, Default)]
pub struct StringField {
    stored: Vec<u8>,
}

impl StringField {
    /// Store `value` followed by a NUL, clamped to 255 bytes.
    ///
    /// When the value does not fit, the last stored byte is replaced by NUL.
    #[must_use]
    pub fn new(value: &str) -> Self {
        let len = (value.len() + 1).min(MAX_STRING_FIELD_SIZE);
        let mut stored = Vec::with_capacity(len);
        stored.extend_from_slice(&value.as_bytes()[..len - 1]);
        stored.push(0);
        Self { stored }
    }

    /// Rebuild from a JSON pair; a declared length of 0 with no text stays unset
    pub(crate) fn from_json(value: &str, declared_len: u8) -> Self {
        if declared_len == 0 && value.is_empty() {
            Self::default()
        } else {
            Self::new(value)
        }
    }

    pub(crate) const fn from_stored(stored: Vec<u8>) -> Self {
        Self { stored }
    }

    /// Stored length, trailing NUL included
    #[must_use]
    pub fn stored_len(&self) -> u8 {
        u8::try_from(self.stored.len()).unwrap_or(u8::MAX)
    }

    /// Text up to the first NUL
    #[must_use]
    pub fn value(&self) -> String {
        let end = self
            .stored
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.stored.len());
        String::from_utf8_lossy(&self.stored[..end]).into_owned()
    }

    /// No text stored, or only the NUL
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stored.first().is_none_or(|b| *b == 0)
    }

    /// Bytes taken on the wire, length prefix included
    #[must_use]
    pub fn wire_size(&self) -> usize {
        1 + self.stored.len()
    }

    pub(crate) fn put(&self, out: &mut BytesMut) {
        out.put_u8(self.stored_len());
        out.put_slice(&self.stored);
    }
}

impl fmt::Debug for StringField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value())
    }
}

pub(crate) fn put_u24(out: &mut BytesMut, value: u32) {
    out.put_uint(u64::from(value & 0x00FF_FFFF), 3);
}

/// Cursor over a received file that reports which field ran short
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub(crate) const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn require(&self, field: &'static str, needed: usize) -> CodecResult<()> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                field,
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> CodecResult<u8> {
        self.require(field, 1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self, field: &'static str) -> CodecResult<u16> {
        self.require(field, 2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn u24(&mut self, field: &'static str) -> CodecResult<u32> {
        self.require(field, 3)?;
        // at most 3 bytes were read, so the value fits
        Ok(u32::try_from(self.buf.get_uint(3)).unwrap_or(0x00FF_FFFF))
    }

    pub(crate) fn u32(&mut self, field: &'static str) -> CodecResult<u32> {
        self.require(field, 4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn bytes(&mut self, field: &'static str, len: usize) -> CodecResult<Vec<u8>> {
        self.require(field, len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head.to_vec())
    }

    pub(crate) fn string(&mut self, field: &'static str) -> CodecResult<StringField> {
        let len = usize::from(self.u8(field)?);
        Ok(StringField::from_stored(self.bytes(field, len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_field_adds_terminator() {
        let field = StringField::new("TEST_FILE1.TEST");
        assert_eq!(field.stored_len(), 16);
        assert_eq!(field.value(), "TEST_FILE1.TEST");
        assert_eq!(field.wire_size(), 17);
    }

    #[test]
    fn string_field_clamps_long_values() {
        let long = "x".repeat(400);
        let field = StringField::new(&long);
        assert_eq!(field.stored_len(), 255);
        assert_eq!(field.value().len(), 254);

        let exact = "y".repeat(254);
        assert_eq!(StringField::new(&exact).value(), exact);
    }

    #[test]
    fn empty_string_field_is_single_nul() {
        let field = StringField::new("");
        assert!(field.is_empty());
        assert_eq!(field.stored_len(), 1);

        let mut out = BytesMut::new();
        field.put(&mut out);
        assert_eq!(&out[..], &[1, 0]);
    }

    #[test]
    fn reader_reports_truncated_field() {
        let mut reader = WireReader::new(&[0x00, 0x01, 0x02]);
        assert_eq!(reader.u16("code").unwrap(), 1);
        let err = reader.u24("ratio").unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                field: "ratio",
                needed: 3,
                available: 1
            }
        );
    }

    #[test]
    fn u24_round_trips_through_buffer() {
        let mut out = BytesMut::new();
        put_u24(&mut out, 0x0012_3456);
        assert_eq!(&out[..], &[0x12, 0x34, 0x56]);
        assert_eq!(WireReader::new(&out).u24("ratio").unwrap(), 0x0012_3456);
    }
}
