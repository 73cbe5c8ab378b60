//! Wire codec shared by every chain module
//!
//! All QR integers are little-endian and every variable-length field carries
//! an explicit 1, 2 or 4 byte length prefix. Reads past the end of a buffer
//! return `CodecError::Truncated`, never a short value.

use crate::error::CodecError;

/// Decode a hex string, tolerating surrounding whitespace and a `0x` prefix.
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, CodecError> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if body.len() % 2 != 0 {
        return Err(CodecError::InvalidHex(format!(
            "odd length ({} characters)",
            body.len()
        )));
    }

    hex::decode(body).map_err(|e| CodecError::InvalidHex(e.to_string()))
}

/// Lowercase hex without prefix.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

fn check_range(buf_len: usize, offset: usize, needed: usize) -> Result<(), CodecError> {
    match offset.checked_add(needed) {
        Some(end) if end <= buf_len => Ok(()),
        _ => Err(CodecError::Truncated {
            offset,
            needed,
            available: buf_len.saturating_sub(offset),
        }),
    }
}

pub fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16, CodecError> {
    check_range(buf.len(), offset, 2)?;
    Ok(u16::from_le_bytes([buf[offset], buf[offset + 1]]))
}

pub fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32, CodecError> {
    check_range(buf.len(), offset, 4)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    Ok(u32::from_le_bytes(raw))
}

pub fn write_u16_le(buf: &mut [u8], offset: usize, value: u16) -> Result<(), CodecError> {
    check_range(buf.len(), offset, 2)?;
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

pub fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) -> Result<(), CodecError> {
    check_range(buf.len(), offset, 4)?;
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Bounds-checked cursor over a QR payload.
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Start reading at `offset` (used to skip an already validated prelude).
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        check_range(self.buf.len(), self.offset, len)?;
        let out = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16, CodecError> {
        let v = read_u16_le(self.buf, self.offset)?;
        self.offset += 2;
        Ok(v)
    }

    pub fn u32_le(&mut self) -> Result<u32, CodecError> {
        let v = read_u32_le(self.buf, self.offset)?;
        self.offset += 4;
        Ok(v)
    }

    pub fn prefixed_u8(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u8()? as usize;
        self.bytes(len)
    }

    pub fn prefixed_u16(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u16_le()? as usize;
        self.bytes(len)
    }

    pub fn prefixed_u32(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32_le()? as usize;
        self.bytes(len)
    }

    pub fn string_u8(&mut self) -> Result<String, CodecError> {
        let raw = self.prefixed_u8()?;
        utf8(raw)
    }

    pub fn string_u16(&mut self) -> Result<String, CodecError> {
        let raw = self.prefixed_u16()?;
        utf8(raw)
    }

    /// Fail if any bytes are left unread.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

fn utf8(raw: &[u8]) -> Result<String, CodecError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| CodecError::InvalidUtf8(e.to_string()))
}

/// Growable buffer with length-prefixed field helpers.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prelude(prelude: [u8; 3]) -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&prelude);
        Self { buf }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16_le(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32_le(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn prefixed_u8(&mut self, data: &[u8]) -> Result<&mut Self, CodecError> {
        let len = u8::try_from(data.len())
            .map_err(|_| CodecError::FieldTooLong { len: data.len(), width: 1 })?;
        self.buf.push(len);
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    pub fn prefixed_u16(&mut self, data: &[u8]) -> Result<&mut Self, CodecError> {
        let len = u16::try_from(data.len())
            .map_err(|_| CodecError::FieldTooLong { len: data.len(), width: 2 })?;
        self.u16_le(len);
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    pub fn prefixed_u32(&mut self, data: &[u8]) -> Result<&mut Self, CodecError> {
        let len = u32::try_from(data.len())
            .map_err(|_| CodecError::FieldTooLong { len: data.len(), width: 4 })?;
        self.u32_le(len);
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ============================================================================
// SCALE compact integers (substrate payloads)
// ============================================================================

pub fn encode_compact_u128(value: u128, out: &mut Vec<u8>) {
    if value < 0x40 {
        out.push((value as u8) << 2);
    } else if value < 0x4000 {
        let v = ((value as u16) << 2) | 0x01;
        out.extend_from_slice(&v.to_le_bytes());
    } else if value < 0x4000_0000 {
        let v = ((value as u32) << 2) | 0x02;
        out.extend_from_slice(&v.to_le_bytes());
    } else {
        let bytes_needed = ((128 - value.leading_zeros() + 7) / 8) as u8;
        out.push(((bytes_needed - 4) << 2) | 0x03);
        out.extend_from_slice(&value.to_le_bytes()[..bytes_needed as usize]);
    }
}

pub fn encode_compact_len(len: usize, out: &mut Vec<u8>) {
    encode_compact_u128(len as u128, out);
}

/// Decode a SCALE compact integer, returning the value and bytes consumed.
pub fn decode_compact_u128(buf: &[u8]) -> Result<(u128, usize), CodecError> {
    let first = *buf.first().ok_or(CodecError::Truncated {
        offset: 0,
        needed: 1,
        available: 0,
    })?;

    match first & 0b11 {
        0b00 => Ok(((first >> 2) as u128, 1)),
        0b01 => {
            let raw = read_u16_le(buf, 0)?;
            Ok(((raw >> 2) as u128, 2))
        }
        0b10 => {
            let raw = read_u32_le(buf, 0)?;
            Ok(((raw >> 2) as u128, 4))
        }
        _ => {
            let len = ((first >> 2) + 4) as usize;
            if len > 16 {
                return Err(CodecError::InvalidCompact(format!(
                    "{} byte integer exceeds u128",
                    len
                )));
            }
            check_range(buf.len(), 1, len)?;
            let mut raw = [0u8; 16];
            raw[..len].copy_from_slice(&buf[1..1 + len]);
            Ok((u128::from_le_bytes(raw), 1 + len))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_rejects_odd_length() {
        assert!(matches!(hex_to_bytes("abc"), Err(CodecError::InvalidHex(_))));
    }

    #[test]
    fn test_hex_rejects_non_hex() {
        assert!(matches!(hex_to_bytes("zz"), Err(CodecError::InvalidHex(_))));
        assert!(matches!(hex_to_bytes("0g"), Err(CodecError::InvalidHex(_))));
    }

    #[test]
    fn test_hex_accepts_prefix_and_whitespace() {
        assert_eq!(hex_to_bytes(" 0x53ff\n").unwrap(), vec![0x53, 0xff]);
        assert_eq!(bytes_to_hex(&[0x53, 0xff]), "53ff");
        assert!(hex_to_bytes("").unwrap().is_empty());
    }

    #[test]
    fn test_le_reads_and_truncation() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05];
        assert_eq!(read_u16_le(&buf, 0).unwrap(), 0x0201);
        assert_eq!(read_u32_le(&buf, 1).unwrap(), 0x0504_0302);
        assert!(matches!(
            read_u32_le(&buf, 2),
            Err(CodecError::Truncated { offset: 2, needed: 4, available: 3 })
        ));
        assert!(read_u16_le(&buf, usize::MAX).is_err());
    }

    #[test]
    fn test_le_writes() {
        let mut buf = [0u8; 6];
        write_u16_le(&mut buf, 0, 0xbeef).unwrap();
        write_u32_le(&mut buf, 2, 0xdead_cafe).unwrap();
        assert_eq!(buf, [0xef, 0xbe, 0xfe, 0xca, 0xad, 0xde]);
        assert!(write_u32_le(&mut buf, 3, 1).is_err());
    }

    #[test]
    fn test_reader_prefixed_fields() {
        let mut w = Writer::new();
        w.prefixed_u8(b"label").unwrap();
        w.prefixed_u16(b"cosmos1xyz").unwrap();
        w.prefixed_u32(&[9u8; 3]).unwrap();
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.string_u8().unwrap(), "label");
        assert_eq!(r.string_u16().unwrap(), "cosmos1xyz");
        assert_eq!(r.prefixed_u32().unwrap(), &[9u8; 3]);
        r.finish().unwrap();
    }

    #[test]
    fn test_reader_length_past_end() {
        // claims 10 bytes, provides 2
        let bytes = [10u8, 0xaa, 0xbb];
        let mut r = Reader::new(&bytes);
        assert!(matches!(r.prefixed_u8(), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_reader_rejects_trailing_bytes() {
        let bytes = [1u8, 2];
        let mut r = Reader::new(&bytes);
        r.u8().unwrap();
        assert_eq!(r.finish(), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_writer_field_too_long() {
        let mut w = Writer::new();
        let long = vec![0u8; 300];
        assert!(matches!(
            w.prefixed_u8(&long),
            Err(CodecError::FieldTooLong { len: 300, width: 1 })
        ));
    }

    #[test]
    fn test_compact_known_encodings() {
        let cases: [(u128, &[u8]); 5] = [
            (0, &[0x00]),
            (1, &[0x04]),
            (63, &[0xfc]),
            (64, &[0x01, 0x01]),
            (1_073_741_824, &[0x03, 0x00, 0x00, 0x00, 0x40]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_compact_u128(value, &mut out);
            assert_eq!(out, expected, "value {}", value);
            assert_eq!(decode_compact_u128(&out).unwrap(), (value, expected.len()));
        }
    }
}
