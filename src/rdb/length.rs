// The universal length header. Every length-carrying field starts with one:
//
//   00xxxxxx            6-bit length
//   01xxxxxx xxxxxxxx   14-bit length, big endian
//   0x80 <4 bytes>      32-bit length, big endian
//   0x81 <8 bytes>      64-bit length, big endian
//   0xC0 <1 byte>       immediate int8
//   0xC1 <2 bytes>      immediate int16, little endian
//   0xC2 <4 bytes>      immediate int32, little endian
//   0xC3 <zlen> <len>   LZF pair: compressed size, then uncompressed size
//
// The two lengths after 0xC3 must themselves be plain lengths; a second 0xC3
// or an immediate in either position is malformed.

use bytes::Bytes;

use crate::rdb::cursor::Cursor;
use crate::rdb::{endian, ParseError};

/// Widest possible header: `C3 81 <8 bytes> 81 <8 bytes>`.
pub const MAX_HDR_LEN: usize = 19;

/// One decoded length header. Exactly one of the plain length, the immediate
/// integer, or the compressed pair is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Length {
    /// Length of the data that follows (uncompressed size when `is_lzf`).
    pub len: u64,
    /// Compressed size when `is_lzf`.
    pub zlen: u64,
    /// Immediate value when `enc_width > 0`.
    pub ival: i64,
    /// Immediate width in bytes, 0 when this is not an immediate.
    pub enc_width: u8,
    pub is_lzf: bool,
}

impl Length {
    /// Decode one header from the cursor and step past it.
    pub fn read(cursor: &mut Cursor) -> Result<Length, ParseError> {
        let mut l = Length::default();
        l.decode(cursor)?;
        Ok(l)
    }

    /// Reset and decode in place. The cursor does not move on failure, so a
    /// truncated header is retryable after a refill.
    pub fn decode(&mut self, cursor: &mut Cursor) -> Result<(), ParseError> {
        *self = Length::default();
        let sz = {
            let buf = cursor.peek(MAX_HDR_LEN);
            self.decode_slice(buf)?
        };
        cursor.advance(sz).ok_or(ParseError::Truncated)?;
        Ok(())
    }

    #[inline]
    pub fn is_enc(&self) -> bool {
        self.enc_width > 0
    }

    /// Materialize the referenced bytes, decompressing first when the header
    /// carried an LZF pair. Asking for the bytes of an immediate is an error.
    pub fn consume(&self, cursor: &mut Cursor) -> Result<Bytes, ParseError> {
        if self.is_enc() {
            return Err(ParseError::BadHeader("immediate integer carries no data"));
        }
        if self.is_lzf {
            cursor.decompress(self.zlen, self.len)?;
        }
        let len = usize::try_from(self.len).map_err(|_| ParseError::Truncated)?;
        cursor.advance(len).ok_or(ParseError::Truncated)
    }

    /// `b` must hold at least [`MAX_HDR_LEN`] bytes (zero-padded near the end
    /// of input). Returns the header size in bytes.
    fn decode_slice(&mut self, b: &[u8]) -> Result<usize, ParseError> {
        debug_assert!(b.len() >= MAX_HDR_LEN);
        match b[0] >> 6 {
            0 | 1 | 2 => {
                let (len, sz) = Length::plain(b)?;
                self.len = len;
                Ok(sz)
            }
            _ => match b[0] {
                0xC0 => {
                    self.ival = endian::s8(&b[1..]);
                    self.enc_width = 1;
                    Ok(2)
                }
                0xC1 => {
                    self.ival = endian::s16(&b[1..]);
                    self.enc_width = 2;
                    Ok(3)
                }
                0xC2 => {
                    self.ival = endian::s32(&b[1..]);
                    self.enc_width = 4;
                    Ok(5)
                }
                0xC3 => {
                    let (zlen, sz1) = Length::plain(&b[1..])?;
                    let (len, sz2) = Length::plain(&b[1 + sz1..])?;
                    self.zlen = zlen;
                    self.len = len;
                    self.is_lzf = true;
                    Ok(1 + sz1 + sz2)
                }
                _ => Err(ParseError::BadHeader("reserved length prefix")),
            },
        }
    }

    /// A plain (non-immediate, non-compressed) length.
    fn plain(b: &[u8]) -> Result<(u64, usize), ParseError> {
        match b[0] >> 6 {
            0 => Ok((u64::from(b[0] & 0x3F), 1)),
            1 => Ok(((u64::from(b[0] & 0x3F) << 8) | u64::from(b[1]), 2)),
            2 => match b[0] {
                0x80 => Ok((u64::from(endian::be32(&b[1..])), 5)),
                0x81 => Ok((endian::be64(&b[1..]), 9)),
                _ => Err(ParseError::BadHeader("reserved length prefix")),
            },
            _ => Err(ParseError::BadHeader("length expected, found immediate")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn read(data: &[u8]) -> Result<(Length, u64), ParseError> {
        let mut c = Cursor::new(Bytes::copy_from_slice(data));
        let l = Length::read(&mut c)?;
        Ok((l, c.stream_offset()))
    }

    #[test]
    fn six_bit() {
        let (l, sz) = read(&[0x00]).unwrap();
        assert_eq!((l.len, sz), (0, 1));
        let (l, sz) = read(&[0x3F]).unwrap();
        assert_eq!((l.len, sz), (63, 1));
        assert!(!l.is_enc() && !l.is_lzf);
    }

    #[test]
    fn fourteen_bit_big_endian() {
        let (l, sz) = read(&[0x40, 0x00]).unwrap();
        assert_eq!((l.len, sz), (0, 2));
        let (l, sz) = read(&[0x7F, 0xFF]).unwrap();
        assert_eq!((l.len, sz), (16383, 2));
        let (l, _) = read(&[0x41, 0x2C]).unwrap();
        assert_eq!(l.len, 300);
    }

    #[test]
    fn wide_lengths_big_endian() {
        let (l, sz) = read(&[0x80, 0x00, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!((l.len, sz), (65536, 5));
        let (l, sz) = read(&[0x81, 0, 0, 0, 1, 0, 0, 0, 0]).unwrap();
        assert_eq!((l.len, sz), (1 << 32, 9));
    }

    #[test]
    fn immediates_little_endian() {
        let (l, sz) = read(&[0xC0, 0xFF]).unwrap();
        assert_eq!((l.ival, l.enc_width, sz), (-1, 1, 2));
        let (l, sz) = read(&[0xC1, 0x39, 0x30]).unwrap();
        assert_eq!((l.ival, l.enc_width, sz), (12345, 2, 3));
        let (l, sz) = read(&[0xC2, 0x00, 0xCA, 0x9A, 0x3B]).unwrap();
        assert_eq!((l.ival, l.enc_width, sz), (1_000_000_000, 4, 5));
        assert!(l.is_enc());
    }

    #[test]
    fn lzf_pair() {
        let (l, sz) = read(&[0xC3, 0x06, 0x41, 0x00]).unwrap();
        assert!(l.is_lzf);
        assert_eq!((l.zlen, l.len, sz), (6, 256, 4));
    }

    #[test]
    fn lzf_rejects_nesting_and_immediates() {
        assert!(matches!(read(&[0xC3, 0xC3, 0x01, 0x01]), Err(ParseError::BadHeader(_))));
        assert!(matches!(read(&[0xC3, 0xC0, 0x05, 0x01]), Err(ParseError::BadHeader(_))));
        assert!(matches!(read(&[0xC3, 0x06, 0xC1, 0x01, 0x00]), Err(ParseError::BadHeader(_))));
    }

    #[test]
    fn reserved_prefixes_rejected() {
        for b in [0x82u8, 0x90, 0xBF, 0xC4, 0xFF] {
            assert!(matches!(read(&[b, 0, 0]), Err(ParseError::BadHeader(_))), "{b:#x}");
        }
    }

    #[test]
    fn truncated_header_leaves_cursor_in_place() {
        let mut c = Cursor::new(Bytes::copy_from_slice(&[0x81, 1, 2, 3]));
        let mut l = Length::default();
        assert_eq!(l.decode(&mut c), Err(ParseError::Truncated));
        assert_eq!(c.avail(), 4);
    }

    #[test]
    fn consume_plain_and_compressed() {
        let mut c = Cursor::new(Bytes::copy_from_slice(b"\x05helloRest"));
        let l = Length::read(&mut c).unwrap();
        assert_eq!(l.consume(&mut c).unwrap(), &b"hello"[..]);
        assert_eq!(c.peek(4), b"Rest");

        // C3 <zlen=6> <len=5> [literal-run "hello"]
        let mut c = Cursor::new(Bytes::copy_from_slice(&[
            0xC3, 0x06, 0x05, 0x04, b'h', b'e', b'l', b'l', b'o',
        ]));
        let l = Length::read(&mut c).unwrap();
        assert_eq!(l.consume(&mut c).unwrap(), &b"hello"[..]);
    }

    #[test]
    fn consume_rejects_immediate() {
        let mut c = Cursor::new(Bytes::copy_from_slice(&[0xC0, 0x07]));
        let l = Length::read(&mut c).unwrap();
        assert!(matches!(l.consume(&mut c), Err(ParseError::BadHeader(_))));
    }
}
