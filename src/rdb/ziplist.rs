// Ziplist traversal.
//
// A ziplist is a flat byte blob: a 10-byte header, back-to-back entries,
// and a 0xFF terminator. Each entry carries the previous entry's length
// (for reverse walks, skipped here), then a code byte that selects a
// string length width or an immediate integer width. Hash and zset blobs
// alternate field/value entries; list blobs hold one entry per element.

use bytes::Bytes;

use crate::rdb::endian::{be32, s16, s24, s32, s64, s8};
use crate::rdb::types::PackValue;
use crate::rdb::ParseError;

/// Header: total bytes (le32), tail offset (le32), entry count (le16).
const ZL_HDR_LEN: usize = 10;

/// Forward walker over a ziplist blob. Yields entries in order; the
/// terminator ends iteration, and any entry that crosses the declared
/// end of the blob is a [`ParseError::PackOverrun`].
pub struct ZipList {
    buf: Bytes,
    /// Offset of the next unread entry.
    pos: usize,
    /// Declared end of the list (`zlbytes`), not the buffer end.
    end: usize,
    zllen: u16,
    done: bool,
}

impl ZipList {
    /// Validates the header. The declared size must cover the header and
    /// terminator and fit inside the blob.
    pub fn init(buf: Bytes) -> Result<ZipList, ParseError> {
        if buf.len() < ZL_HDR_LEN {
            return Err(ParseError::Truncated);
        }
        let zlbytes = crate::rdb::endian::le32(&buf) as usize;
        if zlbytes < ZL_HDR_LEN + 1 || zlbytes > buf.len() {
            return Err(ParseError::Truncated);
        }
        let zllen = crate::rdb::endian::le16(&buf[8..]);
        Ok(ZipList {
            buf,
            pos: ZL_HDR_LEN,
            end: zlbytes,
            zllen,
            done: false,
        })
    }

    /// Entry count from the header. Saturates at `u16::MAX` on the wire
    /// for longer lists, so treat large values as a hint.
    #[inline]
    pub fn declared_len(&self) -> u16 {
        self.zllen
    }

    fn step(&mut self) -> Result<Option<PackValue>, ParseError> {
        if self.pos >= self.end {
            return Err(ParseError::PackOverrun);
        }
        // Previous-entry length: 0xFF terminates, 0xFE widens to 5 bytes.
        let prev = self.buf[self.pos];
        if prev == 0xFF {
            return Ok(None);
        }
        let mut p = self.pos + if prev == 0xFE { 5 } else { 1 };
        if p >= self.end {
            return Err(ParseError::PackOverrun);
        }

        let code = self.buf[p];
        p += 1;
        let val = match code >> 6 {
            0 => self.take_str(&mut p, (code & 0x3F) as usize)?,
            1 => {
                if p >= self.end {
                    return Err(ParseError::PackOverrun);
                }
                let len = ((code & 0x3F) as usize) << 8 | self.buf[p] as usize;
                p += 1;
                self.take_str(&mut p, len)?
            }
            _ => match code {
                0x80 => {
                    if p + 4 > self.end {
                        return Err(ParseError::PackOverrun);
                    }
                    let len = be32(&self.buf[p..]) as usize;
                    p += 4;
                    self.take_str(&mut p, len)?
                }
                0xC0 => PackValue::int(self.take_int(&mut p, 2, s16)?),
                0xD0 => PackValue::int(self.take_int(&mut p, 4, s32)?),
                0xE0 => PackValue::int(self.take_int(&mut p, 8, s64)?),
                0xF0 => PackValue::int(self.take_int(&mut p, 3, s24)?),
                0xFE => PackValue::int(self.take_int(&mut p, 1, s8)?),
                0xF1..=0xFD => PackValue::int(i64::from(code & 0x0F) - 1),
                0xFF => return Ok(None),
                _ => return Err(ParseError::BadHeader("ziplist entry code")),
            },
        };
        self.pos = p;
        Ok(Some(val))
    }

    fn take_str(&self, p: &mut usize, len: usize) -> Result<PackValue, ParseError> {
        if self.end - *p < len {
            return Err(ParseError::PackOverrun);
        }
        let data = self.buf.slice(*p..*p + len);
        *p += len;
        Ok(PackValue::str(data))
    }

    fn take_int(
        &self,
        p: &mut usize,
        width: usize,
        unpack: fn(&[u8]) -> i64,
    ) -> Result<i64, ParseError> {
        if self.end - *p < width {
            return Err(ParseError::PackOverrun);
        }
        let v = unpack(&self.buf[*p..]);
        *p += width;
        Ok(v)
    }
}

impl Iterator for ZipList {
    type Item = Result<PackValue, ParseError>;

    /// Fuses after the terminator or the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(v)) => Some(Ok(v)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
