// Listpack traversal.
//
// The listpack supersedes the ziplist inside stream records: a 6-byte
// header, entries, a 0xFF terminator. Entries drop the previous-length
// prefix and instead append a variable-width back-length after the
// payload, sized by the entry's own length. Small integers pack into the
// code byte; everything else follows the code inline.

use bytes::Bytes;

use crate::rdb::endian::{le16, le32, s13, s16, s24, s32, s64};
use crate::rdb::types::PackValue;
use crate::rdb::ParseError;

/// Header: total bytes (le32), entry count (le16).
const LP_HDR_LEN: usize = 6;

/// Width of the back-length field trailing an entry of `len` bytes.
#[inline]
pub(crate) fn backlen_width(len: usize) -> usize {
    if len < 1 << 7 {
        1
    } else if len < 1 << 14 {
        2
    } else if len < 1 << 21 {
        3
    } else if len < 1 << 28 {
        4
    } else {
        5
    }
}

/// Forward walker over a listpack blob, same contract as
/// [`ZipList`](crate::rdb::ZipList): terminator ends iteration, entries
/// crossing the declared end are a [`ParseError::PackOverrun`], and
/// reserved codes are a [`ParseError::BadHeader`].
pub struct ListPack {
    buf: Bytes,
    pos: usize,
    end: usize,
    lplen: u16,
    done: bool,
}

impl ListPack {
    pub fn init(buf: Bytes) -> Result<ListPack, ParseError> {
        if buf.len() < LP_HDR_LEN {
            return Err(ParseError::Truncated);
        }
        let lpbytes = le32(&buf) as usize;
        if lpbytes < LP_HDR_LEN + 1 || lpbytes > buf.len() {
            return Err(ParseError::Truncated);
        }
        let lplen = le16(&buf[4..]);
        Ok(ListPack {
            buf,
            pos: LP_HDR_LEN,
            end: lpbytes,
            lplen,
            done: false,
        })
    }

    /// Entry count from the header, saturating at `u16::MAX` on the wire.
    #[inline]
    pub fn declared_len(&self) -> u16 {
        self.lplen
    }

    /// Pulls the next element and requires it to be an integer one.
    /// Stream headers store their counters this way.
    pub fn expect_int(&mut self) -> Result<i64, ParseError> {
        match self.next() {
            Some(Ok(PackValue { data: None, ival })) => Ok(ival),
            Some(Ok(_)) => Err(ParseError::BadHeader("expected integer element")),
            Some(Err(e)) => Err(e),
            None => Err(ParseError::BadHeader("expected integer element")),
        }
    }

    fn step(&mut self) -> Result<Option<PackValue>, ParseError> {
        if self.pos >= self.end {
            return Err(ParseError::PackOverrun);
        }
        let code = self.buf[self.pos];
        // (header + payload) length; the back-length width derives from it
        let mut entry_len;
        let val = if code < 0x80 {
            entry_len = 1;
            PackValue::int(i64::from(code))
        } else if code & 0xC0 == 0x80 {
            let len = (code & 0x3F) as usize;
            entry_len = 1 + len;
            self.take_str(1, len)?
        } else if code & 0xE0 == 0xC0 {
            // 13-bit value spans the code byte itself
            if self.end - self.pos < 2 {
                return Err(ParseError::PackOverrun);
            }
            entry_len = 2;
            PackValue::int(s13(&self.buf[self.pos..]))
        } else if code & 0xF0 == 0xE0 {
            if self.end - self.pos < 2 {
                return Err(ParseError::PackOverrun);
            }
            let len = ((code & 0x0F) as usize) << 8 | self.buf[self.pos + 1] as usize;
            entry_len = 2 + len;
            self.take_str(2, len)?
        } else {
            match code {
                0xF0 => {
                    if self.end - self.pos < 5 {
                        return Err(ParseError::PackOverrun);
                    }
                    let len = le32(&self.buf[self.pos + 1..]) as usize;
                    entry_len = 5 + len;
                    self.take_str(5, len)?
                }
                0xF1 => {
                    entry_len = 3;
                    PackValue::int(self.take_int(3, s16)?)
                }
                0xF2 => {
                    entry_len = 4;
                    PackValue::int(self.take_int(4, s24)?)
                }
                0xF3 => {
                    entry_len = 5;
                    PackValue::int(self.take_int(5, s32)?)
                }
                0xF4 => {
                    entry_len = 9;
                    PackValue::int(self.take_int(9, s64)?)
                }
                0xFF => return Ok(None),
                _ => return Err(ParseError::BadHeader("listpack entry code")),
            }
        };
        entry_len += backlen_width(entry_len);
        if self.end - self.pos < entry_len {
            return Err(ParseError::PackOverrun);
        }
        self.pos += entry_len;
        Ok(Some(val))
    }

    /// String payload of `len` bytes after an `hdr`-byte code.
    fn take_str(&self, hdr: usize, len: usize) -> Result<PackValue, ParseError> {
        let start = self.pos + hdr;
        if self.end < start || self.end - start < len {
            return Err(ParseError::PackOverrun);
        }
        Ok(PackValue::str(self.buf.slice(start..start + len)))
    }

    /// Integer entry of `width` total bytes: one code byte, then the value.
    fn take_int(&self, width: usize, unpack: fn(&[u8]) -> i64) -> Result<i64, ParseError> {
        if self.end - self.pos < width {
            return Err(ParseError::PackOverrun);
        }
        Ok(unpack(&self.buf[self.pos + 1..]))
    }
}

impl Iterator for ListPack {
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
