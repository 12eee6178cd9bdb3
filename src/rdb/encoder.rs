// Wire writers: length headers, immediate integers, pack builders, and
// the container/dump frames. Everything written here is readable by the
// decoding side of this crate; the restore path reuses the dump seal to
// frame extracted records.

use crate::rdb::crc64;
use crate::rdb::listpack::backlen_width;
use crate::rdb::types::DUMP_VERSION;

/// Encoded size of a length header for `x`.
pub fn len_size(x: u64) -> usize {
    if x < 1 << 6 {
        1
    } else if x < 1 << 14 {
        2
    } else if x <= u64::from(u32::MAX) {
        5
    } else {
        9
    }
}

/// Length header: 6-bit and 14-bit forms inline, wider sizes carry a
/// big-endian word after a marker byte.
pub fn write_len(out: &mut Vec<u8>, x: u64) {
    if x < 1 << 6 {
        out.push(x as u8);
    } else if x < 1 << 14 {
        out.push(0x40 | (x >> 8) as u8);
        out.push(x as u8);
    } else if x <= u64::from(u32::MAX) {
        out.push(0x80);
        out.extend_from_slice(&(x as u32).to_be_bytes());
    } else {
        out.push(0x81);
        out.extend_from_slice(&x.to_be_bytes());
    }
}

/// Length-prefixed string.
pub fn write_str(out: &mut Vec<u8>, data: &[u8]) {
    write_len(out, data.len() as u64);
    out.extend_from_slice(data);
}

/// Immediate integer in the narrowest of the three encoded widths, or the
/// decimal text of values an i32 cannot hold.
pub fn write_int(out: &mut Vec<u8>, v: i64) {
    if i64::from(v as i8) == v {
        out.push(0xC0);
        out.push(v as u8);
    } else if i64::from(v as i16) == v {
        out.push(0xC1);
        out.extend_from_slice(&(v as i16).to_le_bytes());
    } else if i64::from(v as i32) == v {
        out.push(0xC2);
        out.extend_from_slice(&(v as i32).to_le_bytes());
    } else {
        write_str(out, v.to_string().as_bytes());
    }
}

/// Snapshot header for a format version, ready to take records.
pub fn container(ver: u32) -> Vec<u8> {
    format!("REDIS{ver:04}").into_bytes()
}

/// Terminates a snapshot body with the end marker and its CRC trailer.
pub fn seal_container(mut body: Vec<u8>) -> Vec<u8> {
    body.push(0xFF);
    let crc = crc64::update(0, &body);
    body.extend_from_slice(&crc.to_le_bytes());
    body
}

/// Appends the dump trailer: payload version, then the CRC over payload
/// and version together.
pub fn seal_dump(mut payload: Vec<u8>) -> Vec<u8> {
    payload.extend_from_slice(&DUMP_VERSION.to_le_bytes());
    let crc = crc64::update(0, &payload);
    payload.extend_from_slice(&crc.to_le_bytes());
    payload
}

// ---------------------------------------------------------------------------
// Pack builders
// ---------------------------------------------------------------------------

/// Builds a ziplist blob: 10-byte header, `[prev][code][data]` entries, a
/// terminator, with the header patched on `finish`. Entries are written as
/// strings; the walker hands back whatever the bytes spell.
pub struct ZipListBuilder {
    buf: Vec<u8>,
    prev_len: usize,
    tail: u32,
    count: u64,
}

impl Default for ZipListBuilder {
    fn default() -> ZipListBuilder {
        ZipListBuilder::new()
    }
}

impl ZipListBuilder {
    pub fn new() -> ZipListBuilder {
        ZipListBuilder {
            buf: vec![0; 10],
            prev_len: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn push_str(&mut self, data: &[u8]) {
        let start = self.buf.len();
        self.tail = start as u32;
        if self.prev_len < 254 {
            self.buf.push(self.prev_len as u8);
        } else {
            self.buf.push(0xFE);
            self.buf.extend_from_slice(&(self.prev_len as u32).to_le_bytes());
        }
        let sz = data.len();
        if sz < 64 {
            self.buf.push(sz as u8);
        } else if sz < 16384 {
            self.buf.push(0x40 | (sz >> 8) as u8);
            self.buf.push(sz as u8);
        } else {
            self.buf.push(0x80);
            self.buf.extend_from_slice(&(sz as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(data);
        self.prev_len = self.buf.len() - start;
        self.count += 1;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(0xFF);
        let total = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&total.to_le_bytes());
        self.buf[4..8].copy_from_slice(&self.tail.to_le_bytes());
        let n = self.count.min(0xFFFF) as u16;
        self.buf[8..10].copy_from_slice(&n.to_le_bytes());
        self.buf
    }
}

/// Builds a listpack blob: 6-byte header, `[code][data][backlen]` entries,
/// terminator, header patched on `finish`. Integers take the narrowest
/// immediate form.
pub struct ListPackBuilder {
    buf: Vec<u8>,
    count: u64,
}

impl Default for ListPackBuilder {
    fn default() -> ListPackBuilder {
        ListPackBuilder::new()
    }
}

impl ListPackBuilder {
    pub fn new() -> ListPackBuilder {
        ListPackBuilder {
            buf: vec![0; 6],
            count: 0,
        }
    }

    pub fn push_str(&mut self, data: &[u8]) {
        let start = self.buf.len();
        let sz = data.len();
        if sz < 64 {
            self.buf.push(0x80 | sz as u8);
        } else if sz < 4096 {
            self.buf.push(0xE0 | (sz >> 8) as u8);
            self.buf.push(sz as u8);
        } else {
            self.buf.push(0xF0);
            self.buf.extend_from_slice(&(sz as u32).to_le_bytes());
        }
        self.buf.extend_from_slice(data);
        self.push_backlen(start);
        self.count += 1;
    }

    pub fn push_int(&mut self, v: i64) {
        let start = self.buf.len();
        if (0..=127).contains(&v) {
            self.buf.push(v as u8);
        } else if (-4096..4096).contains(&v) {
            self.buf.push(0xC0 | ((v >> 8) & 0x1F) as u8);
            self.buf.push(v as u8);
        } else if i64::from(v as i16) == v {
            self.buf.push(0xF1);
            self.buf.extend_from_slice(&(v as i16).to_le_bytes());
        } else if (-(1 << 23)..1 << 23).contains(&v) {
            self.buf.push(0xF2);
            self.buf.extend_from_slice(&(v as i32).to_le_bytes()[..3]);
        } else if i64::from(v as i32) == v {
            self.buf.push(0xF3);
            self.buf.extend_from_slice(&(v as i32).to_le_bytes());
        } else {
            self.buf.push(0xF4);
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.push_backlen(start);
        self.count += 1;
    }

    /// Back-length varint: top bits first, lower groups flagged with the
    /// high bit so a reverse reader can find the entry start.
    fn push_backlen(&mut self, start: usize) {
        let entry_len = self.buf.len() - start;
        let width = backlen_width(entry_len);
        let at = self.buf.len();
        self.buf.resize(at + width, 0);
        let mut val = entry_len;
        for i in 1..width {
            self.buf[at + width - i] = 0x80 | (val & 0x7F) as u8;
            val >>= 7;
        }
        self.buf[at] = val as u8;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(0xFF);
        let total = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&total.to_le_bytes());
        let n = self.count.min(0xFFFF) as u16;
        self.buf[4..6].copy_from_slice(&n.to_le_bytes());
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
