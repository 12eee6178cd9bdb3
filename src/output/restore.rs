// RESP RESTORE command emission.
//
// The decoder narrates values element by element, but RESTORE wants the
// record's raw serialized bytes. So this sink only captures positions
// and metadata from the hooks (type byte offset, key, expiration); after
// each record the driver calls `emit`, which slices the original input,
// reframes it with the dump version and CRC trailer, and writes
//
//   RESTORE key ttl <type><body><ver><crc> [REPLACE] [ABSTTL]
//                                          [IDLETIME secs] [FREQ lfu]
//
// as a RESP array. The output pipes straight into `redis-cli --pipe`.

use std::io::{self, Write};

use bytes::Bytes;

use crate::rdb::cursor::Cursor;
use crate::rdb::encoder;
use crate::rdb::length::Length;
use crate::rdb::{RecordType, Sink, Value};

/// `Sink` that replays keys as RESTORE commands.
pub struct RestoreWriter<W: Write> {
    out: W,
    /// The buffer the decoder is walking; `emit` slices record bytes
    /// out of it by offset.
    input: Bytes,
    replace: bool,
    ttl_ms: u64,
    idle: u64,
    freq: u8,
    type_offset: u64,
    key: Bytes,
    /// Set by `start_key`, so filtered-out records never emit.
    matched: bool,
    count: u64,
}

impl<W: Write> RestoreWriter<W> {
    pub fn new(input: Bytes, out: W) -> RestoreWriter<W> {
        RestoreWriter {
            out,
            input,
            replace: false,
            ttl_ms: 0,
            idle: 0,
            freq: 0,
            type_offset: 0,
            key: Bytes::new(),
            matched: false,
            count: 0,
        }
    }

    /// Add `REPLACE` so existing keys are overwritten instead of
    /// failing the command.
    pub fn replace(mut self, yes: bool) -> RestoreWriter<W> {
        self.replace = yes;
        self
    }

    /// Commands emitted so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes the RESTORE command for the record that just finished.
    /// `end` is the decoder's position after the record body and
    /// `container` tells whether a key precedes that body on the wire.
    /// Call once per decoded record; a record whose key was filtered
    /// out resets state and writes nothing.
    pub fn emit(&mut self, end: u64, container: bool) -> io::Result<()> {
        if !self.matched {
            self.reset();
            return Ok(());
        }
        let start = self.type_offset;
        if start >= end || end as usize > self.input.len() {
            log::warn!("record bytes [{start}, {end}) are not in the buffer, skipping restore");
            self.reset();
            return Ok(());
        }
        let tbyte = self.input[start as usize];
        let mut body_start = start + 1;
        if container {
            // step over the key: its length header plus the wire payload,
            // which for a compressed key is the compressed size
            let mut cur = Cursor::new(self.input.slice(body_start as usize..end as usize));
            match Length::read(&mut cur) {
                Ok(l) => {
                    let wire = if l.is_lzf {
                        l.zlen
                    } else if l.is_enc() {
                        0
                    } else {
                        l.len
                    };
                    body_start += cur.stream_offset() + wire;
                }
                Err(_) => {
                    log::warn!("key header at offset {body_start} did not re-parse, skipping restore");
                    self.reset();
                    return Ok(());
                }
            }
        }
        if body_start >= end {
            log::warn!("record bytes [{body_start}, {end}) are not in the buffer, skipping restore");
            self.reset();
            return Ok(());
        }

        let body = &self.input[body_start as usize..end as usize];
        let mut blob = Vec::with_capacity(body.len() + 11);
        blob.push(tbyte);
        blob.extend_from_slice(body);
        let blob = encoder::seal_dump(blob);

        let ttl = self.ttl_ms.to_string();
        let mut argc = 4;
        if self.replace {
            argc += 1;
        }
        if self.ttl_ms != 0 {
            argc += 1; // ABSTTL: stored expirations are absolute timestamps
        }
        if self.idle != 0 {
            argc += 2;
        }
        if self.freq != 0 {
            argc += 2;
        }
        write!(self.out, "*{argc}\r\n")?;
        self.bulk(b"RESTORE")?;
        let key = self.key.clone();
        self.bulk(&key)?;
        self.bulk(ttl.as_bytes())?;
        self.bulk(&blob)?;
        if self.replace {
            self.bulk(b"REPLACE")?;
        }
        if self.ttl_ms != 0 {
            self.bulk(b"ABSTTL")?;
        }
        if self.idle != 0 {
            let secs = self.idle.to_string();
            self.bulk(b"IDLETIME")?;
            self.bulk(secs.as_bytes())?;
        }
        if self.freq != 0 {
            let lfu = self.freq.to_string();
            self.bulk(b"FREQ")?;
            self.bulk(lfu.as_bytes())?;
        }
        self.out.flush()?;
        self.count += 1;
        self.reset();
        Ok(())
    }

    fn bulk(&mut self, data: &[u8]) -> io::Result<()> {
        write!(self.out, "${}\r\n", data.len())?;
        self.out.write_all(data)?;
        self.out.write_all(b"\r\n")
    }

    fn reset(&mut self) {
        self.matched = false;
        self.ttl_ms = 0;
        self.idle = 0;
        self.freq = 0;
    }
}

impl<W: Write> Sink for RestoreWriter<W> {
    fn idle(&mut self, secs: u64) {
        self.idle = secs;
    }

    fn freq(&mut self, lfu: u8) {
        self.freq = lfu;
    }

    fn expired_ms(&mut self, ms: u64) {
        self.ttl_ms = ms;
    }

    fn start_type(&mut self, _rtype: RecordType, offset: u64) {
        self.matched = false;
        self.type_offset = offset;
    }

    fn start_key(&mut self, key: &Value) {
        self.matched = true;
        self.key = match key {
            Value::Str(s) => s.clone(),
            Value::Int(i) => Bytes::from(i.to_string()),
            _ => Bytes::new(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_string_v() -> Vec<u8> {
        encoder::seal_dump(vec![0x00, 0x01, b'v'])
    }

    #[test]
    fn container_record_becomes_restore() {
        let input = Bytes::from_static(b"REDIS0009\x00\x01k\x01v");
        let mut w = RestoreWriter::new(input, Vec::new());
        w.start_type(RecordType::String, 9);
        w.start_key(&Value::Str(Bytes::from_static(b"k")));
        w.emit(14, true).unwrap();

        let blob = sealed_string_v();
        let mut want = format!("*4\r\n$7\r\nRESTORE\r\n$1\r\nk\r\n$1\r\n0\r\n${}\r\n", blob.len())
            .into_bytes();
        want.extend_from_slice(&blob);
        want.extend_from_slice(b"\r\n");
        assert_eq!(w.count(), 1);
        assert_eq!(w.into_inner(), want);
    }

    #[test]
    fn replace_adds_the_fifth_arg() {
        let input = Bytes::from_static(b"REDIS0009\x00\x01k\x01v");
        let mut w = RestoreWriter::new(input, Vec::new()).replace(true);
        w.start_type(RecordType::String, 9);
        w.start_key(&Value::Str(Bytes::from_static(b"k")));
        w.emit(14, true).unwrap();

        let blob = sealed_string_v();
        let mut want = format!("*5\r\n$7\r\nRESTORE\r\n$1\r\nk\r\n$1\r\n0\r\n${}\r\n", blob.len())
            .into_bytes();
        want.extend_from_slice(&blob);
        want.extend_from_slice(b"\r\n$7\r\nREPLACE\r\n");
        assert_eq!(w.into_inner(), want);
    }

    #[test]
    fn dump_payload_reseals_to_the_same_bytes() {
        let input = Bytes::from(sealed_string_v());
        let mut w = RestoreWriter::new(input.clone(), Vec::new());
        w.start_type(RecordType::String, 0);
        w.start_key(&Value::Absent);
        w.emit(3, false).unwrap();

        let mut want = format!("*4\r\n$7\r\nRESTORE\r\n$0\r\n\r\n$1\r\n0\r\n${}\r\n", input.len())
            .into_bytes();
        want.extend_from_slice(&input);
        want.extend_from_slice(b"\r\n");
        assert_eq!(w.into_inner(), want);
    }

    #[test]
    fn filtered_records_write_nothing() {
        let input = Bytes::from_static(b"REDIS0009\x00\x01k\x01v");
        let mut w = RestoreWriter::new(input, Vec::new());
        w.start_type(RecordType::String, 9);
        // no start_key: the filter sent it to the null sink
        w.emit(14, true).unwrap();
        assert_eq!(w.count(), 0);
        assert!(w.into_inner().is_empty());
    }

    #[test]
    fn expiration_and_idle_become_options() {
        let input = Bytes::from_static(b"REDIS0009\x00\x01k\x01v");
        let mut w = RestoreWriter::new(input, Vec::new());
        w.expired_ms(1700000000000);
        w.idle(30);
        w.start_type(RecordType::String, 9);
        w.start_key(&Value::Str(Bytes::from_static(b"k")));
        w.emit(14, true).unwrap();

        let blob = sealed_string_v();
        let mut want = format!(
            "*7\r\n$7\r\nRESTORE\r\n$1\r\nk\r\n$13\r\n1700000000000\r\n${}\r\n",
            blob.len()
        )
        .into_bytes();
        want.extend_from_slice(&blob);
        want.extend_from_slice(b"\r\n$6\r\nABSTTL\r\n$8\r\nIDLETIME\r\n$2\r\n30\r\n");
        assert_eq!(w.into_inner(), want);
    }

    #[test]
    fn state_resets_between_records() {
        let input = Bytes::from_static(b"REDIS0009\x00\x01k\x01v\x00\x01j\x01w");
        let mut w = RestoreWriter::new(input, Vec::new());
        w.expired_ms(5000);
        w.start_type(RecordType::String, 9);
        w.start_key(&Value::Str(Bytes::from_static(b"k")));
        w.emit(14, true).unwrap();
        w.start_type(RecordType::String, 14);
        w.start_key(&Value::Str(Bytes::from_static(b"j")));
        w.emit(19, true).unwrap();

        let out = w.into_inner();
        let text = String::from_utf8_lossy(&out);
        // only the first command carries the expiration
        assert_eq!(text.matches("ABSTTL").count(), 1);
        assert_eq!(text.matches("RESTORE").count(), 2);
    }

    #[test]
    fn compressed_key_span_is_the_wire_span() {
        // key is lzf([hello]) = 9 wire bytes, value is "v"
        let mut input = b"REDIS0009\x00".to_vec();
        input.extend_from_slice(&[0xC3, 0x06, 0x05, 0x04]);
        input.extend_from_slice(b"hello");
        input.extend_from_slice(b"\x01v");
        let end = input.len() as u64;
        let mut w = RestoreWriter::new(Bytes::from(input), Vec::new());
        w.start_type(RecordType::String, 9);
        w.start_key(&Value::Str(Bytes::from_static(b"hello")));
        w.emit(end, true).unwrap();

        let blob = sealed_string_v();
        let mut want = format!(
            "*4\r\n$7\r\nRESTORE\r\n$5\r\nhello\r\n$1\r\n0\r\n${}\r\n",
            blob.len()
        )
        .into_bytes();
        want.extend_from_slice(&blob);
        want.extend_from_slice(b"\r\n");
        assert_eq!(w.into_inner(), want);
    }

    #[test]
    fn inverted_offsets_are_skipped() {
        let input = Bytes::from_static(b"REDIS0009\x00\x01k\x01v");
        let mut w = RestoreWriter::new(input, Vec::new());
        w.start_type(RecordType::String, 9);
        w.start_key(&Value::Str(Bytes::from_static(b"k")));
        w.emit(9, true).unwrap();
        assert_eq!(w.count(), 0);
        assert!(w.into_inner().is_empty());
    }
}
