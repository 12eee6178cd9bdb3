// Record decoding.
//
// `Decoder` walks one input buffer (a snapshot container or a single dump
// payload), validates the framing, and narrates every record to a `Sink`.
// Nothing is buffered into intermediate collections: container members
// reach the sink one at a time, in wire order, with 1-based indices and
// the declared count where the encoding states one.
//
// Filtering happens at the key boundary. A rejected key's events are
// routed to a discarding sink, but the decode work is identical either
// way because the byte stream only reveals the next record's position
// once the current one is fully parsed.

use bytes::Bytes;

use crate::filter::KeyFilter;
use crate::rdb::crc64;
use crate::rdb::cursor::Cursor;
use crate::rdb::endian::{be32, be64, f64le, le16, le32, le64, s16, s32, s64, s8};
use crate::rdb::length::Length;
use crate::rdb::listpack::ListPack;
use crate::rdb::stream::{chunk_key_id, EntryScratch, StreamChunk, StreamEntry};
use crate::rdb::types::{
    ConsPendInfo, ConsumerInfo, EntryFlags, GroupInfo, HashEntry, ListElem, PendInfo, RecordType,
    SetMember, StreamId, StreamInfo, StreamPart, Value, ZSetMember, CONTAINER_HDR_LEN,
    CONTAINER_MAGIC, DUMP_VERSION, META_AUX, META_DBRESIZE, META_DBSELECT, META_EOF,
    META_EXPIRE_MS, META_EXPIRE_SEC, META_FIRST, META_FREQ, META_IDLE, META_MODULE_AUX,
};
use crate::rdb::ziplist::ZipList;
use crate::rdb::ParseError;

/// Receives the decoded stream. Every hook has a no-op default, so a sink
/// implements only what it cares about.
///
/// Ordering contract per record: `start_type`, then `start_key`, then the
/// element hooks, then `end_key`. Metadata hooks (`idle`, `freq`, `aux`,
/// `db_resize`, `expired_ms`, `db_select`) fire between records and apply
/// to the next key. Stream records additionally bracket their repeated
/// sections with `stream_start`/`stream_end` pairs; the list parts fire
/// only when non-empty, while `Group` and `Consumer` end markers close the
/// records opened by `stream_group` and `stream_consumer`.
pub trait Sink {
    /// First event of a decode run.
    fn begin(&mut self) {}
    /// Last event; `ok` is false when decoding stopped on an error.
    fn finish(&mut self, _ok: bool) {}

    fn idle(&mut self, _secs: u64) {}
    fn freq(&mut self, _lfu: u8) {}
    fn aux(&mut self, _var: &Value, _val: &Value) {}
    fn db_resize(&mut self, _main: u64, _expires: u64) {}
    /// Expiration for the next key, always in milliseconds.
    fn expired_ms(&mut self, _ms: u64) {}
    fn db_select(&mut self, _db: u64) {}

    /// Fires at the type byte, before the key is read. `offset` is the
    /// input position of that byte, which bounds the record's byte range
    /// together with the next `start_type` or end of decode.
    fn start_type(&mut self, _rtype: RecordType, _offset: u64) {}
    fn start_key(&mut self, _key: &Value) {}
    fn end_key(&mut self) {}

    fn string(&mut self, _value: &Value) {}
    /// Module records surface only their decoded name and version.
    fn module(&mut self, _name: &str) {}
    fn hash(&mut self, _entry: &HashEntry) {}
    fn list(&mut self, _elem: &ListElem) {}
    fn set(&mut self, _member: &SetMember) {}
    fn zset(&mut self, _member: &ZSetMember) {}

    fn stream_start(&mut self, _part: StreamPart) {}
    fn stream_end(&mut self, _part: StreamPart) {}
    fn stream_entry(&mut self, _entry: &StreamEntry<'_>) {}
    fn stream_info(&mut self, _info: &StreamInfo) {}
    fn stream_group(&mut self, _info: &StreamInfo, _group: &GroupInfo) {}
    fn stream_pend(&mut self, _group: &GroupInfo, _pend: &PendInfo) {}
    fn stream_consumer(&mut self, _group: &GroupInfo, _consumer: &ConsumerInfo) {}
    fn stream_consumer_pend(&mut self, _consumer: &ConsumerInfo, _pend: &ConsPendInfo) {}
}

/// Swallows everything. Backs the filtered-out side of key routing.
#[derive(Default)]
pub struct NullSink;

impl Sink for NullSink {}

/// Outcome of one [`Decoder::decode_record`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One record was decoded and delivered.
    Key,
    /// The end-of-stream marker was consumed; the decode is complete.
    Eof,
}

pub struct Decoder<'f, S> {
    cur: Cursor,
    input: Bytes,
    sink: S,
    null: NullSink,
    filter: Option<&'f dyn KeyFilter>,
    selected: bool,
    hdr_done: bool,
    is_rdb_file: bool,
    ver: u32,
    crc: u64,
    keys: u64,
}

impl<'f, S: Sink> Decoder<'f, S> {
    /// Takes ownership of the sink; [`Decoder::into_sink`] gives it back.
    pub fn new(input: Bytes, sink: S) -> Decoder<'f, S> {
        Decoder {
            cur: Cursor::new(input.clone()),
            input,
            sink,
            null: NullSink,
            filter: None,
            selected: true,
            hdr_done: false,
            is_rdb_file: false,
            ver: 0,
            crc: 0,
            keys: 0,
        }
    }

    /// Routes keys rejected by `filter` to a discarding sink. Type markers
    /// and metadata still reach the real sink.
    pub fn with_filter(mut self, filter: &'f dyn KeyFilter) -> Decoder<'f, S> {
        self.filter = Some(filter);
        self
    }

    /// Borrows the sink between decode steps.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Releases the sink, e.g. to flush a writer it owns.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Format version from the container magic or the dump trailer.
    /// Zero until the header is decoded.
    #[inline]
    pub fn version(&self) -> u32 {
        self.ver
    }

    /// True for snapshot containers, false for bare dump payloads.
    #[inline]
    pub fn is_container(&self) -> bool {
        self.is_rdb_file
    }

    /// Trailing CRC-64 as stored, zero when absent or unchecked.
    #[inline]
    pub fn trailer_crc(&self) -> u64 {
        self.crc
    }

    /// Records decoded so far.
    #[inline]
    pub fn key_count(&self) -> u64 {
        self.keys
    }

    /// Input position for error reporting.
    #[inline]
    pub fn position(&self) -> u64 {
        self.cur.input_offset()
    }

    /// True once all input and any decompression overlay is consumed.
    pub fn at_end(&mut self) -> bool {
        self.cur.release();
        self.cur.avail() == 0
    }

    /// Classifies the input and validates the frame. Runs once; later
    /// calls are no-ops.
    ///
    /// A buffer opening with the container magic is a snapshot: the four
    /// ASCII digits after it carry the version and an optional trailer
    /// holds the CRC. Anything else is a dump payload, which ends in a
    /// 2-byte version and an 8-byte CRC, possibly with a trailing newline
    /// from shell capture. A stored CRC of zero means unchecked. A real
    /// mismatch is fatal for dump payloads and a warning for containers,
    /// where decoding can still salvage the readable prefix.
    pub fn decode_header(&mut self) -> Result<(), ParseError> {
        if self.hdr_done {
            return Ok(());
        }
        let avail = self.input.len();
        if avail < 10 {
            return Err(ParseError::Truncated);
        }

        let mut off = 8usize;
        if self.input[..CONTAINER_MAGIC.len()] == CONTAINER_MAGIC[..] {
            self.is_rdb_file = true;
            let mut ver = 0u32;
            for &d in &self.input[5..CONTAINER_HDR_LEN] {
                if !d.is_ascii_digit() {
                    return Err(ParseError::BadVersion(ver));
                }
                ver = ver * 10 + u32::from(d - b'0');
            }
            self.ver = ver;
            if self.input[avail - 9] == 0xFF {
                self.crc = le64(&self.input[avail - 8..]);
            }
        } else {
            let mut ver = u32::from(le16(&self.input[avail - 10..]));
            if ver != u32::from(DUMP_VERSION) && avail > 10 && self.input[avail - 1] == 0x0A {
                ver = u32::from(le16(&self.input[avail - 11..]));
                off = 9;
            }
            self.ver = ver;
            self.crc = le64(&self.input[avail - off..]);
        }

        if self.crc != 0 {
            let calc = crc64::update(0, &self.input[..avail - off]);
            if calc != self.crc {
                log::warn!(
                    "crc64 mismatch: trailer {:#018x}, computed {calc:#018x}",
                    self.crc
                );
                if !self.is_rdb_file {
                    return Err(ParseError::ChecksumMismatch {
                        expected: self.crc,
                        actual: calc,
                    });
                }
            }
        }

        if self.is_rdb_file {
            self.cur
                .advance(CONTAINER_HDR_LEN)
                .ok_or(ParseError::Truncated)?;
        } else {
            // drop the trailer; the end-of-input is then the record bound
            self.cur.truncate(avail - off - 2);
        }
        self.hdr_done = true;
        Ok(())
    }

    /// Decodes metadata up to and including the next record's type byte or
    /// the end-of-stream marker. Deliberately does the header first when
    /// the caller has not.
    pub fn decode_record(&mut self) -> Result<Step, ParseError> {
        self.decode_header()?;
        if self.is_rdb_file {
            if let Some(step) = self.decode_meta()? {
                return Ok(step);
            }
        }

        let b = self.cur.peek(1)[0];
        let rtype = RecordType::from_byte(b).ok_or(ParseError::UnknownType(b))?;
        self.sink.start_type(rtype, self.cur.stream_offset());
        self.cur.advance(1).ok_or(ParseError::Truncated)?;

        let key = if self.is_rdb_file {
            self.decode_rlen()?
        } else {
            Value::Absent
        };

        let rlen = Length::read(&mut self.cur)?;
        if rlen.is_lzf {
            self.cur.decompress(rlen.zlen, rlen.len)?;
        }
        self.decode_body(rtype, &rlen, &key)?;

        self.keys += 1;
        self.cur.release();
        Ok(Step::Key)
    }

    /// Runs the whole input, bracketing the sink with `begin`/`finish`.
    pub fn decode_all(&mut self) -> Result<(), ParseError> {
        self.sink.begin();
        let r = self.run();
        self.sink.finish(r.is_ok());
        r
    }

    fn run(&mut self) -> Result<(), ParseError> {
        loop {
            match self.decode_record()? {
                Step::Eof => return Ok(()),
                Step::Key => {
                    if !self.is_rdb_file && self.at_end() {
                        return Ok(());
                    }
                }
            }
        }
    }

    // -- metadata ----------------------------------------------------------

    /// Container metadata loop. Returns `Some(Eof)` at the end marker,
    /// `None` with the cursor parked on a type byte otherwise.
    fn decode_meta(&mut self) -> Result<Option<Step>, ParseError> {
        while self.cur.avail() > 0 {
            let b = self.cur.peek(1)[0];
            if b < META_FIRST {
                return Ok(None);
            }
            self.cur.advance(1).ok_or(ParseError::Truncated)?;
            match b {
                META_EOF => return Ok(Some(Step::Eof)),
                META_MODULE_AUX => return Err(ParseError::Unsupported("module aux data")),
                META_IDLE => {
                    let secs = self.plain_len("idle time")?;
                    self.sink.idle(secs);
                }
                META_FREQ => {
                    let b = self.take(1)?;
                    self.sink.freq(b[0]);
                }
                META_AUX => {
                    let var = self.decode_rlen()?;
                    let val = self.decode_rlen()?;
                    self.sink.aux(&var, &val);
                }
                META_DBRESIZE => {
                    let main = self.plain_len("hash table size")?;
                    let expires = self.plain_len("hash table size")?;
                    self.sink.db_resize(main, expires);
                }
                META_EXPIRE_MS => {
                    let b = self.take(8)?;
                    self.sink.expired_ms(le64(&b));
                }
                META_EXPIRE_SEC => {
                    let b = self.take(4)?;
                    self.sink.expired_ms(u64::from(le32(&b)) * 1000);
                }
                META_DBSELECT => {
                    let db = self.plain_len("db number")?;
                    self.sink.db_select(db);
                }
                _ => return Err(ParseError::BadHeader("meta opcode")),
            }
        }
        // a container must end at the marker, not at exhaustion
        Err(ParseError::Truncated)
    }

    // -- record bodies -----------------------------------------------------

    fn decode_body(
        &mut self,
        rtype: RecordType,
        rlen: &Length,
        key: &Value,
    ) -> Result<(), ParseError> {
        match rtype {
            RecordType::String => self.decode_string(rlen, key),
            RecordType::List => self.decode_elements(rlen, key),
            RecordType::Set => self.decode_members(rlen, key),
            RecordType::Hash => self.decode_pairs(rlen, key),
            RecordType::ZSet | RecordType::ZSet2 => self.decode_zset(rtype, rlen, key),
            RecordType::SetIntset => self.decode_intset(rlen, key),
            RecordType::HashZipmap => self.decode_zipmap(rlen, key),
            RecordType::ListZiplist | RecordType::ZSetZiplist | RecordType::HashZiplist => {
                self.decode_ziplist(rtype, rlen, key)
            }
            RecordType::ListQuicklist => self.decode_quicklist(rlen, key),
            RecordType::StreamListpack => self.decode_stream(rlen, key),
            RecordType::Module | RecordType::Module2 => self.decode_module(rlen, key),
        }
    }

    fn decode_string(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        self.start_key(key);
        let value = self.decode_str(rlen)?;
        self.out().string(&value);
        self.out().end_key();
        Ok(())
    }

    fn decode_pairs(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        let count = rlen.len;
        self.start_key(key);
        for index in 1..=count {
            let field = self.decode_rlen()?;
            let value = self.decode_rlen()?;
            self.out().hash(&HashEntry {
                field,
                value,
                index,
                count: Some(count),
            });
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_members(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        let count = rlen.len;
        self.start_key(key);
        for index in 1..=count {
            let member = self.decode_rlen()?;
            self.out().set(&SetMember {
                member,
                index,
                count: Some(count),
            });
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_elements(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        let count = rlen.len;
        self.start_key(key);
        for index in 1..=count {
            let value = self.decode_rlen()?;
            self.out().list(&ListElem {
                value,
                index,
                count: Some(count),
            });
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_zset(
        &mut self,
        rtype: RecordType,
        rlen: &Length,
        key: &Value,
    ) -> Result<(), ParseError> {
        let count = rlen.len;
        self.start_key(key);
        for index in 1..=count {
            let member = self.decode_rlen()?;
            let score = if rtype == RecordType::ZSet2 {
                let b = self.take(8)?;
                Value::Double(f64le(&b))
            } else {
                // length-prefixed decimal text, with marker bytes for the
                // values decimal text cannot carry
                let b = self.take(1)?;
                match b[0] {
                    253 => Value::Str(Bytes::from_static(b"nan")),
                    254 => Value::Str(Bytes::from_static(b"inf")),
                    255 => Value::Str(Bytes::from_static(b"-inf")),
                    len => Value::Str(self.take(usize::from(len))?),
                }
            };
            self.out().zset(&ZSetMember {
                member,
                score,
                index,
                count: Some(count),
            });
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_intset(&mut self, _rlen: &Length, key: &Value) -> Result<(), ParseError> {
        self.start_key(key);
        let hdr = self.take(8)?;
        let width = le32(&hdr) as usize;
        let count = u64::from(le32(&hdr[4..]));
        let unpack: fn(&[u8]) -> i64 = match width {
            1 => s8,
            2 => s16,
            4 => s32,
            8 => s64,
            _ => return Err(ParseError::Unsupported("intset element width")),
        };
        let total = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(width))
            .ok_or(ParseError::Truncated)?;
        let data = self.take(total)?;
        for i in 0..count {
            let off = i as usize * width;
            self.out().set(&SetMember {
                member: Value::Int(unpack(&data[off..])),
                index: i + 1,
                count: Some(count),
            });
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_zipmap(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        self.start_key(key);
        let blob = self.take_len(rlen.len)?;
        if blob.is_empty() {
            return Err(ParseError::Truncated);
        }
        // leading count byte saturates; past 253 the real count is unknown
        let count = if blob[0] < 254 {
            Some(u64::from(blob[0]))
        } else {
            None
        };
        let mut p = 1usize;
        let mut index = 0u64;
        while p < blob.len() {
            if blob[p] == 0xFF {
                break;
            }
            let flen = zipmap_len(&blob, &mut p)?;
            let field = take_slice(&blob, &mut p, flen)?;
            let vlen = zipmap_len(&blob, &mut p)?;
            let free = usize::from(*blob.get(p).ok_or(ParseError::Truncated)?);
            p += 1;
            let value = take_slice(&blob, &mut p, vlen + free)?;
            index += 1;
            self.out().hash(&HashEntry {
                field: Value::Str(field),
                value: Value::Str(value.slice(..vlen)),
                index,
                count,
            });
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_ziplist(
        &mut self,
        rtype: RecordType,
        rlen: &Length,
        key: &Value,
    ) -> Result<(), ParseError> {
        self.start_key(key);
        let blob = self.take_len(rlen.len)?;
        let mut zl = ZipList::init(blob)?;
        match rtype {
            RecordType::ListZiplist => {
                let count = u64::from(zl.declared_len());
                let mut index = 0u64;
                for v in zl {
                    index += 1;
                    self.out().list(&ListElem {
                        value: v?.to_value(),
                        index,
                        count: Some(count),
                    });
                }
            }
            RecordType::ZSetZiplist => {
                let count = u64::from(zl.declared_len() / 2);
                let mut index = 0u64;
                loop {
                    // a dangling member with no score is dropped, matching
                    // the tolerant handling of odd pair streams
                    let member = match zl.next() {
                        Some(r) => r?,
                        None => break,
                    };
                    let score = match zl.next() {
                        Some(r) => r?,
                        None => break,
                    };
                    index += 1;
                    self.out().zset(&ZSetMember {
                        member: member.to_value(),
                        score: score.to_value(),
                        index,
                        count: Some(count),
                    });
                }
            }
            _ => {
                let count = u64::from(zl.declared_len() / 2);
                let mut index = 0u64;
                loop {
                    let field = match zl.next() {
                        Some(r) => r?,
                        None => break,
                    };
                    let value = match zl.next() {
                        Some(r) => r?,
                        None => break,
                    };
                    index += 1;
                    self.out().hash(&HashEntry {
                        field: field.to_value(),
                        value: value.to_value(),
                        index,
                        count: Some(count),
                    });
                }
            }
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_quicklist(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        self.start_key(key);
        let mut index = 0u64;
        for _ in 0..rlen.len {
            let blob = self.consume_blob()?;
            let zl = ZipList::init(blob)?;
            for v in zl {
                index += 1;
                // total count is unknowable without walking every chunk
                self.out().list(&ListElem {
                    value: v?.to_value(),
                    index,
                    count: None,
                });
            }
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_stream(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        self.start_key(key);
        let mut scratch = EntryScratch::new();
        let mut live = 0u64;
        for _ in 0..rlen.len {
            let k = self.consume_blob()?;
            let id = chunk_key_id(&k)?;
            let blob = self.consume_blob()?;
            let lp = match ListPack::init(blob) {
                Ok(lp) => lp,
                // an unreadable chunk loses its entries, not the record
                Err(_) => continue,
            };
            let mut chunk = StreamChunk::read_header(id, lp)?;
            for _ in 0..chunk.items() {
                let mut entry = chunk.read_entry(&mut scratch)?;
                if entry.flags.contains(EntryFlags::DELETED) {
                    continue;
                }
                if live == 0 {
                    self.out().stream_start(StreamPart::EntryList);
                }
                live += 1;
                entry.index = live;
                self.out().stream_entry(&entry);
            }
        }
        if live != 0 {
            self.out().stream_end(StreamPart::EntryList);
        }

        let num_elems = self.plain_len("stream length")?;
        let last_ms = self.plain_len("stream length")?;
        let last_seq = self.plain_len("stream length")?;
        let num_cgroups = self.plain_len("stream length")?;
        let info = StreamInfo {
            entry_count: live,
            num_elems,
            last: StreamId::new(last_ms, last_seq),
            num_cgroups,
        };
        self.out().stream_info(&info);

        if num_cgroups != 0 {
            self.out().stream_start(StreamPart::GroupList);
        }
        for gi in 1..=num_cgroups {
            let name = value_bytes(self.decode_rlen()?);
            let last_ms = self.plain_len("group id")?;
            let last_seq = self.plain_len("group id")?;
            let pending = self.plain_len("pending count")?;
            let group = GroupInfo {
                name,
                last: StreamId::new(last_ms, last_seq),
                pending,
                index: gi,
                count: num_cgroups,
            };
            self.out().stream_group(&info, &group);

            if pending != 0 {
                self.out().stream_start(StreamPart::PendingList);
            }
            for pi in 1..=pending {
                let idb = self.take(16)?;
                let dlv = self.take(8)?;
                let delivery_count = self.plain_len("delivery count")?;
                self.out().stream_pend(
                    &group,
                    &PendInfo {
                        id: StreamId::new(be64(&idb), be64(&idb[8..])),
                        last_delivery: le64(&dlv),
                        delivery_count,
                        index: pi,
                        count: pending,
                    },
                );
            }
            if pending != 0 {
                self.out().stream_end(StreamPart::PendingList);
            }

            let consumers = self.plain_len("consumer count")?;
            if consumers != 0 {
                self.out().stream_start(StreamPart::ConsumerList);
            }
            for ci in 1..=consumers {
                let cname = value_bytes(self.decode_rlen()?);
                let seen = self.take(8)?;
                let cpending = self.plain_len("pending count")?;
                let consumer = ConsumerInfo {
                    name: cname,
                    last_seen: le64(&seen),
                    pending: cpending,
                    index: ci,
                    count: consumers,
                };
                self.out().stream_consumer(&group, &consumer);

                if cpending != 0 {
                    self.out().stream_start(StreamPart::ConsumerPendingList);
                }
                for pi in 1..=cpending {
                    let idb = self.take(16)?;
                    self.out().stream_consumer_pend(
                        &consumer,
                        &ConsPendInfo {
                            id: StreamId::new(be64(&idb), be64(&idb[8..])),
                            index: pi,
                            count: cpending,
                        },
                    );
                }
                if cpending != 0 {
                    self.out().stream_end(StreamPart::ConsumerPendingList);
                }
                self.out().stream_end(StreamPart::Consumer);
            }
            if consumers != 0 {
                self.out().stream_end(StreamPart::ConsumerList);
            }
            self.out().stream_end(StreamPart::Group);
        }
        if num_cgroups != 0 {
            self.out().stream_end(StreamPart::GroupList);
        }
        self.out().end_key();
        Ok(())
    }

    fn decode_module(&mut self, rlen: &Length, key: &Value) -> Result<(), ParseError> {
        if rlen.is_lzf || rlen.is_enc() {
            return Err(ParseError::BadHeader("module id"));
        }
        // the id packs nine 6-bit charset indices and a 10-bit version
        let m = rlen.len;
        let mut name = String::with_capacity(16);
        for i in (1..=9).rev() {
            name.push(MODULE_CHARSET[(m >> (i * 6 + 4)) as usize & 63] as char);
        }
        name.push('.');
        name.push_str(&(m & 1023).to_string());

        self.start_key(key);
        self.out().module(&name);
        self.out().end_key();

        // opaque payload: skip to its terminating zero opcode
        while let Some(b) = self.cur.advance(1) {
            if b[0] == 0 {
                break;
            }
        }
        Ok(())
    }

    // -- shared pulls ------------------------------------------------------

    /// Routes the key and announces it on the chosen sink.
    fn start_key(&mut self, key: &Value) {
        self.selected = self.filter.map_or(true, |f| f.matches(key));
        self.out().start_key(key);
    }

    #[inline]
    fn out(&mut self) -> &mut dyn Sink {
        if self.selected {
            &mut self.sink
        } else {
            &mut self.null
        }
    }

    /// Length header, then the string it describes: immediates become
    /// integers, compressed values are unpacked in place.
    fn decode_rlen(&mut self) -> Result<Value, ParseError> {
        let l = Length::read(&mut self.cur)?;
        if l.is_lzf {
            self.cur.decompress(l.zlen, l.len)?;
        }
        self.decode_str(&l)
    }

    /// String body for an already-read header, assuming any decompression
    /// has happened.
    fn decode_str(&mut self, l: &Length) -> Result<Value, ParseError> {
        if l.is_enc() {
            return Ok(Value::Int(l.ival));
        }
        Ok(Value::Str(self.take_len(l.len)?))
    }

    /// Length that must be a bare size, not an immediate or LZF pair.
    fn plain_len(&mut self, what: &'static str) -> Result<u64, ParseError> {
        let l = Length::read(&mut self.cur)?;
        if l.is_lzf || l.is_enc() {
            return Err(ParseError::BadHeader(what));
        }
        Ok(l.len)
    }

    /// Length-prefixed blob, decompressed when marked.
    fn consume_blob(&mut self) -> Result<Bytes, ParseError> {
        let l = Length::read(&mut self.cur)?;
        l.consume(&mut self.cur)
    }

    fn take(&mut self, n: usize) -> Result<Bytes, ParseError> {
        self.cur.advance(n).ok_or(ParseError::Truncated)
    }

    fn take_len(&mut self, n: u64) -> Result<Bytes, ParseError> {
        self.take(usize::try_from(n).map_err(|_| ParseError::Truncated)?)
    }
}

const MODULE_CHARSET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

fn value_bytes(v: Value) -> Bytes {
    match v {
        Value::Str(b) => b,
        Value::Int(i) => Bytes::from(i.to_string()),
        _ => Bytes::new(),
    }
}

fn zipmap_len(blob: &Bytes, p: &mut usize) -> Result<usize, ParseError> {
    let b = *blob.get(*p).ok_or(ParseError::Truncated)?;
    *p += 1;
    if b < 254 {
        return Ok(usize::from(b));
    }
    if blob.len() - *p < 4 {
        return Err(ParseError::Truncated);
    }
    let len = be32(&blob[*p..]) as usize;
    *p += 4;
    Ok(len)
}

fn take_slice(blob: &Bytes, p: &mut usize, len: usize) -> Result<Bytes, ParseError> {
    if blob.len() - *p < len {
        return Err(ParseError::Truncated);
    }
    let s = blob.slice(*p..*p + len);
    *p += len;
    Ok(s)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::GlobFilter;

    fn txt(v: &Value) -> String {
        match v {
            Value::Absent => "nil".into(),
            Value::Int(i) => i.to_string(),
            Value::Str(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Double(d) => d.to_string(),
        }
    }

    #[derive(Default)]
    struct Rec {
        ev: Vec<String>,
    }

    impl Sink for Rec {
        fn begin(&mut self) {
            self.ev.push("begin".into());
        }
        fn finish(&mut self, ok: bool) {
            self.ev.push(format!("finish {ok}"));
        }
        fn idle(&mut self, secs: u64) {
            self.ev.push(format!("idle {secs}"));
        }
        fn freq(&mut self, lfu: u8) {
            self.ev.push(format!("freq {lfu}"));
        }
        fn aux(&mut self, var: &Value, val: &Value) {
            self.ev.push(format!("aux {}={}", txt(var), txt(val)));
        }
        fn db_resize(&mut self, main: u64, expires: u64) {
            self.ev.push(format!("resize {main} {expires}"));
        }
        fn expired_ms(&mut self, ms: u64) {
            self.ev.push(format!("expire {ms}"));
        }
        fn db_select(&mut self, db: u64) {
            self.ev.push(format!("db {db}"));
        }
        fn start_type(&mut self, rtype: RecordType, offset: u64) {
            self.ev.push(format!("type {} {offset}", rtype.name()));
        }
        fn start_key(&mut self, key: &Value) {
            self.ev.push(format!("key {}", txt(key)));
        }
        fn end_key(&mut self) {
            self.ev.push("end".into());
        }
        fn string(&mut self, value: &Value) {
            self.ev.push(format!("str {}", txt(value)));
        }
        fn module(&mut self, name: &str) {
            self.ev.push(format!("module {name}"));
        }
        fn hash(&mut self, e: &HashEntry) {
            self.ev.push(format!(
                "hash {}={} {}/{:?}",
                txt(&e.field),
                txt(&e.value),
                e.index,
                e.count
            ));
        }
        fn list(&mut self, e: &ListElem) {
            self.ev
                .push(format!("list {} {}/{:?}", txt(&e.value), e.index, e.count));
        }
        fn set(&mut self, m: &SetMember) {
            self.ev
                .push(format!("set {} {}/{:?}", txt(&m.member), m.index, m.count));
        }
        fn zset(&mut self, m: &ZSetMember) {
            self.ev
                .push(format!("zset {} {}", txt(&m.member), txt(&m.score)));
        }
    }

    /// 6-bit length-prefixed string.
    fn s(out: &mut Vec<u8>, data: &[u8]) {
        assert!(data.len() < 64);
        out.push(data.len() as u8);
        out.extend_from_slice(data);
    }

    fn container(body: &[u8]) -> Bytes {
        let mut v = b"REDIS0009".to_vec();
        v.extend_from_slice(body);
        v.push(0xFF);
        let crc = crc64::update(0, &v);
        v.extend_from_slice(&crc.to_le_bytes());
        Bytes::from(v)
    }

    fn dump(body: &[u8]) -> Bytes {
        let mut v = body.to_vec();
        v.extend_from_slice(&DUMP_VERSION.to_le_bytes());
        let crc = crc64::update(0, &v);
        v.extend_from_slice(&crc.to_le_bytes());
        Bytes::from(v)
    }

    fn decode(input: Bytes) -> (Vec<String>, Result<(), ParseError>) {
        let mut dec = Decoder::new(input, Rec::default());
        let r = dec.decode_all();
        (dec.into_sink().ev, r)
    }

    #[test]
    fn container_with_one_string_record() {
        let mut body = vec![0x00];
        s(&mut body, b"k");
        s(&mut body, b"v");
        let (ev, r) = decode(container(&body));
        assert_eq!(r, Ok(()));
        assert_eq!(
            ev,
            vec!["begin", "type string 9", "key k", "str v", "end", "finish true"]
        );
    }

    #[test]
    fn dump_form_has_no_key() {
        let mut body = vec![0x00];
        s(&mut body, b"v");
        let (ev, r) = decode(dump(&body));
        assert_eq!(r, Ok(()));
        assert_eq!(
            ev,
            vec!["begin", "type string 0", "key nil", "str v", "end", "finish true"]
        );
    }

    #[test]
    fn dump_with_trailing_newline() {
        let mut body = vec![0x00];
        s(&mut body, b"v");
        let mut input = dump(&body).to_vec();
        input.push(0x0A);
        let (ev, r) = decode(Bytes::from(input));
        assert_eq!(r, Ok(()));
        assert!(ev.contains(&"str v".to_string()));
    }

    #[test]
    fn version_accessors() {
        let mut body = vec![0x00];
        s(&mut body, b"k");
        s(&mut body, b"v");
        let mut d = Decoder::new(container(&body), Rec::default());
        d.decode_header().unwrap();
        assert_eq!(d.version(), 9);
        assert!(d.is_container());
        assert_ne!(d.trailer_crc(), 0);
    }

    #[test]
    fn bad_version_digit() {
        let mut v = b"REDIS00x9".to_vec();
        v.extend_from_slice(&[0; 8]);
        let (_, r) = decode(Bytes::from(v));
        assert_eq!(r, Err(ParseError::BadVersion(0)));
    }

    #[test]
    fn short_input_is_truncated() {
        let (_, r) = decode(Bytes::from_static(b"REDIS"));
        assert_eq!(r, Err(ParseError::Truncated));
    }

    #[test]
    fn dump_checksum_mismatch_is_fatal() {
        let mut body = vec![0x00];
        s(&mut body, b"v");
        let mut input = dump(&body).to_vec();
        let n = input.len();
        input[n - 1] ^= 0xFF;
        let (ev, r) = decode(Bytes::from(input));
        assert!(matches!(r, Err(ParseError::ChecksumMismatch { .. })));
        assert_eq!(ev.last().map(String::as_str), Some("finish false"));
    }

    #[test]
    fn container_checksum_mismatch_decodes_anyway() {
        let mut body = vec![0x00];
        s(&mut body, b"k");
        s(&mut body, b"v");
        let mut input = container(&body).to_vec();
        let n = input.len();
        input[n - 1] ^= 0xFF;
        let (ev, r) = decode(Bytes::from(input));
        assert_eq!(r, Ok(()));
        assert!(ev.contains(&"str v".to_string()));
    }

    #[test]
    fn zero_crc_is_unchecked() {
        let mut body = vec![0x00];
        s(&mut body, b"v");
        body.extend_from_slice(&DUMP_VERSION.to_le_bytes());
        body.extend_from_slice(&[0u8; 8]);
        let (_, r) = decode(Bytes::from(body));
        assert_eq!(r, Ok(()));
    }

    #[test]
    fn metadata_events() {
        let mut body = Vec::new();
        body.push(META_DBSELECT);
        body.push(0x00);
        body.push(META_DBRESIZE);
        body.push(0x02);
        body.push(0x01);
        body.push(META_AUX);
        s(&mut body, b"redis-ver");
        s(&mut body, b"6.0.5");
        body.push(META_EXPIRE_MS);
        body.extend_from_slice(&1_700_000_000_123u64.to_le_bytes());
        body.push(META_IDLE);
        body.push(0x07);
        body.push(META_FREQ);
        body.push(0x05);
        body.push(0x00);
        s(&mut body, b"k");
        s(&mut body, b"v");
        let (ev, r) = decode(container(&body));
        assert_eq!(r, Ok(()));
        assert_eq!(
            ev,
            vec![
                "begin",
                "db 0",
                "resize 2 1",
                "aux redis-ver=6.0.5",
                "expire 1700000000123",
                "idle 7",
                "freq 5",
                "type string 44",
                "key k",
                "str v",
                "end",
                "finish true"
            ]
        );
    }

    #[test]
    fn second_expiry_scales_to_milliseconds() {
        let mut body = Vec::new();
        body.push(META_EXPIRE_SEC);
        body.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        body.push(0x00);
        s(&mut body, b"k");
        s(&mut body, b"v");
        let (ev, _) = decode(container(&body));
        assert!(ev.contains(&"expire 1700000000000".to_string()));
    }

    #[test]
    fn filtered_keys_route_to_the_null_sink() {
        let mut body = vec![0x00];
        s(&mut body, b"keep");
        s(&mut body, b"a");
        body.push(0x00);
        s(&mut body, b"drop");
        s(&mut body, b"b");
        let filter = GlobFilter::new("keep");
        let mut dec = Decoder::new(container(&body), Rec::default()).with_filter(&filter);
        let r = dec.decode_all();
        assert_eq!(r, Ok(()));
        assert_eq!(
            dec.into_sink().ev,
            vec![
                "begin",
                "type string 9",
                "key keep",
                "str a",
                "end",
                "type string 17",
                "finish true"
            ]
        );
    }

    #[test]
    fn unknown_type_bytes() {
        for b in [0x08u8, 0x42] {
            let (_, r) = decode(container(&[b]));
            assert_eq!(r, Err(ParseError::UnknownType(b)));
        }
    }

    #[test]
    fn module_aux_is_unsupported() {
        let (_, r) = decode(container(&[META_MODULE_AUX]));
        assert_eq!(r, Err(ParseError::Unsupported("module aux data")));
    }

    #[test]
    fn missing_end_marker_is_truncated() {
        let mut v = b"REDIS0009".to_vec();
        v.push(0x00);
        s(&mut v, b"k");
        s(&mut v, b"v");
        let (ev, r) = decode(Bytes::from(v));
        assert_eq!(r, Err(ParseError::Truncated));
        assert!(ev.contains(&"end".to_string()));
    }

    #[test]
    fn compressed_key_and_value() {
        // LZF literal run: control byte len-1, then the bytes
        let mut body = vec![0x00];
        body.extend_from_slice(&[0xC3, 0x06, 0x05, 0x04]);
        body.extend_from_slice(b"kkkkk");
        body.extend_from_slice(&[0xC3, 0x06, 0x05, 0x04]);
        body.extend_from_slice(b"hello");
        let (ev, r) = decode(container(&body));
        assert_eq!(r, Ok(()));
        assert!(ev.contains(&"key kkkkk".to_string()));
        assert!(ev.contains(&"str hello".to_string()));
    }

    #[test]
    fn integer_encoded_key_and_value() {
        let mut body = vec![0x00, 0xC0, 0x2A, 0xC1];
        body.extend_from_slice(&300i16.to_le_bytes());
        let (ev, r) = decode(container(&body));
        assert_eq!(r, Ok(()));
        assert!(ev.contains(&"key 42".to_string()));
        assert!(ev.contains(&"str 300".to_string()));
    }

    #[test]
    fn intset_record() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&4u32.to_le_bytes());
        blob.extend_from_slice(&3u32.to_le_bytes());
        for v in [1i32, -1, 1_000_000] {
            blob.extend_from_slice(&v.to_le_bytes());
        }
        let mut body = vec![0x0B];
        s(&mut body, b"is");
        s(&mut body, &blob);
        let (ev, r) = decode(container(&body));
        assert_eq!(r, Ok(()));
        assert_eq!(
            ev,
            vec![
                "begin",
                "type set 9",
                "key is",
                "set 1 1/Some(3)",
                "set -1 2/Some(3)",
                "set 1000000 3/Some(3)",
                "end",
                "finish true"
            ]
        );
    }

    #[test]
    fn intset_odd_width_is_unsupported() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&3u32.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes());
        blob.extend_from_slice(&[0, 0, 0]);
        let mut body = vec![0x0B];
        s(&mut body, b"is");
        s(&mut body, &blob);
        let (_, r) = decode(container(&body));
        assert_eq!(r, Err(ParseError::Unsupported("intset element width")));
    }

    #[test]
    fn flat_hash_record() {
        let mut body = vec![0x04];
        s(&mut body, b"h");
        body.push(0x02);
        s(&mut body, b"f1");
        s(&mut body, b"v1");
        s(&mut body, b"f2");
        s(&mut body, b"v2");
        let (ev, r) = decode(container(&body));
        assert_eq!(r, Ok(()));
        assert!(ev.contains(&"hash f1=v1 1/Some(2)".to_string()));
        assert!(ev.contains(&"hash f2=v2 2/Some(2)".to_string()));
    }

    #[test]
    fn module_record_decodes_its_name() {
        let mut body = vec![0x06];
        s(&mut body, b"m");
        body.push(0x00); // module id 0
        body.push(0x00); // terminating opcode
        let (ev, r) = decode(container(&body));
        assert_eq!(r, Ok(()));
        assert!(ev.contains(&"module AAAAAAAAA.0".to_string()));
    }
}
