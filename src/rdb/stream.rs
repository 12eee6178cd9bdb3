// Stream chunk decoding.
//
// A stream record stores its entries in chunks: each chunk pairs a 16-byte
// big-endian master id with a listpack. The listpack opens with a master
// entry (live count, deleted count, shared field names) and then holds one
// sub-entry per stream entry, ids stored as deltas against the master.
// Every sub-entry ends with a back-count of its own element footprint,
// which doubles as a consistency check here.

use crate::rdb::listpack::ListPack;
use crate::rdb::types::{EntryFlags, PackValue, StreamId};
use crate::rdb::ParseError;

/// Reusable field/value buffers for entry decoding, so a million-entry
/// stream does not allocate per entry.
#[derive(Default)]
pub struct EntryScratch {
    fields: Vec<PackValue>,
    values: Vec<PackValue>,
}

impl EntryScratch {
    pub fn new() -> EntryScratch {
        EntryScratch::default()
    }
}

/// One decoded stream entry. Field and value slices borrow from the chunk
/// (shared field names) or the scratch buffers, so the entry must be
/// consumed before the next read.
#[derive(Debug)]
pub struct StreamEntry<'a> {
    pub id: StreamId,
    pub flags: EntryFlags,
    pub fields: &'a [PackValue],
    pub values: &'a [PackValue],
    /// 1-based position among surfaced entries, filled by the caller.
    pub index: u64,
}

/// One chunk: the master entry plus a walker positioned at the first
/// sub-entry.
pub struct StreamChunk {
    lp: ListPack,
    master_id: StreamId,
    master: Vec<PackValue>,
    items: u64,
    deleted: u64,
}

impl StreamChunk {
    /// Decodes the master entry. Any malformed or missing element here is
    /// a [`ParseError::BadHeader`].
    pub fn read_header(master_id: StreamId, mut lp: ListPack) -> Result<StreamChunk, ParseError> {
        const BAD: ParseError = ParseError::BadHeader("stream master entry");
        let items = uint_el(&mut lp, BAD)?;
        let deleted = uint_el(&mut lp, BAD)?;
        let nfields = uint_el(&mut lp, BAD)?;
        let mut master = Vec::new();
        for _ in 0..nfields {
            master.push(next_el(&mut lp, BAD)?);
        }
        // the master entry closes with a placeholder element
        next_el(&mut lp, BAD)?;
        Ok(StreamChunk {
            lp,
            master_id,
            master,
            items,
            deleted,
        })
    }

    /// Live entries to read from this chunk. Deleted entries beyond this
    /// count are not walked.
    #[inline]
    pub fn items(&self) -> u64 {
        self.items
    }

    /// Tombstoned entry count from the master entry.
    #[inline]
    pub fn deleted(&self) -> u64 {
        self.deleted
    }

    /// Decodes the next sub-entry. Malformed elements surface as
    /// [`ParseError::Truncated`]; a back-count that disagrees with the
    /// elements consumed is a [`ParseError::CountMismatch`].
    pub fn read_entry<'a>(
        &'a mut self,
        scratch: &'a mut EntryScratch,
    ) -> Result<StreamEntry<'a>, ParseError> {
        const TRUNC: ParseError = ParseError::Truncated;
        let flags = EntryFlags::from_bits_retain(int_el(&mut self.lp, TRUNC)? as u32);
        let diff_ms = int_el(&mut self.lp, TRUNC)?;
        let diff_seq = int_el(&mut self.lp, TRUNC)?;
        let id = StreamId {
            ms: self.master_id.ms.wrapping_add(diff_ms as u64),
            seq: self.master_id.seq.wrapping_add(diff_seq as u64),
        };

        let same = flags.contains(EntryFlags::SAMEFIELDS);
        let nfields = if same {
            self.master.len() as u64
        } else {
            uint_el(&mut self.lp, TRUNC)?
        };
        scratch.fields.clear();
        scratch.values.clear();
        for _ in 0..nfields {
            if !same {
                scratch.fields.push(next_el(&mut self.lp, TRUNC)?);
            }
            scratch.values.push(next_el(&mut self.lp, TRUNC)?);
        }

        // flags + ms + seq (+ field count) + values (+ private field names)
        let mut expected = if same { 3 } else { 4 } + nfields;
        if !same {
            expected += nfields;
        }
        let actual = uint_el(&mut self.lp, TRUNC)?;
        if actual != expected {
            return Err(ParseError::CountMismatch { expected, actual });
        }

        Ok(StreamEntry {
            id,
            flags,
            fields: if same { &self.master } else { &scratch.fields },
            values: &scratch.values,
            index: 0,
        })
    }
}

fn next_el(lp: &mut ListPack, err: ParseError) -> Result<PackValue, ParseError> {
    match lp.next() {
        Some(Ok(v)) => Ok(v),
        _ => Err(err),
    }
}

fn int_el(lp: &mut ListPack, err: ParseError) -> Result<i64, ParseError> {
    lp.expect_int().map_err(|_| err)
}

fn uint_el(lp: &mut ListPack, err: ParseError) -> Result<u64, ParseError> {
    u64::try_from(int_el(lp, err)?).map_err(|_| err)
}

/// Splits a 16-byte chunk key into its id halves.
pub fn chunk_key_id(key: &[u8]) -> Result<StreamId, ParseError> {
    if key.len() < 16 {
        return Err(ParseError::BadHeader("stream chunk key"));
    }
    Ok(StreamId {
        ms: crate::rdb::endian::be64(key),
        seq: crate::rdb::endian::be64(&key[8..]),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
