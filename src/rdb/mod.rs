// RDB snapshot/dump wire format.
//
// Submodules, leaf-first:
// - `endian`: fixed-width byte unpackers, odd-width sign extension
// - `crc64`: Jones-polynomial CRC-64 (slice-by-8)
// - `lzf`: LZF block decompression
// - `cursor`: streaming read position, lookahead, decompression overlays
// - `length`: the universal length/immediate/compressed header
// - `ziplist`: legacy compact list encoding (hash/zset/list containers)
// - `listpack`: successor compact list encoding (stream containers)
// - `stream`: stream master-entry and delta-entry decoding
// - `types`: wire constants, decoded values, record structs
// - `decoder`: the record state machine and the `Sink` it feeds
// - `encoder`: encoding fragments for dump payloads and test vectors

pub mod crc64;
pub mod cursor;
pub mod decoder;
pub mod encoder;
pub mod endian;
pub mod length;
pub mod listpack;
pub mod lzf;
pub mod stream;
pub mod types;
pub mod ziplist;

pub use cursor::Cursor;
pub use decoder::{Decoder, NullSink, Sink, Step};
pub use length::Length;
pub use listpack::ListPack;
pub use lzf::LzfError;
pub use stream::{EntryScratch, StreamChunk, StreamEntry};
pub use types::{
    ConsPendInfo, ConsumerInfo, EntryFlags, GroupInfo, HashEntry, ListElem, PackValue, PendInfo,
    RecordType, SetMember, StreamId, StreamInfo, StreamPart, Value, ZSetMember,
};
pub use ziplist::ZipList;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Decode failure. Structural decoders fail on the first malformed byte;
/// there is no resynchronization within a record.
///
/// The end-of-stream marker is not represented here: it surfaces as
/// [`Step::Eof`] from the record loop, a successful termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Ran out of input mid-structure.
    Truncated,
    /// Version field missing, unparsable, or out of range.
    BadVersion(u32),
    /// Trailing CRC-64 did not match the buffer contents.
    ChecksumMismatch { expected: u64, actual: u64 },
    /// Type byte outside the known set.
    UnknownType(u8),
    /// Malformed length header, entry code, or misused descriptor.
    BadHeader(&'static str),
    /// LZF payload failed to decompress.
    Lzf(LzfError),
    /// Recognized feature with no decode support.
    Unsupported(&'static str),
    /// Compact list traversal crossed the declared end of the list.
    PackOverrun,
    /// Stream entry back-reference disagreed with the entries consumed.
    CountMismatch { expected: u64, actual: u64 },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Truncated => write!(f, "truncated input"),
            ParseError::BadVersion(v) => write!(f, "unsupported format version {v}"),
            ParseError::ChecksumMismatch { expected, actual } => write!(
                f,
                "crc64 mismatch: trailer {expected:#018x}, computed {actual:#018x}"
            ),
            ParseError::UnknownType(b) => write!(f, "unknown record type byte {b:#04x}"),
            ParseError::BadHeader(what) => write!(f, "malformed header: {what}"),
            ParseError::Lzf(e) => write!(f, "lzf: {e}"),
            ParseError::Unsupported(what) => write!(f, "unsupported feature: {what}"),
            ParseError::PackOverrun => write!(f, "compact list entry crosses list bounds"),
            ParseError::CountMismatch { expected, actual } => write!(
                f,
                "stream entry count mismatch: expected {expected}, found {actual}"
            ),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LzfError> for ParseError {
    fn from(e: LzfError) -> ParseError {
        ParseError::Lzf(e)
    }
}
