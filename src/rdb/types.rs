// Wire constants and decoded record types.
//
// Everything a sink sees comes through here: the record type byte table,
// the metadata opcode range, decoded scalar values, and the per-record
// payload structs. Indices handed to sinks are 1-based; counts are present
// only where the wire format declares one up front.

use bytes::Bytes;

// ---------------------------------------------------------------------------
// Container / dump framing constants
// ---------------------------------------------------------------------------

/// Container file prefix. The full header is `REDIS` plus four ASCII version
/// digits; snapshot versions stay below 100, so the first two digits are
/// always `00`.
pub const CONTAINER_MAGIC: &[u8; 7] = b"REDIS00";

/// Container header length: 5-byte magic + 4 version digits.
pub const CONTAINER_HDR_LEN: usize = 9;

/// Version written into dump-form trailers by the encoder.
pub const DUMP_VERSION: u16 = 9;

// ---------------------------------------------------------------------------
// Metadata opcodes (container form, byte >= 0xF7)
// ---------------------------------------------------------------------------

/// First byte value reserved for metadata opcodes.
pub const META_FIRST: u8 = 0xF7;

/// Module auxiliary data. Recognized, not decodable.
pub const META_MODULE_AUX: u8 = 0xF7;
/// Idle time (length-coded seconds) for the next key.
pub const META_IDLE: u8 = 0xF8;
/// Access frequency (one byte) for the next key.
pub const META_FREQ: u8 = 0xF9;
/// Auxiliary variable/value string pair.
pub const META_AUX: u8 = 0xFA;
/// Database hash table sizes (two lengths).
pub const META_DBRESIZE: u8 = 0xFB;
/// Millisecond expiration (8-byte little-endian) for the next key.
pub const META_EXPIRE_MS: u8 = 0xFC;
/// Second expiration (4-byte little-endian) for the next key.
pub const META_EXPIRE_SEC: u8 = 0xFD;
/// Database selector (one length).
pub const META_DBSELECT: u8 = 0xFE;
/// End of stream. Terminates the decode successfully.
pub const META_EOF: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Record type byte. The low nibble selects the structural decoder; the
/// high nibble must be zero. Value 8 is unassigned on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    String = 0,
    /// Structurally flat list: count + repeated string pulls.
    List = 1,
    Set = 2,
    /// Sorted set with string-encoded scores.
    ZSet = 3,
    Hash = 4,
    /// Sorted set with binary double scores.
    ZSet2 = 5,
    Module = 6,
    Module2 = 7,
    HashZipmap = 9,
    ListZiplist = 10,
    SetIntset = 11,
    ZSetZiplist = 12,
    HashZiplist = 13,
    ListQuicklist = 14,
    StreamListpack = 15,
}

impl RecordType {
    /// Maps a wire byte to a record type. `None` for the unassigned value 8
    /// and for anything with a non-zero high nibble.
    pub fn from_byte(b: u8) -> Option<RecordType> {
        Some(match b {
            0 => RecordType::String,
            1 => RecordType::List,
            2 => RecordType::Set,
            3 => RecordType::ZSet,
            4 => RecordType::Hash,
            5 => RecordType::ZSet2,
            6 => RecordType::Module,
            7 => RecordType::Module2,
            9 => RecordType::HashZipmap,
            10 => RecordType::ListZiplist,
            11 => RecordType::SetIntset,
            12 => RecordType::ZSetZiplist,
            13 => RecordType::HashZiplist,
            14 => RecordType::ListQuicklist,
            15 => RecordType::StreamListpack,
            _ => return None,
        })
    }

    /// Logical type group name, as shown to users.
    pub fn name(self) -> &'static str {
        match self {
            RecordType::String => "string",
            RecordType::List | RecordType::ListZiplist | RecordType::ListQuicklist => "list",
            RecordType::Set | RecordType::SetIntset => "set",
            RecordType::ZSet | RecordType::ZSet2 | RecordType::ZSetZiplist => "zset",
            RecordType::Hash | RecordType::HashZipmap | RecordType::HashZiplist => "hash",
            RecordType::Module | RecordType::Module2 => "module",
            RecordType::StreamListpack => "stream",
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded values
// ---------------------------------------------------------------------------

/// A decoded scalar: a key, a container member, an aux field.
///
/// `Str` holds a reference-counted slice of the input (or of a
/// decompression overlay), so cloning is cheap and no lifetime threading is
/// needed. `Double` appears only as a zset2 score. `Absent` is the key of a
/// dump-form record, which carries none.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Absent,
    Int(i64),
    Str(Bytes),
    Double(f64),
}

impl Value {
    /// Payload bytes, when this is a string.
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(b) => Some(b),
            _ => None,
        }
    }

    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }
}

/// One element decoded from a ziplist or listpack entry: either payload
/// bytes or an immediate integer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackValue {
    /// Payload bytes when the entry held a string.
    pub data: Option<Bytes>,
    /// Immediate value when the entry held an integer.
    pub ival: i64,
}

impl PackValue {
    #[inline]
    pub fn int(ival: i64) -> PackValue {
        PackValue { data: None, ival }
    }

    #[inline]
    pub fn str(data: Bytes) -> PackValue {
        PackValue {
            data: Some(data),
            ival: 0,
        }
    }

    /// Converts to the general scalar representation.
    #[inline]
    pub fn to_value(&self) -> Value {
        match &self.data {
            Some(b) => Value::Str(b.clone()),
            None => Value::Int(self.ival),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-record sink payloads
// ---------------------------------------------------------------------------

/// One hash field/value pair.
#[derive(Debug, Clone)]
pub struct HashEntry {
    pub field: Value,
    pub value: Value,
    /// 1-based position within the hash.
    pub index: u64,
    /// Declared pair count, where the encoding states one.
    pub count: Option<u64>,
}

/// One list element.
#[derive(Debug, Clone)]
pub struct ListElem {
    pub value: Value,
    pub index: u64,
    pub count: Option<u64>,
}

/// One set member.
#[derive(Debug, Clone)]
pub struct SetMember {
    pub member: Value,
    pub index: u64,
    pub count: Option<u64>,
}

/// One sorted set member with its score. The score is a `Double` for the
/// binary-scored encoding and a `Str` (digits or `nan`/`inf`/`-inf`) for
/// the string-scored one.
#[derive(Debug, Clone)]
pub struct ZSetMember {
    pub member: Value,
    pub score: Value,
    pub index: u64,
    pub count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Stream records
// ---------------------------------------------------------------------------

/// A stream record id: milliseconds plus a serial, ordered as a 128-bit
/// big-endian pair on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    #[inline]
    pub fn new(ms: u64, seq: u64) -> StreamId {
        StreamId { ms, seq }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

bitflags::bitflags! {
    /// Per-entry flags stored in a stream listpack chunk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u32 {
        /// Entry was deleted; decoded for cursor sync, never surfaced.
        const DELETED = 1 << 0;
        /// Entry reuses the chunk's master field list.
        const SAMEFIELDS = 1 << 1;
    }
}

/// Stream sub-structure markers for paired start/end sink hooks.
///
/// The list variants bracket repeated records and fire only when the list
/// is non-empty. `Group` and `Consumer` only occur as end markers: the
/// group/consumer record hook itself opens the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPart {
    EntryList,
    GroupList,
    Group,
    PendingList,
    ConsumerList,
    Consumer,
    ConsumerPendingList,
}

/// Stream-level metadata, decoded after the entry chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamInfo {
    /// Live entries surfaced from the chunks.
    pub entry_count: u64,
    /// Element count as recorded by the store.
    pub num_elems: u64,
    /// Last id assigned; the next entry must exceed it.
    pub last: StreamId,
    /// Consumer group count.
    pub num_cgroups: u64,
}

/// One consumer group.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub name: Bytes,
    /// Last id delivered to the group.
    pub last: StreamId,
    /// Entries awaiting acknowledgement.
    pub pending: u64,
    pub index: u64,
    pub count: u64,
}

/// One entry in a group's pending list.
#[derive(Debug, Clone, Copy)]
pub struct PendInfo {
    pub id: StreamId,
    /// Delivery time in unix milliseconds.
    pub last_delivery: u64,
    pub delivery_count: u64,
    pub index: u64,
    pub count: u64,
}

/// One consumer within a group.
#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub name: Bytes,
    /// Last activity in unix milliseconds.
    pub last_seen: u64,
    /// Entries pending for this consumer.
    pub pending: u64,
    pub index: u64,
    pub count: u64,
}

/// One id in a consumer's pending sublist.
#[derive(Debug, Clone, Copy)]
pub struct ConsPendInfo {
    pub id: StreamId,
    pub index: u64,
    pub count: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
