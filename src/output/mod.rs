// Sinks that render the decode callback stream.
//
// Three consumers of `rdb::Sink`:
//   - **JSON**: one JSON object, a member per key, streamed as the
//     decoder walks the input.
//   - **Keys**: bare key listing, one per line.
//   - **Restore**: RESP `RESTORE` commands that replay each key into a
//     live server, suitable for piping into `redis-cli --pipe`.
//
// All three write through any `io::Write`. Hook methods are infallible,
// so the first write error latches and later hooks become no-ops; the
// error surfaces when the caller reclaims the writer.

mod json;
mod keys;
mod restore;

pub use json::JsonWriter;
pub use keys::KeysWriter;
pub use restore::RestoreWriter;

use crate::rdb::Value;

/// Renders a value the way the JSON and key listings want it: absent is
/// the literal `"nil"`, integers and doubles print bare, strings are
/// escaped and quoted only when `quoted` asks for it.
pub(crate) fn value_text(v: &Value, quoted: bool) -> String {
    match v {
        Value::Absent => "\"nil\"".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Str(s) => {
            if quoted {
                format!("\"{}\"", escaped(s))
            } else {
                escaped(s)
            }
        }
        Value::Double(d) => format!("{d}"),
    }
}

/// JSON string escaping over raw bytes. Values are not required to be
/// UTF-8, so anything outside the printable ASCII range becomes a
/// `\u00xx` escape.
pub(crate) fn escaped(raw: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(raw.len());
    for &b in raw {
        match b {
            b'"' => s.push_str("\\\""),
            b'\\' => s.push_str("\\\\"),
            0x08 => s.push_str("\\b"),
            0x0C => s.push_str("\\f"),
            b'\n' => s.push_str("\\n"),
            b'\r' => s.push_str("\\r"),
            b'\t' => s.push_str("\\t"),
            0x20..=0x7E => s.push(b as char),
            _ => {
                s.push_str("\\u00");
                s.push(HEX[(b >> 4) as usize] as char);
                s.push(HEX[(b & 0xF) as usize] as char);
            }
        }
    }
    s
}
