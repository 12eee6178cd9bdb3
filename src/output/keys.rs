// Key listing.
//
// Prints each key on its own line, unquoted but escaped, and ignores
// everything else. Pairs with a filter to grep a snapshot for keys.

use std::io::{self, Write};

use crate::rdb::{Sink, Value};

use super::value_text;

/// `Sink` that lists the keys that reach it.
pub struct KeysWriter<W: Write> {
    out: W,
    count: u64,
    status: io::Result<()>,
}

impl<W: Write> KeysWriter<W> {
    pub fn new(out: W) -> KeysWriter<W> {
        KeysWriter { out, count: 0, status: Ok(()) }
    }

    /// Keys listed so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Hands back the writer, or the first write error.
    pub fn into_inner(self) -> io::Result<W> {
        self.status?;
        Ok(self.out)
    }
}

impl<W: Write> Sink for KeysWriter<W> {
    fn start_key(&mut self, key: &Value) {
        self.count += 1;
        if self.status.is_ok() {
            let t = value_text(key, false);
            if let Err(e) = writeln!(self.out, "{t}") {
                self.status = Err(e);
            }
        }
    }
}
