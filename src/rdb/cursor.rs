// Streaming read position over the input byte range.
//
// The cursor never reads past the bytes it was given: `advance` fails without
// moving when the request exceeds what remains, and `peek` zero-pads its
// private scratch so header decoders can probe a maximum-size header near the
// end of input (the follow-up `advance` then reports the truncation).
//
// LZF values swap the live view to the decompressed buffer; the outer view is
// stacked and restored when the overlay is exhausted. Views are `Bytes`, so a
// value sliced out of an overlay keeps the allocation alive on its own and
// the overlay stack only tracks positions, not ownership of raw memory.

use bytes::Bytes;

use crate::rdb::{lzf, ParseError};

/// Lookahead scratch size, wider than the widest length header (19 bytes).
pub const LOOKAHEAD: usize = 32;

pub struct Cursor {
    buf: Bytes,
    /// Bytes consumed within the live view.
    offset: u64,
    /// Stream position where this cursor's buffer begins.
    start_offset: u64,
    saved: Vec<SavedView>,
    lookahead: [u8; LOOKAHEAD],
}

struct SavedView {
    buf: Bytes,
    offset: u64,
}

impl Cursor {
    pub fn new(buf: Bytes) -> Cursor {
        Cursor::with_start_offset(buf, 0)
    }

    /// A cursor whose buffer starts `start_offset` bytes into the stream,
    /// for callers that feed input in successive chunks.
    pub fn with_start_offset(buf: Bytes, start_offset: u64) -> Cursor {
        Cursor {
            buf,
            offset: 0,
            start_offset,
            saved: Vec::new(),
            lookahead: [0; LOOKAHEAD],
        }
    }

    /// Bytes left in the live view (an overlay while one is active).
    #[inline]
    pub fn avail(&self) -> usize {
        self.buf.len()
    }

    /// Position for diagnostics: within an overlay this counts overlay bytes,
    /// matching what the error reporter expects.
    #[inline]
    pub fn stream_offset(&self) -> u64 {
        self.start_offset + self.offset
    }

    /// Nearest position in the original input, for error windows. Inside an
    /// overlay this is where the outer view resumes, so the window brackets
    /// the compressed value that produced the overlay.
    #[inline]
    pub fn input_offset(&self) -> u64 {
        let off = self.saved.first().map_or(self.offset, |v| v.offset);
        self.start_offset + off
    }

    /// The unconsumed bytes of the live view.
    #[inline]
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    /// Drop everything past `len` bytes of the live view. Used once per
    /// decode to trim a dump-form trailer.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// The next `n` logical bytes without consuming them. When fewer remain,
    /// the tail is zero-padded; a header decoded from padding yields a size
    /// the following `advance` cannot satisfy. Falls back to the outer view
    /// first when the live one is exhausted.
    pub fn peek(&mut self, n: usize) -> &[u8] {
        debug_assert!(n <= LOOKAHEAD);
        if self.buf.is_empty() {
            self.pop_saved();
        }
        if self.buf.len() >= n {
            &self.buf[..n]
        } else {
            let have = self.buf.len();
            self.lookahead[..have].copy_from_slice(&self.buf);
            self.lookahead[have..n].fill(0);
            &self.lookahead[..n]
        }
    }

    /// Consume `n` bytes. Fails without moving when not enough remain,
    /// leaving the cursor inspectable. Falls back to the outer view first
    /// when the live one is exhausted; a read never spans two views.
    pub fn advance(&mut self, n: usize) -> Option<Bytes> {
        if self.buf.is_empty() {
            self.pop_saved();
        }
        if n > self.buf.len() {
            return None;
        }
        self.offset += n as u64;
        Some(self.buf.split_to(n))
    }

    /// Consume `zlen` compressed bytes, decompress them to `len` bytes, and
    /// swap the live view to the result. The outer view is stacked when any
    /// of it remains.
    pub fn decompress(&mut self, zlen: u64, len: u64) -> Result<(), ParseError> {
        let zlen = usize::try_from(zlen).map_err(|_| ParseError::Truncated)?;
        let len = usize::try_from(len).map_err(|_| ParseError::Truncated)?;
        let compressed = self.advance(zlen).ok_or(ParseError::Truncated)?;
        let out = lzf::decompress(&compressed, len)?;
        if !self.buf.is_empty() {
            let buf = std::mem::take(&mut self.buf);
            self.saved.push(SavedView {
                buf,
                offset: self.offset,
            });
        }
        self.buf = Bytes::from(out);
        self.offset = 0;
        Ok(())
    }

    /// End-of-key hook: restore the outer view if the live one is spent.
    pub fn release(&mut self) {
        if self.buf.is_empty() {
            self.pop_saved();
        }
    }

    fn pop_saved(&mut self) {
        if let Some(v) = self.saved.pop() {
            self.buf = v.buf;
            self.offset = v.offset;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
