// Input acquisition and error-context helpers.
//
// The decoder wants one contiguous byte range, so everything here reads
// whole inputs: a file path or stdin, with transparent gzip/xz
// unwrapping when the magic matches (feature-gated behind `gzip-input`
// and `xz-input`). `scan_input()` wraps a filterless decode into
// summary statistics, and `hex_window()` renders the bytes around a
// decode failure for diagnostics. Optionally computes a SHA-256 digest
// of the input (feature-gated behind `file-io`).

use std::io::{self, Read};
use std::path::Path;

use bytes::Bytes;
use thiserror::Error;

use crate::rdb::{Decoder, NullSink, ParseError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for input acquisition and scanning.
#[derive(Debug, Error)]
pub enum IoError {
    /// I/O error (file open, read, stdin).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Input failed to decode; `offset` is the decoder position.
    #[error("decode failed at offset {offset}: {source}")]
    Parse {
        offset: u64,
        #[source]
        source: ParseError,
    },
    /// Compressed input for which the matching feature is compiled out.
    #[error("input is {0}-compressed, rebuild with the `{1}` feature to read it")]
    Disabled(&'static str, &'static str),
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `scan_input()`.
#[derive(Debug, Clone)]
pub struct ScanStats {
    /// Input size in bytes, after transport decompression.
    pub input_size: u64,
    /// Records decoded.
    pub keys: u64,
    /// Format version from the magic or the dump trailer.
    pub version: u32,
    /// True for the snapshot container form, false for a dump blob.
    pub container: bool,
    /// CRC from the trailer, zero when the input was written unchecked.
    pub trailer_crc: u64,
    /// SHA-256 of the input (if the `file-io` feature is enabled).
    pub sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Input acquisition
// ---------------------------------------------------------------------------

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const XZ_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];

/// Reads the whole input from `path`, or from stdin when `path` is
/// `None`, unwrapping gzip/xz transport compression by magic.
pub fn read_input(path: Option<&Path>) -> Result<Bytes, IoError> {
    let raw = match path {
        Some(p) => std::fs::read(p)?,
        None => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            buf
        }
    };
    Ok(Bytes::from(decompressed(raw)?))
}

fn decompressed(raw: Vec<u8>) -> Result<Vec<u8>, IoError> {
    if raw.starts_with(&GZIP_MAGIC) {
        #[cfg(feature = "gzip-input")]
        {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
            return Ok(out);
        }
        #[cfg(not(feature = "gzip-input"))]
        return Err(IoError::Disabled("gzip", "gzip-input"));
    }
    if raw.starts_with(&XZ_MAGIC) {
        #[cfg(feature = "xz-input")]
        {
            let mut out = Vec::new();
            lzma_rs::xz_decompress(&mut io::Cursor::new(raw.as_slice()), &mut out)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("xz: {e}")))?;
            return Ok(out);
        }
        #[cfg(not(feature = "xz-input"))]
        return Err(IoError::Disabled("xz", "xz-input"));
    }
    Ok(raw)
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Decodes the whole input into a discarding sink and reports what was
/// there. Validation only; nothing is rendered.
pub fn scan_input(input: &Bytes) -> Result<ScanStats, IoError> {
    #[cfg(feature = "file-io")]
    let sha256 = {
        use sha2::Digest;
        let mut h = sha2::Sha256::new();
        h.update(input);
        Some(h.finalize().into())
    };
    #[cfg(not(feature = "file-io"))]
    let sha256: Option<[u8; 32]> = None;

    let mut dec = Decoder::new(input.clone(), NullSink);
    let outcome = dec.decode_all();
    let offset = dec.position();
    outcome.map_err(|source| IoError::Parse { offset, source })?;

    Ok(ScanStats {
        input_size: input.len() as u64,
        keys: dec.key_count(),
        version: dec.version(),
        container: dec.is_container(),
        trailer_crc: dec.trailer_crc(),
        sha256,
    })
}

// ---------------------------------------------------------------------------
// Hex window
// ---------------------------------------------------------------------------

/// Renders up to 512 bytes around `offset`: an offset label, then
/// 16-byte rows of hex and printable ASCII. The window starts 256 bytes
/// back, aligned down to a row boundary.
pub fn hex_window(input: &[u8], offset: u64) -> String {
    use std::fmt::Write as _;
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let off = (offset as usize).min(input.len());
    let mut row = off.saturating_sub(256) & !15;
    let end = input.len().min(row + 512);

    let mut s = String::new();
    let _ = writeln!(s, "offset {off} (0x{off:x}):");
    while row < end {
        let chunk = &input[row..end.min(row + 16)];
        let mut line = [b' '; 77];
        let mut k = row;
        let mut j = 5;
        loop {
            line[j] = HEX[k & 0xF];
            k >>= 4;
            if k == 0 || j == 0 {
                break;
            }
            j -= 1;
        }
        let mut hx = 9;
        for (i, &b) in chunk.iter().enumerate() {
            line[hx] = HEX[(b >> 4) as usize];
            line[hx + 1] = HEX[(b & 0xF) as usize];
            hx += 3;
            if (i + 1) % 4 == 0 {
                hx += 1;
            }
            if (0x20..=0x7F).contains(&b) {
                line[61 + i] = b;
            }
        }
        let text = String::from_utf8_lossy(&line);
        let _ = writeln!(s, "{}", text.trim_end());
        row += 16;
    }
    s
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
