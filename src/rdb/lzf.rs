// LZF block decompression.
//
// Control byte < 32: literal run of `ctrl + 1` bytes. Otherwise a
// back-reference: length `(ctrl >> 5) + 2` (a top value of 7 adds the next
// byte), offset `((ctrl & 0x1F) << 8) | next` counted back from the write
// position minus one. Overlapping references repeat the window.

/// Pre-allocation ceiling; a declared size above this grows on demand,
/// so a lying header cannot reserve gigabytes up front.
const MAX_PREALLOC: usize = 1 << 20;

/// Decompress `src` into a fresh buffer of exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>, LzfError> {
    let mut out: Vec<u8> = Vec::with_capacity(expected_len.min(MAX_PREALLOC));
    let mut i = 0;

    while i < src.len() {
        let ctrl = usize::from(src[i]);
        i += 1;

        if ctrl < 32 {
            let run = ctrl + 1;
            if i + run > src.len() {
                return Err(LzfError::Truncated);
            }
            out.extend_from_slice(&src[i..i + run]);
            i += run;
        } else {
            let mut len = (ctrl >> 5) + 2;
            if len == 9 {
                let Some(&ext) = src.get(i) else {
                    return Err(LzfError::Truncated);
                };
                len += usize::from(ext);
                i += 1;
            }
            let Some(&low) = src.get(i) else {
                return Err(LzfError::Truncated);
            };
            i += 1;
            let offset = ((ctrl & 0x1F) << 8) | usize::from(low);
            let mut from = out
                .len()
                .checked_sub(offset + 1)
                .ok_or(LzfError::BadBackref)?;
            for _ in 0..len {
                let byte = out[from];
                out.push(byte);
                from += 1;
            }
        }
    }

    if out.len() != expected_len {
        return Err(LzfError::LengthMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzfError {
    /// Compressed stream ended inside a literal run or control sequence.
    Truncated,
    /// Back-reference points before the start of the output.
    BadBackref,
    /// Decompressed size differs from the declared size.
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for LzfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LzfError::Truncated => write!(f, "truncated compressed stream"),
            LzfError::BadBackref => write!(f, "back-reference before stream start"),
            LzfError::LengthMismatch { expected, actual } => {
                write!(f, "decompressed {actual} bytes, declared {expected}")
            }
        }
    }
}

impl std::error::Error for LzfError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
