// CRC-64, Jones polynomial, as used by the snapshot trailer.
//
// Non-inverted: init 0, xorout 0, reflected in and out. The lookup tables are
// built once per process on first use and shared read-only afterwards.

use std::sync::LazyLock;

use crate::rdb::endian;

const POLY: u64 = 0xad93_d235_94c9_35a9;

/// Nested tables for slice-by-8: `TABLES[0]` is the plain byte table, each
/// further level folds one more byte of the 8-byte word.
static TABLES: LazyLock<Box<[[u64; 256]; 8]>> = LazyLock::new(|| {
    let mut tab = Box::new([[0u64; 256]; 8]);
    for n in 0..256u32 {
        let mut crc = 0u64;
        for i in 0..8 {
            let mut bit = crc & 0x8000_0000_0000_0000 != 0;
            if n & (1 << i) != 0 {
                bit = !bit;
            }
            crc <<= 1;
            if bit {
                crc ^= POLY;
            }
        }
        // the polynomial is given in normal form; the wire CRC is reflected
        tab[0][n as usize] = crc.reverse_bits();
    }
    for n in 0..256 {
        let mut crc = tab[0][n];
        for k in 1..8 {
            crc = tab[0][(crc & 0xFF) as usize] ^ (crc >> 8);
            tab[k][n] = crc;
        }
    }
    tab
});

#[inline]
fn fold_byte(tab: &[[u64; 256]; 8], crc: u64, byte: u8) -> u64 {
    tab[0][((crc ^ u64::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// Feed `data` into a running CRC. Start with `crc = 0`; chaining calls over
/// consecutive slices equals one call over their concatenation.
pub fn update(mut crc: u64, data: &[u8]) -> u64 {
    let tab = &**TABLES;

    // single bytes until the pointer is 8-aligned
    let head = data.as_ptr().align_offset(8).min(data.len());
    for &b in &data[..head] {
        crc = fold_byte(tab, crc, b);
    }

    let mut chunks = data[head..].chunks_exact(8);
    for word in chunks.by_ref() {
        crc ^= endian::le64(word);
        crc = tab[7][(crc & 0xFF) as usize]
            ^ tab[6][((crc >> 8) & 0xFF) as usize]
            ^ tab[5][((crc >> 16) & 0xFF) as usize]
            ^ tab[4][((crc >> 24) & 0xFF) as usize]
            ^ tab[3][((crc >> 32) & 0xFF) as usize]
            ^ tab[2][((crc >> 40) & 0xFF) as usize]
            ^ tab[1][((crc >> 48) & 0xFF) as usize]
            ^ tab[0][(crc >> 56) as usize];
    }

    for &b in chunks.remainder() {
        crc = fold_byte(tab, crc, b);
    }
    crc
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
