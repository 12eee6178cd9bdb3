// Fixed-width field unpackers.
//
// The wire format mixes little-endian integers (compact list headers,
// immediates, the dump trailer) with big-endian ones (plain lengths, stream
// ids), plus two odd widths (13-bit, 24-bit) that need manual sign handling.
// Callers guarantee the slice holds enough bytes; there is no error path.

/// Little-endian u16.
#[inline]
pub fn le16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

/// Little-endian u32.
#[inline]
pub fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Little-endian u64.
#[inline]
pub fn le64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Big-endian u32.
#[inline]
pub fn be32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Big-endian u64.
#[inline]
pub fn be64(b: &[u8]) -> u64 {
    u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Little-endian IEEE-754 double.
#[inline]
pub fn f64le(b: &[u8]) -> f64 {
    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

// ---------------------------------------------------------------------------
// Sign extension
// ---------------------------------------------------------------------------

#[inline]
pub fn s8(b: &[u8]) -> i64 {
    i64::from(b[0] as i8)
}

/// Signed 16-bit, little-endian.
#[inline]
pub fn s16(b: &[u8]) -> i64 {
    i64::from(le16(b) as i16)
}

/// Signed 24-bit, little-endian. The sign bit sits at bit 23.
#[inline]
pub fn s24(b: &[u8]) -> i64 {
    let v = u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16);
    i64::from(((v << 8) as i32) >> 8)
}

/// Signed 32-bit, little-endian.
#[inline]
pub fn s32(b: &[u8]) -> i64 {
    i64::from(le32(b) as i32)
}

/// Signed 64-bit, little-endian.
#[inline]
pub fn s64(b: &[u8]) -> i64 {
    le64(b) as i64
}

/// Signed 13-bit, packed big-endian: five value bits in the low half of the
/// first byte, eight in the second. The sign bit is bit 12.
#[inline]
pub fn s13(b: &[u8]) -> i64 {
    let v = (u32::from(b[0] & 0x1F) << 8) | u32::from(b[1]);
    if v & 0x1000 != 0 {
        i64::from(v) - 0x2000
    } else {
        i64::from(v)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_widths() {
        assert_eq!(le16(&[0x34, 0x12]), 0x1234);
        assert_eq!(le32(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(
            le64(&[0xEF, 0xCD, 0xAB, 0x89, 0x67, 0x45, 0x23, 0x01]),
            0x0123_4567_89AB_CDEF
        );
        assert_eq!(be32(&[0x12, 0x34, 0x56, 0x78]), 0x1234_5678);
        assert_eq!(
            be64(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]),
            0x0123_4567_89AB_CDEF
        );
    }

    #[test]
    fn standard_sign_extension() {
        assert_eq!(s8(&[0x7F]), 127);
        assert_eq!(s8(&[0x80]), -128);
        assert_eq!(s16(&[0xFF, 0xFF]), -1);
        assert_eq!(s16(&[0x00, 0x80]), -32768);
        assert_eq!(s32(&[0xFF, 0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(s32(&[0x00, 0x00, 0x00, 0x80]), i64::from(i32::MIN));
        assert_eq!(s64(&[0xFF; 8]), -1);
        assert_eq!(s64(&[0, 0, 0, 0, 0, 0, 0, 0x80]), i64::MIN);
    }

    #[test]
    fn twenty_four_bit() {
        assert_eq!(s24(&[0x00, 0x00, 0x00]), 0);
        assert_eq!(s24(&[0xFF, 0xFF, 0x7F]), 8_388_607);
        assert_eq!(s24(&[0x00, 0x00, 0x80]), -8_388_608);
        assert_eq!(s24(&[0xFF, 0xFF, 0xFF]), -1);
    }

    #[test]
    fn thirteen_bit() {
        assert_eq!(s13(&[0x00, 0x00]), 0);
        assert_eq!(s13(&[0x0F, 0xFF]), 4095);
        assert_eq!(s13(&[0x10, 0x00]), -4096);
        assert_eq!(s13(&[0x1F, 0xFF]), -1);
        // high three bits of the first byte are the entry code, not value
        assert_eq!(s13(&[0xC0 | 0x1F, 0xFF]), -1);
    }

    #[test]
    fn double_bits() {
        assert_eq!(f64le(&1.5f64.to_le_bytes()), 1.5);
        assert_eq!(f64le(&f64::NEG_INFINITY.to_le_bytes()), f64::NEG_INFINITY);
    }
}
