//! Packed binary-coded decimal, as used by RTC time registers.

/// Encodes the two low decimal digits of `value` as packed BCD.
///
/// The value is reinterpreted as unsigned and reduced modulo 100, so
/// anything outside `0..=99` wraps instead of failing.
pub fn encode_bcd8(value: i8) -> u8 {
    pack(value as u8 % 100)
}

/// Same as [`encode_bcd8`] for wider inputs such as years since 1900.
pub fn encode_bcd16(value: i16) -> u8 {
    pack((value as u16 % 100) as u8)
}

pub fn decode_bcd(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

fn pack(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}
