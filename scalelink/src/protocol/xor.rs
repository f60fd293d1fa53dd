//! XOR checksum used by STX/ETX scale frames.
//!
//! The checksum is a single-byte XOR fold of the covered range, carried on
//! the wire as two ASCII hex digits (high nibble first, upper case).

/// XOR-fold all bytes into one.
pub fn xor_fold(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Map a nibble (0..=15) to its ASCII hex digit.
///
/// `0..=9` maps to `'0'..='9'` (add `0x30`), `10..=15` to `'A'..='F'` (add `0x37`).
pub fn nibble_to_ascii(nibble: u8) -> u8 {
    let n = nibble & 0x0F;
    if n <= 9 { n + 0x30 } else { n + 0x37 }
}

/// Map an ASCII hex digit back to its nibble value.
///
/// Accepts lower case digits as well; returns `None` for anything else.
pub fn ascii_to_nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - 0x37),
        b'a'..=b'f' => Some(digit - 0x57),
        _ => None,
    }
}

/// Encode a checksum byte as its two wire characters.
pub fn encode_checksum(xor: u8) -> [u8; 2] {
    [nibble_to_ascii(xor >> 4), nibble_to_ascii(xor)]
}

/// Decode the two wire characters back into a checksum byte.
pub fn decode_checksum(hi: u8, lo: u8) -> Option<u8> {
    Some((ascii_to_nibble(hi)? << 4) | ascii_to_nibble(lo)?)
}

/// Compute the wire checksum of a covered byte range.
pub fn checksum_ascii(covered: &[u8]) -> [u8; 2] {
    encode_checksum(xor_fold(covered))
}
