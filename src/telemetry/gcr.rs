//! # GCR Whitening Code
//!
//! Bidirectional DShot telemetry maps every nibble to one of sixteen 5-bit
//! symbols before transmission. The symbols are chosen so that no more than
//! two zero bits follow each other, which bounds the run length on the wire
//! and keeps enough edges for the receiver to stay in step.
//!
//! **Symbols**: 0x19 0x1B 0x12 0x13 0x1D 0x15 0x16 0x17 0x1A 0x09 0x0A 0x0B 0x1E 0x0D 0x0E 0x0F
//! **Invalid marker**: 0xFF

/// Marker for 5-bit patterns that are not a symbol
pub const GCR_INVALID: u8 = 0xFF;

/// Bits per GCR symbol
pub const GCR_SYMBOL_BITS: u32 = 5;

/// Nibble → 5-bit symbol
pub const GCR_ENCODE: [u8; 16] = [
    0x19, 0x1B, 0x12, 0x13, 0x1D, 0x15, 0x16, 0x17,
    0x1A, 0x09, 0x0A, 0x0B, 0x1E, 0x0D, 0x0E, 0x0F,
];

/// 5-bit symbol → nibble, `GCR_INVALID` for unused patterns
const GCR_DECODE: [u8; 32] = generate_gcr_decode_table();

/// Invert `GCR_ENCODE` at compile time
const fn generate_gcr_decode_table() -> [u8; 32] {
    let mut table = [GCR_INVALID; 32];
    let mut nibble = 0;

    while nibble < 16 {
        table[GCR_ENCODE[nibble] as usize] = nibble as u8;
        nibble += 1;
    }

    table
}

/// Map a 5-bit symbol back to its nibble
///
/// # Returns
///
/// * `Option<u8>` - Nibble 0x0-0xF, or `None` if the pattern is not a symbol
///
/// # Examples
///
/// ```
/// use dshot_engine::telemetry::gcr::nibble_from_symbol;
///
/// assert_eq!(nibble_from_symbol(0x19), Some(0x0));
/// assert_eq!(nibble_from_symbol(0x00), None);
/// ```
pub fn nibble_from_symbol(symbol: u8) -> Option<u8> {
    match GCR_DECODE[(symbol & 0x1F) as usize] {
        GCR_INVALID => None,
        nibble => Some(nibble),
    }
}

/// Map a nibble to its 5-bit symbol
pub fn symbol_from_nibble(nibble: u8) -> u8 {
    GCR_ENCODE[(nibble & 0x0F) as usize]
}
