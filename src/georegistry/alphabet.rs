use crate::georegistry::common::CoverageBitmap;
use crate::georegistry::error::RegistryError;

/// The 32 geohash symbols, indexed by the bitmap bit each one owns.
pub const COVERAGE_SYMBOLS: &[u8; 32] = b"h5410pnjk7632rqmsed98xwtugfcbzyv";

const NO_BIT: u8 = 0xff;

// byte -> bit position, NO_BIT for anything outside the alphabet
static SYMBOL_BITS: [u8; 256] = build_symbol_bits();

const fn build_symbol_bits() -> [u8; 256] {
    let mut table = [NO_BIT; 256];
    let mut bit = 0;
    while bit < COVERAGE_SYMBOLS.len() {
        table[COVERAGE_SYMBOLS[bit] as usize] = bit as u8;
        bit += 1;
    }
    table
}

/// Bit position of a single symbol byte, or `None` if it isn't a geohash symbol.
#[inline]
pub fn bit_of(byte: u8) -> Option<u8> {
    match SYMBOL_BITS[byte as usize] {
        NO_BIT => None,
        bit => Some(bit),
    }
}

/// Maps a geohash symbol to its bit position in a coverage bitmap.
#[inline]
pub fn encode(symbol: char) -> Result<u8, RegistryError> {
    if symbol.is_ascii() {
        if let Some(bit) = bit_of(symbol as u8) {
            return Ok(bit);
        }
    }
    Err(RegistryError::InvalidSymbol(symbol))
}

/// The symbol owning `bit`, if `bit` is in 0..32.
#[inline]
pub fn symbol_for(bit: u8) -> Option<char> {
    COVERAGE_SYMBOLS.get(bit as usize).map(|b| *b as char)
}

/// ORs together the bit of every symbol. Repeats are harmless; an empty input gives zero.
pub fn bitmap_for<I: IntoIterator<Item = char>>(
    symbols: I,
) -> Result<CoverageBitmap, RegistryError> {
    let mut bitmap = CoverageBitmap::default();
    for symbol in symbols {
        bitmap.insert(encode(symbol)?);
    }
    Ok(bitmap)
}
