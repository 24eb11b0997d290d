use crate::georegistry::alphabet::encode;
use crate::georegistry::common::*;
use crate::georegistry::error::RegistryError;
use crate::georegistry::store::Registry;

/// The depth-4 cell a geohash falls in: its prefix key and the bit of its 4th symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageCell {
    pub prefix: PrefixKey,
    pub bit: u8,
}

impl CoverageCell {
    /// Anything past the 4th symbol is ignored, including whether it's a valid symbol.
    pub fn from_geohash(geohash: &str) -> Result<Self, RegistryError> {
        let ([level0, level1, level2], child) = split_geohash(geohash)?;
        let prefix = PrefixKey::from_symbols(level0, level1, level2)?;
        let bit = encode(child)?;
        Ok(CoverageCell { prefix, bit })
    }
}

fn split_geohash(geohash: &str) -> Result<([char; PREFIX_LENGTH], char), RegistryError> {
    let mut symbols = geohash.chars();
    let mut cell = ['\0'; COVERAGE_DEPTH];
    for slot in cell.iter_mut() {
        *slot = symbols.next().ok_or_else(|| RegistryError::PrecisionTooLow {
            geohash: geohash.to_owned(),
            depth: COVERAGE_DEPTH,
        })?;
    }
    Ok(([cell[0], cell[1], cell[2]], cell[3]))
}

/// One lookup and one bit test. A prefix that isn't registered, or that can't be a prefix key
/// at all, is outside; the 4th symbol is only decoded once a bitmap is found.
pub fn is_inside<R: Registry + ?Sized>(
    registry: &R,
    country: CountryCode,
    geohash: &str,
) -> Result<bool, RegistryError> {
    let ([level0, level1, level2], child) = split_geohash(geohash)?;
    let prefix = match PrefixKey::from_symbols(level0, level1, level2) {
        Ok(prefix) => prefix,
        Err(_) => return Ok(false),
    };
    match registry.coverage(&CoverageKey::new(country, prefix))? {
        Some(bitmap) => Ok(bitmap.contains(encode(child)?)),
        None => Ok(false),
    }
}
