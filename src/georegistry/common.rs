use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::georegistry::alphabet::{bit_of, encode, symbol_for};
use crate::georegistry::error::RegistryError;

/// Number of geohash symbols at which coverage is recorded.
pub const COVERAGE_DEPTH: usize = 4;

/// Number of symbols in a prefix key.
pub const PREFIX_LENGTH: usize = COVERAGE_DEPTH - 1;

/// Two-letter country identifier, always stored uppercase.
#[derive(Serialize, Deserialize, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    pub fn new(code: &str) -> Result<Self, RegistryError> {
        match code.as_bytes() {
            [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
                Ok(CountryCode([a.to_ascii_uppercase(), b.to_ascii_uppercase()]))
            }
            _ => Err(RegistryError::InvalidCountryCode(code.to_owned())),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

impl FromStr for CountryCode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CountryCode::new(s)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = RegistryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        CountryCode::new(&s)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> String {
        code.to_string()
    }
}

/// The first three symbols of a geohash.
#[derive(Serialize, Deserialize, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(try_from = "String", into = "String")]
pub struct PrefixKey([u8; PREFIX_LENGTH]);

impl PrefixKey {
    pub fn new(prefix: &str) -> Result<Self, RegistryError> {
        match prefix.as_bytes() {
            [a, b, c] if [a, b, c].iter().all(|byte| bit_of(**byte).is_some()) => {
                Ok(PrefixKey([*a, *b, *c]))
            }
            _ => Err(RegistryError::InvalidPrefixKey(prefix.to_owned())),
        }
    }

    /// Builds a key from three symbols, failing on the first one outside the alphabet.
    pub fn from_symbols(level0: char, level1: char, level2: char) -> Result<Self, RegistryError> {
        for symbol in [level0, level1, level2].iter() {
            encode(*symbol)?;
        }
        Ok(PrefixKey([level0 as u8, level1 as u8, level2 as u8]))
    }

    pub fn as_bytes(&self) -> &[u8; PREFIX_LENGTH] {
        &self.0
    }
}

impl fmt::Display for PrefixKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{}", *byte as char)?;
        }
        Ok(())
    }
}

impl FromStr for PrefixKey {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrefixKey::new(s)
    }
}

impl TryFrom<String> for PrefixKey {
    type Error = RegistryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PrefixKey::new(&s)
    }
}

impl From<PrefixKey> for String {
    fn from(prefix: PrefixKey) -> String {
        prefix.to_string()
    }
}

/// Bit `i` set means the geohash `prefix ++ symbol_for(i)` is inside the country.
#[derive(Serialize, Deserialize, Debug, Default, PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(transparent)]
pub struct CoverageBitmap(u32);

impl CoverageBitmap {
    pub fn new(bits: u32) -> Self {
        CoverageBitmap(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn contains(&self, bit: u8) -> bool {
        bit < 32 && (self.0 >> bit) & 1 == 1
    }

    #[inline]
    pub fn insert(&mut self, bit: u8) {
        debug_assert!(bit < 32);
        self.0 |= 1 << bit;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// The 4th-level symbols covered, lowest bit first.
    pub fn symbols<'a>(&'a self) -> impl Iterator<Item = char> + 'a {
        (0..32u8).filter(move |bit| self.contains(*bit)).filter_map(symbol_for)
    }

    pub fn write_to(&self, db_value: &mut Vec<u8>) {
        let mut buf = [0u8; VALUE_LENGTH];
        BigEndian::write_u32(&mut buf, self.0);
        db_value.extend_from_slice(&buf);
    }

    /// Decodes a stored value; `None` unless it is exactly four bytes.
    pub fn read_from(db_value: &[u8]) -> Option<Self> {
        if db_value.len() != VALUE_LENGTH {
            return None;
        }
        Some(CoverageBitmap(BigEndian::read_u32(db_value)))
    }
}

impl From<u32> for CoverageBitmap {
    fn from(bits: u32) -> Self {
        CoverageBitmap(bits)
    }
}

impl fmt::Display for CoverageBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// keys are a marker byte for the record type followed by the two country code bytes and the
// three prefix symbols; all of it is ASCII so byte order matches (country, prefix) order
pub const COVERAGE_MARKER: u8 = 0;
pub const KEY_LENGTH: usize = 1 + 2 + PREFIX_LENGTH;
pub const VALUE_LENGTH: usize = 4;

#[derive(Serialize, Deserialize, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy)]
pub struct CoverageKey {
    pub country: CountryCode,
    pub prefix: PrefixKey,
}

impl CoverageKey {
    pub fn new(country: CountryCode, prefix: PrefixKey) -> Self {
        CoverageKey { country, prefix }
    }

    pub fn write_to(&self, type_marker: u8, db_key: &mut Vec<u8>) {
        db_key.push(type_marker);
        db_key.extend_from_slice(self.country.as_bytes());
        db_key.extend_from_slice(self.prefix.as_bytes());
    }

    pub fn read_from(db_key: &[u8]) -> Result<Self, RegistryError> {
        if db_key.len() != KEY_LENGTH {
            return Err(RegistryError::InvalidPrefixKey(String::from_utf8_lossy(db_key).into()));
        }
        let country = CountryCode::new(&String::from_utf8_lossy(&db_key[1..3]))?;
        let prefix = PrefixKey::new(&String::from_utf8_lossy(&db_key[3..]))?;
        Ok(CoverageKey { country, prefix })
    }
}

impl fmt::Display for CoverageKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.country, self.prefix)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct CoverageEntry {
    pub country: CountryCode,
    pub prefix: PrefixKey,
    pub bitmap: CoverageBitmap,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn country_code_parsing() {
        assert_eq!(CountryCode::new("CG").unwrap().to_string(), "CG");
        assert_eq!(CountryCode::new("cg").unwrap(), CountryCode::new("CG").unwrap());
        for bad in ["", "C", "USA", "C1", "ÇG"].iter() {
            assert!(CountryCode::new(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn prefix_key_parsing() {
        let prefix: PrefixKey = "kr0".parse().unwrap();
        assert_eq!(prefix.as_bytes(), b"kr0");
        assert_eq!(PrefixKey::from_symbols('k', 'r', '0').unwrap(), prefix);
        for bad in ["kr", "kr0t", "kra", "KR0"].iter() {
            assert!(PrefixKey::new(bad).is_err(), "{:?} should be rejected", bad);
        }
        match PrefixKey::from_symbols('k', 'i', '0') {
            Err(RegistryError::InvalidSymbol('i')) => {}
            other => panic!("expected InvalidSymbol, got {:?}", other),
        }
    }

    #[test]
    fn key_layout() {
        let key = CoverageKey::new("CG".parse().unwrap(), "kr0".parse().unwrap());
        let mut db_key = Vec::new();
        key.write_to(COVERAGE_MARKER, &mut db_key);
        assert_eq!(db_key, vec![0, b'C', b'G', b'k', b'r', b'0']);
        assert_eq!(db_key.len(), KEY_LENGTH);
        assert_eq!(CoverageKey::read_from(&db_key).unwrap(), key);
        assert!(CoverageKey::read_from(&db_key[..5]).is_err());
    }

    #[test]
    fn bitmap_value_is_big_endian() {
        let bitmap = CoverageBitmap::new(0x0080_0001);
        let mut db_value = Vec::new();
        bitmap.write_to(&mut db_value);
        assert_eq!(db_value, vec![0x00, 0x80, 0x00, 0x01]);
        assert_eq!(CoverageBitmap::read_from(&db_value), Some(bitmap));
        assert_eq!(CoverageBitmap::read_from(&db_value[..3]), None);
        assert_eq!(bitmap.to_string(), "0x00800001");
    }

    #[test]
    fn bitmap_symbols() {
        // bit 0 is h, bit 23 is t
        let bitmap = CoverageBitmap::new((1 << 23) | 1);
        assert_eq!(bitmap.symbols().collect::<String>(), "ht");
        assert_eq!(bitmap.len(), 2);
        assert!(bitmap.contains(23));
        assert!(!bitmap.contains(22));
        assert!(!bitmap.contains(40));
        assert!(CoverageBitmap::default().is_empty());
    }

    #[test]
    fn serializes_as_plain_strings() {
        let entry = CoverageEntry {
            country: "cg".parse().unwrap(),
            prefix: "kr0".parse().unwrap(),
            bitmap: CoverageBitmap::new(1),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"country":"CG","prefix":"kr0","bitmap":1}"#);
        let parsed: CoverageEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
        assert!(serde_json::from_str::<PrefixKey>(r#""kra""#).is_err());
    }
}
