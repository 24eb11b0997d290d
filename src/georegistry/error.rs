use failure::Fail;

use crate::georegistry::common::CountryCode;
use crate::georegistry::loader::LoadReport;

#[derive(Debug, Fail)]
pub enum RegistryError {
    #[fail(display = "unknown geohash symbol {:?}", _0)]
    InvalidSymbol(char),
    #[fail(display = "invalid country code {:?}: expected two ASCII letters", _0)]
    InvalidCountryCode(String),
    #[fail(display = "invalid prefix key {:?}: expected three geohash symbols", _0)]
    InvalidPrefixKey(String),
    #[fail(display = "got {} prefix keys but {} bitmaps", keys, bitmaps)]
    LengthMismatch { keys: usize, bitmaps: usize },
    #[fail(display = "geohash {:?} is shorter than the coverage depth of {}", geohash, depth)]
    PrecisionTooLow { geohash: String, depth: usize },
    #[fail(display = "write of {} bytes exceeds the write unit limit of {} bytes", cost, limit)]
    WriteLimitExceeded { cost: usize, limit: usize },
    #[fail(display = "max batch size must be at least 1, got {}", _0)]
    InvalidBatchSize(usize),
    #[fail(display = "stored value for {} is {} bytes, expected 4", key, len)]
    CorruptValue { key: String, len: usize },
    #[fail(display = "storage error: {}", _0)]
    Storage(#[cause] rocksdb::Error),
}

impl From<rocksdb::Error> for RegistryError {
    fn from(err: rocksdb::Error) -> Self {
        RegistryError::Storage(err)
    }
}

/// A batch write failed partway through a country load.
///
/// Batches committed before `batch_index` stay committed; `committed` describes them.
#[derive(Debug, Fail)]
#[fail(display = "batch {} for country {} failed: {}", batch_index, country, cause)]
pub struct BatchWriteFailure {
    pub country: CountryCode,
    pub batch_index: usize,
    pub committed: LoadReport,
    #[cause]
    pub cause: RegistryError,
}

impl BatchWriteFailure {
    /// Number of leading pairs that were committed before the failure. Re-issuing the load
    /// with the pairs from this offset onward finishes the registration.
    pub fn resume_offset(&self) -> usize {
        self.committed.entry_count
    }
}
