use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::georegistry::common::*;
use crate::georegistry::error::RegistryError;
use crate::georegistry::query;

/// The entries of one write call, all for the same country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageBatch {
    country: CountryCode,
    entries: Vec<(PrefixKey, CoverageBitmap)>,
}

impl CoverageBatch {
    /// Pairs up `prefix_keys[i]` with `bitmaps[i]`; the slices must be the same length.
    pub fn new(
        country: CountryCode,
        prefix_keys: &[PrefixKey],
        bitmaps: &[CoverageBitmap],
    ) -> Result<Self, RegistryError> {
        if prefix_keys.len() != bitmaps.len() {
            return Err(RegistryError::LengthMismatch {
                keys: prefix_keys.len(),
                bitmaps: bitmaps.len(),
            });
        }
        let entries = prefix_keys.iter().cloned().zip(bitmaps.iter().cloned()).collect();
        Ok(CoverageBatch { country, entries })
    }

    pub fn from_pairs(country: CountryCode, pairs: &[(PrefixKey, CoverageBitmap)]) -> Self {
        CoverageBatch { country, entries: pairs.to_vec() }
    }

    pub fn country(&self) -> CountryCode {
        self.country
    }

    pub fn entries(&self) -> &[(PrefixKey, CoverageBitmap)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encoded size of the batch in bytes: one key and one value per entry.
    pub fn cost(&self) -> usize {
        self.entries.len() * (KEY_LENGTH + VALUE_LENGTH)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub entries: usize,
    pub cost: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Largest batch cost a single write will accept. `None` means unlimited.
    pub max_write_bytes: Option<usize>,
}

impl RegistryOptions {
    fn check(&self, batch: &CoverageBatch) -> Result<(), RegistryError> {
        match self.max_write_bytes {
            Some(limit) if batch.cost() > limit => {
                Err(RegistryError::WriteLimitExceeded { cost: batch.cost(), limit })
            }
            _ => Ok(()),
        }
    }
}

/// Sparse (country, prefix) → bitmap storage. Absent entries read as the zero bitmap.
///
/// `commit` is atomic: a failed call leaves the registry exactly as it was. Every written
/// bitmap replaces the stored one outright; nothing is merged and nothing is ever deleted.
pub trait Registry {
    fn commit(&self, batch: &CoverageBatch) -> Result<WriteReceipt, RegistryError>;

    fn coverage(&self, key: &CoverageKey) -> Result<Option<CoverageBitmap>, RegistryError>;

    /// All stored entries in key order, optionally limited to one country.
    fn entries(&self, country: Option<CountryCode>) -> Result<Vec<CoverageEntry>, RegistryError>;

    fn update_coverage_batch(
        &self,
        country: CountryCode,
        prefix_keys: &[PrefixKey],
        bitmaps: &[CoverageBitmap],
    ) -> Result<WriteReceipt, RegistryError> {
        let batch = CoverageBatch::new(country, prefix_keys, bitmaps)?;
        self.commit(&batch)
    }

    fn get_coverage(
        &self,
        country: CountryCode,
        prefix: PrefixKey,
    ) -> Result<CoverageBitmap, RegistryError> {
        Ok(self.coverage(&CoverageKey::new(country, prefix))?.unwrap_or_default())
    }

    fn is_inside(&self, country: CountryCode, geohash: &str) -> Result<bool, RegistryError> {
        query::is_inside(self, country, geohash)
    }
}

/// Registry held in process memory. Mostly useful for tests.
///
/// Reads share an `RwLock` with commits, so a query issued while a commit holds the write lock
/// waits for it to finish. `RocksRegistry` reads don't wait on writers.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    data: RwLock<BTreeMap<CoverageKey, CoverageBitmap>>,
    options: RegistryOptions,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry::default()
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        MemoryRegistry { data: RwLock::new(BTreeMap::new()), options }
    }

    pub fn len(&self) -> usize {
        self.data.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Registry for MemoryRegistry {
    fn commit(&self, batch: &CoverageBatch) -> Result<WriteReceipt, RegistryError> {
        self.options.check(batch)?;
        let mut data = self.data.write().expect("registry lock poisoned");
        for (prefix, bitmap) in batch.entries() {
            data.insert(CoverageKey::new(batch.country(), *prefix), *bitmap);
        }
        Ok(WriteReceipt { entries: batch.len(), cost: batch.cost() })
    }

    fn coverage(&self, key: &CoverageKey) -> Result<Option<CoverageBitmap>, RegistryError> {
        Ok(self.data.read().expect("registry lock poisoned").get(key).cloned())
    }

    fn entries(&self, country: Option<CountryCode>) -> Result<Vec<CoverageEntry>, RegistryError> {
        let data = self.data.read().expect("registry lock poisoned");
        Ok(data
            .iter()
            .filter(|(key, _)| country.map_or(true, |country| key.country == country))
            .map(|(key, bitmap)| CoverageEntry {
                country: key.country,
                prefix: key.prefix,
                bitmap: *bitmap,
            })
            .collect())
    }
}

/// Durable registry backed by a RocksDB directory.
pub struct RocksRegistry {
    db: DB,
    options: RegistryOptions,
    pub path: PathBuf,
}

impl RocksRegistry {
    /// Opens the registry at `path` for reading and writing, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P, options: RegistryOptions) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_owned();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, &path)?;
        debug!(
            path = %path.display(),
            max_write_bytes = ?options.max_write_bytes,
            "opened registry"
        );
        Ok(RocksRegistry { db, options, path })
    }

    /// Opens an existing registry for queries only; commits will fail.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_owned();
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, &path, false)?;
        debug!(path = %path.display(), "opened registry read-only");
        Ok(RocksRegistry { db, options: RegistryOptions::default(), path })
    }
}

impl fmt::Debug for RocksRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RocksRegistry")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish()
    }
}

fn decode_entry(db_key: &[u8], db_value: &[u8]) -> Result<CoverageEntry, RegistryError> {
    let key = CoverageKey::read_from(db_key)?;
    let bitmap = CoverageBitmap::read_from(db_value)
        .ok_or_else(|| RegistryError::CorruptValue { key: key.to_string(), len: db_value.len() })?;
    Ok(CoverageEntry { country: key.country, prefix: key.prefix, bitmap })
}

impl Registry for RocksRegistry {
    fn commit(&self, batch: &CoverageBatch) -> Result<WriteReceipt, RegistryError> {
        self.options.check(batch)?;

        let mut write_batch = WriteBatch::default();
        let mut db_key: Vec<u8> = Vec::with_capacity(KEY_LENGTH);
        let mut db_value: Vec<u8> = Vec::with_capacity(VALUE_LENGTH);
        for (prefix, bitmap) in batch.entries() {
            db_key.clear();
            // type marker is 0 -- coverage entry
            CoverageKey::new(batch.country(), *prefix).write_to(COVERAGE_MARKER, &mut db_key);

            db_value.clear();
            bitmap.write_to(&mut db_value);

            write_batch.put(&db_key, &db_value);
        }
        self.db.write(write_batch)?;
        Ok(WriteReceipt { entries: batch.len(), cost: batch.cost() })
    }

    fn coverage(&self, key: &CoverageKey) -> Result<Option<CoverageBitmap>, RegistryError> {
        let mut db_key: Vec<u8> = Vec::with_capacity(KEY_LENGTH);
        key.write_to(COVERAGE_MARKER, &mut db_key);

        match self.db.get(&db_key)? {
            Some(value) => {
                let bitmap = CoverageBitmap::read_from(&value).ok_or_else(|| {
                    RegistryError::CorruptValue { key: key.to_string(), len: value.len() }
                })?;
                Ok(Some(bitmap))
            }
            None => Ok(None),
        }
    }

    fn entries(&self, country: Option<CountryCode>) -> Result<Vec<CoverageEntry>, RegistryError> {
        let mut start_key: Vec<u8> = vec![COVERAGE_MARKER];
        if let Some(country) = country {
            start_key.extend_from_slice(country.as_bytes());
        }

        let mut out = Vec::new();
        for item in self.db.iterator(IteratorMode::From(&start_key, Direction::Forward)) {
            let (db_key, db_value) = item?;
            if !db_key.starts_with(&start_key) {
                break;
            }
            out.push(decode_entry(&db_key, &db_value)?);
        }
        Ok(out)
    }
}
