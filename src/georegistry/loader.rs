use std::time::{Duration, Instant};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::georegistry::common::*;
use crate::georegistry::error::{BatchWriteFailure, RegistryError};
use crate::georegistry::store::{CoverageBatch, Registry};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 300;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct LoadOptions {
    /// Most entries sent in one write.
    pub max_batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions { max_batch_size: DEFAULT_MAX_BATCH_SIZE }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub index: usize,
    pub entries: usize,
    pub cost: usize,
}

/// What a country load committed. On failure this covers only the batches before the
/// failed one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub country: CountryCode,
    pub batches: Vec<BatchReport>,
    pub entry_count: usize,
    pub total_cost: usize,
    pub max_batch_cost: usize,
    pub elapsed: Duration,
}

impl LoadReport {
    fn new(country: CountryCode) -> Self {
        LoadReport {
            country,
            batches: Vec::new(),
            entry_count: 0,
            total_cost: 0,
            max_batch_cost: 0,
            elapsed: Duration::default(),
        }
    }

    fn record(&mut self, batch: BatchReport) {
        self.entry_count += batch.entries;
        self.total_cost += batch.cost;
        self.max_batch_cost = self.max_batch_cost.max(batch.cost);
        self.batches.push(batch);
    }

    /// Number of write calls issued and committed.
    pub fn write_count(&self) -> usize {
        self.batches.len()
    }
}

/// Writes a country's (prefix, bitmap) pairs to a registry in bounded batches, one after
/// another.
pub struct BatchLoader<'r, R: Registry + ?Sized> {
    registry: &'r R,
    options: LoadOptions,
}

impl<'r, R: Registry + ?Sized> BatchLoader<'r, R> {
    pub fn new(registry: &'r R, options: LoadOptions) -> Result<Self, RegistryError> {
        if options.max_batch_size == 0 {
            return Err(RegistryError::InvalidBatchSize(options.max_batch_size));
        }
        Ok(BatchLoader { registry, options })
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Commits `pairs` in order, `max_batch_size` at a time. Stops at the first failed batch;
    /// batches already committed stay committed.
    pub fn load(
        &self,
        country: CountryCode,
        pairs: &[(PrefixKey, CoverageBitmap)],
    ) -> Result<LoadReport, BatchWriteFailure> {
        let started = Instant::now();
        let mut report = LoadReport::new(country);

        for (index, chunk) in pairs.chunks(self.options.max_batch_size).enumerate() {
            let batch = CoverageBatch::from_pairs(country, chunk);
            match self.registry.commit(&batch) {
                Ok(receipt) => {
                    debug!(
                        country = %country,
                        batch = index,
                        entries = receipt.entries,
                        cost = receipt.cost,
                        "committed batch"
                    );
                    report.record(BatchReport {
                        index,
                        entries: receipt.entries,
                        cost: receipt.cost,
                    });
                }
                Err(cause) => {
                    report.elapsed = started.elapsed();
                    warn!(
                        country = %country,
                        batch = index,
                        committed_entries = report.entry_count,
                        error = %cause,
                        "batch write failed, stopping load"
                    );
                    return Err(BatchWriteFailure {
                        country,
                        batch_index: index,
                        committed: report,
                        cause,
                    });
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            country = %country,
            entries = report.entry_count,
            writes = report.write_count(),
            total_cost = report.total_cost,
            max_batch_cost = report.max_batch_cost,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "loaded country"
        );
        Ok(report)
    }

    /// Prefixes whose stored bitmap doesn't match `pairs`.
    pub fn verify(
        &self,
        country: CountryCode,
        pairs: &[(PrefixKey, CoverageBitmap)],
    ) -> Result<Vec<PrefixKey>, RegistryError> {
        let mut mismatched = Vec::new();
        for (prefix, expected) in pairs {
            if self.registry.get_coverage(country, *prefix)? != *expected {
                mismatched.push(*prefix);
            }
        }
        Ok(mismatched)
    }
}

/// Reports from a run over many countries.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub reports: Vec<LoadReport>,
}

impl LoadSummary {
    pub fn new() -> Self {
        LoadSummary::default()
    }

    pub fn push(&mut self, report: LoadReport) {
        self.reports.push(report);
    }

    pub fn total_cost(&self) -> usize {
        self.reports.iter().map(|report| report.total_cost).sum()
    }

    pub fn write_count(&self) -> usize {
        self.reports.iter().map(|report| report.write_count()).sum()
    }

    pub fn entry_count(&self) -> usize {
        self.reports.iter().map(|report| report.entry_count).sum()
    }

    /// Reports ordered from the most to the least expensive country.
    pub fn by_cost(&self) -> Vec<&LoadReport> {
        self.reports.iter().sorted_by(|a, b| b.total_cost.cmp(&a.total_cost)).collect()
    }
}
