use georegistry_core::georegistry::*;

use failure::{bail, format_err, Error};
use indexmap::IndexMap;
use lz4::Decoder;
use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

// Util functions for tests, benchmarks and the load/dump binaries

/// Countries the load harness registers by default.
pub const COUNTRIES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AR", "AS", "AT", "AU", "AW", "AX", "AZ", "BA",
    "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BR", "BS", "BT", "BW",
    "BY", "BZ", "CA", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN", "CO", "CR", "CU", "CV",
    "CW", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET",
    "FI", "FJ", "FK", "FM", "FO", "GA", "GB", "GD", "GE", "GG", "GH", "GI", "GL", "GM", "GN", "GQ",
    "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM", "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM",
    "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN",
    "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY",
    "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK", "ML", "MM", "MN", "MO", "MP", "MR", "MS", "MT",
    "MU", "MV", "MW", "MX", "MY", "MZ", "NA", "NC", "NE", "NF", "NG", "NI", "NL", "NP", "NR", "NU",
    "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY",
    "QA", "RO", "RS", "RU", "RW", "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SK", "SL", "SM",
    "SN", "SO", "SR", "SS", "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TL",
    "TM", "TN", "TO", "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC",
    "VE", "VG", "VI", "VN", "VU", "WF", "WS", "YE", "ZA", "ZM", "ZW",
];

/// The deepest level of a source file is either a list of symbols or an object keyed by them.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum SourceLeaf {
    Symbols(Vec<String>),
    Keyed(BTreeMap<String, serde_json::Value>),
}

impl SourceLeaf {
    fn symbols(&self) -> Vec<&str> {
        match self {
            SourceLeaf::Symbols(symbols) => symbols.iter().map(|s| s.as_str()).collect(),
            SourceLeaf::Keyed(map) => map.keys().map(|s| s.as_str()).collect(),
        }
    }
}

type SourceTree = IndexMap<String, IndexMap<String, IndexMap<String, SourceLeaf>>>;

fn single_symbol(key: &str) -> Result<char, Error> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(symbol), None) => Ok(symbol),
        _ => Err(format_err!("expected a single geohash symbol, got {:?}", key)),
    }
}

/// Parses a country source file (a depth-4 nested JSON object) into a CountryTree, keeping the
/// file's key order.
pub fn country_tree_from_reader<T: Read>(source: T) -> Result<CountryTree, Error> {
    let raw: SourceTree = serde_json::from_reader(source)?;
    let mut tree = CountryTree::new();
    for (level0, level1_map) in &raw {
        let level0_entry = tree.entry(single_symbol(level0)?).or_default();
        for (level1, level2_map) in level1_map {
            let level1_entry = level0_entry.entry(single_symbol(level1)?).or_default();
            for (level2, leaf) in level2_map {
                let level3_set = level1_entry.entry(single_symbol(level2)?).or_default();
                for symbol in leaf.symbols() {
                    level3_set.insert(single_symbol(symbol)?);
                }
            }
        }
    }
    Ok(tree)
}

/// Reads a country source file, decompressing it first if it ends in `.lz4`.
pub fn load_country_tree<P: AsRef<Path>>(path: P) -> Result<CountryTree, Error> {
    let path = path.as_ref();
    let file = io::BufReader::new(File::open(path)?);
    if path.extension().map_or(false, |ext| ext == "lz4") {
        country_tree_from_reader(Decoder::new(file)?)
    } else {
        country_tree_from_reader(file)
    }
}

/// Finds `<CC>`, `<CC>.json` or `<CC>.json.lz4` under `data_dir`.
pub fn find_country_file(data_dir: &Path, country: CountryCode) -> Option<PathBuf> {
    let name = country.to_string();
    [name.clone(), name.clone() + ".json", name + ".json.lz4"]
        .iter()
        .map(|file_name| data_dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Builds the ordered (prefix, bitmap) pairs for one country's source file.
pub fn build_country<P: AsRef<Path>>(
    country: CountryCode,
    path: P,
) -> Result<Vec<(PrefixKey, CoverageBitmap)>, Error> {
    let tree = load_country_tree(path)?;
    Ok(CoverageBuilder::from_tree(country, &tree)?.finish())
}

/// Builds, loads and verifies each country in turn. A failed batch stops the whole run.
pub fn load_countries<R: Registry + ?Sized>(
    registry: &R,
    data_dir: &Path,
    countries: &[CountryCode],
    options: LoadOptions,
) -> Result<LoadSummary, Error> {
    let loader = BatchLoader::new(registry, options)?;
    let mut summary = LoadSummary::new();
    for country in countries {
        let path = match find_country_file(data_dir, *country) {
            Some(path) => path,
            None => {
                warn!(
                    country = %country,
                    data_dir = %data_dir.display(),
                    "no source file, skipping"
                );
                continue;
            }
        };
        let pairs = build_country(*country, &path)?;
        let report = loader.load(*country, &pairs)?;

        let mismatched = loader.verify(*country, &pairs)?;
        if !mismatched.is_empty() {
            bail!(
                "{} prefixes of {} do not match after loading, first is {}",
                mismatched.len(),
                country,
                mismatched[0]
            );
        }
        summary.push(report);
    }
    Ok(summary)
}

/// Formats an integer with a dot between each group of three digits.
pub fn add_number_dots(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(digit);
    }
    out
}

/// Human-readable run report: totals, then one line per country, most expensive first.
pub fn format_summary(summary: &LoadSummary, options: &LoadOptions) -> String {
    let elapsed: std::time::Duration = summary.reports.iter().map(|report| report.elapsed).sum();
    let mut out = String::new();
    out.push_str(&format!("total time: {}ms\n", elapsed.as_millis()));
    out.push_str(&format!("total cost: {}\n", add_number_dots(summary.total_cost())));
    out.push_str(&format!("total write count: {}\n", add_number_dots(summary.write_count())));
    out.push_str(&format!("max batch size: {}\n\n", options.max_batch_size));
    for report in summary.by_cost() {
        out.push_str(&format!(
            "country:{} cost:{} writes:{} time:{}ms max_write_cost:{}\n",
            report.country,
            add_number_dots(report.total_cost),
            report.write_count(),
            report.elapsed.as_millis(),
            add_number_dots(report.max_batch_cost),
        ));
    }
    out
}

#[derive(Serialize, Deserialize, Debug)]
struct DumpRecord {
    #[serde(flatten)]
    entry: CoverageEntry,
    symbols: String,
}

/// Takes a path to a registry directory and an output path, reads every entry, and writes one
/// JSON line per entry to the output file
pub fn dump_registry_to_json(registry_path: &str, json_path: &str) -> Result<(), Error> {
    let registry = RocksRegistry::open_read_only(registry_path)?;
    let output_file = File::create(json_path)?;
    let mut writer = BufWriter::new(output_file);
    for entry in registry.entries(None)? {
        let symbols: String = entry.bitmap.symbols().collect();
        let line = serde_json::to_string(&DumpRecord { entry, symbols })?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub struct TestRegistry {
    pub registry: RocksRegistry,
    pub directory: tempfile::TempDir,
}

/// Utility to create a RocksDB registry in a temporary directory, pre-filled with `entries`
pub fn create_registry(entries: Vec<CoverageEntry>, options: RegistryOptions) -> TestRegistry {
    let directory: tempfile::TempDir = tempfile::tempdir().unwrap();
    let registry = RocksRegistry::open(directory.path(), options).unwrap();
    for entry in entries {
        registry
            .update_coverage_batch(entry.country, &[entry.prefix], &[entry.bitmap])
            .expect("Unable to write entry");
    }
    TestRegistry { registry, directory }
}

/// Installs a stderr tracing subscriber filtered by RUST_LOG, defaulting to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn number_dots() {
        assert_eq!(add_number_dots(0), "0");
        assert_eq!(add_number_dots(999), "999");
        assert_eq!(add_number_dots(1000), "1.000");
        assert_eq!(add_number_dots(1234567), "1.234.567");
    }

    #[test]
    fn parses_both_leaf_shapes() {
        let json = r#"{"k": {"r": {"0": ["t", "u"], "1": {"h": 1, "5": true}, "2": []}}}"#;
        let tree = country_tree_from_reader(json.as_bytes()).unwrap();
        let level2 = &tree[&'k'][&'r'];
        assert_eq!(level2[&'0'].iter().collect::<String>(), "tu");
        assert_eq!(level2[&'1'].iter().collect::<String>(), "5h");
        assert!(level2[&'2'].is_empty());
    }

    #[test]
    fn keeps_file_order() {
        let json = r#"{"s": {"0": {"1": ["h"], "0": ["5"]}}, "k": {"r": {"0": ["t"]}}}"#;
        let tree = country_tree_from_reader(json.as_bytes()).unwrap();
        let country: CountryCode = "CG".parse().unwrap();
        let pairs = CoverageBuilder::from_tree(country, &tree).unwrap().finish();

        let prefixes: Vec<String> = pairs.iter().map(|(prefix, _)| prefix.to_string()).collect();
        assert_eq!(prefixes, vec!["s01", "s00", "kr0"]);
    }

    #[test]
    fn rejects_multi_character_keys() {
        let json = r#"{"kr": {"r": {"0": ["t"]}}}"#;
        assert!(country_tree_from_reader(json.as_bytes()).is_err());
        let json = r#"{"k": {"r": {"0": ["tt"]}}}"#;
        assert!(country_tree_from_reader(json.as_bytes()).is_err());
    }

    #[test]
    fn country_list_is_valid() {
        for code in COUNTRIES {
            let country: CountryCode = code.parse().unwrap();
            assert_eq!(&country.to_string(), code);
        }
    }
}
