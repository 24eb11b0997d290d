use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::georegistry::alphabet::bitmap_for;
use crate::georegistry::common::*;
use crate::georegistry::error::RegistryError;

/// One country's registered cells at depth 4: level-0 → level-1 → level-2 → level-3 symbols.
/// The first three levels keep the order their keys were inserted in.
pub type CountryTree = IndexMap<char, IndexMap<char, IndexMap<char, BTreeSet<char>>>>;

/// Collapses a country's depth-4 cells into one bitmap per 3-symbol prefix.
#[derive(Debug)]
pub struct CoverageBuilder {
    country: CountryCode,
    data: IndexMap<PrefixKey, CoverageBitmap>,
}

impl CoverageBuilder {
    pub fn new(country: CountryCode) -> Self {
        CoverageBuilder { country, data: IndexMap::new() }
    }

    /// Makes a builder holding every path of `tree`. Stops at the first symbol outside the
    /// alphabet.
    pub fn from_tree(country: CountryCode, tree: &CountryTree) -> Result<Self, RegistryError> {
        let mut builder = CoverageBuilder::new(country);
        builder.extend_from_tree(tree)?;
        Ok(builder)
    }

    pub fn extend_from_tree(&mut self, tree: &CountryTree) -> Result<(), RegistryError> {
        for (level0, level1_map) in tree {
            for (level1, level2_map) in level1_map {
                for (level2, level3_set) in level2_map {
                    let prefix = PrefixKey::from_symbols(*level0, *level1, *level2)?;
                    self.append(prefix, level3_set.iter().cloned())?;
                }
            }
        }
        Ok(())
    }

    /// Sets the 4th-level symbols of `prefix`, replacing anything already recorded for it. A
    /// replaced prefix keeps its original position.
    pub fn insert<I: IntoIterator<Item = char>>(
        &mut self,
        prefix: PrefixKey,
        symbols: I,
    ) -> Result<(), RegistryError> {
        let bitmap = bitmap_for(symbols)?;
        self.data.insert(prefix, bitmap);
        Ok(())
    }

    /// Adds 4th-level symbols to whatever `prefix` already holds.
    pub fn append<I: IntoIterator<Item = char>>(
        &mut self,
        prefix: PrefixKey,
        symbols: I,
    ) -> Result<(), RegistryError> {
        let bitmap = bitmap_for(symbols)?;
        let entry = self.data.entry(prefix).or_insert_with(CoverageBitmap::default);
        *entry = CoverageBitmap::new(entry.bits() | bitmap.bits());
        Ok(())
    }

    pub fn country(&self) -> CountryCode {
        self.country
    }

    /// (prefix, bitmap) pairs in the order prefixes were first seen. Prefixes with no
    /// 4th-level symbols are left out.
    pub fn finish(self) -> Vec<(PrefixKey, CoverageBitmap)> {
        self.data.into_iter().filter(|(_, bitmap)| !bitmap.is_empty()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::georegistry::alphabet::encode;

    fn tree_from(paths: &[(&str, &str)]) -> CountryTree {
        let mut tree = CountryTree::new();
        for (prefix, children) in paths {
            let chars: Vec<char> = prefix.chars().collect();
            tree.entry(chars[0])
                .or_default()
                .entry(chars[1])
                .or_default()
                .entry(chars[2])
                .or_default()
                .extend(children.chars());
        }
        tree
    }

    #[test]
    fn tree_to_pairs() {
        let tree = tree_from(&[("kr0", "ts"), ("kqg", ""), ("kr1", "v"), ("s00", "h")]);
        let pairs = CoverageBuilder::from_tree("CG".parse().unwrap(), &tree).unwrap().finish();

        let prefixes: Vec<String> = pairs.iter().map(|(prefix, _)| prefix.to_string()).collect();
        // kqg has no 4th-level symbols so it never becomes an entry
        assert_eq!(prefixes, vec!["kr0", "kr1", "s00"]);

        let (_, kr0) = pairs[0];
        assert!(kr0.contains(encode('t').unwrap()));
        assert!(kr0.contains(encode('s').unwrap()));
        assert_eq!(kr0.len(), 2);
        assert_eq!(pairs[2].1.bits(), 1, "h owns bit 0");
    }

    #[test]
    fn pairs_follow_tree_order() {
        let tree =
            tree_from(&[("s00", "h"), ("kr1", "v"), ("kqf", "g"), ("kr0", "t"), ("s01", "5")]);
        let pairs = CoverageBuilder::from_tree("CG".parse().unwrap(), &tree).unwrap().finish();

        let prefixes: Vec<String> = pairs.iter().map(|(prefix, _)| prefix.to_string()).collect();
        // grouped under their level-0 and level-1 parents, each level in insertion order
        assert_eq!(prefixes, vec!["s00", "s01", "kr1", "kr0", "kqf"]);
    }

    #[test]
    fn invalid_symbol_aborts_build() {
        let tree = tree_from(&[("kr0", "t"), ("kr1", "ta")]);
        match CoverageBuilder::from_tree("CG".parse().unwrap(), &tree) {
            Err(RegistryError::InvalidSymbol('a')) => {}
            other => panic!("expected InvalidSymbol, got {:?}", other),
        }

        let tree = tree_from(&[("ka0", "t")]);
        assert!(CoverageBuilder::from_tree("CG".parse().unwrap(), &tree).is_err());
    }

    #[test]
    fn insert_test() {
        let mut builder = CoverageBuilder::new("CG".parse().unwrap());
        let prefix: PrefixKey = "kr0".parse().unwrap();

        builder.insert(prefix, "tw".chars()).expect("Unable to insert record");
        builder.insert("kr1".parse().unwrap(), "v".chars()).expect("Unable to insert record");
        builder.insert(prefix, "h".chars()).expect("Unable to insert record");

        let pairs = builder.finish();
        assert_eq!(
            pairs,
            vec![
                (prefix, CoverageBitmap::from(1u32)),
                ("kr1".parse().unwrap(), CoverageBitmap::from(1u32 << 31)),
            ],
            "insert replaces in place"
        );
    }

    #[test]
    fn append_test() {
        let mut builder = CoverageBuilder::new("CG".parse().unwrap());
        let prefix: PrefixKey = "kr0".parse().unwrap();

        builder.insert(prefix, "h".chars()).expect("Unable to insert record");
        builder.append(prefix, "5".chars()).expect("Unable to append symbols");
        builder
            .append("kr1".parse().unwrap(), Vec::<char>::new())
            .expect("Unable to append symbols");

        assert_eq!(builder.country().to_string(), "CG");
        let pairs = builder.finish();
        assert_eq!(pairs, vec![(prefix, CoverageBitmap::new(0b11))]);
    }
}
