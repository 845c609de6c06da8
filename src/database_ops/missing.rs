//! Which identifiers still lack a script URL, as compact ranges per prefix.

use std::fmt;

use anyhow::Result;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::database_ops::store::DialogueStore;
use crate::normalization::identifier::IdentifierScheme;

/// Contiguous run of identifier numbers under one prefix, e.g. `B12-B15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange<'a> {
    pub prefix: &'a str,
    pub start: u64,
    pub end: u64,
    pub width: usize,
}

impl fmt::Display for IdRange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.width;
        if self.start == self.end {
            write!(f, "{}{:0w$}", self.prefix, self.start)
        } else {
            write!(
                f,
                "{p}{:0w$}-{p}{:0w$}",
                self.start,
                self.end,
                p = self.prefix
            )
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingReport {
    pub missing_titles: usize,
    /// Prefix → ranges, e.g. `"B" → ["B10-B12", "B20"]`. Prefixes sorted.
    pub ranges: IndexMap<String, Vec<String>>,
    /// Identifiers found per prefix (before collapsing).
    pub counts: IndexMap<String, usize>,
    /// Missing titles without a numeric identifier.
    pub unparsed: Vec<String>,
}

/// Collapse sorted, de-duplicated numbers into contiguous ranges.
pub fn collapse_ranges<'a>(prefix: &'a str, numbers: &[(u64, usize)]) -> Vec<IdRange<'a>> {
    let mut out: Vec<IdRange<'a>> = Vec::new();
    for &(n, width) in numbers {
        match out.last_mut() {
            Some(last) if last.end.checked_add(1) == Some(n) => last.end = n,
            _ => out.push(IdRange {
                prefix,
                start: n,
                end: n,
                width,
            }),
        }
    }
    out
}

pub fn build_missing_report(titles: &[String], scheme: &IdentifierScheme) -> MissingReport {
    let mut by_prefix: IndexMap<String, Vec<(u64, usize)>> = IndexMap::new();
    let mut unparsed = Vec::new();

    for title in titles {
        let parts = scheme.extract(title).and_then(|id| {
            id.split_numeric()
                .map(|p| (p.prefix.to_string(), p.number, p.width))
        });
        match parts {
            Some((prefix, number, width)) => {
                by_prefix.entry(prefix).or_default().push((number, width));
            }
            None => unparsed.push(title.clone()),
        }
    }
    by_prefix.sort_keys();

    let mut ranges = IndexMap::new();
    let mut counts = IndexMap::new();
    for (prefix, numbers) in by_prefix {
        let numbers: Vec<(u64, usize)> = numbers
            .into_iter()
            .sorted()
            .dedup_by(|a, b| a.0 == b.0)
            .collect();
        counts.insert(prefix.clone(), numbers.len());
        let labels: Vec<String> = collapse_ranges(&prefix, &numbers)
            .iter()
            .map(ToString::to_string)
            .collect();
        ranges.insert(prefix, labels);
    }

    MissingReport {
        missing_titles: titles.len(),
        ranges,
        counts,
        unparsed,
    }
}

/// Report for the titles in `store` that still have rows without a URL.
pub fn missing_report(store: &DialogueStore, scheme: &IdentifierScheme) -> Result<MissingReport> {
    let titles = store.titles_without_url()?;
    Ok(build_missing_report(&titles, scheme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::store::test_support::fixture_store;
    use crate::database_ops::store::StoreSchema;
    use crate::normalization::identifier::SchemePreset;

    fn scheme() -> IdentifierScheme {
        IdentifierScheme::preset(SchemePreset::Broad).unwrap()
    }

    #[test]
    fn collapses_contiguous_numbers() {
        let ranges = collapse_ranges("B", &[(10, 2), (11, 2), (12, 2), (20, 2)]);
        let labels: Vec<String> = ranges.iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["B10-B12", "B20"]);
    }

    #[test]
    fn keeps_zero_padding() {
        let ranges = collapse_ranges("E", &[(1, 2), (2, 2), (3, 2)]);
        assert_eq!(ranges[0].to_string(), "E01-E03");
    }

    #[test]
    fn groups_by_prefix_and_lists_unparsed_titles() {
        let titles: Vec<String> = [
            "B12 c", "B10 a", "B11 b", "B11 b (recut)", "B20", "E01 spring", "E02 summer",
            "PK-002 collab", "Untitled special",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let report = build_missing_report(&titles, &scheme());
        assert_eq!(report.missing_titles, 9);
        assert_eq!(report.ranges["B"], vec!["B10-B12", "B20"]);
        assert_eq!(report.counts["B"], 4);
        assert_eq!(report.ranges["E"], vec!["E01-E02"]);
        assert_eq!(report.ranges["PK-"], vec!["PK-002"]);
        assert_eq!(report.unparsed, vec!["Untitled special"]);
        let prefixes: Vec<&String> = report.ranges.keys().collect();
        assert_eq!(prefixes, vec!["B", "E", "PK-"]);
    }

    #[test]
    fn reads_missing_titles_from_store() {
        let (_dir, path) = fixture_store(&[
            ("B1_a", "x", Some("https://docs.google.com/1")),
            ("B2_b", "x", None),
            ("B3_c", "x", Some("")),
        ]);
        let store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let report = missing_report(&store, &scheme()).unwrap();
        assert_eq!(report.missing_titles, 2);
        assert_eq!(report.ranges["B"], vec!["B2-B3"]);
    }
}
