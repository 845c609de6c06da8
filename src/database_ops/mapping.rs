//! Identifier → URL mapping built from spreadsheet exports.
//!
//! Each sheet is described by a [`SourceLayout`]: where the identifier and URL
//! live, and how many leading metadata rows to skip. Rows that fail any check
//! are skipped and counted in [`BuildStats`]; nothing at row level aborts a load.
//!
//! Several sheets are combined with [`merge_by_precedence`], which takes the
//! sources highest-precedence first and reports every identifier whose URL
//! differs between sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database_ops::source::{load_rows, ExternalRow, SourceLoad};
use crate::normalization::identifier::{Identifier, IdentifierScheme};
use crate::normalization::url_host::HostAllowList;

/// Header rows above the data in both production sheets.
pub const DEFAULT_SKIP_ROWS: usize = 4;

/// Where to find the identifier and URL within a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnLayout {
    Fixed { id_column: usize, url_column: usize },
    /// Left-to-right scan: first cell yielding an identifier, first accepted URL.
    Scan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLayout {
    pub name: String,
    pub path: PathBuf,
    pub columns: ColumnLayout,
    pub skip_rows: usize,
}

impl SourceLayout {
    pub fn fixed(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        id_column: usize,
        url_column: usize,
        skip_rows: usize,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            columns: ColumnLayout::Fixed {
                id_column,
                url_column,
            },
            skip_rows,
        }
    }

    pub fn scan(name: impl Into<String>, path: impl Into<PathBuf>, skip_rows: usize) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            columns: ColumnLayout::Scan,
            skip_rows,
        }
    }

    /// Layouts of the two long-lived production sheets.
    ///
    /// - `progress-new`: work-progress sheet, identifier in column 3, URL in column 11.
    /// - `archive-2019`: past-videos list, identifier in column 3, URL in column 4.
    pub fn preset(name: &str, path: impl Into<PathBuf>) -> Option<Self> {
        match name {
            "progress-new" => Some(Self::fixed(name, path, 3, 11, DEFAULT_SKIP_ROWS)),
            "archive-2019" => Some(Self::fixed(name, path, 3, 4, DEFAULT_SKIP_ROWS)),
            _ => None,
        }
    }
}

/// Parses `name=path:id_col:url_col:skip`, `name=path:scan:skip`, or a preset
/// `progress-new=path` / `archive-2019=path`.
impl FromStr for SourceLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, rest) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("source '{s}' must look like name=path[:...]"))?;
        let name = name.trim();
        if name.is_empty() || rest.is_empty() {
            bail!("source '{s}' needs both a name and a path");
        }

        let parts: Vec<&str> = rest.rsplitn(4, ':').collect();
        if let [skip, url, id, path] = parts.as_slice() {
            if let (Ok(id), Ok(url), Ok(skip)) = (
                id.parse::<usize>(),
                url.parse::<usize>(),
                skip.parse::<usize>(),
            ) {
                return Ok(Self::fixed(name, *path, id, url, skip));
            }
        }
        let parts: Vec<&str> = rest.rsplitn(3, ':').collect();
        if let [skip, mode, path] = parts.as_slice() {
            if mode.eq_ignore_ascii_case("scan") {
                let skip = skip
                    .parse::<usize>()
                    .map_err(|_| anyhow!("source '{s}': skip rows '{skip}' is not a number"))?;
                return Ok(Self::scan(name, *path, skip));
            }
        }
        Self::preset(name, rest).ok_or_else(|| {
            anyhow!(
                "source '{s}': expected name=path:id_col:url_col:skip, name=path:scan:skip, \
                 or a preset (progress-new, archive-2019)"
            )
        })
    }
}

/// Why a data row contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Malformed,
    EmptyCell,
    InvalidIdentifier,
    DisallowedHost,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub rows_read: usize,
    pub header_rows: usize,
    pub inserted: usize,
    /// Rows that replaced an earlier row's URL for the same identifier.
    pub overwritten: usize,
    pub malformed: usize,
    pub empty_cell: usize,
    pub invalid_identifier: usize,
    pub disallowed_host: usize,
}

impl BuildStats {
    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Malformed => self.malformed += 1,
            SkipReason::EmptyCell => self.empty_cell += 1,
            SkipReason::InvalidIdentifier => self.invalid_identifier += 1,
            SkipReason::DisallowedHost => self.disallowed_host += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.malformed + self.empty_cell + self.invalid_identifier + self.disallowed_host
    }
}

/// Identifier → URL, keys unique, iteration in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IdentifierUrlMap {
    entries: IndexMap<Identifier, String>,
}

impl IdentifierUrlMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the previous URL.
    pub fn insert(&mut self, id: Identifier, url: impl Into<String>) -> Option<String> {
        self.entries.insert(id, url.into())
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Merge two maps where `self` takes precedence: on a shared identifier the
    /// URL from `self` is kept and the one from `lower` is discarded.
    pub fn apply_over(mut self, lower: IdentifierUrlMap) -> IdentifierUrlMap {
        for (id, url) in lower.entries {
            self.entries.entry(id).or_insert(url);
        }
        self
    }
}

/// Build the mapping for one source's rows.
pub fn build_mapping(
    rows: &[ExternalRow],
    columns: ColumnLayout,
    skip_rows: usize,
    scheme: &IdentifierScheme,
    hosts: &HostAllowList,
) -> (IdentifierUrlMap, BuildStats) {
    let mut map = IdentifierUrlMap::new();
    let mut stats = BuildStats::default();

    for (idx, row) in rows.iter().enumerate() {
        stats.rows_read += 1;
        if idx < skip_rows {
            stats.header_rows += 1;
            continue;
        }
        let found = match columns {
            ColumnLayout::Fixed {
                id_column,
                url_column,
            } => fixed_entry(row, id_column, url_column, scheme, hosts),
            ColumnLayout::Scan => scanned_entry(row, scheme, hosts),
        };
        match found {
            Ok((id, url)) => {
                if let Some(previous) = map.insert(id.clone(), url) {
                    debug!(identifier = %id, previous = %previous, "later row overwrote identifier");
                    stats.overwritten += 1;
                } else {
                    stats.inserted += 1;
                }
            }
            Err(reason) => stats.record_skip(reason),
        }
    }
    (map, stats)
}

fn fixed_entry(
    row: &ExternalRow,
    id_column: usize,
    url_column: usize,
    scheme: &IdentifierScheme,
    hosts: &HostAllowList,
) -> Result<(Identifier, String), SkipReason> {
    if row.is_malformed() {
        return Err(SkipReason::Malformed);
    }
    let id_cell = row.cell(id_column).trim();
    let url_cell = row.cell(url_column).trim();
    if id_cell.is_empty() || url_cell.is_empty() {
        return Err(SkipReason::EmptyCell);
    }
    let id = scheme
        .extract(id_cell)
        .ok_or(SkipReason::InvalidIdentifier)?;
    if !hosts.accepts(url_cell) {
        return Err(SkipReason::DisallowedHost);
    }
    Ok((id, url_cell.to_string()))
}

fn scanned_entry(
    row: &ExternalRow,
    scheme: &IdentifierScheme,
    hosts: &HostAllowList,
) -> Result<(Identifier, String), SkipReason> {
    let ExternalRow::Cells(cells) = row else {
        return Err(SkipReason::Malformed);
    };
    let mut id = None;
    let mut url = None;
    let mut saw_url = false;
    for cell in cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if id.is_none() {
            id = scheme.extract(cell);
        }
        if url.is_none() && HostAllowList::looks_like_url(cell) {
            saw_url = true;
            if hosts.accepts(cell) {
                url = Some(cell.to_string());
            }
        }
        if id.is_some() && url.is_some() {
            break;
        }
    }
    match (id, url) {
        (Some(id), Some(url)) => Ok((id, url)),
        (None, _) if cells.iter().all(|c| c.trim().is_empty()) => Err(SkipReason::EmptyCell),
        (None, _) => Err(SkipReason::InvalidIdentifier),
        (Some(_), None) if saw_url => Err(SkipReason::DisallowedHost),
        (Some(_), None) => Err(SkipReason::EmptyCell),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Loaded,
    Missing,
    Failed,
}

/// One source after loading and row extraction.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltSource {
    pub name: String,
    pub status: SourceStatus,
    pub stats: BuildStats,
    #[serde(skip)]
    pub map: IdentifierUrlMap,
}

impl BuiltSource {
    pub fn from_rows(
        name: impl Into<String>,
        rows: &[ExternalRow],
        columns: ColumnLayout,
        skip_rows: usize,
        scheme: &IdentifierScheme,
        hosts: &HostAllowList,
    ) -> Self {
        let (map, stats) = build_mapping(rows, columns, skip_rows, scheme, hosts);
        Self {
            name: name.into(),
            status: SourceStatus::Loaded,
            stats,
            map,
        }
    }

    fn empty(name: &str, status: SourceStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            stats: BuildStats::default(),
            map: IdentifierUrlMap::new(),
        }
    }
}

/// Load one sheet from disk. Missing or unreadable files yield an empty source.
pub fn load_source(
    layout: &SourceLayout,
    scheme: &IdentifierScheme,
    hosts: &HostAllowList,
) -> BuiltSource {
    let rows = match load_rows(Path::new(&layout.path)) {
        Ok(SourceLoad::Loaded(rows)) => rows,
        Ok(SourceLoad::Missing) => return BuiltSource::empty(&layout.name, SourceStatus::Missing),
        Err(e) => {
            warn!(source = %layout.name, error = ?e, "source unreadable; contributing zero rows");
            return BuiltSource::empty(&layout.name, SourceStatus::Failed);
        }
    };
    let built = BuiltSource::from_rows(
        layout.name.clone(),
        &rows,
        layout.columns,
        layout.skip_rows,
        scheme,
        hosts,
    );
    info!(
        source = %built.name,
        rows = built.stats.rows_read,
        entries = built.map.len(),
        skipped = built.stats.skipped(),
        overwritten = built.stats.overwritten,
        "source mapped"
    );
    built
}

/// An identifier present in two sources with different URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    pub identifier: Identifier,
    pub kept: String,
    pub kept_source: String,
    pub discarded: String,
    pub discarded_source: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedMapping {
    pub map: IdentifierUrlMap,
    pub conflicts: Vec<MergeConflict>,
    pub sources: Vec<BuiltSource>,
}

/// Merge sources given highest precedence first.
///
/// The first source to supply an identifier wins. A lower source supplying a
/// different URL for it is recorded as a [`MergeConflict`]; an identical URL is not.
pub fn merge_by_precedence(sources: Vec<BuiltSource>) -> MergedMapping {
    let mut map = IdentifierUrlMap::new();
    let mut origin: HashMap<Identifier, usize> = HashMap::new();
    let mut conflicts = Vec::new();

    for (idx, source) in sources.iter().enumerate() {
        for (id, url) in source.map.iter() {
            let existing = map.get(id.as_str()).map(str::to_string);
            match existing {
                None => {
                    map.insert(id.clone(), url);
                    origin.insert(id.clone(), idx);
                }
                Some(kept) if kept != url => {
                    let kept_source = origin
                        .get(id)
                        .map(|&i| sources[i].name.clone())
                        .unwrap_or_default();
                    warn!(
                        identifier = %id,
                        kept_source = %kept_source,
                        discarded_source = %source.name,
                        "identifier maps to different URLs across sources"
                    );
                    conflicts.push(MergeConflict {
                        identifier: id.clone(),
                        kept,
                        kept_source,
                        discarded: url.to_string(),
                        discarded_source: source.name.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    MergedMapping {
        map,
        conflicts,
        sources,
    }
}

/// Load every layout and merge them, `layouts[0]` taking precedence.
pub fn build_merged(
    layouts: &[SourceLayout],
    scheme: &IdentifierScheme,
    hosts: &HostAllowList,
) -> MergedMapping {
    let sources = layouts
        .iter()
        .map(|layout| load_source(layout, scheme, hosts))
        .collect();
    let merged = merge_by_precedence(sources);
    info!(
        sources = merged.sources.len(),
        identifiers = merged.map.len(),
        conflicts = merged.conflicts.len(),
        "mapping merged"
    );
    merged
}
