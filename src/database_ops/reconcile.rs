//! URL backfill: store titles × identifier mapping → one atomic update batch.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::database_ops::mapping::IdentifierUrlMap;
use crate::database_ops::store::{CommitMode, DialogueStore, TitleUpdate};
use crate::normalization::identifier::{Identifier, IdentifierScheme};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Run the batch inside a transaction and roll it back.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpdate {
    pub identifier: Identifier,
    pub title: String,
    pub url: String,
}

/// Several store titles resolving to one identifier that the mapping knows.
/// Each title is still updated on its own; the overlap is only reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierCollision {
    pub identifier: Identifier,
    pub titles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub total_titles: usize,
    pub updates: Vec<PlannedUpdate>,
    pub collisions: Vec<IdentifierCollision>,
}

/// Decide which titles get which URL. Pure; the store is not touched.
pub fn plan(titles: &[String], mapping: &IdentifierUrlMap, scheme: &IdentifierScheme) -> ReconcilePlan {
    let mut updates = Vec::new();
    let mut by_identifier: BTreeMap<Identifier, Vec<String>> = BTreeMap::new();

    for title in titles {
        let Some(id) = scheme.extract(title) else {
            continue;
        };
        let Some(url) = mapping.get(id.as_str()) else {
            continue;
        };
        by_identifier
            .entry(id.clone())
            .or_default()
            .push(title.clone());
        updates.push(PlannedUpdate {
            identifier: id,
            title: title.clone(),
            url: url.to_string(),
        });
    }

    let collisions = by_identifier
        .into_iter()
        .filter(|(_, titles)| titles.len() > 1)
        .map(|(identifier, titles)| IdentifierCollision { identifier, titles })
        .collect();

    ReconcilePlan {
        total_titles: titles.len(),
        updates,
        collisions,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_titles: usize,
    /// Identifiers in the merged mapping.
    pub urls_available: usize,
    /// Titles whose identifier was found in the mapping.
    pub matched: usize,
    /// Store rows whose URL actually changed.
    pub updated_rows: usize,
    pub titles_with_url: usize,
    /// Titles with at least one row still lacking a URL after the run.
    pub still_missing: Vec<String>,
    pub collisions: Vec<IdentifierCollision>,
    pub dry_run: bool,
    pub finished_at: DateTime<Utc>,
}

impl Summary {
    pub fn still_missing_count(&self) -> usize {
        self.still_missing.len()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = if self.dry_run {
            "URL backfill summary (dry run, nothing committed)"
        } else {
            "URL backfill summary"
        };
        writeln!(f, "{heading}")?;
        writeln!(f, "  titles in store:        {}", self.total_titles)?;
        writeln!(f, "  URLs available:         {}", self.urls_available)?;
        writeln!(f, "  matched titles:         {}", self.matched)?;
        writeln!(f, "  updated rows:           {}", self.updated_rows)?;
        writeln!(f, "  titles with URL:        {}", self.titles_with_url)?;
        writeln!(f, "  titles still missing:   {}", self.still_missing_count())?;
        if !self.collisions.is_empty() {
            writeln!(f, "  identifier collisions:  {}", self.collisions.len())?;
        }
        Ok(())
    }
}

/// Backfill URLs for every title whose identifier is in `mapping`.
///
/// All updates go through one transaction: either the whole batch commits or,
/// on a store error, nothing does and the error is returned. Re-running with
/// the same mapping changes no rows.
#[instrument(skip_all, fields(dry_run = options.dry_run))]
pub fn reconcile(
    store: &mut DialogueStore,
    mapping: &IdentifierUrlMap,
    scheme: &IdentifierScheme,
    options: ReconcileOptions,
) -> Result<Summary> {
    let titles = store.distinct_titles()?;
    let plan = plan(&titles, mapping, scheme);
    for collision in &plan.collisions {
        warn!(
            identifier = %collision.identifier,
            titles = ?collision.titles,
            "several titles share one identifier"
        );
    }

    let updates: Vec<TitleUpdate> = plan
        .updates
        .iter()
        .map(|u| TitleUpdate {
            title: u.title.clone(),
            url: u.url.clone(),
        })
        .collect();
    let mode = if options.dry_run {
        CommitMode::RollBack
    } else {
        CommitMode::Commit
    };
    let batch = store.apply_updates(&updates, mode)?;

    let summary = Summary {
        total_titles: plan.total_titles,
        urls_available: mapping.len(),
        matched: plan.updates.len(),
        updated_rows: batch.changed_rows,
        titles_with_url: batch.titles_with_url,
        still_missing: batch.titles_without_url,
        collisions: plan.collisions,
        dry_run: options.dry_run,
        finished_at: Utc::now(),
    };
    info!(
        total_titles = summary.total_titles,
        urls_available = summary.urls_available,
        matched = summary.matched,
        updated_rows = summary.updated_rows,
        still_missing = summary.still_missing_count(),
        committed = batch.committed,
        "reconcile finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::mapping::{build_mapping, ColumnLayout};
    use crate::database_ops::source::ExternalRow;
    use crate::database_ops::store::test_support::{fixture_store, urls_for};
    use crate::database_ops::store::StoreSchema;
    use crate::normalization::identifier::SchemePreset;
    use crate::normalization::url_host::HostAllowList;

    fn scheme() -> IdentifierScheme {
        IdentifierScheme::preset(SchemePreset::Broad).unwrap()
    }

    fn mapping(entries: &[(&str, &str)]) -> IdentifierUrlMap {
        let s = scheme();
        let mut map = IdentifierUrlMap::new();
        for (id, url) in entries {
            map.insert(s.extract(id).unwrap(), *url);
        }
        map
    }

    #[test]
    fn backfills_every_row_of_a_matched_title() {
        let (_dir, path) = fixture_store(&[
            ("B1001_Episode", "おはよう", None),
            ("B1001_Episode", "こんにちは", None),
            ("B1002_Other", "line", None),
        ]);
        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let map = mapping(&[("B1001", "https://docs.google.com/x")]);

        let summary = reconcile(&mut store, &map, &scheme(), ReconcileOptions::default()).unwrap();
        assert_eq!(summary.total_titles, 2);
        assert_eq!(summary.urls_available, 1);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.updated_rows, 2);
        assert_eq!(summary.titles_with_url, 1);
        assert_eq!(summary.still_missing, vec!["B1002_Other"]);
        drop(store);

        let urls = urls_for(&path, "B1001_Episode");
        assert_eq!(urls.len(), 2);
        assert!(urls
            .iter()
            .all(|u| u.as_deref() == Some("https://docs.google.com/x")));
    }

    #[test]
    fn second_run_changes_nothing() {
        let (_dir, path) = fixture_store(&[
            ("B1001_Episode", "a", None),
            ("B1001_Episode", "b", None),
            ("PK-002 collab", "c", Some("")),
            ("Untitled", "d", None),
        ]);
        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let map = mapping(&[
            ("B1001", "https://docs.google.com/x"),
            ("PK-002", "https://docs.google.com/y"),
        ]);

        let first = reconcile(&mut store, &map, &scheme(), ReconcileOptions::default()).unwrap();
        assert_eq!(first.updated_rows, 3);
        let second = reconcile(&mut store, &map, &scheme(), ReconcileOptions::default()).unwrap();
        assert_eq!(second.updated_rows, 0);
        assert_eq!(second.matched, first.matched);
        assert_eq!(second.still_missing, first.still_missing);
        assert_eq!(second.still_missing, vec!["Untitled"]);
    }

    #[test]
    fn disallowed_host_leaves_title_missing() {
        let (_dir, path) = fixture_store(&[("B2002_Show", "line", None)]);
        let rows = vec![ExternalRow::cells(["B2002", "https://evil.example.com/x"])];
        let (map, stats) = build_mapping(
            &rows,
            ColumnLayout::Fixed {
                id_column: 0,
                url_column: 1,
            },
            0,
            &scheme(),
            &HostAllowList::default(),
        );
        assert!(map.is_empty());
        assert_eq!(stats.disallowed_host, 1);

        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let summary = reconcile(&mut store, &map, &scheme(), ReconcileOptions::default()).unwrap();
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.updated_rows, 0);
        assert_eq!(summary.still_missing, vec!["B2002_Show"]);
    }

    #[test]
    fn dry_run_counts_without_committing() {
        let (_dir, path) = fixture_store(&[("B1_a", "x", None), ("B1_a", "y", None)]);
        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let map = mapping(&[("B1", "https://docs.google.com/1")]);

        let summary = reconcile(&mut store, &map, &scheme(), ReconcileOptions { dry_run: true }).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.updated_rows, 2);
        assert!(summary.still_missing.is_empty());
        assert_eq!(store.titles_without_url().unwrap(), vec!["B1_a"]);
    }

    #[test]
    fn failed_update_commits_nothing() {
        let (_dir, path) = fixture_store(&[("B1_a", "x", None), ("B2_b", "y", None)]);
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_b2 BEFORE UPDATE ON dialogues
             WHEN OLD.script_name = 'B2_b'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
        drop(conn);

        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let map = mapping(&[
            ("B1", "https://docs.google.com/1"),
            ("B2", "https://docs.google.com/2"),
        ]);
        let err = reconcile(&mut store, &map, &scheme(), ReconcileOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("B2_b"));
        drop(store);

        assert_eq!(urls_for(&path, "B1_a"), vec![None]);
        assert_eq!(urls_for(&path, "B2_b"), vec![None]);
    }

    #[test]
    fn titles_sharing_an_identifier_are_reported_not_merged() {
        let titles = vec![
            "B7_first cut".to_string(),
            "B7_second cut".to_string(),
            "B8 solo".to_string(),
            "no id".to_string(),
        ];
        let map = mapping(&[("B7", "https://docs.google.com/7"), ("B8", "https://docs.google.com/8")]);
        let plan = plan(&titles, &map, &scheme());
        assert_eq!(plan.total_titles, 4);
        assert_eq!(plan.updates.len(), 3);
        assert_eq!(plan.collisions.len(), 1);
        assert_eq!(plan.collisions[0].identifier.as_str(), "B7");
        assert_eq!(plan.collisions[0].titles, vec!["B7_first cut", "B7_second cut"]);
    }

    #[test]
    fn summary_renders_counts() {
        let (_dir, path) = fixture_store(&[("B1_a", "x", None), ("C9_b", "y", None)]);
        let mut store = DialogueStore::open(&path, StoreSchema::default()).unwrap();
        let map = mapping(&[("B1", "https://docs.google.com/1")]);
        let summary = reconcile(&mut store, &map, &scheme(), ReconcileOptions::default()).unwrap();
        let text = summary.to_string();
        assert!(text.contains("matched titles:         1"));
        assert!(text.contains("titles still missing:   1"));
    }
}
