use anyhow::{bail, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::cli::{resolve_hosts, resolve_scheme, resolve_store_location};
use crate::database_ops::mapping::{build_merged, SourceLayout};
use crate::database_ops::reconcile::{reconcile, ReconcileOptions, Summary};
use crate::database_ops::snapshot::StoreSnapshot;
use crate::database_ops::store::{DialogueStore, StoreSchema};
use crate::normalization::identifier::SchemePreset;
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct ReconcileConfig {
    /// Store path or http(s) URL; falls back to `SCRIPT_DB`.
    pub store: Option<String>,
    pub schema: StoreSchema,
    /// Highest precedence first.
    pub sources: Vec<SourceLayout>,
    pub scheme: Option<SchemePreset>,
    pub allowed_hosts: Vec<String>,
    pub dry_run: bool,
}

pub async fn run(cfg: ReconcileConfig) -> Result<Summary> {
    env_util::init_env();
    if cfg.sources.is_empty() {
        bail!("at least one --source is required");
    }
    let location = resolve_store_location(cfg.store)?;
    let scheme = resolve_scheme(cfg.scheme)?;
    let hosts = resolve_hosts(&cfg.allowed_hosts);

    let snapshot = StoreSnapshot::acquire(&location).await?;
    if snapshot.is_remote() && !cfg.dry_run {
        bail!("remote store snapshots are discarded after the run; use --dry-run or a local path");
    }

    let merged = build_merged(&cfg.sources, &scheme, &hosts);
    if merged.map.is_empty() {
        warn!("no URLs found in any source");
    }

    let mut store = DialogueStore::open(snapshot.path(), cfg.schema)?;
    let summary = reconcile(
        &mut store,
        &merged.map,
        &scheme,
        ReconcileOptions {
            dry_run: cfg.dry_run,
        },
    )?;
    store.close()?;

    eprint!("{summary}");
    let out = json!({
        "summary": summary,
        "sources": merged.sources,
        "conflicts": merged.conflicts,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    info!(store = %location, "reconcile done");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::store::test_support::{fixture_store, urls_for};

    #[tokio::test]
    async fn runs_end_to_end_against_files() {
        let (dir, path) = fixture_store(&[
            ("B1001_Episode", "a", None),
            ("B1001_Episode", "b", None),
            ("B1002_Next", "c", None),
            ("B1003_Old", "d", None),
        ]);
        let newer = dir.path().join("new.csv");
        let older = dir.path().join("2019.csv");
        std::fs::write(
            &newer,
            "title\nnotes\n,,\nid,url\nB1001,https://docs.google.com/new-1001\nB1002,https://evil.example.com/x\n",
        )
        .unwrap();
        std::fs::write(
            &older,
            "title\nnotes\n,,\nid,url\nB1001,https://docs.google.com/old-1001\nB1003,https://docs.google.com/old-1003\n",
        )
        .unwrap();

        let cfg = ReconcileConfig {
            store: Some(path.to_string_lossy().into_owned()),
            sources: vec![
                SourceLayout::fixed("new", &newer, 0, 1, 4),
                SourceLayout::fixed("2019", &older, 0, 1, 4),
            ],
            scheme: Some(SchemePreset::BSeries),
            allowed_hosts: vec!["docs.google.com".into()],
            ..Default::default()
        };
        let summary = run(cfg).await.unwrap();
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.updated_rows, 3);
        assert_eq!(summary.still_missing, vec!["B1002_Next"]);
        assert_eq!(
            urls_for(&path, "B1001_Episode")[0].as_deref(),
            Some("https://docs.google.com/new-1001")
        );
    }

    #[tokio::test]
    async fn requires_a_source() {
        let err = run(ReconcileConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("--source"));
    }
}
