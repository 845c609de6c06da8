use anyhow::Result;
use tracing::info;

use crate::cli::{resolve_scheme, resolve_store_location};
use crate::database_ops::missing::{missing_report, MissingReport};
use crate::database_ops::snapshot::StoreSnapshot;
use crate::database_ops::store::{DialogueStore, StoreSchema};
use crate::normalization::identifier::SchemePreset;
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct MissingConfig {
    /// Store path or http(s) URL; falls back to `SCRIPT_DB`.
    pub store: Option<String>,
    pub schema: StoreSchema,
    pub scheme: Option<SchemePreset>,
}

pub async fn run(cfg: MissingConfig) -> Result<MissingReport> {
    env_util::init_env();
    let location = resolve_store_location(cfg.store)?;
    let scheme = resolve_scheme(cfg.scheme)?;

    let snapshot = StoreSnapshot::acquire(&location).await?;
    let store = DialogueStore::open(snapshot.path(), cfg.schema)?;
    let report = missing_report(&store, &scheme)?;
    store.close()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        missing_titles = report.missing_titles,
        prefixes = report.ranges.len(),
        unparsed = report.unparsed.len(),
        "missing report done"
    );
    Ok(report)
}
