use anyhow::{bail, Result};
use serde_json::json;

use crate::cli::{resolve_hosts, resolve_scheme};
use crate::database_ops::mapping::{build_merged, MergedMapping, SourceLayout};
use crate::normalization::identifier::SchemePreset;
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct MappingConfig {
    /// Highest precedence first.
    pub sources: Vec<SourceLayout>,
    pub scheme: Option<SchemePreset>,
    pub allowed_hosts: Vec<String>,
}

/// Build and print the merged identifier → URL mapping without touching a store.
pub fn run(cfg: MappingConfig) -> Result<MergedMapping> {
    env_util::init_env();
    if cfg.sources.is_empty() {
        bail!("at least one --source is required");
    }
    let scheme = resolve_scheme(cfg.scheme)?;
    let hosts = resolve_hosts(&cfg.allowed_hosts);
    let merged = build_merged(&cfg.sources, &scheme, &hosts);

    let out = json!({
        "identifiers": merged.map,
        "sources": merged.sources,
        "conflicts": merged.conflicts,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(merged)
}
