use anyhow::Result;
use serde::Serialize;

use crate::cli::resolve_scheme;
use crate::normalization::identifier::{Identifier, SchemePreset};
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct ExtractConfig {
    pub titles: Vec<String>,
    pub scheme: Option<SchemePreset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extracted {
    pub title: String,
    pub identifier: Option<Identifier>,
}

/// Print the identifier each title resolves to under the active scheme.
pub fn run(cfg: ExtractConfig) -> Result<Vec<Extracted>> {
    env_util::init_env();
    let scheme = resolve_scheme(cfg.scheme)?;
    let out: Vec<Extracted> = cfg
        .titles
        .into_iter()
        .map(|title| Extracted {
            identifier: scheme.extract(&title),
            title,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(out)
}
