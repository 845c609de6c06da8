//! Subcommand implementations behind the `scriptctl` binary.

pub mod extract;
pub mod mapping;
pub mod missing;
pub mod reconcile;

use anyhow::{bail, Result};
use tracing::debug;

use crate::normalization::identifier::{IdentifierScheme, SchemePreset};
use crate::normalization::url_host::HostAllowList;
use crate::util::env as env_util;

/// `--db` wins, then `SCRIPT_DB`.
pub(crate) fn resolve_store_location(explicit: Option<String>) -> Result<String> {
    if let Some(location) = explicit.filter(|s| !s.trim().is_empty()) {
        return Ok(location);
    }
    match env_util::env_opt(env_util::STORE_ENV) {
        Some(location) => Ok(location),
        None => bail!(
            "store location not configured; pass --db or set {}",
            env_util::STORE_ENV
        ),
    }
}

/// `--allow-host` values win, then `SCRIPT_ALLOWED_HOSTS`, then the document host.
pub(crate) fn resolve_hosts(explicit: &[String]) -> HostAllowList {
    if !explicit.is_empty() {
        return HostAllowList::new(explicit);
    }
    let from_env = env_util::env_list(env_util::ALLOWED_HOSTS_ENV);
    if from_env.is_empty() {
        HostAllowList::default()
    } else {
        HostAllowList::new(from_env)
    }
}

/// `--scheme` wins, then `SCRIPT_ID_SCHEME`, then the broad preset.
pub(crate) fn resolve_scheme(explicit: Option<SchemePreset>) -> Result<IdentifierScheme> {
    let preset = match explicit {
        Some(p) => p,
        None => match env_util::env_opt(env_util::ID_SCHEME_ENV) {
            Some(raw) => raw.parse()?,
            None => SchemePreset::default(),
        },
    };
    let scheme = IdentifierScheme::preset(preset)?;
    debug!(
        scheme = preset.as_str(),
        patterns = ?scheme.patterns().collect::<Vec<_>>(),
        "identifier scheme"
    );
    Ok(scheme)
}
