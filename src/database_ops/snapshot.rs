//! Store location resolved into a local file for the length of a run.
//!
//! Remote stores are downloaded once into a temp file owned by the returned
//! [`StoreSnapshot`]; dropping the snapshot deletes the file. Local paths are
//! used in place.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub enum StoreSnapshot {
    Local(PathBuf),
    Downloaded { source: Url, file: NamedTempFile },
}

impl StoreSnapshot {
    /// Resolve `location`: an `http(s)://` URL is downloaded, anything else is a path.
    pub async fn acquire(location: &str) -> Result<Self> {
        match remote_url(location) {
            Some(url) => download(url).await,
            None => Ok(StoreSnapshot::Local(PathBuf::from(location))),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            StoreSnapshot::Local(path) => path,
            StoreSnapshot::Downloaded { file, .. } => file.path(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StoreSnapshot::Downloaded { .. })
    }
}

fn remote_url(location: &str) -> Option<Url> {
    let url = Url::parse(location.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

async fn download(url: Url) -> Result<StoreSnapshot> {
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let resp = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("failed to fetch store snapshot from {url}"))?
        .error_for_status()?;
    let bytes = resp.bytes().await?;

    let mut file = tempfile::Builder::new()
        .prefix("script-store-")
        .suffix(".db")
        .tempfile()
        .context("failed to create temp file for store snapshot")?;
    file.write_all(&bytes)?;
    file.flush()?;
    info!(source = %url, bytes = bytes.len(), path = %file.path().display(), "store snapshot downloaded");
    Ok(StoreSnapshot::Downloaded { source: url, file })
}
