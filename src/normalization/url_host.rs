use url::Url;

/// Host that script documents are published on.
pub const DEFAULT_ALLOWED_HOST: &str = "docs.google.com";

/// Accepts only http(s) URLs whose host is on the list (exact match, case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAllowList {
    hosts: Vec<String>,
}

impl HostAllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for host in hosts {
            let host = host.as_ref().trim().trim_end_matches('.').to_ascii_lowercase();
            if !host.is_empty() && !out.contains(&host) {
                out.push(host);
            }
        }
        Self { hosts: out }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn accepts(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw.trim()) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        url.host_str()
            .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
            .is_some_and(|h| self.hosts.iter().any(|allowed| *allowed == h))
    }

    /// Cheap pre-check used when scanning rows: does the cell look like a web URL at all?
    pub fn looks_like_url(raw: &str) -> bool {
        let lc = raw.trim_start().to_ascii_lowercase();
        lc.starts_with("http://") || lc.starts_with("https://")
    }
}

impl Default for HostAllowList {
    fn default() -> Self {
        Self::new([DEFAULT_ALLOWED_HOST])
    }
}
