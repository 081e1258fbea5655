use std::collections::BTreeMap;
use std::io::Read as _;

use anyhow::{Context, Result};
use url::Url;

/// Retrieves remote source text for `#include`/`#file`/`#import` and URL entries.
pub trait SourceFetcher {
    fn fetch(&self, url: &Url) -> Result<String>;
}

/// Blocking HTTP(S) fetcher; `file:` URLs are read from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<String> {
        let bytes = fetch_bytes(url)?;
        String::from_utf8(bytes).with_context(|| format!("source is not utf-8: {}", url.as_str()))
    }
}

fn fetch_bytes(url: &Url) -> Result<Vec<u8>> {
    match url.scheme() {
        "file" => {
            let path = url.to_file_path().map_err(|_| {
                anyhow::anyhow!("file url could not be converted to a path: {:?}", url)
            })?;
            std::fs::read(&path).with_context(|| format!("read {}", path.display()))
        }
        "http" | "https" => {
            tracing::info!(url = url.as_str(), "fetching remote source");
            let resp = ureq::get(url.as_str())
                .call()
                .map_err(|e| anyhow::anyhow!("http GET {}: {e}", url))?;
            let mut reader = resp.into_body().into_reader();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).context("read http response")?;
            Ok(buf)
        }
        other => anyhow::bail!("unsupported url scheme {other:?} for {}", url.as_str()),
    }
}

/// Serves sources from memory, keyed by full URL. Unknown URLs fail like a 404.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    sources: BTreeMap<String, String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: &str, text: &str) -> &mut Self {
        self.sources.insert(url.to_string(), text.to_string());
        self
    }
}

impl SourceFetcher for MemoryFetcher {
    fn fetch(&self, url: &Url) -> Result<String> {
        self.sources
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("http GET {}: status code 404", url.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fetcher_serves_known_urls_only() {
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert("https://example.com/a.mush", "say hi");
        let ok = Url::parse("https://example.com/a.mush").expect("url");
        let missing = Url::parse("https://example.com/b.mush").expect("url");
        assert_eq!(fetcher.fetch(&ok).expect("fetch"), "say hi");
        let err = fetcher.fetch(&missing).expect_err("must fail");
        assert!(format!("{err:#}").contains("404"));
    }

    #[test]
    fn http_fetcher_reads_file_urls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lib.mush");
        std::fs::write(&path, "&A obj=1").expect("write");
        let url = Url::from_file_path(&path).expect("file url");
        assert_eq!(HttpFetcher.fetch(&url).expect("fetch"), "&A obj=1");
    }

    #[test]
    fn http_fetcher_rejects_unknown_schemes() {
        let url = Url::parse("gopher://example.com/x").expect("url");
        let err = HttpFetcher.fetch(&url).expect_err("must fail");
        assert!(format!("{err:#}").contains("unsupported url scheme"));
    }
}
