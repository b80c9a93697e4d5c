//! Project manifest loading.
//!
//! A manifest is a JSON array of projects:
//!
//! ```json
//! [{"name": "Solar Alpha", "sources": ["Press release https://example.com/a", "https://example.com/b"]}]
//! ```
//!
//! Every `http(s)://` token in a source string is taken as a URL. URLs that
//! normalize to the same page are de-duplicated per project, keeping the
//! first-seen spelling and order. Projects sharing a normalized name are merged.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use pagewise_core::Error;
use pagewise_core::cache::{normalize_project_name, normalize_url};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("invalid url pattern"));

/// A named project and the URLs to research for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    #[serde(default)]
    sources: Vec<String>,
}

/// Read and parse a manifest file.
pub async fn load_manifest(path: &Path) -> Result<Vec<Project>, Error> {
    let raw = tokio::fs::read_to_string(path).await?;
    parse_manifest(&raw)
}

/// Parse manifest JSON into projects, in manifest order.
pub fn parse_manifest(raw: &str) -> Result<Vec<Project>, Error> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(raw).map_err(|e| Error::InvalidInput(format!("manifest is not valid JSON: {e}")))?;

    let mut projects: Vec<Project> = Vec::new();
    let mut seen: Vec<HashSet<String>> = Vec::new();
    for entry in entries {
        let name = normalize_project_name(&entry.name)?;
        let urls: Vec<String> = entry.sources.iter().flat_map(|s| extract_urls(s)).collect();

        let idx = match projects.iter().position(|p| p.name == name) {
            Some(idx) => idx,
            None => {
                projects.push(Project { name, urls: Vec::new() });
                seen.push(HashSet::new());
                projects.len() - 1
            }
        };
        for url in urls {
            // Unparseable URLs stay as written so the project reports them.
            let key = normalize_url(&url).unwrap_or_else(|_| url.clone());
            if seen[idx].insert(key) {
                projects[idx].urls.push(url);
            }
        }
    }

    let empty = projects.iter().filter(|p| p.urls.is_empty()).count();
    if empty > 0 {
        tracing::warn!(count = empty, "projects without any URL in their sources");
    }

    Ok(projects)
}

/// All `http(s)://` tokens in `text`.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_PATTERN.find_iter(text).map(|m| m.as_str().to_string()).collect()
}
