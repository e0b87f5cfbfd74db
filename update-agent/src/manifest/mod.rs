//! Manifest model: the remote, authoritative description of the installed file set.
//!
//! A manifest is a JSON document listing one record per file. Parsing is strict:
//! every record needs a non-empty unique `name`, and a repeated name is a hard
//! error rather than a silent overwrite. Record order is preserved so downloads
//! are planned in the order the publisher listed them.

pub mod fetch;
pub mod publish;

use crate::fs::digest::HashAlgorithm;
use crate::utils::errors::ManifestError;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use fetch::ManifestFetcher;

/// Current manifest document version
pub const MANIFEST_VERSION: u32 = 1;

/// One file record of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    pub name: String,

    /// `/`-separated path relative to the install root
    #[serde(rename = "path")]
    pub relative_path: String,

    /// Source of the file bytes; relative references are resolved against the
    /// manifest location at parse time
    #[serde(rename = "url")]
    pub download_url: String,

    /// Lowercase hex digest of the file content
    #[serde(rename = "hash")]
    pub content_hash: String,

    #[serde(rename = "size", default)]
    pub size_bytes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Parsed manifest, keyed by entry name, in record order.
#[derive(Debug, Clone)]
pub struct ManifestIndex {
    application: Option<String>,
    algorithm: HashAlgorithm,
    entries: Vec<RemoteFileEntry>,
    by_name: HashMap<String, usize>,
}

impl ManifestIndex {
    /// Build an index, enforcing unique names and unique destination paths.
    pub fn from_entries(
        application: Option<String>,
        algorithm: HashAlgorithm,
        entries: Vec<RemoteFileEntry>,
    ) -> Result<Self, ManifestError> {
        let mut by_name = HashMap::with_capacity(entries.len());
        let mut by_path: HashMap<String, usize> = HashMap::with_capacity(entries.len());

        for (idx, entry) in entries.iter().enumerate() {
            if by_name.insert(entry.name.clone(), idx).is_some() {
                return Err(ManifestError::DuplicateEntry(entry.name.clone()));
            }
            if let Some(first) = by_path.insert(entry.relative_path.to_lowercase(), idx) {
                return Err(ManifestError::DuplicatePath {
                    path: entry.relative_path.clone(),
                    first: entries[first].name.clone(),
                    second: entry.name.clone(),
                });
            }
        }

        Ok(Self {
            application,
            algorithm,
            entries,
            by_name,
        })
    }

    pub fn application(&self) -> Option<&str> {
        self.application.as_deref()
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn get(&self, name: &str) -> Option<&RemoteFileEntry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteFileEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    /// Serialize back to the manifest document format.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ManifestDocument {
            version: MANIFEST_VERSION,
            application: self.application.as_deref(),
            algorithm: self.algorithm,
            files: &self.entries,
        })
    }
}

#[derive(Serialize)]
struct ManifestDocument<'a> {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    application: Option<&'a str>,
    algorithm: HashAlgorithm,
    files: &'a [RemoteFileEntry],
}

/// Wire form of the document; every field optional so errors can name what is missing.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    application: Option<String>,
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    files: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawEntry {
    name: Option<String>,
    path: Option<String>,
    url: Option<String>,
    hash: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Where a manifest or a file's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(Url),
    File(PathBuf),
}

impl Source {
    /// Parse an http(s) URL, a file:// URL or a plain filesystem path.
    pub fn parse(location: &str) -> Option<Source> {
        let location = location.trim();
        if location.is_empty() {
            return None;
        }
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(location).ok().map(Source::Http)
        } else if lower.starts_with("file://") {
            Url::parse(location)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .map(Source::File)
        } else {
            Some(Source::File(PathBuf::from(location)))
        }
    }

    /// Resolve a reference found inside the manifest against this manifest's location.
    pub fn resolve(&self, reference: &str) -> Option<Source> {
        let reference = reference.trim();
        if reference.contains("://") || Path::new(reference).is_absolute() {
            return Source::parse(reference);
        }
        match self {
            Source::Http(base) => base.join(&reference.replace('\\', "/")).ok().map(Source::Http),
            Source::File(manifest_path) => {
                let dir = manifest_path.parent().unwrap_or_else(|| Path::new(""));
                Some(Source::File(dir.join(reference)))
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Http(url) => write!(f, "{url}"),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Normalize a manifest-declared path to a safe `/`-separated relative path.
///
/// Returns `None` for empty paths, paths escaping the root via `..`, and
/// drive-qualified paths.
pub fn normalize_relative_path(raw: &str) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if segments.is_empty() && s.contains(':') => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Parse manifest text fetched from `location`.
pub fn parse_manifest(content: &str, location: &Source) -> Result<ManifestIndex, ManifestError> {
    let raw: RawManifest = serde_json::from_str(content)?;

    let algorithm = match raw.algorithm.as_deref() {
        Some(name) => name.parse::<HashAlgorithm>()?,
        None => HashAlgorithm::default(),
    };

    let mut entries = Vec::with_capacity(raw.files.len());
    for (index, record) in raw.files.into_iter().enumerate() {
        let name = match record.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(ManifestError::MissingName { index }),
        };

        let raw_path = record.path.ok_or_else(|| ManifestError::MissingField {
            name: name.clone(),
            field: "path",
        })?;
        let relative_path =
            normalize_relative_path(&raw_path).ok_or_else(|| ManifestError::InvalidPath {
                name: name.clone(),
                path: raw_path.clone(),
            })?;

        let raw_url = record.url.ok_or_else(|| ManifestError::MissingField {
            name: name.clone(),
            field: "url",
        })?;
        let download_url = location
            .resolve(&raw_url)
            .ok_or_else(|| ManifestError::InvalidUrl {
                name: name.clone(),
                url: raw_url.clone(),
            })?
            .to_string();

        let raw_hash = record.hash.ok_or_else(|| ManifestError::MissingField {
            name: name.clone(),
            field: "hash",
        })?;
        let content_hash = raw_hash.trim().to_ascii_lowercase();
        if !algorithm.is_valid_digest(&content_hash) {
            return Err(ManifestError::InvalidHash {
                name,
                hash: raw_hash,
            });
        }

        entries.push(RemoteFileEntry {
            name,
            relative_path,
            download_url,
            content_hash,
            size_bytes: record.size,
            timestamp: record.timestamp,
        });
    }

    ManifestIndex::from_entries(raw.application, algorithm, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::digest::digest_bytes;
    use serde_json::json;

    fn http_location() -> Source {
        Source::parse("https://updates.example.com/demo/manifest.json").unwrap()
    }

    fn record(name: &str, path: &str) -> serde_json::Value {
        json!({
            "name": name,
            "path": path,
            "url": format!("files/{path}"),
            "hash": digest_bytes(HashAlgorithm::Sha256, name.as_bytes()),
            "size": 3,
            "timestamp": "2026-01-01T00:00:00Z",
        })
    }

    #[test]
    fn test_parse_preserves_order_and_resolves_urls() {
        let doc = json!({
            "version": 1,
            "application": "Demo",
            "files": [record("b.dll", "b.dll"), record("a.dll", "lib\\a.dll")],
        });
        let index = parse_manifest(&doc.to_string(), &http_location()).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.application(), Some("Demo"));
        assert_eq!(index.algorithm(), HashAlgorithm::Sha256);
        let names: Vec<&str> = index.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.dll", "a.dll"]);

        let a = index.get("a.dll").unwrap();
        assert_eq!(a.relative_path, "lib/a.dll");
        assert_eq!(a.download_url, "https://updates.example.com/demo/files/lib/a.dll");
        assert!(a.timestamp.is_some());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let doc = json!({ "files": [record("a.dll", "a.dll"), record("a.dll", "other/a.dll")] });
        let result = parse_manifest(&doc.to_string(), &http_location());
        assert!(matches!(result, Err(ManifestError::DuplicateEntry(name)) if name == "a.dll"));
    }

    #[test]
    fn test_duplicate_destination_is_rejected() {
        let doc = json!({ "files": [record("one", "bin/App.dll"), record("two", "bin/app.dll")] });
        let result = parse_manifest(&doc.to_string(), &http_location());
        assert!(matches!(result, Err(ManifestError::DuplicatePath { .. })));
    }

    #[test]
    fn test_missing_or_empty_name_is_rejected() {
        let mut nameless = record("x", "x.dll");
        nameless.as_object_mut().unwrap().remove("name");
        let doc = json!({ "files": [record("a.dll", "a.dll"), nameless] });
        assert!(matches!(
            parse_manifest(&doc.to_string(), &http_location()),
            Err(ManifestError::MissingName { index: 1 })
        ));

        let doc = json!({ "files": [record("  ", "a.dll")] });
        assert!(matches!(
            parse_manifest(&doc.to_string(), &http_location()),
            Err(ManifestError::MissingName { index: 0 })
        ));
    }

    #[test]
    fn test_escaping_path_is_rejected() {
        let doc = json!({ "files": [record("evil", "../outside.dll")] });
        assert!(matches!(
            parse_manifest(&doc.to_string(), &http_location()),
            Err(ManifestError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_hash_must_match_algorithm() {
        let mut entry = record("a.dll", "a.dll");
        entry["hash"] = json!("900150983CD24FB0D6963F7D28E17F72");
        let doc = json!({ "algorithm": "md5", "files": [entry.clone()] });
        let index = parse_manifest(&doc.to_string(), &http_location()).unwrap();
        assert_eq!(
            index.get("a.dll").unwrap().content_hash,
            "900150983cd24fb0d6963f7d28e17f72"
        );

        let doc = json!({ "files": [entry] });
        assert!(matches!(
            parse_manifest(&doc.to_string(), &http_location()),
            Err(ManifestError::InvalidHash { .. })
        ));
    }

    #[test]
    fn test_unknown_algorithm_and_bad_json() {
        let doc = json!({ "algorithm": "crc32", "files": [] });
        assert!(matches!(
            parse_manifest(&doc.to_string(), &http_location()),
            Err(ManifestError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            parse_manifest("<files/>", &http_location()),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_normalize_relative_path() {
        assert_eq!(normalize_relative_path("\\bin\\app.dll").as_deref(), Some("bin/app.dll"));
        assert_eq!(normalize_relative_path("./a//b.txt").as_deref(), Some("a/b.txt"));
        assert_eq!(normalize_relative_path("a/../b"), None);
        assert_eq!(normalize_relative_path("C:/Windows/evil.dll"), None);
        assert_eq!(normalize_relative_path("  "), None);
    }

    #[test]
    fn test_source_resolution() {
        let local = Source::parse("/srv/release/manifest.json").unwrap();
        assert_eq!(
            local.resolve("files/app.dll"),
            Some(Source::File(PathBuf::from("/srv/release/files/app.dll")))
        );
        assert_eq!(
            http_location().resolve("https://cdn.example.com/app.dll"),
            Some(Source::Http(Url::parse("https://cdn.example.com/app.dll").unwrap()))
        );
        assert_eq!(
            Source::parse("file:///srv/release/manifest.json"),
            Some(Source::File(PathBuf::from("/srv/release/manifest.json")))
        );
        assert_eq!(Source::parse(""), None);
    }

    #[test]
    fn test_document_round_trip_keeps_entries() {
        let doc = json!({ "application": "Demo", "files": [record("a.dll", "a.dll")] });
        let index = parse_manifest(&doc.to_string(), &http_location()).unwrap();
        let reparsed = parse_manifest(&index.to_json_pretty().unwrap(), &http_location()).unwrap();
        assert_eq!(reparsed.get("a.dll"), index.get("a.dll"));
    }
}
