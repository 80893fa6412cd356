//! Content index store (component G): schema, atomic load/save, drift.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ContentIndexError;
use crate::scan::{scan_uncached, ScanOptions};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub rel_path: String,
    pub size_bytes: u64,
    pub mtime_ms: u64,
    pub is_text: bool,
    pub language_hint: Option<String>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LanguageStats {
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub file_count: u64,
    pub text_file_count: u64,
    pub hashed_count: u64,
    pub by_language: HashMap<String, LanguageStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentIndex {
    pub schema_version: u32,
    pub repo_id: String,
    pub repo_root: String,
    pub built_at: String,
    pub updated_at: String,
    pub files: Vec<FileRecord>,
    pub stats: IndexStats,
}

impl ContentIndex {
    pub fn new(repo_id: impl Into<String>, repo_root: impl Into<String>, now: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            repo_id: repo_id.into(),
            repo_root: repo_root.into(),
            built_at: now.to_string(),
            updated_at: now.to_string(),
            files: Vec::new(),
            stats: IndexStats::default(),
        }
    }

    pub fn recompute_stats(&mut self) {
        let mut stats = IndexStats { file_count: self.files.len() as u64, ..Default::default() };
        for f in &self.files {
            if f.is_text {
                stats.text_file_count += 1;
            }
            if f.sha256.is_some() {
                stats.hashed_count += 1;
            }
            if let Some(lang) = &f.language_hint {
                let entry = stats.by_language.entry(lang.clone()).or_default();
                entry.count += 1;
                entry.bytes += f.size_bytes;
            }
        }
        self.stats = stats;
    }

    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    }
}

/// Load a content index from `path`. Rejects parse failures, non-object
/// roots, and mismatched schema versions as [`ContentIndexError::Corrupted`].
pub fn load_index(path: &Path) -> Result<ContentIndex, ContentIndexError> {
    if !path.exists() {
        return Err(ContentIndexError::NotFound { path: path.display().to_string() });
    }
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| ContentIndexError::Corrupted { reason: format!("invalid JSON: {e}") })?;
    if !value.is_object() {
        return Err(ContentIndexError::Corrupted { reason: "root is not a JSON object".to_string() });
    }
    let index: ContentIndex = serde_json::from_value(value)
        .map_err(|e| ContentIndexError::Corrupted { reason: format!("schema mismatch: {e}") })?;
    if index.schema_version != SCHEMA_VERSION {
        return Err(ContentIndexError::Corrupted {
            reason: format!("unsupported schemaVersion {}", index.schema_version),
        });
    }
    Ok(index)
}

/// Load the index if present, returning `None` rather than erroring when the
/// file simply does not exist yet.
pub fn load_index_if_exists(path: &Path) -> Result<Option<ContentIndex>, ContentIndexError> {
    match load_index(path) {
        Ok(index) => Ok(Some(index)),
        Err(ContentIndexError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write `index` atomically: serialize to a sibling temp file, then rename
/// over the destination. A reader never observes a partially written file.
pub fn save_index_atomic(path: &Path, index: &ContentIndex) -> Result<(), ContentIndexError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(index)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| ContentIndexError::Io(e.error))?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftReport {
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.modified.is_empty() || !self.removed.is_empty() || !self.added.is_empty()
    }
}

/// Compare an index against the live filesystem using an mtime+size
/// heuristic (no content hashing on status, per design).
pub fn check_drift(index: &ContentIndex, repo_root: &Path, scan_opts: &ScanOptions) -> DriftReport {
    let snapshot = scan_uncached(repo_root, scan_opts);
    let physical: HashMap<&str, &crate::scan::FileEntry> =
        snapshot.files.iter().map(|f| (f.rel_path.as_str(), f)).collect();
    let indexed: HashMap<&str, &FileRecord> = index.files.iter().map(|f| (f.rel_path.as_str(), f)).collect();

    let mut report = DriftReport::default();

    for record in &index.files {
        match physical.get(record.rel_path.as_str()) {
            Some(entry) => {
                if entry.mtime_ms != record.mtime_ms || entry.size_bytes != record.size_bytes {
                    report.modified.push(record.rel_path.clone());
                }
            }
            None => report.removed.push(record.rel_path.clone()),
        }
    }

    for entry in &snapshot.files {
        if !indexed.contains_key(entry.rel_path.as_str()) {
            report.added.push(entry.rel_path.clone());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> ContentIndex {
        let mut index = ContentIndex::new("repo1", "/tmp/repo1", "2026-08-01T00:00:00Z");
        index.files.push(FileRecord {
            rel_path: "a.rs".to_string(),
            size_bytes: 10,
            mtime_ms: 1000,
            is_text: true,
            language_hint: Some("rust".to_string()),
            sha256: Some("deadbeef".to_string()),
        });
        index.recompute_stats();
        index
    }

    #[test]
    fn atomic_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let index = sample_index();
        save_index_atomic(&path, &index).unwrap();
        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn load_rejects_corrupt_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_index(&path), Err(ContentIndexError::Corrupted { .. })));
    }

    #[test]
    fn load_rejects_non_object_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "[1,2,3]").unwrap();
        assert!(matches!(load_index(&path), Err(ContentIndexError::Corrupted { .. })));
    }

    #[test]
    fn load_rejects_wrong_schema_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let mut index = sample_index();
        index.schema_version = 99;
        let json = serde_json::to_string(&index).unwrap();
        std::fs::write(&path, json).unwrap();
        assert!(matches!(load_index(&path), Err(ContentIndexError::Corrupted { .. })));
    }

    #[test]
    fn load_if_exists_returns_none_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(load_index_if_exists(&path).unwrap(), None);
    }

    #[test]
    fn drift_detects_added_removed_modified() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("kept.rs"), "fn kept() {}").unwrap();
        std::fs::write(dir.path().join("added.rs"), "fn added() {}").unwrap();

        let snapshot = scan_uncached(dir.path(), &ScanOptions::default());
        let kept_entry = snapshot.files.iter().find(|f| f.rel_path == "kept.rs").unwrap();

        let mut index = ContentIndex::new("r", dir.path().to_string_lossy(), "now");
        index.files.push(FileRecord {
            rel_path: "kept.rs".to_string(),
            size_bytes: kept_entry.size_bytes,
            mtime_ms: kept_entry.mtime_ms,
            is_text: true,
            language_hint: Some("rust".to_string()),
            sha256: None,
        });
        index.files.push(FileRecord {
            rel_path: "removed.rs".to_string(),
            size_bytes: 1,
            mtime_ms: 1,
            is_text: true,
            language_hint: Some("rust".to_string()),
            sha256: None,
        });

        let report = check_drift(&index, dir.path(), &ScanOptions::default());
        assert_eq!(report.added, vec!["added.rs".to_string()]);
        assert_eq!(report.removed, vec!["removed.rs".to_string()]);
        assert!(report.modified.is_empty());
        assert!(report.has_drift());
    }
}
