//! Index updater (component H): incremental delta vs. a prior snapshot,
//! reusing unchanged records instead of rehashing.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ContentIndexError;
use crate::scan::{scan_uncached, ScanOptions};

use super::store::{load_index, save_index_atomic, ContentIndex, FileRecord};

const HASH_CAP_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct UpdateDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub rehashed_count: u64,
}

/// Load the prior index at `index_path`, scan `repo_root`, compute the delta,
/// and persist the updated index atomically.
pub fn update_index(
    index_path: &Path,
    repo_root: &Path,
    scan_opts: &ScanOptions,
    now: &str,
) -> Result<UpdateDelta, ContentIndexError> {
    let mut index = load_index(index_path)?;
    let snapshot = scan_uncached(repo_root, scan_opts);

    let prior_by_path: HashMap<String, FileRecord> =
        index.files.drain(..).map(|f| (f.rel_path.clone(), f)).collect();

    let mut delta = UpdateDelta::default();
    let mut new_files = Vec::with_capacity(snapshot.files.len());
    let mut current_paths = std::collections::HashSet::new();

    for entry in &snapshot.files {
        current_paths.insert(entry.rel_path.clone());

        match prior_by_path.get(&entry.rel_path) {
            Some(prior) if prior.mtime_ms == entry.mtime_ms && prior.size_bytes == entry.size_bytes => {
                new_files.push(prior.clone());
            }
            existing => {
                let sha256 = if entry.is_text && entry.size_bytes <= HASH_CAP_BYTES {
                    hash_file(&entry.abs_path).ok()
                } else {
                    None
                };
                if sha256.is_some() {
                    delta.rehashed_count += 1;
                }
                new_files.push(FileRecord {
                    rel_path: entry.rel_path.clone(),
                    size_bytes: entry.size_bytes,
                    mtime_ms: entry.mtime_ms,
                    is_text: entry.is_text,
                    language_hint: entry.language_hint.map(str::to_string),
                    sha256,
                });
                if existing.is_some() {
                    delta.changed.push(entry.rel_path.clone());
                } else {
                    delta.added.push(entry.rel_path.clone());
                }
            }
        }
    }

    for prior_path in prior_by_path.keys() {
        if !current_paths.contains(prior_path) {
            delta.removed.push(prior_path.clone());
        }
    }

    index.files = new_files;
    index.sort_files();
    index.recompute_stats();
    index.updated_at = now.to_string();

    save_index_atomic(index_path, &index)?;

    delta.added.sort();
    delta.removed.sort();
    delta.changed.sort();
    Ok(delta)
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
