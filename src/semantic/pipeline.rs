//! Semantic builder/updater (component K): scan → hash → chunk → embed →
//! persist, with lifecycle events.

use std::path::Path;
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::embed::Embedder;
use crate::error::SemanticError;
use crate::events::{EventBus, RepoEngineEvent};
use crate::scan::{scan_uncached, ScanOptions};

use super::chunker::{chunk_file, is_supported_language};
use super::store::{FileMeta, Meta, SemanticStore};

#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub files_processed: u64,
    pub chunks_embedded: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    pub changed_files: u64,
    pub removed_files: u64,
}

/// Full build: scan, hash, chunk, embed, and persist every supported file.
pub fn build_index(
    store: &mut SemanticStore,
    repo_root: &Path,
    repo_id: &str,
    embedder: &dyn Embedder,
    scan_opts: &ScanOptions,
    max_chunks_per_build: Option<u64>,
    events: Option<&EventBus>,
    now: &str,
) -> Result<BuildSummary, SemanticError> {
    let started = Instant::now();
    if let Some(bus) = events {
        bus.emit(RepoEngineEvent::SemanticIndexBuildStarted { repo_id: repo_id.to_string() });
    }

    let snapshot = scan_uncached(repo_root, scan_opts);
    let mut summary = BuildSummary::default();

    for entry in &snapshot.files {
        if entry.size_bytes > scan_opts.max_file_size {
            continue;
        }
        let Some(language) = entry.language_hint else { continue };
        if !is_supported_language(language) {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(&entry.abs_path) else { continue };
        let file_hash = hash_bytes(content.as_bytes());

        store.upsert_file(&FileMeta {
            path: entry.rel_path.clone(),
            file_hash: file_hash.clone(),
            language: language.to_string(),
            mtime_ms: entry.mtime_ms,
            size_bytes: entry.size_bytes,
        })?;

        let chunks = chunk_file(&entry.rel_path, language, &content, &file_hash);
        if chunks.is_empty() {
            continue;
        }

        store.replace_chunks_for_file(&entry.rel_path, &chunks)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .map_err(|e| SemanticError::Embed(e.to_string()))?;
        let pairs: Vec<(String, Vec<f32>)> = chunks
            .iter()
            .zip(vectors)
            .map(|(c, v)| (c.chunk_id.clone(), v))
            .collect();
        store.upsert_embeddings(&pairs)?;

        summary.files_processed += 1;
        summary.chunks_embedded += chunks.len() as u64;

        if let Some(cap) = max_chunks_per_build {
            if summary.chunks_embedded > cap {
                break;
            }
        }
    }

    store.set_meta(&Meta {
        repo_id: repo_id.to_string(),
        repo_root: repo_root.to_string_lossy().into_owned(),
        embedder_id: embedder.id().to_string(),
        dims: embedder.dims() as u32,
        built_at: now.to_string(),
        updated_at: now.to_string(),
        schema_version: 1,
    })?;

    if let Some(bus) = events {
        bus.emit(RepoEngineEvent::SemanticIndexBuildFinished {
            repo_id: repo_id.to_string(),
            files_processed: summary.files_processed,
            chunks_embedded: summary.chunks_embedded,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    Ok(summary)
}

/// Incremental update: skip unchanged files, rechunk+reembed changed ones,
/// and delete removed ones. Fails if the embedder configuration changed.
pub fn update_index(
    store: &mut SemanticStore,
    repo_root: &Path,
    repo_id: &str,
    embedder: &dyn Embedder,
    scan_opts: &ScanOptions,
    events: Option<&EventBus>,
    now: &str,
) -> Result<UpdateSummary, SemanticError> {
    let started = Instant::now();

    let meta = store.get_meta()?.ok_or(SemanticError::IncompatibleEmbedder)?;
    if meta.embedder_id != embedder.id() || meta.dims != embedder.dims() as u32 {
        return Err(SemanticError::IncompatibleEmbedder);
    }

    if let Some(bus) = events {
        bus.emit(RepoEngineEvent::SemanticIndexUpdateStarted { repo_id: repo_id.to_string() });
    }

    let snapshot = scan_uncached(repo_root, scan_opts);
    let prior_files = store.get_all_files()?;
    let mut summary = UpdateSummary::default();
    let mut current_paths = std::collections::HashSet::new();

    for entry in &snapshot.files {
        current_paths.insert(entry.rel_path.clone());

        let prior = store.get_file(&entry.rel_path)?;
        if let Some(p) = &prior {
            if p.mtime_ms == entry.mtime_ms && p.size_bytes == entry.size_bytes {
                continue;
            }
        }
        if entry.size_bytes > scan_opts.max_file_size {
            continue;
        }
        let Some(language) = entry.language_hint else { continue };
        if !is_supported_language(language) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&entry.abs_path) else { continue };
        let file_hash = hash_bytes(content.as_bytes());

        if let Some(p) = &prior {
            if p.file_hash == file_hash {
                continue;
            }
        }

        store.upsert_file(&FileMeta {
            path: entry.rel_path.clone(),
            file_hash: file_hash.clone(),
            language: language.to_string(),
            mtime_ms: entry.mtime_ms,
            size_bytes: entry.size_bytes,
        })?;

        let chunks = chunk_file(&entry.rel_path, language, &content, &file_hash);
        store.replace_chunks_for_file(&entry.rel_path, &chunks)?;

        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let vectors = embedder
                .embed_batch(&texts)
                .map_err(|e| SemanticError::Embed(e.to_string()))?;
            let pairs: Vec<(String, Vec<f32>)> = chunks
                .iter()
                .zip(vectors)
                .map(|(c, v)| (c.chunk_id.clone(), v))
                .collect();
            store.upsert_embeddings(&pairs)?;
        }

        summary.changed_files += 1;
    }

    for prior in &prior_files {
        if !current_paths.contains(&prior.path) {
            store.delete_file(&prior.path)?;
            summary.removed_files += 1;
        }
    }

    store.touch_updated_at(now)?;

    if let Some(bus) = events {
        bus.emit(RepoEngineEvent::SemanticIndexUpdateFinished {
            repo_id: repo_id.to_string(),
            changed_files: summary.changed_files,
            removed_files: summary.removed_files,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    Ok(summary)
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
