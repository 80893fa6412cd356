//! Semantic index store (component J): SQLite schema, replace-by-file
//! transactional writes, and Base64 vector (de)serialization.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::SemanticError;

use super::chunker::{Chunk, ChunkKind};

pub struct SemanticStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub repo_id: String,
    pub repo_root: String,
    pub embedder_id: String,
    pub dims: u32,
    pub built_at: String,
    pub updated_at: String,
    pub schema_version: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileMeta {
    pub path: String,
    pub file_hash: String,
    pub language: String,
    pub mtime_ms: u64,
    pub size_bytes: u64,
}

const SCHEMA_VERSION: u32 = 1;

impl SemanticStore {
    /// Open (creating if absent) the semantic index at `path`, running
    /// migrations. `PRAGMA foreign_keys = OFF`: cascade deletes are
    /// hand-written in explicit transactions below.
    pub fn open(path: &std::path::Path) -> Result<Self, SemanticError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, SemanticError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    fn migrate(conn: &Connection) -> Result<(), SemanticError> {
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS meta (
                 repo_id TEXT NOT NULL,
                 repo_root TEXT NOT NULL,
                 embedder_id TEXT NOT NULL,
                 dims INTEGER NOT NULL,
                 built_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL,
                 schema_version INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS files (
                 path TEXT PRIMARY KEY,
                 file_hash TEXT NOT NULL,
                 language TEXT NOT NULL,
                 mtime_ms INTEGER NOT NULL,
                 size_bytes INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS chunks (
                 chunk_id TEXT PRIMARY KEY,
                 path TEXT NOT NULL,
                 language TEXT NOT NULL,
                 kind TEXT NOT NULL,
                 name TEXT,
                 parent_name TEXT,
                 start_line INTEGER NOT NULL,
                 end_line INTEGER NOT NULL,
                 content TEXT NOT NULL,
                 file_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
             CREATE TABLE IF NOT EXISTS embeddings (
                 chunk_id TEXT PRIMARY KEY,
                 vector_b64 TEXT NOT NULL
             );",
        )?;
        Ok(())
    }

    pub fn set_meta(&self, meta: &Meta) -> Result<(), SemanticError> {
        self.conn.execute("DELETE FROM meta", [])?;
        self.conn.execute(
            "INSERT INTO meta (repo_id, repo_root, embedder_id, dims, built_at, updated_at, schema_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![meta.repo_id, meta.repo_root, meta.embedder_id, meta.dims, meta.built_at, meta.updated_at, meta.schema_version],
        )?;
        Ok(())
    }

    pub fn get_meta(&self) -> Result<Option<Meta>, SemanticError> {
        let mut stmt = self.conn.prepare(
            "SELECT repo_id, repo_root, embedder_id, dims, built_at, updated_at, schema_version FROM meta LIMIT 1",
        )?;
        let meta = stmt
            .query_row([], |row| {
                Ok(Meta {
                    repo_id: row.get(0)?,
                    repo_root: row.get(1)?,
                    embedder_id: row.get(2)?,
                    dims: row.get(3)?,
                    built_at: row.get(4)?,
                    updated_at: row.get(5)?,
                    schema_version: row.get(6)?,
                })
            })
            .optional()?;
        Ok(meta)
    }

    pub fn touch_updated_at(&self, now: &str) -> Result<(), SemanticError> {
        self.conn.execute("UPDATE meta SET updated_at = ?1", params![now])?;
        Ok(())
    }

    pub fn upsert_file(&self, file: &FileMeta) -> Result<(), SemanticError> {
        self.conn.execute(
            "INSERT INTO files (path, file_hash, language, mtime_ms, size_bytes) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET file_hash=excluded.file_hash, language=excluded.language,
                 mtime_ms=excluded.mtime_ms, size_bytes=excluded.size_bytes",
            params![file.path, file.file_hash, file.language, file.mtime_ms as i64, file.size_bytes as i64],
        )?;
        Ok(())
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileMeta>, SemanticError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, file_hash, language, mtime_ms, size_bytes FROM files WHERE path = ?1")?;
        let file = stmt
            .query_row(params![path], |row| {
                Ok(FileMeta {
                    path: row.get(0)?,
                    file_hash: row.get(1)?,
                    language: row.get(2)?,
                    mtime_ms: row.get::<_, i64>(3)? as u64,
                    size_bytes: row.get::<_, i64>(4)? as u64,
                })
            })
            .optional()?;
        Ok(file)
    }

    pub fn get_all_files(&self) -> Result<Vec<FileMeta>, SemanticError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, file_hash, language, mtime_ms, size_bytes FROM files")?;
        let rows = stmt.query_map([], |row| {
            Ok(FileMeta {
                path: row.get(0)?,
                file_hash: row.get(1)?,
                language: row.get(2)?,
                mtime_ms: row.get::<_, i64>(3)? as u64,
                size_bytes: row.get::<_, i64>(4)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Atomically replace all chunks (and their embeddings) for `path` with
    /// `chunks`. Cascade is hand-written since FK enforcement is off.
    pub fn replace_chunks_for_file(&mut self, path: &str, chunks: &[Chunk]) -> Result<(), SemanticError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT chunk_id FROM chunks WHERE path = ?1)",
            params![path],
        )?;
        tx.execute("DELETE FROM chunks WHERE path = ?1", params![path])?;
        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (chunk_id, path, language, kind, name, parent_name, start_line, end_line, content, file_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    chunk.chunk_id,
                    chunk.path,
                    chunk.language,
                    chunk.kind.as_str(),
                    chunk.name,
                    chunk.parent_name,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.content,
                    chunk.file_hash,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete `path`'s file row, chunks, and embeddings in one transaction.
    pub fn delete_file(&mut self, path: &str) -> Result<(), SemanticError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT chunk_id FROM chunks WHERE path = ?1)",
            params![path],
        )?;
        tx.execute("DELETE FROM chunks WHERE path = ?1", params![path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_embeddings(&mut self, embeddings: &[(String, Vec<f32>)]) -> Result<(), SemanticError> {
        let tx = self.conn.transaction()?;
        for (chunk_id, vector) in embeddings {
            let vector_b64 = encode_vector(vector);
            tx.execute(
                "INSERT INTO embeddings (chunk_id, vector_b64) VALUES (?1, ?2)
                 ON CONFLICT(chunk_id) DO UPDATE SET vector_b64=excluded.vector_b64",
                params![chunk_id, vector_b64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>, SemanticError> {
        let mut stmt = self.conn.prepare("SELECT chunk_id, vector_b64 FROM embeddings")?;
        let rows = stmt.query_map([], |row| {
            let chunk_id: String = row.get(0)?;
            let vector_b64: String = row.get(1)?;
            Ok((chunk_id, vector_b64))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (chunk_id, vector_b64) = row?;
            out.push((chunk_id, decode_vector(&vector_b64)));
        }
        Ok(out)
    }

    pub fn get_all_chunks_with_embeddings(&self) -> Result<Vec<(Chunk, Vec<f32>)>, SemanticError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.chunk_id, c.path, c.language, c.kind, c.name, c.parent_name,
                    c.start_line, c.end_line, c.content, c.file_hash, e.vector_b64
             FROM chunks c INNER JOIN embeddings e ON c.chunk_id = e.chunk_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let kind_str: String = row.get(3)?;
            let chunk = Chunk {
                chunk_id: row.get(0)?,
                path: row.get(1)?,
                language: row.get(2)?,
                kind: parse_kind(&kind_str),
                name: row.get(4)?,
                parent_name: row.get(5)?,
                start_line: row.get(6)?,
                end_line: row.get(7)?,
                content: row.get(8)?,
                file_hash: row.get(9)?,
            };
            let vector_b64: String = row.get(10)?;
            Ok((chunk, vector_b64))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (chunk, vector_b64) = row?;
            out.push((chunk, decode_vector(&vector_b64)));
        }
        Ok(out)
    }

    pub fn chunk_count_for_path(&self, path: &str) -> Result<u64, SemanticError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn embedding_count_for_chunk(&self, chunk_id: &str) -> Result<bool, SemanticError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE chunk_id = ?1",
            params![chunk_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn parse_kind(s: &str) -> ChunkKind {
    match s {
        "function" => ChunkKind::Function,
        "method" => ChunkKind::Method,
        "class" => ChunkKind::Class,
        "interface" => ChunkKind::Interface,
        "type" => ChunkKind::Type,
        "export" => ChunkKind::Export,
        "const" => ChunkKind::Const,
        _ => ChunkKind::Unknown,
    }
}

/// Little-endian IEEE-754 Float32 buffer, Base64-encoded.
pub fn encode_vector(vector: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    BASE64.encode(bytes)
}

pub fn decode_vector(b64: &str) -> Vec<f32> {
    let bytes = BASE64.decode(b64).unwrap_or_default();
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::chunker::chunk_file;

    fn test_store() -> SemanticStore {
        SemanticStore::open_in_memory().unwrap()
    }

    #[test]
    fn vector_round_trip_is_byte_exact() {
        let vector = vec![0.1_f32, -2.5, 3.333333, 0.0, f32::MAX];
        let encoded = encode_vector(&vector);
        let decoded = decode_vector(&encoded);
        assert_eq!(vector, decoded);
    }

    #[test]
    fn meta_round_trip() {
        let store = test_store();
        assert_eq!(store.get_meta().unwrap(), None);
        let meta = Meta {
            repo_id: "r1".into(),
            repo_root: "/tmp/r1".into(),
            embedder_id: "E1".into(),
            dims: 3,
            built_at: "t0".into(),
            updated_at: "t0".into(),
            schema_version: SCHEMA_VERSION,
        };
        store.set_meta(&meta).unwrap();
        assert_eq!(store.get_meta().unwrap(), Some(meta));
    }

    #[test]
    fn i8_replace_chunks_atomicity() {
        let mut store = test_store();
        let content = "fn first_chunk_with_a_sufficiently_long_body_text() {\n    let a = 1;\n}\n";
        let chunks = chunk_file("a.rs", "rust", content, "hash1");
        store.replace_chunks_for_file("a.rs", &chunks).unwrap();
        store
            .upsert_embeddings(&[(chunks[0].chunk_id.clone(), vec![0.1, 0.2])])
            .unwrap();

        assert_eq!(store.chunk_count_for_path("a.rs").unwrap(), 1);
        assert!(store.embedding_count_for_chunk(&chunks[0].chunk_id).unwrap());

        let content2 = "fn second_chunk_replacing_the_first_one_here() {\n    let b = 2;\n}\n";
        let chunks2 = chunk_file("a.rs", "rust", content2, "hash2");
        store.replace_chunks_for_file("a.rs", &chunks2).unwrap();

        assert_eq!(store.chunk_count_for_path("a.rs").unwrap(), 1);
        assert!(!store.embedding_count_for_chunk(&chunks[0].chunk_id).unwrap());
    }

    #[test]
    fn delete_file_cascades_chunks_and_embeddings() {
        let mut store = test_store();
        let content = "fn a_deletable_chunk_with_enough_characters_in_it() {\n    let a = 1;\n}\n";
        let chunks = chunk_file("a.rs", "rust", content, "hash1");
        store.upsert_file(&FileMeta {
            path: "a.rs".into(),
            file_hash: "hash1".into(),
            language: "rust".into(),
            mtime_ms: 1,
            size_bytes: 10,
        }).unwrap();
        store.replace_chunks_for_file("a.rs", &chunks).unwrap();
        store.upsert_embeddings(&[(chunks[0].chunk_id.clone(), vec![0.1])]).unwrap();

        store.delete_file("a.rs").unwrap();

        assert_eq!(store.get_file("a.rs").unwrap(), None);
        assert_eq!(store.chunk_count_for_path("a.rs").unwrap(), 0);
        assert!(!store.embedding_count_for_chunk(&chunks[0].chunk_id).unwrap());
    }

    #[test]
    fn get_all_chunks_with_embeddings_inner_joins() {
        let mut store = test_store();
        let content = "fn joined_chunk_with_enough_characters_present() {\n    let a = 1;\n}\n";
        let chunks = chunk_file("a.rs", "rust", content, "hash1");
        store.replace_chunks_for_file("a.rs", &chunks).unwrap();
        // no embedding yet: inner join should exclude it
        assert!(store.get_all_chunks_with_embeddings().unwrap().is_empty());

        store.upsert_embeddings(&[(chunks[0].chunk_id.clone(), vec![0.5, 0.25])]).unwrap();
        let joined = store.get_all_chunks_with_embeddings().unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].1, vec![0.5, 0.25]);
    }
}
