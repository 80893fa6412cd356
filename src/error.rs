//! Closed error taxonomies for each subsystem.
//!
//! Library code returns one of these enums rather than `anyhow::Error`; only
//! call sites at the edge (the demonstration binary, test harnesses) collapse
//! errors into `anyhow::Result` for convenience.

use thiserror::Error;

/// A single classified apply-stderr entry (see [`crate::patch::classify_stderr`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchErrorDetail {
    pub kind: PatchErrorKind,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Machine-actionable classification of a single apply failure line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchErrorKind {
    HunkFailed,
    FileNotFound,
    AlreadyExists,
    InvalidPatch,
    CorruptPatch,
    Whitespace,
    Unknown,
}

/// Top-level patch-pipeline error (validate/apply).
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Security { message: String },

    #[error("{message}")]
    Limit { message: String },

    #[error("patch execution failed: {message}")]
    Execution {
        message: String,
        kind: PatchErrorKind,
        details: Vec<PatchErrorDetail>,
        stderr: String,
    },
}

/// Errors from the VCS adapter (§4.E).
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("not a git repository: {path}")]
    NotARepo { path: String },

    #[error("working tree is dirty:\n{status}")]
    Dirty { status: String },

    #[error("git command failed: {message}\n{stderr}")]
    CommandFailed { message: String, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the content index store (§4.G).
#[derive(Debug, Error)]
pub enum ContentIndexError {
    #[error("content index is corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("no content index found at {path}")]
    NotFound { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors from the semantic index store and builder/updater (§4.J, §4.K).
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("embedder configuration has changed. Please rebuild the index.")]
    IncompatibleEmbedder,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("embedding failed: {0}")]
    Embed(String),
}
