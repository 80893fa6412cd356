//! Semantic index pipeline: tree-sitter chunking (component I), the SQLite
//! vector store (component J), and the builder/updater (component K).

pub mod chunker;
pub mod pipeline;
pub mod store;

pub use chunker::{chunk_file, Chunk, ChunkKind};
pub use pipeline::{build_index, update_index, BuildSummary, UpdateSummary};
pub use store::SemanticStore;
