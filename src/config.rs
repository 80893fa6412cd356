//! Repo Engine configuration, loaded from `.orchestrator/config.toml` or
//! defaults (§2.1, §3.1).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diff::PatchLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub resources: ResourceConfig,
    pub patch_limits: PatchLimits,
    pub embed_backend: EmbedBackend,
    pub ignore: IgnoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub content_index_path: PathBuf,
    pub semantic_index_path: PathBuf,
    pub preserved_subtree: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            content_index_path: PathBuf::from(".orchestrator/index/index.json"),
            semantic_index_path: PathBuf::from(".orchestrator/semantic.sqlite"),
            preserved_subtree: PathBuf::from(".orchestrator"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub batch_size: usize,
    pub max_threads: usize,
    pub max_file_size_bytes: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_threads: 1,
            max_file_size_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    pub extra_excludes: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self { extra_excludes: vec![] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedBackend {
    Ollama { model: String, url: String },
    OpenAi { model: String },
    Fake { dims: usize },
}

impl Default for EmbedBackend {
    fn default() -> Self {
        EmbedBackend::Ollama {
            model: "nomic-embed-text".into(),
            url: "http://localhost:11434".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            resources: ResourceConfig::default(),
            patch_limits: PatchLimits::default(),
            embed_backend: EmbedBackend::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Load `<repo_root>/.orchestrator/config.toml`, falling back to
    /// `Config::default()` when it does not exist.
    pub fn load(repo_root: &Path) -> anyhow::Result<Self> {
        let path = repo_root.join(".orchestrator/config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self, repo_root: &Path) -> anyhow::Result<()> {
        let path = repo_root.join(".orchestrator/config.toml");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn content_index_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.storage.content_index_path)
    }

    pub fn semantic_index_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.storage.semantic_index_path)
    }

    pub fn preserved_subtree(&self) -> &Path {
        &self.storage.preserved_subtree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_without_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.resources.max_file_size_bytes, 1024 * 1024);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.resources.batch_size = 64;
        config.embed_backend = EmbedBackend::Fake { dims: 8 };
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.resources.batch_size, 64);
        assert!(matches!(loaded.embed_backend, EmbedBackend::Fake { dims: 8 }));
    }

    #[test]
    fn path_accessors_join_repo_root() {
        let config = Config::default();
        let root = Path::new("/tmp/repo");
        assert_eq!(config.content_index_path(root), root.join(".orchestrator/index/index.json"));
        assert_eq!(config.semantic_index_path(root), root.join(".orchestrator/semantic.sqlite"));
        assert_eq!(config.preserved_subtree(), Path::new(".orchestrator"));
    }
}
