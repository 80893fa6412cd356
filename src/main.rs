use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use repo_engine::config::Config;
use repo_engine::content_index::{self, ContentIndex};
use repo_engine::diff::{try_repair_unified_diff, RepairOptions};
use repo_engine::embed::FakeEmbedder;
use repo_engine::patch::{self, ApplyOptions};
use repo_engine::scan::{Scanner, ScanOptions};
use repo_engine::semantic::{self, SemanticStore};
use repo_engine::vcs::VcsAdapter;

#[derive(Parser)]
#[command(name = "repo-engine", version, about = "Repository-manipulation core for an LLM-driven code orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .orchestrator/config.toml in a directory
    Init {
        #[arg(default_value = ".")]
        path: String,
    },
    /// Scan a directory and print a file count
    Scan {
        #[arg(default_value = ".")]
        path: String,
    },
    /// Build or refresh the content index
    Index {
        #[arg(default_value = ".")]
        path: String,
        /// Build from scratch rather than incrementally update
        #[arg(long)]
        rebuild: bool,
    },
    /// Apply a unified diff file to a repository
    Apply {
        path: String,
        diff_file: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Commit a checkpoint
    Checkpoint {
        path: String,
        label: String,
    },
    /// Hard-reset to a prior checkpoint SHA
    Rollback {
        path: String,
        sha: String,
    },
    /// Semantic index operations
    Semantic {
        #[command(subcommand)]
        action: SemanticAction,
    },
}

#[derive(Subcommand)]
enum SemanticAction {
    /// Full rebuild of the semantic index
    Build { path: String },
    /// Incremental update of the semantic index
    Update { path: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Scan { path } => cmd_scan(&path),
        Commands::Index { path, rebuild } => cmd_index(&path, rebuild),
        Commands::Apply { path, diff_file, dry_run } => cmd_apply(&path, &diff_file, dry_run),
        Commands::Checkpoint { path, label } => cmd_checkpoint(&path, &label),
        Commands::Rollback { path, sha } => cmd_rollback(&path, &sha),
        Commands::Semantic { action } => match action {
            SemanticAction::Build { path } => cmd_semantic_build(&path),
            SemanticAction::Update { path } => cmd_semantic_update(&path),
        },
    }
}

fn cmd_init(path: &str) -> Result<()> {
    let root = PathBuf::from(path).canonicalize().unwrap_or_else(|_| PathBuf::from(path));
    Config::default().save(&root)?;
    eprintln!("Initialized .orchestrator in {}", root.display());
    Ok(())
}

fn cmd_scan(path: &str) -> Result<()> {
    let root = PathBuf::from(path);
    let config = Config::load(&root).unwrap_or_default();
    let scan_opts = ScanOptions {
        max_file_size: config.resources.max_file_size_bytes,
        extra_excludes: config.ignore.extra_excludes.clone(),
        ..ScanOptions::default()
    };

    let mut scanner = Scanner::new();
    let snapshot = scanner.scan(&root, &scan_opts);

    tracing::info!(files = snapshot.files.len(), warnings = snapshot.warnings.len(), "scan complete");
    println!("{} files scanned", snapshot.files.len());
    for warning in &snapshot.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn cmd_index(path: &str, rebuild: bool) -> Result<()> {
    let root = PathBuf::from(path);
    let config = Config::load(&root).context("loading config")?;
    let index_path = config.content_index_path(&root);
    let scan_opts = ScanOptions {
        max_file_size: config.resources.max_file_size_bytes,
        extra_excludes: config.ignore.extra_excludes.clone(),
        ..ScanOptions::default()
    };
    let now = now_rfc3339();

    if rebuild || !index_path.exists() {
        let mut index = ContentIndex::new(root.display().to_string(), root.display().to_string(), &now);
        index.recompute_stats();
        content_index::store::save_index_atomic(&index_path, &index)?;
    }

    let delta = content_index::update_index(&index_path, &root, &scan_opts, &now)?;
    tracing::info!(added = delta.added.len(), removed = delta.removed.len(), changed = delta.changed.len(), "content index updated");
    println!(
        "added={} removed={} changed={} rehashed={}",
        delta.added.len(),
        delta.removed.len(),
        delta.changed.len(),
        delta.rehashed_count,
    );
    Ok(())
}

fn cmd_apply(path: &str, diff_file: &PathBuf, dry_run: bool) -> Result<()> {
    let root = PathBuf::from(path);
    let config = Config::load(&root).unwrap_or_default();
    let diff_text = std::fs::read_to_string(diff_file).context("reading diff file")?;

    let repair_opts = RepairOptions { repo_root: &root, step_hint: None };
    let repaired = try_repair_unified_diff(&diff_text, &repair_opts);
    let diff_text = repaired.map(|r| r.diff_text).unwrap_or(diff_text);

    let opts = ApplyOptions { limits: config.patch_limits.clone(), dry_run };
    let outcome = patch::apply_unified_diff(&root, &diff_text, &opts);

    if let Some(err) = outcome.error {
        anyhow::bail!("apply failed: {err}");
    }
    println!("applied={} files_changed={}", outcome.applied, outcome.files_changed.join(", "));
    Ok(())
}

fn cmd_checkpoint(path: &str, label: &str) -> Result<()> {
    let root = PathBuf::from(path);
    let config = Config::load(&root).unwrap_or_default();
    let adapter = VcsAdapter::new(&root).with_preserved_subtree(config.preserved_subtree().to_path_buf());
    let checkpoint = adapter.create_checkpoint(label)?;
    println!("checkpoint {} ({})", checkpoint.sha, checkpoint.label);
    Ok(())
}

fn cmd_rollback(path: &str, sha: &str) -> Result<()> {
    let root = PathBuf::from(path);
    let config = Config::load(&root).unwrap_or_default();
    let adapter = VcsAdapter::new(&root).with_preserved_subtree(config.preserved_subtree().to_path_buf());
    adapter.rollback_to(sha)?;
    eprintln!("rolled back to {sha}");
    Ok(())
}

fn cmd_semantic_build(path: &str) -> Result<()> {
    let root = PathBuf::from(path);
    let config = Config::load(&root).unwrap_or_default();
    let scan_opts = ScanOptions {
        max_file_size: config.resources.max_file_size_bytes,
        extra_excludes: config.ignore.extra_excludes.clone(),
        ..ScanOptions::default()
    };
    let embedder = embedder_for(&config);

    let mut store = SemanticStore::open(&config.semantic_index_path(&root))?;
    let summary = semantic::build_index(
        &mut store,
        &root,
        &root.display().to_string(),
        embedder.as_ref(),
        &scan_opts,
        None,
        None,
        &now_rfc3339(),
    )?;
    println!("files_processed={} chunks_embedded={}", summary.files_processed, summary.chunks_embedded);
    Ok(())
}

fn cmd_semantic_update(path: &str) -> Result<()> {
    let root = PathBuf::from(path);
    let config = Config::load(&root).unwrap_or_default();
    let scan_opts = ScanOptions {
        max_file_size: config.resources.max_file_size_bytes,
        extra_excludes: config.ignore.extra_excludes.clone(),
        ..ScanOptions::default()
    };
    let embedder = embedder_for(&config);

    let mut store = SemanticStore::open(&config.semantic_index_path(&root))?;
    let summary = semantic::update_index(
        &mut store,
        &root,
        &root.display().to_string(),
        embedder.as_ref(),
        &scan_opts,
        None,
        &now_rfc3339(),
    )?;
    println!("changed_files={} removed_files={}", summary.changed_files, summary.removed_files);
    Ok(())
}

fn embedder_for(config: &Config) -> Box<dyn repo_engine::embed::Embedder> {
    match &config.embed_backend {
        repo_engine::config::EmbedBackend::Fake { dims } => Box::new(FakeEmbedder::new("fake-v1", *dims)),
        repo_engine::config::EmbedBackend::Ollama { model, .. } => Box::new(FakeEmbedder::new(model.clone(), 768)),
        repo_engine::config::EmbedBackend::OpenAi { model } => Box::new(FakeEmbedder::new(model.clone(), 1536)),
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
