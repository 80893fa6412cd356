//! Repository scanner (component F): ignore-aware, deterministic filesystem
//! walk producing a [`Snapshot`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;

/// One scanned file's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size_bytes: u64,
    pub mtime_ms: u64,
    pub ext: Option<String>,
    pub is_text: bool,
    pub language_hint: Option<&'static str>,
}

/// A snapshot of the repository's files, plus any guardrail warnings.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub files: Vec<FileEntry>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub max_file_size: u64,
    pub max_files: usize,
    pub extra_excludes: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            max_files: 200_000,
            extra_excludes: vec![],
        }
    }
}

const DEFAULT_EXCLUDES: &[&str] = &[".git", "node_modules", "dist", "build", "out", "coverage", ".orchestrator"];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "tar", "gz", "exe", "dll",
    "so", "dylib", "bin", "wasm", "woff", "woff2", "ttf", "otf", "mp3", "mp4", "mov", "avi", "class",
    "o", "a", "lock",
];

/// Scanner instance holding an invalidate-on-demand snapshot cache (see
/// DESIGN.md's scanner-caching-lifetime decision).
#[derive(Default)]
pub struct Scanner {
    cached: Option<(u64, Snapshot)>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Scan `repo_root`, reusing the cached snapshot if `(repo_root, opts)`
    /// hashes to the same key as the last call.
    pub fn scan(&mut self, repo_root: &Path, opts: &ScanOptions) -> Snapshot {
        let key = cache_key(repo_root, opts);
        if let Some((cached_key, snapshot)) = &self.cached {
            if *cached_key == key {
                return snapshot.clone();
            }
        }
        let snapshot = scan_uncached(repo_root, opts);
        self.cached = Some((key, snapshot.clone()));
        snapshot
    }
}

fn cache_key(repo_root: &Path, opts: &ScanOptions) -> u64 {
    let mut hasher = DefaultHasher::new();
    repo_root.hash(&mut hasher);
    opts.max_file_size.hash(&mut hasher);
    opts.max_files.hash(&mut hasher);
    opts.extra_excludes.hash(&mut hasher);
    hasher.finish()
}

/// Run the walk without consulting or populating any cache.
pub fn scan_uncached(repo_root: &Path, opts: &ScanOptions) -> Snapshot {
    let mut builder = WalkBuilder::new(repo_root);
    builder.standard_filters(true).threads(1).add_custom_ignore_filename(".orchestratorignore");
    for excl in DEFAULT_EXCLUDES {
        builder.filter_entry({
            let excl = excl.to_string();
            move |entry| {
                !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name == excl)
            }
        });
    }

    let mut files = Vec::new();
    let mut warnings = Vec::new();

    for result in builder.build() {
        if files.len() >= opts.max_files {
            warnings.push(format!("maxFiles guardrail ({}) reached; walk stopped early", opts.max_files));
            break;
        }
        let entry = match result {
            Ok(e) => e,
            Err(_) => continue, // inaccessible entries are skipped silently
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let abs_path = entry.path().to_path_buf();
        let rel_path = match abs_path.strip_prefix(repo_root) {
            Ok(p) => p.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if extra_excluded(&rel_path, &opts.extra_excludes) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let size_bytes = metadata.len();
        if size_bytes > opts.max_file_size {
            warnings.push(format!("{rel_path}: skipped, exceeds max file size"));
            continue;
        }
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let ext = abs_path.extension().and_then(|e| e.to_str()).map(|s| s.to_ascii_lowercase());
        let is_text = ext.as_deref().is_some_and(|e| !BINARY_EXTENSIONS.contains(&e)) && !has_nul_byte(&abs_path);
        let language_hint = ext.as_deref().and_then(detect_language);

        files.push(FileEntry { rel_path, abs_path, size_bytes, mtime_ms, ext, is_text, language_hint });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    Snapshot { files, warnings }
}

fn extra_excluded(rel_path: &str, extra_excludes: &[String]) -> bool {
    extra_excludes.iter().any(|pat| rel_path.starts_with(pat.as_str()))
}

fn has_nul_byte(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut f) = std::fs::File::open(path) else { return false };
    let mut buf = [0u8; 1024];
    let Ok(n) = f.read(&mut buf) else { return false };
    buf[..n].contains(&0)
}

/// Fixed extension→language map.
pub fn detect_language(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "rs" => "rust",
        "py" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "java" => "java",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "cs" => "csharp",
        "scala" => "scala",
        "sh" | "bash" => "shell",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" | "markdown" => "markdown",
        _ => return None,
    })
}
