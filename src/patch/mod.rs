//! Patch applier (component D): normalize → validate → no-op short-circuit →
//! apply → classify, driving an external `git apply` process.

use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;

use crate::diff::validate::{validate_diff, PatchLimits};
use crate::error::{PatchError, PatchErrorDetail, PatchErrorKind};

/// Options controlling a single apply invocation.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub limits: PatchLimits,
    pub dry_run: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { limits: PatchLimits::default(), dry_run: false }
    }
}

/// Result of an apply attempt.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub files_changed: Vec<String>,
    pub error: Option<PatchError>,
}

/// Normalize, validate, and apply a unified diff to `repo_root`.
pub fn apply_unified_diff(repo_root: &Path, diff_text: &str, opts: &ApplyOptions) -> ApplyOutcome {
    let normalized = normalize(diff_text);

    if let Err(err) = validate_diff(&normalized, &opts.limits) {
        return ApplyOutcome { applied: false, files_changed: vec![], error: Some(err) };
    }

    if is_noop_diff(&normalized) {
        tracing::debug!("no-op diff (header-only); reporting success with no changes");
        return ApplyOutcome { applied: true, files_changed: vec![], error: None };
    }

    match run_git_apply(repo_root, &normalized, opts.dry_run, false) {
        Ok(files) => ApplyOutcome { applied: true, files_changed: files, error: None },
        Err((_kind, _details, stderr)) if stderr.contains("corrupt patch at line") => {
            tracing::warn!("corrupt patch detected, retrying with --recount");
            let stripped = strip_all_empty_lines(&normalized);
            match run_git_apply(repo_root, &stripped, opts.dry_run, true) {
                Ok(files) => ApplyOutcome { applied: true, files_changed: files, error: None },
                Err((kind2, details2, stderr2)) => ApplyOutcome {
                    applied: false,
                    files_changed: vec![],
                    error: Some(PatchError::Execution {
                        message: "patch apply failed after recount retry".to_string(),
                        kind: kind2,
                        details: details2,
                        stderr: stderr2,
                    }),
                },
            }
        }
        Err((kind, details, stderr)) => ApplyOutcome {
            applied: false,
            files_changed: vec![],
            error: Some(PatchError::Execution {
                message: "patch apply failed".to_string(),
                kind,
                details,
                stderr,
            }),
        },
    }
}

/// Strip fully empty leading/trailing lines, preserve interior/space-only
/// lines, and ensure exactly one trailing newline.
fn normalize(diff_text: &str) -> String {
    let mut lines: Vec<&str> = diff_text.lines().collect();
    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn strip_all_empty_lines(diff_text: &str) -> String {
    let mut out: String = diff_text.lines().filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n");
    out.push('\n');
    out
}

fn is_noop_diff(diff_text: &str) -> bool {
    let has_old = diff_text.lines().any(|l| l.starts_with("--- "));
    let has_new = diff_text.lines().any(|l| l.starts_with("+++ "));
    let has_hunk = diff_text.contains("@@ ");
    let has_content = diff_text.lines().any(|l| {
        (l.starts_with('+') && !l.starts_with("+++")) || (l.starts_with('-') && !l.starts_with("---"))
    });
    has_old && has_new && !has_hunk && !has_content
}

/// Invoke `git apply` with a scoped child handle: the patch is piped over
/// stdin, stdout/stderr are fully drained, and the child is reaped on every
/// exit path before this function returns.
fn run_git_apply(
    repo_root: &Path,
    diff_text: &str,
    dry_run: bool,
    recount: bool,
) -> Result<Vec<String>, (PatchErrorKind, Vec<PatchErrorDetail>, String)> {
    let mut args: Vec<&str> = vec!["apply", "--whitespace=nowarn", "--ignore-space-change", "--ignore-whitespace"];
    if dry_run {
        args.push("--check");
    }
    if recount {
        args.push("--recount");
    }
    args.push("-");

    let mut child = Command::new("git")
        .args(&args)
        .current_dir(repo_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| (PatchErrorKind::Unknown, vec![], format!("failed to spawn git apply: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(diff_text.as_bytes());
    }

    let output = child
        .wait_with_output()
        .map_err(|e| (PatchErrorKind::Unknown, vec![], format!("failed to wait on git apply: {e}")))?;

    if output.status.success() {
        if dry_run {
            return Ok(vec![]);
        }
        let files = list_changed_files(repo_root, diff_text);
        return Ok(files);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let details = classify_stderr(&stderr);
    let kind = details.first().map(|d| d.kind).unwrap_or(PatchErrorKind::Unknown);
    Err((kind, details, stderr))
}

fn list_changed_files(_repo_root: &Path, diff_text: &str) -> Vec<String> {
    let mut files = Vec::new();
    for line in diff_text.lines() {
        if let Some(path) = line.strip_prefix("+++ b/") {
            if !files.contains(&path.to_string()) {
                files.push(path.to_string());
            }
        } else if let Some(path) = line.strip_prefix("--- a/") {
            // deleted file: "+++" header is /dev/null, so capture via "---" instead
            if !files.contains(&path.to_string()) {
                files.push(path.to_string());
            }
        }
    }
    files
}

static PATTERN_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error: patch fragment without header at line (\d+)").expect("re"));
static PATTERN_CORRUPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error: corrupt patch at line (\d+)").expect("re"));
static PATTERN_HUNK_FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error: patch failed: ([^:]+):(\d+)").expect("re"));
static PATTERN_NOT_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error: (.+): No such file or directory").expect("re"));
static PATTERN_EXISTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error: (.+): already exists").expect("re"));

/// Classify `git apply` stderr into structured [`PatchErrorDetail`]s, one per
/// recognized line. The overall error kind is the first recognized kind.
pub fn classify_stderr(stderr: &str) -> Vec<PatchErrorDetail> {
    let mut details = Vec::new();

    for line in stderr.lines() {
        if let Some(caps) = PATTERN_FRAGMENT.captures(line) {
            details.push(PatchErrorDetail {
                kind: PatchErrorKind::InvalidPatch,
                file: None,
                line: caps.get(1).and_then(|m| m.as_str().parse().ok()),
                message: line.to_string(),
                suggestion: Some("Ensure the diff has a complete file header before each hunk.".to_string()),
            });
            continue;
        }
        if let Some(caps) = PATTERN_CORRUPT.captures(line) {
            details.push(PatchErrorDetail {
                kind: PatchErrorKind::CorruptPatch,
                file: None,
                line: caps.get(1).and_then(|m| m.as_str().parse().ok()),
                message: line.to_string(),
                suggestion: Some("Regenerate the hunk with correct line counts, or retry with --recount.".to_string()),
            });
            continue;
        }
        if let Some(caps) = PATTERN_HUNK_FAILED.captures(line) {
            details.push(PatchErrorDetail {
                kind: PatchErrorKind::HunkFailed,
                file: caps.get(1).map(|m| m.as_str().to_string()),
                line: caps.get(2).and_then(|m| m.as_str().parse().ok()),
                message: line.to_string(),
                suggestion: Some("Re-read the file and regenerate the hunk against its current content.".to_string()),
            });
            continue;
        }
        if let Some(caps) = PATTERN_NOT_FOUND.captures(line) {
            details.push(PatchErrorDetail {
                kind: PatchErrorKind::FileNotFound,
                file: caps.get(1).map(|m| m.as_str().to_string()),
                line: None,
                message: line.to_string(),
                suggestion: Some("Verify the target file path exists in the working tree.".to_string()),
            });
            continue;
        }
        if let Some(caps) = PATTERN_EXISTS.captures(line) {
            details.push(PatchErrorDetail {
                kind: PatchErrorKind::AlreadyExists,
                file: caps.get(1).map(|m| m.as_str().to_string()),
                line: None,
                message: line.to_string(),
                suggestion: Some("Use a modify hunk instead of a new-file hunk for an existing file.".to_string()),
            });
            continue;
        }
        if line.to_ascii_lowercase().contains("whitespace error") {
            let already_has_priority_kind = details
                .iter()
                .any(|d| !matches!(d.kind, PatchErrorKind::Whitespace | PatchErrorKind::Unknown));
            if !already_has_priority_kind {
                details.push(PatchErrorDetail {
                    kind: PatchErrorKind::Whitespace,
                    file: None,
                    line: None,
                    message: line.to_string(),
                    suggestion: Some("Retry with whitespace normalization.".to_string()),
                });
            }
        }
    }

    details
}
