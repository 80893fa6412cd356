//! Diff validation (component C): a single pass over a unified diff's lines
//! enforcing structural well-formedness and policy limits.

use serde::{Deserialize, Serialize};

use crate::error::PatchError;
use crate::path_safety::check_path_safety;

/// Policy limits applied during validation (§3 Patch Limits).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchLimits {
    pub max_files_changed: usize,
    pub max_lines_touched: usize,
    pub allow_binary: bool,
}

impl Default for PatchLimits {
    fn default() -> Self {
        Self {
            max_files_changed: 50,
            max_lines_touched: 1000,
            allow_binary: false,
        }
    }
}

/// A diff that passed validation.
#[derive(Debug, Default)]
pub struct ValidateOutcome {
    pub file_count: usize,
    pub added: usize,
    pub removed: usize,
}

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "tar", "gz", "exe", "dll",
    "so", "dylib", "bin", "wasm", "woff", "woff2", "ttf", "otf", "mp3", "mp4", "mov", "avi",
];

#[derive(Default)]
struct FileState {
    has_old_header: bool,
    has_new_header: bool,
}

#[derive(Default)]
struct GitBlockState {
    start_line: usize,
    has_file_headers: bool,
}

/// Validate `diff_text` against structural rules and `limits`.
pub fn validate_diff(diff_text: &str, limits: &PatchLimits) -> Result<ValidateOutcome, PatchError> {
    if diff_text.trim().is_empty() {
        return Err(PatchError::Validation { message: "Empty diff".to_string() });
    }

    let mut file_count = 0usize;
    let mut added = 0usize;
    let mut removed = 0usize;

    let mut file_state = FileState::default();
    let mut in_file_block = false;
    let mut git_block: Option<GitBlockState> = None;

    for (idx, line) in diff_text.lines().enumerate() {
        let line_no = idx + 1;

        if line.starts_with("diff --git") {
            if let Some(prev) = &git_block {
                if !prev.has_file_headers {
                    return Err(PatchError::Validation {
                        message: format!("invalid patch: no file headers for git block starting at line {}", prev.start_line),
                    });
                }
            }
            git_block = Some(GitBlockState { start_line: line_no, has_file_headers: false });
            file_state = FileState::default();
            in_file_block = false;
            continue;
        }

        if line.starts_with("--- ") {
            file_state.has_old_header = true;
            if let Some(gb) = git_block.as_mut() {
                gb.has_file_headers = true;
            }
            continue;
        }

        if line.starts_with("+++ ") {
            if !file_state.has_old_header {
                return Err(PatchError::Validation {
                    message: format!("invalid patch: '+++' without preceding '---' at line {line_no}"),
                });
            }
            file_state.has_new_header = true;
            in_file_block = true;
            if let Some(gb) = git_block.as_mut() {
                gb.has_file_headers = true;
            }

            if let Some(path) = line.strip_prefix("+++ b/") {
                file_count += 1;

                if let Some(reason) = check_path_safety(path) {
                    return Err(PatchError::Security {
                        message: format!("Path traversal or unsafe path rejected: {path} ({reason})"),
                    });
                }

                if !limits.allow_binary {
                    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
                    if BINARY_EXTENSIONS.contains(&ext.as_str()) {
                        return Err(PatchError::Security {
                            message: "Binary file patch detected".to_string(),
                        });
                    }
                }
            }
            continue;
        }

        if line.starts_with("@@ ") {
            if !in_file_block || !file_state.has_old_header || !file_state.has_new_header {
                return Err(PatchError::Validation {
                    message: format!("invalid patch: hunk header without complete file block at line {line_no}"),
                });
            }
            continue;
        }

        if line.starts_with('+') && !line.starts_with("+++") {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            removed += 1;
        }
    }

    if file_state.has_old_header && !file_state.has_new_header {
        return Err(PatchError::Validation {
            message: "invalid patch: final file block missing '+++' header".to_string(),
        });
    }
    if let Some(gb) = &git_block {
        if !gb.has_file_headers {
            return Err(PatchError::Validation {
                message: format!("invalid patch: no file headers for git block starting at line {}", gb.start_line),
            });
        }
    }

    if file_count > limits.max_files_changed {
        return Err(PatchError::Limit {
            message: format!("Too many files changed: {file_count} > {}", limits.max_files_changed),
        });
    }
    if added + removed > limits.max_lines_touched {
        return Err(PatchError::Limit {
            message: format!(
                "Too many lines touched: {} > {}",
                added + removed,
                limits.max_lines_touched
            ),
        });
    }

    Ok(ValidateOutcome { file_count, added, removed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PatchLimits {
        PatchLimits::default()
    }

    #[test]
    fn accepts_well_formed_diff() {
        let diff = "diff --git a/foo.txt b/foo.txt\n--- a/foo.txt\n+++ b/foo.txt\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        let outcome = validate_diff(diff, &limits()).expect("valid");
        assert_eq!(outcome.file_count, 1);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.removed, 1);
    }

    #[test]
    fn rejects_empty_diff() {
        assert!(matches!(validate_diff("   \n", &limits()), Err(PatchError::Validation { .. })));
    }

    #[test]
    fn s5_path_traversal_refusal() {
        let diff = "diff --git a/x b/../secret.txt\n--- a/x\n+++ b/../secret.txt\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        match validate_diff(diff, &limits()) {
            Err(PatchError::Security { message }) => assert!(message.contains("traversal") || message.contains("Path")),
            other => panic!("expected security error, got {other:?}"),
        }
    }

    #[test]
    fn s6_binary_refusal_and_allow() {
        let diff = "diff --git a/image.png b/image.png\n--- a/image.png\n+++ b/image.png\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        assert!(matches!(validate_diff(diff, &limits()), Err(PatchError::Security { .. })));

        let permissive = PatchLimits { allow_binary: true, ..limits() };
        assert!(validate_diff(diff, &permissive).is_ok());
    }

    #[test]
    fn s7_limit_enforcement() {
        let mut diff = String::new();
        for i in 0..5 {
            diff.push_str(&format!(
                "diff --git a/f{i}.txt b/f{i}.txt\n--- a/f{i}.txt\n+++ b/f{i}.txt\n@@ -1,1 +1,1 @@\n-a\n+b\n"
            ));
        }
        let tight = PatchLimits { max_files_changed: 2, ..limits() };
        match validate_diff(&diff, &tight) {
            Err(PatchError::Limit { message }) => assert!(message.contains("Too many files")),
            other => panic!("expected limit error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_hunk_without_file_block() {
        let diff = "@@ -1,1 +1,1 @@\n-a\n+b\n";
        assert!(validate_diff(diff, &limits()).is_err());
    }

    #[test]
    fn rejects_plus_plus_without_minus_minus() {
        let diff = "diff --git a/f b/f\n+++ b/f\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        assert!(validate_diff(diff, &limits()).is_err());
    }

    #[test]
    fn no_op_header_only_diff_is_structurally_valid() {
        let diff = "diff --git a/foo.txt b/foo.txt\n--- a/foo.txt\n+++ b/foo.txt\n";
        let outcome = validate_diff(diff, &limits()).expect("valid");
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.removed, 0);
    }
}
