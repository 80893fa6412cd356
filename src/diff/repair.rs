//! Diff repair (component B): syntactic reconstruction of malformed model
//! diffs without invoking the model again.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Options available to the repair strategies.
pub struct RepairOptions<'a> {
    pub repo_root: &'a Path,
    pub step_hint: Option<&'a str>,
}

/// A successful repair: the repaired diff text plus a human-readable reason.
pub struct Repaired {
    pub diff_text: String,
    pub reason: &'static str,
}

static CANDIDATE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_.-]+(?:/[A-Za-z0-9_.-]+)+\.[A-Za-z0-9]+").expect("static regex")
});

/// Attempt to repair `diff_text`. Tries strategy 1 then strategy 2; the first
/// strategy that changes the input wins. Returns `None` if neither applies.
pub fn try_repair_unified_diff(diff_text: &str, opts: &RepairOptions<'_>) -> Option<Repaired> {
    if let Some(repaired) = repair_missing_headers(diff_text) {
        return Some(repaired);
    }
    wrap_hunk_only_fragment(diff_text, opts)
}

/// Strategy 1 — insert missing `---`/`+++` headers into `diff --git` blocks.
fn repair_missing_headers(diff_text: &str) -> Option<Repaired> {
    if !diff_text.contains("diff --git ") {
        return None;
    }

    let lines: Vec<&str> = diff_text.lines().collect();
    let mut block_starts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("diff --git ") {
            block_starts.push(i);
        }
    }
    if block_starts.is_empty() {
        return None;
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut changed = false;
    let mut i = 0;

    while i < lines.len() {
        if !lines[i].starts_with("diff --git ") {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        let block_start = i;
        let block_end = block_starts
            .iter()
            .copied()
            .find(|&s| s > block_start)
            .unwrap_or(lines.len());
        let block = &lines[block_start..block_end];

        let (a, b) = match parse_diff_git_header(block[0]) {
            Some(pair) => pair,
            None => {
                out.extend(block.iter().map(|l| l.to_string()));
                i = block_end;
                continue;
            }
        };

        let has_old = block.iter().any(|l| l.starts_with("--- "));
        let has_new = block.iter().any(|l| l.starts_with("+++ "));

        if has_old && has_new {
            out.extend(block.iter().map(|l| l.to_string()));
            i = block_end;
            continue;
        }

        changed = true;
        let is_new_file = block.iter().any(|l| l.starts_with("new file mode"));
        let is_deleted_file = block.iter().any(|l| l.starts_with("deleted file mode"));

        let old_header = if is_new_file {
            "--- /dev/null".to_string()
        } else {
            format!("--- a/{a}")
        };
        let new_header = if is_deleted_file {
            "+++ /dev/null".to_string()
        } else {
            format!("+++ b/{b}")
        };

        out.push(block[0].to_string());
        // Split the pre-hunk region into plain metadata lines and any header
        // line already present, so headers can be re-emitted in canonical
        // "---" then "+++" order regardless of which one was missing.
        let mut existing_old: Option<String> = None;
        let mut existing_new: Option<String> = None;
        let mut j = 1;
        while j < block.len() && !block[j].starts_with("@@ ") {
            if block[j].starts_with("--- ") {
                existing_old = Some(block[j].to_string());
            } else if block[j].starts_with("+++ ") {
                existing_new = Some(block[j].to_string());
            } else {
                out.push(block[j].to_string());
            }
            j += 1;
        }
        out.push(existing_old.unwrap_or(old_header));
        out.push(existing_new.unwrap_or(new_header));
        out.extend(block[j..].iter().map(|l| l.to_string()));

        i = block_end;
    }

    if !changed {
        return None;
    }

    let mut text = out.join("\n");
    if diff_text.ends_with('\n') {
        text.push('\n');
    }
    Some(Repaired {
        diff_text: text,
        reason: "inserted missing file headers",
    })
}

fn parse_diff_git_header(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("diff --git ")?;
    let a_marker = "a/";
    let b_marker = " b/";
    let a_start = rest.find(a_marker)? + a_marker.len();
    let b_pos = rest[a_start..].find(b_marker)? + a_start;
    let a = rest[a_start..b_pos].to_string();
    let b = rest[b_pos + b_marker.len()..].to_string();
    Some((a, b))
}

/// Strategy 2 — wrap a bare hunk fragment (no file headers at all) using a
/// free-form step hint to infer the target path.
fn wrap_hunk_only_fragment(diff_text: &str, opts: &RepairOptions<'_>) -> Option<Repaired> {
    if !diff_text.contains("@@ ") {
        return None;
    }
    if diff_text.contains("diff --git ") || diff_text.contains("--- ") || diff_text.contains("+++ ") {
        return None;
    }

    let hint = opts.step_hint?;
    let path = infer_path_from_hint(hint, opts.repo_root)?;

    let first_hunk = diff_text
        .lines()
        .find(|l| l.starts_with("@@ "))
        .expect("checked above");
    let mode = infer_mode(first_hunk);

    let (old_header, new_header) = match mode {
        HunkMode::NewFile => ("--- /dev/null".to_string(), format!("+++ b/{path}")),
        HunkMode::Delete => (format!("--- a/{path}"), "+++ /dev/null".to_string()),
        HunkMode::Modify => (format!("--- a/{path}"), format!("+++ b/{path}")),
    };

    let mut text = format!("diff --git a/{path} b/{path}\n{old_header}\n{new_header}\n");
    text.push_str(diff_text);
    if !text.ends_with('\n') {
        text.push('\n');
    }

    Some(Repaired {
        diff_text: text,
        reason: "wrapped hunk-only fragment with inferred file headers",
    })
}

enum HunkMode {
    NewFile,
    Delete,
    Modify,
}

fn infer_mode(hunk_header: &str) -> HunkMode {
    // @@ -oldStart[,oldCount] +newStart[,newCount] @@
    let inner = hunk_header.trim_start_matches("@@ ");
    let old_part = inner.split(' ').next().unwrap_or("");
    let new_part = inner.split(' ').nth(1).unwrap_or("");
    if old_part == "-0,0" {
        HunkMode::NewFile
    } else if new_part == "+0,0" {
        HunkMode::Delete
    } else {
        HunkMode::Modify
    }
}

fn infer_path_from_hint(hint: &str, repo_root: &Path) -> Option<String> {
    let mut candidates: Vec<String> = Vec::new();
    for m in CANDIDATE_PATH.find_iter(hint) {
        let candidate = m.as_str();
        if candidate.starts_with('/') || candidate.contains("..") {
            continue;
        }
        if !candidates.iter().any(|c| c == candidate) {
            candidates.push(candidate.to_string());
        }
    }

    match candidates.len() {
        0 => None,
        1 => Some(candidates.into_iter().next().expect("len==1")),
        _ => {
            let existing: Vec<&String> = candidates
                .iter()
                .filter(|c| repo_root.join(c).exists())
                .collect();
            if existing.len() == 1 {
                Some(existing[0].clone())
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts<'a>(root: &'a Path, hint: Option<&'a str>) -> RepairOptions<'a> {
        RepairOptions { repo_root: root, step_hint: hint }
    }

    #[test]
    fn s1_header_repair() {
        let input = "diff --git a/foo.txt b/foo.txt\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        let dir = TempDir::new().unwrap();
        let repaired = try_repair_unified_diff(input, &opts(dir.path(), None)).expect("repair");
        assert!(repaired.diff_text.contains("--- a/foo.txt"));
        assert!(repaired.diff_text.contains("+++ b/foo.txt"));
        assert!(repaired.diff_text.contains("-a\n+b"));
    }

    #[test]
    fn repairs_block_with_only_new_header_present_in_correct_order() {
        let input = "diff --git a/foo.txt b/foo.txt\n+++ b/foo.txt\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        let dir = TempDir::new().unwrap();
        let repaired = try_repair_unified_diff(input, &opts(dir.path(), None)).expect("repair");

        let old_pos = repaired.diff_text.find("--- a/foo.txt").expect("old header present");
        let new_pos = repaired.diff_text.find("+++ b/foo.txt").expect("new header present");
        assert!(old_pos < new_pos, "'---' must precede '+++', got:\n{}", repaired.diff_text);

        // the repaired output must itself validate cleanly
        use crate::diff::validate::{validate_diff, PatchLimits};
        assert!(validate_diff(&repaired.diff_text, &PatchLimits::default()).is_ok());
    }

    #[test]
    fn s2_hunk_only_wrap() {
        let input = "@@ -1,1 +1,1 @@\n-a\n+b";
        let dir = TempDir::new().unwrap();
        let repaired =
            try_repair_unified_diff(input, &opts(dir.path(), Some("Fix bug in src/foo.ts")))
                .expect("repair");
        let mut lines = repaired.diff_text.lines();
        assert_eq!(lines.next(), Some("diff --git a/src/foo.ts b/src/foo.ts"));
        assert_eq!(lines.next(), Some("--- a/src/foo.ts"));
        assert_eq!(lines.next(), Some("+++ b/src/foo.ts"));
    }

    #[test]
    fn s3_new_file_inference() {
        let input = "@@ -0,0 +1,2 @@\n+a\n+b";
        let dir = TempDir::new().unwrap();
        let repaired =
            try_repair_unified_diff(input, &opts(dir.path(), Some("Add new file src/new.ts")))
                .expect("repair");
        assert!(repaired.diff_text.contains("--- /dev/null"));
        assert!(repaired.diff_text.contains("+++ b/src/new.ts"));
    }

    #[test]
    fn s4_ambiguity_refusal() {
        let input = "@@ -1,1 +1,1 @@\n-a\n+b";
        let dir = TempDir::new().unwrap();
        let result = try_repair_unified_diff(
            &input,
            &opts(dir.path(), Some("Touch both src/a.ts and src/b.ts")),
        );
        assert!(result.is_none());
    }

    #[test]
    fn repair_idempotent() {
        let input = "diff --git a/foo.txt b/foo.txt\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        let dir = TempDir::new().unwrap();
        let once = try_repair_unified_diff(input, &opts(dir.path(), None)).expect("first repair");
        let twice = try_repair_unified_diff(&once.diff_text, &opts(dir.path(), None));
        assert!(twice.is_none(), "repaired output must not be repairable again");
    }

    #[test]
    fn no_repair_needed_returns_none() {
        let input = "diff --git a/foo.txt b/foo.txt\n--- a/foo.txt\n+++ b/foo.txt\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        let dir = TempDir::new().unwrap();
        assert!(try_repair_unified_diff(input, &opts(dir.path(), None)).is_none());
    }

    #[test]
    fn ambiguous_candidates_prefer_existing_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "x").unwrap();
        // use non-nested names so CANDIDATE_PATH (which requires a slash) still matches via src/ prefix
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "x").unwrap();
        let input = "@@ -1,1 +1,1 @@\n-a\n+b";
        let repaired = try_repair_unified_diff(
            input,
            &opts(dir.path(), Some("Touch src/a.ts or src/missing.ts")),
        )
        .expect("repair");
        assert!(repaired.diff_text.contains("src/a.ts"));
    }
}
