//! Path safety validation (component A).
//!
//! Rejects relative paths that could escape the repository root once applied
//! by the patch engine, before any bytes from a model-produced diff ever
//! reach the filesystem.

use std::sync::LazyLock;

use regex::Regex;

static DRIVE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]:[\\/]?").expect("static regex"));

static DEVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(con|prn|aux|nul|com[0-9]|lpt[0-9])(\.[^/\\]*)?$").expect("static regex"));

const MAX_DECODE_ROUNDS: u32 = 5;

/// Check whether `path` is safe to use as a patch target relative to a repo
/// root. Returns `None` if safe, or `Some(reason)` describing the rejection.
pub fn check_path_safety(path: &str) -> Option<&'static str> {
    if path.contains('\0') || path.contains("%00") {
        return Some("path contains a NUL byte");
    }

    let mut decoded = path.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        match percent_decode_once(&decoded) {
            Some(next) if next != decoded => decoded = next,
            _ => break,
        }
        if decoded.contains("../") || decoded.contains("..\\") || decoded == ".." {
            return Some("path contains a traversal segment");
        }
    }

    let normalized = decoded.replace('\\', "/");

    if normalized.starts_with('/') {
        return Some("path is absolute");
    }

    if DRIVE_LETTER.is_match(&decoded) || DRIVE_LETTER.is_match(&normalized) {
        return Some("path has a Windows drive-letter prefix");
    }

    if decoded.starts_with("//") || decoded.starts_with("\\\\") {
        return Some("path is a UNC path");
    }

    for segment in normalized.split('/') {
        if DEVICE_NAME.is_match(segment) {
            return Some("path segment is a reserved device name");
        }
    }

    let lower = path.to_ascii_lowercase();
    if lower.contains("%2f") || lower.contains("%5c") {
        return Some("path contains an encoded path separator");
    }

    None
}

/// Decode a single round of percent-encoding. Returns `None` on malformed
/// escapes (stops the decode loop rather than erroring).
fn percent_decode_once(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &input[i + 1..i + 3];
            match u8::from_str_radix(hex, 16) {
                Ok(byte) => {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                Err(_) => return None,
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_relative_path() {
        assert_eq!(check_path_safety("src/foo.ts"), None);
    }

    #[test]
    fn rejects_nul_byte() {
        assert!(check_path_safety("src/foo\0.ts").is_some());
        assert!(check_path_safety("src/foo%00.ts").is_some());
    }

    #[test]
    fn rejects_traversal() {
        assert!(check_path_safety("../secret.txt").is_some());
        assert!(check_path_safety("src/../../secret.txt").is_some());
        assert!(check_path_safety("src/..%2f..%2fsecret.txt").is_some());
    }

    #[test]
    fn rejects_encoded_traversal_after_decoding() {
        // %2e%2e%2f decodes to "../"
        assert!(check_path_safety("%2e%2e%2fsecret.txt").is_some());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(check_path_safety("/etc/passwd").is_some());
    }

    #[test]
    fn rejects_drive_letter() {
        assert!(check_path_safety("C:\\Windows\\system.ini").is_some());
        assert!(check_path_safety("C:/Windows/system.ini").is_some());
    }

    #[test]
    fn rejects_unc_path() {
        assert!(check_path_safety("//server/share/file").is_some());
        assert!(check_path_safety("\\\\server\\share\\file").is_some());
    }

    #[test]
    fn rejects_device_names() {
        assert!(check_path_safety("con").is_some());
        assert!(check_path_safety("src/NUL.txt").is_some());
        assert!(check_path_safety("com1.ts").is_some());
    }

    #[test]
    fn rejects_encoded_separators() {
        assert!(check_path_safety("src%2ffoo.ts").is_some());
        assert!(check_path_safety("src%5Cfoo.ts").is_some());
    }

    #[test]
    fn bounded_decode_loop_terminates_on_pathological_input() {
        let pathological = "%25".repeat(100);
        // Must return promptly (no hang) regardless of verdict.
        let _ = check_path_safety(&pathological);
    }
}
