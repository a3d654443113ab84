//! The blob filter applied during the history rewrite
//!
//! One file, one secret: every historical version of `backend/.gitignore`
//! loses its `GROQ_API_KEY=` lines. Everything else passes through untouched.

use anyhow::{Context, Result};

/// Repository path of the one file that gets filtered
pub const TARGET_PATH: &str = "backend/.gitignore";

/// Lines starting with this prefix are removed from the target file
pub const SECRET_PREFIX: &str = "GROQ_API_KEY=";

/// Filter a blob by path.
///
/// Returns `None` when the path is not the target (the blob must be left
/// byte-identical), or `Some(filtered)` with the secret lines removed.
/// Non-target blobs are never decoded, so binary content elsewhere in the
/// repository is fine; the target blob and every path must be valid UTF-8.
pub fn scrub_blob(path: &[u8], data: &[u8]) -> Result<Option<Vec<u8>>> {
    let path = std::str::from_utf8(path).context("blob path is not valid UTF-8")?;
    if path != TARGET_PATH {
        return Ok(None);
    }

    let text = std::str::from_utf8(data)
        .with_context(|| format!("contents of {} are not valid UTF-8", path))?;

    Ok(Some(strip_secret_lines(text).into_bytes()))
}

/// Drop every line that starts with the secret prefix and rejoin with `\n`.
///
/// A terminal newline is not preserved: splitting and rejoining normalizes
/// it away, which is what makes applying the filter twice a no-op.
fn strip_secret_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.starts_with(SECRET_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrub_target(data: &[u8]) -> Vec<u8> {
        scrub_blob(TARGET_PATH.as_bytes(), data).unwrap().unwrap()
    }

    #[test]
    fn test_removes_secret_line() {
        let out = scrub_target(b"GROQ_API_KEY=abc\nFOO=1\n");
        assert_eq!(out, b"FOO=1");
    }

    #[test]
    fn test_no_match_rejoins_without_trailing_newline() {
        let out = scrub_target(b"node_modules\n.env\n");
        assert_eq!(out, b"node_modules\n.env");
    }

    #[test]
    fn test_other_path_untouched() {
        let result = scrub_blob(b"backend/.env", b"GROQ_API_KEY=abc\n").unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_idempotent() {
        let once = scrub_target(b"GROQ_API_KEY=abc\nnode_modules\n");
        let twice = scrub_target(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_removes_all_occurrences() {
        let out = scrub_target(b"GROQ_API_KEY=a\nFOO=1\nGROQ_API_KEY=b\nBAR=2\nGROQ_API_KEY=c");
        assert_eq!(out, b"FOO=1\nBAR=2");
    }

    #[test]
    fn test_mid_line_occurrence_retained() {
        let out = scrub_target(b"# rotate GROQ_API_KEY=old soon\nFOO=1\n");
        assert_eq!(out, b"# rotate GROQ_API_KEY=old soon\nFOO=1");
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(scrub_target(b""), b"");
    }

    #[test]
    fn test_invalid_utf8_in_target_is_fatal() {
        let result = scrub_blob(TARGET_PATH.as_bytes(), &[0xff, 0xfe, b'\n']);
        assert!(result.is_err());
    }

    #[test]
    fn test_binary_blob_at_other_path_is_fine() {
        let result = scrub_blob(b"assets/logo.png", &[0xff, 0xd8, 0xff]).unwrap();
        assert_eq!(result, None);
    }
}
