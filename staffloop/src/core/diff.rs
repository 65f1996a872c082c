//! Unified-diff recognition helpers.

use std::sync::LazyLock;

use regex::Regex;

/// Literal token every accepted generation response must start with.
pub const DIFF_HEADER: &str = "diff --git";

static FILE_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^diff --git a/(\S+) b/(\S+)\s*$").unwrap());

/// True if `text` (after leading whitespace) starts with the diff header token.
pub fn is_unified_diff(text: &str) -> bool {
    text.trim_start().starts_with(DIFF_HEADER)
}

/// Strip leading whitespace and guarantee a trailing newline.
///
/// `git apply` reports a corrupt patch when the last hunk line is unterminated.
pub fn normalize_diff(text: &str) -> String {
    let mut diff = text.trim_start().to_string();
    if !diff.ends_with('\n') {
        diff.push('\n');
    }
    diff
}

/// Paths named by the `diff --git a/.. b/..` headers, in order, without duplicates.
///
/// The post-image (`b/`) path is used, so renames report their new name.
pub fn file_headers(diff: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for caps in FILE_HEADER_RE.captures_iter(diff) {
        let path = caps[2].to_string();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FILES: &str = "diff --git a/src/main.rs b/src/main.rs\n\
--- a/src/main.rs\n\
+++ b/src/main.rs\n\
@@ -1 +1,2 @@\n\
 fn main() {}\n\
+// health\n\
diff --git a/src/health.rs b/src/health.rs\n\
new file mode 100644\n\
--- /dev/null\n\
+++ b/src/health.rs\n\
@@ -0,0 +1 @@\n\
+pub fn health() {}\n";

    #[test]
    fn accepts_only_diff_header_prefix() {
        assert!(is_unified_diff(TWO_FILES));
        assert!(is_unified_diff("\n\n  diff --git a/x b/x\n"));
        assert!(!is_unified_diff("Here is the patch:\ndiff --git a/x b/x\n"));
        assert!(!is_unified_diff("```diff\ndiff --git a/x b/x\n```"));
        assert!(!is_unified_diff("--- a/x\n+++ b/x\n"));
    }

    #[test]
    fn normalize_adds_trailing_newline_once() {
        assert_eq!(normalize_diff("  diff --git a/x b/x"), "diff --git a/x b/x\n");
        assert_eq!(normalize_diff("diff --git a/x b/x\n"), "diff --git a/x b/x\n");
    }

    #[test]
    fn file_headers_lists_post_image_paths_in_order() {
        assert_eq!(file_headers(TWO_FILES), vec!["src/main.rs", "src/health.rs"]);
    }

    #[test]
    fn file_headers_uses_new_name_for_renames() {
        let diff = "diff --git a/old.txt b/new.txt\nsimilarity index 100%\nrename from old.txt\nrename to new.txt\n";
        assert_eq!(file_headers(diff), vec!["new.txt"]);
    }
}
