use glob::{MatchOptions, Pattern};

const DOUBLE_STAR: &str = "**";

const SEGMENT_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Matches a file path against a glob pattern.
///
/// `*` and `?` stay within one path segment; `**` spans any number of
/// segments. A pattern without `/` also matches against the file name alone,
/// so `*.go` matches `/src/pkg/main.go`. An empty or malformed pattern
/// matches nothing.
pub fn matches_file_pattern(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let path = to_slash(path);
    let pattern = to_slash(pattern);

    if pattern.contains(DOUBLE_STAR) {
        return matches_double_star(&path, &pattern);
    }

    matches_segment_glob(&pattern, &path)
        || (!pattern.contains('/') && matches_segment_glob(&pattern, base_name(&path)))
}

fn matches_double_star(path: &str, pattern: &str) -> bool {
    let parts = pattern.split(DOUBLE_STAR).collect::<Vec<_>>();
    let prefix = parts[0];
    let suffix = parts[parts.len() - 1].trim_start_matches('/');

    let rest = if prefix.is_empty() {
        path
    } else {
        match path.strip_prefix(prefix) {
            Some(rest) => rest,
            None => return false,
        }
    };

    if suffix.is_empty() {
        return true;
    }

    matches_any_tail(rest, suffix)
        || (prefix.is_empty() && !suffix.contains('/') && matches_segment_glob(suffix, base_name(path)))
}

/// True when `pattern` matches some trailing run of `/`-separated segments of `path`.
fn matches_any_tail(path: &str, pattern: &str) -> bool {
    let Ok(compiled) = Pattern::new(pattern) else {
        return false;
    };

    let segments = path.split('/').collect::<Vec<_>>();
    (0..segments.len()).any(|start| compiled.matches_with(&segments[start..].join("/"), SEGMENT_OPTIONS))
}

fn matches_segment_glob(pattern: &str, candidate: &str) -> bool {
    Pattern::new(pattern).is_ok_and(|compiled| compiled.matches_with(candidate, SEGMENT_OPTIONS))
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn to_slash(input: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        input.to_string()
    } else {
        input.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::matches_file_pattern;

    #[test]
    fn single_star_matches_file_names() {
        assert!(matches_file_pattern("main.go", "*.go"));
        assert!(matches_file_pattern("/src/pkg/main.go", "*.go"));
        assert!(!matches_file_pattern("main.ts", "*.go"));
        assert!(matches_file_pattern("test1.go", "test?.go"));
        assert!(!matches_file_pattern("test12.go", "test?.go"));
    }

    #[test]
    fn single_star_does_not_cross_separators() {
        assert!(matches_file_pattern("/src/main.go", "/src/*.go"));
        assert!(!matches_file_pattern("/src/pkg/main.go", "/src/*.go"));
    }

    #[test]
    fn double_star_spans_directories() {
        assert!(matches_file_pattern("/a/b/c.go", "**/*.go"));
        assert!(matches_file_pattern("/c.go", "**/*.go"));
        assert!(!matches_file_pattern("/a/b/c.rs", "**/*.go"));
        assert!(matches_file_pattern("src/pkg/x.go", "src/**/*.go"));
        assert!(matches_file_pattern("src/x.go", "src/**/*.go"));
        assert!(!matches_file_pattern("lib/pkg/x.go", "src/**/*.go"));
        assert!(matches_file_pattern("/anything/at/all", "**"));
    }

    #[test]
    fn double_star_suffix_with_directories_must_match() {
        assert!(matches_file_pattern("/repo/src/pkg/util/x.go", "/repo/**/util/*.go"));
        assert!(!matches_file_pattern("/repo/src/pkg/other/x.go", "/repo/**/util/*.go"));
    }

    #[test]
    fn empty_and_invalid_patterns_match_nothing() {
        assert!(!matches_file_pattern("main.go", ""));
        assert!(!matches_file_pattern("[invalid", "[invalid"));
        assert!(!matches_file_pattern("main.go", "[invalid"));
    }
}
