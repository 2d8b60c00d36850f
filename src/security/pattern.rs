//! Path pattern matching.
//!
//! # Responsibilities
//! - Define the matching capability used by whitelists and menu permissions
//! - Provide the default Ant-style glob matcher
//!
//! # Pattern Syntax
//! - `?` matches one character within a segment
//! - `*` matches zero or more characters within a segment
//! - `**` matches zero or more whole segments
//! - `{name}` matches one segment (URI template variable)
//!
//! # Design Decisions
//! - Matching is pure and allocation-light; patterns are compiled per call
//! - Pattern and path must agree on a leading `/`
//! - A trailing `/` is significant unless the pattern ends in `**`
//! - Wildcards are matched iteratively; cost is bounded by pattern length
//!   times path length
//! - Request paths are canonicalized with `canonical_path` before any
//!   whitelist or menu check

use std::sync::Arc;

/// Capability: does `path` match `pattern`?
pub trait PathMatcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, pattern: &str, path: &str) -> bool;
}

/// Ant-style glob matcher over `/`-separated paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct AntPathMatcher;

impl AntPathMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl PathMatcher for AntPathMatcher {
    fn matches(&self, pattern: &str, path: &str) -> bool {
        if pattern.starts_with('/') != path.starts_with('/') {
            return false;
        }

        let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if !match_segments(&pattern_segments, &path_segments) {
            return false;
        }

        if pattern_segments.last() == Some(&"**") {
            return true;
        }
        pattern.ends_with('/') == path.ends_with('/')
    }
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    wildcard_match(pattern, path, |p| *p == "**", |p, segment| match_segment(p, segment))
}

fn match_segment(pattern: &str, segment: &str) -> bool {
    if pattern.starts_with('{') && pattern.ends_with('}') {
        return true;
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let segment: Vec<char> = segment.chars().collect();
    wildcard_match(&pattern, &segment, |p| *p == '*', |p, c| *p == '?' || p == c)
}

/// Greedy wildcard match with single-point backtracking.
///
/// `is_star` elements match any run of text elements (including none);
/// every other element must satisfy `accepts` against exactly one.
fn wildcard_match<P, T>(
    pattern: &[P],
    text: &[T],
    is_star: impl Fn(&P) -> bool,
    accepts: impl Fn(&P, &T) -> bool,
) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(element) if is_star(element) => {
                resume = Some((p, t));
                p += 1;
            }
            Some(element) if accepts(element, &text[t]) => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    resume = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(is_star)
}

/// Resolve `.` and `..` segments, including their percent-encoded forms.
///
/// `..` at the root stays at the root. A trailing `/` survives, and a path
/// ending in a dot segment gains one. Other segments are kept byte for byte.
pub fn canonical_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = path.ends_with('/');

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match dot_segment(segment) {
            Some(DotSegment::Current) => trailing_slash = true,
            Some(DotSegment::Parent) => {
                segments.pop();
                trailing_slash = true;
            }
            None => {
                segments.push(segment);
                trailing_slash = path.ends_with('/');
            }
        }
    }

    let mut canonical = String::with_capacity(path.len());
    for segment in &segments {
        canonical.push('/');
        canonical.push_str(segment);
    }
    if canonical.is_empty() || trailing_slash {
        canonical.push('/');
    }
    canonical
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    match decoded.as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}

/// An immutable set of patterns sharing one matcher.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    matcher: Arc<dyn PathMatcher>,
}

impl PatternSet {
    pub fn new(patterns: Vec<String>, matcher: Arc<dyn PathMatcher>) -> Self {
        Self { patterns, matcher }
    }

    /// Returns true if any pattern matches the path.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| self.matcher.matches(p, path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
