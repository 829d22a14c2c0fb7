//! Path exemption patterns.
//!
//! Three pattern shapes are supported:
//! - exact: `/health` matches only `/health`
//! - single segment: `/api/products/*` matches `/api/products/42` and
//!   `/api/products/`, not `/api/products/42/reviews`
//! - multi segment: `/api/auth/**` matches anything under `/api/auth/`
//!
//! Paths are compared byte for byte. No normalisation is applied and the
//! query string is never part of the path, so callers must refuse paths
//! that an upstream could normalise differently (see `is_canonical_path`).

use std::fmt;

use crate::config::ConfigError;

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches the path exactly.
    Exact(String),
    /// Prefix followed by at most one segment.
    SingleSegment(String),
    /// Prefix followed by anything.
    MultiSegment(String),
}

impl PathPattern {
    /// Parse a pattern.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern does not start with `/` or uses `*`
    /// anywhere other than a trailing `/*` or `/**`.
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        if !pattern.starts_with('/') {
            return Err(ConfigError::InvalidPattern(format!(
                "{pattern}: must start with '/'"
            )));
        }

        let parsed = if let Some(prefix) = pattern.strip_suffix("/**") {
            Self::MultiSegment(format!("{prefix}/"))
        } else if let Some(prefix) = pattern.strip_suffix("/*") {
            Self::SingleSegment(format!("{prefix}/"))
        } else {
            Self::Exact(pattern.to_string())
        };

        if parsed.prefix().contains('*') {
            return Err(ConfigError::InvalidPattern(format!(
                "{pattern}: wildcards are only allowed as a trailing /* or /**"
            )));
        }

        Ok(parsed)
    }

    fn prefix(&self) -> &str {
        match self {
            Self::Exact(p) | Self::SingleSegment(p) | Self::MultiSegment(p) => p,
        }
    }

    /// Check whether a request path matches.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::SingleSegment(prefix) => path.strip_prefix(prefix.as_str()).is_some_and(|rest| {
                // A leading '/' in the remainder is tolerated; any later one
                // means a second segment.
                !rest.chars().skip(1).any(|c| c == '/')
            }),
            Self::MultiSegment(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => write!(f, "{p}"),
            Self::SingleSegment(p) => write!(f, "{p}*"),
            Self::MultiSegment(p) => write!(f, "{p}**"),
        }
    }
}

/// Whether a path is safe to classify without normalisation.
///
/// Refuses dot segments (`.` and `..`, including `%2e` spellings), encoded
/// separators (`%2f`, `%5c`) and backslashes. Any of these could resolve to
/// a different path downstream than the one the exemption set saw.
#[must_use]
pub fn is_canonical_path(path: &str) -> bool {
    if !path.starts_with('/') || path.contains('\\') {
        return false;
    }

    let lowered = path.to_ascii_lowercase();
    if lowered.contains("%2f") || lowered.contains("%5c") {
        return false;
    }

    !lowered
        .split('/')
        .map(|segment| segment.replace("%2e", "."))
        .any(|segment| segment == "." || segment == "..")
}

/// Check a path against a raw pattern string.
///
/// Unparseable patterns never match.
#[must_use]
pub fn pattern_matches(path: &str, pattern: &str) -> bool {
    PathPattern::parse(pattern).is_ok_and(|p| p.matches(path))
}

/// Ordered set of public path patterns.
#[derive(Debug, Clone, Default)]
pub struct ExemptionSet {
    patterns: Vec<PathPattern>,
}

impl ExemptionSet {
    /// Build from raw pattern strings.
    ///
    /// # Errors
    ///
    /// Returns error on the first invalid pattern.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| PathPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Whether the path needs no authentication.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    /// The configured patterns, in order.
    #[must_use]
    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no path is public.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marketplace_set() -> ExemptionSet {
        ExemptionSet::new(["/api/auth/**", "/api/products", "/api/products/*", "/health"]).unwrap()
    }

    #[test]
    fn test_exact() {
        assert!(pattern_matches("/health", "/health"));
        assert!(!pattern_matches("/health/", "/health"));
        assert!(!pattern_matches("/healthz", "/health"));
        assert!(!pattern_matches("/HEALTH", "/health"));
    }

    #[test]
    fn test_single_segment() {
        assert!(pattern_matches("/api/products/42", "/api/products/*"));
        assert!(pattern_matches("/api/products/", "/api/products/*"));
        assert!(!pattern_matches("/api/products/42/reviews", "/api/products/*"));
        assert!(!pattern_matches("/api/products", "/api/products/*"));
        assert!(!pattern_matches("/api/productsX/1", "/api/products/*"));
    }

    #[test]
    fn test_single_segment_leading_slash_remainder() {
        assert!(pattern_matches("/api/products//42", "/api/products/*"));
        assert!(!pattern_matches("/api/products//42/x", "/api/products/*"));
    }

    #[test]
    fn test_multi_segment() {
        assert!(pattern_matches("/api/auth/login", "/api/auth/**"));
        assert!(pattern_matches("/api/auth/a/b/c", "/api/auth/**"));
        assert!(pattern_matches("/api/auth/", "/api/auth/**"));
        assert!(!pattern_matches("/api/auth", "/api/auth/**"));
        assert!(!pattern_matches("/api/authx/login", "/api/auth/**"));
    }

    #[test]
    fn test_classification() {
        let set = marketplace_set();
        assert!(set.is_public("/api/auth/login"));
        assert!(set.is_public("/api/auth/register"));
        assert!(set.is_public("/api/products"));
        assert!(set.is_public("/api/products/42"));
        assert!(set.is_public("/health"));

        assert!(!set.is_public("/api/inquiries"));
        assert!(!set.is_public("/api/products/42/reviews"));
        assert!(!set.is_public("/"));
        assert!(!set.is_public(""));
    }

    #[test]
    fn test_empty_set_protects_everything() {
        let set = ExemptionSet::default();
        assert!(set.is_empty());
        assert!(!set.is_public("/health"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::parse("api/products").is_err());
        assert!(PathPattern::parse("/api/*/reviews").is_err());
        assert!(PathPattern::parse("/api/products*").is_err());
        assert!(!pattern_matches("/api/x/reviews", "/api/*/reviews"));
    }

    #[test]
    fn test_canonical_paths() {
        assert!(is_canonical_path("/api/inquiries"));
        assert!(is_canonical_path("/api/products//42"));
        assert!(is_canonical_path("/api/products/v1.2"));
        assert!(is_canonical_path("/api/products/..."));
        assert!(is_canonical_path("/"));
    }

    #[test]
    fn test_dot_segments_are_not_canonical() {
        for path in [
            "/api/auth/../inquiries",
            "/api/auth/./login",
            "/api/auth/..",
            "/api/auth/%2e%2e/inquiries",
            "/api/auth/%2E./inquiries",
            "/api/auth/.%2e/inquiries",
            "/api/auth/%2e/login",
            "/api/auth/..%2finquiries",
            "/api/auth/%2F..%2Finquiries",
            "/api/auth\\..\\inquiries",
            "/api/auth/%5c../inquiries",
            "api/auth/login",
        ] {
            assert!(!is_canonical_path(path), "{path} accepted");
        }
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["/health", "/api/products/*", "/api/auth/**"] {
            assert_eq!(PathPattern::parse(raw).unwrap().to_string(), raw);
        }
    }
}
