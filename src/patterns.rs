//! Bucketed glob matcher for repository and tag filters.
//!
//! Filter sets routinely run against tens of thousands of repository and
//! tag names, while the patterns themselves are almost always of a handful
//! of cheap shapes (`prod/*`, `*-sha256`, `latest`). [`PatternCache`]
//! classifies every pattern once at construction and answers
//! [`matches`](PatternCache::matches) through the cheapest bucket that can
//! decide it, falling back to compiled regexes (and finally raw glob
//! matching) only for genuinely complex patterns.

use regex::Regex;
use rustc_hash::FxHashSet;
use wildmatch::WildMatch;

// ── Pattern classification ─────────────────────────────────────────────

/// Shape of a single glob pattern, decided once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternShape {
    /// `*` — matches every string.
    Universal,
    /// No `*` or `?` at all; exact string equality.
    Literal(String),
    /// `foo*` — a single trailing star.
    Prefix(String),
    /// `*foo` — a single leading star.
    Suffix(String),
    /// `*foo*` — stars at both ends only.
    Contains(String),
    /// Anything else (`a?b`, `v*.*`, …).
    Complex(String),
}

fn classify(pattern: &str) -> PatternShape {
    if pattern == "*" {
        return PatternShape::Universal;
    }
    if !pattern.contains('*') && !pattern.contains('?') {
        return PatternShape::Literal(pattern.to_string());
    }
    if pattern.contains('?') {
        return PatternShape::Complex(pattern.to_string());
    }
    let stars = pattern.matches('*').count();
    let starts = pattern.starts_with('*');
    let ends = pattern.ends_with('*');
    match (stars, starts, ends) {
        (1, false, true) => PatternShape::Prefix(pattern[..pattern.len() - 1].to_string()),
        (1, true, false) => PatternShape::Suffix(pattern[1..].to_string()),
        (2, true, true) => PatternShape::Contains(pattern[1..pattern.len() - 1].to_string()),
        _ => PatternShape::Complex(pattern.to_string()),
    }
}

/// Translate a glob into an anchored regex: `*` ⇒ `[^/]*`, `?` ⇒ `[^/]`,
/// everything else escaped literally.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// A complex pattern: compiled regex when it compiles, raw glob otherwise.
#[derive(Debug, Clone)]
enum CompiledGlob {
    Regex(Regex),
    Glob(WildMatch),
}

impl CompiledGlob {
    fn new(pattern: &str) -> Self {
        match Regex::new(&glob_to_regex(pattern)) {
            Ok(re) => CompiledGlob::Regex(re),
            Err(_) => CompiledGlob::Glob(WildMatch::new(pattern)),
        }
    }

    fn is_match(&self, s: &str) -> bool {
        match self {
            CompiledGlob::Regex(re) => re.is_match(s),
            CompiledGlob::Glob(w) => w.matches(s),
        }
    }
}

// ── PatternCache ───────────────────────────────────────────────────────

/// Immutable, shareable glob matcher specialized by pattern shape.
///
/// Construction classifies each pattern into exactly one bucket; a cache
/// built from an empty list is the distinguished never-matching value.
/// Evaluation short-circuits through the buckets fastest-first: the
/// universal flag, the literal hash set, linear prefix/suffix/contains
/// scans, and finally the compiled complex patterns.
///
/// ```
/// use mirrortree::patterns::PatternCache;
///
/// let cache = PatternCache::new(["prod/*", "*-cache", "latest"]);
/// assert!(cache.matches("prod/api"));
/// assert!(cache.matches("build-cache"));
/// assert!(cache.matches("latest"));
/// assert!(!cache.matches("staging/api"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatternCache {
    match_all: bool,
    literals: FxHashSet<String>,
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    contains: Vec<String>,
    complex: Vec<CompiledGlob>,
    pattern_count: usize,
}

impl PatternCache {
    /// Build a cache from a list of glob patterns.
    ///
    /// Classification is stable under construction order; duplicate
    /// patterns are harmless.
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cache = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            cache.pattern_count += 1;
            match classify(pattern) {
                PatternShape::Universal => cache.match_all = true,
                PatternShape::Literal(lit) => {
                    cache.literals.insert(lit);
                }
                PatternShape::Prefix(p) => cache.prefixes.push(p),
                PatternShape::Suffix(s) => cache.suffixes.push(s),
                PatternShape::Contains(c) => cache.contains.push(c),
                PatternShape::Complex(_) => cache.complex.push(CompiledGlob::new(pattern)),
            }
        }
        cache
    }

    /// True when the cache was built from an empty pattern list and can
    /// never match anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pattern_count == 0
    }

    /// Number of patterns the cache was built from.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pattern_count
    }

    /// Test a string against every pattern, cheapest bucket first.
    #[must_use]
    pub fn matches(&self, s: &str) -> bool {
        if self.pattern_count == 0 {
            return false;
        }
        if self.match_all {
            return true;
        }
        if self.literals.contains(s) {
            return true;
        }
        if self.prefixes.iter().any(|p| s.starts_with(p.as_str())) {
            return true;
        }
        if self.suffixes.iter().any(|p| s.ends_with(p.as_str())) {
            return true;
        }
        if self.contains.iter().any(|p| s.contains(p.as_str())) {
            return true;
        }
        self.complex.iter().any(|g| g.is_match(s))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
