use mirrortree::patterns::PatternCache;
use proptest::prelude::*;

/// Hand-checked oracle corpus: (patterns, input, expected).
#[test]
fn oracle_corpus_agrees_with_glob_semantics() {
    let cases: &[(&[&str], &str, bool)] = &[
        (&[], "anything", false),
        (&[""], "", true),
        (&[""], "x", false),
        (&["*"], "", true),
        (&["*"], "prod/api", true),
        (&["latest"], "latest", true),
        (&["latest"], "latest-1", false),
        (&["prod/*"], "prod/api", true),
        (&["prod/*"], "prod/team/api", true),
        (&["prod/*"], "staging/api", false),
        (&["*-cache"], "build-cache", true),
        (&["*-cache"], "cache-build", false),
        (&["*debug*"], "app-debug-v2", true),
        (&["*debug*"], "release", false),
        (&["v?.?"], "v1.2", true),
        (&["v?.?"], "v12.3", false),
        (&["release-*-rc?"], "release-2024-rc1", true),
        (&["release-*-rc?"], "release-rc1", false),
        (&["team-?/svc-*"], "team-a/svc-api", true),
        (&["team-?/svc-*"], "team-ab/svc-api", false),
        (&["a*b*c"], "abc", true),
        (&["a*b*c"], "aXbYc", true),
        (&["a*b*c"], "aXc", false),
        // Later patterns still apply after earlier misses.
        (&["nope", "prod/*", "*.sig"], "prod/api", true),
        (&["nope", "prod/*", "*.sig"], "manifest.sig", true),
        (&["nope", "prod/*", "*.sig"], "other", false),
    ];

    for (patterns, input, expected) in cases {
        let cache = PatternCache::new(patterns.iter().copied());
        assert_eq!(
            cache.matches(input),
            *expected,
            "patterns {patterns:?} against {input:?}"
        );
    }
}

#[test]
fn classification_is_stable_under_order() {
    let forward = PatternCache::new(["prod/*", "latest", "*-rc", "a?c"]);
    let reverse = PatternCache::new(["a?c", "*-rc", "latest", "prod/*"]);
    for input in ["prod/x", "latest", "build-rc", "abc", "nothing", ""] {
        assert_eq!(forward.matches(input), reverse.matches(input), "{input:?}");
    }
}

proptest! {
    /// Any string matches the universal wildcard.
    #[test]
    fn universal_matches_everything(s in ".*") {
        prop_assert!(PatternCache::new(["*"]).matches(&s));
    }

    /// A literal pattern matches exactly itself.
    #[test]
    fn literal_matches_itself_only(s in "[a-z/._-]{0,24}", other in "[a-z/._-]{0,24}") {
        let cache = PatternCache::new([s.as_str()]);
        prop_assert!(cache.matches(&s));
        if other != s {
            prop_assert!(!cache.matches(&other));
        }
    }

    /// `p*` agrees with `starts_with(p)` on arbitrary inputs.
    #[test]
    fn prefix_pattern_agrees_with_starts_with(p in "[a-z/-]{1,12}", x in "[a-z/-]{0,20}") {
        let cache = PatternCache::new([format!("{p}*")]);
        prop_assert_eq!(cache.matches(&x), x.starts_with(&p));
        let combined = format!("{p}{x}");
        prop_assert!(cache.matches(&combined));
    }

    /// `*s` matches every string ending in `s`.
    #[test]
    fn suffix_pattern_matches_endings(s in "[a-z.-]{1,12}", head in "[a-z/-]{0,12}") {
        let cache = PatternCache::new([format!("*{s}")]);
        let combined = format!("{head}{s}");
        prop_assert!(cache.matches(&combined));
    }

    /// The empty cache never matches anything.
    #[test]
    fn empty_cache_never_matches(s in ".*") {
        prop_assert!(!PatternCache::new(Vec::<String>::new()).matches(&s));
    }
}
