//! Right matching.
//!
//! The engine only composes a `matches(required, granted)` predicate; the
//! grammar lives behind [`RightMatcher`] so deployments can swap it.
//!
//! The default [`WildcardMatcher`] understands separator-delimited rights:
//!
//! | Granted          | Covers                                   |
//! |------------------|------------------------------------------|
//! | `*`              | every right                              |
//! | `posts.write`    | `posts.write` only                       |
//! | `posts.*`        | `posts.write`, `posts.comments.delete`   |
//! | `posts.*.read`   | `posts.drafts.read`, not `posts.read`    |

use crate::error::{AuthzError, ErrorCode, Result};

/// Decides whether a granted right pattern covers a required right.
pub trait RightMatcher: Send + Sync {
    fn matches(&self, required: &str, granted: &str) -> bool;
}

impl<F> RightMatcher for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn matches(&self, required: &str, granted: &str) -> bool {
        self(required, granted)
    }
}

pub const WILDCARD: &str = "*";
pub const DEFAULT_SEPARATOR: char = '.';

/// Hierarchical wildcard matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WildcardMatcher {
    separator: char,
}

impl WildcardMatcher {
    pub fn new() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
        }
    }

    pub fn with_separator(separator: char) -> Self {
        Self { separator }
    }

    /// Build from a configured separator string, which must be one character.
    pub fn from_config(separator: &str) -> Result<Self> {
        let mut chars = separator.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.to_string() != WILDCARD && !c.is_whitespace() => {
                Ok(Self::with_separator(c))
            }
            _ => Err(AuthzError::with_internal(
                ErrorCode::InvalidConfiguration,
                "Right separator must be a single non-wildcard character",
                format!("got {:?}", separator),
            )),
        }
    }

    pub fn separator(&self) -> char {
        self.separator
    }
}

impl Default for WildcardMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RightMatcher for WildcardMatcher {
    fn matches(&self, required: &str, granted: &str) -> bool {
        if granted == WILDCARD || granted == required {
            return true;
        }

        let granted: Vec<&str> = granted.split(self.separator).collect();
        let required: Vec<&str> = required.split(self.separator).collect();
        let last = granted.len() - 1;

        for (i, pattern) in granted.iter().enumerate() {
            if i == last && *pattern == WILDCARD {
                // trailing wildcard needs at least one non-empty segment to cover
                return required.len() > i && required[i..].iter().all(|s| !s.is_empty());
            }
            match required.get(i) {
                Some(segment) if *pattern == WILDCARD && !segment.is_empty() => {}
                Some(segment) if pattern == segment => {}
                _ => return false,
            }
        }

        granted.len() == required.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m() -> WildcardMatcher {
        WildcardMatcher::new()
    }

    #[test]
    fn test_exact_match() {
        assert!(m().matches("posts.write", "posts.write"));
        assert!(!m().matches("posts.write", "posts.read"));
        assert!(!m().matches("posts", "posts.write"));
        assert!(!m().matches("posts.write.all", "posts.write"));
    }

    #[test]
    fn test_global_wildcard() {
        assert!(m().matches("posts.write", "*"));
        assert!(m().matches("billing", "*"));
    }

    #[test]
    fn test_trailing_wildcard_covers_descendants() {
        assert!(m().matches("posts.write", "posts.*"));
        assert!(m().matches("posts.comments.delete", "posts.*"));
        assert!(!m().matches("posts", "posts.*"));
        assert!(!m().matches("pages.write", "posts.*"));
    }

    #[test]
    fn test_middle_wildcard_covers_one_segment() {
        assert!(m().matches("posts.drafts.read", "posts.*.read"));
        assert!(!m().matches("posts.read", "posts.*.read"));
        assert!(!m().matches("posts.a.b.read", "posts.*.read"));
        assert!(!m().matches("posts.drafts.write", "posts.*.read"));
    }

    #[test]
    fn test_wildcards_do_not_cover_empty_segments() {
        assert!(!m().matches("posts.", "posts.*"));
        assert!(!m().matches("posts.comments.", "posts.*"));
        assert!(!m().matches("posts..delete", "posts.*"));
        assert!(!m().matches("posts..read", "posts.*.read"));
        // the literal right still matches itself
        assert!(m().matches("posts.", "posts."));
    }

    #[test]
    fn test_custom_separator() {
        let colon = WildcardMatcher::with_separator(':');
        assert!(colon.matches("swarm:create", "swarm:*"));
        assert!(!colon.matches("swarm.create", "swarm:*"));
    }

    #[test]
    fn test_from_config() {
        assert_eq!(WildcardMatcher::from_config(":").unwrap().separator(), ':');
        assert!(WildcardMatcher::from_config("").is_err());
        assert!(WildcardMatcher::from_config("::").is_err());
        assert!(WildcardMatcher::from_config("*").is_err());
        assert!(WildcardMatcher::from_config(" ").is_err());
    }

    #[test]
    fn test_closure_matcher() {
        let prefix = |required: &str, granted: &str| required.starts_with(granted);
        assert!(RightMatcher::matches(&prefix, "posts.write", "posts"));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    fn right() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..5).prop_map(|s| s.join("."))
    }

    proptest! {
        #[test]
        fn prop_reflexive(r in right()) {
            prop_assert!(m().matches(&r, &r));
        }

        #[test]
        fn prop_global_wildcard_covers_everything(r in right()) {
            prop_assert!(m().matches(&r, "*"));
        }

        #[test]
        fn prop_prefix_wildcard_covers_extensions(
            prefix in prop::collection::vec(segment(), 1..3),
            rest in prop::collection::vec(segment(), 1..3),
        ) {
            let granted = format!("{}.*", prefix.join("."));
            let required = format!("{}.{}", prefix.join("."), rest.join("."));
            prop_assert!(m().matches(&required, &granted));
        }

        #[test]
        fn prop_prefix_wildcard_does_not_cover_prefix_itself(
            prefix in prop::collection::vec(segment(), 1..3),
        ) {
            let granted = format!("{}.*", prefix.join("."));
            prop_assert!(!m().matches(&prefix.join("."), &granted));
        }

        #[test]
        fn prop_distinct_literals_do_not_match(a in right(), b in right()) {
            prop_assume!(a != b);
            prop_assert!(!m().matches(&a, &b));
        }
    }
}
