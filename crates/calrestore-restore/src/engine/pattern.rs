//! Element path patterns.
//!
//! | form      | matches                                          |
//! |-----------|--------------------------------------------------|
//! | `a/b/c`   | exactly that path                                |
//! | `*/b/c`   | any path ending in `b/c`                         |
//! | `a/b/?`   | one element directly below `a/b`                 |
//! | `a/b/*`   | any element below `a/b`, at any depth            |
//! | `!…`      | universal: fires next to the best ordinary match |

use std::fmt;

use crate::error::{RestoreError, RestoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    None,
    Child,
    Descendant,
}

/// A parsed element path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    text: String,
    universal: bool,
    anchored: bool,
    segments: Vec<String>,
    tail: Tail,
}

impl Pattern {
    /// ## Summary
    /// Parses a pattern.
    ///
    /// ## Errors
    /// Returns `InvalidPattern` for empty segments, wildcards in the middle of
    /// a pattern, or a pattern with no literal segment.
    pub fn parse(text: &str) -> RestoreResult<Self> {
        let invalid = || RestoreError::InvalidPattern(text.to_owned());

        let (universal, body) = match text.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut parts: Vec<&str> = body.split('/').collect();
        let anchored = parts.first() != Some(&"*");
        if !anchored {
            parts.remove(0);
        }

        let tail = match parts.last() {
            Some(&"?") => Tail::Child,
            Some(&"*") => Tail::Descendant,
            _ => Tail::None,
        };
        if tail != Tail::None {
            parts.pop();
        }

        if parts.is_empty()
            || parts
                .iter()
                .any(|p| p.is_empty() || p.contains(['*', '?', '!']))
        {
            return Err(invalid());
        }

        Ok(Self {
            text: text.to_owned(),
            universal,
            anchored,
            segments: parts.into_iter().map(str::to_owned).collect(),
            tail,
        })
    }

    #[must_use]
    pub fn is_universal(&self) -> bool {
        self.universal
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn matches(&self, path: &[String]) -> bool {
        match self.tail {
            Tail::None => self.matches_literal(path),
            Tail::Child => path
                .split_last()
                .is_some_and(|(_, parent)| self.matches_literal(parent)),
            Tail::Descendant => {
                if path.len() <= self.segments.len() {
                    return false;
                }
                if self.anchored {
                    return path.starts_with(&self.segments);
                }
                let below = &path[..path.len() - 1];
                below
                    .windows(self.segments.len())
                    .any(|w| w == self.segments.as_slice())
            }
        }
    }

    fn matches_literal(&self, path: &[String]) -> bool {
        if self.anchored {
            path == self.segments.as_slice()
        } else {
            path.ends_with(&self.segments)
        }
    }

    /// ## Summary
    /// Rank of this pattern against others matching the same path: literal,
    /// then any-ancestor, then single child, then descendant. Longer literal
    /// parts win within a rank.
    #[must_use]
    pub fn specificity(&self) -> (u8, usize) {
        let rank = match (self.tail, self.anchored) {
            (Tail::None, true) => 3,
            (Tail::None, false) => 2,
            (Tail::Child, _) => 1,
            (Tail::Descendant, _) => 0,
        };
        (rank, self.segments.len())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('/').map(str::to_owned).collect()
    }

    #[test]
    fn literal_and_suffix() {
        let literal = Pattern::parse("caldata/users/user").unwrap();
        assert!(literal.matches(&path("caldata/users/user")));
        assert!(!literal.matches(&path("caldata/users/user/account")));

        let suffix = Pattern::parse("*/event/categories/category").unwrap();
        assert!(suffix.matches(&path("caldata/events/event/categories/category")));
        assert!(suffix.matches(&path(
            "caldata/events/event/overrides/event/categories/category"
        )));
        assert!(!suffix.matches(&path("caldata/categories/category")));
    }

    #[test]
    fn child_and_descendant() {
        let child = Pattern::parse("*/event/?").unwrap();
        assert!(child.matches(&path("caldata/events/event/summary")));
        assert!(!child.matches(&path("caldata/events/event")));
        assert!(!child.matches(&path("caldata/events/event/dtstart/date-time")));

        let desc = Pattern::parse("caldata/syspars/system/*").unwrap();
        assert!(desc.matches(&path("caldata/syspars/system/name")));
        assert!(desc.matches(&path("caldata/syspars/system/rootUsers/x")));
        assert!(!desc.matches(&path("caldata/syspars/system")));
    }

    #[test]
    fn universal_flag_and_invalid_forms() {
        let owner = Pattern::parse("!*/owner/user/account").unwrap();
        assert!(owner.is_universal());
        assert!(owner.matches(&path("caldata/collections/collection/owner/user/account")));

        assert!(Pattern::parse("a//b").is_err());
        assert!(Pattern::parse("a/*/b").is_err());
        assert!(Pattern::parse("*/?").is_err());
    }

    #[test]
    fn specificity_orders_forms() {
        let literal = Pattern::parse("caldata/events/event/summary").unwrap();
        let suffix = Pattern::parse("*/event/summary").unwrap();
        let child = Pattern::parse("*/event/?").unwrap();
        let desc = Pattern::parse("caldata/events/*").unwrap();

        assert!(literal.specificity() > suffix.specificity());
        assert!(suffix.specificity() > child.specificity());
        assert!(child.specificity() > desc.specificity());
    }
}
