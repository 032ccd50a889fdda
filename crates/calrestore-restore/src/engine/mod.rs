//! Path-routed rule engine.
//!
//! Rules are registered against [`pattern::Pattern`]s. For every element the
//! most specific ordinary pattern wins, and every rule registered under that
//! pattern fires together with all matching universal rules.

pub mod driver;
pub mod pattern;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::RestoreContext;
use crate::error::RestoreResult;

pub use pattern::Pattern;

/// One element as seen by a rule.
#[derive(Debug, Clone, Copy)]
pub struct ElementEvent<'a> {
    /// Local name of the element.
    pub name: &'a str,
    /// Names from the document root down to this element, inclusive.
    pub path: &'a [String],
    /// Trimmed body text. Empty at begin.
    pub text: &'a str,
}

impl ElementEvent<'_> {
    /// Body text, `None` when empty.
    #[must_use]
    pub fn opt_text(&self) -> Option<&str> {
        (!self.text.is_empty()).then_some(self.text)
    }
}

/// Callbacks for a matched element.
pub trait Rule {
    /// ## Summary
    /// Called when the element opens.
    ///
    /// ## Errors
    /// Entity-level errors are recorded against the entity in progress;
    /// anything else ends the run.
    fn begin(&self, _ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        Ok(())
    }

    /// ## Summary
    /// Called with the accumulated body text just before [`Rule::end`].
    ///
    /// ## Errors
    /// As for [`Rule::begin`].
    fn body(&self, _ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        Ok(())
    }

    /// ## Summary
    /// Called when the element closes.
    ///
    /// ## Errors
    /// As for [`Rule::begin`].
    fn end(&self, _ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        Ok(())
    }
}

/// Registered rules plus a cache of resolved matches by path.
#[derive(Default)]
pub struct RuleSet {
    entries: Vec<(Pattern, Rc<dyn Rule>)>,
    cache: RefCell<HashMap<String, Rc<[usize]>>>,
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ## Summary
    /// Registers a rule.
    ///
    /// ## Errors
    /// Returns `InvalidPattern` if the pattern does not parse.
    pub fn add(&mut self, pattern: &str, rule: impl Rule + 'static) -> RestoreResult<()> {
        self.add_shared(pattern, Rc::new(rule))
    }

    /// ## Summary
    /// Registers one rule instance under another pattern.
    ///
    /// ## Errors
    /// Returns `InvalidPattern` if the pattern does not parse.
    pub fn add_shared(&mut self, pattern: &str, rule: Rc<dyn Rule>) -> RestoreResult<()> {
        self.entries.push((Pattern::parse(pattern)?, rule));
        self.cache.borrow_mut().clear();
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn rule(&self, index: usize) -> Option<&Rc<dyn Rule>> {
        self.entries.get(index).map(|(_, rule)| rule)
    }

    /// ## Summary
    /// Indices of the rules firing for `path`, in registration order.
    #[must_use]
    pub fn matching(&self, path: &[String]) -> Rc<[usize]> {
        let key = path.join("/");
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Rc::clone(hit);
        }

        let mut best: Option<(&Pattern, (u8, usize))> = None;
        for (pattern, _) in &self.entries {
            if pattern.is_universal() || !pattern.matches(path) {
                continue;
            }
            let rank = pattern.specificity();
            if best.is_none_or(|(_, b)| rank > b) {
                best = Some((pattern, rank));
            }
        }

        let winner = best.map(|(pattern, _)| pattern.as_str().to_owned());
        let indices: Rc<[usize]> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, (pattern, _))| {
                if pattern.is_universal() {
                    pattern.matches(path)
                } else {
                    winner.as_deref() == Some(pattern.as_str())
                }
            })
            .map(|(i, _)| i)
            .collect();

        self.cache.borrow_mut().insert(key, Rc::clone(&indices));
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Rule for Noop {}

    fn path(p: &str) -> Vec<String> {
        p.split('/').map(str::to_owned).collect()
    }

    #[test]
    fn most_specific_pattern_wins() {
        let mut rules = RuleSet::new();
        rules.add("*/event/?", Noop).unwrap();
        rules.add("caldata/events/event/summaries", Noop).unwrap();
        rules.add("!*/owner", Noop).unwrap();
        rules.add("*/event/?", Noop).unwrap();

        assert_eq!(
            &*rules.matching(&path("caldata/events/event/summaries")),
            &[1]
        );
        assert_eq!(&*rules.matching(&path("caldata/events/event/uid")), &[0, 3]);
        assert_eq!(
            &*rules.matching(&path("caldata/events/event/owner")),
            &[0, 2, 3]
        );
        assert!(rules.matching(&path("caldata/other")).is_empty());
    }

    #[test]
    fn longer_suffix_beats_shorter() {
        let mut rules = RuleSet::new();
        rules.add("*/event", Noop).unwrap();
        rules.add("*/overrides/event", Noop).unwrap();

        assert_eq!(
            &*rules.matching(&path("caldata/events/event/overrides/event")),
            &[1]
        );
        assert_eq!(&*rules.matching(&path("caldata/events/event")), &[0]);
    }

    #[test]
    fn cache_is_cleared_on_registration() {
        let mut rules = RuleSet::new();
        rules.add("a/?", Noop).unwrap();
        assert_eq!(&*rules.matching(&path("a/b")), &[0]);

        rules.add("a/b", Noop).unwrap();
        assert_eq!(&*rules.matching(&path("a/b")), &[1]);
        assert_eq!(rules.len(), 2);
    }
}
