//! Dump version context and version-range predicates.
//!
//! Only `(major, minor)` take part in comparisons. The update number and patch
//! level are recorded for reporting.

use std::fmt;

use crate::error::{CoreError, CoreResult};

/// A frozen dump version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpVersion {
    pub major: u32,
    pub minor: u32,
    pub update: u32,
    pub patch_level: Option<String>,
}

impl DumpVersion {
    #[must_use]
    pub fn new(major: u32, minor: u32, update: u32) -> Self {
        Self {
            major,
            minor,
            update,
            patch_level: None,
        }
    }

    /// ## Summary
    /// True when this version sorts strictly before `major.minor`.
    #[must_use]
    pub fn is_before(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) < (major, minor)
    }

    #[must_use]
    pub fn is_at_or_after(&self, major: u32, minor: u32) -> bool {
        !self.is_before(major, minor)
    }
}

impl fmt::Display for DumpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.update)?;
        if let Some(patch) = &self.patch_level {
            write!(f, "-{patch}")?;
        }
        Ok(())
    }
}

/// Version header fields collected from the dump root before the first section.
#[derive(Debug, Default)]
pub struct VersionContext {
    major: Option<u32>,
    minor: Option<u32>,
    update: Option<u32>,
    patch_level: Option<String>,
    dump_date: Option<String>,
    version_text: Option<String>,
    active: Option<DumpVersion>,
}

impl VersionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context already frozen at `version`, for handler tests.
    #[must_use]
    pub fn fixed(version: DumpVersion) -> Self {
        Self {
            active: Some(version),
            ..Self::default()
        }
    }

    /// ## Summary
    /// Records one header field. Unparseable numbers are kept as missing so
    /// that [`VersionContext::freeze`] reports them.
    ///
    /// ## Errors
    /// Returns `VersionAlreadySet` if the version was frozen already, or
    /// `InvalidInput` for an unknown header field.
    pub fn set_header_field(&mut self, name: &str, value: &str) -> CoreResult<()> {
        if let Some(active) = &self.active {
            return Err(CoreError::VersionAlreadySet(active.to_string()));
        }

        let value = value.trim();
        match name {
            "majorVersion" => self.major = value.parse().ok(),
            "minorVersion" => self.minor = value.parse().ok(),
            "updateVersion" => self.update = value.parse().ok(),
            "patchLevel" => self.patch_level = non_empty(value),
            "dumpDate" => self.dump_date = non_empty(value),
            "version" => self.version_text = non_empty(value),
            _ => {
                return Err(CoreError::InvalidInput(format!(
                    "unknown dump header field {name}"
                )));
            }
        }

        Ok(())
    }

    /// ## Summary
    /// Freezes the collected header into the active version. Happens once.
    ///
    /// ## Errors
    /// Returns `VersionAlreadySet` on a second call and `VersionMissing` when
    /// the major or minor number is absent.
    pub fn freeze(&mut self) -> CoreResult<&DumpVersion> {
        if let Some(active) = &self.active {
            return Err(CoreError::VersionAlreadySet(active.to_string()));
        }

        let major = self.major.ok_or(CoreError::VersionMissing("majorVersion"))?;
        let minor = self.minor.ok_or(CoreError::VersionMissing("minorVersion"))?;

        tracing::info!(
            major,
            minor,
            update = self.update.unwrap_or(0),
            dump_date = ?self.dump_date,
            "Dump version established"
        );

        Ok(self.active.insert(DumpVersion {
            major,
            minor,
            update: self.update.unwrap_or(0),
            patch_level: self.patch_level.clone(),
        }))
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn version(&self) -> Option<&DumpVersion> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn dump_date(&self) -> Option<&str> {
        self.dump_date.as_deref()
    }

    #[must_use]
    pub fn version_text(&self) -> Option<&str> {
        self.version_text.as_deref()
    }

    /// False until the version is frozen.
    #[must_use]
    pub fn is_before(&self, major: u32, minor: u32) -> bool {
        self.active
            .as_ref()
            .is_some_and(|v| v.is_before(major, minor))
    }

    /// True until the version is frozen: an unversioned context reads current data.
    #[must_use]
    pub fn is_at_or_after(&self, major: u32, minor: u32) -> bool {
        !self.is_before(major, minor)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

/// Half-open range of `(major, minor)` versions a field decoder applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRange {
    Any,
    /// Strictly before the given version.
    Before(u32, u32),
    /// The given version and everything after.
    From(u32, u32),
    /// `from` inclusive to `before` exclusive.
    Between { from: (u32, u32), before: (u32, u32) },
}

impl VersionRange {
    fn bounds(self) -> ((u32, u32), Option<(u32, u32)>) {
        match self {
            Self::Any => ((0, 0), None),
            Self::Before(major, minor) => ((0, 0), Some((major, minor))),
            Self::From(major, minor) => ((major, minor), None),
            Self::Between { from, before } => (from, Some(before)),
        }
    }

    #[must_use]
    pub fn contains(self, version: &DumpVersion) -> bool {
        let (lo, hi) = self.bounds();
        let v = (version.major, version.minor);
        v >= lo && hi.is_none_or(|hi| v < hi)
    }

    /// ## Summary
    /// Tests a range against a context that may not be frozen yet. An
    /// unversioned context reads current data, so only open-ended ranges apply.
    #[must_use]
    pub fn applies_to(self, version: Option<&DumpVersion>) -> bool {
        match version {
            Some(v) => self.contains(v),
            None => self.bounds().1.is_none(),
        }
    }

    /// ## Summary
    /// True when some version falls in both ranges.
    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        let (a_lo, a_hi) = self.bounds();
        let (b_lo, b_hi) = other.bounds();
        let a_starts_before_b_ends = b_hi.is_none_or(|hi| a_lo < hi);
        let b_starts_before_a_ends = a_hi.is_none_or(|hi| b_lo < hi);
        a_starts_before_b_ends && b_starts_before_a_ends
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Before(major, minor) => write!(f, "<{major}.{minor}"),
            Self::From(major, minor) => write!(f, ">={major}.{minor}"),
            Self::Between { from, before } => {
                write!(f, ">={}.{},<{}.{}", from.0, from.1, before.0, before.1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(major: &str, minor: &str) -> VersionContext {
        let mut ctx = VersionContext::new();
        ctx.set_header_field("majorVersion", major).unwrap();
        ctx.set_header_field("minorVersion", minor).unwrap();
        ctx
    }

    #[test_log::test]
    fn freeze_requires_major_and_minor() {
        let mut ctx = VersionContext::new();
        ctx.set_header_field("majorVersion", "3").unwrap();
        assert!(matches!(
            ctx.freeze(),
            Err(CoreError::VersionMissing("minorVersion"))
        ));

        let mut ctx = context("three", "5");
        assert!(matches!(
            ctx.freeze(),
            Err(CoreError::VersionMissing("majorVersion"))
        ));
    }

    #[test_log::test]
    fn freeze_only_once() {
        let mut ctx = context("3", "5");
        ctx.freeze().unwrap();

        assert!(matches!(ctx.freeze(), Err(CoreError::VersionAlreadySet(_))));
        assert!(matches!(
            ctx.set_header_field("minorVersion", "6"),
            Err(CoreError::VersionAlreadySet(_))
        ));
    }

    #[test]
    fn comparisons_use_major_then_minor() {
        let mut ctx = context("3", "4");
        ctx.set_header_field("updateVersion", "9").unwrap();
        ctx.freeze().unwrap();

        assert!(ctx.is_before(3, 5));
        assert!(ctx.is_before(4, 0));
        assert!(!ctx.is_before(3, 4));
        assert!(ctx.is_at_or_after(3, 3));
        assert!(ctx.is_at_or_after(2, 9));
    }

    #[test]
    fn unfrozen_context_reads_as_current() {
        let ctx = VersionContext::new();
        assert!(!ctx.is_before(3, 5));
        assert!(ctx.is_at_or_after(3, 5));
    }

    #[test]
    fn display_includes_patch_level() {
        let mut version = DumpVersion::new(3, 6, 1);
        assert_eq!(version.to_string(), "3.6.1");
        version.patch_level = Some("p2".into());
        assert_eq!(version.to_string(), "3.6.1-p2");
    }

    #[test]
    fn ranges_contain_and_overlap() {
        let v33 = DumpVersion::new(3, 3, 0);
        let v35 = DumpVersion::new(3, 5, 0);

        assert!(VersionRange::Before(3, 5).contains(&v33));
        assert!(!VersionRange::Before(3, 5).contains(&v35));
        assert!(VersionRange::From(3, 5).contains(&v35));
        let between = VersionRange::Between {
            from: (3, 3),
            before: (3, 5),
        };
        assert!(between.contains(&v33));
        assert!(!between.contains(&v35));

        assert!(!VersionRange::Before(3, 5).overlaps(VersionRange::From(3, 5)));
        assert!(VersionRange::Before(3, 5).overlaps(between));
        assert!(VersionRange::Any.overlaps(VersionRange::From(9, 0)));
        assert!(!between.overlaps(VersionRange::Before(3, 3)));
    }

    #[test]
    fn unversioned_context_takes_open_ranges() {
        assert!(VersionRange::Any.applies_to(None));
        assert!(VersionRange::From(3, 5).applies_to(None));
        assert!(!VersionRange::Before(3, 5).applies_to(None));
        assert!(VersionRange::Before(3, 5).applies_to(Some(&DumpVersion::new(3, 1, 0))));
    }
}
