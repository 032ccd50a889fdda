//! Dump header fields and section boundaries.

use crate::context::RestoreContext;
use crate::engine::{ElementEvent, Rule, RuleSet};
use crate::error::RestoreResult;

const HEADER_FIELDS: [&str; 6] = [
    "majorVersion",
    "minorVersion",
    "updateVersion",
    "patchLevel",
    "dumpDate",
    "version",
];

/// Children of the dump root: header fields, then sections.
struct SectionRule;

impl Rule for SectionRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        if HEADER_FIELDS.contains(&el.name) {
            return Ok(());
        }

        if !ctx.version.is_set() {
            ctx.version.freeze()?;
        }
        tracing::info!(section = el.name, "Restoring section");
        ctx.section = Some(el.name.to_owned());
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        if HEADER_FIELDS.contains(&el.name) {
            ctx.version.set_header_field(el.name, el.text)?;
            return Ok(());
        }

        tracing::debug!(section = el.name, "Finished section");
        ctx.section = None;
        Ok(())
    }
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add(const_str::concat!(calrestore_core::constants::DUMP_ROOT, "/?"), SectionRule)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use calrestore_core::error::CoreError;

    use crate::context::RestoreOptions;
    use crate::error::RestoreError;
    use crate::memory::MemorySink;

    #[test_log::test]
    fn header_after_section_is_fatal() {
        let mut sink = MemorySink::new();
        let failure = run_with(
            "<caldata><majorVersion>3</majorVersion><minorVersion>5</minorVersion>\
             <users/><updateVersion>1</updateVersion></caldata>",
            &mut sink,
            RestoreOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            failure.error,
            RestoreError::CoreError(CoreError::VersionAlreadySet(_))
        ));
    }

    #[test_log::test]
    fn patch_level_is_reported() {
        let (report, _) = run(
            "<caldata><majorVersion>3</majorVersion><minorVersion>4</minorVersion>\
             <updateVersion>2</updateVersion><patchLevel>p1</patchLevel>\
             <version>3.4.2</version><users/></caldata>",
        );
        assert_eq!(report.version.as_deref(), Some("3.4.2-p1"));
    }
}
