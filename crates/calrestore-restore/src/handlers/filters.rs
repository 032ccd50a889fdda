//! Stored filter definitions.

use std::rc::Rc;

use calrestore_core::version::VersionRange;
use calrestore_model::{FilterDef, LocalizedString};

use super::values::{LocalizedRule, add_localized};
use super::{Committable, EntityRule, check_owner};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::shareable;
use crate::fields::{FieldRule, FieldTable};

impl Committable for FilterDef {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    #[tracing::instrument(skip_all, fields(name = %self.name))]
    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if self.name.is_empty() {
            return Err(RestoreError::MissingValue("filter name".to_owned()));
        }
        check_owner(ctx, &mut self.owned)?;

        ctx.sink.restore_filter(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

fn filter_table() -> RestoreResult<Rc<FieldTable>> {
    shareable(FieldTable::new("filter"))
        .set::<FilterDef, _>("name", VersionRange::Any, |f, input| {
            f.name = input.string()?;
            Ok(())
        })
        .set::<FilterDef, _>("definition", VersionRange::Any, |f, input| {
            f.definition = input.opt_string();
            Ok(())
        })
        .ignore_all(&["descriptions", "display-names", "byteSize"])
        .build()
}

fn add_description(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<FilterDef>()?.descriptions.push(value);
    Ok(())
}

fn add_display_name(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<FilterDef>()?.display_names.push(value);
    Ok(())
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add("caldata/filters/filter", EntityRule::<FilterDef>::new())?;
    rules.add("*/filter/?", FieldRule::new(filter_table()?))?;
    add_localized(
        rules,
        "*/filter/descriptions/description",
        LocalizedRule::long(add_description),
    )?;
    add_localized(
        rules,
        "*/filter/display-names/display-name",
        LocalizedRule::new(add_display_name),
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::EntityKind;

    #[test_log::test]
    fn filter_with_localized_texts() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<filters><filter><name>music</name>\
                 <owner><user><account>admin</account></user></owner>\
                 <definition>catuid=(cat-1)</definition>\
                 <descriptions><description><bwlongstring><lang>en</lang>\
                 <value>Music events</value></bwlongstring></description></descriptions>\
                 <display-names><display-name><bwstring><value>Music</value></bwstring>\
                 </display-name></display-names></filter></filters>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        assert_eq!(report.processed(EntityKind::Filter), 1);

        let filter = &sink.filters()[0];
        assert_eq!(filter.definition.as_deref(), Some("catuid=(cat-1)"));
        assert_eq!(filter.descriptions[0].value_str(), "Music events");
        assert_eq!(filter.display_names[0].value_str(), "Music");
        assert_eq!(filter.owned.owner_href.as_deref(), Some("/principals/users/admin"));
    }

    #[test_log::test]
    fn filter_without_name_is_errored() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<filters><filter><owner><user><account>admin</account></user></owner>\
                 <definition>x</definition></filter></filters>"
            ),
        ));

        assert_eq!(report.errored(EntityKind::Filter), 1);
        assert!(sink.filters().is_empty());
    }
}
