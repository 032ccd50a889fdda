//! Collections (calendars, folders and aliases) and cal-suites.

use std::rc::Rc;

use calrestore_core::principal::PrincipalKind;
use calrestore_core::version::VersionRange;
use calrestore_model::collection::{CAL_TYPE_CALENDAR, CAL_TYPE_FOLDER};
use calrestore_model::{CalSuite, Collection, CollectionLastmod};

use super::values::{UidFieldRule, UidRefRule};
use super::{ChildRule, Committable, EntityRule, check_owner};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::{contained, owned};
use crate::fields::{FieldInput, FieldRule, FieldTable};
use crate::stack::RefTarget;
use crate::tables::CollectionSummary;

impl Committable for Collection {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    #[tracing::instrument(skip_all, fields(path = %self.path))]
    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if self.path.is_empty() {
            return Err(RestoreError::MissingValue("collection path".to_owned()));
        }
        if self.name.is_empty() {
            self.name = self.path.rsplit('/').next().unwrap_or_default().to_owned();
        }
        check_owner(ctx, &mut self.owned)?;

        if let Some(parent) = self.parent_path().map(str::to_owned) {
            let known =
                ctx.tables.calendars.contains(&parent) || ctx.sink.get_calendar(&parent)?.is_some();
            if !known {
                return Err(RestoreError::missing("parent collection", parent));
            }
        }

        ctx.tables.calendars.insert(
            self.path.clone(),
            CollectionSummary {
                owner_href: self.owned.owner_href.clone(),
                cal_type: self.cal_type,
            },
        )?;

        if self.is_external_subscription() {
            ctx.diags.external_subscription(&self.path);
        }

        if self.parent_path().is_some() {
            ctx.sink.add_calendar(&self)?;
        } else {
            tracing::info!("Saving root collection");
            ctx.sink.save_root_calendar(&self)?;
        }
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

fn cal_type(input: &FieldInput<'_>) -> RestoreResult<i32> {
    let value = input.int()?;
    i32::try_from(value).map_err(|e| RestoreError::invalid(input.name, input.text, e))
}

fn collection_table() -> RestoreResult<Rc<FieldTable>> {
    contained(FieldTable::new("collection"))
        .set::<Collection, _>("name", VersionRange::Any, |c, input| {
            c.name = input.text.to_owned();
            Ok(())
        })
        .set::<Collection, _>("path", VersionRange::Any, |c, input| {
            c.path = input.string()?;
            Ok(())
        })
        .set::<Collection, _>("summary", VersionRange::Any, |c, input| {
            c.summary = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("description", VersionRange::Any, |c, input| {
            c.description = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("mailListId", VersionRange::Any, |c, input| {
            c.mail_list_id = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("calType", VersionRange::Any, |c, input| {
            c.cal_type = cal_type(input)?;
            Ok(())
        })
        .set::<Collection, _>("calendarCollection", VersionRange::Before(3, 5), |c, input| {
            c.cal_type = if input.bool() {
                CAL_TYPE_CALENDAR
            } else {
                CAL_TYPE_FOLDER
            };
            Ok(())
        })
        .set::<Collection, _>("aliasUri", VersionRange::Any, |c, input| {
            c.alias_uri = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("display", VersionRange::Any, |c, input| {
            c.display = input.bool();
            Ok(())
        })
        .set::<Collection, _>("affectsFreeBusy", VersionRange::Any, |c, input| {
            c.affects_free_busy = input.bool();
            Ok(())
        })
        .set::<Collection, _>("ignoreTransparency", VersionRange::Any, |c, input| {
            c.ignore_transparency = input.bool();
            Ok(())
        })
        .set::<Collection, _>("unremoveable", VersionRange::Any, |c, input| {
            c.unremoveable = input.bool();
            Ok(())
        })
        .set::<Collection, _>("color", VersionRange::Any, |c, input| {
            c.color = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("filterExpr", VersionRange::Any, |c, input| {
            c.filter_expr = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("refreshRate", VersionRange::Any, |c, input| {
            c.refresh_rate = input.opt_int()?;
            Ok(())
        })
        .set::<Collection, _>("lastRefresh", VersionRange::Any, |c, input| {
            c.last_refresh = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("lastEtag", VersionRange::Any, |c, input| {
            c.last_etag = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("remoteId", VersionRange::Any, |c, input| {
            c.remote_id = input.opt_string();
            Ok(())
        })
        .set::<Collection, _>("created", VersionRange::Any, |c, input| {
            c.created = input.opt_string();
            Ok(())
        })
        .ignore_all(&["categories", "properties", "byteSize"])
        .build()
}

fn set_lastmod(ctx: &mut RestoreContext<'_>, lastmod: CollectionLastmod) -> RestoreResult<()> {
    ctx.stack.top_mut::<Collection>()?.lastmod = Some(lastmod);
    Ok(())
}

fn lastmod_table() -> RestoreResult<Rc<FieldTable>> {
    FieldTable::new("col-lastmod")
        .set::<CollectionLastmod, _>("timestamp", VersionRange::Any, |lm, input| {
            lm.timestamp = input.opt_string();
            Ok(())
        })
        .set::<CollectionLastmod, _>("sequence", VersionRange::Any, |lm, input| {
            lm.sequence = input.opt_int()?.unwrap_or_default();
            Ok(())
        })
        .build()
}

impl Committable for CalSuite {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if self.name.is_empty() {
            return Err(RestoreError::MissingValue("cal-suite name".to_owned()));
        }
        if self.group_href.is_none() {
            return Err(RestoreError::MissingValue("cal-suite group".to_owned()));
        }
        check_owner(ctx, &mut self.owned)?;

        ctx.sink.restore_cal_suite(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

/// ## Summary
/// Resolves the administering group of a cal-suite. Groups are dumped after
/// cal-suites, so a group not yet restored keeps its derived href.
fn cal_suite_group(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let account = input.string()?;
    let href = match ctx.sink.get_admin_group(&account)? {
        Some(group) => group.principal_ref,
        None => {
            tracing::debug!(%account, "Cal-suite group not restored yet");
            ctx.options.roots.href_for(PrincipalKind::AdminGroup, &account)
        }
    };
    ctx.stack.top_mut::<CalSuite>()?.group_href = Some(href);
    Ok(())
}

fn cal_suite_root(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let path = input.string()?;
    if !ctx.tables.calendars.contains(&path) && ctx.sink.get_calendar(&path)?.is_none() {
        return Err(RestoreError::missing("root collection", path));
    }
    ctx.stack.top_mut::<CalSuite>()?.root_collection_path = Some(path);
    Ok(())
}

fn cal_suite_table() -> RestoreResult<Rc<FieldTable>> {
    owned(FieldTable::new("cal-suite"))
        .set::<CalSuite, _>("name", VersionRange::Any, |s, input| {
            s.name = input.string()?;
            Ok(())
        })
        .set::<CalSuite, _>("created", VersionRange::Any, |s, input| {
            s.created = input.timestamp()?;
            Ok(())
        })
        .set::<CalSuite, _>("submissionsRootPath", VersionRange::Any, |s, input| {
            s.submissions_root_path = input.opt_string();
            Ok(())
        })
        .field("account", VersionRange::Any, cal_suite_group)
        .field("path", VersionRange::Any, cal_suite_root)
        .ignore_all(&["group", "rootCalendar", "creator", "access"])
        .build()
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    let table = collection_table()?;
    for section in ["caldata/collections/collection", "caldata/calendars/calendar"] {
        rules.add(section, EntityRule::<Collection>::new())?;
        rules.add(&format!("{section}/?"), FieldRule::new(Rc::clone(&table)))?;
    }

    rules.add(
        "caldata/collections/collection/col-lastmod",
        ChildRule::new(set_lastmod),
    )?;
    rules.add(
        "caldata/collections/collection/col-lastmod/?",
        FieldRule::new(lastmod_table()?),
    )?;

    rules.add(
        "*/collection/categories/category",
        UidRefRule {
            target: RefTarget::Category,
        },
    )?;
    rules.add("*/collection/categories/category/uid", UidFieldRule)?;

    let suites = cal_suite_table()?;
    rules.add("caldata/cal-suites/cal-suite", EntityRule::<CalSuite>::new())?;
    for pattern in [
        "caldata/cal-suites/cal-suite/?",
        "caldata/cal-suites/cal-suite/group/adminGroup/account",
        "caldata/cal-suites/cal-suite/rootCalendar/collection/path",
    ] {
        rules.add(pattern, FieldRule::new(Rc::clone(&suites)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::EntityKind;

    #[test_log::test]
    fn collection_tree_is_restored() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}{HOMES}<collections><collection><name>news</name>\
                 <path>/user/alice/news</path><colPath>/user/alice</colPath><calType>8</calType>\
                 <aliasUri>http://example.com/news.ics</aliasUri><refreshRate>3600</refreshRate>\
                 <owner><user><account>alice</account></user></owner>\
                 <col-lastmod><timestamp>20080101T000000Z</timestamp><sequence>3</sequence></col-lastmod>\
                 </collection></collections>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        assert_eq!(report.processed(EntityKind::Collection), 4);
        assert!(sink.collection("/user").is_some());

        let news = sink.collection("/user/alice/news").unwrap();
        assert_eq!(news.refresh_rate, Some(3600));
        assert_eq!(news.lastmod.as_ref().map(|lm| lm.sequence), Some(3));
        assert_eq!(report.external_subscriptions, vec!["/user/alice/news".to_owned()]);
    }

    #[test_log::test]
    fn missing_parent_excludes_collection() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<collections><collection><name>orphan</name><path>/nowhere/orphan</path>\
                 <colPath>/nowhere</colPath><owner><user><account>alice</account></user></owner>\
                 </collection></collections>"
            ),
        ));

        assert_eq!(report.errored(EntityKind::Collection), 1);
        assert!(sink.collection("/nowhere/orphan").is_none());
        assert_eq!(report.messages_containing("Missing parent collection").count(), 1);
    }

    #[test_log::test]
    fn legacy_calendars_section() {
        let (report, sink) = run(&dump(
            3,
            4,
            &format!(
                "{USERS}<calendars><calendar><name>public</name><path>/public</path>\
                 <calendarCollection>false</calendarCollection><public>true</public></calendar>\
                 <calendar><name>events</name><path>/public/events</path>\
                 <calendar-path>/public</calendar-path><calendarCollection>true</calendarCollection>\
                 <public>true</public></calendar></calendars>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        let events = sink.collection("/public/events").unwrap();
        assert_eq!(events.cal_type, 1);
        assert_eq!(
            events.owned.owner_href.as_deref(),
            Some("/principals/users/public-user")
        );
    }

    #[test_log::test]
    fn cal_suite_resolves_group_and_root() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}{HOMES}<cal-suites><cal-suite><name>MainCampus</name>\
                 <owner><user><account>admin</account></user></owner>\
                 <group><adminGroup><account>campus</account></adminGroup></group>\
                 <rootCalendar><collection><path>/user</path></collection></rootCalendar>\
                 </cal-suite></cal-suites>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        let suite = sink.cal_suites().next().unwrap();
        assert_eq!(
            suite.group_href.as_deref(),
            Some("/principals/groups/bwadmin/campus")
        );
        assert_eq!(suite.root_collection_path.as_deref(), Some("/user"));
    }
}
