//! User preferences, their views, and the subscriptions of dumps before 3.5.

use std::rc::Rc;

use calrestore_core::principal::{PrincipalKey, PrincipalKind};
use calrestore_core::version::VersionRange;
use calrestore_model::{Preferences, View};

use super::{ChildRule, Committable, EntityRule, check_owner};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, Rule, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::owned;
use crate::fields::{FieldInput, FieldRule, FieldTable};
use crate::stack::Subscription;
use crate::subscriptions::{SubscriptionOutcome, migrate_subscription};

const SECTION: &str = "caldata/user-preferences";

impl Committable for Preferences {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        check_owner(ctx, &mut self.owned)?;
        ctx.sink.restore_user_prefs(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

fn prefs_owner(ctx: &RestoreContext<'_>) -> RestoreResult<String> {
    ctx.stack
        .find::<Preferences>()
        .and_then(|p| p.owned.owner_href.clone())
        .ok_or_else(|| RestoreError::MissingValue("preferences owner".to_owned()))
}

fn add_view(ctx: &mut RestoreContext<'_>, view: View) -> RestoreResult<()> {
    ctx.stack
        .find_mut::<Preferences>()
        .ok_or(RestoreError::StackMismatch {
            expected: "preferences",
            found: "view",
        })?
        .views
        .push(view);
    Ok(())
}

/// ## Summary
/// Collection a legacy view entry names. Subscription names are mapped
/// through the migrated subscriptions. The default view falls back to the
/// owner's home.
fn legacy_view_entry(
    ctx: &mut RestoreContext<'_>,
    input: &mut FieldInput<'_>,
) -> RestoreResult<()> {
    let owner_href = prefs_owner(ctx)?;
    let owner = PrincipalKey::new(PrincipalKind::User, owner_href.clone());
    let value = input.string()?;
    let view_name = ctx.stack.top_mut::<View>()?.name.clone();

    let mut path = if input.name == "view-sub-name" {
        let found = ctx.subscriptions.get_sub(&owner, &value).map(str::to_owned);
        if found.is_none() && ctx.subscriptions.get_sub_dropped(&owner, &value).is_none() {
            ctx.error(format!("Unknown subscription {value} for view {view_name}"));
        }
        found
    } else {
        Some(value)
    };

    if path.is_none() && ctx.syspars.default_user_view_name.as_deref() == Some(view_name.as_str())
    {
        path = Some(ctx.user_home(&owner_href)?);
    }

    if let Some(path) = path {
        let view = ctx.stack.top_mut::<View>()?;
        if !view.collection_paths.contains(&path) {
            view.collection_paths.push(path);
        }
    }
    Ok(())
}

fn view_table() -> RestoreResult<Rc<FieldTable>> {
    let pre35 = VersionRange::Before(3, 5);
    let current = VersionRange::From(3, 5);

    FieldTable::new("view")
        .set::<View, _>("name", current, |v, input| {
            v.name = input.string()?;
            Ok(())
        })
        .set::<View, _>("path", current, |v, input| {
            v.collection_paths.push(input.string()?);
            Ok(())
        })
        .ignore_in("id", current)
        .ignore_in("seq", current)
        .ignore_in("collectionPaths", current)
        .ignore("byteSize")
        .set::<View, _>("view-name", pre35, |v, input| {
            v.name = input.string()?;
            Ok(())
        })
        .field("view-sub-name", pre35, legacy_view_entry)
        .field("view-sub-path", pre35, legacy_view_entry)
        .ignore_in("view-owner", VersionRange::Before(3, 3))
        .ignore_in("view-id", pre35)
        .ignore_in("view-seq", pre35)
        .ignore_in("view-subscriptions", pre35)
        .ignore_in("view-collections", pre35)
        .build()
}

/// Subscription of dumps before 3.5, migrated when it closes.
struct SubscriptionRule;

impl Rule for SubscriptionRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(Subscription::default());
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        let Subscription(sub) = ctx.stack.pop::<Subscription>()?;
        let name = sub.name.clone();
        let owner = prefs_owner(ctx)?;

        // A failed subscription is skipped, the preferences are still restored.
        match migrate_subscription(ctx, &owner, sub) {
            Ok(SubscriptionOutcome::Alias { name, path, .. }) => {
                tracing::debug!(%name, %path, "Created subscription alias");
            }
            Ok(outcome) => tracing::trace!(?outcome, "Subscription migrated"),
            Err(err) if !err.is_fatal() => {
                ctx.error(format!("Skipped subscription {name}: {err}"));
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

fn subscription_table() -> RestoreResult<Rc<FieldTable>> {
    let pre35 = VersionRange::Before(3, 5);

    FieldTable::new("subscription")
        .field("sub-owner", VersionRange::Before(3, 3), |ctx, input| {
            let id = input.int()?;
            match ctx.user_by_legacy_id(id) {
                Some(user) => {
                    ctx.stack.top_mut::<Subscription>()?.0.owned.owner_href =
                        Some(user.principal_ref);
                }
                // Without an owner the subscription is rejected when it closes.
                None => ctx.error(format!("Missing user {id} for subscription owner")),
            }
            Ok(())
        })
        .set::<Subscription, _>("sub-name", pre35, |s, input| {
            s.0.name = input.string()?;
            Ok(())
        })
        .set::<Subscription, _>("sub-uri", pre35, |s, input| {
            s.0.alias_uri = input.opt_string();
            Ok(())
        })
        .set::<Subscription, _>("sub-affectsFreeBusy", pre35, |s, input| {
            s.0.affects_free_busy = input.bool();
            Ok(())
        })
        .set::<Subscription, _>("sub-ignoreTransparency", pre35, |s, input| {
            s.0.ignore_transparency = input.bool();
            Ok(())
        })
        .set::<Subscription, _>("sub-display", pre35, |s, input| {
            s.0.display = input.bool();
            Ok(())
        })
        .set::<Subscription, _>("sub-style", pre35, |s, input| {
            s.0.color = input.opt_string();
            Ok(())
        })
        .set::<Subscription, _>("sub-unremoveable", pre35, |s, input| {
            s.0.unremoveable = input.bool();
            Ok(())
        })
        .ignore_all(&[
            "owner",
            "owner-key",
            "sub-id",
            "sub-seq",
            "view-seq",
            "sub-calendarDeleted",
            "sub-internalSubscription",
            "sub-emailNotifications",
        ])
        .build()
}

fn prefs_table() -> RestoreResult<Rc<FieldTable>> {
    owned(FieldTable::new("preferences"))
        .set::<Preferences, _>("email", VersionRange::Any, |p, input| {
            p.email = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("defaultCalendarPath", VersionRange::Any, |p, input| {
            p.default_calendar_path = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("default-calendar-path", VersionRange::Before(3, 5), |p, input| {
            p.default_calendar_path = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("skinName", VersionRange::Any, |p, input| {
            p.skin_name = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("skinStyle", VersionRange::Any, |p, input| {
            p.skin_style = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("preferredView", VersionRange::Any, |p, input| {
            p.preferred_view = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("preferredViewPeriod", VersionRange::Any, |p, input| {
            p.preferred_view_period = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("workDays", VersionRange::Any, |p, input| {
            p.work_days = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("workdayStart", VersionRange::Any, |p, input| {
            p.workday_start = input.opt_int()?;
            Ok(())
        })
        .set::<Preferences, _>("workdayEnd", VersionRange::Any, |p, input| {
            p.workday_end = input.opt_int()?;
            Ok(())
        })
        .set::<Preferences, _>("preferredEndType", VersionRange::Any, |p, input| {
            p.preferred_end_type = input.opt_string();
            Ok(())
        })
        .set::<Preferences, _>("userMode", VersionRange::Any, |p, input| {
            p.user_mode = input.opt_int()?;
            Ok(())
        })
        .set::<Preferences, _>("pageSize", VersionRange::Any, |p, input| {
            p.page_size = input.opt_int()?;
            Ok(())
        })
        .set::<Preferences, _>("hour24", VersionRange::Any, |p, input| {
            p.hour24 = input.bool();
            Ok(())
        })
        .set::<Preferences, _>("scheduleAutoRespond", VersionRange::Any, |p, input| {
            p.schedule_auto_respond = input.bool();
            Ok(())
        })
        .set::<Preferences, _>("scheduleAutoCancelAction", VersionRange::Any, |p, input| {
            p.schedule_auto_cancel_action = input.opt_int()?;
            Ok(())
        })
        .set::<Preferences, _>("scheduleDoubleBook", VersionRange::Any, |p, input| {
            p.schedule_double_book = input.bool();
            Ok(())
        })
        .set::<Preferences, _>(
            "scheduleAutoProcessResponses",
            VersionRange::Any,
            |p, input| {
                p.schedule_auto_process_responses = input.opt_int()?;
                Ok(())
            },
        )
        .ignore_all(&["byteSize", "properties", "views"])
        .ignore_in("subscriptions", VersionRange::Before(3, 5))
        .build()
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    let prefs = prefs_table()?;
    let views = view_table()?;

    for element in ["preferences", "user-prefs"] {
        let base = format!("{SECTION}/{element}");
        rules.add(&base, EntityRule::<Preferences>::new())?;
        rules.add(&format!("{base}/?"), FieldRule::new(Rc::clone(&prefs)))?;
        rules.add(&format!("{base}/views/view"), ChildRule::new(add_view))?;
        rules.add(&format!("{base}/views/view/?"), FieldRule::new(Rc::clone(&views)))?;
    }
    rules.add(
        &format!("{SECTION}/preferences/views/view/collectionPaths/?"),
        FieldRule::new(Rc::clone(&views)),
    )?;
    rules.add(
        &format!("{SECTION}/user-prefs/views/view/view-subscriptions/?"),
        FieldRule::new(views),
    )?;

    let subscription = format!("{SECTION}/user-prefs/subscriptions/subscription");
    rules.add(&subscription, SubscriptionRule)?;
    rules.add(
        &format!("{subscription}/?"),
        FieldRule::new(subscription_table()?),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::EntityKind;

    #[test_log::test]
    fn views_collect_paths() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}{HOMES}<user-preferences><preferences>\
                 <owner><user><account>alice</account></user></owner>\
                 <email>alice@example.org</email><workdayStart>480</workdayStart>\
                 <hour24>true</hour24><preferredView>work</preferredView>\
                 <views><view><name>work</name><collectionPaths>\
                 <path>/user/alice/calendar</path><path>/public/events</path>\
                 </collectionPaths></view></views>\
                 <properties><property><name>ui</name><value>dark</value></property></properties>\
                 </preferences></user-preferences>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        assert_eq!(report.processed(EntityKind::Preferences), 1);

        let prefs = sink.preferences("/principals/users/alice").unwrap();
        assert_eq!(prefs.email.as_deref(), Some("alice@example.org"));
        assert_eq!(prefs.workday_start, Some(480));
        assert!(prefs.hour24);
        assert_eq!(prefs.properties.len(), 1);
        assert_eq!(
            prefs.view("work").unwrap().collection_paths,
            vec!["/user/alice/calendar".to_owned(), "/public/events".to_owned()]
        );
    }

    #[test_log::test]
    fn legacy_subscriptions_feed_views() {
        let owner_key = "<owner-key><account>alice</account><kind>1</kind></owner-key>";
        let (report, sink) = run(&dump(
            3,
            4,
            &format!(
                "{USERS}{HOMES}<user-preferences><user-prefs>{owner_key}\
                 <subscriptions>\
                 <subscription>{owner_key}<sub-name>mine</sub-name>\
                 <sub-uri>bwcal:///user/alice</sub-uri><sub-display>true</sub-display></subscription>\
                 <subscription>{owner_key}<sub-name>Team Calendar</sub-name>\
                 <sub-uri>bwcal:///public/team</sub-uri><sub-style>red</sub-style></subscription>\
                 </subscriptions>\
                 <views><view><view-name>All</view-name><view-subscriptions>\
                 <view-sub-name>nothing</view-sub-name>\
                 </view-subscriptions></view>\
                 <view><view-name>Team</view-name><view-subscriptions>\
                 <view-sub-name>Team Calendar</view-sub-name>\
                 </view-subscriptions></view></views>\
                 </user-prefs></user-preferences>"
            ),
        ));

        // The unknown subscription name is reported once.
        assert_eq!(report.errors, 1, "{:?}", report.messages);
        assert_eq!(report.subscription_fixes.len(), 2);

        let alias = sink.collection("/user/alice/Team Calendar").unwrap();
        assert_eq!(alias.alias_uri.as_deref(), Some("bwcal:///public/team"));
        assert_eq!(alias.color.as_deref(), Some("red"));

        let prefs = sink.preferences("/principals/users/alice").unwrap();
        assert_eq!(
            prefs.view("All").unwrap().collection_paths,
            vec!["/user/alice".to_owned()]
        );
        assert_eq!(
            prefs.view("Team").unwrap().collection_paths,
            vec!["/user/alice/Team Calendar".to_owned()]
        );
    }

    #[test_log::test]
    fn subscription_fields_are_unknown_from_3_5() {
        let mut sink = crate::MemorySink::new();
        let failure = run_with(
            &dump(
                3,
                5,
                &format!(
                    "{USERS}<user-preferences><preferences>\
                     <owner><user><account>alice</account></user></owner>\
                     <subscriptions/></preferences></user-preferences>"
                ),
            ),
            &mut sink,
            crate::RestoreOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            failure.error,
            crate::RestoreError::UnknownTag { entity: "preferences", .. }
        ));
    }
}
