//! System parameters section.

use std::rc::Rc;

use calrestore_core::version::VersionRange;
use calrestore_model::SystemParameters;

use super::{Committable, EntityRule};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, RuleSet};
use crate::error::RestoreResult;
use crate::fields::{FieldRule, FieldTable};

impl Committable for SystemParameters {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        let changed = self.merge_defaults(&ctx.default_syspars);
        if !changed.is_empty() {
            tracing::info!(fields = ?changed, "Defaulted system parameters");
        }

        ctx.sink.restore_syspars(&self)?;
        ctx.sink.end_transaction()?;
        ctx.syspars = self;
        Ok(())
    }
}

macro_rules! string_fields {
    ($table:expr, $($name:literal => $field:ident),+ $(,)?) => {
        $table$(
            .set::<SystemParameters, _>($name, VersionRange::Any, |s, input| {
                s.$field = input.opt_string();
                Ok(())
            })
        )+
    };
}

macro_rules! int_fields {
    ($table:expr, $($name:literal => $field:ident),+ $(,)?) => {
        $table$(
            .set::<SystemParameters, _>($name, VersionRange::Any, |s, input| {
                s.$field = input.opt_int()?.unwrap_or_default();
                Ok(())
            })
        )+
    };
}

fn syspars_table() -> RestoreResult<Rc<FieldTable>> {
    let table = string_fields!(
        FieldTable::new("syspars"),
        "name" => name,
        "tzid" => tzid,
        "systemid" => system_id,
        "publicCalendarRoot" => public_calendar_root,
        "userCalendarRoot" => user_calendar_root,
        "userDefaultCalendar" => user_default_calendar,
        "defaultTrashCalendar" => default_trash_calendar,
        "userInbox" => user_inbox,
        "userOutbox" => user_outbox,
        "deletedCalendar" => deleted_calendar,
        "busyCalendar" => busy_calendar,
        "defaultUserViewName" => default_user_view_name,
        "publicUser" => public_user,
        "userauthClass" => userauth_class,
        "mailerClass" => mailer_class,
        "admingroupsClass" => admingroups_class,
        "usergroupsClass" => usergroups_class,
        "indexRoot" => index_root,
        "rootUsers" => root_users,
    );

    let table = int_fields!(
        table,
        "httpConnectionsPerUser" => http_connections_per_user,
        "httpConnectionsPerHost" => http_connections_per_host,
        "httpConnections" => http_connections,
        "maxPublicDescriptionLength" => max_public_description_length,
        "maxUserDescriptionLength" => max_user_description_length,
        "maxUserEntitySize" => max_user_entity_size,
        "defaultUserQuota" => default_user_quota,
        "maxInstances" => max_instances,
        "maxYears" => max_years,
    );

    table
        .set::<SystemParameters, _>("directoryBrowsingDisallowed", VersionRange::Any, |s, input| {
            s.directory_browsing_disallowed = input.bool();
            Ok(())
        })
        .ignore_all(&["id", "seq"])
        .build()
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add("caldata/syspars/system", EntityRule::<SystemParameters>::new())?;
    rules.add("caldata/syspars/system/*", FieldRule::new(syspars_table()?))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::EntityKind;

    #[test_log::test]
    fn missing_fields_take_defaults() {
        let (report, sink) = run(&dump(
            3,
            10,
            "<syspars><system><name>cal</name><tzid>Europe/London</tzid>\
             <maxYears>5</maxYears><rootUsers>admin</rootUsers>\
             <userauthClass>org.bedework.calcore.hibernate.UserAuthUWDbImpl</userauthClass>\
             </system></syspars>",
        ));

        assert_eq!(report.processed(EntityKind::Syspars), 1);
        let syspars = sink.syspars().unwrap();
        assert_eq!(syspars.tzid.as_deref(), Some("Europe/London"));
        assert_eq!(syspars.max_years, 5);
        assert_eq!(syspars.max_instances, 1000);
        assert_eq!(syspars.user_calendar_root.as_deref(), Some("user"));
        assert_eq!(
            syspars.userauth_class.as_deref(),
            Some("org.bedework.calsvc.userauth.UserAuthDefault")
        );
        assert_eq!(syspars.root_users.as_deref(), Some("admin"));
    }

    #[test_log::test]
    fn unknown_field_is_fatal() {
        let mut sink = crate::MemorySink::new();
        let failure = run_with(
            &dump(3, 10, "<syspars><system><color>red</color></system></syspars>"),
            &mut sink,
            crate::RestoreOptions::default(),
        )
        .unwrap_err();
        assert!(failure.error.to_string().contains("Unknown tag color for syspars"));
    }
}
