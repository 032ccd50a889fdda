//! Admin groups. Members are only recorded here and attached once the whole
//! dump has been read.

use std::rc::Rc;

use calrestore_core::principal::PrincipalKind;
use calrestore_core::version::VersionRange;
use calrestore_model::AdminGroup;

use super::{Committable, EntityRule, check_owner};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::owned;
use crate::fields::{FieldInput, FieldRule, FieldTable};
use crate::tables::PendingMember;

impl Committable for AdminGroup {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    #[tracing::instrument(skip_all, fields(account = %self.account))]
    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if self.account.is_empty() {
            return Err(RestoreError::MissingValue("admin group account".to_owned()));
        }
        if self.principal_ref.is_empty() {
            self.principal_ref = ctx
                .options
                .roots
                .href_for(PrincipalKind::AdminGroup, &self.account);
        }
        check_owner(ctx, &mut self.owned)?;

        ctx.register_principal(self.key(), &self.account)?;
        ctx.sink.restore_admin_group(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

/// Member given as a bare user id by dumps before 3.3.
fn legacy_member(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let id = input.int()?;
    let account = ctx.stack.top_mut::<AdminGroup>()?.account.clone();
    if account.is_empty() {
        return Err(RestoreError::MissingValue("admin group account".to_owned()));
    }
    ctx.tables
        .add_pending_member(&account, PendingMember::LegacyUserId(id));
    Ok(())
}

fn group_table() -> RestoreResult<Rc<FieldTable>> {
    owned(FieldTable::new("admin group"))
        .set::<AdminGroup, _>("id", VersionRange::Any, |g, input| {
            g.id = input.opt_int()?;
            Ok(())
        })
        .set::<AdminGroup, _>("account", VersionRange::Any, |g, input| {
            g.account = input.string()?;
            Ok(())
        })
        .set::<AdminGroup, _>("principalRef", VersionRange::Any, |g, input| {
            g.principal_ref = input.text.to_owned();
            Ok(())
        })
        .set::<AdminGroup, _>("description", VersionRange::Any, |g, input| {
            g.description = input.opt_string();
            Ok(())
        })
        .set::<AdminGroup, _>("groupOwnerHref", VersionRange::Any, |g, input| {
            g.group_owner_href = input.opt_string();
            Ok(())
        })
        .field("groupMemberId", VersionRange::Before(3, 3), legacy_member)
        .field("groupMemberGroupId", VersionRange::Before(3, 3), |ctx, input| {
            ctx.warn(format!("Group member group {} not restored", input.text));
            Ok(())
        })
        .ignore_all(&[
            "groupOwner",
            "groupOwner-key",
            "groupMembers",
            "member",
            "member-key",
            "created",
            "logon",
            "lastAccess",
            "lastModify",
            "categoryAccess",
            "locationAccess",
            "contactAccess",
            "quota",
        ])
        .build()
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    let table = group_table()?;
    rules.add("caldata/adminGroups/adminGroup", EntityRule::<AdminGroup>::new())?;
    rules.add(
        "caldata/adminGroups/adminGroup/?",
        FieldRule::new(Rc::clone(&table)),
    )?;
    rules.add(
        "caldata/adminGroups/adminGroup/groupMembers/?",
        FieldRule::new(table),
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use calrestore_core::principal::{PrincipalKey, PrincipalKind};

    use crate::EntityKind;

    #[test_log::test]
    fn members_attach_after_the_pass() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<adminGroups><adminGroup><account>campus</account>\
                 <description>Campus events</description>\
                 <owner><user><account>admin</account></user></owner>\
                 <groupOwner><user><account>admin</account></user></groupOwner>\
                 <groupMembers><member><user><account>alice</account></user></member>\
                 <member><adminGroup><account>campus-sub</account></adminGroup></member>\
                 </groupMembers></adminGroup>\
                 <adminGroup><account>campus-sub</account>\
                 <owner><user><account>admin</account></user></owner></adminGroup>\
                 </adminGroups>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        assert_eq!(report.processed(EntityKind::AdminGroup), 2);

        let group = sink.admin_group("campus").unwrap();
        assert_eq!(
            group.group_owner_href.as_deref(),
            Some("/principals/users/admin")
        );
        assert_eq!(
            group.members,
            vec![
                PrincipalKey::new(PrincipalKind::User, "/principals/users/alice"),
                PrincipalKey::new(
                    PrincipalKind::AdminGroup,
                    "/principals/groups/bwadmin/campus-sub"
                ),
            ]
        );
    }

    #[test_log::test]
    fn legacy_member_ids_resolve_against_later_users() {
        let (report, sink) = run(&dump(
            3,
            2,
            &format!(
                "{USERS}<adminGroups><adminGroup><account>campus</account><owner>1</owner>\
                 <groupMemberId>9</groupMemberId></adminGroup></adminGroups>\
                 <users><user><id>9</id><account>carol</account></user></users>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        let group = sink.admin_group("campus").unwrap();
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].href, "/principals/users/carol");
    }

    #[test_log::test]
    fn unknown_member_is_reported() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<adminGroups><adminGroup><account>campus</account>\
                 <owner><user><account>admin</account></user></owner>\
                 <groupMembers><member><user><account>ghost</account></user></member>\
                 </groupMembers></adminGroup></adminGroups>"
            ),
        ));

        assert_eq!(report.errors, 1);
        assert!(sink.admin_group("campus").unwrap().members.is_empty());
        assert_eq!(report.messages_containing("Missing member").count(), 1);
    }
}
