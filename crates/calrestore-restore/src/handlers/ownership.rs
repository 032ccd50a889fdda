//! Owner, group owner, creator and member references.
//!
//! These rules are universal: they fire under any entity, alongside whatever
//! field rule claims the same element.

use calrestore_core::principal::{PrincipalKey, PrincipalKind};
use calrestore_model::AdminGroup;

use crate::context::RestoreContext;
use crate::engine::{ElementEvent, Rule, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::stack::{OwnerUidRef, PrincipalRefHolder, PrincipalRole, Subscription};
use crate::tables::PendingMember;

/// Element that wraps a principal reference.
struct PrincipalRefRule {
    role: PrincipalRole,
}

impl Rule for PrincipalRefRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(PrincipalRefHolder::new(self.role));
        ctx.in_owner_key = true;
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.in_owner_key = false;
        let mut holder = ctx.stack.pop::<PrincipalRefHolder>()?;

        // Bare user id body of the oldest dumps.
        if holder.account.is_none()
            && let Some(text) = el.opt_text()
        {
            holder.legacy_id = Some(
                text.parse()
                    .map_err(|e| RestoreError::invalid(el.name, text, e))?,
            );
        }

        let key = match holder.legacy_id {
            Some(id) => ctx
                .user_by_legacy_id(id)
                .map(|user| user.key())
                .ok_or_else(|| RestoreError::missing("user", id)),
            None => {
                let account = holder
                    .account
                    .ok_or_else(|| RestoreError::MissingValue(format!("{} account", el.name)))?;
                let kind = match holder.kind.unwrap_or(PrincipalKind::User) {
                    PrincipalKind::User => PrincipalKind::User,
                    PrincipalKind::Group | PrincipalKind::AdminGroup => PrincipalKind::AdminGroup,
                };
                Ok(ctx.principal_key(kind, &account))
            }
        };

        match self.role {
            PrincipalRole::Owner => set_owner(ctx, key?),
            PrincipalRole::Creator => set_creator(ctx, key),
            PrincipalRole::GroupOwner => set_group_owner(ctx, key?),
            PrincipalRole::Member => add_member(ctx, key?),
        }
    }
}

fn set_owner(ctx: &mut RestoreContext<'_>, key: PrincipalKey) -> RestoreResult<()> {
    if !ctx.resolve_principal(&key)? {
        return Err(RestoreError::missing("owner", &key.href));
    }

    if let Ok(reference) = ctx.stack.top_mut::<OwnerUidRef>() {
        reference.owner_href = Some(key.href);
        return Ok(());
    }
    if let Ok(Subscription(sub)) = ctx.stack.top_mut::<Subscription>() {
        sub.owned.owner_href = Some(key.href);
        return Ok(());
    }

    let href = key.href.clone();
    ctx.stack
        .current_owned_mut()
        .ok_or_else(|| RestoreError::invalid("owner", &href, "no owned entity in progress"))?
        .owner_href = Some(key.href);
    Ok(())
}

fn set_creator(ctx: &mut RestoreContext<'_>, key: RestoreResult<PrincipalKey>) -> RestoreResult<()> {
    let resolved = match key {
        Ok(key) if ctx.resolve_principal(&key)? => Some(key.href),
        Ok(key) => {
            ctx.warn(format!("Missing creator {key}, using owner"));
            None
        }
        Err(err) if !err.is_fatal() => {
            ctx.warn(format!("{err}, creator set to owner"));
            None
        }
        Err(err) => return Err(err),
    };

    let Some(owned) = ctx.stack.current_owned_mut() else {
        return Err(RestoreError::invalid(
            "creator",
            resolved.as_deref().unwrap_or(""),
            "no owned entity in progress",
        ));
    };
    owned.creator_href = resolved.or_else(|| owned.owner_href.clone());
    Ok(())
}

fn set_group_owner(ctx: &mut RestoreContext<'_>, key: PrincipalKey) -> RestoreResult<()> {
    if !ctx.resolve_principal(&key)? {
        return Err(RestoreError::missing("group owner", &key.href));
    }

    let href = key.href.clone();
    ctx.stack
        .find_mut::<AdminGroup>()
        .ok_or_else(|| RestoreError::invalid("groupOwner", &href, "not inside an admin group"))?
        .group_owner_href = Some(key.href);
    Ok(())
}

/// Members are attached once the whole dump has been read.
fn add_member(ctx: &mut RestoreContext<'_>, key: PrincipalKey) -> RestoreResult<()> {
    let account = ctx
        .stack
        .find::<AdminGroup>()
        .map(|group| group.account.clone())
        .filter(|account| !account.is_empty())
        .ok_or_else(|| RestoreError::MissingValue("admin group account".to_owned()))?;

    tracing::trace!(group = %account, member = %key, "Deferring admin group member");
    ctx.tables.add_pending_member(&account, PendingMember::Key(key));
    Ok(())
}

/// Children of a principal reference element.
struct PrincipalFieldRule;

impl Rule for PrincipalFieldRule {
    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        let holder = ctx.stack.top_mut::<PrincipalRefHolder>()?;
        match el.name {
            "user" => holder.kind = Some(PrincipalKind::User),
            "group" => holder.kind = Some(PrincipalKind::Group),
            "adminGroup" => holder.kind = Some(PrincipalKind::AdminGroup),
            "account" => holder.account = el.opt_text().map(str::to_owned),
            "kind" => holder.kind = Some(PrincipalKind::from_legacy_code(el.text)?),
            other => {
                return Err(RestoreError::UnknownTag {
                    entity: "principal reference",
                    tag: other.to_owned(),
                });
            }
        }
        Ok(())
    }
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    let refs = [
        ("owner", PrincipalRole::Owner),
        ("groupOwner", PrincipalRole::GroupOwner),
        ("creator", PrincipalRole::Creator),
        ("groupMembers/member", PrincipalRole::Member),
    ];
    for (element, role) in refs {
        rules.add(&format!("!*/{element}"), PrincipalRefRule { role })?;
        rules.add(&format!("!*/{element}/*"), PrincipalFieldRule)?;
    }

    // Key forms of dumps before 3.5.
    let keys = [
        ("owner-key", PrincipalRole::Owner),
        ("groupOwner-key", PrincipalRole::GroupOwner),
        ("creator-key", PrincipalRole::Creator),
        ("member-key", PrincipalRole::Member),
    ];
    for (element, role) in keys {
        rules.add(&format!("!*/{element}"), PrincipalRefRule { role })?;
        rules.add(&format!("!*/{element}/?"), PrincipalFieldRule)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::EntityKind;

    #[test_log::test]
    fn unknown_owner_excludes_entity() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<categories><category><uid>c1</uid>\
                 <owner><user><account>nobody</account></user></owner>\
                 <word><bwstring><value>Music</value></bwstring></word>\
                 </category></categories>"
            ),
        ));

        assert_eq!(report.errored(EntityKind::Category), 1);
        assert_eq!(sink.categories().count(), 0);
        assert_eq!(
            report
                .messages_containing("Missing owner /principals/users/nobody")
                .count(),
            1
        );
    }

    #[test_log::test]
    fn unknown_creator_falls_back_to_owner() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<categories><category><uid>c1</uid>\
                 <owner><user><account>alice</account></user></owner>\
                 <creator><user><account>ghost</account></user></creator>\
                 </category></categories>"
            ),
        ));

        assert_eq!(report.errors, 0);
        assert_eq!(report.warnings, 1);
        let category = sink.categories().next().unwrap();
        assert_eq!(
            category.owned.creator_href.as_deref(),
            Some("/principals/users/alice")
        );
    }

    #[test_log::test]
    fn legacy_numeric_owner_maps_through_user_ids() {
        let (report, sink) = run(&dump(
            3,
            0,
            &format!(
                "{USERS}<categories><category><id>4</id><uid>c1</uid><owner>0</owner>\
                 </category></categories>"
            ),
        ));

        assert_eq!(report.errors, 0);
        let category = sink.categories().next().unwrap();
        assert_eq!(
            category.owned.owner_href.as_deref(),
            Some("/principals/users/admin")
        );
    }

    #[test_log::test]
    fn owner_key_kind_codes() {
        let (report, sink) = run(&dump(
            3,
            4,
            &format!(
                "{USERS}<categories><category><id>4</id><uid>c1</uid>\
                 <owner-key><account>alice</account><kind>1</kind></owner-key>\
                 </category></categories>"
            ),
        ));

        assert_eq!(report.errors, 0);
        assert_eq!(
            sink.categories().next().unwrap().owned.owner_href.as_deref(),
            Some("/principals/users/alice")
        );
    }
}
