//! Users section.

use std::rc::Rc;

use calrestore_core::principal::PrincipalKind;
use calrestore_core::version::VersionRange;
use calrestore_model::User;

use super::{Committable, EntityRule};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::tagged;
use crate::fields::{FieldInput, FieldRule, FieldTable};

impl Committable for User {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    #[tracing::instrument(skip_all, fields(account = %self.account))]
    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if self.account.is_empty() {
            return Err(RestoreError::MissingValue("user account".to_owned()));
        }
        if self.principal_ref.is_empty() {
            self.principal_ref = ctx.options.roots.href_for(PrincipalKind::User, &self.account);
        }

        ctx.tables.users.register(&self)?;
        ctx.register_principal(self.key(), &self.account)?;

        if ctx.syspars.public_user() == Some(self.account.as_str()) {
            tracing::debug!(href = %self.principal_ref, "Found public user");
            ctx.public_user_href = Some(self.principal_ref.clone());
        }

        ctx.sink.restore_user(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

fn access(input: &FieldInput<'_>) -> Option<String> {
    input.opt_string()
}

fn user_table() -> RestoreResult<Rc<FieldTable>> {
    tagged(FieldTable::new("user"))
        .set::<User, _>("id", VersionRange::Any, |u, input| {
            u.id = input.opt_int()?;
            Ok(())
        })
        .set::<User, _>("account", VersionRange::Any, |u, input| {
            u.account = input.string()?;
            Ok(())
        })
        .set::<User, _>("principalRef", VersionRange::Any, |u, input| {
            u.principal_ref = input.text.to_owned();
            Ok(())
        })
        .set::<User, _>("created", VersionRange::Any, |u, input| {
            u.created = input.timestamp()?;
            Ok(())
        })
        .set::<User, _>("logon", VersionRange::Any, |u, input| {
            u.logon = input.timestamp()?;
            Ok(())
        })
        .set::<User, _>("lastAccess", VersionRange::Any, |u, input| {
            u.last_access = input.timestamp()?;
            Ok(())
        })
        .set::<User, _>("lastModify", VersionRange::Any, |u, input| {
            u.last_modify = input.timestamp()?;
            Ok(())
        })
        .set::<User, _>("categoryAccess", VersionRange::Any, |u, input| {
            u.category_access = access(input);
            Ok(())
        })
        .set::<User, _>("locationAccess", VersionRange::Any, |u, input| {
            u.location_access = access(input);
            Ok(())
        })
        .set::<User, _>("contactAccess", VersionRange::Any, |u, input| {
            u.contact_access = access(input);
            Ok(())
        })
        .set::<User, _>("category-access", VersionRange::Before(3, 5), |u, input| {
            u.category_access = access(input);
            Ok(())
        })
        .set::<User, _>("location-access", VersionRange::Before(3, 5), |u, input| {
            u.location_access = access(input);
            Ok(())
        })
        .set::<User, _>("contact-access", VersionRange::Before(3, 5), |u, input| {
            u.contact_access = access(input);
            Ok(())
        })
        .set::<User, _>("sponsor-access", VersionRange::Before(3, 3), |u, input| {
            u.contact_access = access(input);
            Ok(())
        })
        .set::<User, _>("quota", VersionRange::Any, |u, input| {
            u.quota = input.opt_int()?;
            Ok(())
        })
        .ignore_in("instanceOwner", VersionRange::Before(3, 5))
        .build()
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add("caldata/users/user", EntityRule::<User>::new())?;
    rules.add("caldata/users/user/*", FieldRule::new(user_table()?))
}
