//! Auth users and their preference blocks.
//!
//! The four preference blocks share field names such as `autoAdd`, so the
//! block being read is tracked in [`PrefsFlags`] as its wrapper opens and
//! closes.

use std::rc::Rc;

use calrestore_core::constants::LEGACY_SUPERUSER_TYPE;
use calrestore_core::principal::account_of;
use calrestore_core::version::VersionRange;
use calrestore_model::{AuthUser, AutoAddPrefs};

use super::values::{
    PathFieldRule, PathRefRule, UidFieldRule, UidRefRule, attach_collection_path, attach_vocab,
};
use super::{Committable, EntityRule};
use crate::context::{PrefsFlags, RestoreContext};
use crate::engine::{ElementEvent, Rule, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::tagged;
use crate::fields::{FieldInput, FieldRule, FieldTable};
use crate::stack::RefTarget;

const AUTH_USER: &str = "caldata/authusers/authuser";

impl Committable for AuthUser {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if self.user_href.is_none() {
            return Err(RestoreError::MissingValue("auth user href".to_owned()));
        }

        ctx.sink.restore_auth_user(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Block {
    Category,
    Collection,
    Contact,
    Location,
}

impl Block {
    fn flag(self, flags: &mut PrefsFlags) -> &mut bool {
        match self {
            Self::Category => &mut flags.category,
            Self::Collection => &mut flags.collection,
            Self::Contact => &mut flags.contact,
            Self::Location => &mut flags.location,
        }
    }

    fn prefs(self, auth: &mut AuthUser) -> &mut AutoAddPrefs {
        match self {
            Self::Category => &mut auth.prefs.category,
            Self::Collection => &mut auth.prefs.collection,
            Self::Contact => &mut auth.prefs.contact,
            Self::Location => &mut auth.prefs.location,
        }
    }
}

/// Wrapper of one preference block.
struct PrefsBlockRule {
    block: Block,
}

impl Rule for PrefsBlockRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        *self.block.flag(&mut ctx.prefs) = true;
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        *self.block.flag(&mut ctx.prefs) = false;
        Ok(())
    }
}

fn auto_add(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let flags = ctx.prefs;
    let block = if flags.category {
        Block::Category
    } else if flags.collection {
        Block::Collection
    } else if flags.contact {
        Block::Contact
    } else if flags.location {
        Block::Location
    } else {
        ctx.error("Not in any prefs for autoAdd");
        return Ok(());
    };
    set_auto_add(ctx, block, input)
}

fn set_auto_add(
    ctx: &mut RestoreContext<'_>,
    block: Block,
    input: &FieldInput<'_>,
) -> RestoreResult<()> {
    block.prefs(ctx.stack.top_mut::<AuthUser>()?).auto_add = input.bool();
    Ok(())
}

fn user_type(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let mut usertype = input.int()?;

    if usertype & LEGACY_SUPERUSER_TYPE != 0 {
        if ctx.is_before(3, 5) {
            let href = ctx
                .stack
                .top_mut::<AuthUser>()?
                .user_href
                .clone()
                .ok_or_else(|| RestoreError::MissingValue("auth user href".to_owned()))?;
            let account = account_of(&href);
            if ctx.syspars.add_root_user(account) {
                tracing::info!(account, "Added root user from auth user type");
                ctx.root_users_changed = true;
            }
        }
        usertype -= LEGACY_SUPERUSER_TYPE;
    }

    ctx.stack.top_mut::<AuthUser>()?.usertype = usertype;
    Ok(())
}

fn user_by_account(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let account = input.string()?;
    let href = match ctx.tables.users.get_by_account(&account) {
        Some(user) => Some(user.principal_ref.clone()),
        None => ctx.sink.get_user(&account)?.map(|user| user.principal_ref),
    };
    let href = href.ok_or_else(|| RestoreError::missing("user", &account))?;
    ctx.stack.top_mut::<AuthUser>()?.user_href = Some(href);
    Ok(())
}

fn user_by_id(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let id = input.int()?;
    let user = ctx
        .user_by_legacy_id(id)
        .ok_or_else(|| RestoreError::missing("user", id))?;
    ctx.stack.top_mut::<AuthUser>()?.user_href = Some(user.principal_ref);
    Ok(())
}

fn preferred_category(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    if let Some(uid) = ctx.category_uid_by_legacy_id(input.int()?)? {
        attach_vocab(ctx, RefTarget::Category, uid)?;
    }
    Ok(())
}

fn preferred_location(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    if let Some(uid) = ctx.location_uid_by_legacy_id(input.int()?)? {
        attach_vocab(ctx, RefTarget::Location, uid)?;
    }
    Ok(())
}

fn preferred_contact(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    if let Some(uid) = ctx.contact_uid_by_legacy_id(input.int()?)? {
        attach_vocab(ctx, RefTarget::Contact, uid)?;
    }
    Ok(())
}

fn auth_user_table() -> RestoreResult<Rc<FieldTable>> {
    let pre35 = VersionRange::Before(3, 5);

    tagged(FieldTable::new("auth user"))
        .field("id", pre35, user_by_id)
        .set::<AuthUser, _>("userHref", VersionRange::Any, |auth, input| {
            auth.user_href = Some(input.string()?);
            Ok(())
        })
        .field("account", VersionRange::Any, user_by_account)
        .field("userType", pre35, user_type)
        .field("usertype", VersionRange::Any, user_type)
        .field("autoAdd", VersionRange::Any, auto_add)
        // Dumps before 3.5 kept flat preference fields.
        .field("autoAddCategories", pre35, |ctx, input| {
            set_auto_add(ctx, Block::Category, input)
        })
        .field("autoAddLocations", pre35, |ctx, input| {
            set_auto_add(ctx, Block::Location, input)
        })
        .field("autoAddContacts", pre35, |ctx, input| {
            set_auto_add(ctx, Block::Contact, input)
        })
        .field("autoAddSponsors", VersionRange::Before(3, 3), |ctx, input| {
            set_auto_add(ctx, Block::Contact, input)
        })
        .field("autoAddCalendars", pre35, |ctx, input| {
            set_auto_add(ctx, Block::Collection, input)
        })
        .field("preferredCategory", pre35, preferred_category)
        .field("preferredLocation", pre35, preferred_location)
        .field("preferredContact", pre35, preferred_contact)
        .field("preferredSponsor", VersionRange::Before(3, 3), preferred_contact)
        .field("preferredCalendar", pre35, |ctx, input| {
            attach_collection_path(ctx, input.string()?)
        })
        .ignore_all(&["user", "prefs", "preferred", "byteSize"])
        .ignore_in("preferences", pre35)
        .ignore_in("preferredCategories", pre35)
        .ignore_in("preferredCalendars", pre35)
        .ignore_in("preferredContacts", pre35)
        .ignore_in("preferredLocations", pre35)
        .ignore_in("preferredSponsors", VersionRange::Before(3, 3))
        .build()
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    let table = auth_user_table()?;
    let fields = |rules: &mut RuleSet, pattern: &str| {
        rules.add(
            &format!("{AUTH_USER}/{pattern}"),
            FieldRule::new(Rc::clone(&table)),
        )
    };

    rules.add(AUTH_USER, EntityRule::<AuthUser>::new())?;
    fields(rules, "?")?;
    fields(rules, "user/user/account")?;
    fields(rules, "prefs/?")?;

    let blocks = [
        ("categoryPrefs", Block::Category),
        ("calendarPrefs", Block::Collection),
        ("contactPrefs", Block::Contact),
        ("locationPrefs", Block::Location),
    ];
    for (element, block) in blocks {
        rules.add(&format!("{AUTH_USER}/prefs/{element}"), PrefsBlockRule { block })?;
        fields(rules, &format!("prefs/{element}/?"))?;
    }

    let uid_refs = [
        ("categoryPrefs/preferred/category", RefTarget::Category),
        ("contactPrefs/preferred/contact", RefTarget::Contact),
        ("locationPrefs/preferred/location", RefTarget::Location),
    ];
    for (element, target) in uid_refs {
        rules.add(&format!("{AUTH_USER}/prefs/{element}"), UidRefRule { target })?;
        rules.add(&format!("{AUTH_USER}/prefs/{element}/?"), UidFieldRule)?;
    }
    rules.add(
        &format!("{AUTH_USER}/prefs/calendarPrefs/preferred/collection"),
        PathRefRule,
    )?;
    rules.add(
        &format!("{AUTH_USER}/prefs/calendarPrefs/preferred/collection/?"),
        PathFieldRule,
    )?;

    for legacy in [
        "preferences/?",
        "preferences/preferredCategories/?",
        "preferences/preferredCalendars/?",
        "preferences/preferredContacts/?",
        "preferences/preferredLocations/?",
        "preferences/preferredSponsors/?",
    ] {
        fields(rules, legacy)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::EntityKind;

    const VOCAB: &str = "<categories><category><uid>cat-1</uid>\
        <owner><user><account>admin</account></user></owner></category></categories>\
        <locations><location><uid>loc-1</uid>\
        <owner><user><account>admin</account></user></owner></location></locations>";

    #[test_log::test]
    fn preference_blocks_route_auto_add() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}{HOMES}{VOCAB}<authusers><authuser>\
                 <userHref>/principals/users/admin</userHref><usertype>3</usertype>\
                 <prefs>\
                 <categoryPrefs><autoAdd>true</autoAdd>\
                 <preferred><category><uid>cat-1</uid></category></preferred></categoryPrefs>\
                 <calendarPrefs><autoAdd>false</autoAdd>\
                 <preferred><collection><path>/user/alice/calendar</path></collection></preferred>\
                 </calendarPrefs>\
                 <locationPrefs><autoAdd>true</autoAdd>\
                 <preferred><location><uid>loc-1</uid></location></preferred></locationPrefs>\
                 </prefs></authuser></authusers>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        assert_eq!(report.processed(EntityKind::AuthUser), 1);

        let auth = &sink.auth_users()[0];
        assert_eq!(auth.usertype, 3);
        assert!(auth.prefs.category.auto_add);
        assert!(!auth.prefs.collection.auto_add);
        assert!(auth.prefs.location.auto_add);
        assert!(!auth.prefs.contact.auto_add);
        assert_eq!(auth.prefs.category.preferred, vec!["cat-1".to_owned()]);
        assert_eq!(
            auth.prefs.collection.preferred,
            vec!["/user/alice/calendar".to_owned()]
        );
        assert_eq!(auth.prefs.location.preferred, vec!["loc-1".to_owned()]);
    }

    #[test_log::test]
    fn legacy_superuser_becomes_root_user() {
        let (report, sink) = run(&dump(
            3,
            4,
            &format!(
                "{USERS}<categories><category><id>5</id><uid>cat-5</uid><owner>1</owner>\
                 </category></categories>\
                 <authusers><authuser><id>2</id><userType>32769</userType>\
                 <preferences><autoAddCategories>true</autoAddCategories>\
                 <preferredCategories><preferredCategory>5</preferredCategory>\
                 </preferredCategories></preferences></authuser></authusers>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        let auth = &sink.auth_users()[0];
        assert_eq!(auth.user_href.as_deref(), Some("/principals/users/alice"));
        assert_eq!(auth.usertype, 1);
        assert!(auth.prefs.category.auto_add);
        assert_eq!(auth.prefs.category.preferred, vec!["cat-5".to_owned()]);

        assert_eq!(sink.syspars_updates(), 1);
        assert_eq!(
            sink.syspars().and_then(|s| s.root_users.as_deref()),
            Some("alice")
        );
    }

    #[test_log::test]
    fn unknown_user_excludes_auth_user() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}<authusers><authuser><account>ghost</account>\
                 <usertype>1</usertype></authuser></authusers>"
            ),
        ));

        assert_eq!(report.errored(EntityKind::AuthUser), 1);
        assert!(sink.auth_users().is_empty());
    }
}
