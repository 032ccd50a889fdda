//! Locations, contacts (and the sponsors they replaced) and categories.

use std::rc::Rc;

use calrestore_core::version::VersionRange;
use calrestore_model::{Category, Contact, LocalizedString, Location, OwnedFields, OwnerUidKey};

use super::values::{LocalizedRule, add_localized};
use super::{Committable, EntityRule, check_owner};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, RuleSet};
use crate::error::RestoreResult;
use crate::fields::common::shareable;
use crate::fields::{FieldInput, FieldRule, FieldTable};

/// Localized value of a field: the `bwstring` child, or bare text in
/// dumps that stored it flat.
fn localized(input: &mut FieldInput<'_>) -> Option<LocalizedString> {
    input
        .take_str()
        .or_else(|| input.opt_string().map(|v| LocalizedString::new(None, v)))
}

/// ## Summary
/// Owner check and uid for a vocabulary record before it is written. Records
/// from dumps that predate uids are given a fresh one.
fn prepare(
    ctx: &mut RestoreContext<'_>,
    owned: &mut OwnedFields,
    uid: &mut Option<String>,
    what: &str,
) -> RestoreResult<(String, OwnerUidKey)> {
    check_owner(ctx, owned)?;

    if uid.is_none() {
        let minted = uuid::Uuid::new_v4().to_string();
        ctx.warn(format!("No uid for {what}, assigned {minted}"));
        *uid = Some(minted);
    }
    let uid = uid.clone().unwrap_or_default();

    // check_owner leaves an owner in place
    let owner = owned.owner_href.clone().unwrap_or_default();
    Ok((uid.clone(), OwnerUidKey::new(owner, uid)))
}

impl Committable for Location {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        let (uid, key) = prepare(ctx, &mut self.owned, &mut self.uid, "location")?;
        if let Some(id) = self.id {
            ctx.tables.locations.insert(id, uid.clone())?;
        }
        ctx.tables.location_uids.insert(key, uid)?;

        ctx.sink.restore_location(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

impl Committable for Contact {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        let (uid, key) = prepare(ctx, &mut self.owned, &mut self.uid, "contact")?;
        if let Some(id) = self.id {
            ctx.tables.contacts.insert(id, uid.clone())?;
        }
        ctx.tables.contact_uids.insert(key, uid)?;

        ctx.sink.restore_contact(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

impl Committable for Category {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        let (_, key) = prepare(ctx, &mut self.owned, &mut self.uid, "category")?;
        if let Some(id) = self.id {
            ctx.tables.categories.insert(id, key)?;
        }

        ctx.sink.restore_category(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

fn location_table() -> RestoreResult<Rc<FieldTable>> {
    shareable(FieldTable::new("location"))
        .set::<Location, _>("id", VersionRange::Before(3, 5), |l, input| {
            l.id = input.opt_int()?;
            Ok(())
        })
        .set::<Location, _>("uid", VersionRange::Any, |l, input| {
            l.uid = input.opt_string();
            Ok(())
        })
        .set::<Location, _>("address", VersionRange::Any, |l, input| {
            l.address = localized(input);
            Ok(())
        })
        .set::<Location, _>("subaddress", VersionRange::Any, |l, input| {
            l.subaddress = localized(input);
            Ok(())
        })
        .set::<Location, _>("link", VersionRange::Any, |l, input| {
            l.link = input.opt_string();
            Ok(())
        })
        .ignore_in("id", VersionRange::From(3, 5))
        .ignore("byteSize")
        .build()
}

fn contact_table() -> RestoreResult<Rc<FieldTable>> {
    shareable(FieldTable::new("contact"))
        .set::<Contact, _>("id", VersionRange::Before(3, 5), |c, input| {
            c.id = input.opt_int()?;
            Ok(())
        })
        .set::<Contact, _>("uid", VersionRange::Any, |c, input| {
            c.uid = input.opt_string();
            Ok(())
        })
        .set::<Contact, _>("name", VersionRange::Any, |c, input| {
            c.name = localized(input);
            Ok(())
        })
        .set::<Contact, _>("phone", VersionRange::Any, |c, input| {
            c.phone = input.opt_string();
            Ok(())
        })
        .set::<Contact, _>("email", VersionRange::Any, |c, input| {
            c.email = input.opt_string();
            Ok(())
        })
        .set::<Contact, _>("link", VersionRange::Any, |c, input| {
            c.link = input.opt_string();
            Ok(())
        })
        .ignore_in("id", VersionRange::From(3, 5))
        .ignore("byteSize")
        .build()
}

fn category_table() -> RestoreResult<Rc<FieldTable>> {
    shareable(FieldTable::new("category"))
        .set::<Category, _>("id", VersionRange::Before(3, 5), |c, input| {
            c.id = input.opt_int()?;
            Ok(())
        })
        .set::<Category, _>("uid", VersionRange::Any, |c, input| {
            c.uid = input.opt_string();
            Ok(())
        })
        .set::<Category, _>("word", VersionRange::Any, |c, input| {
            c.word = localized(input);
            Ok(())
        })
        .set::<Category, _>("description", VersionRange::Any, |c, input| {
            c.description = localized(input);
            Ok(())
        })
        .ignore_in("id", VersionRange::From(3, 5))
        .ignore("byteSize")
        .build()
}

fn set_addr(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<Location>()?.address = Some(value);
    Ok(())
}

fn set_subaddr(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<Location>()?.subaddress = Some(value);
    Ok(())
}

fn set_contact_name(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<Contact>()?.name = Some(value);
    Ok(())
}

fn set_keyword(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<Category>()?.word = Some(value);
    Ok(())
}

fn set_desc(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<Category>()?.description = Some(value);
    Ok(())
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add("caldata/locations/location", EntityRule::<Location>::new())?;
    rules.add("caldata/locations/location/?", FieldRule::new(location_table()?))?;
    add_localized(rules, "caldata/locations/location/addr", LocalizedRule::new(set_addr))?;
    add_localized(rules, "caldata/locations/location/subaddr", LocalizedRule::new(set_subaddr))?;

    let contacts = contact_table()?;
    for section in ["caldata/contacts/contact", "caldata/sponsors/sponsor"] {
        rules.add(section, EntityRule::<Contact>::new())?;
        rules.add(&format!("{section}/?"), FieldRule::new(Rc::clone(&contacts)))?;
        add_localized(
            rules,
            &format!("{section}/value"),
            LocalizedRule::new(set_contact_name),
        )?;
    }

    rules.add("caldata/categories/category", EntityRule::<Category>::new())?;
    rules.add("caldata/categories/category/?", FieldRule::new(category_table()?))?;
    add_localized(rules, "caldata/categories/category/keyword", LocalizedRule::new(set_keyword))?;
    add_localized(rules, "caldata/categories/category/desc", LocalizedRule::new(set_desc))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::EntityKind;

    #[test_log::test]
    fn legacy_wrapped_strings_match_bwstrings() {
        let (old, old_sink) = run(&dump(
            3,
            4,
            &format!(
                "{USERS}<locations><location><id>9</id><uid>loc-9</uid>\
                 <owner-key><account>alice</account><kind>1</kind></owner-key>\
                 <addr><lang>en</lang><value>Main hall</value></addr>\
                 </location></locations>"
            ),
        ));
        let (new, new_sink) = run(&dump(
            3,
            5,
            &format!(
                "{USERS}<locations><location><uid>loc-9</uid>\
                 <owner><user><account>alice</account></user></owner>\
                 <address><bwstring><lang>en</lang><value>Main hall</value></bwstring></address>\
                 </location></locations>"
            ),
        ));

        assert_eq!(old.errors + new.errors, 0);
        let old_loc = old_sink.locations().next().unwrap();
        let new_loc = new_sink.locations().next().unwrap();
        assert_eq!(old_loc.address, new_loc.address);
        assert_eq!(old_loc.owned.owner_href, new_loc.owned.owner_href);
    }

    #[test_log::test]
    fn sponsors_restore_as_contacts() {
        let (report, sink) = run(&dump(
            3,
            2,
            &format!(
                "{USERS}<sponsors><sponsor><id>7</id><uid>sp-7</uid><owner>2</owner>\
                 <value><value>Arts Council</value></value><phone>555-0100</phone>\
                 </sponsor></sponsors>"
            ),
        ));

        assert_eq!(report.processed(EntityKind::Contact), 1);
        let contact = sink.contacts().next().unwrap();
        assert_eq!(contact.uid.as_deref(), Some("sp-7"));
        assert_eq!(
            contact.name.as_ref().and_then(|n| n.value.as_deref()),
            Some("Arts Council")
        );
        assert_eq!(contact.owned.owner_href.as_deref(), Some("/principals/users/alice"));
    }

    #[test_log::test]
    fn category_without_uid_gets_one() {
        let (report, sink) = run(&dump(
            3,
            0,
            &format!(
                "{USERS}<categories><category><id>4</id><owner>2</owner>\
                 <keyword><value>Music</value></keyword></category></categories>"
            ),
        ));

        assert_eq!(report.warnings, 1);
        let category = sink.categories().next().unwrap();
        assert!(category.uid.is_some());
        assert_eq!(
            category.word.as_ref().map(|w| w.value_str()),
            Some("Music")
        );
    }
}
