//! Transient value holders and references shared by every entity kind.

use std::rc::Rc;

use calrestore_core::version::VersionRange;
use calrestore_model::{
    AuthUser, Collection, EventEntry, LocalizedString, OwnerUidKey, Preferences, Property,
};

use super::ChildRule;
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, Rule, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::{FieldRule, FieldTable};
use crate::stack::{
    DateTimeParts, EntityFrame, LongStrHolder, OwnerUidRef, PathRef, RefTarget, StackItem,
    StrHolder, UidRef, ValueFrame,
};

/// `bwstring` and `bwlongstring` wrappers.
struct StrRule {
    long: bool,
}

impl Rule for StrRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        if self.long {
            ctx.stack.push(LongStrHolder::default());
        } else {
            ctx.stack.push(StrHolder::default());
        }
        Ok(())
    }
}

/// `lang` and `value` of a string holder. Other children are wrappers.
struct StrFieldRule;

impl Rule for StrFieldRule {
    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        if el.name != "lang" && el.name != "value" {
            return Ok(());
        }

        let target = if ctx.stack.top_is::<StrHolder>() {
            &mut ctx.stack.top_mut::<StrHolder>()?.0
        } else {
            &mut ctx.stack.top_mut::<LongStrHolder>()?.0
        };

        let text = el.opt_text().map(str::to_owned);
        if el.name == "lang" {
            target.lang = text;
        } else {
            target.value = text;
        }
        Ok(())
    }
}

/// ## Summary
/// Element holding one localized string. Dumps before 3.5 carry `lang` and
/// `value` directly, later ones wrap them in `bwstring`, which pushes its own
/// holder.
pub(super) struct LocalizedRule {
    long: bool,
    apply: fn(&mut RestoreContext<'_>, LocalizedString) -> RestoreResult<()>,
}

impl LocalizedRule {
    pub(super) fn new(
        apply: fn(&mut RestoreContext<'_>, LocalizedString) -> RestoreResult<()>,
    ) -> Self {
        Self { long: false, apply }
    }

    pub(super) fn long(
        apply: fn(&mut RestoreContext<'_>, LocalizedString) -> RestoreResult<()>,
    ) -> Self {
        Self { long: true, apply }
    }
}

impl Rule for LocalizedRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        if ctx.is_before(3, 5) {
            StrRule { long: self.long }.begin(ctx, el)?;
        }
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        let value = match ctx.stack.pop_transient_holder() {
            Some(ValueFrame::Str(s)) => s.0,
            Some(ValueFrame::LongStr(s)) => s.0,
            Some(ValueFrame::DateTime(dt)) => {
                ctx.stack.push(dt);
                return Err(RestoreError::StackMismatch {
                    expected: StrHolder::KIND,
                    found: DateTimeParts::KIND,
                });
            }
            // An empty element leaves nothing behind.
            Some(_) | None => return Ok(()),
        };
        (self.apply)(ctx, value)
    }
}

/// ## Summary
/// Registers a [`LocalizedRule`] at `pattern` plus the field rule for its
/// children.
pub(super) fn add_localized(
    rules: &mut RuleSet,
    pattern: &str,
    rule: LocalizedRule,
) -> RestoreResult<()> {
    rules.add(pattern, rule)?;
    rules.add(&format!("{pattern}/?"), StrFieldRule)
}

struct DateTimeRule;

impl Rule for DateTimeRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(DateTimeParts::default());
        Ok(())
    }
}

fn date_time_table() -> RestoreResult<Rc<FieldTable>> {
    FieldTable::new("date-time")
        .keep_holders()
        .set::<DateTimeParts, _>("dateType", VersionRange::Any, |dt, input| {
            dt.date_type = input.bool();
            Ok(())
        })
        .set::<DateTimeParts, _>("tzid", VersionRange::Any, |dt, input| {
            dt.tzid = input.opt_string();
            Ok(())
        })
        .set::<DateTimeParts, _>("dtval", VersionRange::Any, |dt, input| {
            dt.dtval = Some(input.string()?);
            Ok(())
        })
        .set::<DateTimeParts, _>("date", VersionRange::Any, |dt, input| {
            dt.date = input.opt_string();
            Ok(())
        })
        .build()
}

fn add_property(ctx: &mut RestoreContext<'_>, property: Property) -> RestoreResult<()> {
    if let Some(collection) = ctx.stack.find_mut::<Collection>() {
        collection.properties.push(property);
        return Ok(());
    }
    if let Some(prefs) = ctx.stack.find_mut::<Preferences>() {
        prefs.properties.push(property);
        return Ok(());
    }
    Err(RestoreError::invalid(
        "property",
        &property.name,
        "no collection or preferences in progress",
    ))
}

fn property_table() -> RestoreResult<Rc<FieldTable>> {
    FieldTable::new("property")
        .set::<Property, _>("name", VersionRange::Any, |p, input| {
            p.name = input.string()?;
            Ok(())
        })
        .set::<Property, _>("value", VersionRange::Any, |p, input| {
            p.value = input.text.to_owned();
            Ok(())
        })
        .ignore("byteSize")
        .build()
}

/// Path of the collection containing an entity.
struct ContainerPathRule;

impl Rule for ContainerPathRule {
    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        let Some(path) = el.opt_text() else {
            return Ok(());
        };
        ctx.stack
            .current_owned_mut()
            .ok_or_else(|| RestoreError::invalid("container", path, "no owned entity in progress"))?
            .col_path = Some(path.to_owned());
        Ok(())
    }
}

/// ## Summary
/// Attaches a resolved vocabulary uid to the entity that referenced it.
///
/// ## Errors
/// Returns `StackMismatch` if the entity in progress takes no such reference.
pub(super) fn attach_vocab(
    ctx: &mut RestoreContext<'_>,
    target: RefTarget,
    uid: String,
) -> RestoreResult<()> {
    match (ctx.stack.current_entity_mut(), target) {
        (Some(EntityFrame::Collection(collection)), RefTarget::Category) => {
            collection.categories.push(uid);
        }
        (Some(EntityFrame::Event(entry)), target) => attach_to_event(entry, target, uid),
        (Some(EntityFrame::AuthUser(auth)), RefTarget::Category) => {
            auth.prefs.category.preferred.push(uid);
        }
        (Some(EntityFrame::AuthUser(auth)), RefTarget::Location) => {
            auth.prefs.location.preferred.push(uid);
        }
        (Some(EntityFrame::AuthUser(auth)), RefTarget::Contact) => {
            auth.prefs.contact.preferred.push(uid);
        }
        (other, target) => {
            return Err(RestoreError::StackMismatch {
                expected: target.as_str(),
                found: other.map_or("empty stack", |e| e.kind().label()),
            });
        }
    }
    Ok(())
}

fn attach_to_event(entry: &mut EventEntry, target: RefTarget, uid: String) {
    let event = entry.event_mut();
    match target {
        RefTarget::Category => {
            if !event.categories.contains(&uid) {
                event.categories.push(uid);
            }
        }
        RefTarget::Location => event.location = Some(uid),
        RefTarget::Contact => {
            if !event.contacts.contains(&uid) {
                event.contacts.push(uid);
            }
        }
    }
}

/// ## Summary
/// Checks a bare vocabulary uid against what has been restored. A missing
/// category or location is an error, a missing contact a warning.
fn verify_uid(ctx: &mut RestoreContext<'_>, target: RefTarget, uid: &str) -> RestoreResult<bool> {
    let found = match target {
        RefTarget::Category => ctx.sink.get_category_by_uid(uid)?.is_some(),
        RefTarget::Location => ctx.sink.get_location_by_uid(uid)?.is_some(),
        RefTarget::Contact => ctx.sink.get_contact_by_uid(uid)?.is_some(),
    };
    if !found {
        let text = format!("Missing {} {uid}", target.as_str());
        if target == RefTarget::Contact {
            ctx.warn(text);
        } else {
            ctx.reference_error(text);
        }
    }
    Ok(found)
}

/// Reference to a vocabulary entity by uid.
pub(super) struct UidRefRule {
    pub(super) target: RefTarget,
}

impl Rule for UidRefRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(UidRef {
            target: self.target,
            uid: None,
        });
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        let reference = ctx.stack.pop::<UidRef>()?;
        let uid = reference
            .uid
            .ok_or_else(|| RestoreError::MissingValue(format!("{} uid", self.target.as_str())))?;
        if verify_uid(ctx, self.target, &uid)? {
            attach_vocab(ctx, self.target, uid)?;
        }
        Ok(())
    }
}

/// `uid` child of a uid or owner-uid reference.
pub(super) struct UidFieldRule;

impl Rule for UidFieldRule {
    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        if el.name != "uid" {
            return Ok(());
        }
        let uid = el.opt_text().map(str::to_owned);
        if ctx.stack.top_is::<OwnerUidRef>() {
            ctx.stack.top_mut::<OwnerUidRef>()?.uid = uid;
        } else {
            ctx.stack.top_mut::<UidRef>()?.uid = uid;
        }
        Ok(())
    }
}

/// Location and contact keys of dumps before 3.5: owner plus uid.
struct OwnerUidRefRule {
    target: RefTarget,
}

impl Rule for OwnerUidRefRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(OwnerUidRef {
            target: self.target,
            owner_href: None,
            uid: None,
        });
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        let reference = ctx.stack.pop::<OwnerUidRef>()?;
        let (Some(owner), Some(uid)) = (reference.owner_href, reference.uid) else {
            return Err(RestoreError::MissingValue(format!("{} owner or uid", el.name)));
        };

        let key = OwnerUidKey::new(owner, uid);
        let resolved = match self.target {
            RefTarget::Location => ctx.location_uid_by_key(&key)?,
            RefTarget::Contact => ctx.contact_uid_by_key(&key)?,
            RefTarget::Category => ctx.sink.get_category(&key)?.and_then(|c| c.uid),
        };
        match resolved {
            Some(uid) => attach_vocab(ctx, self.target, uid),
            None => Ok(()),
        }
    }
}

/// Reference to a collection by path.
pub(super) struct PathRefRule;

impl Rule for PathRefRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(PathRef::default());
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        let path = ctx
            .stack
            .pop::<PathRef>()?
            .path
            .ok_or_else(|| RestoreError::MissingValue("collection path".to_owned()))?;
        attach_collection_path(ctx, path)
    }
}

/// ## Summary
/// Adds a preferred collection to the auth user in progress, provided the
/// collection has been restored.
///
/// ## Errors
/// Returns `StackMismatch` outside an auth user.
pub(super) fn attach_collection_path(
    ctx: &mut RestoreContext<'_>,
    path: String,
) -> RestoreResult<()> {
    let known = ctx.tables.calendars.contains(&path) || ctx.sink.get_calendar(&path)?.is_some();
    if !known {
        ctx.reference_error(format!("Missing collection {path}"));
        return Ok(());
    }

    let auth = ctx
        .stack
        .find_mut::<AuthUser>()
        .ok_or(RestoreError::StackMismatch {
            expected: "auth user",
            found: "collection path",
        })?;
    auth.prefs.collection.preferred.push(path);
    Ok(())
}

pub(super) struct PathFieldRule;

impl Rule for PathFieldRule {
    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        if el.name == "path" {
            ctx.stack.top_mut::<PathRef>()?.path = el.opt_text().map(str::to_owned);
        }
        Ok(())
    }
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add("!*/bwstring", StrRule { long: false })?;
    rules.add("!*/bwstring/?", StrFieldRule)?;
    rules.add("!*/bwlongstring", StrRule { long: true })?;
    rules.add("!*/bwlongstring/?", StrFieldRule)?;

    rules.add("!*/date-time", DateTimeRule)?;
    rules.add("!*/date-time/?", FieldRule::new(date_time_table()?))?;

    rules.add("!*/properties/property", ChildRule::new(add_property))?;
    rules.add("!*/properties/property/?", FieldRule::new(property_table()?))?;

    rules.add("!*/container/collection/path", ContainerPathRule)?;

    rules.add("!*/contact-key", OwnerUidRefRule { target: RefTarget::Contact })?;
    rules.add("!*/contact-key/uid", UidFieldRule)?;
    rules.add("!*/location-key", OwnerUidRefRule { target: RefTarget::Location })?;
    rules.add("!*/location-key/uid", UidFieldRule)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    #[test_log::test]
    fn collection_properties_and_categories() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}{HOMES}<categories><category><uid>cat-1</uid>\
                 <owner><user><account>alice</account></user></owner>\
                 <word><bwstring><lang>en</lang><value>Sport</value></bwstring></word>\
                 </category></categories>\
                 <collections><collection><name>work</name><path>/user/alice/work</path>\
                 <colPath>/user/alice</colPath><calType>1</calType>\
                 <owner><user><account>alice</account></user></owner>\
                 <categories><category><uid>cat-1</uid></category></categories>\
                 <properties><property><name>color</name><value>red</value></property></properties>\
                 </collection></collections>"
            ),
        ));

        assert_eq!(report.errors, 0, "{:?}", report.messages);
        let work = sink.collection("/user/alice/work").unwrap();
        assert_eq!(work.categories, vec!["cat-1".to_owned()]);
        assert_eq!(work.properties.len(), 1);
        assert_eq!(work.properties[0].value, "red");

        let category = sink.categories().next().unwrap();
        let word = category.word.as_ref().unwrap();
        assert_eq!(word.lang.as_deref(), Some("en"));
        assert_eq!(word.value.as_deref(), Some("Sport"));
    }

    #[test_log::test]
    fn missing_category_reference_is_dropped_with_error() {
        let (report, sink) = run(&dump(
            3,
            10,
            &format!(
                "{USERS}{HOMES}<collections><collection><name>work</name>\
                 <path>/user/alice/work</path><colPath>/user/alice</colPath><calType>1</calType>\
                 <owner><user><account>alice</account></user></owner>\
                 <categories><category><uid>nope</uid></category></categories>\
                 </collection></collections>"
            ),
        ));

        assert_eq!(report.errors, 1);
        let work = sink.collection("/user/alice/work").unwrap();
        assert!(work.categories.is_empty());
    }
}
