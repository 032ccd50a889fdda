//! Events, their inline overrides and standalone annotations, and every
//! property hanging off them.

use std::rc::Rc;

use calrestore_core::version::VersionRange;
use calrestore_model::event::END_TYPE_NONE;
use calrestore_model::{
    Alarm, Attachment, Attendee, DateTimeValue, EmptyFlags, Event, EventAnnotation, EventEntry,
    EventKey, EventVariant, Geo, LocalizedString, ProxiedField, RelatedTo, RequestStatus,
    Xproperty,
};

use super::values::{LocalizedRule, UidFieldRule, UidRefRule, add_localized, attach_vocab};
use super::{ChildRule, Committable, EntityRule, check_owner};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, Rule, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::{contained, date_time_value, owned, tagged};
use crate::fields::{FieldInput, FieldRule, FieldTable};
use crate::stack::{EventKeyHolder, EventKeyRole, OrganizerEntry, RefTarget};

impl Committable for EventEntry {
    fn start(_ctx: &RestoreContext<'_>, el: &ElementEvent<'_>) -> Self {
        if let [.., parent, _] = el.path
            && parent == "overrides"
        {
            return Self::annotation(true);
        }
        if el.path.get(1).is_some_and(|section| section == "event-annotations") {
            return Self::annotation(false);
        }
        Self::plain()
    }

    #[tracing::instrument(skip_all, fields(uid = self.event().uid_str()))]
    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if self.is_override() {
            return attach_override(ctx, self);
        }

        check_owner(ctx, &mut self.event_mut().owned)?;
        let col_path = self
            .event()
            .owned
            .col_path
            .clone()
            .ok_or_else(|| RestoreError::MissingValue("event collection".to_owned()))?;
        if !ctx.tables.calendars.contains(&col_path) && ctx.sink.get_calendar(&col_path)?.is_none() {
            return Err(RestoreError::missing("collection", col_path));
        }

        if let Some(ann) = self.annotation_mut() {
            resolve_annotation(ctx, ann)?;
        }
        if self.event().uid.is_none() {
            let minted = uuid::Uuid::new_v4().to_string();
            ctx.warn(format!("No uid for event, assigned {minted}"));
            self.event_mut().uid = Some(minted);
        }
        fix_end_time(ctx, self.event_mut());
        link_overrides(&mut self);

        ctx.sink.restore_event(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

/// ## Summary
/// Hands a completed override to the event it was dumped inside. Its keys
/// are filled in when the master itself is committed.
fn attach_override(ctx: &mut RestoreContext<'_>, mut entry: EventEntry) -> RestoreResult<()> {
    if entry.event().recurrence_id.is_none() {
        return Err(RestoreError::MissingValue("override recurrence id".to_owned()));
    }

    let master_owner = ctx
        .stack
        .top_mut::<EventEntry>()?
        .event()
        .owned
        .owner_href
        .clone();
    let event = entry.event_mut();
    if event.owned.owner_href.is_none() {
        event.owned.owner_href = master_owner;
    }
    check_owner(ctx, &mut event.owned)?;
    fix_end_time(ctx, event);

    let EventVariant::Annotation(ann) = entry.variant else {
        return Err(RestoreError::StackMismatch {
            expected: "event override",
            found: "event",
        });
    };
    ctx.stack.top_mut::<EventEntry>()?.overrides.push(ann);
    Ok(())
}

fn link_overrides(entry: &mut EventEntry) {
    let event = entry.event();
    let master = EventKey {
        col_path: event.owned.col_path.clone(),
        uid: event.uid.clone(),
        recurrence_id: None,
    };

    for ov in &mut entry.overrides {
        if ov.event.uid.is_none() {
            ov.event.uid.clone_from(&master.uid);
        }
        if ov.event.owned.col_path.is_none() {
            ov.event.owned.col_path.clone_from(&master.col_path);
        }
        if !ov.target.is_complete() {
            ov.target = EventKey {
                recurrence_id: ov.event.recurrence_id.clone(),
                ..master.clone()
            };
        }
        if !ov.master.is_complete() {
            ov.master = master.clone();
        }
    }
}

/// ## Summary
/// Checks that the event an annotation applies to was restored. Keys
/// without a collection take the annotation's own.
///
/// ## Errors
/// Returns `MissingValue` for an incomplete target and `MissingReference`
/// when the target or a given master is not found.
fn resolve_annotation(ctx: &mut RestoreContext<'_>, ann: &mut EventAnnotation) -> RestoreResult<()> {
    for key in [&mut ann.target, &mut ann.master] {
        if key.col_path.is_none() {
            key.col_path.clone_from(&ann.event.owned.col_path);
        }
    }

    fetch_referenced(ctx, &ann.target, "target event")?;
    if !ann.is_override && ann.master.uid.is_some() {
        fetch_referenced(ctx, &ann.master, "master event")?;
    }

    if ann.event.uid.is_none() {
        ann.event.uid.clone_from(&ann.target.uid);
    }
    Ok(())
}

fn fetch_referenced(
    ctx: &mut RestoreContext<'_>,
    key: &EventKey,
    kind: &'static str,
) -> RestoreResult<()> {
    let (Some(col_path), Some(uid)) = (key.col_path.as_deref(), key.uid.as_deref()) else {
        return Err(RestoreError::MissingValue(format!("{kind} key")));
    };
    if ctx.sink.get_event(key)?.is_none() {
        return Err(RestoreError::missing(kind, format!("{col_path}: {uid}")));
    }
    Ok(())
}

/// Old releases wrote a date end for timed events without a real end. The
/// end becomes the start with a zero duration.
fn fix_end_time(ctx: &mut RestoreContext<'_>, event: &mut Event) {
    let Some(start) = event.dtstart.as_ref() else {
        return;
    };
    if start.date_only || !event.dtend.as_ref().is_some_and(|end| end.date_only) {
        return;
    }

    event.dtend = Some(start.clone());
    event.end_type = Some(END_TYPE_NONE);
    event.duration = Some("PT0S".to_owned());
    ctx.diags.fixed_no_end_time();
    tracing::debug!(uid = event.uid_str(), "Replaced date end of timed event");
}

fn event_of<'c>(ctx: &'c mut RestoreContext<'_>) -> RestoreResult<&'c mut Event> {
    ctx.stack.top_mut::<EventEntry>().map(EventEntry::event_mut)
}

fn annotation_of<'e>(
    entry: &'e mut EventEntry,
    input: &FieldInput<'_>,
) -> RestoreResult<&'e mut EventAnnotation> {
    entry
        .annotation_mut()
        .ok_or_else(|| RestoreError::invalid(input.name, input.text, "event is not an annotation"))
}

/// Event-level decoders on a [`FieldTable`].
trait EventFields: Sized {
    fn event<F>(self, name: &'static str, range: VersionRange, decode: F) -> Self
    where
        F: Fn(&mut Event, &mut FieldInput<'_>) -> RestoreResult<()> + 'static;
}

impl EventFields for FieldTable {
    fn event<F>(self, name: &'static str, range: VersionRange, decode: F) -> Self
    where
        F: Fn(&mut Event, &mut FieldInput<'_>) -> RestoreResult<()> + 'static,
    {
        self.set::<EventEntry, _>(name, range, move |entry, input| {
            decode(entry.event_mut(), input)
        })
    }
}

/// Where a decoded date-time goes.
#[derive(Debug, Clone, Copy)]
enum DateSlot {
    Start,
    End,
    Rdate,
    Exdate,
}

impl DateSlot {
    fn store(self, event: &mut Event, value: DateTimeValue) {
        match self {
            Self::Start => event.dtstart = Some(value),
            Self::End => event.dtend = Some(value),
            Self::Rdate => event.rdates.push(value),
            Self::Exdate => event.exdates.push(value),
        }
    }
}

fn date_time(
    slot: DateSlot,
) -> impl Fn(&mut RestoreContext<'_>, &mut FieldInput<'_>) -> RestoreResult<()> {
    move |ctx, input| {
        let parts = input.take_date_time()?;
        let value = date_time_value(ctx, parts)?;
        slot.store(event_of(ctx)?, value);
        Ok(())
    }
}

/// Parts of the flat date-times of dumps before 3.5.
#[derive(Debug, Clone, Copy)]
enum LegacyPart {
    DateType,
    Tzid,
    Dtval,
    /// `dtval` with stray seconds zeroed.
    FixedDtval,
}

fn legacy_part(
    part: LegacyPart,
) -> impl Fn(&mut RestoreContext<'_>, &mut FieldInput<'_>) -> RestoreResult<()> {
    move |_ctx, input| {
        let mut parts = input.take_date_time_or_default().unwrap_or_default();
        match part {
            LegacyPart::DateType => parts.date_type = input.bool(),
            LegacyPart::Tzid => parts.tzid = input.opt_string(),
            LegacyPart::Dtval => parts.dtval = Some(input.string()?),
            LegacyPart::FixedDtval => parts.dtval = Some(input.fixed_date_time()?),
        }
        input.keep_date_time(parts);
        Ok(())
    }
}

/// The `-date` part closes a flat date-time.
fn legacy_date(
    slot: DateSlot,
) -> impl Fn(&mut RestoreContext<'_>, &mut FieldInput<'_>) -> RestoreResult<()> {
    move |ctx, input| {
        let mut parts = input.take_date_time_or_default().unwrap_or_default();
        parts.date = input.opt_string();
        let value = date_time_value(ctx, parts)?;
        slot.store(event_of(ctx)?, value);
        Ok(())
    }
}

const LEGACY_DATES: [(&str, &str, &str, &str, DateSlot, bool); 4] = [
    ("start-date-type", "start-tzid", "start-dtval", "start-date", DateSlot::Start, true),
    ("end-date-type", "end-tzid", "end-dtval", "end-date", DateSlot::End, true),
    ("rdate-date-type", "rdate-tzid", "rdate-dtval", "rdate-date", DateSlot::Rdate, false),
    ("exdate-date-type", "exdate-tzid", "exdate-dtval", "exdate-date", DateSlot::Exdate, false),
];

const LEGACY_EMPTY_FLAGS: [(&str, ProxiedField); 15] = [
    ("alarmsEmpty", ProxiedField::Alarms),
    ("attendeesEmpty", ProxiedField::Attendees),
    ("categoriesEmpty", ProxiedField::Categories),
    ("commentsEmpty", ProxiedField::Comments),
    ("contactsEmpty", ProxiedField::Contacts),
    ("descriptionsEmpty", ProxiedField::Descriptions),
    ("exdatesEmpty", ProxiedField::Exdates),
    ("exrulesEmpty", ProxiedField::Exrules),
    ("rdatesEmpty", ProxiedField::Rdates),
    ("recipientsEmpty", ProxiedField::Recipients),
    ("requestStatusesEmpty", ProxiedField::RequestStatuses),
    ("resourcesEmpty", ProxiedField::Resources),
    ("rrulesEmpty", ProxiedField::Rrules),
    ("summariesEmpty", ProxiedField::Summaries),
    ("xpropertiesEmpty", ProxiedField::Xproperties),
];

fn empty_flags(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let text = input.string()?;
    match EmptyFlags::parse(&text) {
        Some(flags) => {
            annotation_of(ctx.stack.top_mut::<EventEntry>()?, input)?.empty_flags = flags;
        }
        None => ctx.error(format!("Bad empty flags '{text}'")),
    }
    Ok(())
}

fn key_part(
    role: EventKeyRole,
    set: fn(&mut EventKey, Option<String>),
) -> impl Fn(&mut EventEntry, &mut FieldInput<'_>) -> RestoreResult<()> {
    move |entry, input| {
        let ann = annotation_of(entry, input)?;
        let key = match role {
            EventKeyRole::Target => &mut ann.target,
            // An override's master is the event it sits in.
            EventKeyRole::Master if ann.is_override => return Ok(()),
            EventKeyRole::Master => &mut ann.master,
        };
        set(key, input.opt_string());
        Ok(())
    }
}

/// Vocabulary referenced by legacy id, up to 3.5. A sponsor of dumps before
/// 3.3 is a contact.
fn legacy_vocab(
    target: RefTarget,
) -> impl Fn(&mut RestoreContext<'_>, &mut FieldInput<'_>) -> RestoreResult<()> {
    move |ctx, input| {
        let id = input.int()?;
        let uid = match target {
            RefTarget::Category => ctx.category_uid_by_legacy_id(id)?,
            RefTarget::Location => ctx.location_uid_by_legacy_id(id)?,
            RefTarget::Contact => ctx.contact_uid_by_legacy_id(id)?,
        };
        match uid {
            Some(uid) => attach_vocab(ctx, target, uid),
            None => Ok(()),
        }
    }
}

fn legacy_attendee(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
    let mut attendee = ctx.attendee_by_legacy_id(input.int()?)?;
    attendee.id = None;
    event_of(ctx)?.attendees.push(attendee);
    Ok(())
}

#[expect(clippy::too_many_lines)]
fn event_table() -> RestoreResult<Rc<FieldTable>> {
    let mut table = contained(FieldTable::new("event"))
        .event("name", VersionRange::Any, |e, input| {
            e.name = input.opt_string();
            Ok(())
        })
        .event("uid", VersionRange::Any, |e, input| {
            e.uid = input.opt_string();
            Ok(())
        })
        .event("entityType", VersionRange::Any, |e, input| {
            e.entity_type = input.int()?;
            Ok(())
        })
        .event("noStart", VersionRange::Any, |e, input| {
            e.no_start = input.bool();
            Ok(())
        })
        .field("dtstart", VersionRange::Any, date_time(DateSlot::Start))
        .field("dtend", VersionRange::Any, date_time(DateSlot::End))
        .field("rdate", VersionRange::Any, date_time(DateSlot::Rdate))
        .field("exdate", VersionRange::Any, date_time(DateSlot::Exdate))
        .event("duration", VersionRange::Any, |e, input| {
            let mut duration = input.string()?;
            // Events without an end were once dumped one second long.
            if duration == "PT1S" && e.end_type == Some(END_TYPE_NONE) {
                duration = "PT0S".to_owned();
            }
            e.duration = Some(duration);
            Ok(())
        })
        .event("endType", VersionRange::Any, |e, input| {
            e.end_type = Some(input.char()?);
            Ok(())
        })
        .event("classification", VersionRange::Any, |e, input| {
            e.classification = input.opt_string();
            Ok(())
        })
        .event("link", VersionRange::Any, |e, input| {
            e.link = input.opt_string();
            Ok(())
        })
        .event("geo-latitude", VersionRange::Any, |e, input| {
            e.geo.get_or_insert_with(Geo::default).latitude = Some(input.decimal()?);
            Ok(())
        })
        .event("geo-longitude", VersionRange::Any, |e, input| {
            e.geo.get_or_insert_with(Geo::default).longitude = Some(input.decimal()?);
            Ok(())
        })
        .event("status", VersionRange::Any, |e, input| {
            // "F" was written by 2.3.2 and means nothing.
            if let Some(status) = input.opt_string().filter(|s| s != "F") {
                e.status = Some(status);
            }
            Ok(())
        })
        .event("cost", VersionRange::Any, |e, input| {
            e.cost = input.opt_string();
            Ok(())
        })
        .event("deleted", VersionRange::Any, |e, input| {
            e.deleted = input.bool();
            Ok(())
        })
        .event("tombstoned", VersionRange::Any, |e, input| {
            e.tombstoned = input.bool();
            Ok(())
        })
        .event("dtstamp", VersionRange::Any, |e, input| {
            e.dtstamp = input.opt_string();
            Ok(())
        })
        .event("lastmod", VersionRange::Any, |e, input| {
            e.lastmod = input.opt_string();
            Ok(())
        })
        .event("created", VersionRange::Any, |e, input| {
            e.created = input.opt_string();
            Ok(())
        })
        .event("byteSize", VersionRange::Any, |e, input| {
            e.byte_size = input.opt_int()?;
            Ok(())
        })
        .event("priority", VersionRange::Any, |e, input| {
            e.priority = input.opt_int()?;
            Ok(())
        })
        .event("transparency", VersionRange::Any, |e, input| {
            e.transparency = input.opt_string();
            Ok(())
        })
        .event("percentComplete", VersionRange::Any, |e, input| {
            e.percent_complete = input.opt_int()?;
            Ok(())
        })
        .event("completed", VersionRange::Any, |e, input| {
            e.completed = input.opt_string();
            Ok(())
        })
        .event("ctoken", VersionRange::Any, |e, input| {
            e.ctoken = input.opt_string();
            Ok(())
        })
        .event("recurring", VersionRange::Any, |e, input| {
            e.recurring = input.bool();
            Ok(())
        })
        .event("rrule", VersionRange::Any, |e, input| {
            e.rrules.push(input.string()?);
            Ok(())
        })
        .event("exrule", VersionRange::Any, |e, input| {
            e.exrules.push(input.string()?);
            Ok(())
        })
        .event("recurrenceId", VersionRange::Any, |e, input| {
            e.recurrence_id = input.opt_string();
            Ok(())
        })
        .event("sequence", VersionRange::Any, |e, input| {
            e.sequence = input.opt_int()?.unwrap_or_default();
            Ok(())
        })
        .event("scheduleMethod", VersionRange::Any, |e, input| {
            e.schedule_method = input.opt_int()?;
            Ok(())
        })
        .event("originator", VersionRange::Any, |e, input| {
            e.originator = input.opt_string();
            Ok(())
        })
        .event("recipient", VersionRange::Any, |e, input| {
            e.recipients.push(input.string()?);
            Ok(())
        })
        .event("scheduleState", VersionRange::Any, |e, input| {
            e.schedule_state = input.opt_int()?;
            Ok(())
        })
        .event("organizerSchedulingObject", VersionRange::Any, |e, input| {
            e.organizer_scheduling_object = input.bool();
            Ok(())
        })
        .event("attendeeSchedulingObject", VersionRange::Any, |e, input| {
            e.attendee_scheduling_object = input.bool();
            Ok(())
        })
        .event("stag", VersionRange::Any, |e, input| {
            e.stag = input.opt_string();
            Ok(())
        })
        .event("busyType", VersionRange::Any, |e, input| {
            e.busy_type = input.opt_int()?;
            Ok(())
        })
        .field("emptyFlags", VersionRange::Any, empty_flags)
        // Before 3.3
        .event("summary", VersionRange::Before(3, 3), |e, input| {
            if let Some(value) = input.opt_string() {
                e.summaries.push(LocalizedString::new(None, value));
            }
            Ok(())
        })
        .event("description", VersionRange::Before(3, 3), |e, input| {
            if let Some(value) = input.opt_string() {
                e.descriptions.push(LocalizedString::new(None, value));
            }
            Ok(())
        })
        .event("guid", VersionRange::Before(3, 3), |e, input| {
            e.uid = input.opt_string();
            Ok(())
        })
        // Before 3.5
        .field("sponsor", VersionRange::Before(3, 5), legacy_vocab(RefTarget::Contact))
        .field("category", VersionRange::Before(3, 5), legacy_vocab(RefTarget::Category))
        .field("location", VersionRange::Before(3, 5), legacy_vocab(RefTarget::Location))
        .field("attendee", VersionRange::Before(3, 5), legacy_attendee)
        .event("end-type", VersionRange::Before(3, 5), |e, input| {
            e.end_type = Some(input.char()?);
            Ok(())
        })
        .event("last-mod", VersionRange::Before(3, 5), |e, input| {
            e.lastmod = input.opt_string();
            Ok(())
        })
        .event("create-date", VersionRange::Before(3, 5), |e, input| {
            e.created = input.opt_string();
            Ok(())
        })
        .event("nostart", VersionRange::Before(3, 5), |e, input| {
            e.no_start = input.bool();
            Ok(())
        })
        .set::<EventEntry, _>(
            "target-calendar",
            VersionRange::Before(3, 5),
            key_part(EventKeyRole::Target, |k, v| k.col_path = v),
        )
        .set::<EventEntry, _>(
            "target-recurrenceId",
            VersionRange::Before(3, 5),
            key_part(EventKeyRole::Target, |k, v| k.recurrence_id = v),
        )
        .set::<EventEntry, _>(
            "target-guid",
            VersionRange::Before(3, 5),
            key_part(EventKeyRole::Target, |k, v| k.uid = v),
        )
        .set::<EventEntry, _>(
            "master-calendar",
            VersionRange::Before(3, 5),
            key_part(EventKeyRole::Master, |k, v| k.col_path = v),
        )
        .set::<EventEntry, _>(
            "master-recurrenceId",
            VersionRange::Before(3, 5),
            key_part(EventKeyRole::Master, |k, v| k.recurrence_id = v),
        )
        .set::<EventEntry, _>(
            "master-guid",
            VersionRange::Before(3, 5),
            key_part(EventKeyRole::Master, |k, v| k.uid = v),
        )
        .ignore_all(&[
            "alarms",
            "attachments",
            "attendees",
            "categories",
            "comments",
            "contacts",
            "descriptions",
            "exdates",
            "exrules",
            "master",
            "override",
            "overrides",
            "rdates",
            "recipients",
            "request-statuses",
            "resources",
            "rrules",
            "summaries",
            "target",
            "xproperties",
            "latestDate",
            // Dumped in error by 3.6
            "significantChange",
            "contact-key",
            "location-key",
            "eventAttendees",
            "eventCategories",
            "eventComments",
            "eventRecurrence",
            "eventResources",
        ])
        .ignore_in("sponsor", VersionRange::From(3, 5))
        .ignore_in("category", VersionRange::From(3, 5))
        .ignore_in("location", VersionRange::From(3, 5))
        .ignore_in("attendee", VersionRange::From(3, 5));

    for (date_type, tzid, dtval, date, slot, fixed) in LEGACY_DATES {
        let dtval_part = if fixed {
            LegacyPart::FixedDtval
        } else {
            LegacyPart::Dtval
        };
        table = table
            .field(date_type, VersionRange::Before(3, 5), legacy_part(LegacyPart::DateType))
            .field(tzid, VersionRange::Before(3, 5), legacy_part(LegacyPart::Tzid))
            .field(dtval, VersionRange::Before(3, 5), legacy_part(dtval_part))
            .field(date, VersionRange::Before(3, 5), legacy_date(slot));
    }
    for (name, field) in LEGACY_EMPTY_FLAGS {
        table = table.set::<EventEntry, _>(name, VersionRange::Before(3, 5), move |entry, input| {
            annotation_of(entry, input)?.empty_flags.set(field, input.bool());
            Ok(())
        });
    }

    table.build()
}

/// `target` or `master` key of an annotation.
struct EventKeyRule(EventKeyRole);

impl Rule for EventKeyRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(EventKeyHolder {
            role: self.0,
            key: EventKey::default(),
        });
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        let holder = ctx.stack.pop::<EventKeyHolder>()?;
        let ann = ctx
            .stack
            .top_mut::<EventEntry>()?
            .annotation_mut()
            .ok_or_else(|| RestoreError::invalid(el.name, "", "event is not an annotation"))?;
        match holder.role {
            EventKeyRole::Target => ann.target = holder.key,
            EventKeyRole::Master => ann.master = holder.key,
        }
        Ok(())
    }
}

fn event_key_table() -> RestoreResult<Rc<FieldTable>> {
    FieldTable::new("event key")
        .set::<EventKeyHolder, _>("uid", VersionRange::Any, |h, input| {
            h.key.uid = input.opt_string();
            Ok(())
        })
        .set::<EventKeyHolder, _>("recurrenceId", VersionRange::Any, |h, input| {
            h.key.recurrence_id = input.opt_string();
            Ok(())
        })
        .set::<EventKeyHolder, _>("colPath", VersionRange::Any, |h, input| {
            h.key.col_path = input.opt_string();
            Ok(())
        })
        .build()
}

/// Organizer inside an event. Dumps before 3.5 give the id of an entry in
/// the organizers section instead.
struct EventOrganizerRule;

impl Rule for EventOrganizerRule {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(OrganizerEntry::default());
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        let (entry, errored) = ctx.stack.pop_slot::<OrganizerEntry>()?;
        if errored {
            ctx.stack.mark_entity_error();
            return Ok(());
        }

        let organizer = match el.opt_text() {
            Some(text) if ctx.is_before(3, 5) => {
                let id = text
                    .parse()
                    .map_err(|e| RestoreError::invalid("organizer", text, e))?;
                ctx.organizer_by_legacy_id(id)?
            }
            _ => entry.organizer,
        };
        event_of(ctx)?.organizer = Some(organizer);
        Ok(())
    }
}

/// Organizer fields, shared with the organizers section of older dumps.
pub(super) fn organizer_table() -> RestoreResult<Rc<FieldTable>> {
    tagged(FieldTable::new("organizer"))
        .set::<OrganizerEntry, _>("id", VersionRange::Any, |o, input| {
            o.id = input.opt_int()?;
            Ok(())
        })
        .set::<OrganizerEntry, _>("cn", VersionRange::Any, |o, input| {
            o.organizer.cn = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("dir", VersionRange::Any, |o, input| {
            o.organizer.dir = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("lang", VersionRange::Any, |o, input| {
            o.organizer.language = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("sentBy", VersionRange::Any, |o, input| {
            o.organizer.sent_by = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("organizerUri", VersionRange::Any, |o, input| {
            o.organizer.organizer_uri = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("dtstamp", VersionRange::Any, |o, input| {
            o.organizer.dtstamp = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("scheduleStatus", VersionRange::Any, |o, input| {
            o.organizer.schedule_status = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("sent-by", VersionRange::Before(3, 5), |o, input| {
            o.organizer.sent_by = input.opt_string();
            Ok(())
        })
        .set::<OrganizerEntry, _>("organizer-uri", VersionRange::Before(3, 5), |o, input| {
            o.organizer.organizer_uri = input.opt_string();
            Ok(())
        })
        // Briefly dumped by 3.5 and 3.6.
        .ignore("size")
        .ignore("byteSize")
        .ignore_in("public", VersionRange::Before(3, 5))
        .build()
}

/// Attendee fields, shared with the attendees section of older dumps.
pub(super) fn attendee_table() -> RestoreResult<Rc<FieldTable>> {
    tagged(FieldTable::new("attendee"))
        .set::<Attendee, _>("id", VersionRange::Before(3, 5), |a, input| {
            a.id = input.opt_int()?;
            Ok(())
        })
        .set::<Attendee, _>("attendeeUri", VersionRange::Any, |a, input| {
            a.attendee_uri = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("cn", VersionRange::Any, |a, input| {
            a.cn = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("cuType", VersionRange::Any, |a, input| {
            a.cu_type = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("delegatedFrom", VersionRange::Any, |a, input| {
            a.delegated_from = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("delegatedTo", VersionRange::Any, |a, input| {
            a.delegated_to = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("dir", VersionRange::Any, |a, input| {
            a.dir = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("lang", VersionRange::Any, |a, input| {
            a.language = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("member", VersionRange::Any, |a, input| {
            a.member = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("rsvp", VersionRange::Any, |a, input| {
            a.rsvp = input.bool();
            Ok(())
        })
        .set::<Attendee, _>("role", VersionRange::Any, |a, input| {
            a.role = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("partstat", VersionRange::Any, |a, input| {
            a.partstat = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("sentBy", VersionRange::Any, |a, input| {
            a.sent_by = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("sequence", VersionRange::Any, |a, input| {
            a.sequence = input.opt_int()?.unwrap_or_default();
            Ok(())
        })
        .set::<Attendee, _>("dtstamp", VersionRange::Any, |a, input| {
            a.dtstamp = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("scheduleStatus", VersionRange::Any, |a, input| {
            a.schedule_status = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("attendee-uri", VersionRange::Before(3, 5), |a, input| {
            a.attendee_uri = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("cu-type", VersionRange::Before(3, 5), |a, input| {
            a.cu_type = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("delegated-from", VersionRange::Before(3, 5), |a, input| {
            a.delegated_from = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("delegated-to", VersionRange::Before(3, 5), |a, input| {
            a.delegated_to = input.opt_string();
            Ok(())
        })
        .set::<Attendee, _>("sent-by", VersionRange::Before(3, 5), |a, input| {
            a.sent_by = input.opt_string();
            Ok(())
        })
        .ignore_in("id", VersionRange::From(3, 5))
        .ignore_in("public", VersionRange::Before(3, 5))
        .ignore("byteSize")
        .build()
}

fn add_attendee(ctx: &mut RestoreContext<'_>, attendee: Attendee) -> RestoreResult<()> {
    event_of(ctx)?.attendees.push(attendee);
    Ok(())
}

fn add_alarm(ctx: &mut RestoreContext<'_>, mut alarm: Alarm) -> RestoreResult<()> {
    let event = event_of(ctx)?;
    if alarm.owned.owner_href.is_none() {
        alarm.owned.owner_href.clone_from(&event.owned.owner_href);
    }
    event.alarms.push(alarm);
    Ok(())
}

fn alarm_table() -> RestoreResult<Rc<FieldTable>> {
    owned(FieldTable::new("alarm"))
        .set::<Alarm, _>("alarmType", VersionRange::Any, |a, input| {
            a.alarm_type = input.opt_int()?;
            Ok(())
        })
        .set::<Alarm, _>("trigger", VersionRange::Any, |a, input| {
            a.trigger = input.opt_string();
            Ok(())
        })
        .set::<Alarm, _>("triggerStart", VersionRange::Any, |a, input| {
            a.trigger_start = input.bool();
            Ok(())
        })
        .set::<Alarm, _>("triggerDateTime", VersionRange::Any, |a, input| {
            a.trigger_date_time = input.bool();
            Ok(())
        })
        .set::<Alarm, _>("duration", VersionRange::Any, |a, input| {
            a.duration = input.opt_string();
            Ok(())
        })
        .set::<Alarm, _>("repeat", VersionRange::Any, |a, input| {
            a.repeat = input.opt_int()?;
            Ok(())
        })
        .set::<Alarm, _>("attach", VersionRange::Any, |a, input| {
            a.attach = input.opt_string();
            Ok(())
        })
        .ignore_all(&[
            "summaries",
            "descriptions",
            "attendees",
            "xproperties",
            "byteSize",
            "event",
        ])
        .build()
}

fn add_xproperty(ctx: &mut RestoreContext<'_>, xprop: Xproperty) -> RestoreResult<()> {
    if xprop.name.is_empty() {
        return Err(RestoreError::MissingValue("x-property name".to_owned()));
    }
    event_of(ctx)?.xproperties.push(xprop);
    Ok(())
}

fn xproperty_table() -> RestoreResult<Rc<FieldTable>> {
    tagged(FieldTable::new("x-property"))
        .set::<Xproperty, _>("name", VersionRange::Any, |x, input| {
            x.name = input.string()?;
            Ok(())
        })
        .set::<Xproperty, _>("pars", VersionRange::Any, |x, input| {
            x.pars = input.opt_string();
            Ok(())
        })
        .set::<Xproperty, _>("value", VersionRange::Any, |x, input| {
            x.value = input.opt_string();
            Ok(())
        })
        .ignore("byteSize")
        .build()
}

fn set_geo(ctx: &mut RestoreContext<'_>, geo: Geo) -> RestoreResult<()> {
    event_of(ctx)?.geo = Some(geo);
    Ok(())
}

fn geo_table() -> RestoreResult<Rc<FieldTable>> {
    FieldTable::new("geo")
        .set::<Geo, _>("latitude", VersionRange::Any, |g, input| {
            g.latitude = Some(input.decimal()?);
            Ok(())
        })
        .set::<Geo, _>("longitude", VersionRange::Any, |g, input| {
            g.longitude = Some(input.decimal()?);
            Ok(())
        })
        .build()
}

fn set_related_to(ctx: &mut RestoreContext<'_>, related: RelatedTo) -> RestoreResult<()> {
    event_of(ctx)?.related_to = Some(related);
    Ok(())
}

fn related_to_table() -> RestoreResult<Rc<FieldTable>> {
    FieldTable::new("related-to")
        .set::<RelatedTo, _>("relType", VersionRange::Any, |r, input| {
            r.rel_type = input.opt_string();
            Ok(())
        })
        .set::<RelatedTo, _>("value", VersionRange::Any, |r, input| {
            r.value = input.opt_string();
            Ok(())
        })
        .build()
}

fn add_attachment(ctx: &mut RestoreContext<'_>, attachment: Attachment) -> RestoreResult<()> {
    event_of(ctx)?.attachments.push(attachment);
    Ok(())
}

fn attachment_table() -> RestoreResult<Rc<FieldTable>> {
    tagged(FieldTable::new("attachment"))
        .set::<Attachment, _>("fmtType", VersionRange::Any, |a, input| {
            a.fmt_type = input.opt_string();
            Ok(())
        })
        .set::<Attachment, _>("valueType", VersionRange::Any, |a, input| {
            a.value_type = input.opt_string();
            Ok(())
        })
        .set::<Attachment, _>("encoding", VersionRange::Any, |a, input| {
            a.encoding = input.opt_string();
            Ok(())
        })
        .set::<Attachment, _>("uri", VersionRange::Any, |a, input| {
            a.uri = input.opt_string();
            Ok(())
        })
        .set::<Attachment, _>("value", VersionRange::Any, |a, input| {
            a.value = input.opt_string();
            Ok(())
        })
        .ignore("byteSize")
        .build()
}

fn add_request_status(ctx: &mut RestoreContext<'_>, status: RequestStatus) -> RestoreResult<()> {
    event_of(ctx)?.request_statuses.push(status);
    Ok(())
}

fn request_status_table() -> RestoreResult<Rc<FieldTable>> {
    FieldTable::new("request status")
        .set::<RequestStatus, _>("code", VersionRange::Any, |r, input| {
            r.code = input.opt_string();
            Ok(())
        })
        .set::<RequestStatus, _>("data", VersionRange::Any, |r, input| {
            r.data = input.opt_string();
            Ok(())
        })
        .ignore("byteSize")
        .build()
}

fn set_request_status_description(
    ctx: &mut RestoreContext<'_>,
    value: LocalizedString,
) -> RestoreResult<()> {
    ctx.stack.top_mut::<RequestStatus>()?.description = Some(value);
    Ok(())
}

fn add_summary(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    event_of(ctx)?.summaries.push(value);
    Ok(())
}

fn add_description(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    event_of(ctx)?.descriptions.push(value);
    Ok(())
}

fn add_comment(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    event_of(ctx)?.comments.push(value);
    Ok(())
}

fn add_resource(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    event_of(ctx)?.resources.push(value);
    Ok(())
}

fn add_alarm_summary(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<Alarm>()?.summaries.push(value);
    Ok(())
}

fn add_alarm_description(ctx: &mut RestoreContext<'_>, value: LocalizedString) -> RestoreResult<()> {
    ctx.stack.top_mut::<Alarm>()?.descriptions.push(value);
    Ok(())
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add("caldata/events/event", EntityRule::<EventEntry>::new())?;
    rules.add("caldata/events/event/overrides/event", EntityRule::<EventEntry>::new())?;
    rules.add("caldata/event-annotations/event", EntityRule::<EventEntry>::new())?;
    rules.add(
        "caldata/event-annotations/event/overrides/event",
        EntityRule::<EventEntry>::new(),
    )?;

    let events = event_table()?;
    for pattern in [
        "*/event/?",
        "*/event/rdates/rdate",
        "*/event/exdates/exdate",
        "*/event/rrules/rrule",
        "*/event/exrules/exrule",
        "*/event/recipients/?",
        "*/event/eventAttendees/?",
        "*/event/eventRecurrence/?",
        "*/event/eventCategories/?",
    ] {
        rules.add(pattern, FieldRule::new(Rc::clone(&events)))?;
    }

    let keys = event_key_table()?;
    rules.add("*/event/target", EventKeyRule(EventKeyRole::Target))?;
    rules.add("*/event/target/event/?", FieldRule::new(Rc::clone(&keys)))?;
    rules.add("*/event/master", EventKeyRule(EventKeyRole::Master))?;
    rules.add("*/event/master/event/?", FieldRule::new(keys))?;

    for (pattern, target) in [
        ("*/event/categories/category", RefTarget::Category),
        ("*/event/location/location", RefTarget::Location),
        ("*/event/contacts/contact", RefTarget::Contact),
    ] {
        rules.add(pattern, UidRefRule { target })?;
        rules.add(&format!("{pattern}/uid"), UidFieldRule)?;
    }

    rules.add("*/event/geo", ChildRule::new(set_geo))?;
    rules.add("*/event/geo/?", FieldRule::new(geo_table()?))?;
    rules.add("*/event/relatedTo", ChildRule::new(set_related_to))?;
    rules.add("*/event/relatedTo/?", FieldRule::new(related_to_table()?))?;
    rules.add("*/event/organizer", EventOrganizerRule)?;
    rules.add("*/event/organizer/?", FieldRule::new(organizer_table()?))?;
    rules.add("*/event/attachments/attachment", ChildRule::new(add_attachment))?;
    rules.add(
        "*/event/attachments/attachment/?",
        FieldRule::new(attachment_table()?),
    )?;
    rules.add("*/event/attendees/attendee", ChildRule::new(add_attendee))?;
    rules.add("*/event/attendees/attendee/?", FieldRule::new(attendee_table()?))?;
    rules.add("*/event/xproperties/xproperty", ChildRule::new(add_xproperty))?;
    rules.add(
        "*/event/xproperties/xproperty/?",
        FieldRule::new(xproperty_table()?),
    )?;

    rules.add(
        "*/event/request-statuses/request-status",
        ChildRule::new(add_request_status),
    )?;
    rules.add(
        "*/event/request-statuses/request-status/?",
        FieldRule::new(request_status_table()?),
    )?;
    add_localized(
        rules,
        "*/event/request-statuses/request-status/description",
        LocalizedRule::new(set_request_status_description),
    )?;

    add_localized(rules, "*/event/summaries/summary", LocalizedRule::new(add_summary))?;
    add_localized(
        rules,
        "*/event/descriptions/description",
        LocalizedRule::long(add_description),
    )?;
    add_localized(rules, "*/event/comments/comment", LocalizedRule::new(add_comment))?;
    add_localized(rules, "*/event/resources/resource", LocalizedRule::new(add_resource))?;

    let alarms = alarm_table()?;
    for pattern in ["*/event/alarms/alarm", "*/event/alarm"] {
        rules.add(pattern, ChildRule::new(add_alarm))?;
        rules.add(&format!("{pattern}/?"), FieldRule::new(Rc::clone(&alarms)))?;
    }
    add_localized(
        rules,
        "*/event/alarms/alarm/summaries/summary",
        LocalizedRule::new(add_alarm_summary),
    )?;
    add_localized(
        rules,
        "*/event/alarms/alarm/descriptions/description",
        LocalizedRule::long(add_alarm_description),
    )?;

    Ok(())
}
