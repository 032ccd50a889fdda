//! Events, their overrides and annotations, and the properties hanging off them.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::owned::{OwnedFields, impl_owned};
use crate::value::{DateTimeValue, LocalizedString};

/// End type of an event with neither end nor duration.
pub const END_TYPE_NONE: char = 'N';
pub const END_TYPE_DATE: char = 'E';
pub const END_TYPE_DURATION: char = 'D';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geo {
    pub latitude: Option<BigDecimal>,
    pub longitude: Option<BigDecimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    pub cn: Option<String>,
    pub dir: Option<String>,
    pub language: Option<String>,
    pub sent_by: Option<String>,
    pub organizer_uri: Option<String>,
    pub dtstamp: Option<String>,
    pub schedule_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Surrogate id of the standalone attendee table in older dumps.
    pub id: Option<i64>,
    pub cn: Option<String>,
    pub cu_type: Option<String>,
    pub delegated_from: Option<String>,
    pub delegated_to: Option<String>,
    pub dir: Option<String>,
    pub language: Option<String>,
    pub member: Option<String>,
    pub rsvp: bool,
    pub role: Option<String>,
    pub partstat: Option<String>,
    pub sent_by: Option<String>,
    pub attendee_uri: Option<String>,
    pub sequence: i64,
    pub dtstamp: Option<String>,
    pub schedule_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xproperty {
    pub name: String,
    pub pars: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedTo {
    pub rel_type: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub fmt_type: Option<String>,
    pub value_type: Option<String>,
    pub encoding: Option<String>,
    pub uri: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub code: Option<String>,
    pub description: Option<LocalizedString>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub owned: OwnedFields,
    pub alarm_type: Option<i64>,
    pub trigger: Option<String>,
    pub trigger_start: bool,
    pub trigger_date_time: bool,
    pub duration: Option<String>,
    pub repeat: Option<i64>,
    pub attach: Option<String>,
    pub summaries: Vec<LocalizedString>,
    pub descriptions: Vec<LocalizedString>,
    pub attendees: Vec<Attendee>,
    pub xproperties: Vec<Xproperty>,
}

/// A calendar component. Also carries the delta fields of an annotation.
#[expect(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub owned: OwnedFields,
    pub entity_type: i64,
    pub name: Option<String>,
    pub uid: Option<String>,
    pub summaries: Vec<LocalizedString>,
    pub descriptions: Vec<LocalizedString>,
    pub comments: Vec<LocalizedString>,
    pub resources: Vec<LocalizedString>,
    pub classification: Option<String>,
    pub link: Option<String>,
    pub geo: Option<Geo>,
    pub status: Option<String>,
    pub cost: Option<String>,
    pub deleted: bool,
    pub tombstoned: bool,
    pub dtstamp: Option<String>,
    pub lastmod: Option<String>,
    pub created: Option<String>,
    pub byte_size: Option<i64>,
    pub priority: Option<i64>,
    pub transparency: Option<String>,
    pub percent_complete: Option<i64>,
    pub completed: Option<String>,
    pub ctoken: Option<String>,

    pub no_start: bool,
    pub dtstart: Option<DateTimeValue>,
    pub dtend: Option<DateTimeValue>,
    pub duration: Option<String>,
    pub end_type: Option<char>,

    pub recurring: bool,
    pub rrules: Vec<String>,
    pub exrules: Vec<String>,
    pub rdates: Vec<DateTimeValue>,
    pub exdates: Vec<DateTimeValue>,
    pub recurrence_id: Option<String>,

    pub organizer: Option<Organizer>,
    pub attendees: Vec<Attendee>,
    pub sequence: i64,
    pub schedule_method: Option<i64>,
    pub originator: Option<String>,
    pub recipients: Vec<String>,
    pub schedule_state: Option<i64>,
    pub organizer_scheduling_object: bool,
    pub attendee_scheduling_object: bool,
    pub stag: Option<String>,
    pub busy_type: Option<i64>,

    /// Category uids.
    pub categories: Vec<String>,
    /// Contact uids.
    pub contacts: Vec<String>,
    /// Location uid.
    pub location: Option<String>,

    pub alarms: Vec<Alarm>,
    pub xproperties: Vec<Xproperty>,
    pub related_to: Option<RelatedTo>,
    pub attachments: Vec<Attachment>,
    pub request_statuses: Vec<RequestStatus>,
}

impl_owned!(Event, Alarm);

impl Event {
    /// Uid, or an empty string for logging.
    #[must_use]
    pub fn uid_str(&self) -> &str {
        self.uid.as_deref().unwrap_or("")
    }
}

/// Locates an event: collection, uid and optional recurrence id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub col_path: Option<String>,
    pub uid: Option<String>,
    pub recurrence_id: Option<String>,
}

impl EventKey {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.col_path.is_some() && self.uid.is_some()
    }
}

/// Multi-valued or optional event fields an annotation may explicitly empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxiedField {
    Alarms,
    Attendees,
    Categories,
    Comments,
    Contacts,
    Descriptions,
    Exdates,
    Exrules,
    Rdates,
    Recipients,
    RequestStatuses,
    Resources,
    Rrules,
    Summaries,
    Xproperties,
}

impl ProxiedField {
    const COUNT: usize = 15;

    fn index(self) -> usize {
        self as usize
    }
}

/// One `T`/`F` flag per [`ProxiedField`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyFlags(String);

impl Default for EmptyFlags {
    fn default() -> Self {
        Self("F".repeat(ProxiedField::COUNT))
    }
}

impl EmptyFlags {
    /// ## Summary
    /// Parses a dumped flag string. `None` if any character is not `T` or `F`.
    #[must_use]
    pub fn parse(flags: &str) -> Option<Self> {
        flags
            .chars()
            .all(|c| c == 'T' || c == 'F')
            .then(|| Self(flags.to_owned()))
    }

    pub fn set(&mut self, field: ProxiedField, empty: bool) {
        let mut chars: Vec<char> = self.0.chars().collect();
        if chars.len() < ProxiedField::COUNT {
            chars.resize(ProxiedField::COUNT, 'F');
        }
        chars[field.index()] = if empty { 'T' } else { 'F' };
        self.0 = chars.into_iter().collect();
    }

    #[must_use]
    pub fn is_empty(&self, field: ProxiedField) -> bool {
        self.0.chars().nth(field.index()) == Some('T')
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Delta of an event against the event it annotates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub event: Event,
    pub target: EventKey,
    pub master: EventKey,
    pub empty_flags: EmptyFlags,
    /// An override of one instance of its master.
    pub is_override: bool,
}

/// The forms an event record takes in a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventVariant {
    Plain(Event),
    Annotation(EventAnnotation),
}

/// An event as handed to the sink, with its inline overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub variant: EventVariant,
    pub overrides: Vec<EventAnnotation>,
}

impl EventEntry {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            variant: EventVariant::Plain(Event::default()),
            overrides: Vec::new(),
        }
    }

    #[must_use]
    pub fn annotation(is_override: bool) -> Self {
        Self {
            variant: EventVariant::Annotation(EventAnnotation {
                is_override,
                ..EventAnnotation::default()
            }),
            overrides: Vec::new(),
        }
    }

    /// The underlying event whichever form this entry takes.
    #[must_use]
    pub fn event(&self) -> &Event {
        match &self.variant {
            EventVariant::Plain(event) => event,
            EventVariant::Annotation(ann) => &ann.event,
        }
    }

    pub fn event_mut(&mut self) -> &mut Event {
        match &mut self.variant {
            EventVariant::Plain(event) => event,
            EventVariant::Annotation(ann) => &mut ann.event,
        }
    }

    #[must_use]
    pub fn annotation_ref(&self) -> Option<&EventAnnotation> {
        match &self.variant {
            EventVariant::Annotation(ann) => Some(ann),
            EventVariant::Plain(_) => None,
        }
    }

    pub fn annotation_mut(&mut self) -> Option<&mut EventAnnotation> {
        match &mut self.variant {
            EventVariant::Annotation(ann) => Some(ann),
            EventVariant::Plain(_) => None,
        }
    }

    #[must_use]
    pub fn is_override(&self) -> bool {
        self.annotation_ref().is_some_and(|ann| ann.is_override)
    }
}

impl crate::owned::Owned for EventEntry {
    fn owned(&self) -> &OwnedFields {
        &self.event().owned
    }

    fn owned_mut(&mut self) -> &mut OwnedFields {
        &mut self.event_mut().owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flags_round_through_set() {
        let mut flags = EmptyFlags::default();
        assert!(!flags.is_empty(ProxiedField::Categories));

        flags.set(ProxiedField::Categories, true);
        assert!(flags.is_empty(ProxiedField::Categories));
        assert_eq!(flags.as_str().len(), 15);

        assert!(EmptyFlags::parse("TFX").is_none());
        assert!(EmptyFlags::parse("TFT").is_some());
    }

    #[test]
    fn entry_accessor_reaches_annotation_event() {
        let mut entry = EventEntry::annotation(true);
        entry.event_mut().uid = Some("u1".into());

        assert!(entry.is_override());
        assert_eq!(entry.event().uid_str(), "u1");
        assert_eq!(
            entry.annotation_ref().and_then(|a| a.event.uid.as_deref()),
            Some("u1")
        );
    }
}
