//! Typed parse stack shared by every rule.
//!
//! Entities in progress and transient value holders live on one stack. Each
//! frame is a variant of a sum type, and typed accessors report a
//! `StackMismatch` naming both kinds when a rule finds the wrong frame.

use calrestore_core::principal::PrincipalKind;
use calrestore_model::{
    AdminGroup, Alarm, Attachment, Attendee, AuthUser, CalSuite, Category, Collection,
    CollectionLastmod, Contact, EventEntry, EventKey, FilterDef, Geo, LegacyTimezone,
    LocalizedString, Location, Organizer, Owned, OwnedFields, Preferences, Property, RelatedTo,
    RequestStatus, SystemParameters, User, View, Xproperty,
};

use crate::diagnostics::EntityKind;
use crate::error::{RestoreError, RestoreResult};

/// Components of a date-time as dumped, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateTimeParts {
    pub date_type: bool,
    pub tzid: Option<String>,
    pub dtval: Option<String>,
    /// UTC value written by the dumping release.
    pub date: Option<String>,
}

/// String with language, from a `bwstring` element or a legacy wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrHolder(pub LocalizedString);

/// Long string with language, from a `bwlongstring` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongStrHolder(pub LocalizedString);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalRole {
    Owner,
    GroupOwner,
    Creator,
    Member,
}

/// A principal reference being read from an owner, creator or member element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalRefHolder {
    pub role: PrincipalRole,
    pub kind: Option<PrincipalKind>,
    pub account: Option<String>,
    /// Bare user id body of dumps before 3.1.
    pub legacy_id: Option<i64>,
}

impl PrincipalRefHolder {
    #[must_use]
    pub fn new(role: PrincipalRole) -> Self {
        Self {
            role,
            kind: None,
            account: None,
            legacy_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    Category,
    Location,
    Contact,
}

impl RefTarget {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Location => "location",
            Self::Contact => "contact",
        }
    }
}

/// Reference to a vocabulary entity by uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidRef {
    pub target: RefTarget,
    pub uid: Option<String>,
}

/// Reference to a vocabulary entity by owner and uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerUidRef {
    pub target: RefTarget,
    pub owner_href: Option<String>,
    pub uid: Option<String>,
}

/// Reference to a collection by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRef {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKeyRole {
    Target,
    Master,
}

/// Target or master key of an annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventKeyHolder {
    pub role: EventKeyRole,
    pub key: EventKey,
}

/// Standalone organizer of dumps before 3.5, registered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizerEntry {
    pub id: Option<i64>,
    pub organizer: Organizer,
}

/// Subscription of a user-preferences record of dumps before 3.5.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription(pub Collection);

#[derive(Debug)]
pub enum EntityFrame {
    Syspars(SystemParameters),
    User(User),
    AdminGroup(AdminGroup),
    AuthUser(AuthUser),
    Preferences(Preferences),
    Collection(Collection),
    CalSuite(CalSuite),
    Location(Location),
    Contact(Contact),
    Category(Category),
    Event(EventEntry),
    Organizer(OrganizerEntry),
    Attendee(Attendee),
    Alarm(Alarm),
    Filter(FilterDef),
    Timezone(LegacyTimezone),
}

impl EntityFrame {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Syspars(_) => EntityKind::Syspars,
            Self::User(_) => EntityKind::User,
            Self::AdminGroup(_) => EntityKind::AdminGroup,
            Self::AuthUser(_) => EntityKind::AuthUser,
            Self::Preferences(_) => EntityKind::Preferences,
            Self::Collection(_) => EntityKind::Collection,
            Self::CalSuite(_) => EntityKind::CalSuite,
            Self::Location(_) => EntityKind::Location,
            Self::Contact(_) => EntityKind::Contact,
            Self::Category(_) => EntityKind::Category,
            Self::Event(entry) => event_kind(entry),
            Self::Organizer(_) => EntityKind::Organizer,
            Self::Attendee(_) => EntityKind::Attendee,
            Self::Alarm(_) => EntityKind::Event,
            Self::Filter(_) => EntityKind::Filter,
            Self::Timezone(_) => EntityKind::Timezone,
        }
    }

    /// Ownership fields of entities that carry them.
    pub fn owned_mut(&mut self) -> Option<&mut OwnedFields> {
        match self {
            Self::AdminGroup(e) => Some(e.owned_mut()),
            Self::Preferences(e) => Some(e.owned_mut()),
            Self::Collection(e) => Some(e.owned_mut()),
            Self::CalSuite(e) => Some(e.owned_mut()),
            Self::Location(e) => Some(e.owned_mut()),
            Self::Contact(e) => Some(e.owned_mut()),
            Self::Category(e) => Some(e.owned_mut()),
            Self::Event(e) => Some(e.owned_mut()),
            Self::Alarm(e) => Some(e.owned_mut()),
            Self::Filter(e) => Some(e.owned_mut()),
            Self::Timezone(e) => Some(e.owned_mut()),
            Self::Syspars(_)
            | Self::User(_)
            | Self::AuthUser(_)
            | Self::Organizer(_)
            | Self::Attendee(_) => None,
        }
    }

    /// Best known identifying field, for messages.
    #[must_use]
    pub fn describe(&self) -> String {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "(none)".to_owned());
        match self {
            Self::Syspars(e) => format!("syspars {}", opt(&e.name)),
            Self::User(e) => format!("user {}", e.account),
            Self::AdminGroup(e) => format!("admin group {}", e.account),
            Self::AuthUser(e) => format!("auth user {}", opt(&e.user_href)),
            Self::Preferences(e) => format!("preferences of {}", opt(&e.owned.owner_href)),
            Self::Collection(e) => format!("collection {}", e.path),
            Self::CalSuite(e) => format!("cal-suite {}", e.name),
            Self::Location(e) => format!("location {}", opt(&e.uid)),
            Self::Contact(e) => format!("contact {}", opt(&e.uid)),
            Self::Category(e) => format!("category {}", opt(&e.uid)),
            Self::Event(e) => format!("event uid {}", e.event().uid_str()),
            Self::Organizer(e) => format!("organizer {}", opt(&e.organizer.organizer_uri)),
            Self::Attendee(e) => format!("attendee {}", opt(&e.attendee_uri)),
            Self::Alarm(e) => format!("alarm {}", opt(&e.trigger)),
            Self::Filter(e) => format!("filter {}", e.name),
            Self::Timezone(e) => format!("timezone {}", opt(&e.tzid)),
        }
    }
}

fn event_kind(entry: &EventEntry) -> EntityKind {
    match entry.annotation_ref() {
        None => EntityKind::Event,
        Some(ann) if ann.is_override => EntityKind::EventOverride,
        Some(_) => EntityKind::EventAnnotation,
    }
}

#[derive(Debug)]
pub enum ValueFrame {
    DateTime(DateTimeParts),
    Str(StrHolder),
    LongStr(LongStrHolder),
    PrincipalRef(PrincipalRefHolder),
    UidRef(UidRef),
    OwnerUidRef(OwnerUidRef),
    PathRef(PathRef),
    EventKey(EventKeyHolder),
    Xprop(Xproperty),
    Property(Property),
    Geo(Geo),
    RelatedTo(RelatedTo),
    Attachment(Attachment),
    RequestStatus(RequestStatus),
    Lastmod(CollectionLastmod),
    View(View),
    Subscription(Subscription),
}

#[derive(Debug)]
pub enum Frame {
    Entity(EntityFrame),
    Value(ValueFrame),
}

/// Types that occupy one frame variant.
pub trait StackItem: Sized {
    const KIND: &'static str;

    fn into_frame(self) -> Frame;

    /// Gives the frame back when it holds another kind.
    fn from_frame(frame: Frame) -> Result<Self, Frame>;

    fn frame_ref(frame: &Frame) -> Option<&Self>;

    fn frame_mut(frame: &mut Frame) -> Option<&mut Self>;
}

macro_rules! stack_item {
    ($($ty:ty => $frame:ident($outer:ident::$variant:ident), $kind:literal;)+) => {
        $(
            impl StackItem for $ty {
                const KIND: &'static str = $kind;

                fn into_frame(self) -> Frame {
                    Frame::$frame($outer::$variant(self))
                }

                fn from_frame(frame: Frame) -> Result<Self, Frame> {
                    match frame {
                        Frame::$frame($outer::$variant(item)) => Ok(item),
                        other => Err(other),
                    }
                }

                fn frame_ref(frame: &Frame) -> Option<&Self> {
                    match frame {
                        Frame::$frame($outer::$variant(item)) => Some(item),
                        _ => None,
                    }
                }

                fn frame_mut(frame: &mut Frame) -> Option<&mut Self> {
                    match frame {
                        Frame::$frame($outer::$variant(item)) => Some(item),
                        _ => None,
                    }
                }
            }
        )+
    };
}

stack_item! {
    SystemParameters => Entity(EntityFrame::Syspars), "syspars";
    User => Entity(EntityFrame::User), "user";
    AdminGroup => Entity(EntityFrame::AdminGroup), "admin group";
    AuthUser => Entity(EntityFrame::AuthUser), "auth user";
    Preferences => Entity(EntityFrame::Preferences), "preferences";
    Collection => Entity(EntityFrame::Collection), "collection";
    CalSuite => Entity(EntityFrame::CalSuite), "cal-suite";
    Location => Entity(EntityFrame::Location), "location";
    Contact => Entity(EntityFrame::Contact), "contact";
    Category => Entity(EntityFrame::Category), "category";
    EventEntry => Entity(EntityFrame::Event), "event";
    OrganizerEntry => Entity(EntityFrame::Organizer), "organizer";
    Attendee => Entity(EntityFrame::Attendee), "attendee";
    Alarm => Entity(EntityFrame::Alarm), "alarm";
    FilterDef => Entity(EntityFrame::Filter), "filter";
    LegacyTimezone => Entity(EntityFrame::Timezone), "timezone";
    DateTimeParts => Value(ValueFrame::DateTime), "date-time";
    StrHolder => Value(ValueFrame::Str), "string";
    LongStrHolder => Value(ValueFrame::LongStr), "long string";
    PrincipalRefHolder => Value(ValueFrame::PrincipalRef), "principal reference";
    UidRef => Value(ValueFrame::UidRef), "uid reference";
    OwnerUidRef => Value(ValueFrame::OwnerUidRef), "owner-uid reference";
    PathRef => Value(ValueFrame::PathRef), "path reference";
    EventKeyHolder => Value(ValueFrame::EventKey), "event key";
    Xproperty => Value(ValueFrame::Xprop), "x-property";
    Property => Value(ValueFrame::Property), "property";
    Geo => Value(ValueFrame::Geo), "geo";
    RelatedTo => Value(ValueFrame::RelatedTo), "related-to";
    Attachment => Value(ValueFrame::Attachment), "attachment";
    RequestStatus => Value(ValueFrame::RequestStatus), "request status";
    CollectionLastmod => Value(ValueFrame::Lastmod), "collection lastmod";
    View => Value(ValueFrame::View), "view";
    Subscription => Value(ValueFrame::Subscription), "subscription";
}

impl Frame {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Entity(e) => match e {
                EntityFrame::Syspars(_) => SystemParameters::KIND,
                EntityFrame::User(_) => User::KIND,
                EntityFrame::AdminGroup(_) => AdminGroup::KIND,
                EntityFrame::AuthUser(_) => AuthUser::KIND,
                EntityFrame::Preferences(_) => Preferences::KIND,
                EntityFrame::Collection(_) => Collection::KIND,
                EntityFrame::CalSuite(_) => CalSuite::KIND,
                EntityFrame::Location(_) => Location::KIND,
                EntityFrame::Contact(_) => Contact::KIND,
                EntityFrame::Category(_) => Category::KIND,
                EntityFrame::Event(_) => EventEntry::KIND,
                EntityFrame::Organizer(_) => OrganizerEntry::KIND,
                EntityFrame::Attendee(_) => Attendee::KIND,
                EntityFrame::Alarm(_) => Alarm::KIND,
                EntityFrame::Filter(_) => FilterDef::KIND,
                EntityFrame::Timezone(_) => LegacyTimezone::KIND,
            },
            Self::Value(v) => match v {
                ValueFrame::DateTime(_) => DateTimeParts::KIND,
                ValueFrame::Str(_) => StrHolder::KIND,
                ValueFrame::LongStr(_) => LongStrHolder::KIND,
                ValueFrame::PrincipalRef(_) => PrincipalRefHolder::KIND,
                ValueFrame::UidRef(_) => UidRef::KIND,
                ValueFrame::OwnerUidRef(_) => OwnerUidRef::KIND,
                ValueFrame::PathRef(_) => PathRef::KIND,
                ValueFrame::EventKey(_) => EventKeyHolder::KIND,
                ValueFrame::Xprop(_) => Xproperty::KIND,
                ValueFrame::Property(_) => Property::KIND,
                ValueFrame::Geo(_) => Geo::KIND,
                ValueFrame::RelatedTo(_) => RelatedTo::KIND,
                ValueFrame::Attachment(_) => Attachment::KIND,
                ValueFrame::RequestStatus(_) => RequestStatus::KIND,
                ValueFrame::Lastmod(_) => CollectionLastmod::KIND,
                ValueFrame::View(_) => View::KIND,
                ValueFrame::Subscription(_) => Subscription::KIND,
            },
        }
    }
}

#[derive(Debug)]
struct Slot {
    frame: Frame,
    errored: bool,
}

/// The parse stack.
#[derive(Debug, Default)]
pub struct ParseStack {
    slots: Vec<Slot>,
}

fn mismatch<T: StackItem>(found: Option<&Frame>) -> RestoreError {
    RestoreError::StackMismatch {
        expected: T::KIND,
        found: found.map_or("empty stack", Frame::kind_name),
    }
}

impl ParseStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: StackItem>(&mut self, item: T) {
        self.push_slot(item, false);
    }

    /// Pushes a frame back with its error mark.
    pub fn push_slot<T: StackItem>(&mut self, item: T, errored: bool) {
        self.slots.push(Slot {
            frame: item.into_frame(),
            errored,
        });
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.slots.push(Slot {
            frame,
            errored: false,
        });
    }

    /// ## Summary
    /// Pops the top frame as a `T`.
    ///
    /// ## Errors
    /// Returns `StackMismatch` and leaves the stack unchanged if the top frame
    /// holds another kind.
    pub fn pop<T: StackItem>(&mut self) -> RestoreResult<T> {
        self.pop_slot().map(|(item, _)| item)
    }

    /// ## Summary
    /// Pops the top frame as a `T` together with its error mark.
    ///
    /// ## Errors
    /// Returns `StackMismatch` if the top frame holds another kind.
    pub fn pop_slot<T: StackItem>(&mut self) -> RestoreResult<(T, bool)> {
        let Some(slot) = self.slots.pop() else {
            return Err(mismatch::<T>(None));
        };
        match T::from_frame(slot.frame) {
            Ok(item) => Ok((item, slot.errored)),
            Err(frame) => {
                let err = mismatch::<T>(Some(&frame));
                self.slots.push(Slot {
                    frame,
                    errored: slot.errored,
                });
                Err(err)
            }
        }
    }

    /// ## Summary
    /// Borrows the top frame as a `T`.
    ///
    /// ## Errors
    /// Returns `StackMismatch` if the top frame holds another kind.
    pub fn top_mut<T: StackItem>(&mut self) -> RestoreResult<&mut T> {
        let found = self.slots.last().map(|s| s.frame.kind_name());
        self.slots
            .last_mut()
            .and_then(|s| T::frame_mut(&mut s.frame))
            .ok_or(RestoreError::StackMismatch {
                expected: T::KIND,
                found: found.unwrap_or("empty stack"),
            })
    }

    #[must_use]
    pub fn top_is<T: StackItem>(&self) -> bool {
        self.slots
            .last()
            .is_some_and(|s| T::frame_ref(&s.frame).is_some())
    }

    /// Nearest frame of type `T`, searching down from the top.
    pub fn find_mut<T: StackItem>(&mut self) -> Option<&mut T> {
        self.slots
            .iter_mut()
            .rev()
            .find_map(|s| T::frame_mut(&mut s.frame))
    }

    #[must_use]
    pub fn find<T: StackItem>(&self) -> Option<&T> {
        self.slots.iter().rev().find_map(|s| T::frame_ref(&s.frame))
    }

    /// Nearest entity in progress.
    #[must_use]
    pub fn current_entity(&self) -> Option<&EntityFrame> {
        self.slots.iter().rev().find_map(|s| match &s.frame {
            Frame::Entity(e) => Some(e),
            Frame::Value(_) => None,
        })
    }

    pub fn current_entity_mut(&mut self) -> Option<&mut EntityFrame> {
        self.slots.iter_mut().rev().find_map(|s| match &mut s.frame {
            Frame::Entity(e) => Some(e),
            Frame::Value(_) => None,
        })
    }

    /// Ownership fields of the nearest entity that has them.
    pub fn current_owned_mut(&mut self) -> Option<&mut OwnedFields> {
        self.slots.iter_mut().rev().find_map(|s| match &mut s.frame {
            Frame::Entity(e) => e.owned_mut(),
            Frame::Value(_) => None,
        })
    }

    /// Flags the nearest entity so that its commit is skipped.
    pub fn mark_entity_error(&mut self) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .rev()
            .find(|s| matches!(s.frame, Frame::Entity(_)))
        {
            slot.errored = true;
        }
    }

    /// ## Summary
    /// Pops a date-time or string holder left on top by a child element.
    #[must_use]
    pub fn pop_transient_holder(&mut self) -> Option<ValueFrame> {
        let is_holder = self.slots.last().is_some_and(|s| {
            matches!(
                s.frame,
                Frame::Value(ValueFrame::DateTime(_) | ValueFrame::Str(_) | ValueFrame::LongStr(_))
            )
        });
        if !is_holder {
            return None;
        }
        match self.slots.pop() {
            Some(Slot {
                frame: Frame::Value(value),
                ..
            }) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_pop_reports_mismatch() {
        let mut stack = ParseStack::new();
        stack.push(EventEntry::plain());

        let err = stack.pop::<Category>().unwrap_err();
        assert!(matches!(
            err,
            RestoreError::StackMismatch {
                expected: "category",
                found: "event"
            }
        ));
        assert_eq!(stack.len(), 1);
        assert!(stack.pop::<EventEntry>().is_ok());
        assert!(matches!(
            stack.pop::<EventEntry>(),
            Err(RestoreError::StackMismatch {
                found: "empty stack",
                ..
            })
        ));
    }

    #[test]
    fn entity_error_marks_nearest_entity() {
        let mut stack = ParseStack::new();
        stack.push(EventEntry::plain());
        stack.push(DateTimeParts::default());

        stack.mark_entity_error();
        assert!(stack.pop_transient_holder().is_some());

        let (_, errored) = stack.pop_slot::<EventEntry>().unwrap();
        assert!(errored);
    }

    #[test]
    fn find_searches_below_top() {
        let mut stack = ParseStack::new();
        stack.push(Preferences::default());
        stack.push(View::default());

        assert!(stack.top_is::<View>());
        stack.find_mut::<Preferences>().unwrap().email = Some("a@b".into());
        assert!(stack.current_owned_mut().is_some());
        assert_eq!(
            stack.find::<Preferences>().and_then(|p| p.email.as_deref()),
            Some("a@b")
        );
    }
}
