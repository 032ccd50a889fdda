//! Domain records assembled while a dump is parsed.
//!
//! All records are plain mutable values. Cross references are stored as
//! natural keys (principal hrefs, uids, collection paths) once resolved.

pub mod collection;
pub mod event;
pub mod filter;
pub mod owned;
pub mod prefs;
pub mod principal;
pub mod syspars;
pub mod timezone;
pub mod value;
pub mod vocab;

pub use collection::{CalSuite, Collection, CollectionLastmod};
pub use event::{
    Alarm, Attachment, Attendee, EmptyFlags, Event, EventAnnotation, EventEntry, EventKey,
    EventVariant, Geo, Organizer, ProxiedField, RelatedTo, RequestStatus, Xproperty,
};
pub use filter::FilterDef;
pub use owned::{Owned, OwnedFields};
pub use prefs::{Preferences, View};
pub use principal::{AdminGroup, AuthUser, AuthUserPrefs, AutoAddPrefs, User};
pub use syspars::SystemParameters;
pub use timezone::LegacyTimezone;
pub use value::{DateTimeValue, LocalizedString, OwnerUidKey, Property};
pub use vocab::{Category, Contact, Location};
