//! Storage-facing contract consumed by the restore engine.

use calrestore_core::principal::PrincipalKey;
use calrestore_model::{
    AdminGroup, AuthUser, CalSuite, Category, Collection, Contact, EventEntry, EventKey,
    FilterDef, LegacyTimezone, Location, OwnerUidKey, Preferences, SystemParameters, User,
};

use crate::error::SinkResult;

/// Persistence and lookup operations the restore engine drives.
///
/// Every write receives a fully resolved entity. Lookups answer queries for
/// entities restored earlier in the same run.
pub trait RestoreSink {
    fn open(&mut self) -> SinkResult<()>;

    fn close(&mut self) -> SinkResult<()>;

    fn start_transaction(&mut self) -> SinkResult<()>;

    /// ## Summary
    /// Marks the end of one entity. Implementations may defer the commit to
    /// group entities into batches.
    ///
    /// ## Errors
    /// Returns an error if committing fails.
    fn end_transaction(&mut self) -> SinkResult<()> {
        self.end_transaction_now()
    }

    /// Commits whatever is pending.
    fn end_transaction_now(&mut self) -> SinkResult<()>;

    fn rollback(&mut self) -> SinkResult<()>;

    fn restore_syspars(&mut self, syspars: &SystemParameters) -> SinkResult<()>;

    /// Rewrites system parameters changed after their section was restored.
    fn update_syspars(&mut self, syspars: &SystemParameters) -> SinkResult<()>;

    fn restore_user(&mut self, user: &User) -> SinkResult<()>;

    fn restore_admin_group(&mut self, group: &AdminGroup) -> SinkResult<()>;

    /// Attaches a member once both the group and the member exist.
    fn add_admin_group_member(
        &mut self,
        group: &AdminGroup,
        member: &PrincipalKey,
    ) -> SinkResult<()>;

    fn restore_auth_user(&mut self, auth_user: &AuthUser) -> SinkResult<()>;

    fn restore_event(&mut self, entry: &EventEntry) -> SinkResult<()>;

    fn restore_category(&mut self, category: &Category) -> SinkResult<()>;

    fn restore_cal_suite(&mut self, suite: &CalSuite) -> SinkResult<()>;

    fn restore_location(&mut self, location: &Location) -> SinkResult<()>;

    fn restore_contact(&mut self, contact: &Contact) -> SinkResult<()>;

    fn restore_filter(&mut self, filter: &FilterDef) -> SinkResult<()>;

    fn restore_user_prefs(&mut self, prefs: &Preferences) -> SinkResult<()>;

    fn restore_timezone(&mut self, tz: &LegacyTimezone) -> SinkResult<()>;

    /// Stores a collection with no parent.
    fn save_root_calendar(&mut self, collection: &Collection) -> SinkResult<()>;

    /// Stores a collection whose parent path is already set.
    fn add_calendar(&mut self, collection: &Collection) -> SinkResult<()>;

    /// ## Summary
    /// Creates `collection` as a child of `parent_path`, deriving its path
    /// from its name.
    ///
    /// ## Errors
    /// Returns `DuplicateCalendar` when the parent already holds a child of
    /// that name, and `NotFound` when the parent does not exist.
    fn add_calendar_under(
        &mut self,
        collection: &mut Collection,
        parent_path: &str,
    ) -> SinkResult<()>;

    fn get_admin_group(&mut self, account: &str) -> SinkResult<Option<AdminGroup>>;

    fn get_event(&mut self, key: &EventKey) -> SinkResult<Option<EventEntry>>;

    fn get_calendar(&mut self, path: &str) -> SinkResult<Option<Collection>>;

    fn get_category(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Category>>;

    fn get_category_by_uid(&mut self, uid: &str) -> SinkResult<Option<Category>>;

    fn get_contact(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Contact>>;

    fn get_contact_by_uid(&mut self, uid: &str) -> SinkResult<Option<Contact>>;

    fn get_location(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Location>>;

    fn get_location_by_uid(&mut self, uid: &str) -> SinkResult<Option<Location>>;

    fn get_user(&mut self, account: &str) -> SinkResult<Option<User>>;

    /// Path of the user's calendar home.
    fn get_user_home(&mut self, user: &User) -> SinkResult<String>;
}
