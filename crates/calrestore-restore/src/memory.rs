//! In-memory [`RestoreSink`] for dry runs and tests.

use std::collections::BTreeMap;

use calrestore_core::principal::PrincipalKey;
use calrestore_model::{
    AdminGroup, AuthUser, CalSuite, Category, Collection, Contact, EventEntry, EventKey,
    FilterDef, LegacyTimezone, Location, OwnerUidKey, Preferences, SystemParameters, User,
};

use crate::error::{SinkError, SinkResult};
use crate::sink::RestoreSink;

/// Keeps every restored entity in ordered maps.
///
/// Commits and rollbacks are only counted. Nothing written is discarded on
/// rollback, so a failed run can still be inspected.
#[derive(Debug, Default)]
pub struct MemorySink {
    open: bool,
    commits: u64,
    rollbacks: u64,
    syspars: Option<SystemParameters>,
    syspars_updates: u64,
    users: BTreeMap<String, User>,
    admin_groups: BTreeMap<String, AdminGroup>,
    auth_users: Vec<AuthUser>,
    collections: BTreeMap<String, Collection>,
    cal_suites: BTreeMap<String, CalSuite>,
    categories: BTreeMap<String, Category>,
    locations: BTreeMap<String, Location>,
    contacts: BTreeMap<String, Contact>,
    events: Vec<EventEntry>,
    filters: Vec<FilterDef>,
    preferences: BTreeMap<String, Preferences>,
    timezones: Vec<LegacyTimezone>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn commits(&self) -> u64 {
        self.commits
    }

    #[must_use]
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks
    }

    #[must_use]
    pub fn syspars(&self) -> Option<&SystemParameters> {
        self.syspars.as_ref()
    }

    /// Times the system parameters were rewritten after their first restore.
    #[must_use]
    pub fn syspars_updates(&self) -> u64 {
        self.syspars_updates
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    #[must_use]
    pub fn user(&self, account: &str) -> Option<&User> {
        self.users.get(account)
    }

    pub fn admin_groups(&self) -> impl Iterator<Item = &AdminGroup> {
        self.admin_groups.values()
    }

    #[must_use]
    pub fn admin_group(&self, account: &str) -> Option<&AdminGroup> {
        self.admin_groups.get(account)
    }

    #[must_use]
    pub fn auth_users(&self) -> &[AuthUser] {
        &self.auth_users
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    #[must_use]
    pub fn collection(&self, path: &str) -> Option<&Collection> {
        self.collections.get(path)
    }

    pub fn cal_suites(&self) -> impl Iterator<Item = &CalSuite> {
        self.cal_suites.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    #[must_use]
    pub fn events(&self) -> &[EventEntry] {
        &self.events
    }

    /// First restored entry whose event has `uid`.
    #[must_use]
    pub fn event_by_uid(&self, uid: &str) -> Option<&EventEntry> {
        self.events
            .iter()
            .find(|e| e.event().uid.as_deref() == Some(uid))
    }

    #[must_use]
    pub fn filters(&self) -> &[FilterDef] {
        &self.filters
    }

    #[must_use]
    pub fn preferences(&self, owner_href: &str) -> Option<&Preferences> {
        self.preferences.get(owner_href)
    }

    #[must_use]
    pub fn timezones(&self) -> &[LegacyTimezone] {
        &self.timezones
    }

    fn store_collection(&mut self, collection: &Collection) -> SinkResult<()> {
        if self.collections.contains_key(&collection.path) {
            return Err(SinkError::DuplicateCalendar(collection.path.clone()));
        }
        self.collections
            .insert(collection.path.clone(), collection.clone());
        Ok(())
    }

    fn keyed<T: Clone>(
        map: &BTreeMap<String, T>,
        key: &OwnerUidKey,
        key_of: impl Fn(&T) -> Option<OwnerUidKey>,
    ) -> Option<T> {
        map.get(&key.uid)
            .filter(|item| key_of(item).as_ref() == Some(key))
            .cloned()
    }
}

fn uid_of(uid: Option<&String>, kind: &str) -> SinkResult<String> {
    uid.cloned()
        .ok_or_else(|| SinkError::Storage(format!("{kind} without uid")))
}

fn matches_key(entry_col: Option<&str>, uid: Option<&str>, rid: Option<&str>, key: &EventKey) -> bool {
    entry_col == key.col_path.as_deref()
        && uid == key.uid.as_deref()
        && rid == key.recurrence_id.as_deref()
}

impl RestoreSink for MemorySink {
    fn open(&mut self) -> SinkResult<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> SinkResult<()> {
        self.open = false;
        Ok(())
    }

    fn start_transaction(&mut self) -> SinkResult<()> {
        if !self.open {
            return Err(SinkError::Transaction("sink is not open".into()));
        }
        Ok(())
    }

    fn end_transaction_now(&mut self) -> SinkResult<()> {
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> SinkResult<()> {
        self.rollbacks += 1;
        Ok(())
    }

    fn restore_syspars(&mut self, syspars: &SystemParameters) -> SinkResult<()> {
        self.syspars = Some(syspars.clone());
        Ok(())
    }

    fn update_syspars(&mut self, syspars: &SystemParameters) -> SinkResult<()> {
        self.syspars = Some(syspars.clone());
        self.syspars_updates += 1;
        Ok(())
    }

    fn restore_user(&mut self, user: &User) -> SinkResult<()> {
        self.users.insert(user.account.clone(), user.clone());
        Ok(())
    }

    fn restore_admin_group(&mut self, group: &AdminGroup) -> SinkResult<()> {
        self.admin_groups
            .insert(group.account.clone(), group.clone());
        Ok(())
    }

    fn add_admin_group_member(
        &mut self,
        group: &AdminGroup,
        member: &PrincipalKey,
    ) -> SinkResult<()> {
        let stored = self
            .admin_groups
            .get_mut(&group.account)
            .ok_or_else(|| SinkError::NotFound(format!("admin group {}", group.account)))?;
        if !stored.members.contains(member) {
            stored.members.push(member.clone());
        }
        Ok(())
    }

    fn restore_auth_user(&mut self, auth_user: &AuthUser) -> SinkResult<()> {
        self.auth_users.push(auth_user.clone());
        Ok(())
    }

    fn restore_event(&mut self, entry: &EventEntry) -> SinkResult<()> {
        self.events.push(entry.clone());
        Ok(())
    }

    fn restore_category(&mut self, category: &Category) -> SinkResult<()> {
        let uid = uid_of(category.uid.as_ref(), "category")?;
        self.categories.insert(uid, category.clone());
        Ok(())
    }

    fn restore_cal_suite(&mut self, suite: &CalSuite) -> SinkResult<()> {
        self.cal_suites.insert(suite.name.clone(), suite.clone());
        Ok(())
    }

    fn restore_location(&mut self, location: &Location) -> SinkResult<()> {
        let uid = uid_of(location.uid.as_ref(), "location")?;
        self.locations.insert(uid, location.clone());
        Ok(())
    }

    fn restore_contact(&mut self, contact: &Contact) -> SinkResult<()> {
        let uid = uid_of(contact.uid.as_ref(), "contact")?;
        self.contacts.insert(uid, contact.clone());
        Ok(())
    }

    fn restore_filter(&mut self, filter: &FilterDef) -> SinkResult<()> {
        self.filters.push(filter.clone());
        Ok(())
    }

    fn restore_user_prefs(&mut self, prefs: &Preferences) -> SinkResult<()> {
        let owner = prefs
            .owned
            .owner_href
            .clone()
            .ok_or_else(|| SinkError::Storage("preferences without owner".into()))?;
        self.preferences.insert(owner, prefs.clone());
        Ok(())
    }

    fn restore_timezone(&mut self, tz: &LegacyTimezone) -> SinkResult<()> {
        self.timezones.push(tz.clone());
        Ok(())
    }

    fn save_root_calendar(&mut self, collection: &Collection) -> SinkResult<()> {
        self.store_collection(collection)
    }

    fn add_calendar(&mut self, collection: &Collection) -> SinkResult<()> {
        let parent = collection
            .parent_path()
            .ok_or_else(|| SinkError::NotFound(format!("parent of {}", collection.path)))?;
        if !self.collections.contains_key(parent) {
            return Err(SinkError::NotFound(format!("collection {parent}")));
        }
        self.store_collection(collection)
    }

    fn add_calendar_under(
        &mut self,
        collection: &mut Collection,
        parent_path: &str,
    ) -> SinkResult<()> {
        if !self.collections.contains_key(parent_path) {
            return Err(SinkError::NotFound(format!("collection {parent_path}")));
        }
        let path = format!("{}/{}", parent_path.trim_end_matches('/'), collection.name);
        if self.collections.contains_key(&path) {
            return Err(SinkError::DuplicateCalendar(path));
        }

        collection.path = path;
        collection.owned.col_path = Some(parent_path.to_owned());
        self.store_collection(collection)
    }

    fn get_admin_group(&mut self, account: &str) -> SinkResult<Option<AdminGroup>> {
        Ok(self.admin_groups.get(account).cloned())
    }

    fn get_event(&mut self, key: &EventKey) -> SinkResult<Option<EventEntry>> {
        let found = self.events.iter().find(|entry| {
            let event = entry.event();
            matches_key(
                event.owned.col_path.as_deref(),
                event.uid.as_deref(),
                event.recurrence_id.as_deref(),
                key,
            ) || entry.overrides.iter().any(|ov| {
                matches_key(
                    event.owned.col_path.as_deref(),
                    event.uid.as_deref(),
                    ov.event.recurrence_id.as_deref(),
                    key,
                )
            })
        });
        Ok(found.cloned())
    }

    fn get_calendar(&mut self, path: &str) -> SinkResult<Option<Collection>> {
        Ok(self.collections.get(path).cloned())
    }

    fn get_category(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Category>> {
        Ok(Self::keyed(&self.categories, key, Category::owner_uid_key))
    }

    fn get_category_by_uid(&mut self, uid: &str) -> SinkResult<Option<Category>> {
        Ok(self.categories.get(uid).cloned())
    }

    fn get_contact(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Contact>> {
        Ok(Self::keyed(&self.contacts, key, Contact::owner_uid_key))
    }

    fn get_contact_by_uid(&mut self, uid: &str) -> SinkResult<Option<Contact>> {
        Ok(self.contacts.get(uid).cloned())
    }

    fn get_location(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Location>> {
        Ok(Self::keyed(&self.locations, key, Location::owner_uid_key))
    }

    fn get_location_by_uid(&mut self, uid: &str) -> SinkResult<Option<Location>> {
        Ok(self.locations.get(uid).cloned())
    }

    fn get_user(&mut self, account: &str) -> SinkResult<Option<User>> {
        Ok(self.users.get(account).cloned())
    }

    fn get_user_home(&mut self, user: &User) -> SinkResult<String> {
        let root = self
            .syspars
            .as_ref()
            .map_or("user", SystemParameters::user_calendar_root);
        Ok(format!("/{}/{}", root.trim_matches('/'), user.account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calrestore_model::OwnedFields;

    fn collection(path: &str, parent: Option<&str>) -> Collection {
        Collection {
            name: path.rsplit('/').next().unwrap_or_default().to_owned(),
            path: path.into(),
            owned: OwnedFields {
                col_path: parent.map(str::to_owned),
                ..OwnedFields::default()
            },
            ..Collection::default()
        }
    }

    #[test]
    fn child_requires_parent() {
        let mut sink = MemorySink::new();
        assert!(matches!(
            sink.add_calendar(&collection("/user/alice", Some("/user"))),
            Err(SinkError::NotFound(_))
        ));

        sink.save_root_calendar(&collection("/user", None)).unwrap();
        sink.add_calendar(&collection("/user/alice", Some("/user")))
            .unwrap();
        assert!(sink.collection("/user/alice").is_some());
    }

    #[test]
    fn add_under_detects_name_clash() {
        let mut sink = MemorySink::new();
        sink.save_root_calendar(&collection("/user", None)).unwrap();

        let mut alias = Collection {
            name: "Team".into(),
            ..Collection::default()
        };
        sink.add_calendar_under(&mut alias, "/user").unwrap();
        assert_eq!(alias.path, "/user/Team");
        assert_eq!(alias.owned.col_path.as_deref(), Some("/user"));

        let mut again = Collection {
            name: "Team".into(),
            ..Collection::default()
        };
        assert!(matches!(
            sink.add_calendar_under(&mut again, "/user"),
            Err(SinkError::DuplicateCalendar(_))
        ));
    }

    #[test]
    fn home_follows_syspars_root() {
        let mut sink = MemorySink::new();
        let user = User {
            account: "alice".into(),
            ..User::default()
        };
        assert_eq!(sink.get_user_home(&user).unwrap(), "/user/alice");

        sink.restore_syspars(&SystemParameters {
            user_calendar_root: Some("home".into()),
            ..SystemParameters::default()
        })
        .unwrap();
        assert_eq!(sink.get_user_home(&user).unwrap(), "/home/alice");
    }

    #[test]
    fn owner_uid_lookup_checks_owner() {
        let mut sink = MemorySink::new();
        sink.restore_category(&Category {
            uid: Some("c1".into()),
            owned: OwnedFields {
                owner_href: Some("/principals/users/alice".into()),
                ..OwnedFields::default()
            },
            ..Category::default()
        })
        .unwrap();

        let hit = OwnerUidKey::new("/principals/users/alice", "c1");
        let miss = OwnerUidKey::new("/principals/users/bob", "c1");
        assert!(sink.get_category(&hit).unwrap().is_some());
        assert!(sink.get_category(&miss).unwrap().is_none());
    }
}
