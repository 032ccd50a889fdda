//! Turns legacy references into resolved natural keys.
//!
//! Lookups go to the identifier tables first and fall through to the sink.
//! The principal cache only saves sink round trips: a miss always falls
//! through to an authoritative lookup.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use calrestore_core::principal::{PrincipalKey, PrincipalKind, account_of};
use calrestore_model::{Attendee, Organizer, OwnerUidKey, User};

use crate::context::RestoreContext;
use crate::diagnostics::EntityKind;
use crate::error::{RestoreError, RestoreResult};
use crate::tables::PendingMember;

/// Time-bounded memo of principals found through the sink. Cleared wholesale
/// once the flush interval has passed.
#[derive(Debug)]
pub struct PrincipalCache {
    entries: HashMap<String, PrincipalKey>,
    last_flush: Instant,
    interval: Duration,
}

impl PrincipalCache {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            last_flush: Instant::now(),
            interval,
        }
    }

    pub fn get(&mut self, href: &str) -> Option<&PrincipalKey> {
        if self.last_flush.elapsed() > self.interval {
            tracing::trace!(entries = self.entries.len(), "Flushing principal cache");
            self.entries.clear();
            self.last_flush = Instant::now();
            return None;
        }

        self.entries.get(href)
    }

    pub fn insert(&mut self, key: PrincipalKey) {
        self.entries.insert(key.href.clone(), key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RestoreContext<'_> {
    /// ## Summary
    /// Registers a restored principal under its kind and href.
    ///
    /// ## Errors
    /// Returns `DuplicateKey` if the principal was registered before.
    pub fn register_principal(&mut self, key: PrincipalKey, account: &str) -> RestoreResult<()> {
        self.tables.principals.insert(key, account.to_owned())
    }

    /// ## Summary
    /// Checks that a principal exists: principal table, then cache, then sink.
    ///
    /// ## Errors
    /// Returns an error if the sink lookup fails.
    pub fn resolve_principal(&mut self, key: &PrincipalKey) -> RestoreResult<bool> {
        if self.tables.principals.contains(key) {
            return Ok(true);
        }
        if self.principal_cache.get(&key.href).is_some_and(|k| k == key) {
            return Ok(true);
        }
        if self.options.roots.kind_of(&key.href).is_none() {
            return Ok(false);
        }

        let found = match key.kind {
            PrincipalKind::User => self.sink.get_user(key.account())?.is_some(),
            PrincipalKind::Group | PrincipalKind::AdminGroup => {
                self.sink.get_admin_group(key.account())?.is_some()
            }
        };
        if found {
            self.principal_cache.insert(key.clone());
        }

        Ok(found)
    }

    #[must_use]
    pub fn user_by_legacy_id(&self, id: i64) -> Option<User> {
        self.tables.users.get_mapped(id).cloned()
    }

    /// ## Summary
    /// Finds the user a principal href names.
    ///
    /// ## Errors
    /// Returns an error if the sink lookup fails.
    pub fn user_by_href(&mut self, href: &str) -> RestoreResult<Option<User>> {
        let account = account_of(href);
        if let Some(user) = self.tables.users.get_by_account(account) {
            return Ok(Some(user.clone()));
        }
        Ok(self.sink.get_user(account)?)
    }

    /// ## Summary
    /// Calendar home path of the user a principal href names.
    ///
    /// ## Errors
    /// Returns `MissingReference` if no such user exists.
    pub fn user_home(&mut self, href: &str) -> RestoreResult<String> {
        let user = self
            .user_by_href(href)?
            .ok_or_else(|| RestoreError::missing("user", href))?;
        Ok(self.sink.get_user_home(&user)?)
    }

    /// ## Summary
    /// Resolves a category id of dumps before 3.5 to its uid. A miss is
    /// recorded as an error and yields `None`.
    ///
    /// ## Errors
    /// Returns an error if the sink lookup fails.
    pub fn category_uid_by_legacy_id(&mut self, id: i64) -> RestoreResult<Option<String>> {
        let category = match self.tables.categories.get(&id).cloned() {
            Some(key) => self.sink.get_category(&key)?,
            None => None,
        };
        if category.is_none() {
            self.reference_error(format!("Missing category with id {id}"));
        }
        Ok(category.and_then(|c| c.uid))
    }

    /// ## Summary
    /// Resolves a location id of dumps before 3.5 to its uid. A miss is
    /// recorded as an error and yields `None`.
    ///
    /// ## Errors
    /// Returns an error if the sink lookup fails.
    pub fn location_uid_by_legacy_id(&mut self, id: i64) -> RestoreResult<Option<String>> {
        let uid = self.tables.locations.get(&id).cloned();
        let location = match &uid {
            Some(uid) => self.sink.get_location_by_uid(uid)?,
            None => None,
        };
        if location.is_none() {
            self.reference_error(format!(
                "Missing location with id {id} (uid {})",
                uid.as_deref().unwrap_or("unknown")
            ));
        }
        Ok(location.and_then(|l| l.uid))
    }

    /// ## Summary
    /// Resolves a contact id of dumps before 3.5 to its uid. Contacts were
    /// dropped and renamed across releases, so a miss is only a warning.
    ///
    /// ## Errors
    /// Returns an error if the sink lookup fails.
    pub fn contact_uid_by_legacy_id(&mut self, id: i64) -> RestoreResult<Option<String>> {
        let uid = self.tables.contacts.get(&id).cloned();
        let contact = match &uid {
            Some(uid) => self.sink.get_contact_by_uid(uid)?,
            None => None,
        };
        if contact.is_none() {
            self.warn(format!(
                "Missing contact with id {id} (uid {})",
                uid.as_deref().unwrap_or("unknown")
            ));
        }
        Ok(contact.and_then(|c| c.uid))
    }

    /// ## Summary
    /// Resolves an owner plus uid location key to the stored uid.
    ///
    /// ## Errors
    /// Returns an error if the sink lookup fails.
    pub fn location_uid_by_key(&mut self, key: &OwnerUidKey) -> RestoreResult<Option<String>> {
        if let Some(uid) = self.tables.location_uids.get(key) {
            return Ok(Some(uid.clone()));
        }
        let uid = self.sink.get_location(key)?.and_then(|l| l.uid);
        if uid.is_none() {
            self.reference_error(format!("Missing location {key}"));
        }
        Ok(uid)
    }

    /// ## Summary
    /// Resolves an owner plus uid contact key to the stored uid.
    ///
    /// ## Errors
    /// Returns an error if the sink lookup fails.
    pub fn contact_uid_by_key(&mut self, key: &OwnerUidKey) -> RestoreResult<Option<String>> {
        if let Some(uid) = self.tables.contact_uids.get(key) {
            return Ok(Some(uid.clone()));
        }
        let uid = self.sink.get_contact(key)?.and_then(|c| c.uid);
        if uid.is_none() {
            self.warn(format!("Missing contact {key}"));
        }
        Ok(uid)
    }

    /// ## Errors
    /// Returns `MissingReference` if no organizer was registered with `id`.
    pub fn organizer_by_legacy_id(&self, id: i64) -> RestoreResult<Organizer> {
        self.tables
            .organizers
            .get(&id)
            .cloned()
            .ok_or_else(|| RestoreError::missing("organizer", id))
    }

    /// ## Errors
    /// Returns `MissingReference` if no attendee was registered with `id`.
    pub fn attendee_by_legacy_id(&self, id: i64) -> RestoreResult<Attendee> {
        self.tables
            .attendees
            .get(&id)
            .cloned()
            .ok_or_else(|| RestoreError::missing("attendee", id))
    }

    /// ## Summary
    /// Attaches group members recorded while the admin groups were read. Runs
    /// after the whole document so members may appear in any order.
    ///
    /// ## Errors
    /// Returns an error if a sink call fails.
    pub(crate) fn attach_pending_members(&mut self) -> RestoreResult<()> {
        let pending: Vec<(String, Vec<PendingMember>)> = self
            .tables
            .admin_group_members
            .iter()
            .map(|(group, members)| (group.clone(), members.clone()))
            .collect();

        for (group_account, members) in pending {
            let Some(group) = self.sink.get_admin_group(&group_account)? else {
                self.diags.error(
                    Some(EntityKind::AdminGroup),
                    format!("Missing admin group {group_account} for its members"),
                );
                continue;
            };

            for member in members {
                let key = match member {
                    PendingMember::Key(key) => key,
                    PendingMember::LegacyUserId(id) => match self.user_by_legacy_id(id) {
                        Some(user) => user.key(),
                        None => {
                            self.diags.error(
                                Some(EntityKind::AdminGroup),
                                format!(
                                    "Missing user with id {id} for admin group {group_account}"
                                ),
                            );
                            continue;
                        }
                    },
                };

                if !self.resolve_principal(&key)? {
                    self.diags.error(
                        Some(EntityKind::AdminGroup),
                        format!("Missing member {key} for admin group {group_account}"),
                    );
                    continue;
                }

                tracing::debug!(group = %group_account, member = %key, "Adding admin group member");
                self.sink.add_admin_group_member(&group, &key)?;
                self.sink.end_transaction()?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RestoreOptions;
    use crate::memory::MemorySink;
    use crate::sink::RestoreSink;
    use crate::timezone::ChronoTzRegistry;
    use calrestore_model::Location;

    #[test]
    fn cache_flushes_after_interval() {
        let mut cache = PrincipalCache::new(Duration::ZERO);
        cache.insert(PrincipalKey::new(PrincipalKind::User, "/principals/users/a"));
        std::thread::sleep(Duration::from_millis(2));

        assert!(cache.get("/principals/users/a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn principal_miss_falls_through_to_sink() {
        let mut sink = MemorySink::new();
        sink.restore_user(&User {
            account: "alice".into(),
            principal_ref: "/principals/users/alice".into(),
            ..User::default()
        })
        .unwrap();
        let mut tz = ChronoTzRegistry::new();
        let mut ctx = RestoreContext::new(RestoreOptions::default(), &mut sink, &mut tz);

        let alice = ctx.principal_key(PrincipalKind::User, "alice");
        assert!(ctx.resolve_principal(&alice).unwrap());
        assert_eq!(ctx.principal_cache.len(), 1);

        let bob = ctx.principal_key(PrincipalKind::User, "bob");
        assert!(!ctx.resolve_principal(&bob).unwrap());
    }

    #[test_log::test]
    fn location_miss_is_error_contact_miss_is_warning() {
        let mut sink = MemorySink::new();
        sink.restore_location(&Location {
            uid: Some("loc-1".into()),
            ..Location::default()
        })
        .unwrap();
        let mut tz = ChronoTzRegistry::new();
        let mut ctx = RestoreContext::new(RestoreOptions::default(), &mut sink, &mut tz);
        ctx.tables.locations.insert(3, "loc-1".into()).unwrap();

        assert_eq!(ctx.location_uid_by_legacy_id(3).unwrap().as_deref(), Some("loc-1"));
        assert!(ctx.location_uid_by_legacy_id(4).unwrap().is_none());
        assert!(ctx.contact_uid_by_legacy_id(7).unwrap().is_none());

        let report = ctx.diags.report();
        assert_eq!(report.errors, 1);
        assert_eq!(report.warnings, 1);
    }

    #[test]
    fn legacy_organizer_miss_is_entity_level() {
        let mut sink = MemorySink::new();
        let mut tz = ChronoTzRegistry::new();
        let ctx = RestoreContext::new(RestoreOptions::default(), &mut sink, &mut tz);

        let err = ctx.organizer_by_legacy_id(12).unwrap_err();
        assert!(!err.is_fatal());
    }
}
