//! Identifier tables built up over one restore run.
//!
//! Tables only grow. Inserting a key twice is run-fatal: it means the dump is
//! corrupt or out of order and cannot be repaired safely.

use std::collections::BTreeMap;
use std::fmt::Display;

use calrestore_core::principal::PrincipalKey;
use calrestore_model::{Attendee, Organizer, OwnerUidKey, User};

use crate::error::{RestoreError, RestoreResult};

/// Map that rejects duplicate keys.
#[derive(Debug)]
pub struct KeyedTable<K, V> {
    name: &'static str,
    entries: BTreeMap<K, V>,
}

impl<K: Ord + Display, V> KeyedTable<K, V> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
        }
    }

    /// ## Summary
    /// Registers a value under a key seen for the first time.
    ///
    /// ## Errors
    /// Returns `DuplicateKey` if the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> RestoreResult<()> {
        if self.entries.contains_key(&key) {
            return Err(RestoreError::DuplicateKey {
                table: self.name,
                key: key.to_string(),
            });
        }
        self.entries.insert(key, value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
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

/// Restored users by surrogate id and by account.
#[derive(Debug)]
pub struct UserTable {
    legacy_user0_id: i64,
    by_id: KeyedTable<i64, String>,
    by_account: KeyedTable<String, User>,
}

impl UserTable {
    #[must_use]
    pub fn new(legacy_user0_id: i64) -> Self {
        Self {
            legacy_user0_id,
            by_id: KeyedTable::new("user ids"),
            by_account: KeyedTable::new("user accounts"),
        }
    }

    /// ## Summary
    /// Registers a restored user.
    ///
    /// ## Errors
    /// Returns `DuplicateKey` if the id or account was registered before.
    pub fn register(&mut self, user: &User) -> RestoreResult<()> {
        if let Some(id) = user.id {
            self.by_id.insert(id, user.account.clone())?;
        }
        self.by_account.insert(user.account.clone(), user.clone())
    }

    /// ## Summary
    /// Looks a user up by the id a reference carries. Early dumps referred to
    /// the first user as id 0 although it was stored under another id, so 0
    /// is read as the configured sentinel.
    #[must_use]
    pub fn get_mapped(&self, id: i64) -> Option<&User> {
        let id = if id == 0 { self.legacy_user0_id } else { id };
        self.by_id
            .get(&id)
            .and_then(|account| self.by_account.get(account))
    }

    #[must_use]
    pub fn get_by_account(&self, account: &str) -> Option<&User> {
        self.by_account.entries.get(account)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_account.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_account.is_empty()
    }
}

/// What a restored collection path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub owner_href: Option<String>,
    pub cal_type: i32,
}

/// A group member waiting for the post-pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMember {
    Key(PrincipalKey),
    /// User id of a member element in dumps before 3.3.
    LegacyUserId(i64),
}

/// Every identifier table of one run.
#[derive(Debug)]
pub struct IdentifierTables {
    pub users: UserTable,
    /// Resolved principals by kind and href, mapped to their account.
    pub principals: KeyedTable<PrincipalKey, String>,
    pub categories: KeyedTable<i64, OwnerUidKey>,
    pub locations: KeyedTable<i64, String>,
    pub location_uids: KeyedTable<OwnerUidKey, String>,
    pub contacts: KeyedTable<i64, String>,
    pub contact_uids: KeyedTable<OwnerUidKey, String>,
    pub organizers: KeyedTable<i64, Organizer>,
    pub attendees: KeyedTable<i64, Attendee>,
    pub calendars: KeyedTable<String, CollectionSummary>,
    /// Members by group account, in document order.
    pub admin_group_members: BTreeMap<String, Vec<PendingMember>>,
}

impl IdentifierTables {
    #[must_use]
    pub fn new(legacy_user0_id: i64) -> Self {
        Self {
            users: UserTable::new(legacy_user0_id),
            principals: KeyedTable::new("principals"),
            categories: KeyedTable::new("categories"),
            locations: KeyedTable::new("locations"),
            location_uids: KeyedTable::new("location keys"),
            contacts: KeyedTable::new("contacts"),
            contact_uids: KeyedTable::new("contact keys"),
            organizers: KeyedTable::new("organizers"),
            attendees: KeyedTable::new("attendees"),
            calendars: KeyedTable::new("calendars"),
            admin_group_members: BTreeMap::new(),
        }
    }

    pub fn add_pending_member(&mut self, group_account: &str, member: PendingMember) {
        self.admin_group_members
            .entry(group_account.to_owned())
            .or_default()
            .push(member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, account: &str) -> User {
        User {
            id: Some(id),
            account: account.into(),
            principal_ref: format!("/principals/users/{account}"),
            ..User::default()
        }
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut table: KeyedTable<i64, String> = KeyedTable::new("locations");
        table.insert(7, "loc-7".into()).unwrap();

        let err = table.insert(7, "again".into()).unwrap_err();
        assert!(matches!(
            err,
            RestoreError::DuplicateKey { table: "locations", ref key } if key == "7"
        ));
        assert!(err.is_fatal());
        assert_eq!(table.get(&7).map(String::as_str), Some("loc-7"));
    }

    #[test]
    fn user_zero_reads_as_sentinel() {
        let mut users = UserTable::new(1);
        users.register(&user(1, "admin")).unwrap();
        users.register(&user(5, "alice")).unwrap();

        assert_eq!(users.get_mapped(0).map(|u| u.account.as_str()), Some("admin"));
        assert_eq!(users.get_mapped(5).map(|u| u.account.as_str()), Some("alice"));
        assert!(users.get_mapped(9).is_none());
        assert!(users.get_by_account("alice").is_some());
    }

    #[test]
    fn duplicate_account_is_rejected() {
        let mut users = UserTable::new(1);
        users.register(&user(1, "alice")).unwrap();

        assert!(users.register(&user(2, "alice")).is_err());
    }
}
