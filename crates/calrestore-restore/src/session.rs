//! Transaction batching around any [`RestoreSink`].

use calrestore_core::principal::PrincipalKey;
use calrestore_model::{
    AdminGroup, AuthUser, CalSuite, Category, Collection, Contact, EventEntry, EventKey,
    FilterDef, LegacyTimezone, Location, OwnerUidKey, Preferences, SystemParameters, User,
};

use crate::error::SinkResult;
use crate::sink::RestoreSink;

/// Wraps a sink and commits every `batch_size` entities instead of after each
/// one. A batch size of zero commits after every entity.
///
/// Batching only moves commit points. Calls reach the inner sink in the
/// order they are made.
pub struct BatchingSession<S> {
    inner: S,
    batch_size: usize,
    pending: usize,
    commits: u64,
}

impl<S: RestoreSink> BatchingSession<S> {
    #[must_use]
    pub fn new(inner: S, batch_size: usize) -> Self {
        Self {
            inner,
            batch_size,
            pending: 0,
            commits: 0,
        }
    }

    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Commits issued against the inner sink so far.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.commits
    }

    fn commit(&mut self) -> SinkResult<()> {
        self.inner.end_transaction_now()?;
        self.commits += 1;
        self.pending = 0;
        tracing::trace!(commits = self.commits, "Batch committed");
        self.inner.start_transaction()
    }
}

macro_rules! delegate {
    ($($name:ident(&mut self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)+) => {
        $(
            fn $name(&mut self $(, $arg: $ty)*) -> $ret {
                self.inner.$name($($arg),*)
            }
        )+
    };
}

impl<S: RestoreSink> RestoreSink for BatchingSession<S> {
    fn end_transaction(&mut self) -> SinkResult<()> {
        self.pending += 1;
        if self.batch_size == 0 || self.pending >= self.batch_size {
            self.commit()?;
        }
        Ok(())
    }

    fn end_transaction_now(&mut self) -> SinkResult<()> {
        self.inner.end_transaction_now()?;
        if self.pending > 0 {
            self.commits += 1;
        }
        self.pending = 0;
        Ok(())
    }

    fn rollback(&mut self) -> SinkResult<()> {
        self.pending = 0;
        self.inner.rollback()
    }

    delegate! {
        open(&mut self) -> SinkResult<()>;
        close(&mut self) -> SinkResult<()>;
        start_transaction(&mut self) -> SinkResult<()>;
        restore_syspars(&mut self, syspars: &SystemParameters) -> SinkResult<()>;
        update_syspars(&mut self, syspars: &SystemParameters) -> SinkResult<()>;
        restore_user(&mut self, user: &User) -> SinkResult<()>;
        restore_admin_group(&mut self, group: &AdminGroup) -> SinkResult<()>;
        add_admin_group_member(&mut self, group: &AdminGroup, member: &PrincipalKey) -> SinkResult<()>;
        restore_auth_user(&mut self, auth_user: &AuthUser) -> SinkResult<()>;
        restore_event(&mut self, entry: &EventEntry) -> SinkResult<()>;
        restore_category(&mut self, category: &Category) -> SinkResult<()>;
        restore_cal_suite(&mut self, suite: &CalSuite) -> SinkResult<()>;
        restore_location(&mut self, location: &Location) -> SinkResult<()>;
        restore_contact(&mut self, contact: &Contact) -> SinkResult<()>;
        restore_filter(&mut self, filter: &FilterDef) -> SinkResult<()>;
        restore_user_prefs(&mut self, prefs: &Preferences) -> SinkResult<()>;
        restore_timezone(&mut self, tz: &LegacyTimezone) -> SinkResult<()>;
        save_root_calendar(&mut self, collection: &Collection) -> SinkResult<()>;
        add_calendar(&mut self, collection: &Collection) -> SinkResult<()>;
        add_calendar_under(&mut self, collection: &mut Collection, parent_path: &str) -> SinkResult<()>;
        get_admin_group(&mut self, account: &str) -> SinkResult<Option<AdminGroup>>;
        get_event(&mut self, key: &EventKey) -> SinkResult<Option<EventEntry>>;
        get_calendar(&mut self, path: &str) -> SinkResult<Option<Collection>>;
        get_category(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Category>>;
        get_category_by_uid(&mut self, uid: &str) -> SinkResult<Option<Category>>;
        get_contact(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Contact>>;
        get_contact_by_uid(&mut self, uid: &str) -> SinkResult<Option<Contact>>;
        get_location(&mut self, key: &OwnerUidKey) -> SinkResult<Option<Location>>;
        get_location_by_uid(&mut self, uid: &str) -> SinkResult<Option<Location>>;
        get_user(&mut self, account: &str) -> SinkResult<Option<User>>;
        get_user_home(&mut self, user: &User) -> SinkResult<String>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySink;

    fn user(account: &str) -> User {
        User {
            account: account.into(),
            principal_ref: format!("/principals/users/{account}"),
            ..User::default()
        }
    }

    #[test]
    fn commits_every_batch() {
        let mut session = BatchingSession::new(MemorySink::new(), 2);
        session.open().unwrap();
        session.start_transaction().unwrap();

        for account in ["a", "b", "c"] {
            session.restore_user(&user(account)).unwrap();
            session.end_transaction().unwrap();
        }
        assert_eq!(session.commits(), 1);

        session.end_transaction_now().unwrap();
        assert_eq!(session.commits(), 2);
        assert_eq!(session.inner().users().count(), 3);
    }

    #[test]
    fn zero_batch_commits_each_entity() {
        let mut session = BatchingSession::new(MemorySink::new(), 0);
        session.start_transaction().unwrap();

        session.restore_user(&user("a")).unwrap();
        session.end_transaction().unwrap();
        session.restore_user(&user("b")).unwrap();
        session.end_transaction().unwrap();

        assert_eq!(session.commits(), 2);
    }
}
