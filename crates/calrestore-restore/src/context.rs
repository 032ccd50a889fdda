//! Per-run state handed to every rule.

use std::time::Duration;

use calrestore_core::config::Settings;
use calrestore_core::constants;
use calrestore_core::principal::{PrincipalKey, PrincipalKind, PrincipalRoots};
use calrestore_core::version::VersionContext;
use calrestore_model::SystemParameters;

use crate::diagnostics::{Diagnostics, EntityKind};
use crate::error::{RestoreError, RestoreResult};
use crate::resolver::PrincipalCache;
use crate::sink::RestoreSink;
use crate::stack::ParseStack;
use crate::subscriptions::SubscriptionsMap;
use crate::tables::IdentifierTables;
use crate::timezone::TimezoneRegistry;

/// Options of one restore run.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub roots: PrincipalRoots,
    pub fail_on_error: bool,
    pub public_user: String,
    pub admin_groups_id_prefix: String,
    pub legacy_user0_id: i64,
    pub principal_cache_flush: Duration,
    pub eliminate_private_timezones: bool,
    pub default_public_access: String,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            roots: PrincipalRoots::default(),
            fail_on_error: false,
            public_user: constants::DEFAULT_PUBLIC_USER.to_owned(),
            admin_groups_id_prefix: constants::DEFAULT_ADMIN_GROUPS_ID_PREFIX.to_owned(),
            legacy_user0_id: constants::DEFAULT_LEGACY_USER0_ID,
            principal_cache_flush: Duration::from_secs(
                constants::DEFAULT_PRINCIPAL_CACHE_FLUSH_SECS,
            ),
            eliminate_private_timezones: true,
            default_public_access: constants::DEFAULT_PUBLIC_ACCESS.to_owned(),
        }
    }
}

impl From<&Settings> for RestoreOptions {
    fn from(settings: &Settings) -> Self {
        let restore = &settings.restore;
        Self {
            roots: PrincipalRoots::from(&settings.roots),
            fail_on_error: restore.fail_on_error,
            public_user: restore.public_user.clone(),
            admin_groups_id_prefix: restore.admin_groups_id_prefix.clone(),
            legacy_user0_id: restore.legacy_user0_id,
            principal_cache_flush: Duration::from_secs(restore.principal_cache_flush_secs),
            eliminate_private_timezones: restore.eliminate_private_timezones,
            default_public_access: restore.default_public_access.clone(),
        }
    }
}

/// Which auth-user preference block the parser is inside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefsFlags {
    pub category: bool,
    pub collection: bool,
    pub contact: bool,
    pub location: bool,
}

/// Everything a rule may read or change. One instance per run.
pub struct RestoreContext<'s> {
    pub options: RestoreOptions,
    pub version: VersionContext,
    pub tables: IdentifierTables,
    pub principal_cache: PrincipalCache,
    pub subscriptions: SubscriptionsMap,
    pub diags: Diagnostics,
    pub stack: ParseStack,
    /// Active system parameters, replaced when the syspars section is read.
    pub syspars: SystemParameters,
    pub default_syspars: SystemParameters,
    /// Root users were added after syspars were restored.
    pub root_users_changed: bool,
    pub public_user_href: Option<String>,
    /// Inside an owner, creator or member key element.
    pub in_owner_key: bool,
    pub prefs: PrefsFlags,
    pub section: Option<String>,
    pub sink: &'s mut dyn RestoreSink,
    pub tz: &'s mut dyn TimezoneRegistry,
}

impl<'s> RestoreContext<'s> {
    pub fn new(
        options: RestoreOptions,
        sink: &'s mut dyn RestoreSink,
        tz: &'s mut dyn TimezoneRegistry,
    ) -> Self {
        let mut default_syspars = SystemParameters::builtin_defaults();
        default_syspars.public_user = Some(options.public_user.clone());

        Self {
            tables: IdentifierTables::new(options.legacy_user0_id),
            principal_cache: PrincipalCache::new(options.principal_cache_flush),
            version: VersionContext::new(),
            subscriptions: SubscriptionsMap::default(),
            diags: Diagnostics::new(),
            stack: ParseStack::new(),
            syspars: default_syspars.clone(),
            default_syspars,
            root_users_changed: false,
            public_user_href: None,
            in_owner_key: false,
            prefs: PrefsFlags::default(),
            section: None,
            options,
            sink,
            tz,
        }
    }

    #[must_use]
    pub fn is_before(&self, major: u32, minor: u32) -> bool {
        self.version.is_before(major, minor)
    }

    #[must_use]
    pub fn is_at_or_after(&self, major: u32, minor: u32) -> bool {
        self.version.is_at_or_after(major, minor)
    }

    /// Kind of the entity in progress.
    #[must_use]
    pub fn current_kind(&self) -> Option<EntityKind> {
        self.stack.current_entity().map(crate::stack::EntityFrame::kind)
    }

    fn located(&self, text: &str) -> String {
        match self.stack.current_entity() {
            Some(entity) => format!("{}: {text}", entity.describe()),
            None => text.to_owned(),
        }
    }

    pub fn warn(&mut self, text: impl AsRef<str>) {
        let text = self.located(text.as_ref());
        let kind = self.current_kind();
        self.diags.warn(kind, text);
    }

    /// Records an error without affecting the entity in progress.
    pub fn error(&mut self, text: impl AsRef<str>) {
        let text = self.located(text.as_ref());
        let kind = self.current_kind();
        self.diags.error(kind, text);
    }

    /// Records an error and excludes the entity in progress from the sink.
    pub fn entity_error(&mut self, err: &RestoreError) {
        self.error(err.to_string());
        self.stack.mark_entity_error();
    }

    /// ## Summary
    /// Records a reference that could not be resolved and was dropped. Under
    /// `fail_on_error` the entity is also flagged so the run stops at its
    /// boundary.
    pub fn reference_error(&mut self, text: impl AsRef<str>) {
        self.error(text);
        if self.options.fail_on_error {
            self.stack.mark_entity_error();
        }
    }

    /// ## Summary
    /// Decides at an entity boundary whether a popped entity is written.
    ///
    /// ## Errors
    /// Returns `Aborted` for an errored entity when `fail_on_error` is set.
    pub fn admit(&mut self, kind: EntityKind, errored: bool, describe: &str) -> RestoreResult<bool> {
        if !errored {
            return Ok(true);
        }

        self.diags.errored(kind);
        if self.options.fail_on_error {
            return Err(RestoreError::Aborted(format!("error restoring {describe}")));
        }
        tracing::debug!(entity = %kind, "Skipped errored {describe}");
        Ok(false)
    }

    #[must_use]
    pub fn principal_key(&self, kind: PrincipalKind, account: &str) -> PrincipalKey {
        self.options.roots.key_for(kind, account)
    }

    /// ## Summary
    /// Runs the work deferred to the end of the document: group members
    /// and root users added by legacy auth users.
    ///
    /// ## Errors
    /// Returns an error if a sink call fails.
    pub fn finish(&mut self) -> RestoreResult<()> {
        self.attach_pending_members()?;

        if self.root_users_changed {
            tracing::info!(root_users = ?self.syspars.root_users, "Updating system root users");
            self.sink.update_syspars(&self.syspars)?;
            self.sink.end_transaction()?;
        }

        Ok(())
    }
}
