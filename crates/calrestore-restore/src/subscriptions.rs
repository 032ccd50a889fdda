//! Migration of per-user subscriptions from dumps before 3.5.
//!
//! Early releases kept subscriptions as a list on the user preferences. They
//! are now alias collections under the user's home. Each subscription ends up
//! folded into the home, dropped, or created as an alias, and the outcome is
//! recorded so that views read later can map a subscription name to a path.

use std::collections::BTreeMap;

use calrestore_core::principal::{PrincipalKey, PrincipalKind, account_of};
use calrestore_model::Collection;
use calrestore_model::collection::CAL_TYPE_ALIAS;

use crate::context::RestoreContext;
use crate::error::{RestoreError, RestoreResult, SinkError};

/// What happened to one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubInfo {
    pub name: String,
    pub path: String,
    pub dropped: bool,
    pub display: bool,
    pub affects_free_busy: bool,
    pub ignore_transparency: bool,
    pub unremoveable: bool,
    pub color: Option<String>,
}

impl SubInfo {
    fn of(cal: &Collection, dropped: bool) -> Self {
        Self {
            name: cal.name.clone(),
            path: cal.path.clone(),
            dropped,
            display: cal.display,
            affects_free_busy: cal.affects_free_busy,
            ignore_transparency: cal.ignore_transparency,
            unremoveable: cal.unremoveable,
            color: cal.color.clone(),
        }
    }
}

/// Subscription outcomes by owner, in the order they were recorded.
#[derive(Debug, Default)]
pub struct SubscriptionsMap {
    subs: BTreeMap<PrincipalKey, Vec<SubInfo>>,
}

impl SubscriptionsMap {
    pub fn put(&mut self, owner: &PrincipalKey, cal: &Collection) {
        self.subs.entry(owner.clone()).or_default().push(SubInfo::of(cal, false));
    }

    pub fn put_dropped(&mut self, owner: &PrincipalKey, cal: &Collection) {
        self.subs.entry(owner.clone()).or_default().push(SubInfo::of(cal, true));
    }

    #[must_use]
    pub fn subs(&self, owner: &PrincipalKey) -> &[SubInfo] {
        self.subs.get(owner).map_or(&[], Vec::as_slice)
    }

    /// Path of a live subscription.
    #[must_use]
    pub fn get_sub(&self, owner: &PrincipalKey, name: &str) -> Option<&str> {
        self.find(owner, name, false)
    }

    /// Path a dropped subscription pointed at.
    #[must_use]
    pub fn get_sub_dropped(&self, owner: &PrincipalKey, name: &str) -> Option<&str> {
        self.find(owner, name, true)
    }

    fn find(&self, owner: &PrincipalKey, name: &str, dropped: bool) -> Option<&str> {
        self.subs(owner)
            .iter()
            .find(|s| s.dropped == dropped && s.name == name)
            .map(|s| s.path.as_str())
    }
}

/// Outcome of [`migrate_subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// The subscription named the owner's home and was replaced by it.
    FoldedHome,
    /// The subscription named a collection inside the owner's home. A home
    /// subscription was added if there was none yet.
    Dropped { home_added: bool },
    /// An alias was created under the owner's home with the final name.
    Alias { name: String, path: String, world_readable: bool },
    /// The subscription could not be migrated. An error was recorded.
    Rejected,
}

/// ## Summary
/// Migrates one subscription of the preferences owned by `prefs_owner`.
///
/// ## Errors
/// Returns `MissingReference` when the owner has no calendar home and
/// propagates sink failures other than a duplicate calendar name.
#[tracing::instrument(skip(ctx, sub), fields(name = %sub.name))]
pub fn migrate_subscription(
    ctx: &mut RestoreContext<'_>,
    prefs_owner: &str,
    mut sub: Collection,
) -> RestoreResult<SubscriptionOutcome> {
    sub.owned.creator_href.clone_from(&sub.owned.owner_href);

    let Some(owner_href) = sub.owned.owner_href.clone() else {
        ctx.error(format!("No owner for subscription {}", sub.name));
        return Ok(SubscriptionOutcome::Rejected);
    };
    if owner_href != prefs_owner {
        ctx.error(format!(
            "Owners don't match for subscription {}: found {owner_href} expected {prefs_owner}",
            sub.name
        ));
        return Ok(SubscriptionOutcome::Rejected);
    }

    sub.cal_type = CAL_TYPE_ALIAS;

    let owner = PrincipalKey::new(PrincipalKind::User, owner_href.clone());
    let home = ctx.user_home(&owner_href)?;
    let target = sub.internal_alias_path().map(str::to_owned);
    let account = account_of(&owner_href).to_owned();
    let public_owner = account.starts_with(&ctx.options.admin_groups_id_prefix)
        || ctx.syspars.public_user() == Some(account.as_str());

    if let Some(target) = target {
        sub.path.clone_from(&target);

        if target == home {
            sub.name.clone_from(&account);
            ctx.subscriptions.put(&owner, &sub);
            ctx.diags.subscription_fix(format!(
                "Subscription owner: {account}\t added\t {}",
                sub.path
            ));
            return Ok(SubscriptionOutcome::FoldedHome);
        }

        if target.starts_with(&format!("{home}/")) {
            ctx.subscriptions.put_dropped(&owner, &sub);
            ctx.diags.subscription_fix(format!(
                "Subscription owner: {account}\t dropped\t {}",
                sub.path
            ));

            let home_added = ctx.subscriptions.get_sub(&owner, &account).is_none();
            if home_added {
                sub.path.clone_from(&home);
                sub.name.clone_from(&account);
                ctx.subscriptions.put(&owner, &sub);
                ctx.diags.subscription_fix(format!(
                    "Subscription owner: {account}\t added\t {}",
                    sub.path
                ));
            }
            return Ok(SubscriptionOutcome::Dropped { home_added });
        }
    }

    if public_owner {
        sub.owned.access = Some(ctx.options.default_public_access.clone());
    }

    let orig_name = sub.name.clone();
    let mut suffix = 1_u32;
    loop {
        match ctx.sink.add_calendar_under(&mut sub, &home) {
            Ok(()) => break,
            Err(SinkError::DuplicateCalendar(_)) => {
                if suffix == 1 {
                    ctx.warn(format!("Renamed subscription {}", sub.name));
                }
                sub.name = format!("{orig_name}_{suffix}");
                suffix += 1;
            }
            Err(err) => return Err(RestoreError::from(err)),
        }
    }

    ctx.subscriptions.put(&owner, &sub);

    let mut fix = format!("Subscription owner: {account}\t added\t {}", sub.path);
    if public_owner {
        fix.push_str("\t World readable");
    }
    ctx.diags.subscription_fix(fix);

    Ok(SubscriptionOutcome::Alias {
        name: sub.name,
        path: sub.path,
        world_readable: public_owner,
    })
}
