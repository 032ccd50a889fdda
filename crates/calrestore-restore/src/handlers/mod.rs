//! Entity handlers and the routing table that wires them to dump paths.
//!
//! Every entity follows the same lifecycle: a blank record is pushed when its
//! element opens, child elements fill it in through field tables and value
//! holders, and on close it is popped, validated and committed to the sink
//! or to its parent.

mod authusers;
mod collections;
mod events;
mod filters;
mod groups;
mod legacy;
mod ownership;
mod prefs;
mod section;
mod syspars;
mod users;
mod values;
mod vocab;

use std::marker::PhantomData;

use calrestore_core::principal::PrincipalKind;
use calrestore_model::OwnedFields;

use crate::context::RestoreContext;
use crate::engine::{ElementEvent, Rule, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::stack::StackItem;

/// An entity with its own element in the dump.
pub(crate) trait Committable: StackItem + 'static {
    /// Blank record pushed when the element opens.
    fn start(ctx: &RestoreContext<'_>, el: &ElementEvent<'_>) -> Self;

    /// ## Summary
    /// Validates the completed record and hands it to the sink or its parent.
    ///
    /// ## Errors
    /// Entity-level errors exclude the record; anything else ends the run.
    fn commit(self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()>;
}

/// Drives the start and commit of one entity kind.
pub(crate) struct EntityRule<T>(PhantomData<T>);

impl<T> EntityRule<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Committable> Rule for EntityRule<T> {
    fn begin(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        let entity = T::start(ctx, el);
        ctx.stack.push(entity);
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        let Some((kind, describe)) = ctx
            .stack
            .current_entity()
            .map(|entity| (entity.kind(), entity.describe()))
        else {
            return Err(RestoreError::StackMismatch {
                expected: T::KIND,
                found: "empty stack",
            });
        };

        let (entity, errored) = ctx.stack.pop_slot::<T>()?;
        if !ctx.admit(kind, errored, &describe)? {
            return Ok(());
        }

        match entity.commit(ctx) {
            Ok(()) => {
                tracing::trace!(entity = %kind, "Restored {describe}");
                ctx.diags.processed(kind);
                Ok(())
            }
            Err(err) if !err.is_fatal() => {
                ctx.diags.error(Some(kind), format!("{describe}: {err}"));
                ctx.admit(kind, true, &describe).map(|_| ())
            }
            Err(err) => Err(err),
        }
    }
}

/// A record built inside an entity and handed to it when complete.
pub(crate) struct ChildRule<T> {
    apply: fn(&mut RestoreContext<'_>, T) -> RestoreResult<()>,
}

impl<T> ChildRule<T> {
    pub(crate) fn new(apply: fn(&mut RestoreContext<'_>, T) -> RestoreResult<()>) -> Self {
        Self { apply }
    }
}

impl<T: StackItem + Default> Rule for ChildRule<T> {
    fn begin(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        ctx.stack.push(T::default());
        Ok(())
    }

    fn end(&self, ctx: &mut RestoreContext<'_>, _el: &ElementEvent<'_>) -> RestoreResult<()> {
        let (item, errored) = ctx.stack.pop_slot::<T>()?;
        if errored {
            // The error was recorded against the child; the parent inherits it.
            ctx.stack.mark_entity_error();
            return Ok(());
        }
        (self.apply)(ctx, item)
    }
}

/// ## Summary
/// Checks that an owned record has an owner. A public record without one is
/// given the public user.
///
/// ## Errors
/// Returns `MissingValue` for a private record without an owner.
pub(crate) fn check_owner(
    ctx: &mut RestoreContext<'_>,
    owned: &mut OwnedFields,
) -> RestoreResult<()> {
    if owned.owner_href.is_some() {
        return Ok(());
    }
    if !owned.public {
        return Err(RestoreError::MissingValue("owner".to_owned()));
    }

    let href = ctx.public_user_href.clone().unwrap_or_else(|| {
        let account = ctx.syspars.public_user().unwrap_or(&ctx.options.public_user);
        ctx.options.roots.href_for(PrincipalKind::User, account)
    });
    tracing::info!(owner = %href, "Public entity without owner assigned to public user");
    owned.owner_href = Some(href);
    Ok(())
}

/// ## Summary
/// Builds the routing table for the whole dump format.
///
/// Universal rules come first so that ownership and value holders are
/// settled before the field rules of the same element run.
///
/// ## Errors
/// Returns `InvalidPattern` or `FieldTable` if a registration is malformed.
pub fn build_rule_set() -> RestoreResult<RuleSet> {
    let mut rules = RuleSet::new();

    ownership::register(&mut rules)?;
    values::register(&mut rules)?;
    section::register(&mut rules)?;
    syspars::register(&mut rules)?;
    users::register(&mut rules)?;
    collections::register(&mut rules)?;
    vocab::register(&mut rules)?;
    groups::register(&mut rules)?;
    authusers::register(&mut rules)?;
    prefs::register(&mut rules)?;
    events::register(&mut rules)?;
    filters::register(&mut rules)?;
    legacy::register(&mut rules)?;

    tracing::debug!(rules = rules.len(), "Built restore rule set");
    Ok(rules)
}
