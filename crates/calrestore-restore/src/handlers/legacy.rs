//! Sections only written by dumps before 3.5: standalone organizers and
//! attendees referenced from events by id, and private timezones.

use std::rc::Rc;

use calrestore_core::version::VersionRange;
use calrestore_model::{Attendee, LegacyTimezone};

use super::events::{attendee_table, organizer_table};
use super::{Committable, EntityRule, check_owner};
use crate::context::RestoreContext;
use crate::engine::{ElementEvent, RuleSet};
use crate::error::{RestoreError, RestoreResult};
use crate::fields::common::owned;
use crate::fields::{FieldRule, FieldTable};
use crate::stack::OrganizerEntry;

impl Committable for OrganizerEntry {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        let id = self
            .id
            .ok_or_else(|| RestoreError::MissingValue("organizer id".to_owned()))?;
        ctx.tables.organizers.insert(id, self.organizer)
    }
}

impl Committable for Attendee {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    fn commit(self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        let id = self
            .id
            .ok_or_else(|| RestoreError::MissingValue("attendee id".to_owned()))?;
        ctx.tables.attendees.insert(id, self)
    }
}

impl Committable for LegacyTimezone {
    fn start(_ctx: &RestoreContext<'_>, _el: &ElementEvent<'_>) -> Self {
        Self::default()
    }

    #[tracing::instrument(skip_all, fields(tzid = self.tzid.as_deref().unwrap_or("")))]
    fn commit(mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        if ctx.options.eliminate_private_timezones {
            tracing::debug!("Discarded private timezone");
            ctx.diags.discarded_tz();
            return Ok(());
        }

        if self.tzid.is_none() {
            return Err(RestoreError::MissingValue("timezone tzid".to_owned()));
        }
        check_owner(ctx, &mut self.owned)?;
        ctx.sink.restore_timezone(&self)?;
        ctx.sink.end_transaction()?;
        Ok(())
    }
}

fn timezone_table() -> RestoreResult<Rc<FieldTable>> {
    owned(FieldTable::new("timezone"))
        .set::<LegacyTimezone, _>("tzid", VersionRange::Any, |tz, input| {
            tz.tzid = input.opt_string();
            Ok(())
        })
        .set::<LegacyTimezone, _>("vtimezone", VersionRange::Any, |tz, input| {
            tz.vtimezone = input.opt_string();
            Ok(())
        })
        .set::<LegacyTimezone, _>("jtzid", VersionRange::Any, |tz, input| {
            tz.jtzid = input.opt_string();
            Ok(())
        })
        .ignore("byteSize")
        .build()
}

pub(super) fn register(rules: &mut RuleSet) -> RestoreResult<()> {
    rules.add("caldata/organizers/organizer", EntityRule::<OrganizerEntry>::new())?;
    rules.add("caldata/organizers/organizer/?", FieldRule::new(organizer_table()?))?;

    rules.add("caldata/attendees/attendee", EntityRule::<Attendee>::new())?;
    rules.add("caldata/attendees/attendee/?", FieldRule::new(attendee_table()?))?;

    rules.add("caldata/timezones/timezone", EntityRule::<LegacyTimezone>::new())?;
    rules.add("caldata/timezones/timezone/?", FieldRule::new(timezone_table()?))
}
