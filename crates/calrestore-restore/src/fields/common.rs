//! Fields shared by owned, shareable and contained entities, and date-time
//! validation.

use calrestore_core::version::VersionRange;
use calrestore_model::DateTimeValue;

use super::{FieldInput, FieldTable};
use crate::context::RestoreContext;
use crate::error::{RestoreError, RestoreResult};
use crate::stack::DateTimeParts;
use crate::timezone::utc_of;

fn owned_fields<'c>(
    ctx: &'c mut RestoreContext<'_>,
    input: &FieldInput<'_>,
) -> RestoreResult<&'c mut calrestore_model::OwnedFields> {
    ctx.stack
        .current_owned_mut()
        .ok_or_else(|| RestoreError::invalid(input.name, input.text, "no owned entity in progress"))
}

/// `seq` is never restored.
#[must_use]
pub fn tagged(table: FieldTable) -> FieldTable {
    table.ignore("seq")
}

/// Owner fields. Owner elements are read by the principal rules.
#[must_use]
pub fn owned(table: FieldTable) -> FieldTable {
    tagged(table)
        .field("ownerHref", VersionRange::Any, |ctx, input| {
            let href = input.string()?;
            owned_fields(ctx, input)?.owner_href = Some(href);
            Ok(())
        })
        .field("public", VersionRange::Any, |ctx, input| {
            owned_fields(ctx, input)?.public = input.bool();
            Ok(())
        })
        .ignore_all(&["owner", "owner-key"])
}

/// Owner, creator and access fields.
#[must_use]
pub fn shareable(table: FieldTable) -> FieldTable {
    owned(table)
        .field("creatorHref", VersionRange::Any, |ctx, input| {
            let href = input.string()?;
            owned_fields(ctx, input)?.creator_href = Some(href);
            Ok(())
        })
        .field("access", VersionRange::Any, |ctx, input| {
            let access = input.opt_string();
            owned_fields(ctx, input)?.access = access;
            Ok(())
        })
        .ignore_all(&["creator", "creator-key"])
}

/// Shareable fields plus the containing collection. An empty path leaves the
/// entity at the root.
#[must_use]
pub fn contained(table: FieldTable) -> FieldTable {
    fn col_path(ctx: &mut RestoreContext<'_>, input: &mut FieldInput<'_>) -> RestoreResult<()> {
        if let Some(path) = input.opt_string() {
            owned_fields(ctx, input)?.col_path = Some(path);
        }
        Ok(())
    }

    shareable(table)
        .field("colPath", VersionRange::Any, col_path)
        .field("calendar-path", VersionRange::Before(3, 5), col_path)
        .ignore("container")
}

/// ## Summary
/// Builds a restored date-time from its dumped parts.
///
/// The tzid is checked against the registry: an unknown id is recorded and
/// dropped, and an alias is replaced by the system id. The UTC value is
/// recomputed and compared with the one in the dump.
///
/// ## Errors
/// Returns `MissingValue` without a `dtval`, and `InvalidValue` if the value
/// cannot be converted.
pub fn date_time_value(
    ctx: &mut RestoreContext<'_>,
    parts: DateTimeParts,
) -> RestoreResult<DateTimeValue> {
    let dtval = parts
        .dtval
        .ok_or_else(|| RestoreError::MissingValue("dtval".to_owned()))?;

    let tzid = match parts.tzid {
        Some(id) => match ctx.tz.resolve(&id) {
            Ok(resolved) => {
                if resolved != id {
                    tracing::debug!(from = %id, to = %resolved, "Converted tzid");
                    ctx.diags.converted_tzid();
                }
                Some(resolved)
            }
            Err(_) => {
                ctx.diags.unmatched_tzid(&id);
                None
            }
        },
        None => None,
    };

    let date = utc_of(&mut *ctx.tz, parts.date_type, &dtval, tzid.as_deref())
        .map_err(|e| RestoreError::invalid("date-time", &dtval, e))?;

    if let Some(dumped) = parts.date.as_deref()
        && dumped != date
    {
        ctx.warn(format!("UTC mismatch - file={dumped} calculated={date}"));
    }

    Ok(DateTimeValue {
        date_only: parts.date_type,
        tzid,
        dtval,
        date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RestoreOptions;
    use crate::memory::MemorySink;
    use crate::timezone::ChronoTzRegistry;

    fn parts(tzid: Option<&str>, dtval: &str, date: &str) -> DateTimeParts {
        DateTimeParts {
            date_type: false,
            tzid: tzid.map(str::to_owned),
            dtval: Some(dtval.to_owned()),
            date: Some(date.to_owned()),
        }
    }

    #[test_log::test]
    fn alias_is_converted_and_counted() {
        let mut sink = MemorySink::new();
        let mut tz = ChronoTzRegistry::new();
        let mut ctx = RestoreContext::new(RestoreOptions::default(), &mut sink, &mut tz);

        let value = date_time_value(
            &mut ctx,
            parts(
                Some("/mozilla.org/20050126_1/America/New_York"),
                "20260115T100000",
                "20260115T150000Z",
            ),
        )
        .unwrap();

        assert_eq!(value.tzid.as_deref(), Some("America/New_York"));
        assert_eq!(value.date, "20260115T150000Z");
        assert_eq!(ctx.diags.report().converted_tzids, 1);
        assert_eq!(ctx.diags.report().warnings, 0);
    }

    #[test_log::test]
    fn unknown_tzid_is_dropped_and_mismatch_warned() {
        let mut sink = MemorySink::new();
        let mut tz = ChronoTzRegistry::new();
        let mut ctx = RestoreContext::new(RestoreOptions::default(), &mut sink, &mut tz);

        let value = date_time_value(
            &mut ctx,
            parts(Some("Mars/Olympus"), "20260115T100000", "20260115T150000Z"),
        )
        .unwrap();

        assert_eq!(value.tzid, None);
        assert_eq!(value.date, "20260115T100000");
        let report = ctx.diags.report();
        assert!(report.unmatched_tzids.contains("Mars/Olympus"));
        assert_eq!(report.messages_containing("UTC mismatch").count(), 1);
    }

    #[test]
    fn dtval_is_required() {
        let mut sink = MemorySink::new();
        let mut tz = ChronoTzRegistry::new();
        let mut ctx = RestoreContext::new(RestoreOptions::default(), &mut sink, &mut tz);

        let err = date_time_value(&mut ctx, DateTimeParts::default()).unwrap_err();
        assert!(!err.is_fatal());
    }
}
