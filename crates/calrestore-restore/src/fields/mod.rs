//! Versioned field tables.
//!
//! Each entity kind maps child element names to decoders, each valid over a
//! [`VersionRange`], plus names that are structural and skipped. A name with
//! no decoder and no ignore entry for the active version is an unknown tag.

pub mod common;

use std::collections::HashMap;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use calrestore_core::version::{DumpVersion, VersionRange};
use calrestore_model::LocalizedString;
use chrono::NaiveDateTime;

use crate::context::RestoreContext;
use crate::engine::{ElementEvent, Rule};
use crate::error::{RestoreError, RestoreResult};
use crate::stack::{DateTimeParts, Frame, StackItem, ValueFrame};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Text of one field element, plus any value holder its children left.
#[derive(Debug)]
pub struct FieldInput<'a> {
    pub name: &'a str,
    pub text: &'a str,
    holder: Option<ValueFrame>,
}

impl<'a> FieldInput<'a> {
    #[must_use]
    pub fn new(name: &'a str, text: &'a str) -> Self {
        Self {
            name,
            text,
            holder: None,
        }
    }

    #[must_use]
    pub fn with_holder(mut self, holder: ValueFrame) -> Self {
        self.holder = Some(holder);
        self
    }

    #[must_use]
    pub fn opt_string(&self) -> Option<String> {
        (!self.text.is_empty()).then(|| self.text.to_owned())
    }

    /// ## Summary
    /// Non-empty text.
    ///
    /// ## Errors
    /// Returns `MissingValue` when the element is empty.
    pub fn string(&self) -> RestoreResult<String> {
        self.opt_string()
            .ok_or_else(|| RestoreError::MissingValue(self.name.to_owned()))
    }

    /// ## Summary
    /// Integer value.
    ///
    /// ## Errors
    /// Returns `MissingValue` when empty and `InvalidValue` when not a number.
    pub fn int(&self) -> RestoreResult<i64> {
        let text = self.string()?;
        text.parse()
            .map_err(|e| RestoreError::invalid(self.name, &text, e))
    }

    /// ## Summary
    /// Integer value, `None` when empty.
    ///
    /// ## Errors
    /// Returns `InvalidValue` when the text is not a number.
    pub fn opt_int(&self) -> RestoreResult<Option<i64>> {
        if self.text.is_empty() {
            return Ok(None);
        }
        self.int().map(Some)
    }

    /// `true` only for the text `true`, in any case.
    #[must_use]
    pub fn bool(&self) -> bool {
        self.text.eq_ignore_ascii_case("true")
    }

    /// ## Summary
    /// Database timestamp, `yyyy-mm-dd hh:mm:ss[.fff]`.
    ///
    /// ## Errors
    /// Returns `InvalidValue` for any other form.
    pub fn timestamp(&self) -> RestoreResult<Option<NaiveDateTime>> {
        if self.text.is_empty() {
            return Ok(None);
        }
        NaiveDateTime::parse_from_str(self.text, TIMESTAMP_FORMAT)
            .map(Some)
            .map_err(|e| RestoreError::invalid(self.name, self.text, e))
    }

    /// ## Summary
    /// Decimal value.
    ///
    /// ## Errors
    /// Returns `MissingValue` when empty and `InvalidValue` when malformed.
    pub fn decimal(&self) -> RestoreResult<BigDecimal> {
        let text = self.string()?;
        text.parse()
            .map_err(|e| RestoreError::invalid(self.name, &text, e))
    }

    /// ## Summary
    /// Single character value.
    ///
    /// ## Errors
    /// Returns `MissingValue` when empty and `InvalidValue` for longer text.
    pub fn char(&self) -> RestoreResult<char> {
        let mut chars = self.text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            (None, _) => Err(RestoreError::MissingValue(self.name.to_owned())),
            _ => Err(RestoreError::invalid(self.name, self.text, "expected one character")),
        }
    }

    /// ## Summary
    /// Date-time value with the seconds zeroed. Old releases stored stray
    /// seconds in start and end values. Dates pass through.
    ///
    /// ## Errors
    /// Returns `MissingValue` when empty and `InvalidValue` when too short.
    pub fn fixed_date_time(&self) -> RestoreResult<String> {
        let text = self.string()?;
        if text.len() == 8 {
            return Ok(text);
        }
        let (Some(prefix), Some(seconds)) = (text.get(..13), text.get(13..15)) else {
            return Err(RestoreError::invalid(self.name, &text, "malformed date-time"));
        };
        if seconds == "00" {
            return Ok(text);
        }
        Ok(if text.len() == 16 {
            format!("{prefix}00Z")
        } else {
            format!("{prefix}00")
        })
    }

    /// Takes whatever holder the children left.
    pub fn take_holder(&mut self) -> Option<ValueFrame> {
        self.holder.take()
    }

    /// Takes a string or long string holder.
    pub fn take_str(&mut self) -> Option<LocalizedString> {
        match self.holder.take() {
            Some(ValueFrame::Str(s)) => Some(s.0),
            Some(ValueFrame::LongStr(s)) => Some(s.0),
            other => {
                self.holder = other;
                None
            }
        }
    }

    /// ## Summary
    /// Takes the date-time holder left by a `date-time` child.
    ///
    /// ## Errors
    /// Returns `MissingValue` if there is none.
    pub fn take_date_time(&mut self) -> RestoreResult<DateTimeParts> {
        self.take_date_time_or_default()
            .ok_or_else(|| RestoreError::MissingValue(format!("{} date-time", self.name)))
    }

    /// Takes the date-time holder, if any.
    pub fn take_date_time_or_default(&mut self) -> Option<DateTimeParts> {
        match self.holder.take() {
            Some(ValueFrame::DateTime(dt)) => Some(dt),
            other => {
                self.holder = other;
                None
            }
        }
    }

    /// Leaves a date-time holder for the next sibling field.
    pub fn keep_date_time(&mut self, parts: DateTimeParts) {
        self.holder = Some(ValueFrame::DateTime(parts));
    }
}

pub type Decoder = Box<dyn Fn(&mut RestoreContext<'_>, &mut FieldInput<'_>) -> RestoreResult<()>>;

/// Result of looking a name up in a [`FieldTable`].
pub enum Lookup<'t> {
    Decode(&'t Decoder),
    Ignore,
    Unknown,
}

/// Decoders and ignored names of one entity kind.
pub struct FieldTable {
    entity: &'static str,
    fields: HashMap<&'static str, Vec<(VersionRange, Decoder)>>,
    ignored: HashMap<&'static str, Vec<VersionRange>>,
    /// Decoders work on the holder itself, so it stays on the stack.
    keep_holders: bool,
}

impl FieldTable {
    #[must_use]
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            fields: HashMap::new(),
            ignored: HashMap::new(),
            keep_holders: false,
        }
    }

    /// Leaves value holders on the stack instead of passing them in.
    #[must_use]
    pub fn keep_holders(mut self) -> Self {
        self.keep_holders = true;
        self
    }

    #[must_use]
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    /// Adds a decoder with access to the whole context.
    #[must_use]
    pub fn field<F>(mut self, name: &'static str, range: VersionRange, decode: F) -> Self
    where
        F: Fn(&mut RestoreContext<'_>, &mut FieldInput<'_>) -> RestoreResult<()> + 'static,
    {
        self.fields
            .entry(name)
            .or_default()
            .push((range, Box::new(decode)));
        self
    }

    /// Adds a decoder applied to the `T` on top of the stack.
    #[must_use]
    pub fn set<T, F>(self, name: &'static str, range: VersionRange, decode: F) -> Self
    where
        T: StackItem + 'static,
        F: Fn(&mut T, &mut FieldInput<'_>) -> RestoreResult<()> + 'static,
    {
        self.field(name, range, move |ctx, input| {
            decode(ctx.stack.top_mut::<T>()?, input)
        })
    }

    #[must_use]
    pub fn ignore(self, name: &'static str) -> Self {
        self.ignore_in(name, VersionRange::Any)
    }

    #[must_use]
    pub fn ignore_in(mut self, name: &'static str, range: VersionRange) -> Self {
        self.ignored.entry(name).or_default().push(range);
        self
    }

    #[must_use]
    pub fn ignore_all(self, names: &[&'static str]) -> Self {
        names.iter().fold(self, |table, name| table.ignore(name))
    }

    /// ## Summary
    /// Checks the table and freezes it for sharing between rules.
    ///
    /// ## Errors
    /// Returns `FieldTable` when one name has overlapping decoder ranges, or
    /// is both decoded and ignored in the same version.
    pub fn build(self) -> RestoreResult<Rc<Self>> {
        let entity = self.entity;
        let fail = |reason: String| RestoreError::FieldTable { entity, reason };

        for (name, decoders) in &self.fields {
            for (i, (a, _)) in decoders.iter().enumerate() {
                if let Some((b, _)) = decoders[i + 1..].iter().find(|(b, _)| a.overlaps(*b)) {
                    return Err(fail(format!("{name} has overlapping ranges {a} and {b}")));
                }
                if let Some(ignored) = self
                    .ignored
                    .get(name)
                    .and_then(|rs| rs.iter().find(|r| a.overlaps(**r)))
                {
                    return Err(fail(format!("{name} decoded in {a} and ignored in {ignored}")));
                }
            }
        }

        Ok(Rc::new(self))
    }

    #[must_use]
    pub fn lookup(&self, name: &str, version: Option<&DumpVersion>) -> Lookup<'_> {
        if let Some(decoder) = self
            .fields
            .get(name)
            .and_then(|ds| ds.iter().find(|(range, _)| range.applies_to(version)))
            .map(|(_, decoder)| decoder)
        {
            return Lookup::Decode(decoder);
        }

        if self
            .ignored
            .get(name)
            .is_some_and(|rs| rs.iter().any(|range| range.applies_to(version)))
        {
            return Lookup::Ignore;
        }

        Lookup::Unknown
    }
}

/// Decodes the children of an entity through a [`FieldTable`].
pub struct FieldRule {
    table: Rc<FieldTable>,
}

impl FieldRule {
    #[must_use]
    pub fn new(table: Rc<FieldTable>) -> Self {
        Self { table }
    }
}

impl Rule for FieldRule {
    fn end(&self, ctx: &mut RestoreContext<'_>, el: &ElementEvent<'_>) -> RestoreResult<()> {
        if ctx.in_owner_key {
            return Ok(());
        }

        match self.table.lookup(el.name, ctx.version.version()) {
            Lookup::Ignore => Ok(()),
            Lookup::Unknown => Err(RestoreError::UnknownTag {
                entity: self.table.entity,
                tag: el.name.to_owned(),
            }),
            Lookup::Decode(decode) => {
                let mut input = FieldInput::new(el.name, el.text);
                if !self.table.keep_holders {
                    input.holder = ctx.stack.pop_transient_holder();
                }
                let result = decode(ctx, &mut input);
                if let Some(left) = input.holder.take() {
                    ctx.stack.push_frame(Frame::Value(left));
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut RestoreContext<'_>, _: &mut FieldInput<'_>) -> RestoreResult<()> {
        Ok(())
    }

    #[test]
    fn lookup_follows_version() {
        let table = FieldTable::new("location")
            .field("address", VersionRange::Before(3, 5), noop)
            .field("address", VersionRange::From(3, 5), noop)
            .ignore_in("addr", VersionRange::Before(3, 5))
            .build()
            .unwrap();

        let v34 = DumpVersion::new(3, 4, 0);
        let v36 = DumpVersion::new(3, 6, 0);

        assert!(matches!(table.lookup("address", Some(&v34)), Lookup::Decode(_)));
        assert!(matches!(table.lookup("address", Some(&v36)), Lookup::Decode(_)));
        assert!(matches!(table.lookup("addr", Some(&v34)), Lookup::Ignore));
        assert!(matches!(table.lookup("addr", Some(&v36)), Lookup::Unknown));
        assert!(matches!(table.lookup("mystery", None), Lookup::Unknown));
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let err = FieldTable::new("event")
            .field("uid", VersionRange::Any, noop)
            .field("uid", VersionRange::From(3, 5), noop)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RestoreError::FieldTable { entity: "event", .. }));

        let err = FieldTable::new("event")
            .field("owner", VersionRange::Before(3, 1), noop)
            .ignore("owner")
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("ignored"));
    }

    #[test]
    fn typed_values() {
        assert_eq!(FieldInput::new("n", "42").int().unwrap(), 42);
        assert!(FieldInput::new("n", "x").int().is_err());
        assert!(matches!(
            FieldInput::new("n", "").int(),
            Err(RestoreError::MissingValue(_))
        ));
        assert!(FieldInput::new("b", "TRUE").bool());
        assert!(!FieldInput::new("b", "yes").bool());
        assert_eq!(FieldInput::new("c", "N").char().unwrap(), 'N');
        assert!(FieldInput::new("c", "NO").char().is_err());
        assert!(
            FieldInput::new("t", "2008-04-01 10:11:12.0")
                .timestamp()
                .unwrap()
                .is_some()
        );
        assert!(FieldInput::new("t", "").timestamp().unwrap().is_none());
    }

    #[test]
    fn fixed_date_time_zeroes_seconds() {
        let fixed = |v: &str| FieldInput::new("start-dtval", v).fixed_date_time().unwrap();
        assert_eq!(fixed("20060101"), "20060101");
        assert_eq!(fixed("20060101T101500"), "20060101T101500");
        assert_eq!(fixed("20060101T101559"), "20060101T101500");
        assert_eq!(fixed("20060101T101559Z"), "20060101T101500Z");
    }
}
