//! Running tallies and the end-of-run report.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

/// Entity kinds counted by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Syspars,
    User,
    Collection,
    CalSuite,
    Location,
    Contact,
    Category,
    AdminGroup,
    AuthUser,
    Preferences,
    Event,
    EventAnnotation,
    EventOverride,
    Filter,
    Organizer,
    Attendee,
    Timezone,
}

impl EntityKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Syspars => "system parameters",
            Self::User => "users",
            Self::Collection => "collections",
            Self::CalSuite => "cal-suites",
            Self::Location => "locations",
            Self::Contact => "contacts",
            Self::Category => "categories",
            Self::AdminGroup => "admin-groups",
            Self::AuthUser => "auth-users",
            Self::Preferences => "user-preferences",
            Self::Event => "events",
            Self::EventAnnotation => "event-annotations",
            Self::EventOverride => "event-overrides",
            Self::Filter => "filters",
            Self::Organizer => "organizers",
            Self::Attendee => "attendees",
            Self::Timezone => "timezones",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One warning or error, in the order it was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub severity: Severity,
    pub entity: Option<EntityKind>,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        };
        match self.entity {
            Some(kind) => write!(f, "{level} [{kind}] {}", self.text),
            None => write!(f, "{level} {}", self.text),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub processed: u64,
    pub errored: u64,
}

/// End-of-run report. Produced on success and carried by a failed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub version: Option<String>,
    pub dump_date: Option<String>,
    pub counts: BTreeMap<EntityKind, KindCounts>,
    pub warnings: u64,
    pub errors: u64,
    pub messages: Vec<Message>,
    pub subscription_fixes: Vec<String>,
    pub unmatched_tzids: BTreeSet<String>,
    pub converted_tzids: u64,
    pub discarded_tzs: u64,
    pub fixed_no_end_time: u64,
    pub external_subscriptions: Vec<String>,
    /// Set when the run aborted.
    pub fatal: Option<String>,
}

impl Report {
    #[must_use]
    pub fn processed(&self, kind: EntityKind) -> u64 {
        self.counts.get(&kind).map_or(0, |c| c.processed)
    }

    #[must_use]
    pub fn errored(&self, kind: EntityKind) -> u64 {
        self.counts.get(&kind).map_or(0, |c| c.errored)
    }

    /// Messages whose text contains `needle`.
    pub fn messages_containing<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a Message> {
        self.messages.iter().filter(move |m| m.text.contains(needle))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.version, &self.dump_date) {
            (Some(version), Some(date)) => writeln!(f, "Restored dump version {version} of {date}")?,
            (Some(version), None) => writeln!(f, "Restored dump version {version}")?,
            _ => writeln!(f, "Restore of unversioned dump")?,
        }
        writeln!(f)?;

        for (kind, counts) in &self.counts {
            writeln!(
                f,
                "    {:>20}: {:>8} processed, {:>6} errors",
                kind.label(),
                counts.processed,
                counts.errored
            )?;
        }
        writeln!(f)?;

        if !self.subscription_fixes.is_empty() {
            for fix in &self.subscription_fixes {
                writeln!(f, "{fix}")?;
            }
            writeln!(f)?;
        }

        if !self.external_subscriptions.is_empty() {
            writeln!(f, "    External subscriptions: {}", self.external_subscriptions.len())?;
            for path in &self.external_subscriptions {
                writeln!(f, "{path}")?;
            }
            writeln!(f)?;
        }

        if !self.messages.is_empty() {
            writeln!(f, "Errors and warnings. See log for details.")?;
            writeln!(f)?;
            for message in &self.messages {
                writeln!(f, "{message}")?;
            }
            writeln!(f)?;
        }

        if self.unmatched_tzids.is_empty() {
            writeln!(f, "    No unmatched timezone ids")?;
        } else {
            writeln!(f, "    Unmatched timezone ids: {}", self.unmatched_tzids.len())?;
            for tzid in &self.unmatched_tzids {
                writeln!(f, "{tzid}")?;
            }
        }
        writeln!(f)?;
        writeln!(f, "    Converted tzids: {}", self.converted_tzids)?;
        writeln!(f, "    Discarded tzs: {}", self.discarded_tzs)?;
        writeln!(f)?;
        writeln!(f, "    Fixed end times: {}", self.fixed_no_end_time)?;
        writeln!(f)?;
        writeln!(f, "           warnings: {}", self.warnings)?;
        writeln!(f, "             errors: {}", self.errors)?;

        if let Some(fatal) = &self.fatal {
            writeln!(f)?;
            writeln!(f, "Restore aborted: {fatal}")?;
        }

        Ok(())
    }
}

/// Collects counters and messages while the dump is parsed. Every message is
/// also emitted through `tracing` as it is recorded.
#[derive(Debug, Default)]
pub struct Diagnostics {
    report: Report,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&mut self, kind: EntityKind) {
        self.report.counts.entry(kind).or_default().processed += 1;
    }

    pub fn errored(&mut self, kind: EntityKind) {
        self.report.counts.entry(kind).or_default().errored += 1;
    }

    pub fn warn(&mut self, entity: Option<EntityKind>, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!(entity = ?entity, "{text}");
        self.report.warnings += 1;
        self.report.messages.push(Message {
            severity: Severity::Warning,
            entity,
            text,
        });
    }

    pub fn error(&mut self, entity: Option<EntityKind>, text: impl Into<String>) {
        let text = text.into();
        tracing::error!(entity = ?entity, "{text}");
        self.report.errors += 1;
        self.report.messages.push(Message {
            severity: Severity::Error,
            entity,
            text,
        });
    }

    pub fn subscription_fix(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("{text}");
        self.report.subscription_fixes.push(text);
    }

    pub fn unmatched_tzid(&mut self, tzid: &str) {
        if self.report.unmatched_tzids.insert(tzid.to_owned()) {
            tracing::debug!(tzid, "Unmatched timezone id");
        }
    }

    pub fn converted_tzid(&mut self) {
        self.report.converted_tzids += 1;
    }

    pub fn discarded_tz(&mut self) {
        self.report.discarded_tzs += 1;
    }

    pub fn fixed_no_end_time(&mut self) {
        self.report.fixed_no_end_time += 1;
    }

    pub fn external_subscription(&mut self, path: &str) {
        self.report.external_subscriptions.push(path.to_owned());
    }

    pub fn set_version(&mut self, version: String, dump_date: Option<String>) {
        self.report.version = Some(version);
        self.report.dump_date = dump_date;
    }

    pub fn set_fatal(&mut self, text: String) {
        self.report.fatal = Some(text);
    }

    #[must_use]
    pub fn report(&self) -> &Report {
        &self.report
    }

    #[must_use]
    pub fn into_report(self) -> Report {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn messages_keep_order_and_totals() {
        let mut diags = Diagnostics::new();
        diags.warn(Some(EntityKind::Event), "first");
        diags.error(None, "second");
        diags.warn(Some(EntityKind::Contact), "third");

        let report = diags.into_report();
        assert_eq!(report.warnings, 2);
        assert_eq!(report.errors, 1);
        let texts: Vec<_> = report.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn text_report_lists_fixups() {
        let mut diags = Diagnostics::new();
        diags.set_version("3.5.0".into(), Some("2010-03-01".into()));
        diags.processed(EntityKind::User);
        diags.processed(EntityKind::User);
        diags.errored(EntityKind::Event);
        diags.unmatched_tzid("Bogus/Zone");
        diags.unmatched_tzid("Bogus/Zone");
        diags.subscription_fix("Subscription owner: alice\t added\t /user/alice");

        let report = diags.into_report();
        assert_eq!(report.processed(EntityKind::User), 2);
        assert_eq!(report.errored(EntityKind::Event), 1);
        assert_eq!(report.unmatched_tzids.len(), 1);

        let text = report.to_string();
        assert!(text.contains("Restored dump version 3.5.0 of 2010-03-01"));
        assert!(text.contains("Unmatched timezone ids: 1"));
        assert!(text.contains("Bogus/Zone"));
        assert!(text.contains("added\t /user/alice"));
    }
}
