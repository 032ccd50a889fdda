//! Streams a dump through the rule set.

use std::io::BufRead;
use std::rc::Rc;

use calrestore_core::constants::DUMP_ROOT;
use calrestore_core::error::CoreError;
use quick_xml::Reader;
use quick_xml::events::{BytesRef, Event};
use thiserror::Error;

use super::{ElementEvent, RuleSet};
use crate::context::{RestoreContext, RestoreOptions};
use crate::diagnostics::Report;
use crate::error::{RestoreError, RestoreResult};
use crate::handlers::build_rule_set;
use crate::sink::RestoreSink;
use crate::timezone::{ChronoTzRegistry, TimezoneRegistry};

/// A run that stopped early, with the report gathered up to that point.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RestoreFailure {
    #[source]
    pub error: RestoreError,
    pub report: Report,
}

/// ## Summary
/// Restores a dump into `sink` using the compiled-in timezone database.
///
/// ## Errors
/// Returns the fatal error together with the partial report.
pub fn restore(
    input: impl BufRead,
    sink: &mut dyn RestoreSink,
    options: RestoreOptions,
) -> Result<Report, Box<RestoreFailure>> {
    let mut tz = ChronoTzRegistry::new();
    restore_with_registry(input, sink, options, &mut tz)
}

/// ## Summary
/// Restores a dump into `sink`, validating timezone ids against `tz`.
///
/// On success everything is committed and the sink is closed. On a fatal
/// error the open transaction is rolled back.
///
/// ## Errors
/// Returns the fatal error together with the partial report.
#[tracing::instrument(skip_all, fields(fail_on_error = options.fail_on_error))]
pub fn restore_with_registry(
    input: impl BufRead,
    sink: &mut dyn RestoreSink,
    options: RestoreOptions,
    tz: &mut dyn TimezoneRegistry,
) -> Result<Report, Box<RestoreFailure>> {
    let rules = match build_rule_set() {
        Ok(rules) => rules,
        Err(error) => {
            return Err(Box::new(RestoreFailure {
                error,
                report: Report::default(),
            }));
        }
    };

    let mut ctx = RestoreContext::new(options, sink, tz);
    let outcome = run(&rules, &mut ctx, input);

    if let Some(version) = ctx.version.version() {
        let version = version.to_string();
        let dump_date = ctx.version.dump_date().map(str::to_owned);
        ctx.diags.set_version(version, dump_date);
    }

    match outcome {
        Ok(()) => {
            tracing::info!(
                warnings = ctx.diags.report().warnings,
                errors = ctx.diags.report().errors,
                "Restore complete"
            );
            Ok(ctx.diags.into_report())
        }
        Err(error) => {
            tracing::error!(%error, "Restore aborted");
            ctx.diags.set_fatal(error.to_string());
            if let Err(rollback) = ctx.sink.rollback() {
                tracing::error!(error = %rollback, "Rollback failed");
            }
            Err(Box::new(RestoreFailure {
                error,
                report: ctx.diags.into_report(),
            }))
        }
    }
}

fn run(rules: &RuleSet, ctx: &mut RestoreContext<'_>, input: impl BufRead) -> RestoreResult<()> {
    ctx.sink.open()?;
    ctx.sink.start_transaction()?;

    let mut reader = Reader::from_reader(input);
    reader.config_mut().expand_empty_elements = true;

    let mut walker = Walker::new(rules);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = std::str::from_utf8(e.local_name().as_ref())?.to_owned();
                walker.open(ctx, name)?;
            }
            Event::End(_) => walker.close(ctx)?,
            Event::Text(t) => walker.text(&t.decode()?),
            Event::CData(t) => walker.text(&t.decode()?),
            Event::GeneralRef(r) => walker.text(&resolve_ref(&r)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !walker.saw_root {
        return Err(CoreError::InvalidInput(format!("no {DUMP_ROOT} element")).into());
    }

    // A dump with a header and no sections is frozen here.
    if !ctx.version.is_set() {
        ctx.version.freeze()?;
    }

    ctx.finish()?;
    ctx.sink.end_transaction_now()?;
    ctx.sink.close()?;
    Ok(())
}

fn resolve_ref(r: &BytesRef<'_>) -> RestoreResult<String> {
    if let Some(ch) = r.resolve_char_ref()? {
        return Ok(ch.to_string());
    }
    let name = r.decode()?;
    quick_xml::escape::resolve_xml_entity(&name)
        .map(str::to_owned)
        .ok_or_else(|| RestoreError::UnknownEntity(name.into_owned()))
}

/// Records entity-level errors against the entity in progress.
fn settle(ctx: &mut RestoreContext<'_>, result: RestoreResult<()>) -> RestoreResult<()> {
    match result {
        Err(err) if !err.is_fatal() => {
            tracing::debug!(error = %err, "Entity error");
            ctx.entity_error(&err);
            Ok(())
        }
        other => other,
    }
}

/// Element path, body text and matched rules of every open element.
struct Walker<'r> {
    rules: &'r RuleSet,
    path: Vec<String>,
    texts: Vec<String>,
    matched: Vec<Rc<[usize]>>,
    saw_root: bool,
}

impl<'r> Walker<'r> {
    fn new(rules: &'r RuleSet) -> Self {
        Self {
            rules,
            path: Vec::new(),
            texts: Vec::new(),
            matched: Vec::new(),
            saw_root: false,
        }
    }

    fn open(&mut self, ctx: &mut RestoreContext<'_>, name: String) -> RestoreResult<()> {
        if self.path.is_empty() {
            if name != DUMP_ROOT {
                return Err(CoreError::InvalidInput(format!(
                    "root element is {name}, expected {DUMP_ROOT}"
                ))
                .into());
            }
            self.saw_root = true;
        }

        self.path.push(name);
        self.texts.push(String::new());

        let hits = self.rules.matching(&self.path);
        let el = ElementEvent {
            name: self.path.last().map_or("", String::as_str),
            path: &self.path,
            text: "",
        };
        for &i in hits.iter() {
            if let Some(rule) = self.rules.rule(i) {
                let outcome = rule.begin(ctx, &el);
                settle(ctx, outcome)?;
            }
        }
        self.matched.push(hits);
        Ok(())
    }

    fn text(&mut self, chunk: &str) {
        if let Some(text) = self.texts.last_mut() {
            text.push_str(chunk);
        }
    }

    fn close(&mut self, ctx: &mut RestoreContext<'_>) -> RestoreResult<()> {
        let hits = self.matched.pop().unwrap_or_else(|| Rc::from([]));
        let raw = self.texts.pop().unwrap_or_default();
        let text = raw.trim();

        let el = ElementEvent {
            name: self.path.last().map_or("", String::as_str),
            path: &self.path,
            text,
        };

        if hits.is_empty() {
            if !text.is_empty() {
                ctx.warn(format!("Unmatched element {}", self.path.join("/")));
            }
        } else {
            for &i in hits.iter() {
                if let Some(rule) = self.rules.rule(i) {
                    let outcome = rule.body(ctx, &el);
                    settle(ctx, outcome)?;
                }
            }
            for &i in hits.iter() {
                if let Some(rule) = self.rules.rule(i) {
                    let outcome = rule.end(ctx, &el);
                    settle(ctx, outcome)?;
                }
            }
        }

        self.path.pop();
        Ok(())
    }
}
