use calrestore_core::error::CoreError;
use calrestore_test::{
    DumpBuilder, EntityKind, RestoreError, RestoreOptions, owner, restore, restore_with,
};

fn events(minor: u32, bodies: &[(&str, &str)]) -> String {
    let key = owner(minor, "alice");
    let events = bodies
        .iter()
        .map(|(col, rest)| format!("<event>{key}<colPath>{col}</colPath>{rest}</event>"))
        .collect::<String>();
    format!("<events>{events}</events>")
}

#[test_log::test]
fn errored_entity_is_skipped() {
    let xml = DumpBuilder::new(3, 10)
        .users()
        .homes()
        .section(events(
            10,
            &[
                ("/user/alice/nowhere", "<uid>ev-1</uid>"),
                ("/user/alice/calendar", "<uid>ev-2</uid>"),
            ],
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.errored(EntityKind::Event), 1);
    assert_eq!(report.messages_containing("/user/alice/nowhere").count(), 1);
    assert!(outcome.sink.event_by_uid("ev-1").is_none());
    assert!(outcome.sink.event_by_uid("ev-2").is_some());
}

#[test_log::test]
fn fail_on_error_stops_at_the_errored_entity() {
    let xml = DumpBuilder::new(3, 10)
        .users()
        .homes()
        .section(events(
            10,
            &[
                ("/user/alice/nowhere", "<uid>ev-1</uid>"),
                ("/user/alice/calendar", "<uid>ev-2</uid>"),
            ],
        ))
        .build();

    let options = RestoreOptions {
        fail_on_error: true,
        ..RestoreOptions::default()
    };
    let outcome = restore_with(&xml, options);
    let failure = outcome.result.as_ref().unwrap_err();

    assert!(matches!(failure.error, RestoreError::Aborted(_)));
    assert!(failure.report.fatal.is_some());
    assert_eq!(failure.report.errored(EntityKind::Event), 1);
    assert!(outcome.sink.event_by_uid("ev-2").is_none());
    assert_eq!(outcome.sink.rollbacks(), 1);
}

#[test_log::test]
fn missing_category_is_reported_and_event_kept() {
    let xml = DumpBuilder::new(3, 10)
        .users()
        .homes()
        .section(events(
            10,
            &[(
                "/user/alice/calendar",
                "<uid>ev-1</uid><categories><category><uid>cat-x</uid></category></categories>",
            )],
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.messages_containing("Missing category cat-x").count(), 1);
    let event = outcome.sink.event_by_uid("ev-1").unwrap().event();
    assert!(event.categories.is_empty());
}

#[test_log::test]
fn malformed_xml_is_fatal() {
    let xml = "<caldata><majorVersion>3</majorVersion><minorVersion>10</minorVersion>\
               <users><user><account>alice</account></users></caldata>";

    let outcome = restore(xml);
    let failure = outcome.result.as_ref().unwrap_err();

    assert!(matches!(failure.error, RestoreError::XmlError(_)));
    assert_eq!(failure.report.fatal.as_deref(), Some(failure.error.to_string().as_str()));
}

#[test_log::test]
fn document_without_dump_root_is_rejected() {
    let outcome = restore("<export><users/></export>");
    let failure = outcome.result.as_ref().unwrap_err();

    assert!(matches!(
        failure.error,
        RestoreError::CoreError(CoreError::InvalidInput(_))
    ));
    assert_eq!(outcome.sink.commits(), 0);
}
