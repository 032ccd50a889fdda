use calrestore_test::{DumpBuilder, EntityKind, owner, restore};

/// One location and one timed event, as 3.4 wrote them.
fn legacy_dump() -> String {
    DumpBuilder::new(3, 4)
        .users()
        .homes()
        .section(format!(
            "<locations><location><id>9</id><uid>loc-9</uid>{}\
             <addr><lang>en</lang><value>Main hall</value></addr></location></locations>",
            owner(4, "alice")
        ))
        .section(format!(
            "<events><event><uid>ev-1</uid><calendar-path>/user/alice/calendar</calendar-path>{}\
             <summaries><summary><lang>en</lang><value>Talk</value></summary></summaries>\
             <start-date-type>false</start-date-type><start-tzid>Europe/Paris</start-tzid>\
             <start-dtval>20260301T090000</start-dtval><start-date>20260301T080000Z</start-date>\
             <end-date-type>false</end-date-type><end-tzid>Europe/Paris</end-tzid>\
             <end-dtval>20260301T100000</end-dtval><end-date>20260301T090000Z</end-date>\
             <end-type>E</end-type><location>9</location></event></events>",
            owner(4, "alice")
        ))
        .build()
}

/// The same records as 3.10 writes them.
fn current_dump() -> String {
    let date_time = |tag: &str, dtval: &str, date: &str| {
        format!(
            "<{tag}><date-time><dateType>false</dateType><tzid>Europe/Paris</tzid>\
             <dtval>{dtval}</dtval><date>{date}</date></date-time></{tag}>"
        )
    };
    DumpBuilder::new(3, 10)
        .users()
        .homes()
        .section(format!(
            "<locations><location><uid>loc-9</uid>{}\
             <address><bwstring><lang>en</lang><value>Main hall</value></bwstring></address>\
             </location></locations>",
            owner(10, "alice")
        ))
        .section(format!(
            "<events><event><uid>ev-1</uid><colPath>/user/alice/calendar</colPath>{}\
             <summaries><summary><bwstring><lang>en</lang><value>Talk</value></bwstring>\
             </summary></summaries>{}{}<endType>E</endType>\
             <location><location><uid>loc-9</uid></location></location></event></events>",
            owner(10, "alice"),
            date_time("dtstart", "20260301T090000", "20260301T080000Z"),
            date_time("dtend", "20260301T100000", "20260301T090000Z"),
        ))
        .build()
}

#[test_log::test]
fn legacy_and_current_layouts_restore_alike() {
    let legacy = restore(&legacy_dump());
    let current = restore(&current_dump());

    for outcome in [&legacy, &current] {
        let report = outcome.result.as_ref().unwrap();
        assert_eq!(report.errors, 0, "{:?}", report.messages);
        assert_eq!(report.warnings, 0, "{:?}", report.messages);
        assert_eq!(report.processed(EntityKind::Event), 1);
    }

    let old = legacy.sink.event_by_uid("ev-1").unwrap().event();
    let new = current.sink.event_by_uid("ev-1").unwrap().event();
    assert_eq!(old.summaries, new.summaries);
    assert_eq!(old.dtstart, new.dtstart);
    assert_eq!(old.dtend, new.dtend);
    assert_eq!(old.end_type, new.end_type);
    assert_eq!(old.location.as_deref(), Some("loc-9"));
    assert_eq!(old.location, new.location);
    assert_eq!(old.owned.owner_href, new.owned.owner_href);
}

#[test_log::test]
fn report_carries_dump_version() {
    let xml = DumpBuilder::new(3, 10)
        .dump_date("2026-01-02T10:00:00")
        .users()
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.version.as_deref(), Some("3.10.0"));
    assert_eq!(report.dump_date.as_deref(), Some("2026-01-02T10:00:00"));
    assert_eq!(report.processed(EntityKind::User), 3);
}

#[test_log::test]
fn vendor_tzid_is_converted() {
    let xml = DumpBuilder::new(3, 10)
        .users()
        .homes()
        .section(format!(
            "<events><event><uid>ev-1</uid><colPath>/user/alice/calendar</colPath>{}\
             <dtstart><date-time><dateType>false</dateType>\
             <tzid>/mozilla.org/20050126_1/America/New_York</tzid>\
             <dtval>20260115T100000</dtval><date>20260115T150000Z</date></date-time></dtstart>\
             </event></events>",
            owner(10, "alice")
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.converted_tzids, 1);
    let start = outcome
        .sink
        .event_by_uid("ev-1")
        .unwrap()
        .event()
        .dtstart
        .clone()
        .unwrap();
    assert_eq!(start.tzid.as_deref(), Some("America/New_York"));
}

#[test_log::test]
fn unknown_tzid_is_listed() {
    let xml = DumpBuilder::new(3, 10)
        .users()
        .homes()
        .section(format!(
            "<events><event><uid>ev-1</uid><colPath>/user/alice/calendar</colPath>{}\
             <dtstart><date-time><dateType>false</dateType><tzid>Campus/Nowhere</tzid>\
             <dtval>20260115T100000</dtval></date-time></dtstart></event></events>",
            owner(10, "alice")
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert!(report.unmatched_tzids.contains("Campus/Nowhere"));
    let start = outcome
        .sink
        .event_by_uid("ev-1")
        .unwrap()
        .event()
        .dtstart
        .clone()
        .unwrap();
    assert_eq!(start.tzid, None);
}
