use calrestore_test::{DumpBuilder, EntityKind, RestoreError, owner, restore};

#[test_log::test]
fn sponsor_id_resolves_through_legacy_contacts() {
    let xml = DumpBuilder::new(3, 3)
        .users()
        .homes()
        .section(format!(
            "<sponsors><sponsor><id>7</id><uid>sp-7</uid>{}\
             <value><value>Arts Council</value></value></sponsor></sponsors>",
            owner(3, "alice")
        ))
        .section(format!(
            "<events><event><uid>ev-1</uid><calendar-path>/user/alice/calendar</calendar-path>{}\
             <sponsor>7</sponsor></event></events>",
            owner(3, "alice")
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.errors, 0, "{:?}", report.messages);
    assert_eq!(report.processed(EntityKind::Contact), 1);
    assert_eq!(report.processed(EntityKind::Event), 1);

    let event = outcome.sink.event_by_uid("ev-1").unwrap().event();
    assert_eq!(event.contacts, vec!["sp-7".to_owned()]);
}

#[test_log::test]
fn group_member_seen_before_its_user() {
    let xml = DumpBuilder::new(3, 2)
        .users()
        .section(
            "<adminGroups><adminGroup><account>calsuite-admins</account><owner>1</owner>\
             <groupMemberId>12</groupMemberId></adminGroup></adminGroups>",
        )
        .section("<users><user><id>12</id><account>dave</account></user></users>")
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.errors, 0, "{:?}", report.messages);
    let group = outcome.sink.admin_group("calsuite-admins").unwrap();
    assert_eq!(group.members.len(), 1);
    assert_eq!(group.members[0].href, "/principals/users/dave");
}

#[test_log::test]
fn foreign_subscriptions_with_one_name_are_kept_apart() {
    let key = owner(4, "alice");
    let xml = DumpBuilder::new(3, 4)
        .users()
        .homes()
        .section(format!(
            "<user-preferences><user-prefs>{key}<subscriptions>\
             <subscription>{key}<sub-name>Team Calendar</sub-name>\
             <sub-uri>bwcal:///public/team</sub-uri></subscription>\
             <subscription>{key}<sub-name>Team Calendar</sub-name>\
             <sub-uri>bwcal:///public/sports/team</sub-uri></subscription>\
             </subscriptions></user-prefs></user-preferences>"
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    let first = outcome.sink.collection("/user/alice/Team Calendar").unwrap();
    let second = outcome.sink.collection("/user/alice/Team Calendar_1").unwrap();
    assert_eq!(first.alias_uri.as_deref(), Some("bwcal:///public/team"));
    assert_eq!(second.alias_uri.as_deref(), Some("bwcal:///public/sports/team"));

    assert_eq!(report.messages_containing("Renamed subscription").count(), 1);
    assert!(
        report
            .subscription_fixes
            .iter()
            .any(|fix| fix.ends_with("/user/alice/Team Calendar_1"))
    );
}

#[test_log::test]
fn unknown_event_element_aborts_the_run() {
    let xml = DumpBuilder::new(3, 10)
        .users()
        .homes()
        .section(format!(
            "<events><event><uid>ev-1</uid><colPath>/user/alice/calendar</colPath>{}\
             <foobar>1</foobar></event></events>",
            owner(10, "alice")
        ))
        .build();

    let outcome = restore(&xml);
    let failure = outcome.result.as_ref().unwrap_err();

    assert!(matches!(
        failure.error,
        RestoreError::UnknownTag { entity: "event", ref tag } if tag == "foobar"
    ));
    assert!(failure.report.fatal.is_some());
    assert!(outcome.sink.events().is_empty());
    assert_eq!(outcome.sink.rollbacks(), 1);
}
