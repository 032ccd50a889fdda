use calrestore_test::{DumpBuilder, EntityKind, owner, restore};

fn prefs(minor: u32, account: &str, subscriptions: &[(&str, &str)]) -> String {
    let key = owner(minor, account);
    let subs = subscriptions
        .iter()
        .map(|(name, uri)| {
            format!(
                "<subscription>{key}<sub-name>{name}</sub-name>\
                 <sub-uri>{uri}</sub-uri></subscription>"
            )
        })
        .collect::<String>();
    format!(
        "<user-preferences><user-prefs>{key}<subscriptions>{subs}</subscriptions>\
         </user-prefs></user-preferences>"
    )
}

#[test_log::test]
fn own_collections_fold_into_the_home() {
    let xml = DumpBuilder::new(3, 4)
        .users()
        .homes()
        .section(prefs(
            4,
            "alice",
            &[
                ("work", "bwcal:///user/alice/work"),
                ("play", "bwcal:///user/alice/play"),
                ("mine", "bwcal:///user/alice"),
            ],
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.errors, 0, "{:?}", report.messages);
    assert_eq!(
        report.subscription_fixes,
        vec![
            "Subscription owner: alice\t dropped\t /user/alice/work".to_owned(),
            "Subscription owner: alice\t added\t /user/alice".to_owned(),
            "Subscription owner: alice\t dropped\t /user/alice/play".to_owned(),
            "Subscription owner: alice\t added\t /user/alice".to_owned(),
        ]
    );
    // Nothing new is created below the home.
    assert!(outcome.sink.collection("/user/alice/work").is_none());
    assert!(outcome.sink.collection("/user/alice/mine").is_none());
}

#[test_log::test]
fn public_user_subscription_is_world_readable() {
    let xml = DumpBuilder::new(3, 4)
        .users()
        .homes()
        .section(
            "<collections><collection><name>public-user</name><path>/user/public-user</path>\
             <colPath>/user</colPath><calType>0</calType>\
             <owner><user><account>public-user</account></user></owner></collection>\
             </collections>",
        )
        .section(prefs(4, "public-user", &[("Sports", "bwcal:///public/sports")]))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.errors, 0, "{:?}", report.messages);
    assert_eq!(
        report.subscription_fixes,
        vec!["Subscription owner: public-user\t added\t /user/public-user/Sports\t World readable"
            .to_owned()]
    );
    let alias = outcome.sink.collection("/user/public-user/Sports").unwrap();
    assert_eq!(alias.alias_uri.as_deref(), Some("bwcal:///public/sports"));
    assert!(alias.owned.access.is_some());
}

#[test_log::test]
fn subscription_of_another_owner_is_rejected() {
    let other = owner(4, "public-user");
    let xml = DumpBuilder::new(3, 4)
        .users()
        .homes()
        .section(format!(
            "<user-preferences><user-prefs>{}<subscriptions>\
             <subscription>{other}<sub-name>Team</sub-name>\
             <sub-uri>bwcal:///public/team</sub-uri></subscription>\
             </subscriptions></user-prefs></user-preferences>",
            owner(4, "alice")
        ))
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.messages_containing("Owners don't match").count(), 1);
    assert!(report.subscription_fixes.is_empty());
    assert!(outcome.sink.collection("/user/alice/Team").is_none());
}

#[test_log::test]
fn bad_subscription_keeps_the_preferences() {
    let xml = DumpBuilder::new(3, 2)
        .users()
        .homes()
        .section(
            "<user-preferences><user-prefs><owner>2</owner><subscriptions>\
             <subscription><sub-owner>2</sub-owner><sub-name>Team</sub-name>\
             <sub-uri>bwcal:///public/team</sub-uri></subscription>\
             <subscription><sub-owner>99</sub-owner><sub-name>Lost</sub-name>\
             <sub-uri>bwcal:///public/lost</sub-uri></subscription>\
             </subscriptions></user-prefs></user-preferences>",
        )
        .build();

    let outcome = restore(&xml);
    let report = outcome.result.as_ref().unwrap();

    assert_eq!(report.errored(EntityKind::Preferences), 0, "{:?}", report.messages);
    assert_eq!(report.messages_containing("Missing user 99").count(), 1);
    assert!(outcome.sink.collection("/user/alice/Team").is_some());
    assert!(outcome.sink.collection("/user/alice/Lost").is_none());
    assert!(outcome.sink.preferences("/principals/users/alice").is_some());
}

#[test_log::test]
fn migration_is_repeatable() {
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
             <subscription>{key}<sub-name>Team Calendar</sub-name>\
             <sub-uri>bwcal:///public/chess/team</sub-uri></subscription>\
             </subscriptions></user-prefs></user-preferences>"
        ))
        .build();

    let aliases = |outcome: &calrestore_test::Outcome| {
        ["", "_1", "_2", "_3"]
            .iter()
            .filter_map(|suffix| {
                let path = format!("/user/alice/Team Calendar{suffix}");
                outcome.sink.collection(&path).map(|c| (path, c.alias_uri.clone()))
            })
            .collect::<Vec<_>>()
    };

    let first = restore(&xml);
    let second = restore(&xml);

    assert_eq!(
        first.report().subscription_fixes,
        second.report().subscription_fixes
    );
    assert_eq!(aliases(&first), aliases(&second));
    assert_eq!(aliases(&first).len(), 3);
    assert_eq!(
        aliases(&first)[2],
        (
            "/user/alice/Team Calendar_2".to_owned(),
            Some("bwcal:///public/chess/team".to_owned())
        )
    );
}
