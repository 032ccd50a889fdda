//! System parameters and their compiled-in defaults.

use serde::{Deserialize, Serialize};

/// Class names written by releases that no longer ship them. A restored value
/// equal to one of these is replaced by the default for the same field.
pub const OBSOLETE_USERAUTH_CLASS: &str = "org.bedework.calcore.hibernate.UserAuthUWDbImpl";
pub const OBSOLETE_ADMINGROUPS_CLASS: &str = "org.bedework.calcore.hibernate.AdminGroupsDbImpl";
pub const OBSOLETE_USERGROUPS_CLASS: &str = "org.bedework.calcore.hibernate.GroupsDbImpl";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemParameters {
    pub name: Option<String>,
    pub tzid: Option<String>,
    pub system_id: Option<String>,
    pub public_calendar_root: Option<String>,
    pub user_calendar_root: Option<String>,
    pub user_default_calendar: Option<String>,
    pub default_trash_calendar: Option<String>,
    pub user_inbox: Option<String>,
    pub user_outbox: Option<String>,
    pub deleted_calendar: Option<String>,
    pub busy_calendar: Option<String>,
    pub default_user_view_name: Option<String>,
    pub public_user: Option<String>,
    pub http_connections_per_user: i64,
    pub http_connections_per_host: i64,
    pub http_connections: i64,
    pub max_public_description_length: i64,
    pub max_user_description_length: i64,
    pub max_user_entity_size: i64,
    pub default_user_quota: i64,
    pub max_instances: i64,
    pub max_years: i64,
    pub userauth_class: Option<String>,
    pub mailer_class: Option<String>,
    pub admingroups_class: Option<String>,
    pub usergroups_class: Option<String>,
    pub directory_browsing_disallowed: bool,
    pub index_root: Option<String>,
    /// Comma separated superuser accounts.
    pub root_users: Option<String>,
}

impl SystemParameters {
    /// Defaults applied to fields a dump leaves unset.
    #[must_use]
    pub fn builtin_defaults() -> Self {
        Self {
            name: Some("bedework".into()),
            tzid: Some("America/New_York".into()),
            system_id: Some("demobedework@mysite.edu".into()),
            public_calendar_root: Some("public".into()),
            user_calendar_root: Some("user".into()),
            user_default_calendar: Some("calendar".into()),
            default_trash_calendar: Some("Trash".into()),
            user_inbox: Some("Inbox".into()),
            user_outbox: Some("Outbox".into()),
            deleted_calendar: Some("Deleted".into()),
            busy_calendar: Some("Busy".into()),
            default_user_view_name: Some("All".into()),
            public_user: Some(calrestore_core::constants::DEFAULT_PUBLIC_USER.into()),
            http_connections_per_user: 10,
            http_connections_per_host: 50,
            http_connections: 100,
            max_public_description_length: 500,
            max_user_description_length: 500,
            max_user_entity_size: 100_000,
            default_user_quota: 1_000_000,
            max_instances: 1000,
            max_years: 10,
            userauth_class: Some("org.bedework.calsvc.userauth.UserAuthDefault".into()),
            mailer_class: Some("org.bedework.mail.DummyMailer".into()),
            admingroups_class: Some("org.bedework.calsvc.groups.AdminGroupsDbImpl".into()),
            usergroups_class: Some("org.bedework.calsvc.groups.GroupsDbImpl".into()),
            directory_browsing_disallowed: false,
            index_root: Some("/bedework/lucene".into()),
            root_users: None,
        }
    }

    /// ## Summary
    /// Fills unset fields from `defaults` and replaces obsolete class names.
    /// Returns the names of the fields that changed.
    pub fn merge_defaults(&mut self, defaults: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();

        macro_rules! default_str {
            ($($field:ident),+ $(,)?) => {
                $(
                    if self.$field.is_none() && defaults.$field.is_some() {
                        self.$field.clone_from(&defaults.$field);
                        changed.push(stringify!($field));
                    }
                )+
            };
        }

        macro_rules! default_int {
            ($($field:ident),+ $(,)?) => {
                $(
                    if self.$field == 0 && defaults.$field != 0 {
                        self.$field = defaults.$field;
                        changed.push(stringify!($field));
                    }
                )+
            };
        }

        macro_rules! replace_obsolete {
            ($($field:ident => $obsolete:expr),+ $(,)?) => {
                $(
                    if self.$field.as_deref() == Some($obsolete) {
                        self.$field.clone_from(&defaults.$field);
                        changed.push(stringify!($field));
                    }
                )+
            };
        }

        default_str!(
            name,
            tzid,
            system_id,
            public_calendar_root,
            user_calendar_root,
            user_default_calendar,
            default_trash_calendar,
            user_inbox,
            user_outbox,
            deleted_calendar,
            busy_calendar,
            default_user_view_name,
            public_user,
        );

        default_int!(max_instances, max_years);

        replace_obsolete!(
            userauth_class => OBSOLETE_USERAUTH_CLASS,
            admingroups_class => OBSOLETE_ADMINGROUPS_CLASS,
            usergroups_class => OBSOLETE_USERGROUPS_CLASS,
        );

        default_str!(
            userauth_class,
            mailer_class,
            admingroups_class,
            usergroups_class,
            index_root,
        );

        changed
    }

    #[must_use]
    pub fn root_user_list(&self) -> Vec<&str> {
        self.root_users
            .as_deref()
            .map(|rus| rus.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// ## Summary
    /// Appends an account to the root users. Returns false if already present.
    pub fn add_root_user(&mut self, account: &str) -> bool {
        if self.root_user_list().contains(&account) {
            return false;
        }

        self.root_users = Some(match self.root_users.take() {
            Some(existing) if !existing.is_empty() => format!("{existing},{account}"),
            _ => account.to_owned(),
        });

        true
    }

    #[must_use]
    pub fn user_calendar_root(&self) -> &str {
        self.user_calendar_root.as_deref().unwrap_or("user")
    }

    #[must_use]
    pub fn public_user(&self) -> Option<&str> {
        self.public_user.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_fills_missing_and_keeps_present() {
        let defaults = SystemParameters::builtin_defaults();
        let mut restored = SystemParameters {
            tzid: Some("Europe/London".into()),
            max_years: 5,
            ..SystemParameters::default()
        };

        let changed = restored.merge_defaults(&defaults);

        assert_eq!(restored.tzid.as_deref(), Some("Europe/London"));
        assert_eq!(restored.max_years, 5);
        assert_eq!(restored.user_calendar_root.as_deref(), Some("user"));
        assert_eq!(restored.max_instances, 1000);
        assert!(changed.contains(&"user_calendar_root"));
        assert!(!changed.contains(&"tzid"));
    }

    #[test]
    fn merge_replaces_obsolete_class_names() {
        let defaults = SystemParameters::builtin_defaults();
        let mut restored = SystemParameters {
            userauth_class: Some(OBSOLETE_USERAUTH_CLASS.into()),
            admingroups_class: Some("com.example.CustomGroups".into()),
            ..SystemParameters::default()
        };

        restored.merge_defaults(&defaults);

        assert_eq!(restored.userauth_class, defaults.userauth_class);
        assert_eq!(
            restored.admingroups_class.as_deref(),
            Some("com.example.CustomGroups")
        );
    }

    #[test]
    fn root_users_append_once() {
        let mut syspars = SystemParameters::default();
        assert!(syspars.add_root_user("admin"));
        assert!(syspars.add_root_user("douglm"));
        assert!(!syspars.add_root_user("admin"));

        assert_eq!(syspars.root_users.as_deref(), Some("admin,douglm"));
        assert_eq!(syspars.root_user_list(), vec!["admin", "douglm"]);
    }
}
