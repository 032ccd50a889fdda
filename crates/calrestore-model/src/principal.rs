use calrestore_core::principal::{PrincipalKey, PrincipalKind};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::owned::{OwnedFields, impl_owned};

/// A user principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Surrogate id from dumps that still carry one.
    pub id: Option<i64>,
    pub account: String,
    pub principal_ref: String,
    pub created: Option<NaiveDateTime>,
    pub logon: Option<NaiveDateTime>,
    pub last_access: Option<NaiveDateTime>,
    pub last_modify: Option<NaiveDateTime>,
    pub category_access: Option<String>,
    pub location_access: Option<String>,
    pub contact_access: Option<String>,
    pub quota: Option<i64>,
}

impl User {
    #[must_use]
    pub fn key(&self) -> PrincipalKey {
        PrincipalKey::new(PrincipalKind::User, self.principal_ref.clone())
    }
}

/// Administrative group. Members are kept as keys and attached by the sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminGroup {
    pub owned: OwnedFields,
    pub id: Option<i64>,
    pub account: String,
    pub principal_ref: String,
    pub description: Option<String>,
    pub group_owner_href: Option<String>,
    pub members: Vec<PrincipalKey>,
}

impl_owned!(AdminGroup);

impl AdminGroup {
    #[must_use]
    pub fn key(&self) -> PrincipalKey {
        PrincipalKey::new(PrincipalKind::AdminGroup, self.principal_ref.clone())
    }
}

/// Auto-add setting and preferred item list of one preference block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoAddPrefs {
    pub auto_add: bool,
    /// Uids, or collection paths for the collection block.
    pub preferred: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUserPrefs {
    pub category: AutoAddPrefs,
    pub collection: AutoAddPrefs,
    pub contact: AutoAddPrefs,
    pub location: AutoAddPrefs,
}

/// A user authorised to use the administrative client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_href: Option<String>,
    pub usertype: i64,
    pub prefs: AuthUserPrefs,
}
