use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::owned::{OwnedFields, impl_owned};
use crate::value::{LocalizedString, Property};

pub const CAL_TYPE_FOLDER: i32 = 0;
pub const CAL_TYPE_CALENDAR: i32 = 1;
pub const CAL_TYPE_ALIAS: i32 = 7;
pub const CAL_TYPE_EXT_SUB: i32 = 8;

/// Scheme prefix of internal alias uris.
pub const INTERNAL_ALIAS_SCHEME: &str = "bwcal://";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionLastmod {
    pub timestamp: Option<String>,
    pub sequence: i64,
}

/// A calendar collection, folder or alias.
#[expect(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub owned: OwnedFields,
    pub name: String,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub mail_list_id: Option<String>,
    pub cal_type: i32,
    pub alias_uri: Option<String>,
    pub display: bool,
    pub affects_free_busy: bool,
    pub ignore_transparency: bool,
    pub unremoveable: bool,
    pub color: Option<String>,
    pub filter_expr: Option<String>,
    pub refresh_rate: Option<i64>,
    pub last_refresh: Option<String>,
    pub last_etag: Option<String>,
    pub remote_id: Option<String>,
    pub created: Option<String>,
    pub lastmod: Option<CollectionLastmod>,
    /// Category uids.
    pub categories: Vec<String>,
    pub properties: Vec<Property>,
    pub summaries: Vec<LocalizedString>,
}

impl_owned!(Collection);

impl Collection {
    /// Collection path targeted by an internal alias uri.
    #[must_use]
    pub fn internal_alias_path(&self) -> Option<&str> {
        self.alias_uri
            .as_deref()
            .and_then(|uri| uri.strip_prefix(INTERNAL_ALIAS_SCHEME))
    }

    #[must_use]
    pub fn is_external_subscription(&self) -> bool {
        self.cal_type == CAL_TYPE_EXT_SUB
    }

    /// Parent path, `None` for a root collection.
    #[must_use]
    pub fn parent_path(&self) -> Option<&str> {
        self.owned.col_path.as_deref().filter(|p| !p.is_empty())
    }
}

/// Calendar suite administered by an admin group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalSuite {
    pub owned: OwnedFields,
    pub name: String,
    pub group_href: Option<String>,
    pub root_collection_path: Option<String>,
    pub submissions_root_path: Option<String>,
    pub created: Option<NaiveDateTime>,
}

impl_owned!(CalSuite);
