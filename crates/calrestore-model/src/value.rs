use std::fmt;

use serde::{Deserialize, Serialize};

/// String with an optional language tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedString {
    pub lang: Option<String>,
    pub value: Option<String>,
}

impl LocalizedString {
    #[must_use]
    pub fn new(lang: Option<String>, value: impl Into<String>) -> Self {
        Self {
            lang,
            value: Some(value.into()),
        }
    }

    #[must_use]
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// Owner plus uid, the key of vocabulary entities in older dumps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerUidKey {
    pub owner_href: String,
    pub uid: String,
}

impl OwnerUidKey {
    #[must_use]
    pub fn new(owner_href: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            owner_href: owner_href.into(),
            uid: uid.into(),
        }
    }
}

impl fmt::Display for OwnerUidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_href, self.uid)
    }
}

/// A start, end or recurrence date-time as restored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeValue {
    pub date_only: bool,
    pub tzid: Option<String>,
    /// Local value, `YYYYMMDD` or `YYYYMMDDTHHMMSS[Z]`.
    pub dtval: String,
    /// UTC form of `dtval`.
    pub date: String,
}

/// Free-form name/value property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}
