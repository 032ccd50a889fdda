use serde::{Deserialize, Serialize};

use crate::owned::{OwnedFields, impl_owned};
use crate::value::{LocalizedString, OwnerUidKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub owned: OwnedFields,
    pub id: Option<i64>,
    pub uid: Option<String>,
    pub word: Option<LocalizedString>,
    pub description: Option<LocalizedString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub owned: OwnedFields,
    pub id: Option<i64>,
    pub uid: Option<String>,
    pub address: Option<LocalizedString>,
    pub subaddress: Option<LocalizedString>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub owned: OwnedFields,
    pub id: Option<i64>,
    pub uid: Option<String>,
    pub name: Option<LocalizedString>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub link: Option<String>,
}

impl_owned!(Category, Location, Contact);

macro_rules! owner_uid_key {
    ($($ty:ty),+) => {
        $(
            impl $ty {
                /// Owner plus uid, when both are known.
                #[must_use]
                pub fn owner_uid_key(&self) -> Option<OwnerUidKey> {
                    Some(OwnerUidKey::new(
                        self.owned.owner_href.clone()?,
                        self.uid.clone()?,
                    ))
                }
            }
        )+
    };
}

owner_uid_key!(Category, Location, Contact);
