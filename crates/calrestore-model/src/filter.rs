use serde::{Deserialize, Serialize};

use crate::owned::{OwnedFields, impl_owned};
use crate::value::LocalizedString;

/// A named, stored filter expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDef {
    pub owned: OwnedFields,
    pub name: String,
    pub definition: Option<String>,
    pub descriptions: Vec<LocalizedString>,
    pub display_names: Vec<LocalizedString>,
}

impl_owned!(FilterDef);
