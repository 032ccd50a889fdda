use serde::{Deserialize, Serialize};

use crate::owned::{OwnedFields, impl_owned};

/// Timezone definition stored in the database by older releases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTimezone {
    pub owned: OwnedFields,
    pub tzid: Option<String>,
    pub vtimezone: Option<String>,
    pub jtzid: Option<String>,
}

impl_owned!(LegacyTimezone);
