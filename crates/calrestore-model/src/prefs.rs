use serde::{Deserialize, Serialize};

use crate::owned::{OwnedFields, impl_owned};
use crate::value::Property;

/// Named set of collection paths shown together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub collection_paths: Vec<String>,
}

/// Per-user preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub owned: OwnedFields,
    pub email: Option<String>,
    pub default_calendar_path: Option<String>,
    pub skin_name: Option<String>,
    pub skin_style: Option<String>,
    pub preferred_view: Option<String>,
    pub preferred_view_period: Option<String>,
    pub work_days: Option<String>,
    pub workday_start: Option<i64>,
    pub workday_end: Option<i64>,
    pub preferred_end_type: Option<String>,
    pub user_mode: Option<i64>,
    pub page_size: Option<i64>,
    pub hour24: bool,
    pub schedule_auto_respond: bool,
    pub schedule_auto_cancel_action: Option<i64>,
    pub schedule_double_book: bool,
    pub schedule_auto_process_responses: Option<i64>,
    pub views: Vec<View>,
    pub properties: Vec<Property>,
}

impl_owned!(Preferences);

impl Preferences {
    #[must_use]
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }
}
