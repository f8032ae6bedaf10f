/// Config flow: the single, field-less setup step.
///
/// The integration is a singleton. Any attempt to start the flow while an
/// entry exists aborts with `single_instance_allowed`.

use crate::host::config_entries::ConfigEntry;
use crate::model::DOMAIN;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const VERSION: u32 = 1;
pub const STEP_USER: &str = "user";
pub const TITLE: &str = "Magyar Vizek Hőmérséklete";
pub const DESCRIPTION: &str =
    "A Magyar Vizek Hőmérséklete integráció adatait a HungaroMet biztosítja";

pub const ABORT_SINGLE_INSTANCE: &str = "single_instance_allowed";

/// Submitted form values. The form has no fields, so this is always empty
/// in practice.
pub type UserInput = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    Form {
        step_id: String,
        /// Field names of the form schema.
        data_schema: Vec<String>,
        description_placeholders: BTreeMap<String, String>,
    },
    CreateEntry {
        title: String,
        data: Map<String, Value>,
        unique_id: String,
        version: u32,
        description_placeholders: BTreeMap<String, String>,
    },
    Abort {
        reason: String,
    },
}

impl FlowResult {
    fn abort(reason: &str) -> Self {
        FlowResult::Abort {
            reason: reason.to_string(),
        }
    }
}

/// One run of the flow against the entries that exist right now.
pub struct ConfigFlow<'a> {
    current_entries: &'a [ConfigEntry],
}

impl<'a> ConfigFlow<'a> {
    /// `current_entries` must be this integration's entries only.
    pub fn new(current_entries: &'a [ConfigEntry]) -> Self {
        Self { current_entries }
    }

    /// Handles the user step: show the empty form when `user_input` is
    /// `None`, create the entry once it is submitted.
    pub fn step_user(&self, user_input: Option<&UserInput>) -> FlowResult {
        if !self.current_entries.is_empty() {
            return FlowResult::abort(ABORT_SINGLE_INSTANCE);
        }

        if user_input.is_none() {
            return FlowResult::Form {
                step_id: STEP_USER.to_string(),
                data_schema: Vec::new(),
                description_placeholders: placeholders(),
            };
        }

        FlowResult::CreateEntry {
            title: TITLE.to_string(),
            data: Map::new(),
            unique_id: DOMAIN.to_string(),
            version: VERSION,
            description_placeholders: placeholders(),
        }
    }
}

fn placeholders() -> BTreeMap<String, String> {
    BTreeMap::from([("description".to_string(), DESCRIPTION.to_string())])
}
