use std::collections::BTreeMap;

use harmony_stanza::DecodeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

// ── Activity ids and status ───────────────────────────────────────────────────

/// Activity id the hub reports when everything is off.
pub const POWER_OFF_ACTIVITY: &str = "-1";

pub const ACTIVITY_STATUS_OFF: i64 = 0;
pub const ACTIVITY_STATUS_STARTING: i64 = 1;
pub const ACTIVITY_STATUS_STARTED: i64 = 2;
pub const ACTIVITY_STATUS_STOPPING: i64 = 3;

/// Status a state digest reports once `activity_id` has been reached:
/// [`ACTIVITY_STATUS_OFF`] for the power-off activity, otherwise
/// [`ACTIVITY_STATUS_STARTED`].
pub fn settled_status(activity_id: &str) -> i64 {
    if activity_id == POWER_OFF_ACTIVITY {
        ACTIVITY_STATUS_OFF
    } else {
        ACTIVITY_STATUS_STARTED
    }
}

/// Hubs send ids both as JSON strings and as bare numbers.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

// ── State digest ──────────────────────────────────────────────────────────────

/// Unsolicited broadcast describing the hub's current activity state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateDigest {
    #[serde(deserialize_with = "id_string")]
    pub activity_id: String,
    pub activity_status: i64,
    /// Remaining hub-defined fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl StateDigest {
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(value)?)
    }

    /// True when this digest reports `activity_id` as settled.
    pub fn confirms(&self, activity_id: &str) -> bool {
        self.activity_id == activity_id && self.activity_status == settled_status(activity_id)
    }
}

// ── Hub configuration catalog ─────────────────────────────────────────────────

/// Typed view of the `config` command reply.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    #[serde(default)]
    pub activity: Vec<Activity>,
    #[serde(default)]
    pub device: Vec<Device>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl HubConfig {
    pub fn from_value(value: JsonValue) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Case-insensitive activity lookup by label.
    pub fn activity_by_label(&self, label: &str) -> Option<&Activity> {
        self.activity
            .iter()
            .find(|activity| activity.label.eq_ignore_ascii_case(label))
    }

    pub fn device_by_label(&self, label: &str) -> Option<&Device> {
        self.device.iter().find(|device| device.label.eq_ignore_ascii_case(label))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl Activity {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub control_group: Vec<ControlGroup>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl Device {
    /// Finds a function by group and function name, both case-insensitive.
    pub fn find_function(&self, group: &str, name: &str) -> Option<&DeviceFunction> {
        self.control_group
            .iter()
            .filter(|candidate| candidate.name.eq_ignore_ascii_case(group))
            .flat_map(|candidate| candidate.function.iter())
            .find(|function| function.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ControlGroup {
    pub name: String,
    #[serde(default)]
    pub function: Vec<DeviceFunction>,
}

/// One button of a device. `action` is the descriptor passed to
/// [`HarmonyClient::hold_action`](crate::HarmonyClient::hold_action).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeviceFunction {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub action: String,
}
