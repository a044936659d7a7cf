use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The latest full state reported by the display process.
///
/// Replaced wholesale on every `CURRENT_STATUS` and kept exactly as
/// received, so the full-state query echoes the payload back unchanged.
/// The fields the control surface reads are looked up on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Value);

impl Snapshot {
    pub fn from_payload(payload: Value) -> Self {
        Self(payload)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Module list as JSON, `null` when the display never reported one.
    pub fn module_data_json(&self) -> Value {
        self.0.get("moduleData").cloned().unwrap_or(Value::Null)
    }

    /// Reported brightness. The display may send it as a number or as the
    /// string the brightness action forwarded.
    pub fn brightness(&self) -> Option<&Value> {
        self.0
            .get("brightness")
            .filter(|b| b.is_number() || b.is_string())
    }

    pub fn brightness_json(&self) -> Value {
        self.brightness().cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_known_fields_and_keeps_the_rest() {
        let snap = Snapshot::from_payload(json!({
            "moduleData": [{"identifier": "module_0_clock", "hidden": false}],
            "brightness": 80,
            "settingsVersion": 2
        }));
        assert_eq!(snap.brightness_json(), json!(80));
        assert_eq!(snap.module_data_json()[0]["identifier"], "module_0_clock");
        assert_eq!(snap.as_value()["settingsVersion"], 2);
    }

    #[test]
    fn serializes_back_to_the_received_shape() {
        let payload = json!({"moduleData": [], "brightness": 100, "x": "y"});
        let snap = Snapshot::from_payload(payload.clone());
        assert_eq!(serde_json::to_value(&snap).unwrap(), payload);
    }

    #[test]
    fn string_brightness_keeps_module_data() {
        let payload = json!({"moduleData": [{"identifier": "m0"}], "brightness": "70"});
        let snap = Snapshot::from_payload(payload.clone());
        assert_eq!(snap.module_data_json(), json!([{"identifier": "m0"}]));
        assert_eq!(snap.brightness_json(), json!("70"));
        assert_eq!(serde_json::to_value(&snap).unwrap(), payload);
    }

    #[test]
    fn unusable_brightness_reads_as_unknown() {
        let snap = Snapshot::from_payload(json!({"brightness": {"level": 3}}));
        assert!(snap.brightness().is_none());
        assert_eq!(snap.as_value()["brightness"]["level"], 3);
    }

    #[test]
    fn null_payload_is_empty_snapshot() {
        let snap = Snapshot::from_payload(Value::Null);
        assert_eq!(snap.module_data_json(), Value::Null);
        assert_eq!(snap.brightness_json(), Value::Null);
    }
}
