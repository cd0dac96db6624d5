use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{DeviceInfo, RelayStatus};

/// A read result that can be rendered by the output formatters.
pub trait DeviceData: Send + Sync {
    fn title(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
    fn to_json(&self) -> Value;

    /// Display rows in order, as `(label, value)`.
    fn get_all_parameters(&self) -> Vec<(String, String)>;

    fn get_parameter(&self, name: &str) -> Option<String> {
        self.get_all_parameters()
            .into_iter()
            .find(|(label, _)| label == name)
            .map(|(_, value)| value)
    }
}

impl DeviceData for RelayStatus {
    fn title(&self) -> &str {
        "Relay Status"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn get_all_parameters(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .relays
            .iter()
            .enumerate()
            .map(|(i, state)| (format!("Relay {}", i), state.to_string()))
            .collect();
        params.push((
            "Master Status (Any Relay On)".to_string(),
            if self.any_relay_on { "ON" } else { "OFF" }.to_string(),
        ));
        params
    }
}

impl DeviceData for DeviceInfo {
    fn title(&self) -> &str {
        "Device Information"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn get_all_parameters(&self) -> Vec<(String, String)> {
        vec![
            ("Device Name".to_string(), self.device_name.clone()),
            ("Firmware Version".to_string(), self.firmware_version.to_string()),
            ("Serial Number".to_string(), self.serial_number.to_string()),
        ]
    }
}
