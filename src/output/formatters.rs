use chrono::Utc;

use crate::config::OutputFormat;
use crate::devices::DeviceData;

pub trait DataFormatter: Send + Sync {
    fn format_data(&self, data: &dyn DeviceData) -> String;

    /// One-line acknowledgement of a write command.
    fn format_ack(&self, message: &str) -> String;

    fn format_error(&self, error: &dyn std::error::Error) -> String;
}

pub fn formatter_for(format: OutputFormat) -> Box<dyn DataFormatter> {
    match format {
        OutputFormat::Console => Box::new(ConsoleFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_data(&self, data: &dyn DeviceData) -> String {
        let params = data.get_all_parameters();
        let width = params
            .iter()
            .filter(|(name, _)| !name.starts_with("Master"))
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            + 1;

        let mut output = String::new();
        output.push_str(&"-".repeat(33));
        output.push('\n');
        for (name, value) in params {
            // The any-relay-on flag is set apart from the per-relay rows.
            if name.starts_with("Master") {
                output.push_str("---\n");
            }
            output.push_str(&format!("{:<width$} {}\n", format!("{}:", name), value, width = width));
        }
        output.push_str(&"-".repeat(33));
        output
    }

    fn format_ack(&self, message: &str) -> String {
        format!("✅ {}", message)
    }

    fn format_error(&self, error: &dyn std::error::Error) -> String {
        format!("❌ {}", error)
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_data(&self, data: &dyn DeviceData) -> String {
        let json_data = serde_json::json!({
            "type": data.title(),
            "timestamp": data.timestamp().to_rfc3339(),
            "data": data.to_json()
        });

        serde_json::to_string_pretty(&json_data).unwrap_or_default()
    }

    fn format_ack(&self, message: &str) -> String {
        serde_json::json!({
            "status": "ok",
            "timestamp": Utc::now().to_rfc3339(),
            "message": message
        })
        .to_string()
    }

    fn format_error(&self, error: &dyn std::error::Error) -> String {
        serde_json::json!({
            "status": "error",
            "timestamp": Utc::now().to_rfc3339(),
            "message": error.to_string()
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::types::{DeviceInfo, FirmwareVersion, RelayState, RelayStatus};
    use crate::utils::error::{RelayError, ValidationError};
    use serde_json::Value;

    fn sample_status() -> RelayStatus {
        RelayStatus {
            timestamp: Utc::now(),
            relays: vec![
                RelayState::On,
                RelayState::Off,
                RelayState::Off,
                RelayState::Off,
                RelayState::Off,
                RelayState::Off,
                RelayState::Off,
                RelayState::On,
            ],
            any_relay_on: true,
        }
    }

    #[test]
    fn test_console_status_table() {
        let text = ConsoleFormatter.format_data(&sample_status());
        assert!(text.contains("Relay 0: "));
        assert!(text.lines().any(|l| l.starts_with("Relay 7:") && l.ends_with("ON")));
        assert!(text.contains("---\nMaster Status (Any Relay On): ON"));
    }

    #[test]
    fn test_console_device_info() {
        let info = DeviceInfo {
            timestamp: Utc::now(),
            firmware_version: FirmwareVersion::from((1, 0, 1)),
            device_name: "ESP32 Relay Board".to_string(),
            serial_number: 4211583,
        };
        let text = ConsoleFormatter.format_data(&info);
        assert!(text.contains("Device Name:      ESP32 Relay Board"));
        assert!(text.contains("Firmware Version: v1.0.1"));
        assert!(text.contains("Serial Number:    4211583"));
    }

    #[test]
    fn test_json_output_parses() {
        let text = JsonFormatter.format_data(&sample_status());
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "Relay Status");
        assert_eq!(value["data"]["relays"][7], "ON");
        assert_eq!(value["data"]["any_relay_on"], true);

        let err = RelayError::from(ValidationError::RelayIndexOutOfRange(8));
        let value: Value = serde_json::from_str(&JsonFormatter.format_error(&err)).unwrap();
        assert_eq!(value["status"], "error");
    }
}
