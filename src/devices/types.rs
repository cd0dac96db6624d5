use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::modbus::address_map::RELAY_COUNT;
use crate::utils::error::ValidationError;

/// Index of one of the board's relays, always in `0..RELAY_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64")]
pub struct RelayIndex(u8);

impl RelayIndex {
    pub const MIN: i64 = 0;
    pub const MAX: i64 = RELAY_COUNT as i64 - 1;

    pub fn new(index: i64) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&index) {
            Ok(Self(index as u8))
        } else {
            Err(ValidationError::RelayIndexOutOfRange(index))
        }
    }

    pub fn all() -> impl Iterator<Item = RelayIndex> {
        (0..RELAY_COUNT as u8).map(RelayIndex)
    }

    /// Address of this relay's slot in a per-relay region.
    pub fn offset_from(&self, base: u16) -> u16 {
        base + self.0 as u16
    }
}

impl std::ops::Deref for RelayIndex {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<i64> for RelayIndex {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for RelayIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub fn is_on(&self) -> bool {
        matches!(self, RelayState::On)
    }
}

impl From<bool> for RelayState {
    fn from(value: bool) -> Self {
        if value {
            RelayState::On
        } else {
            RelayState::Off
        }
    }
}

impl FromStr for RelayState {
    type Err = ValidationError;

    /// Accepts `1`/`0`, `on`/`off` and `true`/`false`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "on" | "true" => Ok(RelayState::On),
            "0" | "off" | "false" => Ok(RelayState::Off),
            other => Err(ValidationError::InvalidInput(format!(
                "'{}' is not a relay state (use 1 for ON, 0 for OFF)",
                other
            ))),
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_on() { "ON" } else { "OFF" })
    }
}

/// Timed-run length in milliseconds; fits the 16-bit duration register and is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64")]
pub struct ArmDuration(u16);

impl ArmDuration {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = u16::MAX as i64;

    pub fn from_millis(ms: i64) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&ms) {
            Ok(Self(ms as u16))
        } else {
            Err(ValidationError::DurationOutOfRange(ms))
        }
    }

    pub fn as_millis(&self) -> u16 {
        self.0
    }
}

impl TryFrom<i64> for ArmDuration {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_millis(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl From<(u8, u8, u8)> for FirmwareVersion {
    fn from((major, minor, patch): (u8, u8, u8)) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Snapshot of every relay coil plus the device-computed "any relay on" flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayStatus {
    pub timestamp: DateTime<Utc>,
    pub relays: Vec<RelayState>,
    pub any_relay_on: bool,
}

impl RelayStatus {
    pub fn state_of(&self, index: RelayIndex) -> Option<RelayState> {
        self.relays.get(*index as usize).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub timestamp: DateTime<Utc>,
    pub firmware_version: FirmwareVersion,
    pub device_name: String,
    pub serial_number: u32,
}
