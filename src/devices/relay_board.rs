use chrono::Utc;
use log::{debug, info, warn};

use super::types::{ArmDuration, DeviceInfo, FirmwareVersion, RelayIndex, RelayState, RelayStatus};
use crate::modbus::address_map::*;
use crate::modbus::client::ModbusTransport;
use crate::modbus::codec;
use crate::utils::error::{RelayError, TransportError};

/// Relay-bank controller operations, each a fixed sequence of Modbus requests.
///
/// Holds no device state: every call goes to the device and nothing is cached.
#[derive(Debug, Clone, Default)]
pub struct RelayBoard;

impl RelayBoard {
    pub fn new() -> Self {
        Self
    }

    /// Reads all relay coils, then the "any relay on" coil.
    ///
    /// Either read failing fails the whole status.
    pub async fn read_all_relay_status(
        &self,
        client: &dyn ModbusTransport,
    ) -> Result<RelayStatus, RelayError> {
        info!("📊 Reading relay status");
        let coils = client.read_coils(COIL_MANUAL_START_ADDR, RELAY_COUNT).await?;
        let any_on = client.read_coils(COIL_ANY_RELAY_ON_ADDR, 1).await?;
        let any_relay_on = *any_on.first().ok_or_else(|| {
            TransportError::InvalidResponse("empty any-relay-on response".to_string())
        })?;

        Ok(RelayStatus {
            timestamp: Utc::now(),
            relays: codec::decode_coil_array(&coils),
            any_relay_on,
        })
    }

    pub async fn set_relay_manual(
        &self,
        client: &dyn ModbusTransport,
        index: i64,
        state: RelayState,
    ) -> Result<(), RelayError> {
        let relay = RelayIndex::new(index)?;
        info!("🔧 Setting relay {} to {}", relay, state);
        client
            .write_single_coil(
                relay.offset_from(COIL_MANUAL_START_ADDR),
                codec::encode_relay_state(state),
            )
            .await?;
        Ok(())
    }

    /// Writes the duration register, then sets the arm flag.
    ///
    /// The device latches the duration when the global trigger fires, so the
    /// register must hold the new value before the relay is armed. If the arm
    /// write fails the new duration stays on the device and the relay stays
    /// unarmed; this is reported as `ArmIncomplete` and not rolled back.
    pub async fn arm_relay(
        &self,
        client: &dyn ModbusTransport,
        index: i64,
        duration_ms: i64,
    ) -> Result<(), RelayError> {
        let relay = RelayIndex::new(index)?;
        let duration = ArmDuration::from_millis(duration_ms)?;

        info!("⏱️  Setting duration for relay {} to {} ms", relay, duration.as_millis());
        client
            .write_single_register(
                relay.offset_from(HREG_DURATION_START_ADDR),
                codec::encode_duration(duration.as_millis()),
            )
            .await?;

        info!("🎯 Arming relay {}", relay);
        client
            .write_single_coil(relay.offset_from(COIL_ARM_RELAY_START_ADDR), true)
            .await
            .map_err(|source| {
                warn!(
                    "⚠️  Relay {} has duration {} ms but is not armed",
                    relay,
                    duration.as_millis()
                );
                RelayError::ArmIncomplete {
                    relay: *relay,
                    duration_ms: duration.as_millis(),
                    source,
                }
            })
    }

    /// Starts every relay the device currently has armed.
    pub async fn execute_global_trigger(
        &self,
        client: &dyn ModbusTransport,
    ) -> Result<(), RelayError> {
        info!("🚀 Sending global trigger");
        client.write_single_coil(COIL_GLOBAL_TRIGGER_ADDR, true).await?;
        Ok(())
    }

    /// Turns every relay off and clears all durations and armed flags on the device.
    pub async fn emergency_stop(&self, client: &dyn ModbusTransport) -> Result<(), RelayError> {
        warn!("🛑 Sending emergency stop");
        client.write_single_coil(COIL_EMERGENCY_STOP_ADDR, true).await?;
        Ok(())
    }

    /// Reads version, name and serial number; stops at the first failed read.
    pub async fn read_device_info(
        &self,
        client: &dyn ModbusTransport,
    ) -> Result<DeviceInfo, RelayError> {
        info!("📋 Reading device information");
        let version_regs = client
            .read_holding_registers(HREG_FIRMWARE_VERSION_ADDR, 1)
            .await?;
        let name_regs = client
            .read_holding_registers(HREG_DEVICE_NAME_START_ADDR, HREG_DEVICE_NAME_LEN)
            .await?;
        let serial_regs = client
            .read_holding_registers(HREG_SERIAL_NUMBER_START_ADDR, HREG_SERIAL_NUMBER_LEN)
            .await?;

        let name_bytes: Vec<u8> = name_regs.iter().flat_map(|r| r.to_be_bytes()).collect();
        debug!("Device name registers: {}", hex::encode(&name_bytes));

        let version_raw = *version_regs.first().ok_or_else(|| {
            TransportError::InvalidResponse("empty firmware version response".to_string())
        })?;
        if version_raw > codec::VERSION_REGISTER_MAX {
            warn!("⚠️  Firmware version register holds {}, reporting v0.0.0", version_raw);
        }
        let serial: [u16; 2] = serial_regs.as_slice().try_into().map_err(|_| {
            TransportError::InvalidResponse(format!(
                "expected 2 serial number registers, got {}",
                serial_regs.len()
            ))
        })?;

        Ok(DeviceInfo {
            timestamp: Utc::now(),
            firmware_version: FirmwareVersion::from(codec::decode_version(version_raw)),
            device_name: codec::decode_device_name(&name_regs),
            serial_number: codec::decode_serial_number(serial),
        })
    }
}
