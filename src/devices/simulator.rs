//! Software model of the relay-bank firmware.
//!
//! `RelayBoardModel` keeps the coil and register tables and applies the
//! firmware's reactions after every write: emergency stop, arm requests,
//! global trigger and timed-run expiry. `SimulatedTransport` exposes the
//! model through [`ModbusTransport`] for tests; the TCP server in
//! `services::modbus_server` exposes it on the network.

use async_trait::async_trait;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::types::FirmwareVersion;
use crate::modbus::address_map::*;
use crate::modbus::client::ModbusTransport;
use crate::modbus::codec;
use crate::modbus::protocol::ModbusRequest;
use crate::utils::error::TransportError;

pub const DEFAULT_DEVICE_NAME: &str = "ESP32 Relay Board";
pub const DEFAULT_FIRMWARE_VERSION: FirmwareVersion = FirmwareVersion {
    major: 1,
    minor: 0,
    patch: 1,
};
pub const DEFAULT_SERIAL_NUMBER: u32 = 4_211_583;

const RELAYS: usize = RELAY_COUNT as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorFault {
    IllegalDataAddress(u16),
}

#[derive(Debug, Clone, Copy)]
struct TimedRun {
    started: Instant,
    duration: Duration,
}

#[derive(Debug, Clone)]
pub struct RelayBoardModel {
    coils: BTreeMap<u16, bool>,
    holding_registers: BTreeMap<u16, u16>,
    armed: [bool; RELAYS],
    timed_runs: [Option<TimedRun>; RELAYS],
    serial_number: u32,
}

impl Default for RelayBoardModel {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_NAME, DEFAULT_FIRMWARE_VERSION, DEFAULT_SERIAL_NUMBER)
    }
}

impl RelayBoardModel {
    /// Builds a board with every relay off and the given identity registers.
    ///
    /// The firmware reports a 7-digit serial, so larger values are reduced modulo 10^7.
    pub fn new(device_name: &str, firmware_version: FirmwareVersion, serial_number: u32) -> Self {
        let serial_number = serial_number % 10_000_000;
        let mut coils = BTreeMap::new();
        let mut holding_registers = BTreeMap::new();

        for i in 0..RELAY_COUNT {
            coils.insert(COIL_MANUAL_START_ADDR + i, false);
            coils.insert(COIL_ARM_RELAY_START_ADDR + i, false);
            holding_registers.insert(HREG_DURATION_START_ADDR + i, 0);
        }
        coils.insert(COIL_GLOBAL_TRIGGER_ADDR, false);
        coils.insert(COIL_ANY_RELAY_ON_ADDR, false);
        coils.insert(COIL_EMERGENCY_STOP_ADDR, false);

        holding_registers.insert(
            HREG_FIRMWARE_VERSION_ADDR,
            codec::encode_version(
                firmware_version.major,
                firmware_version.minor,
                firmware_version.patch,
            ),
        );
        for (i, reg) in codec::encode_device_name(device_name).iter().enumerate() {
            holding_registers.insert(HREG_DEVICE_NAME_START_ADDR + i as u16, *reg);
        }
        for (i, reg) in codec::encode_serial_number(serial_number).iter().enumerate() {
            holding_registers.insert(HREG_SERIAL_NUMBER_START_ADDR + i as u16, *reg);
        }

        Self {
            coils,
            holding_registers,
            armed: [false; RELAYS],
            timed_runs: [None; RELAYS],
            serial_number,
        }
    }

    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.coils.get(&address).copied()
    }

    pub fn holding_register(&self, address: u16) -> Option<u16> {
        self.holding_registers.get(&address).copied()
    }

    pub fn is_armed(&self, relay: usize) -> bool {
        self.armed.get(relay).copied().unwrap_or(false)
    }

    pub fn in_timed_run(&self, relay: usize) -> bool {
        self.timed_runs.get(relay).map_or(false, |run| run.is_some())
    }

    /// Physical output of a relay: on during a timed run, else follows its manual coil.
    pub fn relay_output(&self, relay: usize) -> bool {
        self.in_timed_run(relay)
            || self
                .coil(COIL_MANUAL_START_ADDR + relay as u16)
                .unwrap_or(false)
    }

    pub fn read_coils(&mut self, address: u16, count: u16) -> Result<Vec<bool>, SimulatorFault> {
        self.expire_timed_runs(Instant::now());
        (0..count)
            .map(|i| {
                let addr = address.wrapping_add(i);
                self.coil(addr).ok_or(SimulatorFault::IllegalDataAddress(addr))
            })
            .collect()
    }

    pub fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, SimulatorFault> {
        self.expire_timed_runs(Instant::now());
        (0..count)
            .map(|i| {
                let addr = address.wrapping_add(i);
                self.holding_register(addr)
                    .ok_or(SimulatorFault::IllegalDataAddress(addr))
            })
            .collect()
    }

    pub fn write_coil(&mut self, address: u16, value: bool) -> Result<(), SimulatorFault> {
        let coil = self
            .coils
            .get_mut(&address)
            .ok_or(SimulatorFault::IllegalDataAddress(address))?;
        *coil = value;
        self.scan(Instant::now());
        Ok(())
    }

    pub fn write_holding_register(&mut self, address: u16, value: u16) -> Result<(), SimulatorFault> {
        let reg = self
            .holding_registers
            .get_mut(&address)
            .ok_or(SimulatorFault::IllegalDataAddress(address))?;
        *reg = value;
        self.scan(Instant::now());
        Ok(())
    }

    /// One pass of the firmware control loop.
    fn scan(&mut self, now: Instant) {
        if self.coil(COIL_EMERGENCY_STOP_ADDR) == Some(true) {
            info!("🛑 Simulator: emergency stop");
            for i in 0..RELAY_COUNT {
                self.coils.insert(COIL_MANUAL_START_ADDR + i, false);
                self.holding_registers.insert(HREG_DURATION_START_ADDR + i, 0);
            }
            self.armed = [false; RELAYS];
            self.timed_runs = [None; RELAYS];
            self.coils.insert(COIL_EMERGENCY_STOP_ADDR, false);
            self.update_any_relay_on();
            return;
        }

        for i in 0..RELAY_COUNT {
            let arm_addr = COIL_ARM_RELAY_START_ADDR + i;
            if self.coil(arm_addr) == Some(true) {
                self.armed[i as usize] = true;
                self.coils.insert(arm_addr, false);
                debug!("Simulator: relay {} armed", i);
            }
        }

        if self.coil(COIL_GLOBAL_TRIGGER_ADDR) == Some(true) {
            for i in 0..RELAYS {
                if self.armed[i] && self.timed_runs[i].is_none() {
                    let duration_ms = self
                        .holding_register(HREG_DURATION_START_ADDR + i as u16)
                        .unwrap_or(0);
                    self.timed_runs[i] = Some(TimedRun {
                        started: now,
                        duration: Duration::from_millis(duration_ms as u64),
                    });
                    self.coils.insert(COIL_MANUAL_START_ADDR + i as u16, true);
                    self.armed[i] = false;
                    info!("▶️  Simulator: relay {} running for {} ms", i, duration_ms);
                }
            }
            self.coils.insert(COIL_GLOBAL_TRIGGER_ADDR, false);
        }

        self.expire_timed_runs(now);
    }

    fn expire_timed_runs(&mut self, now: Instant) {
        for i in 0..RELAYS {
            if let Some(run) = self.timed_runs[i] {
                if now.duration_since(run.started) >= run.duration {
                    self.timed_runs[i] = None;
                    self.coils.insert(COIL_MANUAL_START_ADDR + i as u16, false);
                    debug!("Simulator: relay {} timed run finished", i);
                }
            }
        }
        self.update_any_relay_on();
    }

    fn update_any_relay_on(&mut self) {
        let any_on = (0..RELAYS).any(|i| self.relay_output(i));
        self.coils.insert(COIL_ANY_RELAY_ON_ADDR, any_on);
    }
}

/// Locks the model, recovering the data from a poisoned lock.
pub fn lock_model(model: &Mutex<RelayBoardModel>) -> MutexGuard<'_, RelayBoardModel> {
    model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory transport over a [`RelayBoardModel`].
///
/// Every request is appended to a journal before it is applied. Requests
/// registered with [`fail_request`](Self::fail_request) fail without
/// touching the model.
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    board: Arc<Mutex<RelayBoardModel>>,
    journal: Mutex<Vec<ModbusRequest>>,
    failures: Mutex<HashMap<usize, TransportError>>,
    reconnects: AtomicUsize,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(board: Arc<Mutex<RelayBoardModel>>) -> Self {
        Self {
            board,
            ..Self::default()
        }
    }

    pub fn board(&self) -> MutexGuard<'_, RelayBoardModel> {
        lock_model(&self.board)
    }

    pub fn journal(&self) -> Vec<ModbusRequest> {
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Makes the request with this zero-based sequence number fail.
    pub fn fail_request(&self, sequence: usize) {
        self.fail_request_with(
            sequence,
            TransportError::Io(format!("simulated failure of request #{}", sequence)),
        );
    }

    pub fn fail_request_with(&self, sequence: usize, error: TransportError) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(sequence, error);
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn record(&self, request: ModbusRequest) -> Result<(), TransportError> {
        let mut journal = self
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sequence = journal.len();
        debug!("📤 [sim #{}] {}", sequence, request);
        journal.push(request);

        let failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match failures.get(&sequence) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl From<SimulatorFault> for TransportError {
    fn from(fault: SimulatorFault) -> Self {
        match fault {
            SimulatorFault::IllegalDataAddress(addr) => {
                TransportError::Exception(format!("Illegal data address {}", addr))
            }
        }
    }
}

#[async_trait]
impl ModbusTransport for SimulatedTransport {
    async fn read_coils(&self, address: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        self.record(ModbusRequest::ReadCoils { address, count })?;
        Ok(self.board().read_coils(address, count)?)
    }

    async fn write_single_coil(&self, address: u16, value: bool) -> Result<(), TransportError> {
        self.record(ModbusRequest::WriteSingleCoil { address, value })?;
        Ok(self.board().write_coil(address, value)?)
    }

    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.record(ModbusRequest::ReadHoldingRegisters { address, count })?;
        Ok(self.board().read_holding_registers(address, count)?)
    }

    async fn write_single_register(
        &self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        self.record(ModbusRequest::WriteSingleRegister { address, value })?;
        Ok(self.board().write_holding_register(address, value)?)
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
