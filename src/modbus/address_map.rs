//! Coil and holding-register layout of the relay-bank controller.
//!
//! Per-relay quantities live at `base + relay_index`.

/// Number of relays on the board.
pub const RELAY_COUNT: u16 = 8;

// Coils
pub const COIL_MANUAL_START_ADDR: u16 = 0;
pub const COIL_ARM_RELAY_START_ADDR: u16 = 20;
pub const COIL_GLOBAL_TRIGGER_ADDR: u16 = 30;
pub const COIL_ANY_RELAY_ON_ADDR: u16 = 40;
pub const COIL_EMERGENCY_STOP_ADDR: u16 = 60;

// Holding registers
pub const HREG_DURATION_START_ADDR: u16 = 100;
pub const HREG_FIRMWARE_VERSION_ADDR: u16 = 500;
pub const HREG_DEVICE_NAME_START_ADDR: u16 = 501;
pub const HREG_DEVICE_NAME_LEN: u16 = 10;
pub const HREG_SERIAL_NUMBER_START_ADDR: u16 = 511;
pub const HREG_SERIAL_NUMBER_LEN: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Coil,
    HoldingRegister,
}

/// A contiguous block of Modbus addresses with one meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    pub kind: RegionKind,
    pub start: u16,
    pub count: u16,
}

impl Region {
    const fn new(name: &'static str, kind: RegionKind, start: u16, count: u16) -> Self {
        Self {
            name,
            kind,
            start,
            count,
        }
    }

    /// One past the last address of the region.
    pub const fn end(&self) -> u32 {
        self.start as u32 + self.count as u32
    }

    pub const fn contains(&self, kind: RegionKind, address: u16) -> bool {
        kind as u8 == self.kind as u8 && address >= self.start && (address as u32) < self.end()
    }

    const fn overlaps(&self, other: &Region) -> bool {
        self.kind as u8 == other.kind as u8
            && (self.start as u32) < other.end()
            && (other.start as u32) < self.end()
    }
}

pub const REGIONS: [Region; 9] = [
    Region::new("manual relay", RegionKind::Coil, COIL_MANUAL_START_ADDR, RELAY_COUNT),
    Region::new("arm relay", RegionKind::Coil, COIL_ARM_RELAY_START_ADDR, RELAY_COUNT),
    Region::new("global trigger", RegionKind::Coil, COIL_GLOBAL_TRIGGER_ADDR, 1),
    Region::new("any relay on", RegionKind::Coil, COIL_ANY_RELAY_ON_ADDR, 1),
    Region::new("emergency stop", RegionKind::Coil, COIL_EMERGENCY_STOP_ADDR, 1),
    Region::new(
        "relay duration",
        RegionKind::HoldingRegister,
        HREG_DURATION_START_ADDR,
        RELAY_COUNT,
    ),
    Region::new(
        "firmware version",
        RegionKind::HoldingRegister,
        HREG_FIRMWARE_VERSION_ADDR,
        1,
    ),
    Region::new(
        "device name",
        RegionKind::HoldingRegister,
        HREG_DEVICE_NAME_START_ADDR,
        HREG_DEVICE_NAME_LEN,
    ),
    Region::new(
        "serial number",
        RegionKind::HoldingRegister,
        HREG_SERIAL_NUMBER_START_ADDR,
        HREG_SERIAL_NUMBER_LEN,
    ),
];

const fn regions_disjoint(regions: &[Region]) -> bool {
    let mut i = 0;
    while i < regions.len() {
        let mut j = i + 1;
        while j < regions.len() {
            if regions[i].overlaps(&regions[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

// Checked at compile time.
const _: () = assert!(regions_disjoint(&REGIONS), "Modbus address regions overlap");

/// Finds the region an address belongs to.
pub fn region_of(kind: RegionKind, address: u16) -> Option<&'static Region> {
    REGIONS.iter().find(|r| r.contains(kind, address))
}
