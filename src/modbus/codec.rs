//! Conversions between domain values and raw coil / register contents.

use super::address_map::{HREG_DEVICE_NAME_LEN, HREG_SERIAL_NUMBER_LEN};
use crate::devices::types::RelayState;

/// Maximum number of characters held by the device-name registers.
pub const DEVICE_NAME_MAX_CHARS: usize = HREG_DEVICE_NAME_LEN as usize * 2;

/// Largest value `decode_version` accepts (three packed decimal digits).
pub const VERSION_REGISTER_MAX: u16 = 999;

/// Coil `i` of the response is relay `i`.
pub fn decode_coil_array(raw: &[bool]) -> Vec<RelayState> {
    raw.iter().copied().map(RelayState::from).collect()
}

pub fn encode_relay_state(state: RelayState) -> bool {
    state.is_on()
}

/// Splits a packed version register into `(major, minor, patch)`.
///
/// Firmware stores `major * 100 + minor * 10 + patch`, so `101` is v1.0.1.
/// Values above 999 cannot come from valid firmware and decode to `(0, 0, 0)`.
pub fn decode_version(reg: u16) -> (u8, u8, u8) {
    if reg > VERSION_REGISTER_MAX {
        return (0, 0, 0);
    }
    ((reg / 100) as u8, ((reg % 100) / 10) as u8, (reg % 10) as u8)
}

pub fn encode_version(major: u8, minor: u8, patch: u8) -> u16 {
    major.min(9) as u16 * 100 + minor.min(9) as u16 * 10 + patch.min(9) as u16
}

/// Unpacks the device name, two ASCII characters per register, high byte first.
///
/// Zero bytes are padding: they are skipped and decoding carries on through
/// every register, so a zero in the middle leaves no gap marker and does not
/// cut the name short.
pub fn decode_device_name(regs: &[u16]) -> String {
    regs.iter()
        .flat_map(|reg| reg.to_be_bytes())
        .filter(|byte| *byte != 0)
        .map(char::from)
        .collect()
}

/// Packs a name the way the firmware does: bytes pairwise into registers,
/// zero-padded, truncated to 20 characters.
pub fn encode_device_name(name: &str) -> [u16; HREG_DEVICE_NAME_LEN as usize] {
    let bytes: Vec<u8> = name.bytes().take(DEVICE_NAME_MAX_CHARS).collect();
    let mut regs = [0u16; HREG_DEVICE_NAME_LEN as usize];
    for (reg, pair) in regs.iter_mut().zip(bytes.chunks(2)) {
        *reg = u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]);
    }
    regs
}

/// Joins the serial-number registers; the first register is the high word.
pub fn decode_serial_number(regs: [u16; HREG_SERIAL_NUMBER_LEN as usize]) -> u32 {
    ((regs[0] as u32) << 16) | regs[1] as u32
}

pub fn encode_serial_number(value: u32) -> [u16; HREG_SERIAL_NUMBER_LEN as usize] {
    [(value >> 16) as u16, (value & 0xFFFF) as u16]
}

/// Durations are written to the register as-is. Range checks happen before this.
pub fn encode_duration(ms: u16) -> u16 {
    ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_version_all_packed_values() {
        for reg in 0..=VERSION_REGISTER_MAX {
            let (major, minor, patch) = decode_version(reg);
            assert_eq!(major as u16, reg / 100);
            assert_eq!(minor as u16, (reg % 100) / 10);
            assert_eq!(patch as u16, reg % 10);
            assert_eq!(major as u16 * 100 + minor as u16 * 10 + patch as u16, reg);
        }
    }

    #[test]
    fn test_decode_version_out_of_range() {
        assert_eq!(decode_version(101), (1, 0, 1));
        assert_eq!(decode_version(1000), (0, 0, 0));
        assert_eq!(decode_version(u16::MAX), (0, 0, 0));
    }

    #[test]
    fn test_serial_number_words() {
        let samples = [
            (0u16, 0u16),
            (0, 1),
            (1, 0),
            (0x0098, 0x9680),
            (0xFFFF, 0xFFFF),
            (0x8000, 0x0001),
        ];
        for (hi, lo) in samples {
            let value = decode_serial_number([hi, lo]);
            assert_eq!(value, ((hi as u32) << 16) | lo as u32);
            assert_eq!(decode_serial_number(encode_serial_number(value)), value);
        }
        assert_eq!(decode_serial_number(encode_serial_number(9_999_999)), 9_999_999);
    }

    #[test]
    fn test_device_name_all_padding_is_empty() {
        assert_eq!(decode_device_name(&[0u16; 10]), "");
    }

    #[test]
    fn test_device_name_padded() {
        let regs = encode_device_name("RELAYBOARD");
        assert_eq!(regs[0], u16::from_be_bytes([b'R', b'E']));
        assert_eq!(&regs[5..], &[0, 0, 0, 0, 0]);
        assert_eq!(decode_device_name(&regs), "RELAYBOARD");
    }

    #[test]
    fn test_device_name_odd_length_and_truncation() {
        let regs = encode_device_name("ESP32 Relay Board");
        assert_eq!(regs[8], u16::from_be_bytes([b'd', 0]));
        assert_eq!(decode_device_name(&regs), "ESP32 Relay Board");

        let long = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        assert_eq!(decode_device_name(&encode_device_name(long)), &long[..20]);
    }

    #[test]
    fn test_device_name_embedded_padding_is_skipped() {
        let regs = [
            u16::from_be_bytes([b'A', 0]),
            0,
            u16::from_be_bytes([0, b'B']),
            u16::from_be_bytes([b'C', b'D']),
        ];
        assert_eq!(decode_device_name(&regs), "ABCD");
    }

    #[test]
    fn test_coils_and_duration_pass_through() {
        let raw = [true, false, false, true];
        assert_eq!(
            decode_coil_array(&raw),
            vec![RelayState::On, RelayState::Off, RelayState::Off, RelayState::On]
        );
        assert!(encode_relay_state(RelayState::On));
        assert!(!encode_relay_state(RelayState::Off));
        assert_eq!(encode_duration(1500), 1500);
        assert_eq!(encode_version(1, 0, 1), 101);
    }
}
