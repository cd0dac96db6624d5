use std::fmt;
use tokio_modbus::Request;

use super::address_map::{region_of, Region, RegionKind};

/// One Modbus primitive as issued by the operation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadCoils { address: u16, count: u16 },
    WriteSingleCoil { address: u16, value: bool },
    ReadHoldingRegisters { address: u16, count: u16 },
    WriteSingleRegister { address: u16, value: u16 },
}

impl ModbusRequest {
    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadCoils { .. } => 0x01,
            ModbusRequest::ReadHoldingRegisters { .. } => 0x03,
            ModbusRequest::WriteSingleCoil { .. } => 0x05,
            ModbusRequest::WriteSingleRegister { .. } => 0x06,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ModbusRequest::WriteSingleCoil { .. } | ModbusRequest::WriteSingleRegister { .. }
        )
    }

    pub fn address(&self) -> u16 {
        match self {
            ModbusRequest::ReadCoils { address, .. }
            | ModbusRequest::WriteSingleCoil { address, .. }
            | ModbusRequest::ReadHoldingRegisters { address, .. }
            | ModbusRequest::WriteSingleRegister { address, .. } => *address,
        }
    }

    /// The address-map region the request starts in, if any.
    pub fn region(&self) -> Option<&'static Region> {
        let kind = match self {
            ModbusRequest::ReadCoils { .. } | ModbusRequest::WriteSingleCoil { .. } => {
                RegionKind::Coil
            }
            ModbusRequest::ReadHoldingRegisters { .. }
            | ModbusRequest::WriteSingleRegister { .. } => RegionKind::HoldingRegister,
        };
        region_of(kind, self.address())
    }

    pub fn to_request(&self) -> Request<'static> {
        match *self {
            ModbusRequest::ReadCoils { address, count } => Request::ReadCoils(address, count),
            ModbusRequest::WriteSingleCoil { address, value } => {
                Request::WriteSingleCoil(address, value)
            }
            ModbusRequest::ReadHoldingRegisters { address, count } => {
                Request::ReadHoldingRegisters(address, count)
            }
            ModbusRequest::WriteSingleRegister { address, value } => {
                Request::WriteSingleRegister(address, value)
            }
        }
    }
}

impl fmt::Display for ModbusRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FC{:02} ", self.function_code())?;
        match self {
            ModbusRequest::ReadCoils { address, count } => {
                write!(f, "read {} coil(s) @ {}", count, address)?
            }
            ModbusRequest::WriteSingleCoil { address, .. } => write!(f, "write coil {}", address)?,
            ModbusRequest::ReadHoldingRegisters { address, count } => {
                write!(f, "read {} register(s) @ {}", count, address)?
            }
            ModbusRequest::WriteSingleRegister { address, .. } => {
                write!(f, "write register {}", address)?
            }
        }
        if let Some(region) = self.region() {
            write!(f, " [{}]", region.name)?;
        }
        match self {
            ModbusRequest::WriteSingleCoil { value, .. } => write!(f, " = {}", value),
            ModbusRequest::WriteSingleRegister { value, .. } => {
                write!(f, " = {} (0x{:04x})", value, value)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_function_codes() {
        let req = ModbusRequest::WriteSingleRegister {
            address: 103,
            value: 1500,
        };
        assert_eq!(req.function_code(), 0x06);
        assert!(req.is_write());
        assert_eq!(
            req.to_string(),
            "FC06 write register 103 [relay duration] = 1500 (0x05dc)"
        );

        let req = ModbusRequest::ReadCoils {
            address: 0,
            count: 8,
        };
        assert!(!req.is_write());
        assert_eq!(req.to_string(), "FC01 read 8 coil(s) @ 0 [manual relay]");

        let req = ModbusRequest::WriteSingleCoil {
            address: 23,
            value: true,
        };
        assert_eq!(req.to_string(), "FC05 write coil 23 [arm relay] = true");
    }

    #[test]
    fn test_unmapped_address_has_no_region() {
        let req = ModbusRequest::ReadHoldingRegisters {
            address: 200,
            count: 1,
        };
        assert!(req.region().is_none());
        assert_eq!(req.to_string(), "FC03 read 1 register(s) @ 200");
    }

    #[test]
    fn test_to_request() {
        let req = ModbusRequest::ReadHoldingRegisters {
            address: 511,
            count: 2,
        };
        assert_eq!(req.to_request(), Request::ReadHoldingRegisters(511, 2));
        assert_eq!(
            ModbusRequest::WriteSingleCoil {
                address: 30,
                value: true
            }
            .to_request(),
            Request::WriteSingleCoil(30, true)
        );
    }
}
