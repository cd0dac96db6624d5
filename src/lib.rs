//! Relay Bank Modbus Control Library
//!
//! Operator-side control of an 8-channel relay bank over Modbus TCP: manual
//! switching, arming relays for timed runs, the global trigger, emergency
//! stop and the device identity registers. Includes an in-memory model of
//! the device firmware that can also be served over TCP for testing.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, OutputFormat};
pub use devices::{DeviceData, DeviceInfo, RelayBoard, RelayState, RelayStatus, SimulatedTransport};
pub use modbus::{ModbusClient, ModbusTransport};
pub use output::{ConsoleFormatter, DataFormatter, JsonFormatter};
pub use utils::error::{RelayError, TransportError, ValidationError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
