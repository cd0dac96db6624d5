pub mod address_map;
pub mod client;
pub mod codec;
pub mod protocol;

pub use client::{ModbusClient, ModbusTransport};
pub use protocol::ModbusRequest;
