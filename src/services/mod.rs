#[cfg(feature = "simulator")]
pub mod modbus_server;

#[cfg(feature = "simulator")]
pub use modbus_server::{run_simulator, spawn_simulator, RelayBoardService};
