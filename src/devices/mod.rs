pub mod relay_board;
pub mod simulator;
pub mod traits;
pub mod types;

pub use relay_board::RelayBoard;
pub use simulator::{RelayBoardModel, SimulatedTransport};
pub use traits::DeviceData;
pub use types::{ArmDuration, DeviceInfo, FirmwareVersion, RelayIndex, RelayState, RelayStatus};
