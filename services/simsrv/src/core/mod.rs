//! Device, unit and data-point model plus the simulation engine

pub mod codec;
pub mod device;
pub mod log;
pub mod manager;
pub mod point;
pub mod simulation;
pub mod unit;
pub mod value;

pub use codec::{ByteOrder, Endianness, WordOrder};
pub use device::{DeviceConfig, ModbusDevice, UnitConfig};
pub use manager::{DeviceManager, DeviceOverview};
pub use point::{DataPoint, DataPointConfig, SimulationConfig};
pub use unit::ModbusUnit;
pub use value::{AccessMode, DataArea, DataType, DataValue};
