//! Modbus TCP wire protocol: framing and the per-device server

pub mod frame;
pub mod server;

pub use frame::ExceptionCode;
pub use server::{ClientInfo, ProtocolServer};
