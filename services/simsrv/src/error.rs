//! Error handling for the simulator service
//!
//! Lifecycle and configuration failures surface through [`SimSrvError`];
//! wire-level Modbus exceptions are a separate type
//! ([`crate::protocol::frame::ExceptionCode`]) because they are answered to
//! the requesting master rather than to a local caller.

use thiserror::Error;

/// Result type alias for the simulator service
pub type Result<T> = std::result::Result<T, SimSrvError>;

/// Simulator service error type
#[derive(Error, Debug)]
pub enum SimSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Aggregated configuration validation failures
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device configuration (de)serialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// No device or template stored under the given file name
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// No unit with the given id on the addressed device
    #[error("Unit not found: {0}")]
    UnitNotFound(u8),

    /// No data point with the given id on the addressed unit
    #[error("Point not found: {0}")]
    PointNotFound(String),

    /// File name already used within the same collection
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Operation requires the device to be stopped
    #[error("Device is running: {0}")]
    DeviceRunning(String),

    /// Operation requires the device to be running
    #[error("Device is not running: {0}")]
    DeviceNotRunning(String),

    /// Listening port already bound by another running device
    #[error("Port {0} already in use")]
    PortInUse(u16),

    /// Templates are blueprints and are never started
    #[error("Template cannot be started: {0}")]
    TemplateNotStartable(String),

    /// Register word encoding/decoding fault
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SimSrvError {
    fn from(err: serde_json::Error) -> Self {
        SimSrvError::Parse(format!("JSON error: {err}"))
    }
}

impl From<figment::Error> for SimSrvError {
    fn from(err: figment::Error) -> Self {
        SimSrvError::Config(format!("Configuration error: {err}"))
    }
}

impl SimSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        SimSrvError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        SimSrvError::Internal(msg.into())
    }
}
