//! Admin API request/response models

use serde::{Deserialize, Serialize};

use crate::core::device::DeviceConfig;

/// Body of POST /api/devices and POST /api/templates: the storage key plus
/// the full configuration
#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub file_name: String,
    #[serde(flatten)]
    pub config: DeviceConfig,
}

/// Body of POST /api/templates/{name}/instantiate
#[derive(Debug, Deserialize)]
pub struct InstantiateRequest {
    pub file_name: String,
}

/// Result of a start/stop call
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub file_name: String,
    pub running: bool,
}

/// Current value of one data point
#[derive(Debug, Serialize)]
pub struct PointValueResponse {
    pub unit_id: u8,
    pub point_id: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub value: serde_json::Value,
}

/// GET /api/health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub devices: usize,
    pub running: usize,
}
