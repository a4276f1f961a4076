//! Modbus device model
//!
//! A device owns its units, the listening port, the endianness applied to
//! every multi-register value it serves, and the per-device activity log.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::codec::Endianness;
use super::log::DeviceLog;
use super::point::{DataPoint, DataPointConfig};
use super::unit::ModbusUnit;
use crate::error::{Result, SimSrvError};

/// Lowest and highest valid Modbus unit ids
pub const UNIT_ID_MIN: u8 = 1;
pub const UNIT_ID_MAX: u8 = 254;

/// Default simulation tick interval in milliseconds
pub const DEFAULT_SIMULATION_INTERVAL_MS: u64 = 1000;

fn default_true() -> bool {
    true
}

fn default_simulation_interval_ms() -> u64 {
    DEFAULT_SIMULATION_INTERVAL_MS
}

/// One unit as written in a device configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub unit_id: u8,
    #[serde(default)]
    pub points: Vec<DataPointConfig>,
}

/// Device configuration as persisted to disk and exchanged over the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Started automatically on service boot
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// TCP listening port
    pub port: u16,
    /// Byte/word order for multi-register values
    #[serde(default)]
    pub endianness: Endianness,
    /// Templates are blueprints and are never started
    #[serde(default)]
    pub template: bool,
    /// Answer requests for unknown unit ids with a gateway exception
    /// instead of dropping them
    #[serde(default)]
    pub gateway: bool,
    /// Simulation tick interval
    #[serde(default = "default_simulation_interval_ms")]
    pub simulation_interval_ms: u64,
    pub units: Vec<UnitConfig>,
}

/// A validated, in-memory Modbus device
#[derive(Debug)]
pub struct ModbusDevice {
    file_name: String,
    config: DeviceConfig,
    units: BTreeMap<u8, ModbusUnit>,
    log: DeviceLog,
}

impl ModbusDevice {
    /// Validate a configuration and materialize the device.
    ///
    /// Every violation across all units and points is collected into one
    /// `Validation` error.
    pub fn from_config(file_name: &str, config: DeviceConfig) -> Result<Self> {
        let mut errors = Vec::new();

        if config.units.is_empty() {
            errors.push("device must declare at least one unit".to_string());
        }
        if config.units.len() > usize::from(UNIT_ID_MAX) {
            errors.push(format!(
                "device declares {} units, at most {} allowed",
                config.units.len(),
                UNIT_ID_MAX
            ));
        }
        if config.simulation_interval_ms == 0 {
            errors.push("simulation_interval_ms must be greater than 0".to_string());
        }

        let mut units = BTreeMap::new();
        for unit_cfg in &config.units {
            if !(UNIT_ID_MIN..=UNIT_ID_MAX).contains(&unit_cfg.unit_id) {
                errors.push(format!(
                    "unit id {} out of range [{UNIT_ID_MIN},{UNIT_ID_MAX}]",
                    unit_cfg.unit_id
                ));
                continue;
            }
            if units.contains_key(&unit_cfg.unit_id) {
                errors.push(format!("duplicate unit id {}", unit_cfg.unit_id));
                continue;
            }

            let mut points = Vec::new();
            let mut point_errors = false;
            for point_cfg in &unit_cfg.points {
                match DataPoint::from_config(point_cfg) {
                    Ok(point) => points.push(point),
                    Err(mut errs) => {
                        point_errors = true;
                        errors.append(&mut errs);
                    },
                }
            }
            if point_errors {
                continue;
            }

            match ModbusUnit::new(unit_cfg.unit_id, points) {
                Ok(unit) => {
                    units.insert(unit_cfg.unit_id, unit);
                },
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        if !errors.is_empty() {
            return Err(SimSrvError::Validation(errors));
        }

        Ok(Self {
            file_name: file_name.to_string(),
            config,
            units,
            log: DeviceLog::default(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn endianness(&self) -> Endianness {
        self.config.endianness
    }

    pub fn is_template(&self) -> bool {
        self.config.template
    }

    pub fn gateway(&self) -> bool {
        self.config.gateway
    }

    pub fn simulation_interval(&self) -> Duration {
        Duration::from_millis(self.config.simulation_interval_ms)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn unit(&self, unit_id: u8) -> Option<&ModbusUnit> {
        self.units.get(&unit_id)
    }

    pub fn units(&self) -> impl Iterator<Item = &ModbusUnit> {
        self.units.values()
    }

    pub fn unit_ids(&self) -> Vec<u8> {
        self.units.keys().copied().collect()
    }

    pub fn log(&self) -> &DeviceLog {
        &self.log
    }

    /// Seed every point with its configured default value
    pub fn reset_values(&self) {
        for unit in self.units.values() {
            unit.reset_values();
        }
    }

    /// Whether any unit carries simulation-enabled points
    pub fn has_simulation(&self) -> bool {
        self.units.values().any(|u| u.has_simulation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: &str, address: u16) -> DataPointConfig {
        serde_json::from_value(json!({
            "id": id,
            "areas": ["holding_register"],
            "type": "uint16",
            "address": address,
        }))
        .unwrap()
    }

    fn config_with_unit(unit_id: u8) -> DeviceConfig {
        DeviceConfig {
            name: "plc".to_string(),
            enabled: true,
            port: 1502,
            endianness: Endianness::default(),
            template: false,
            gateway: false,
            simulation_interval_ms: DEFAULT_SIMULATION_INTERVAL_MS,
            units: vec![UnitConfig {
                unit_id,
                points: vec![point("a", 0)],
            }],
        }
    }

    #[test]
    fn test_unit_id_boundaries() {
        assert!(ModbusDevice::from_config("d", config_with_unit(1)).is_ok());
        assert!(ModbusDevice::from_config("d", config_with_unit(254)).is_ok());
        assert!(ModbusDevice::from_config("d", config_with_unit(0)).is_err());
        assert!(ModbusDevice::from_config("d", config_with_unit(255)).is_err());
    }

    #[test]
    fn test_duplicate_unit_ids_rejected() {
        let mut config = config_with_unit(5);
        config.units.push(UnitConfig {
            unit_id: 5,
            points: vec![point("b", 10)],
        });
        let err = ModbusDevice::from_config("d", config).unwrap_err();
        match err {
            SimSrvError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("duplicate unit id 5")));
            },
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_no_units_rejected() {
        let mut config = config_with_unit(1);
        config.units.clear();
        assert!(ModbusDevice::from_config("d", config).is_err());
    }

    #[test]
    fn test_violations_are_aggregated() {
        let mut config = config_with_unit(0);
        config.units.push(UnitConfig {
            unit_id: 2,
            points: vec![point("x", 0), point("x", 1)],
        });
        config.simulation_interval_ms = 0;

        let err = ModbusDevice::from_config("d", config).unwrap_err();
        match err {
            SimSrvError::Validation(errors) => {
                assert!(errors.len() >= 3, "expected every violation, got {errors:?}");
                assert!(errors.iter().any(|e| e.contains("out of range")));
                assert!(errors.iter().any(|e| e.contains("duplicate point id")));
                assert!(errors.iter().any(|e| e.contains("simulation_interval_ms")));
            },
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_config_json_shape() {
        let json = json!({
            "name": "meter",
            "port": 1502,
            "endianness": {"byte_order": "big", "word_order": "little"},
            "units": [{
                "unit_id": 17,
                "points": [{
                    "id": "energy",
                    "areas": ["input_register"],
                    "type": "uint64",
                    "address": 0,
                    "access": "read_only",
                    "default_value": 18446744073709551615u64,
                }],
            }],
        });

        let config: DeviceConfig = serde_json::from_value(json).unwrap();
        let device = ModbusDevice::from_config("meter", config).unwrap();
        assert_eq!(device.unit_ids(), vec![17]);
        assert!(!device.is_template());
    }
}
