//! Data point model
//!
//! One addressable value: its type, the data areas it is mapped into, the
//! register/bit offset, access mode, seed value, optional simulation range
//! and optional feedback link.

use serde::{Deserialize, Serialize};

use super::value::{AccessMode, DataArea, DataType, DataValue};

/// Synthetic value generation settings for a numeric point
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub min_value: f64,
    pub max_value: f64,
}

/// Data point as written in a device configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPointConfig {
    /// Unique point identifier within its unit
    pub id: String,
    /// Data areas the point is mapped into (non-empty)
    pub areas: Vec<DataArea>,
    /// Value type
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Register/bit offset within each declared area (0-based)
    pub address: u16,
    /// Access mode, defaults to read-write
    #[serde(default)]
    pub access: AccessMode,
    /// Seed value; the type's zero value when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Character count, required for ascii points only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
    /// Synthetic value generation (numeric types only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationConfig>,
    /// Id of the point mirroring this point's latest written value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_point: Option<String>,
}

/// A validated data point with its live value
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub id: String,
    pub areas: Vec<DataArea>,
    pub data_type: DataType,
    pub address: u16,
    pub access: AccessMode,
    pub default_value: DataValue,
    pub length: Option<u16>,
    pub simulation: Option<SimulationConfig>,
    pub feedback_point: Option<String>,
    pub value: DataValue,
}

impl DataPoint {
    /// Validate a configured point and materialize it.
    ///
    /// All violations are collected, not just the first.
    pub fn from_config(cfg: &DataPointConfig) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let ctx = &cfg.id;

        if cfg.id.trim().is_empty() {
            errors.push("point id must not be empty".to_string());
        }

        if cfg.areas.is_empty() {
            errors.push(format!("point '{ctx}': areas must not be empty"));
        }

        let mut seen = Vec::new();
        for area in &cfg.areas {
            if seen.contains(area) {
                errors.push(format!("point '{ctx}': duplicate area {}", area.as_str()));
            }
            seen.push(*area);

            if area.is_bit() && cfg.data_type != DataType::Bool {
                errors.push(format!(
                    "point '{ctx}': only bool points may be mapped into {}",
                    area.as_str()
                ));
            }
        }

        match (cfg.data_type, cfg.length) {
            (DataType::Ascii, None) => {
                errors.push(format!("point '{ctx}': ascii points require a length"));
            },
            (DataType::Ascii, Some(0)) => {
                errors.push(format!("point '{ctx}': ascii length must be greater than 0"));
            },
            (DataType::Ascii, Some(_)) => {},
            (_, Some(_)) => {
                errors.push(format!(
                    "point '{ctx}': length is only valid for ascii points"
                ));
            },
            (_, None) => {},
        }

        if let Some(sim) = &cfg.simulation {
            if !cfg.data_type.is_numeric() {
                errors.push(format!(
                    "point '{ctx}': simulation requires a numeric type, got {}",
                    cfg.data_type.as_str()
                ));
            }
            if sim.min_value > sim.max_value {
                errors.push(format!(
                    "point '{ctx}': simulation min_value {} exceeds max_value {}",
                    sim.min_value, sim.max_value
                ));
            }
        }

        if let Some(target) = &cfg.feedback_point {
            if target == &cfg.id {
                errors.push(format!("point '{ctx}': feedback must not reference itself"));
            }
        }

        let default_value = match &cfg.default_value {
            Some(raw) => match cfg.data_type.parse_value(raw) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(format!("point '{ctx}': default {e}"));
                    cfg.data_type.zero_value()
                },
            },
            None => cfg.data_type.zero_value(),
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            id: cfg.id.clone(),
            areas: cfg.areas.clone(),
            data_type: cfg.data_type,
            address: cfg.address,
            access: cfg.access,
            value: default_value.clone(),
            default_value,
            length: cfg.length,
            simulation: cfg.simulation,
            feedback_point: cfg.feedback_point.clone(),
        })
    }

    /// Register span of the point in register areas; 1 for bit areas
    pub fn span(&self) -> u16 {
        self.data_type.register_span(self.length)
    }

    /// Reset the live value back to the configured seed
    pub fn reset(&mut self) {
        self.value = self.default_value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config() -> DataPointConfig {
        DataPointConfig {
            id: "temperature".to_string(),
            areas: vec![DataArea::HoldingRegister],
            data_type: DataType::Int16,
            address: 0,
            access: AccessMode::ReadWrite,
            default_value: None,
            length: None,
            simulation: None,
            feedback_point: None,
        }
    }

    #[test]
    fn test_valid_point_seeds_default() {
        let mut cfg = base_config();
        cfg.default_value = Some(json!(-42));
        let point = DataPoint::from_config(&cfg).unwrap();
        assert_eq!(point.value, DataValue::Int16(-42));
        assert_eq!(point.span(), 1);
    }

    #[test]
    fn test_missing_default_uses_zero() {
        let point = DataPoint::from_config(&base_config()).unwrap();
        assert_eq!(point.value, DataValue::Int16(0));
    }

    #[test]
    fn test_empty_areas_rejected() {
        let mut cfg = base_config();
        cfg.areas = vec![];
        let errors = DataPoint::from_config(&cfg).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("areas must not be empty")));
    }

    #[test]
    fn test_non_bool_in_bit_area_rejected() {
        let mut cfg = base_config();
        cfg.areas = vec![DataArea::Coil];
        let errors = DataPoint::from_config(&cfg).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("only bool points")));
    }

    #[test]
    fn test_ascii_length_rules() {
        let mut cfg = base_config();
        cfg.data_type = DataType::Ascii;
        assert!(DataPoint::from_config(&cfg).is_err());

        cfg.length = Some(0);
        assert!(DataPoint::from_config(&cfg).is_err());

        cfg.length = Some(6);
        cfg.default_value = Some(json!("PUMP"));
        let point = DataPoint::from_config(&cfg).unwrap();
        assert_eq!(point.span(), 3);
    }

    #[test]
    fn test_simulation_validation_collects_all_errors() {
        let mut cfg = base_config();
        cfg.data_type = DataType::Bool;
        cfg.simulation = Some(SimulationConfig {
            enabled: true,
            min_value: 10.0,
            max_value: 1.0,
        });
        let errors = DataPoint::from_config(&cfg).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("numeric type")));
        assert!(errors.iter().any(|e| e.contains("exceeds max_value")));
    }

    #[test]
    fn test_self_feedback_rejected() {
        let mut cfg = base_config();
        cfg.feedback_point = Some("temperature".to_string());
        let errors = DataPoint::from_config(&cfg).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("reference itself")));
    }
}
