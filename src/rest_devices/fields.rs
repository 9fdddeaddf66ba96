//! Field-based sensor simulation
//!
//! A field is a named, typed value source (`temp-celsius-01`, `alarm-light-01`, ...).
//! Field definitions come from a JSON file (`FIELD_CONFIG_PATH`), falling back
//! to `/app/field_sources.json` and then to the built-in set.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const FIELD_CONFIG_ENV_VAR: &str = "FIELD_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "/app/field_sources.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    String,
    Boolean,
}

/// Single field definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub string_options: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl FieldConfig {
    pub fn validate(&self) -> Result<()> {
        if self.data_type == DataType::String
            && self.string_options.as_ref().map_or(true, |o| o.is_empty())
        {
            return Err(Error::Validation(format!(
                "field '{}': string_options required when data_type is string",
                self.name
            )));
        }
        if matches!(self.data_type, DataType::Integer | DataType::Float) {
            if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
                if max < min {
                    return Err(Error::Validation(format!(
                        "field '{}': max_value must be greater than or equal to min_value",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn numeric(name: &str, data_type: DataType, units: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            units: units.to_string(),
            min_value: Some(min),
            max_value: Some(max),
            string_options: None,
            metadata: Map::new(),
        }
    }

    /// Produce a random value matching `data_type`
    pub fn generate_value<R: Rng>(&self, rng: &mut R) -> Value {
        match self.data_type {
            DataType::Integer => {
                let min = self.min_value.unwrap_or(0.0).ceil() as i64;
                let max = (self.max_value.unwrap_or(100.0).floor() as i64).max(min);
                Value::from(rng.gen_range(min..=max))
            }
            DataType::Float => {
                let min = self.min_value.unwrap_or(0.0);
                let max = self.max_value.unwrap_or(100.0);
                let v = if max > min { rng.gen_range(min..=max) } else { min };
                Value::from(super::round_to(v, 2))
            }
            DataType::String => self
                .string_options
                .as_deref()
                .and_then(|opts| opts.choose(rng))
                .map(|s| Value::from(s.as_str()))
                .unwrap_or(Value::Null),
            DataType::Boolean => Value::from(rng.gen_bool(0.5)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorMetadata {
    #[serde(default = "SimulatorMetadata::default_device_id")]
    pub device_id: String,
    #[serde(default = "SimulatorMetadata::default_version")]
    pub version: String,
    #[serde(default = "SimulatorMetadata::default_description")]
    pub description: String,
}

impl SimulatorMetadata {
    fn default_device_id() -> String {
        "field-sensor-simulator-001".to_string()
    }
    fn default_version() -> String {
        "2.0.0".to_string()
    }
    fn default_description() -> String {
        "Field-based sensor data simulator".to_string()
    }
}

impl Default for SimulatorMetadata {
    fn default() -> Self {
        Self {
            device_id: Self::default_device_id(),
            version: Self::default_version(),
            description: Self::default_description(),
        }
    }
}

/// Top-level field configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsConfig {
    pub fields: BTreeMap<String, FieldConfig>,
    #[serde(default)]
    pub simulator_metadata: SimulatorMetadata,
}

impl FieldsConfig {
    pub fn validate(&self) -> Result<()> {
        self.fields.values().try_for_each(FieldConfig::validate)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::NotFound(format!("configuration file {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
            .map_err(|e| Error::Validation(format!("configuration {} rejected: {}", path.display(), e)))
    }

    /// `FIELD_CONFIG_PATH`, then `/app/field_sources.json`, then built-in fields
    pub fn load_default() -> Result<Self> {
        if let Some(path) = crate::config::env_opt(FIELD_CONFIG_ENV_VAR) {
            return Self::load_from_file(Path::new(&path));
        }
        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from_file(fallback);
        }
        Ok(Self::builtin())
    }

    pub fn builtin() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            "temp-celsius-01".to_string(),
            FieldConfig::numeric("Temperature", DataType::Float, "°C", 15.0, 35.0),
        );
        fields.insert(
            "humidity-pct-01".to_string(),
            FieldConfig::numeric("Relative Humidity", DataType::Float, "%", 20.0, 90.0),
        );
        fields.insert(
            "pressure-kpa-01".to_string(),
            FieldConfig::numeric("Barometric Pressure", DataType::Float, "kPa", 95.0, 105.0),
        );
        fields.insert(
            "status-indicator-01".to_string(),
            FieldConfig {
                name: "Status Indicator".to_string(),
                data_type: DataType::String,
                units: String::new(),
                min_value: None,
                max_value: None,
                string_options: Some(vec![
                    "normal".to_string(),
                    "warning".to_string(),
                    "critical".to_string(),
                ]),
                metadata: Map::new(),
            },
        );
        fields.insert(
            "alarm-light-01".to_string(),
            FieldConfig {
                name: "Alarm Light".to_string(),
                data_type: DataType::Boolean,
                units: String::new(),
                min_value: None,
                max_value: None,
                string_options: None,
                metadata: Map::new(),
            },
        );
        Self {
            fields,
            simulator_metadata: SimulatorMetadata::default(),
        }
    }
}

/// Single field reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue {
    pub field_id: String,
    pub name: String,
    pub data_type: DataType,
    pub value: Value,
    pub units: String,
    pub timestamp: String,
    pub quality: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsArrayResponse {
    pub fields: Vec<FieldValue>,
    pub count: usize,
}

impl FieldsArrayResponse {
    pub fn new(fields: Vec<FieldValue>) -> Self {
        let count = fields.len();
        Self { fields, count }
    }
}

pub struct FieldSimulator {
    config: FieldsConfig,
}

impl FieldSimulator {
    pub fn new(config: FieldsConfig) -> Self {
        Self { config }
    }

    pub fn metadata(&self) -> &SimulatorMetadata {
        &self.config.simulator_metadata
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.config.fields.keys().map(String::as_str)
    }

    pub fn read<R: Rng>(&self, field_id: &str, now: DateTime<Utc>, rng: &mut R) -> Result<FieldValue> {
        let field = self
            .config
            .fields
            .get(field_id)
            .ok_or_else(|| Error::NotFound(format!("unknown field_id '{}'", field_id)))?;

        Ok(FieldValue {
            field_id: field_id.to_string(),
            name: field.name.clone(),
            data_type: field.data_type,
            value: field.generate_value(rng),
            units: field.units.clone(),
            timestamp: now.to_rfc3339(),
            quality: "good".to_string(),
            metadata: field.metadata.clone(),
        })
    }

    /// Read the requested fields in order; an empty request reads every field
    pub fn read_many<R: Rng>(
        &self,
        field_ids: &[String],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<FieldsArrayResponse> {
        let fields = if field_ids.is_empty() {
            self.config
                .fields
                .keys()
                .map(|id| self.read(id, now, rng))
                .collect::<Result<Vec<_>>>()?
        } else {
            field_ids
                .iter()
                .map(|id| self.read(id, now, rng))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(FieldsArrayResponse::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_string_field_requires_options() {
        let raw = r#"{"fields": {"s": {"name": "S", "data_type": "string"}}}"#;
        let err = FieldsConfig::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("string_options required"));

        let raw = r#"{"fields": {"s": {"name": "S", "data_type": "string", "string_options": []}}}"#;
        assert!(FieldsConfig::from_json(raw).is_err());
    }

    #[test]
    fn test_numeric_range_must_be_ordered() {
        let raw = r#"{"fields": {"t": {"name": "T", "data_type": "float", "min_value": 10, "max_value": 5}}}"#;
        let err = FieldsConfig::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("max_value must be greater"));

        let raw = r#"{"fields": {"t": {"name": "T", "data_type": "integer", "min_value": 5, "max_value": 5}}}"#;
        let config = FieldsConfig::from_json(raw).unwrap();
        assert_eq!(config.simulator_metadata.version, "2.0.0");
    }

    #[test]
    fn test_generated_values_match_types() {
        let sim = FieldSimulator::new(FieldsConfig::builtin());
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();

        for _ in 0..50 {
            let t = sim.read("temp-celsius-01", now, &mut rng).unwrap();
            let v = t.value.as_f64().unwrap();
            assert!((15.0..=35.0).contains(&v));

            let s = sim.read("status-indicator-01", now, &mut rng).unwrap();
            assert!(["normal", "warning", "critical"].contains(&s.value.as_str().unwrap()));

            let b = sim.read("alarm-light-01", now, &mut rng).unwrap();
            assert!(b.value.is_boolean());
        }
    }

    #[test]
    fn test_integer_field() {
        let raw = r#"{"fields": {"c": {"name": "Count", "data_type": "integer", "min_value": 1, "max_value": 3}}}"#;
        let sim = FieldSimulator::new(FieldsConfig::from_json(raw).unwrap());
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..30 {
            let v = sim.read("c", Utc::now(), &mut rng).unwrap().value.as_i64().unwrap();
            assert!((1..=3).contains(&v));
        }
    }

    #[test]
    fn test_read_many_count_matches() {
        let sim = FieldSimulator::new(FieldsConfig::builtin());
        let mut rng = StdRng::seed_from_u64(5);

        let ids = vec!["alarm-light-01".to_string(), "temp-celsius-01".to_string()];
        let resp = sim.read_many(&ids, Utc::now(), &mut rng).unwrap();
        assert_eq!(resp.count, 2);
        assert_eq!(resp.fields[0].field_id, "alarm-light-01");

        let all = sim.read_many(&[], Utc::now(), &mut rng).unwrap();
        assert_eq!(all.count, all.fields.len());
        assert_eq!(all.count, 5);

        let missing = sim.read_many(&["nope".to_string()], Utc::now(), &mut rng);
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.json");
        std::fs::write(
            &path,
            r#"{"fields": {"x": {"name": "X", "data_type": "boolean"}},
                "simulator_metadata": {"device_id": "dev-9"}}"#,
        )
        .unwrap();
        let config = FieldsConfig::load_from_file(&path).unwrap();
        assert_eq!(config.simulator_metadata.device_id, "dev-9");
        assert_eq!(config.simulator_metadata.description, "Field-based sensor data simulator");

        assert!(FieldsConfig::load_from_file(&dir.path().join("missing.json")).is_err());
    }
}
