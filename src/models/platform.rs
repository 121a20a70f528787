//! Platform observation records: one monitoring platform (station, buoy,
//! sensor) reporting a batch of typed observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Provenance shared by every platform record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRecord {
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// A single observation value without platform context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub obs_type: String,
    pub uom_type: String,
    pub s_order: i32,
    pub value: f64,
}

/// A platform and the observations it reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecord {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub organization: String,
    pub platform_handle: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub samples: Vec<DataRecord>,
}

/// One observation with its platform context, as stored or exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformDataRecord {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub organization: String,
    pub platform_handle: String,
    pub obs_type: String,
    pub uom_type: String,
    pub s_order: i32,
    pub value: f64,
    pub date_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl PlatformRecord {
    /// Flatten the nested samples into one record per observation.
    ///
    /// Observations inherit the platform's position and the record timestamp.
    pub fn observations(&self) -> Vec<PlatformDataRecord> {
        // ---
        self.samples
            .iter()
            .map(|s| PlatformDataRecord {
                base: self.base.clone(),
                organization: self.organization.clone(),
                platform_handle: self.platform_handle.clone(),
                obs_type: s.obs_type.clone(),
                uom_type: s.uom_type.clone(),
                s_order: s.s_order,
                value: s.value,
                date_time: self.base.timestamp,
                latitude: self.latitude,
                longitude: self.longitude,
                altitude: self.altitude,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn create_test_platform() -> PlatformRecord {
        // ---
        serde_json::from_value(json!({
            "source": "purpleair",
            "timestamp": "2025-03-26T18:45:00Z",
            "organization": "secoora",
            "platform_handle": "pa.sensor.131075",
            "latitude": 32.78,
            "longitude": -79.93,
            "altitude": 4.0,
            "samples": [
                {"obs_type": "pm2.5_atm", "uom_type": "ug_m3", "s_order": 1, "value": 12.3},
                {"obs_type": "humidity", "uom_type": "percent", "s_order": 1, "value": 61.0}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn observations_carry_platform_context() {
        // ---
        let platform = create_test_platform();
        let obs = platform.observations();

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].obs_type, "pm2.5_atm");
        assert_eq!(obs[0].platform_handle, "pa.sensor.131075");
        assert_eq!(obs[1].value, 61.0);
        assert_eq!(obs[1].date_time, platform.base.timestamp);
        assert_eq!(obs[1].latitude, 32.78);
    }

    #[test]
    fn flat_record_serializes_base_fields_inline() {
        // ---
        let obs = create_test_platform().observations().remove(0);
        let value = serde_json::to_value(&obs).unwrap();
        assert_eq!(value["source"], json!("purpleair"));
        assert!(value.get("base").is_none());
    }

    #[test]
    fn missing_required_field_fails() {
        // ---
        let result = serde_json::from_value::<DataRecord>(json!({"obs_type": "x", "uom_type": "y", "value": 1.0}));
        assert!(result.is_err());
    }
}
