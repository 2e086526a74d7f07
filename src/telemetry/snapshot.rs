//! # Telemetry Snapshot Schema
//!
//! Typed, read-only view of the payload the sensor node sends. Every field is
//! optional and unknown fields are ignored, so any valid payload can be viewed
//! through it; the framer itself never enforces this schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::Result;

/// Accelerometer reading in g
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct AccelG {
    pub ax: Option<f64>,
    pub ay: Option<f64>,
    pub az: Option<f64>,
}

/// Gyroscope reading in degrees per second
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct GyroDps {
    pub gx: Option<f64>,
    pub gy: Option<f64>,
    pub gz: Option<f64>,
}

/// Orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct AttitudeDeg {
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub yaw: Option<f64>,
}

/// MPU6050 IMU block
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Mpu6050 {
    pub accel_g: Option<AccelG>,
    pub gyro_dps: Option<GyroDps>,
    pub attitude_deg: Option<AttitudeDeg>,
    pub timestamp: Option<String>,
}

/// NEO-6M GPS block
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Neo6m {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub fix_time: Option<String>,
    /// Raw NMEA sentence
    pub raw: Option<String>,
    pub timestamp: Option<String>,
}

/// BMP180 barometer raw readings
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Bmp180Raw {
    /// Temperature in °C
    #[serde(rename = "T")]
    pub temperature: Option<f64>,
    /// Pressure in hPa
    #[serde(rename = "P")]
    pub pressure: Option<f64>,
}

/// BMP180 barometer block
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Bmp180 {
    pub raw: Option<Bmp180Raw>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Sensors {
    pub mpu6050: Option<Mpu6050>,
    pub neo6m: Option<Neo6m>,
    pub bmp180: Option<Bmp180>,
}

/// Metadata injected by the framer
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMeta {
    pub topic: Option<String>,
    pub received_at: Option<String>,
}

/// Typed view of one telemetry payload
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct TelemetrySnapshot {
    pub reported_at: Option<String>,
    pub sensors: Option<Sensors>,
    pub meta: Option<PayloadMeta>,
}

impl TelemetrySnapshot {
    /// View a payload through the schema
    ///
    /// # Errors
    ///
    /// Returns `Json` if a known field has the wrong type (e.g. a string
    /// latitude) or the payload is not an object.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Load and view a persisted snapshot file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn topic(&self) -> Option<&str> {
        self.meta.as_ref()?.topic.as_deref()
    }

    pub fn attitude(&self) -> Option<AttitudeDeg> {
        self.sensors.as_ref()?.mpu6050.as_ref()?.attitude_deg
    }

    /// `(latitude, longitude)` when both are present
    pub fn position(&self) -> Option<(f64, f64)> {
        let gps = self.sensors.as_ref()?.neo6m.as_ref()?;
        Some((gps.latitude?, gps.longitude?))
    }

    /// One-line human summary, e.g. for logs
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("topic={}", self.topic().unwrap_or("?"))];

        if let Some(att) = self.attitude() {
            parts.push(format!(
                "pitch={:.2} roll={:.2} yaw={:.2}",
                att.pitch.unwrap_or_default(),
                att.roll.unwrap_or_default(),
                att.yaw.unwrap_or_default()
            ));
        }

        if let Some((lat, lon)) = self.position() {
            parts.push(format!("lat={:.5} lon={:.5}", lat, lon));
        }

        if let Some(raw) = self
            .sensors
            .as_ref()
            .and_then(|s| s.bmp180.as_ref())
            .and_then(|b| b.raw)
        {
            if let (Some(t), Some(p)) = (raw.temperature, raw.pressure) {
                parts.push(format!("T={:.1}C P={:.1}hPa", t, p));
            }
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "reported_at": "2024-05-01T12:00:00.000000Z",
            "sensors": {
                "mpu6050": {
                    "timestamp": "2024-05-01T11:59:59.995000Z",
                    "accel_g": {"ax": 0.012, "ay": -0.5, "az": 0.98},
                    "gyro_dps": {"gx": 1.5, "gy": -2.25, "gz": 0.0},
                    "attitude_deg": {"pitch": 10.5, "roll": -3.25, "yaw": 182.0}
                },
                "bmp180": {"timestamp": "2024-05-01T11:59:59.940000Z", "raw": {"T": 21.5, "P": 1013.5}},
                "neo6m": {
                    "timestamp": "2024-05-01T11:59:59.890000Z",
                    "latitude": 40.5,
                    "longitude": -3.75,
                    "altitude": 655.0,
                    "fix_time": "2024-05-01T11:59:59.800000Z",
                    "raw": "$GPGGA,000000.00,0000.0000,N,00000.0000,E,1,08,0.9,000.0,M,0.0,M,,*00"
                }
            },
            "meta": {"topic": "sensors", "receivedAt": "2024-05-01T12:00:00.100000Z"}
        })
    }

    #[test]
    fn test_from_value_full_payload() {
        let snapshot = TelemetrySnapshot::from_value(&sample()).unwrap();

        assert_eq!(snapshot.topic(), Some("sensors"));
        assert_eq!(snapshot.position(), Some((40.5, -3.75)));

        let attitude = snapshot.attitude().unwrap();
        assert_eq!(attitude.pitch, Some(10.5));
        assert_eq!(attitude.yaw, Some(182.0));

        let sensors = snapshot.sensors.as_ref().unwrap();
        let gps = sensors.neo6m.as_ref().unwrap();
        assert!(gps.raw.as_deref().unwrap().starts_with("$GPGGA"));
        assert_eq!(sensors.bmp180.as_ref().unwrap().raw.unwrap().pressure, Some(1013.5));
        assert_eq!(
            snapshot.meta.as_ref().unwrap().received_at.as_deref(),
            Some("2024-05-01T12:00:00.100000Z")
        );
    }

    #[test]
    fn test_from_value_tolerates_partial_and_unknown_fields() {
        let snapshot =
            TelemetrySnapshot::from_value(&json!({"a": 1, "sensors": {"lidar": {}}})).unwrap();

        assert_eq!(snapshot.topic(), None);
        assert_eq!(snapshot.position(), None);
        assert_eq!(snapshot.attitude(), None);
    }

    #[test]
    fn test_from_value_rejects_wrong_types() {
        let value = json!({"sensors": {"neo6m": {"latitude": "north"}}});
        assert!(TelemetrySnapshot::from_value(&value).is_err());
        assert!(TelemetrySnapshot::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_summary() {
        let snapshot = TelemetrySnapshot::from_value(&sample()).unwrap();
        assert_eq!(
            snapshot.summary(),
            "topic=sensors pitch=10.50 roll=-3.25 yaw=182.00 lat=40.50000 lon=-3.75000 T=21.5C P=1013.5hPa"
        );
    }

    #[test]
    fn test_load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_vec_pretty(&sample()).unwrap()).unwrap();

        let snapshot = TelemetrySnapshot::load(file.path()).unwrap();
        assert_eq!(snapshot.position(), Some((40.5, -3.75)));
    }
}
