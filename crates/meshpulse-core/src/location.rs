//! Geographic position reported in a node's nodeinfo

use serde::{Deserialize, Serialize};

use crate::data::null_default;

/// Geographic location of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees (-90 to 90)
    #[serde(default, deserialize_with = "null_default")]
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    #[serde(default, deserialize_with = "null_default")]
    pub longitude: f64,
    /// Altitude in meters, zero when unknown
    #[serde(default, skip_serializing_if = "is_zero", deserialize_with = "null_default")]
    pub altitude: f64,
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

impl Location {
    /// Create a new location without altitude
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
        }
    }

    /// Check whether this location lies inside the given bounding box (inclusive)
    pub fn is_within(
        &self,
        latitude_min: f64,
        latitude_max: f64,
        longitude_min: f64,
        longitude_max: f64,
    ) -> bool {
        self.latitude >= latitude_min
            && self.latitude <= latitude_max
            && self.longitude >= longitude_min
            && self.longitude <= longitude_max
    }
}
