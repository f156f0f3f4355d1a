//! Drop nodes positioned outside a bounding box

use meshpulse_core::Node;

use super::Filter;
use crate::error::{OutputError, Result};

/// Keeps nodes inside the box; nodes without a position pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InArea {
    latitude_min: f64,
    latitude_max: f64,
    longitude_min: f64,
    longitude_max: f64,
}

impl InArea {
    /// Build from a table with `latitude_min`, `latitude_max`,
    /// `longitude_min` and `longitude_max`
    pub fn build(value: &toml::Value) -> Result<Box<dyn Filter>> {
        let table = value
            .as_table()
            .ok_or_else(|| OutputError::invalid_filter("in_area", "table expected"))?;
        let coordinate = |key: &str| -> Result<f64> {
            match table.get(key) {
                None => Ok(0.0),
                Some(toml::Value::Float(f)) => Ok(*f),
                Some(toml::Value::Integer(i)) => Ok(*i as f64),
                Some(_) => Err(OutputError::invalid_filter(
                    "in_area",
                    format!("{key} must be a number"),
                )),
            }
        };

        let area = Self {
            latitude_min: coordinate("latitude_min")?,
            latitude_max: coordinate("latitude_max")?,
            longitude_min: coordinate("longitude_min")?,
            longitude_max: coordinate("longitude_max")?,
        };
        if area.latitude_min >= area.latitude_max {
            return Err(OutputError::invalid_filter(
                "in_area",
                "latitude_min must be below latitude_max",
            ));
        }
        if area.longitude_min >= area.longitude_max {
            return Err(OutputError::invalid_filter(
                "in_area",
                "longitude_min must be below longitude_max",
            ));
        }
        Ok(Box::new(area))
    }
}

impl Filter for InArea {
    fn apply(&self, node: Node) -> Option<Node> {
        let Some(location) = node.nodeinfo.as_ref().and_then(|info| info.location.as_ref()) else {
            return Some(node);
        };
        location
            .is_within(
                self.latitude_min,
                self.latitude_max,
                self.longitude_min,
                self.longitude_max,
            )
            .then_some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::{info, node_with};
    use meshpulse_core::Location;

    fn area(text: &str) -> Result<Box<dyn Filter>> {
        InArea::build(&toml::from_str::<toml::Value>(text).unwrap())
    }

    #[test]
    fn test_invalid_boxes() {
        assert!(InArea::build(&toml::Value::Boolean(true)).is_err());
        assert!(area("latitude_min = 54.0\nlatitude_max = 53.0\nlongitude_max = 9.0").is_err());
        assert!(area("latitude_max = 53.0\nlongitude_min = 9.0\nlongitude_max = 9.0").is_err());
        assert!(area("latitude_max = \"north\"\nlongitude_max = 9.0").is_err());
    }

    #[test]
    fn test_in_area() {
        let filter = area(
            "latitude_min = 53\nlatitude_max = 53.2\nlongitude_min = 8.5\nlongitude_max = 9.0",
        )
        .unwrap();
        let at = |lat, long| node_with(Some(info("aabbccddeeff", "", Some(Location::new(lat, long)))));

        assert!(filter.apply(at(53.07, 8.80)).is_some());
        assert!(filter.apply(at(52.50, 13.40)).is_none());
        assert!(filter.apply(node_with(Some(info("aabbccddeeff", "", None)))).is_some());
        assert!(filter.apply(node_with(None)).is_some());
    }
}
