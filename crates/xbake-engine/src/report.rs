//! Bake run report.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xbake_spec::{BakeConfiguration, BitDepth, MapType};

/// A map written by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakedMap {
    pub map_type: MapType,
    pub path: PathBuf,
    pub resolution: [u32; 2],
    pub bit_depth: BitDepth,
}

/// Summary of a bake run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakeReport {
    pub ok: bool,
    pub baked_maps: Vec<BakedMap>,
    /// Margin in pixels.
    pub margin: u32,
    pub ray_distance: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl BakeReport {
    /// Creates an empty successful report for a configuration.
    pub fn new(config: &BakeConfiguration) -> Self {
        Self {
            ok: true,
            baked_maps: Vec::new(),
            margin: config.margin_pixels(),
            ray_distance: config.max_ray_distance,
            warnings: Vec::new(),
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Creates a failed report.
    pub fn failure(config: &BakeConfiguration, error: impl std::fmt::Display) -> Self {
        let mut report = Self::new(config);
        report.ok = false;
        report.errors.push(error.to_string());
        report
    }

    /// Records a written map.
    pub fn push_map(&mut self, map: BakedMap) {
        self.baked_maps.push(map);
    }

    /// Records a warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns the map of a given type, if it was written.
    pub fn map(&self, map_type: MapType) -> Option<&BakedMap> {
        self.baked_maps.iter().find(|m| m.map_type == map_type)
    }

    /// Serializes the report to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
