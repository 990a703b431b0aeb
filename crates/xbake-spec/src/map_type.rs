//! Bakeable map types.

use serde::{Deserialize, Serialize};

/// A texture map the baker can produce.
///
/// Declaration order is job order: material-independent ("unlit") maps run
/// first, followed by the material-dependent ("lit") passes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MapType {
    Normal,
    AmbientOcclusion,
    Curvature,
    Uv,
    Position,
    WorldSpaceNormal,
    Combined,
    Shadow,
    Roughness,
    Emit,
    Environment,
    Diffuse,
    Glossy,
    Transmission,
}

/// Synthesized channels the renderer cannot bake natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedChannel {
    Curvature,
    WorldSpaceNormal,
    Position,
}

/// PNG bit depth for a saved map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "16")]
    Sixteen,
}

impl BitDepth {
    /// Returns the depth in bits per channel.
    pub fn bits(&self) -> u8 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }
}

impl MapType {
    /// Returns all map types in job order.
    pub fn all() -> &'static [MapType] {
        &[
            MapType::Normal,
            MapType::AmbientOcclusion,
            MapType::Curvature,
            MapType::Uv,
            MapType::Position,
            MapType::WorldSpaceNormal,
            MapType::Combined,
            MapType::Shadow,
            MapType::Roughness,
            MapType::Emit,
            MapType::Environment,
            MapType::Diffuse,
            MapType::Glossy,
            MapType::Transmission,
        ]
    }

    /// Returns the configuration key (`world_space_normal`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            MapType::Normal => "normal",
            MapType::AmbientOcclusion => "ambient_occlusion",
            MapType::Curvature => "curvature",
            MapType::Uv => "uv",
            MapType::Position => "position",
            MapType::WorldSpaceNormal => "world_space_normal",
            MapType::Combined => "combined",
            MapType::Shadow => "shadow",
            MapType::Roughness => "roughness",
            MapType::Emit => "emit",
            MapType::Environment => "environment",
            MapType::Diffuse => "diffuse",
            MapType::Glossy => "glossy",
            MapType::Transmission => "transmission",
        }
    }

    /// Returns the short tag used in transient image names (`AO`, `UV`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            MapType::Normal => "NORMAL",
            MapType::AmbientOcclusion => "AO",
            MapType::Curvature => "CURVATURE",
            MapType::Uv => "UV",
            MapType::Position => "POSITION",
            MapType::WorldSpaceNormal => "WORLD_SPACE_NORMAL",
            MapType::Combined => "COMBINED",
            MapType::Shadow => "SHADOW",
            MapType::Roughness => "ROUGHNESS",
            MapType::Emit => "EMIT",
            MapType::Environment => "ENVIRONMENT",
            MapType::Diffuse => "DIFFUSE",
            MapType::Glossy => "GLOSSY",
            MapType::Transmission => "TRANSMISSION",
        }
    }

    /// Returns the words of the file label, upper case.
    pub fn label_words(&self) -> &'static [&'static str] {
        match self {
            MapType::Normal => &["NORMAL"],
            MapType::AmbientOcclusion => &["AMBIENT", "OCCLUSION"],
            MapType::Curvature => &["CURVATURE"],
            MapType::Uv => &["UV"],
            MapType::Position => &["POSITION"],
            MapType::WorldSpaceNormal => &["WORLD", "SPACE", "NORMALS"],
            MapType::Combined => &["COMBINED"],
            MapType::Shadow => &["SHADOW"],
            MapType::Roughness => &["ROUGHNESS"],
            MapType::Emit => &["EMIT"],
            MapType::Environment => &["ENVIRONMENT"],
            MapType::Diffuse => &["DIFFUSE"],
            MapType::Glossy => &["GLOSSY"],
            MapType::Transmission => &["TRANSMISSION"],
        }
    }

    /// Returns the file label with words joined by `separator`.
    pub fn label(&self, separator: &str) -> String {
        self.label_words().join(separator)
    }

    /// Returns true for material-dependent maps driven by scene lighting.
    pub fn is_lit(&self) -> bool {
        !matches!(
            self,
            MapType::Normal
                | MapType::AmbientOcclusion
                | MapType::Curvature
                | MapType::Uv
                | MapType::Position
                | MapType::WorldSpaceNormal
        )
    }

    /// Returns the synthesized channel for maps baked through a temporary graph.
    pub fn derived_channel(&self) -> Option<DerivedChannel> {
        match self {
            MapType::Curvature => Some(DerivedChannel::Curvature),
            MapType::WorldSpaceNormal => Some(DerivedChannel::WorldSpaceNormal),
            MapType::Position => Some(DerivedChannel::Position),
            _ => None,
        }
    }

    /// Returns true if the map depends on the forward/up convention.
    pub fn is_axis_dependent(&self) -> bool {
        matches!(self, MapType::Position | MapType::WorldSpaceNormal)
    }

    /// Returns the bit depth the map is saved with.
    pub fn bit_depth(&self) -> BitDepth {
        if self.is_axis_dependent() {
            BitDepth::Sixteen
        } else {
            BitDepth::Eight
        }
    }
}

impl std::fmt::Display for MapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MapType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "ao" => return Ok(MapType::AmbientOcclusion),
            "wsn" | "worldspacenormal" => return Ok(MapType::WorldSpaceNormal),
            _ => {}
        }
        MapType::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| format!("unknown map type: {}", s))
    }
}
