use serde::{Deserialize, Serialize};

/// Transferable fog raster: a `data:image/png;base64,...` URL of an 8-bit
/// grayscale image whose value is the fog alpha (255 fogged, 0 revealed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedMask(pub String);

impl EncodedMask {
    pub const DATA_URL_PREFIX: &'static str = "data:image/png;base64,";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64 body with the data URL prefix stripped, if present.
    pub fn payload(&self) -> &str {
        self.0
            .strip_prefix(Self::DATA_URL_PREFIX)
            .unwrap_or(self.0.as_str())
    }
}

/// Revealed-area state of a map's fog.
///
/// `Uninitialized` and `FullyRevealed` are distinct: a fresh map is fully
/// fogged while "Reveal All" clears everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "mask", rename_all = "snake_case")]
pub enum MaskState {
    #[default]
    Uninitialized,
    FullyFogged,
    FullyRevealed,
    Partial(EncodedMask),
}

impl MaskState {
    /// True when nothing at all is visible through the fog.
    pub fn is_fully_fogged(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::FullyFogged)
    }

    pub fn encoded(&self) -> Option<&EncodedMask> {
        match self {
            Self::Partial(mask) => Some(mask),
            _ => None,
        }
    }
}

pub const DEFAULT_BRUSH_SIZE: f64 = 40.0;
pub const MIN_BRUSH_SIZE: f64 = 5.0;
pub const MAX_BRUSH_SIZE: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FogOfWar {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub is_drawing: bool,
    #[serde(default = "default_brush_size")]
    pub brush_size: f64,
    #[serde(default)]
    pub revealed_mask: MaskState,
}

fn default_brush_size() -> f64 {
    DEFAULT_BRUSH_SIZE
}

impl Default for FogOfWar {
    fn default() -> Self {
        Self {
            enabled: false,
            is_drawing: false,
            brush_size: DEFAULT_BRUSH_SIZE,
            revealed_mask: MaskState::Uninitialized,
        }
    }
}

/// Field-by-field partial of [`FogOfWar`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FogPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_drawing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brush_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealed_mask: Option<MaskState>,
}

impl FogPatch {
    pub fn mask(mask: MaskState) -> Self {
        Self {
            revealed_mask: Some(mask),
            ..Self::default()
        }
    }

    pub fn apply_to(self, fog: &mut FogOfWar) {
        if let Some(enabled) = self.enabled {
            fog.enabled = enabled;
        }
        if let Some(is_drawing) = self.is_drawing {
            fog.is_drawing = is_drawing;
        }
        if let Some(brush_size) = self.brush_size {
            fog.brush_size = brush_size;
        }
        if let Some(mask) = self.revealed_mask {
            fog.revealed_mask = mask;
        }
    }
}

/// A full fog state as a patch that overwrites every field.
impl From<FogOfWar> for FogPatch {
    fn from(fog: FogOfWar) -> Self {
        Self {
            enabled: Some(fog.enabled),
            is_drawing: Some(fog.is_drawing),
            brush_size: Some(fog.brush_size),
            revealed_mask: Some(fog.revealed_mask),
        }
    }
}
