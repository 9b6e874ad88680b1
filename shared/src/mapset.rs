//! Read-only map descriptors supplied by the hosting application.

use serde::{Deserialize, Serialize};

use crate::geometry::Bounds;
use crate::map_state::{Combatant, MapRef, Token};

/// Size used when a descriptor does not carry pixel dimensions.
pub const FALLBACK_MAP_WIDTH: u32 = 2000;
pub const FALLBACK_MAP_HEIGHT: u32 = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl MapDescriptor {
    /// Pixel dimensions, falling back to [`FALLBACK_MAP_WIDTH`] x [`FALLBACK_MAP_HEIGHT`]
    /// when missing or zero.
    pub fn dimensions(&self) -> MapDimensions {
        MapDimensions {
            width: self.width.filter(|w| *w > 0).unwrap_or(FALLBACK_MAP_WIDTH),
            height: self.height.filter(|h| *h > 0).unwrap_or(FALLBACK_MAP_HEIGHT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDimensions {
    pub width: u32,
    pub height: u32,
}

impl MapDimensions {
    pub fn bounds(&self) -> Bounds {
        Bounds::of_map(self.width as f64, self.height as f64)
    }
}

impl Default for MapDimensions {
    fn default() -> Self {
        Self {
            width: FALLBACK_MAP_WIDTH,
            height: FALLBACK_MAP_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSetData {
    #[serde(default)]
    pub world: Option<MapDescriptor>,
    #[serde(default)]
    pub city: Option<MapDescriptor>,
    #[serde(default)]
    pub dungeons: Vec<MapDescriptor>,
    #[serde(default)]
    pub locations: Vec<MapDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat_map_id: Option<String>,
    /// Tokens placed when the encounter starts.
    #[serde(default)]
    pub tokens: Vec<Token>,
    /// Initiative order, first combatant up.
    #[serde(default)]
    pub combatants: Vec<Combatant>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub combat_maps: Vec<MapDescriptor>,
    #[serde(default)]
    pub encounters: Vec<Encounter>,
}

/// Everything needed to resolve a [`MapRef`] into an image and its dimensions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapCatalog {
    pub map_set: MapSetData,
    pub session: SessionData,
}

impl MapCatalog {
    pub fn new(map_set: MapSetData, session: SessionData) -> Self {
        Self { map_set, session }
    }

    pub fn resolve(&self, map: &MapRef) -> Option<&MapDescriptor> {
        match map {
            MapRef::World => self.map_set.world.as_ref(),
            MapRef::City => self.map_set.city.as_ref(),
            MapRef::Combat(id) => self
                .session
                .combat_maps
                .iter()
                .chain(self.map_set.dungeons.iter())
                .find(|descriptor| &descriptor.id == id),
        }
    }

    pub fn encounter(&self, id: &str) -> Option<&Encounter> {
        self.session.encounters.iter().find(|e| e.id == id)
    }

    /// Dimensions of `map`, or the fallback size when the map is unknown.
    pub fn dimensions(&self, map: &MapRef) -> MapDimensions {
        self.resolve(map)
            .map(MapDescriptor::dimensions)
            .unwrap_or_default()
    }
}
