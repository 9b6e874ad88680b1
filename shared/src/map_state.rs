use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fog::FogOfWar;
use crate::geometry::{Bounds, ContainerSize, LatLng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKind {
    World,
    City,
    Combat,
}

/// Identifier of the active map. Wire form: `"world"`, `"city"`, `"combat:<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MapRef {
    #[default]
    World,
    City,
    Combat(String),
}

impl MapRef {
    pub fn kind(&self) -> MapKind {
        match self {
            Self::World => MapKind::World,
            Self::City => MapKind::City,
            Self::Combat(_) => MapKind::Combat,
        }
    }

    pub fn is_combat(&self) -> bool {
        self.kind() == MapKind::Combat
    }
}

impl fmt::Display for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::World => f.write_str("world"),
            Self::City => f.write_str("city"),
            Self::Combat(id) => write!(f, "combat:{id}"),
        }
    }
}

impl FromStr for MapRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "world" => Ok(Self::World),
            "city" => Ok(Self::City),
            _ => match s.strip_prefix("combat:") {
                Some(id) if !id.is_empty() => Ok(Self::Combat(id.to_string())),
                _ => Err(format!("unknown map id: {s:?}")),
            },
        }
    }
}

impl TryFrom<String> for MapRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MapRef> for String {
    fn from(value: MapRef) -> Self {
        value.to_string()
    }
}

/// Authoritative camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub center: LatLng,
    pub zoom: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

/// Party-location pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub position: LatLng,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub position: LatLng,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub is_player: bool,
    /// Diameter in map units.
    #[serde(default = "default_token_size")]
    pub size: f64,
}

fn default_token_size() -> f64 {
    50.0
}

/// Initiative entry. `token_id` links it to a [`Token`] on the combat map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub initiative: i32,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub waypoints: Vec<LatLng>,
    #[serde(default)]
    pub visible_to_players: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSettings {
    pub enabled: bool,
    pub cell_size: f64,
    #[serde(default)]
    pub offset: [f64; 2],
    pub color: String,
    pub opacity: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cell_size: 50.0,
            offset: [0.0, 0.0],
            color: "#ffffff".to_string(),
            opacity: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherKind {
    #[default]
    Clear,
    Rain,
    Snow,
    Fog,
    Storm,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Weather {
    pub kind: WeatherKind,
    #[serde(default)]
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellEffect {
    pub id: String,
    pub kind: String,
    pub position: LatLng,
    pub radius: f64,
    pub color: String,
}

/// Unconfirmed placement; becomes a [`SpellEffect`] once the DM confirms it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellEffectPreview {
    pub kind: String,
    pub position: LatLng,
    pub radius: f64,
    pub color: String,
}

impl SpellEffectPreview {
    pub fn into_effect(self, id: String) -> SpellEffect {
        SpellEffect {
            id,
            kind: self.kind,
            position: self.position,
            radius: self.radius,
            color: self.color,
        }
    }
}

/// The replicated snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    #[serde(default)]
    pub current_map_id: MapRef,
    #[serde(default)]
    pub viewport: Option<ViewportState>,
    #[serde(default)]
    pub dm_container_size: Option<ContainerSize>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub initiative_order: Vec<Combatant>,
    #[serde(default)]
    pub current_turn_index: usize,
    #[serde(default)]
    pub route: Route,
    #[serde(default)]
    pub fog_of_war: FogOfWar,
    #[serde(default)]
    pub grid_settings: GridSettings,
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub spell_effects: Vec<SpellEffect>,
    #[serde(default)]
    pub spell_effect_preview: Option<SpellEffectPreview>,
}

impl MapState {
    /// Combatant whose turn it is, if the order is non-empty.
    pub fn active_combatant(&self) -> Option<&Combatant> {
        self.initiative_order.get(self.current_turn_index)
    }

    pub fn token(&self, id: &str) -> Option<&Token> {
        self.tokens.iter().find(|token| token.id == id)
    }
}
