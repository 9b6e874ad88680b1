use serde::{Deserialize, Deserializer, Serialize};

use crate::fog::FogPatch;
use crate::geometry::ContainerSize;
use crate::map_state::{
    Combatant, GridSettings, MapRef, MapState, Marker, Route, SpellEffect, SpellEffectPreview,
    Token, ViewportState, Weather,
};

/// Shallow partial update of [`MapState`].
///
/// Every present field replaces the current value wholesale, except `fog_of_war`
/// which merges field by field. `spell_effect_preview: Some(None)` clears the slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_map_id: Option<MapRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ViewportState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dm_container_size: Option<ContainerSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<Vec<Marker>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<Token>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative_order: Option<Vec<Combatant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fog_of_war: Option<FogPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_settings: Option<GridSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<Weather>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_effects: Option<Vec<SpellEffect>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub spell_effect_preview: Option<Option<SpellEffectPreview>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl MapStatePatch {
    pub fn fog(fog: FogPatch) -> Self {
        Self {
            fog_of_war: Some(fog),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Combine two patches; fields present in `later` win, fog fields merge.
    pub fn merge(mut self, later: MapStatePatch) -> Self {
        macro_rules! take_later {
            ($($field:ident),* $(,)?) => {
                $(if later.$field.is_some() { self.$field = later.$field; })*
            };
        }
        take_later!(
            current_map_id,
            viewport,
            dm_container_size,
            markers,
            tokens,
            initiative_order,
            current_turn_index,
            route,
            grid_settings,
            weather,
            spell_effects,
            spell_effect_preview,
        );
        self.fog_of_war = match (self.fog_of_war, later.fog_of_war) {
            (Some(earlier), Some(later)) => Some(FogPatch {
                enabled: later.enabled.or(earlier.enabled),
                is_drawing: later.is_drawing.or(earlier.is_drawing),
                brush_size: later.brush_size.or(earlier.brush_size),
                revealed_mask: later.revealed_mask.or(earlier.revealed_mask),
            }),
            (earlier, later) => later.or(earlier),
        };
        self
    }

    pub fn apply_to(self, state: &mut MapState) {
        macro_rules! replace {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field { state.$field = value; })*
            };
        }
        if let Some(viewport) = self.viewport {
            state.viewport = Some(viewport);
        }
        if let Some(size) = self.dm_container_size {
            state.dm_container_size = Some(size);
        }
        if let Some(fog) = self.fog_of_war {
            fog.apply_to(&mut state.fog_of_war);
        }
        replace!(
            current_map_id,
            markers,
            tokens,
            initiative_order,
            current_turn_index,
            route,
            grid_settings,
            weather,
            spell_effects,
            spell_effect_preview,
        );
    }
}
