use tabletop_shared::{LatLng, MapState, MapStatePatch, SpellEffect, SpellEffectPreview};
use tracing::debug;

use super::{Overlay, ProjectionContext, check_position, check_radius, invalid};
use crate::error::Result;
use crate::render::{Control, NodeShape, OverlayLayer, OverlayNode};

const NAME: &str = "spells";

pub const PREVIEW_NODE_ID: &str = "spell-preview";

/// Confirmed spell areas plus the single pending preview.
pub struct SpellOverlay;

impl Overlay for SpellOverlay {
    fn name(&self) -> &'static str {
        NAME
    }

    fn project(&self, state: &MapState, ctx: &ProjectionContext) -> Result<Vec<OverlayNode>> {
        let mut nodes = Vec::with_capacity(state.spell_effects.len() + 1);
        for effect in &state.spell_effects {
            nodes.push(circle(
                format!("spell:{}", effect.id),
                effect.position,
                effect.radius,
                &effect.color,
                false,
                ctx.controls(&[Control::Drag, Control::Resize, Control::Remove]),
            )?);
        }
        if let Some(preview) = &state.spell_effect_preview {
            nodes.push(circle(
                PREVIEW_NODE_ID.to_string(),
                preview.position,
                preview.radius,
                &preview.color,
                true,
                ctx.controls(&[Control::Confirm, Control::Cancel]),
            )?);
        }
        Ok(nodes)
    }
}

fn circle(
    id: String,
    center: LatLng,
    radius: f64,
    color: &str,
    pulsing: bool,
    controls: Vec<Control>,
) -> Result<OverlayNode> {
    check_position(NAME, center)?;
    check_radius(NAME, radius)?;
    Ok(OverlayNode {
        id,
        layer: OverlayLayer::Spells,
        shape: NodeShape::Circle {
            center,
            radius,
            color: color.to_string(),
            pulsing,
        },
        controls,
    })
}

/// Drop a preview. Any earlier unconfirmed preview is replaced.
pub fn create_preview(preview: SpellEffectPreview) -> Result<MapStatePatch> {
    check_position(NAME, preview.position)?;
    check_radius(NAME, preview.radius)?;
    Ok(MapStatePatch {
        spell_effect_preview: Some(Some(preview)),
        ..MapStatePatch::default()
    })
}

/// Promote the preview to a permanent effect with `id`. `None` without a preview.
pub fn confirm_preview(state: &MapState, id: String) -> Option<MapStatePatch> {
    let preview = state.spell_effect_preview.clone()?;
    debug!(effect = %id, kind = %preview.kind, "spell effect confirmed");
    let mut effects = state.spell_effects.clone();
    effects.push(preview.into_effect(id));
    Some(MapStatePatch {
        spell_effects: Some(effects),
        spell_effect_preview: Some(None),
        ..MapStatePatch::default()
    })
}

pub fn cancel_preview(state: &MapState) -> Option<MapStatePatch> {
    state.spell_effect_preview.as_ref()?;
    Some(MapStatePatch {
        spell_effect_preview: Some(None),
        ..MapStatePatch::default()
    })
}

pub fn move_effect(state: &MapState, id: &str, position: LatLng) -> Result<MapStatePatch> {
    check_position(NAME, position)?;
    edit_effect(state, id, |effect| effect.position = position)
}

pub fn resize_effect(state: &MapState, id: &str, radius: f64) -> Result<MapStatePatch> {
    check_radius(NAME, radius)?;
    edit_effect(state, id, |effect| effect.radius = radius)
}

pub fn remove_effect(state: &MapState, id: &str) -> Option<MapStatePatch> {
    if !state.spell_effects.iter().any(|e| e.id == id) {
        return None;
    }
    Some(MapStatePatch {
        spell_effects: Some(
            state
                .spell_effects
                .iter()
                .filter(|e| e.id != id)
                .cloned()
                .collect(),
        ),
        ..MapStatePatch::default()
    })
}

fn edit_effect(
    state: &MapState,
    id: &str,
    edit: impl FnOnce(&mut SpellEffect),
) -> Result<MapStatePatch> {
    let mut effects = state.spell_effects.clone();
    let effect = effects
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or_else(|| invalid(NAME, format!("no spell effect with id {id:?}")))?;
    edit(effect);
    Ok(MapStatePatch {
        spell_effects: Some(effects),
        ..MapStatePatch::default()
    })
}

#[cfg(test)]
mod tests {
    use tabletop_shared::mapset::MapDimensions;
    use tabletop_shared::{MapState, SpellEffectPreview};

    use super::{
        PREVIEW_NODE_ID, SpellOverlay, cancel_preview, confirm_preview, create_preview,
        move_effect, remove_effect, resize_effect,
    };
    use crate::overlay::{Overlay, ProjectionContext};
    use crate::render::{Control, NodeShape};
    use crate::store::Role;

    fn fireball() -> SpellEffectPreview {
        SpellEffectPreview {
            kind: "fireball".to_string(),
            position: [400.0, 400.0],
            radius: 120.0,
            color: "#ff5500".to_string(),
        }
    }

    #[test]
    fn preview_pulses_and_only_dm_gets_confirm_controls() {
        let mut state = MapState::default();
        create_preview(fireball()).expect("preview").apply_to(&mut state);

        let ctx = |role| ProjectionContext {
            role,
            dims: MapDimensions::default(),
        };
        let dm = SpellOverlay.project(&state, &ctx(Role::Authority)).expect("dm");
        let player = SpellOverlay.project(&state, &ctx(Role::Replica)).expect("player");

        assert_eq!(dm[0].id, PREVIEW_NODE_ID);
        assert!(matches!(dm[0].shape, NodeShape::Circle { pulsing: true, .. }));
        assert_eq!(dm[0].controls, vec![Control::Confirm, Control::Cancel]);
        assert!(player[0].controls.is_empty());
    }

    #[test]
    fn confirm_promotes_and_clears_preview() {
        let mut state = MapState::default();
        create_preview(fireball()).expect("preview").apply_to(&mut state);
        confirm_preview(&state, "effect-1".to_string())
            .expect("confirm")
            .apply_to(&mut state);

        assert!(state.spell_effect_preview.is_none());
        assert_eq!(state.spell_effects.len(), 1);
        assert_eq!(state.spell_effects[0].id, "effect-1");
        assert!(confirm_preview(&state, "effect-2".to_string()).is_none());
    }

    #[test]
    fn cancel_leaves_effects_untouched() {
        let mut state = MapState::default();
        create_preview(fireball()).expect("preview").apply_to(&mut state);
        confirm_preview(&state, "effect-1".to_string())
            .expect("confirm")
            .apply_to(&mut state);
        create_preview(fireball()).expect("preview").apply_to(&mut state);

        cancel_preview(&state).expect("cancel").apply_to(&mut state);
        assert_eq!(state.spell_effects.len(), 1);
        assert!(state.spell_effect_preview.is_none());
        assert!(cancel_preview(&state).is_none());
    }

    #[test]
    fn effects_can_be_moved_resized_and_removed() {
        let mut state = MapState::default();
        create_preview(fireball()).expect("preview").apply_to(&mut state);
        confirm_preview(&state, "effect-1".to_string())
            .expect("confirm")
            .apply_to(&mut state);

        move_effect(&state, "effect-1", [10.0, 20.0])
            .expect("move")
            .apply_to(&mut state);
        resize_effect(&state, "effect-1", 30.0)
            .expect("resize")
            .apply_to(&mut state);
        assert_eq!(state.spell_effects[0].position, [10.0, 20.0]);
        assert_eq!(state.spell_effects[0].radius, 30.0);
        assert!(resize_effect(&state, "effect-1", -1.0).is_err());
        assert!(move_effect(&state, "missing", [0.0, 0.0]).is_err());

        remove_effect(&state, "effect-1")
            .expect("remove")
            .apply_to(&mut state);
        assert!(state.spell_effects.is_empty());
    }
}
