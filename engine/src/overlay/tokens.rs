use tabletop_shared::{Combatant, LatLng, MapState, MapStatePatch};
use tracing::debug;

use super::{Overlay, ProjectionContext, check_position, check_radius, invalid};
use crate::error::Result;
use crate::render::{Control, NodeShape, OverlayLayer, OverlayNode};

const NAME: &str = "tokens";

/// Combat tokens, highlighted by initiative state.
///
/// A token is matched to its combatant through `Combatant::token_id`; display
/// names play no part, so two goblins named "Goblin" stay distinct.
pub struct TokenOverlay;

impl Overlay for TokenOverlay {
    fn name(&self) -> &'static str {
        NAME
    }

    fn project(&self, state: &MapState, ctx: &ProjectionContext) -> Result<Vec<OverlayNode>> {
        let active = state
            .active_combatant()
            .and_then(|c| c.token_id.as_deref());
        state
            .tokens
            .iter()
            .map(|token| {
                check_position(NAME, token.position)?;
                check_radius(NAME, token.size)?;
                let dead = combatant_for(state, &token.id).is_some_and(|c| c.is_dead);
                Ok(OverlayNode {
                    id: format!("token:{}", token.id),
                    layer: OverlayLayer::Tokens,
                    shape: NodeShape::Token {
                        position: token.position,
                        image_url: token.image_url.clone(),
                        diameter: token.size,
                        is_player: token.is_player,
                        active_turn: !dead && active == Some(token.id.as_str()),
                        dead,
                    },
                    controls: ctx.controls(&[Control::Drag]),
                })
            })
            .collect()
    }
}

fn combatant_for<'a>(state: &'a MapState, token_id: &str) -> Option<&'a Combatant> {
    state
        .initiative_order
        .iter()
        .find(|c| c.token_id.as_deref() == Some(token_id))
}

pub fn move_token(state: &MapState, id: &str, position: LatLng) -> Result<MapStatePatch> {
    check_position(NAME, position)?;
    let mut tokens = state.tokens.clone();
    let token = tokens
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| invalid(NAME, format!("no token with id {id:?}")))?;
    token.position = position;
    Ok(MapStatePatch {
        tokens: Some(tokens),
        ..MapStatePatch::default()
    })
}

/// Next living combatant, wrapping at the end of the order.
///
/// `None` when the order is empty or everyone is dead.
pub fn advance_turn(state: &MapState) -> Option<MapStatePatch> {
    let len = state.initiative_order.len();
    if len == 0 {
        return None;
    }
    let start = state.current_turn_index.min(len - 1);
    let next = (1..=len)
        .map(|step| (start + step) % len)
        .find(|&i| !state.initiative_order[i].is_dead)?;
    debug!(from = start, to = next, "advancing initiative");
    Some(MapStatePatch {
        current_turn_index: Some(next),
        ..MapStatePatch::default()
    })
}

pub fn set_combatant_dead(state: &MapState, combatant_id: &str, dead: bool) -> Option<MapStatePatch> {
    let mut order = state.initiative_order.clone();
    let combatant = order.iter_mut().find(|c| c.id == combatant_id)?;
    combatant.is_dead = dead;
    Some(MapStatePatch {
        initiative_order: Some(order),
        ..MapStatePatch::default()
    })
}

#[cfg(test)]
mod tests {
    use tabletop_shared::mapset::MapDimensions;
    use tabletop_shared::{Combatant, MapState, Token};

    use super::{TokenOverlay, advance_turn, move_token, set_combatant_dead};
    use crate::overlay::{Overlay, ProjectionContext};
    use crate::render::NodeShape;
    use crate::store::Role;

    fn token(id: &str) -> Token {
        Token {
            id: id.to_string(),
            name: "Goblin".to_string(),
            position: [0.0, 0.0],
            image_url: String::new(),
            is_player: false,
            size: 50.0,
        }
    }

    fn combatant(id: &str, token_id: &str, dead: bool) -> Combatant {
        Combatant {
            id: id.to_string(),
            name: "Goblin".to_string(),
            initiative: 10,
            is_dead: dead,
            token_id: Some(token_id.to_string()),
        }
    }

    fn encounter() -> MapState {
        MapState {
            tokens: vec![token("t1"), token("t2"), token("t3")],
            initiative_order: vec![
                combatant("c1", "t1", false),
                combatant("c2", "t2", true),
                combatant("c3", "t3", false),
            ],
            ..MapState::default()
        }
    }

    fn flags(state: &MapState) -> Vec<(bool, bool)> {
        let ctx = ProjectionContext {
            role: Role::Replica,
            dims: MapDimensions::default(),
        };
        TokenOverlay
            .project(state, &ctx)
            .expect("project")
            .into_iter()
            .map(|node| match node.shape {
                NodeShape::Token {
                    active_turn, dead, ..
                } => (active_turn, dead),
                other => panic!("unexpected shape {other:?}"),
            })
            .collect()
    }

    #[test]
    fn same_named_combatants_resolve_by_token_id() {
        let state = encounter();
        assert_eq!(flags(&state), vec![(true, false), (false, true), (false, false)]);
    }

    #[test]
    fn advance_skips_dead_and_wraps() {
        let mut state = encounter();
        advance_turn(&state).expect("advance").apply_to(&mut state);
        assert_eq!(state.current_turn_index, 2);
        advance_turn(&state).expect("advance").apply_to(&mut state);
        assert_eq!(state.current_turn_index, 0);
    }

    #[test]
    fn advance_with_everyone_dead_is_none() {
        let mut state = encounter();
        for id in ["c1", "c3"] {
            set_combatant_dead(&state, id, true)
                .expect("known combatant")
                .apply_to(&mut state);
        }
        assert!(advance_turn(&state).is_none());
        assert!(advance_turn(&MapState::default()).is_none());
    }

    #[test]
    fn move_unknown_token_errors() {
        let state = encounter();
        assert!(move_token(&state, "t9", [1.0, 1.0]).is_err());
        let mut moved = state.clone();
        move_token(&state, "t2", [5.0, 6.0])
            .expect("move")
            .apply_to(&mut moved);
        assert_eq!(moved.token("t2").map(|t| t.position), Some([5.0, 6.0]));
    }
}
