use tabletop_shared::{LatLng, MapState, MapStatePatch, Route};

use super::{Overlay, ProjectionContext, check_position};
use crate::error::Result;
use crate::render::{NodeShape, OverlayLayer, OverlayNode};
use crate::store::Role;

const NAME: &str = "route";

/// Planned travel path. Players only see it once the DM shares it; the DM sees
/// an unshared route dashed.
pub struct RouteOverlay;

impl Overlay for RouteOverlay {
    fn name(&self) -> &'static str {
        NAME
    }

    fn project(&self, state: &MapState, ctx: &ProjectionContext) -> Result<Vec<OverlayNode>> {
        let route = &state.route;
        if route.waypoints.len() < 2 {
            return Ok(Vec::new());
        }
        if ctx.role == Role::Replica && !route.visible_to_players {
            return Ok(Vec::new());
        }
        for point in &route.waypoints {
            check_position(NAME, *point)?;
        }
        Ok(vec![OverlayNode {
            id: "route".to_string(),
            layer: OverlayLayer::Route,
            shape: NodeShape::Polyline {
                points: route.waypoints.clone(),
                dashed: !route.visible_to_players,
            },
            controls: Vec::new(),
        }])
    }
}

pub fn add_waypoint(state: &MapState, point: LatLng) -> Result<MapStatePatch> {
    check_position(NAME, point)?;
    let mut route = state.route.clone();
    route.waypoints.push(point);
    Ok(patch(route))
}

/// Drops the waypoints; the sharing flag is kept.
pub fn clear_route(state: &MapState) -> MapStatePatch {
    patch(Route {
        waypoints: Vec::new(),
        visible_to_players: state.route.visible_to_players,
    })
}

pub fn set_route_visibility(state: &MapState, visible: bool) -> MapStatePatch {
    patch(Route {
        waypoints: state.route.waypoints.clone(),
        visible_to_players: visible,
    })
}

fn patch(route: Route) -> MapStatePatch {
    MapStatePatch {
        route: Some(route),
        ..MapStatePatch::default()
    }
}
