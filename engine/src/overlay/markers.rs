use tabletop_shared::{LatLng, MapState, MapStatePatch, Marker};

use super::{Overlay, ProjectionContext, check_position};
use crate::error::Result;
use crate::render::{Control, NodeShape, OverlayLayer, OverlayNode};

const NAME: &str = "markers";

/// Party-location pins.
pub struct MarkerOverlay;

impl Overlay for MarkerOverlay {
    fn name(&self) -> &'static str {
        NAME
    }

    fn project(&self, state: &MapState, ctx: &ProjectionContext) -> Result<Vec<OverlayNode>> {
        state
            .markers
            .iter()
            .map(|marker| {
                check_position(NAME, marker.position)?;
                Ok(OverlayNode {
                    id: format!("marker:{}", marker.id),
                    layer: OverlayLayer::Markers,
                    shape: NodeShape::Pin {
                        position: marker.position,
                        label: marker.label.clone(),
                    },
                    controls: ctx.controls(&[Control::Remove]),
                })
            })
            .collect()
    }
}

pub fn add_marker(state: &MapState, id: String, position: LatLng, label: &str) -> Result<MapStatePatch> {
    check_position(NAME, position)?;
    let mut markers = state.markers.clone();
    markers.push(Marker {
        id,
        position,
        label: label.trim().to_string(),
    });
    Ok(MapStatePatch {
        markers: Some(markers),
        ..MapStatePatch::default()
    })
}

/// `None` when no marker has that id.
pub fn remove_marker(state: &MapState, id: &str) -> Option<MapStatePatch> {
    if !state.markers.iter().any(|m| m.id == id) {
        return None;
    }
    let markers = state.markers.iter().filter(|m| m.id != id).cloned().collect();
    Some(MapStatePatch {
        markers: Some(markers),
        ..MapStatePatch::default()
    })
}
