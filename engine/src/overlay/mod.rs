//! Overlay projections of the snapshot onto map-layer primitives, and the
//! mutation helpers DM controls use to request changes.
//!
//! Projections are pure: they read a [`MapState`] and return nodes. Mutations
//! never touch the state they read; they return a [`MapStatePatch`] for the
//! store to merge and publish.

pub mod grid;
pub mod markers;
pub mod route;
pub mod spells;
pub mod tokens;
pub mod weather;

use tabletop_shared::mapset::MapDimensions;
use tabletop_shared::{LatLng, MapState};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::render::{Control, OverlayNode};
use crate::store::Role;

pub use grid::GridOverlay;
pub use markers::MarkerOverlay;
pub use route::RouteOverlay;
pub use spells::SpellOverlay;
pub use tokens::TokenOverlay;

/// What an overlay needs to know beyond the snapshot itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionContext {
    pub role: Role,
    pub dims: MapDimensions,
}

impl ProjectionContext {
    /// Controls are a DM affordance; replicas get none.
    pub(crate) fn controls(&self, controls: &[Control]) -> Vec<Control> {
        match self.role {
            Role::Authority => controls.to_vec(),
            Role::Replica => Vec::new(),
        }
    }
}

pub trait Overlay: Send + Sync {
    fn name(&self) -> &'static str;
    fn project(&self, state: &MapState, ctx: &ProjectionContext) -> Result<Vec<OverlayNode>>;
}

/// Every overlay, bottom layer first.
pub fn standard_overlays() -> Vec<Box<dyn Overlay>> {
    vec![
        Box::new(GridOverlay),
        Box::new(RouteOverlay),
        Box::new(SpellOverlay),
        Box::new(MarkerOverlay),
        Box::new(TokenOverlay),
    ]
}

/// Project every overlay. One overlay failing is logged and skipped; the rest
/// still render.
pub fn compose_scene(
    overlays: &[Box<dyn Overlay>],
    state: &MapState,
    ctx: &ProjectionContext,
) -> Vec<OverlayNode> {
    let mut nodes = Vec::new();
    for overlay in overlays {
        match overlay.project(state, ctx) {
            Ok(mut projected) => nodes.append(&mut projected),
            Err(e) => warn!(overlay = overlay.name(), error = %e, "overlay skipped"),
        }
    }
    nodes
}

pub(crate) fn invalid(overlay: &'static str, reason: impl Into<String>) -> EngineError {
    EngineError::Overlay {
        overlay,
        reason: reason.into(),
    }
}

pub(crate) fn check_position(overlay: &'static str, position: LatLng) -> Result<()> {
    if position.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(invalid(overlay, format!("non-finite position {position:?}")))
    }
}

pub(crate) fn check_radius(overlay: &'static str, radius: f64) -> Result<()> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(invalid(overlay, format!("radius must be positive, got {radius}")))
    }
}
