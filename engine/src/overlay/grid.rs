use tabletop_shared::{GridSettings, MapState, MapStatePatch};

use super::{Overlay, ProjectionContext, invalid};
use crate::error::Result;
use crate::render::{NodeShape, OverlayLayer, OverlayNode};

const NAME: &str = "grid";
/// Smallest cell, in map pixels, the grid will draw.
pub const MIN_CELL_SIZE: f64 = 5.0;

pub struct GridOverlay;

impl Overlay for GridOverlay {
    fn name(&self) -> &'static str {
        NAME
    }

    fn project(&self, state: &MapState, ctx: &ProjectionContext) -> Result<Vec<OverlayNode>> {
        let grid = &state.grid_settings;
        if !grid.enabled {
            return Ok(Vec::new());
        }
        validate(grid)?;
        let span = |extent: u32, offset: f64| {
            let covered = (extent as f64 - offset.rem_euclid(grid.cell_size)).max(0.0);
            (covered / grid.cell_size).ceil() as u32
        };
        Ok(vec![OverlayNode {
            id: "grid".to_string(),
            layer: OverlayLayer::Grid,
            shape: NodeShape::Grid {
                cell_size: grid.cell_size,
                offset: grid.offset,
                color: grid.color.clone(),
                opacity: grid.opacity,
                columns: span(ctx.dims.width, grid.offset[0]),
                rows: span(ctx.dims.height, grid.offset[1]),
            },
            controls: Vec::new(),
        }])
    }
}

fn validate(grid: &GridSettings) -> Result<()> {
    if !(grid.cell_size.is_finite() && grid.cell_size >= MIN_CELL_SIZE) {
        return Err(invalid(
            NAME,
            format!("cell size must be at least {MIN_CELL_SIZE}, got {}", grid.cell_size),
        ));
    }
    if !grid.offset.iter().all(|v| v.is_finite()) {
        return Err(invalid(NAME, "non-finite offset"));
    }
    Ok(())
}

/// Replace the grid settings. Opacity is clamped to `0..=1`.
pub fn set_grid(mut settings: GridSettings) -> Result<MapStatePatch> {
    validate(&settings)?;
    settings.opacity = if settings.opacity.is_finite() {
        settings.opacity.clamp(0.0, 1.0)
    } else {
        GridSettings::default().opacity
    };
    Ok(MapStatePatch {
        grid_settings: Some(settings),
        ..MapStatePatch::default()
    })
}
