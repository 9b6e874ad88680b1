use tabletop_shared::fog::{MAX_BRUSH_SIZE, MIN_BRUSH_SIZE};
use tabletop_shared::mapset::MapDimensions;
use tabletop_shared::{FogOfWar, FogPatch, MapPoint, MapStatePatch, MaskState};
use tracing::{debug, info, warn};

use super::codec;
use super::raster::FogRaster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FogPhase {
    Disabled,
    Idle,
    Drawing,
}

/// At most one `ready` per interval, over injected timestamps (milliseconds).
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: f64,
    last: Option<f64>,
}

impl Throttle {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last: None,
        }
    }

    pub fn ready(&mut self, now_ms: f64) -> bool {
        match self.last {
            Some(last) if now_ms - last < self.interval_ms => false,
            _ => {
                self.last = Some(now_ms);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Local effect of one pointer-move during a stroke.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrokeUpdate {
    /// Disc centers erased by this move, for immediate local drawing.
    pub stamps: Vec<MapPoint>,
    /// Whether the DM overlay image should be refreshed from the raster now.
    pub refresh: bool,
}

#[derive(Debug, Clone, Copy)]
struct Stroke {
    last: MapPoint,
}

/// Authority-side fog editor.
///
/// Strokes mutate the local raster only; the shared mask changes exactly once
/// per stroke, when the pointer is released.
#[derive(Debug, Clone)]
pub struct FogEngine {
    raster: FogRaster,
    mask: MaskState,
    enabled: bool,
    drawing_mode: bool,
    brush_size: f64,
    stroke: Option<Stroke>,
    refresh: Throttle,
}

impl FogEngine {
    pub fn new(dims: MapDimensions, refresh_interval_ms: f64) -> Self {
        let defaults = FogOfWar::default();
        Self {
            raster: FogRaster::filled(dims),
            mask: defaults.revealed_mask,
            enabled: defaults.enabled,
            drawing_mode: defaults.is_drawing,
            brush_size: defaults.brush_size,
            stroke: None,
            refresh: Throttle::new(refresh_interval_ms),
        }
    }

    /// Adopt a map's fog state, e.g. after switching maps.
    pub fn load(&mut self, fog: &FogOfWar, dims: MapDimensions) {
        self.stroke = None;
        self.enabled = fog.enabled;
        self.drawing_mode = fog.enabled && fog.is_drawing;
        self.brush_size = fog.brush_size;
        self.mask = fog.revealed_mask.clone();
        self.raster = match &fog.revealed_mask {
            MaskState::Uninitialized | MaskState::FullyFogged => FogRaster::filled(dims),
            MaskState::FullyRevealed => FogRaster::cleared(dims),
            MaskState::Partial(encoded) => codec::decode(encoded, dims).unwrap_or_else(|e| {
                warn!(error = %e, "stored fog mask unreadable; starting fully fogged");
                FogRaster::filled(dims)
            }),
        };
    }

    pub fn phase(&self) -> FogPhase {
        match (self.enabled, self.drawing_mode) {
            (false, _) => FogPhase::Disabled,
            (true, false) => FogPhase::Idle,
            (true, true) => FogPhase::Drawing,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Draw mode is on; map pan/zoom must be locked.
    pub fn is_drawing(&self) -> bool {
        self.phase() == FogPhase::Drawing
    }

    pub fn stroke_active(&self) -> bool {
        self.stroke.is_some()
    }

    pub fn brush_size(&self) -> f64 {
        self.brush_size
    }

    pub fn raster(&self) -> &FogRaster {
        &self.raster
    }

    pub fn mask(&self) -> &MaskState {
        &self.mask
    }

    /// Snapshot of the engine's fog, as the store should hold it.
    pub fn fog_state(&self) -> FogOfWar {
        FogOfWar {
            enabled: self.enabled,
            is_drawing: self.drawing_mode,
            brush_size: self.brush_size,
            revealed_mask: self.mask.clone(),
        }
    }

    /// Enabling a map that never had a mask starts it fully fogged.
    pub fn set_enabled(&mut self, enabled: bool) -> MapStatePatch {
        self.stroke = None;
        self.enabled = enabled;
        let mut patch = FogPatch {
            enabled: Some(enabled),
            ..FogPatch::default()
        };
        if enabled {
            if self.mask == MaskState::Uninitialized {
                self.mask = MaskState::FullyFogged;
                self.raster.fill(super::raster::FOGGED);
                patch.revealed_mask = Some(MaskState::FullyFogged);
            }
        } else if self.drawing_mode {
            self.drawing_mode = false;
            patch.is_drawing = Some(false);
        }
        info!(enabled, "fog of war toggled");
        MapStatePatch::fog(patch)
    }

    /// Toggle draw mode. Ignored (returns `None`) while fog is disabled.
    pub fn set_drawing_mode(&mut self, drawing: bool) -> Option<MapStatePatch> {
        if !self.enabled {
            return None;
        }
        self.drawing_mode = drawing;
        if !drawing {
            self.stroke = None;
        }
        Some(MapStatePatch::fog(FogPatch {
            is_drawing: Some(drawing),
            ..FogPatch::default()
        }))
    }

    pub fn set_brush_size(&mut self, size: f64) -> MapStatePatch {
        self.brush_size = if size.is_finite() {
            size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE)
        } else {
            self.brush_size
        };
        MapStatePatch::fog(FogPatch {
            brush_size: Some(self.brush_size),
            ..FogPatch::default()
        })
    }

    /// Start a stroke. Only inside the map and only in draw mode.
    pub fn pointer_down(&mut self, point: MapPoint) -> bool {
        if !self.is_drawing() || !self.contains(point) {
            return false;
        }
        self.raster.erase_disc(point, self.brush_size);
        self.stroke = Some(Stroke { last: point });
        self.refresh.reset();
        true
    }

    pub fn pointer_move(&mut self, point: MapPoint, now_ms: f64) -> StrokeUpdate {
        let Some(stroke) = self.stroke.as_mut() else {
            return StrokeUpdate::default();
        };
        let stamps = FogRaster::segment_stamps(stroke.last, point, self.brush_size);
        stroke.last = point;
        for stamp in &stamps {
            self.raster.erase_disc(*stamp, self.brush_size);
        }
        StrokeUpdate {
            refresh: !stamps.is_empty() && self.refresh.ready(now_ms),
            stamps,
        }
    }

    /// Finish the stroke and produce the single shared commit.
    ///
    /// Safe to call from a global pointer-up handler; without an open stroke it
    /// does nothing.
    pub fn pointer_up(&mut self) -> Option<MapStatePatch> {
        self.stroke.take()?;
        match codec::encode(&self.raster) {
            Ok(encoded) => {
                debug!(
                    bytes = encoded.as_str().len(),
                    revealed = self.raster.revealed_fraction(),
                    "committing fog stroke"
                );
                self.mask = MaskState::Partial(encoded);
                Some(MapStatePatch::fog(FogPatch::mask(self.mask.clone())))
            }
            Err(e) => {
                warn!(error = %e, "fog stroke kept local; mask encode failed");
                None
            }
        }
    }

    pub fn reveal_all(&mut self) -> MapStatePatch {
        self.stroke = None;
        self.raster.fill(super::raster::REVEALED);
        self.mask = MaskState::FullyRevealed;
        MapStatePatch::fog(FogPatch::mask(MaskState::FullyRevealed))
    }

    pub fn hide_all(&mut self) -> MapStatePatch {
        self.stroke = None;
        self.raster.fill(super::raster::FOGGED);
        self.mask = MaskState::FullyFogged;
        MapStatePatch::fog(FogPatch::mask(MaskState::FullyFogged))
    }

    fn contains(&self, point: MapPoint) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x < self.raster.width() as f64
            && point.y < self.raster.height() as f64
    }
}
