use tabletop_shared::mapset::MapDimensions;
use tabletop_shared::{FogOfWar, MaskState};
use tracing::warn;

use super::codec;
use super::raster::FogRaster;

/// What the fog overlay layer should show after applying a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FogRender<'a> {
    /// Fog disabled: no overlay image.
    Hidden,
    /// Swap the overlay image in place.
    Image { raster: &'a FogRaster, opacity: f64 },
    /// Same mask as last time; leave the surface alone.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    enabled: bool,
    dims: (u32, u32),
    variant: u8,
    crc: u32,
}

impl Fingerprint {
    fn of(fog: &FogOfWar, dims: MapDimensions) -> Self {
        let (variant, crc) = match &fog.revealed_mask {
            MaskState::Uninitialized => (0, 0),
            MaskState::FullyFogged => (1, 0),
            MaskState::FullyRevealed => (2, 0),
            MaskState::Partial(mask) => (3, crc32fast::hash(mask.as_str().as_bytes())),
        };
        Self {
            enabled: fog.enabled,
            dims: (dims.width, dims.height),
            variant,
            crc,
        }
    }
}

/// Renders the shared mask for one window.
///
/// Keeps the last successfully decoded raster so an unreadable mask never
/// blanks the overlay, and skips work when the same mask arrives again.
#[derive(Debug, Clone)]
pub struct FogView {
    opacity: f64,
    raster: Option<FogRaster>,
    applied: Option<Fingerprint>,
}

impl FogView {
    pub fn new(opacity: f64) -> Self {
        Self {
            opacity,
            raster: None,
            applied: None,
        }
    }

    pub fn raster(&self) -> Option<&FogRaster> {
        self.raster.as_ref()
    }

    pub fn apply(&mut self, fog: &FogOfWar, dims: MapDimensions) -> FogRender<'_> {
        let fingerprint = Fingerprint::of(fog, dims);
        if self.applied == Some(fingerprint) {
            return FogRender::Unchanged;
        }
        if !fog.enabled {
            self.applied = Some(fingerprint);
            return FogRender::Hidden;
        }

        let next = match &fog.revealed_mask {
            MaskState::Uninitialized | MaskState::FullyFogged => FogRaster::filled(dims),
            MaskState::FullyRevealed => FogRaster::cleared(dims),
            MaskState::Partial(mask) => match codec::decode(mask, dims) {
                Ok(raster) => raster,
                Err(e) => {
                    warn!(error = %e, "fog mask decode failed; keeping last rendered mask");
                    let reusable = self.raster.as_ref().is_some_and(|r| r.dims() == dims);
                    if !reusable {
                        self.raster = Some(FogRaster::filled(dims));
                    }
                    // A republished copy of the same bad mask is not retried.
                    self.applied = Some(fingerprint);
                    return self.image();
                }
            },
        };
        self.raster = Some(next);
        self.applied = Some(fingerprint);
        self.image()
    }

    /// Take over a raster the authority just produced locally, so the commit
    /// of its own stroke does not trigger a decode.
    pub fn adopt(&mut self, fog: &FogOfWar, raster: &FogRaster) {
        self.applied = Some(Fingerprint::of(fog, raster.dims()));
        self.raster = Some(raster.clone());
    }

    fn image(&self) -> FogRender<'_> {
        match self.raster.as_ref() {
            Some(raster) => FogRender::Image {
                raster,
                opacity: self.opacity,
            },
            None => FogRender::Hidden,
        }
    }
}
