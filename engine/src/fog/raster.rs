use tabletop_shared::MapPoint;
use tabletop_shared::mapset::MapDimensions;

use crate::error::{EngineError, Result};

pub const FOGGED: u8 = 255;
pub const REVEALED: u8 = 0;

/// Single-channel fog alpha raster, one byte per map pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FogRaster {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl FogRaster {
    /// Fully fogged raster.
    pub fn filled(dims: MapDimensions) -> Self {
        Self::uniform(dims, FOGGED)
    }

    /// Fully revealed raster.
    pub fn cleared(dims: MapDimensions) -> Self {
        Self::uniform(dims, REVEALED)
    }

    fn uniform(dims: MapDimensions, value: u8) -> Self {
        Self {
            width: dims.width,
            height: dims.height,
            alpha: vec![value; dims.width as usize * dims.height as usize],
        }
    }

    pub fn from_alpha(dims: MapDimensions, alpha: Vec<u8>) -> Result<Self> {
        let expected = dims.width as usize * dims.height as usize;
        if alpha.len() != expected {
            return Err(EngineError::MaskDecode(format!(
                "raster has {} bytes, expected {expected}",
                alpha.len()
            )));
        }
        Ok(Self {
            width: dims.width,
            height: dims.height,
            alpha,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dims(&self) -> MapDimensions {
        MapDimensions {
            width: self.width,
            height: self.height,
        }
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.alpha
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn fill(&mut self, value: u8) {
        self.alpha.fill(value);
    }

    /// Erase every pixel whose center lies within `radius` of `center`.
    /// Parts of the disc outside the raster are clipped. Returns pixels changed.
    pub fn erase_disc(&mut self, center: MapPoint, radius: f64) -> usize {
        if !radius.is_finite() || radius <= 0.0 || !center.x.is_finite() || !center.y.is_finite()
        {
            return 0;
        }
        let Some((x_lo, x_hi)) = clip_span(center.x, radius, self.width) else {
            return 0;
        };
        let Some((y_lo, y_hi)) = clip_span(center.y, radius, self.height) else {
            return 0;
        };

        let r2 = radius * radius;
        let stride = self.width as usize;
        let mut changed = 0;
        for y in y_lo..=y_hi {
            let dy = y as f64 + 0.5 - center.y;
            let row = y as usize * stride;
            for x in x_lo..=x_hi {
                let dx = x as f64 + 0.5 - center.x;
                if dx * dx + dy * dy > r2 {
                    continue;
                }
                let px = &mut self.alpha[row + x as usize];
                if *px != REVEALED {
                    *px = REVEALED;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Points at which discs are stamped to cover the segment `from -> to`
    /// without gaps (spacing is half the radius). Excludes `from` itself.
    pub fn segment_stamps(from: MapPoint, to: MapPoint, radius: f64) -> Vec<MapPoint> {
        let distance = from.distance_to(to);
        let spacing = (radius / 2.0).max(1.0);
        if !distance.is_finite() || distance <= 0.0 {
            return Vec::new();
        }
        let steps = (distance / spacing).ceil() as usize;
        (1..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                MapPoint::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
            })
            .collect()
    }

    /// Share of pixels with no fog left.
    pub fn revealed_fraction(&self) -> f64 {
        if self.alpha.is_empty() {
            return 0.0;
        }
        let revealed = self.alpha.iter().filter(|a| **a == REVEALED).count();
        revealed as f64 / self.alpha.len() as f64
    }
}

fn clip_span(center: f64, radius: f64, extent: u32) -> Option<(u32, u32)> {
    if extent == 0 {
        return None;
    }
    let lo = ((center - radius).floor() as i64).max(0);
    let hi = ((center + radius).ceil() as i64).min(extent as i64 - 1);
    (lo <= hi).then_some((lo as u32, hi as u32))
}
