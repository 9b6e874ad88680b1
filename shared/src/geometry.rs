use serde::{Deserialize, Serialize};

/// `[lat, lng]` in the planar simple CRS. A map of `width x height` pixels
/// occupies `[[0, 0], [height, width]]`, so `lat` grows upward.
pub type LatLng = [f64; 2];

/// Raster pixel coordinate on a map image, `y` growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn from_lat_lng(pos: LatLng, map_height: f64) -> Self {
        Self {
            x: pos[1],
            y: map_height - pos[0],
        }
    }

    pub fn to_lat_lng(self, map_height: f64) -> LatLng {
        [map_height - self.y, self.x]
    }

    pub fn distance_to(self, other: MapPoint) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Pixel size of a rendering surface (DM wrapper, player wrapper).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Axis-aligned rectangle in lat/lng space, `[south_west, north_east]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    /// Full extent of a map image.
    pub const fn of_map(width: f64, height: f64) -> Self {
        Self {
            south_west: [0.0, 0.0],
            north_east: [height, width],
        }
    }

    pub fn width(&self) -> f64 {
        (self.north_east[1] - self.south_west[1]).abs()
    }

    pub fn height(&self) -> f64 {
        (self.north_east[0] - self.south_west[0]).abs()
    }

    pub fn center(&self) -> LatLng {
        [
            (self.south_west[0] + self.north_east[0]) / 2.0,
            (self.south_west[1] + self.north_east[1]) / 2.0,
        ]
    }

    pub fn contains(&self, pos: LatLng) -> bool {
        let (lat_lo, lat_hi) = ordered(self.south_west[0], self.north_east[0]);
        let (lng_lo, lng_hi) = ordered(self.south_west[1], self.north_east[1]);
        (lat_lo..=lat_hi).contains(&pos[0]) && (lng_lo..=lng_hi).contains(&pos[1])
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::{Bounds, MapPoint};

    #[test]
    fn lat_lng_flips_vertical_axis() {
        let p = MapPoint::from_lat_lng([1500.0, 500.0], 2000.0);
        assert_eq!(p, MapPoint::new(500.0, 500.0));
        assert_eq!(p.to_lat_lng(2000.0), [1500.0, 500.0]);
    }

    #[test]
    fn map_bounds_center_and_extent() {
        let bounds = Bounds::of_map(3000.0, 2000.0);
        assert_eq!(bounds.width(), 3000.0);
        assert_eq!(bounds.height(), 2000.0);
        assert_eq!(bounds.center(), [1000.0, 1500.0]);
        assert!(bounds.contains([0.0, 3000.0]));
        assert!(!bounds.contains([-1.0, 10.0]));
    }
}
