//! Screen-space camera for the canvas surface. Map pixels are projected to
//! CSS pixels with a uniform scale of `2^zoom` plus an offset.

use tabletop_engine::InteractionPolicy;
use tabletop_shared::{Bounds, ContainerSize, MapPoint, ViewportState};

const ZOOM_SENSITIVITY: f64 = 0.002;

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
    /// Size of the element the camera projects into.
    pub container: ContainerSize,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
            container: ContainerSize::new(0.0, 0.0),
        }
    }
}

impl Camera {
    pub fn world_to_screen(&self, point: MapPoint) -> (f64, f64) {
        (
            point.x * self.scale + self.offset_x,
            point.y * self.scale + self.offset_y,
        )
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64) -> MapPoint {
        MapPoint::new(
            (sx - self.offset_x) / self.scale,
            (sy - self.offset_y) / self.scale,
        )
    }

    pub fn zoom(&self) -> f64 {
        self.scale.log2()
    }

    /// Centre `view` in the container.
    pub fn look_at(&mut self, view: &ViewportState, map_height: f64) {
        let center = MapPoint::from_lat_lng(view.center, map_height);
        self.scale = 2f64.powf(view.zoom);
        self.offset_x = self.container.width / 2.0 - center.x * self.scale;
        self.offset_y = self.container.height / 2.0 - center.y * self.scale;
    }

    /// Keep the current centre when the container changes size.
    pub fn resize(&mut self, container: ContainerSize) {
        let center = self.screen_to_world(self.container.width / 2.0, self.container.height / 2.0);
        self.container = container;
        self.offset_x = container.width / 2.0 - center.x * self.scale;
        self.offset_y = container.height / 2.0 - center.y * self.scale;
    }

    /// Camera state in the wire form, visible bounds included.
    pub fn view_state(&self, map_height: f64) -> ViewportState {
        let center = self.screen_to_world(self.container.width / 2.0, self.container.height / 2.0);
        let top_left = self.screen_to_world(0.0, 0.0);
        let bottom_right = self.screen_to_world(self.container.width, self.container.height);
        ViewportState {
            center: center.to_lat_lng(map_height),
            zoom: self.zoom(),
            bounds: Some(Bounds {
                south_west: [map_height - bottom_right.y, top_left.x],
                north_east: [map_height - top_left.y, bottom_right.x],
            }),
        }
    }

    /// Wheel zoom toward a screen point, honouring the policy's zoom range.
    /// Returns `false` when the policy forbids it or the zoom did not move.
    pub fn zoom_at(&mut self, delta: f64, sx: f64, sy: f64, policy: &InteractionPolicy) -> bool {
        if !policy.scroll_wheel_zoom {
            return false;
        }
        let zoom = (self.zoom() - delta * ZOOM_SENSITIVITY).clamp(policy.min_zoom, policy.max_zoom);
        let new_scale = 2f64.powf(zoom);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return false;
        }
        let ratio = new_scale / self.scale;
        self.offset_x = sx - (sx - self.offset_x) * ratio;
        self.offset_y = sy - (sy - self.offset_y) * ratio;
        self.scale = new_scale;
        true
    }

    pub fn pan(&mut self, dx: f64, dy: f64, policy: &InteractionPolicy) -> bool {
        if !policy.dragging {
            return false;
        }
        self.offset_x += dx;
        self.offset_y += dy;
        true
    }
}
