//! Camera fitting, interaction locks, and DM-to-player framing.

use serde::{Deserialize, Serialize};
use tabletop_shared::mapset::MapDimensions;
use tabletop_shared::{ContainerSize, MapKind, MapRef, MapState, MapStatePatch, ViewportState};
use tracing::debug;

use crate::config::EngineConfig;
use crate::store::Role;

/// Which kinds of user input the map surface accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPolicy {
    pub dragging: bool,
    pub scroll_wheel_zoom: bool,
    pub double_click_zoom: bool,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl InteractionPolicy {
    pub fn free_roam(config: &EngineConfig) -> Self {
        Self {
            dragging: true,
            scroll_wheel_zoom: true,
            double_click_zoom: true,
            min_zoom: config.free_roam_min_zoom,
            max_zoom: config.free_roam_max_zoom,
        }
    }

    /// No input at all, zoom pinned to `zoom`.
    pub fn locked_at(zoom: f64) -> Self {
        Self {
            dragging: false,
            scroll_wheel_zoom: false,
            double_click_zoom: false,
            min_zoom: zoom,
            max_zoom: zoom,
        }
    }

    pub fn accepts_input(&self) -> bool {
        self.dragging || self.scroll_wheel_zoom || self.double_click_zoom
    }
}

/// The one place that decides the map's interaction flags.
///
/// Precedence: replica lock, then fog drawing, then combat framing, then free roam.
/// `fitted_zoom` is the zoom the current map was fitted at (the replica passes
/// the DM's published zoom).
pub fn resolve_interaction(
    role: Role,
    map_kind: MapKind,
    fitted_zoom: f64,
    fog_drawing: bool,
    config: &EngineConfig,
) -> InteractionPolicy {
    if role == Role::Replica {
        return InteractionPolicy::locked_at(fitted_zoom);
    }
    let base = if map_kind == MapKind::Combat {
        InteractionPolicy::locked_at(fitted_zoom)
    } else {
        // Zooming back out to the whole map is always allowed.
        let free = InteractionPolicy::free_roam(config);
        InteractionPolicy {
            min_zoom: free.min_zoom.min(fitted_zoom),
            ..free
        }
    };
    if fog_drawing {
        InteractionPolicy {
            dragging: false,
            scroll_wheel_zoom: false,
            double_click_zoom: false,
            ..base
        }
    } else {
        base
    }
}

/// Camera that shows the whole map inside `container` with padding.
pub fn fit_view(dims: MapDimensions, container: ContainerSize, config: &EngineConfig) -> ViewportState {
    let bounds = dims.bounds();
    ViewportState {
        center: bounds.center(),
        zoom: fit_zoom(dims, container, config),
        bounds: Some(bounds),
    }
}

fn fit_zoom(dims: MapDimensions, container: ContainerSize, config: &EngineConfig) -> f64 {
    if container.is_empty() || dims.width == 0 || dims.height == 0 {
        debug!("degenerate container or map; fitting at zoom 0");
        return 0.0;
    }
    let pad = config.fit_padding_px * 2.0;
    let avail_w = if container.width > pad { container.width - pad } else { container.width };
    let avail_h = if container.height > pad { container.height - pad } else { container.height };
    let scale = (avail_w / dims.width as f64).min(avail_h / dims.height as f64);
    let mut zoom = scale.log2();
    if config.zoom_snap > 0.0 {
        zoom = (zoom / config.zoom_snap).floor() * config.zoom_snap;
    }
    // Only the user's zoom range is clamped; the fit must frame the whole map.
    zoom.min(config.free_roam_max_zoom)
}

/// Placement of the DM-sized surface inside a differently sized replica wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Letterbox {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    /// Unscaled surface size, equal to the DM container.
    pub width: f64,
    pub height: f64,
}

impl Letterbox {
    pub fn compute(dm: ContainerSize, actual: ContainerSize) -> Option<Self> {
        if dm.is_empty() || actual.is_empty() {
            return None;
        }
        let scale = (actual.width / dm.width).min(actual.height / dm.height);
        Some(Self {
            scale,
            offset_x: (actual.width - dm.width * scale) / 2.0,
            offset_y: (actual.height - dm.height * scale) / 2.0,
            width: dm.width,
            height: dm.height,
        })
    }
}

/// Trailing-edge debounce over injected timestamps (milliseconds).
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: f64,
    deadline: Option<f64>,
}

impl Debouncer {
    pub fn new(delay_ms: f64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// Record activity; pushes the deadline out.
    pub fn touch(&mut self, now_ms: f64) {
        self.deadline = Some(now_ms + self.delay_ms);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once after the quiet period elapses.
    pub fn fire(&mut self, now_ms: f64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// Authority-side camera bookkeeping.
#[derive(Debug, Clone)]
pub struct ViewportController {
    config: EngineConfig,
    map: MapRef,
    dims: MapDimensions,
    fitted_zoom: f64,
    camera: Option<ViewportState>,
    container: ContainerSize,
    debounce: Debouncer,
}

impl ViewportController {
    pub fn new(config: EngineConfig, container: ContainerSize) -> Self {
        let debounce = Debouncer::new(config.viewport_debounce_ms);
        Self {
            config,
            map: MapRef::World,
            dims: MapDimensions::default(),
            fitted_zoom: 0.0,
            camera: None,
            container,
            debounce,
        }
    }

    pub fn map(&self) -> &MapRef {
        &self.map
    }

    pub fn dims(&self) -> MapDimensions {
        self.dims
    }

    pub fn fitted_zoom(&self) -> f64 {
        self.fitted_zoom
    }

    pub fn container(&self) -> ContainerSize {
        self.container
    }

    pub fn camera(&self) -> Option<&ViewportState> {
        self.camera.as_ref()
    }

    /// Fit to the new map. The returned patch is published immediately.
    pub fn on_map_changed(&mut self, map: MapRef, dims: MapDimensions) -> MapStatePatch {
        let view = fit_view(dims, self.container, &self.config);
        debug!(map = %map, zoom = view.zoom, "fitted camera to map");
        self.map = map.clone();
        self.dims = dims;
        self.fitted_zoom = view.zoom;
        self.camera = Some(view.clone());
        self.debounce.cancel();
        MapStatePatch {
            current_map_id: Some(map),
            viewport: Some(view),
            dm_container_size: Some(self.container),
            ..MapStatePatch::default()
        }
    }

    /// Camera moved through user input. Ignored while the combat frame is locked.
    pub fn on_camera_changed(&mut self, camera: ViewportState, now_ms: f64) {
        if self.map.kind() == MapKind::Combat {
            return;
        }
        self.camera = Some(camera);
        self.debounce.touch(now_ms);
    }

    /// DM wrapper resized. Combat maps are re-fitted so the frame stays whole.
    pub fn on_container_resized(&mut self, container: ContainerSize, now_ms: f64) {
        self.container = container;
        if self.map.kind() == MapKind::Combat {
            let view = fit_view(self.dims, container, &self.config);
            self.fitted_zoom = view.zoom;
            self.camera = Some(view);
        }
        self.debounce.touch(now_ms);
    }

    /// Debounced viewport republish, once the gesture has settled.
    pub fn poll(&mut self, now_ms: f64) -> Option<MapStatePatch> {
        if !self.debounce.fire(now_ms) {
            return None;
        }
        Some(MapStatePatch {
            viewport: self.camera.clone(),
            dm_container_size: Some(self.container),
            ..MapStatePatch::default()
        })
    }
}

/// What a replica applies after receiving a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaFrame {
    pub view: ViewportState,
    pub policy: InteractionPolicy,
    pub letterbox: Option<Letterbox>,
}

/// Mirror the DM camera: no animation, zoom pinned, input disabled, letterboxed
/// to the DM's container when its size is known.
pub fn replica_frame(
    state: &MapState,
    own_container: ContainerSize,
    config: &EngineConfig,
) -> Option<ReplicaFrame> {
    let view = state.viewport.clone()?;
    let letterbox = state
        .dm_container_size
        .and_then(|dm| Letterbox::compute(dm, own_container));
    Some(ReplicaFrame {
        policy: resolve_interaction(
            Role::Replica,
            state.current_map_id.kind(),
            view.zoom,
            false,
            config,
        ),
        view,
        letterbox,
    })
}

#[cfg(test)]
mod tests {
    use tabletop_shared::mapset::MapDimensions;
    use tabletop_shared::{ContainerSize, MapKind, MapRef, MapState};

    use super::{
        Debouncer, Letterbox, ViewportController, fit_view, replica_frame, resolve_interaction,
    };
    use crate::config::EngineConfig;
    use crate::store::Role;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    fn square(size: u32) -> MapDimensions {
        MapDimensions {
            width: size,
            height: size,
        }
    }

    #[test]
    fn fit_view_snaps_zoom_down_and_centers() {
        let config = EngineConfig::default();
        let view = fit_view(square(2000), ContainerSize::new(1000.0, 800.0), &config);
        // log2(700 / 2000) = -1.51 -> snapped to -1.75
        assert_close(view.zoom, -1.75);
        assert_eq!(view.center, [1000.0, 1000.0]);
    }

    #[test]
    fn huge_map_fits_below_the_free_roam_range() {
        let config = EngineConfig::default();
        let view = fit_view(square(200_000), ContainerSize::new(1000.0, 800.0), &config);
        // log2(700 / 200000) = -8.16 -> snapped to -8.25
        assert_close(view.zoom, -8.25);
        assert!(200_000.0 * view.zoom.exp2() <= 700.0);

        let locked = resolve_interaction(Role::Authority, MapKind::Combat, view.zoom, false, &config);
        assert_close(locked.min_zoom, -8.25);
        let roam = resolve_interaction(Role::Authority, MapKind::World, view.zoom, false, &config);
        assert_close(roam.min_zoom, -8.25);
        assert_close(roam.max_zoom, config.free_roam_max_zoom);
    }

    #[test]
    fn fit_view_on_empty_container_falls_back_to_zoom_zero() {
        let config = EngineConfig::default();
        let view = fit_view(square(2000), ContainerSize::default(), &config);
        assert_close(view.zoom, 0.0);
    }

    #[test]
    fn combat_map_locks_authority_zoom() {
        let config = EngineConfig::default();
        let policy = resolve_interaction(Role::Authority, MapKind::Combat, -1.75, false, &config);
        assert!(!policy.accepts_input());
        assert_close(policy.min_zoom, -1.75);
        assert_close(policy.max_zoom, -1.75);
    }

    #[test]
    fn fog_drawing_overrides_free_roam_and_restores_after() {
        let config = EngineConfig::default();
        let drawing = resolve_interaction(Role::Authority, MapKind::World, 0.0, true, &config);
        assert!(!drawing.accepts_input());
        assert_close(drawing.min_zoom, config.free_roam_min_zoom);

        let idle = resolve_interaction(Role::Authority, MapKind::World, 0.0, false, &config);
        assert!(idle.dragging && idle.scroll_wheel_zoom && idle.double_click_zoom);
    }

    #[test]
    fn replica_is_never_interactive() {
        let config = EngineConfig::default();
        let policy = resolve_interaction(Role::Replica, MapKind::World, 1.0, false, &config);
        assert!(!policy.accepts_input());
    }

    #[test]
    fn letterbox_centers_scaled_surface() {
        let letterbox = Letterbox::compute(
            ContainerSize::new(1000.0, 800.0),
            ContainerSize::new(1920.0, 1080.0),
        )
        .expect("letterbox");
        assert_close(letterbox.scale, 1.35);
        assert_close(letterbox.offset_x, (1920.0 - 1350.0) / 2.0);
        assert_close(letterbox.offset_y, 0.0);
        assert!(Letterbox::compute(ContainerSize::default(), ContainerSize::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn debouncer_fires_once_after_quiet_period() {
        let mut debounce = Debouncer::new(50.0);
        debounce.touch(0.0);
        debounce.touch(30.0);
        assert!(!debounce.fire(60.0));
        assert!(debounce.fire(80.0));
        assert!(!debounce.fire(200.0));
    }

    #[test]
    fn camera_changes_coalesce_into_one_patch() {
        let mut controller =
            ViewportController::new(EngineConfig::default(), ContainerSize::new(1200.0, 900.0));
        controller.on_map_changed(MapRef::World, square(4000));
        let mut camera = controller.camera().cloned().expect("camera");
        for step in 0..10 {
            camera.center[1] += 10.0;
            controller.on_camera_changed(camera.clone(), step as f64 * 10.0);
            assert!(controller.poll(step as f64 * 10.0).is_none());
        }
        let patch = controller.poll(200.0).expect("debounced patch");
        assert_eq!(patch.viewport.expect("viewport").center, camera.center);
        assert!(controller.poll(300.0).is_none());
    }

    #[test]
    fn combat_camera_input_is_ignored() {
        let mut controller =
            ViewportController::new(EngineConfig::default(), ContainerSize::new(1000.0, 800.0));
        controller.on_map_changed(MapRef::Combat("arena".to_string()), square(2000));
        let mut moved = controller.camera().cloned().expect("camera");
        moved.zoom += 1.0;
        controller.on_camera_changed(moved, 0.0);
        assert!(controller.poll(100.0).is_none());
        assert_close(controller.fitted_zoom(), -1.75);
    }

    #[test]
    fn replica_frame_requires_a_viewport() {
        let config = EngineConfig::default();
        assert!(
            replica_frame(&MapState::default(), ContainerSize::new(800.0, 600.0), &config)
                .is_none()
        );
    }
}
