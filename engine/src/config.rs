pub const VIEWPORT_DEBOUNCE_MS: f64 = 50.0;
pub const FOG_REFRESH_THROTTLE_MS: f64 = 50.0;
pub const KEEPALIVE_REPUBLISH_MS: f64 = 2000.0;
pub const FIT_PADDING_PX: f64 = 50.0;
pub const ZOOM_SNAP: f64 = 0.25;
pub const FREE_ROAM_MIN_ZOOM: f64 = -5.0;
pub const FREE_ROAM_MAX_ZOOM: f64 = 4.0;
pub const DEFAULT_BUS_CAPACITY: usize = 256;
pub const DM_FOG_OPACITY: f64 = 0.5;
pub const PLAYER_FOG_OPACITY: f64 = 1.0;

/// Tunables passed in by the hosting application.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub viewport_debounce_ms: f64,
    pub fog_refresh_throttle_ms: f64,
    pub keepalive_republish_ms: f64,
    pub fit_padding_px: f64,
    pub zoom_snap: f64,
    pub free_roam_min_zoom: f64,
    pub free_roam_max_zoom: f64,
    pub bus_capacity: usize,
    pub dm_fog_opacity: f64,
    pub player_fog_opacity: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport_debounce_ms: VIEWPORT_DEBOUNCE_MS,
            fog_refresh_throttle_ms: FOG_REFRESH_THROTTLE_MS,
            keepalive_republish_ms: KEEPALIVE_REPUBLISH_MS,
            fit_padding_px: FIT_PADDING_PX,
            zoom_snap: ZOOM_SNAP,
            free_roam_min_zoom: FREE_ROAM_MIN_ZOOM,
            free_roam_max_zoom: FREE_ROAM_MAX_ZOOM,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            dm_fog_opacity: DM_FOG_OPACITY,
            player_fog_opacity: PLAYER_FOG_OPACITY,
        }
    }
}
