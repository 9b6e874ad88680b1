//! Weather has no map-layer projection here; particle rendering is decorative
//! and left to the host page. Only its state replicates.

use tabletop_shared::{MapStatePatch, Weather};

/// Intensity is clamped to `0..=1`.
pub fn set_weather(mut weather: Weather) -> MapStatePatch {
    weather.intensity = if weather.intensity.is_finite() {
        weather.intensity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    MapStatePatch {
        weather: Some(weather),
        ..MapStatePatch::default()
    }
}
