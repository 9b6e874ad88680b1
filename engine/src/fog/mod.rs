//! Fog-of-war: raster mask, transferable encoding, authority editor, and
//! per-window rendering.

pub mod codec;
pub mod engine;
pub mod raster;
pub mod view;

pub use engine::{FogEngine, FogPhase, StrokeUpdate, Throttle};
pub use raster::FogRaster;
pub use view::{FogRender, FogView};
