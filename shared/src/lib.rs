pub mod events;
pub mod fog;
pub mod geometry;
pub mod map_state;
pub mod mapset;
pub mod patch;

pub use events::*;
pub use fog::{EncodedMask, FogOfWar, FogPatch, MaskState};
pub use geometry::{Bounds, ContainerSize, LatLng, MapPoint};
pub use map_state::*;
pub use mapset::{Encounter, MapCatalog, MapDescriptor, MapDimensions, MapSetData, SessionData};
pub use patch::MapStatePatch;
