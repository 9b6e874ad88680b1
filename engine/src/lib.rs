//! Map-state replication engine for a DM-driven virtual tabletop.
//!
//! One authority window owns the [`MapStore`] and publishes full snapshots
//! over a [`Transport`]; replica windows render whatever they last received.

pub mod config;
pub mod error;
pub mod fog;
pub mod overlay;
pub mod render;
pub mod session;
pub mod store;
pub mod transport;
pub mod viewport;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use fog::{FogEngine, FogPhase, FogRaster, FogRender, FogView};
pub use render::{
    Control, ControlAnchor, ControlHit, NodeRegistry, NodeShape, NodeTarget, OverlayLayer,
    OverlayNode, RecordingSurface, RenderSurface, SurfaceCall, control_anchors,
};
pub use session::{AuthoritySession, ReplicaSession, ReplicaStore};
pub use store::{MapStore, Role, SubscriptionId};
pub use transport::{ClosedTransport, LocalBus, Transport, decode_frame, encode_frame};
pub use viewport::{InteractionPolicy, Letterbox, ReplicaFrame, ViewportController};
