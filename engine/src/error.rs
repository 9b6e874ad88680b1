//! Error types for the map-state engine.

/// Errors surfaced by the store, transport, fog codec, and overlays.
///
/// None of these are fatal to a session; callers log them and fall back to a
/// safe visual default.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No broadcast channel could be created in this context.
    #[error("transport unavailable: {reason}")]
    TransportUnavailable {
        /// Why the channel could not be opened.
        reason: String,
    },

    /// The channel exists but rejected a frame.
    #[error("transport publish failed: {0}")]
    Publish(String),

    /// A replica tried to originate a state change.
    #[error("replica contexts are read-only")]
    ReadOnlyReplica,

    /// Envelope (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The fog raster could not be encoded to its transferable form.
    #[error("fog mask encode failed: {0}")]
    MaskEncode(String),

    /// An encoded fog raster could not be decoded.
    #[error("fog mask decode failed: {0}")]
    MaskDecode(String),

    /// A decoded mask does not match the active map's pixel size.
    #[error("fog mask is {actual_width}x{actual_height}, expected {width}x{height}")]
    MaskDimensions {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// An overlay could not project the current snapshot.
    #[error("{overlay} overlay failed: {reason}")]
    Overlay {
        /// Overlay name.
        overlay: &'static str,
        /// What went wrong.
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
