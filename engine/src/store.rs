use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tabletop_shared::{MapEvent, MapState, MapStatePatch};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::transport::{Transport, decode_frame, encode_frame};

/// Which side of the channel a context is on. Only the authority may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Authority,
    Replica,
}

static AUTHORITY_INSTANCES: AtomicU64 = AtomicU64::new(0);

/// Id stamped on every frame an authority publishes: mount time plus a
/// per-process counter, so a reloaded DM never reuses the previous one.
fn authority_source() -> String {
    let instance = AUTHORITY_INSTANCES.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{instance}", Utc::now().timestamp_micros())
}

pub type Listener = Box<dyn FnMut(&MapState) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Versioned snapshot of the shared map state.
///
/// The authority merges patches and publishes the whole resulting snapshot;
/// a replica only ever replaces its snapshot with one it received.
pub struct MapStore<T> {
    role: Role,
    /// Own instance id on the authority; last seen publisher on a replica.
    source: String,
    state: MapState,
    seq: u64,
    received_any: bool,
    transport: Option<T>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    next_id: u64,
}

impl<T: Transport> MapStore<T> {
    /// Authority store. Without a transport the store still works locally
    /// (single-window mode); nothing is delivered anywhere.
    pub fn authority(transport: Option<T>) -> Self {
        if transport.is_none() {
            warn!("map transport unavailable; running in single-window mode");
        }
        Self::new(Role::Authority, authority_source(), transport)
    }

    pub fn replica() -> Self {
        Self::new(Role::Replica, String::new(), None)
    }

    fn new(role: Role, source: String, transport: Option<T>) -> Self {
        Self {
            role,
            source,
            state: MapState::default(),
            seq: 0,
            received_any: false,
            transport,
            listeners: Vec::new(),
            next_subscription: 0,
            next_id: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role == Role::Authority
    }

    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Publisher instance id; empty on a replica before its first frame.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// False on a replica until its first snapshot arrives.
    pub fn has_snapshot(&self) -> bool {
        self.is_authority() || self.received_any
    }

    /// Merge `patch` and, as the authority, publish the full resulting snapshot.
    pub fn update_state(&mut self, patch: MapStatePatch) -> Result<&MapState> {
        if !self.is_authority() {
            return Err(EngineError::ReadOnlyReplica);
        }
        patch.apply_to(&mut self.state);
        self.seq = self.seq.saturating_add(1);
        self.publish_current();
        self.notify();
        Ok(&self.state)
    }

    /// Re-send the current snapshot so late subscribers get seeded.
    pub fn republish(&mut self) -> Result<()> {
        if !self.is_authority() {
            return Err(EngineError::ReadOnlyReplica);
        }
        self.seq = self.seq.saturating_add(1);
        self.publish_current();
        Ok(())
    }

    fn publish_current(&self) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        let event = MapEvent::MapStateUpdate {
            source: self.source.clone(),
            seq: self.seq,
            timestamp: Utc::now().to_rfc3339(),
            payload: self.state.clone(),
        };
        let frame = match encode_frame(&event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(seq = self.seq, error = %e, "failed to serialize map snapshot");
                return;
            }
        };
        let bytes = frame.len();
        if let Err(e) = transport.publish(frame) {
            warn!(seq = self.seq, error = %e, "failed to publish map snapshot; continuing locally");
        } else {
            debug!(seq = self.seq, bytes, "map snapshot published");
        }
    }

    /// Replica ingest of one raw frame. Returns whether the snapshot was applied.
    pub fn receive_frame(&mut self, frame: &[u8]) -> Result<bool> {
        if self.is_authority() {
            debug!("authority ignoring inbound map frame");
            return Ok(false);
        }
        let event = decode_frame(frame).inspect_err(|e| {
            warn!(error = %e, "dropping undecodable map frame");
        })?;
        Ok(self.apply_event(event))
    }

    fn apply_event(&mut self, event: MapEvent) -> bool {
        let seq = event.seq();
        let source = event.source();
        let restarted = !source.is_empty() && source != self.source;
        if restarted && self.received_any {
            info!(
                previous = %self.source,
                source,
                seq,
                "new map authority detected; resetting sequence"
            );
        } else if self.received_any && seq > 0 && seq <= self.seq {
            if seq == 1 {
                info!(last_seq = self.seq, "map sequence reset detected; accepting snapshot");
            } else {
                debug!(seq, last_seq = self.seq, "dropping stale map snapshot");
                return false;
            }
        }
        if restarted {
            self.source = source.to_string();
        }
        self.state = event.into_payload();
        self.seq = seq;
        self.received_any = true;
        self.notify();
        true
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&MapState) + Send + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        if self.has_snapshot() {
            if let Some((_, listener)) = self.listeners.last_mut() {
                listener(&self.state);
            }
        }
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        for (_, listener) in &mut self.listeners {
            listener(&self.state);
        }
    }

    /// Fresh id such as `effect-3`, unused by any marker, token or effect in
    /// the current snapshot.
    pub fn allocate_id(&mut self, prefix: &str) -> Result<String> {
        if !self.is_authority() {
            return Err(EngineError::ReadOnlyReplica);
        }
        loop {
            self.next_id += 1;
            let id = format!("{prefix}-{}", self.next_id);
            let taken = self.state.markers.iter().any(|m| m.id == id)
                || self.state.tokens.iter().any(|t| t.id == id)
                || self.state.spell_effects.iter().any(|e| e.id == id);
            if !taken {
                return Ok(id);
            }
        }
    }
}
