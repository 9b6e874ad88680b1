use serde::{Deserialize, Serialize};

use crate::map_state::MapState;

/// Name of the local broadcast channel shared by the DM and player windows.
pub const MAP_CHANNEL_NAME: &str = "tabletop-map-state";

/// Message envelope on the transport. Only full snapshots exist; there are no diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MapEvent {
    #[serde(rename = "MAP_STATE_UPDATE")]
    MapStateUpdate {
        /// Instance id of the publishing authority; a new id restarts `seq`.
        #[serde(default, skip_serializing_if = "String::is_empty")]
        source: String,
        #[serde(default)]
        seq: u64,
        #[serde(default)]
        timestamp: String,
        payload: MapState,
    },
}

impl MapEvent {
    pub fn seq(&self) -> u64 {
        match self {
            Self::MapStateUpdate { seq, .. } => *seq,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::MapStateUpdate { source, .. } => source,
        }
    }

    pub fn into_payload(self) -> MapState {
        match self {
            Self::MapStateUpdate { payload, .. } => payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MapEvent;
    use crate::map_state::MapState;

    #[test]
    fn envelope_carries_type_tag() {
        let event = MapEvent::MapStateUpdate {
            source: "dm-1".to_string(),
            seq: 7,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            payload: MapState::default(),
        };
        let value = serde_json::to_value(&event).expect("serialize envelope");
        assert_eq!(value["type"], "MAP_STATE_UPDATE");
        assert_eq!(value["seq"], 7);
        assert_eq!(value["source"], "dm-1");
        assert_eq!(value["payload"]["currentMapId"], "world");
    }

    #[test]
    fn legacy_envelope_without_seq_parses() {
        let event: MapEvent =
            serde_json::from_str(r#"{"type":"MAP_STATE_UPDATE","payload":{}}"#)
                .expect("legacy envelope");
        assert_eq!(event.seq(), 0);
        assert_eq!(event.source(), "");
        assert_eq!(event.into_payload(), MapState::default());
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        assert!(serde_json::from_str::<MapEvent>(r#"{"type":"PING","payload":{}}"#).is_err());
    }
}
