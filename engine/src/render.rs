//! Rendering-adapter seam between the engine and a concrete map surface.

use std::collections::HashMap;
use std::f64::consts::FRAC_1_SQRT_2;

use serde::Serialize;
use tabletop_shared::mapset::MapDimensions;
use tabletop_shared::{LatLng, MapPoint, ViewportState};

use crate::fog::FogRaster;
use crate::viewport::{InteractionPolicy, Letterbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayLayer {
    Grid,
    Route,
    Spells,
    Markers,
    Tokens,
}

impl OverlayLayer {
    /// Paint order; higher draws on top and is hit first.
    pub fn z_index(self) -> u8 {
        match self {
            Self::Grid => 0,
            Self::Route => 1,
            Self::Spells => 2,
            Self::Markers => 3,
            Self::Tokens => 4,
        }
    }
}

/// DM-only handle attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Drag,
    Resize,
    Remove,
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum NodeShape {
    Pin {
        position: LatLng,
        label: String,
    },
    Token {
        position: LatLng,
        image_url: String,
        diameter: f64,
        is_player: bool,
        active_turn: bool,
        dead: bool,
    },
    Polyline {
        points: Vec<LatLng>,
        dashed: bool,
    },
    Circle {
        center: LatLng,
        radius: f64,
        color: String,
        pulsing: bool,
    },
    Grid {
        cell_size: f64,
        offset: [f64; 2],
        color: String,
        opacity: f64,
        columns: u32,
        rows: u32,
    },
}

/// One map-layer primitive produced by an overlay projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayNode {
    pub id: String,
    pub layer: OverlayLayer,
    pub shape: NodeShape,
    pub controls: Vec<Control>,
}

/// Snapshot entity a node was projected from, recovered from its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTarget {
    Marker(String),
    Token(String),
    Effect(String),
    Preview,
}

impl NodeTarget {
    pub fn from_node_id(id: &str) -> Option<Self> {
        if id == crate::overlay::spells::PREVIEW_NODE_ID {
            return Some(Self::Preview);
        }
        let (kind, rest) = id.split_once(':')?;
        let rest = rest.to_string();
        match kind {
            "marker" => Some(Self::Marker(rest)),
            "token" => Some(Self::Token(rest)),
            "spell" => Some(Self::Effect(rest)),
            _ => None,
        }
    }
}

/// Where one control handle of a node sits, in map pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlAnchor {
    pub control: Control,
    pub at: MapPoint,
    /// Hit radius in map pixels.
    pub radius: f64,
    /// The node's own body is the handle; nothing extra is drawn.
    pub body: bool,
}

/// Handle layout shared by painting and hit testing. `handle` is the handle
/// radius in map pixels at the current zoom.
pub fn control_anchors(node: &OverlayNode, map_height: f64, handle: f64) -> Vec<ControlAnchor> {
    let anchor = |control, at, radius, body| ControlAnchor {
        control,
        at,
        radius,
        body,
    };
    node.controls
        .iter()
        .filter_map(|control| match (&node.shape, control) {
            (NodeShape::Token { position, diameter, .. }, Control::Drag) => Some(anchor(
                *control,
                MapPoint::from_lat_lng(*position, map_height),
                (diameter / 2.0).max(handle),
                true,
            )),
            (NodeShape::Pin { position, .. }, Control::Remove) => {
                let p = MapPoint::from_lat_lng(*position, map_height);
                Some(anchor(
                    *control,
                    MapPoint::new(p.x + handle * 2.0, p.y - handle * 2.0),
                    handle,
                    false,
                ))
            }
            (NodeShape::Circle { center, radius, .. }, _) => {
                let c = MapPoint::from_lat_lng(*center, map_height);
                let diagonal = radius * FRAC_1_SQRT_2;
                let at = match control {
                    Control::Drag => c,
                    Control::Resize => MapPoint::new(c.x + radius, c.y),
                    Control::Remove => MapPoint::new(c.x + diagonal, c.y - diagonal),
                    Control::Confirm => MapPoint::new(c.x - handle * 1.5, c.y),
                    Control::Cancel => MapPoint::new(c.x + handle * 1.5, c.y),
                };
                Some(anchor(*control, at, handle, false))
            }
            _ => None,
        })
        .collect()
}

/// A DM handle under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlHit {
    pub node_id: String,
    pub target: NodeTarget,
    pub control: Control,
}

/// Minimal drawing surface the sessions render into.
///
/// A browser implementation wraps a canvas map view; tests use
/// [`RecordingSurface`].
pub trait RenderSurface {
    /// Placeholder shown by a replica until its first snapshot.
    fn set_loading(&mut self, loading: bool);
    fn set_base_image(&mut self, image_url: Option<&str>, dims: MapDimensions);
    fn set_view(&mut self, view: &ViewportState, animate: bool);
    fn set_interaction(&mut self, policy: &InteractionPolicy);
    fn set_letterbox(&mut self, letterbox: Option<&Letterbox>);
    /// Local-only erase on the fog canvas, for stroke feedback.
    fn draw_disc(&mut self, center: MapPoint, radius: f64);
    /// Replace the fog image in place; the layer itself is never recreated.
    fn set_overlay_image(&mut self, raster: &FogRaster, opacity: f64);
    fn clear_overlay_image(&mut self);
    /// Create, or replace, the node with `node.id`.
    fn create_overlay_node(&mut self, node: &OverlayNode);
    fn remove_overlay_node(&mut self, id: &str);
}

/// Tracks which nodes are on a surface so re-renders only touch what changed.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, OverlayNode>,
}

impl NodeRegistry {
    pub fn sync<S: RenderSurface + ?Sized>(&mut self, surface: &mut S, next: Vec<OverlayNode>) {
        let mut next_map: HashMap<String, OverlayNode> = HashMap::with_capacity(next.len());
        for node in next {
            next_map.insert(node.id.clone(), node);
        }

        let stale: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| !next_map.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            surface.remove_overlay_node(&id);
            self.nodes.remove(&id);
        }

        for (id, node) in next_map {
            if self.nodes.get(&id) != Some(&node) {
                surface.create_overlay_node(&node);
                self.nodes.insert(id, node);
            }
        }
    }

    /// Topmost control handle within reach of `point`.
    pub fn control_at(&self, point: MapPoint, map_height: f64, handle: f64) -> Option<ControlHit> {
        let mut nodes: Vec<&OverlayNode> = self
            .nodes
            .values()
            .filter(|node| !node.controls.is_empty())
            .collect();
        nodes.sort_by(|a, b| {
            b.layer
                .z_index()
                .cmp(&a.layer.z_index())
                .then_with(|| a.id.cmp(&b.id))
        });
        nodes.into_iter().find_map(|node| {
            let anchors = control_anchors(node, map_height, handle);
            // Small handles win over a body handle on the same node.
            let hit = anchors
                .iter()
                .filter(|a| !a.body)
                .chain(anchors.iter().filter(|a| a.body))
                .find(|a| a.at.distance_to(point) <= a.radius)?;
            Some(ControlHit {
                node_id: node.id.clone(),
                target: NodeTarget::from_node_id(&node.id)?,
                control: hit.control,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Surface call log, for tests and the headless harness.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Loading(bool),
    BaseImage(Option<String>),
    View { view: ViewportState, animate: bool },
    Interaction(InteractionPolicy),
    Letterbox(Option<Letterbox>),
    Disc { center: MapPoint, radius: f64 },
    OverlayImage { opacity: f64 },
    ClearOverlayImage,
    CreateNode(String),
    RemoveNode(String),
}

/// In-memory surface that records calls and keeps the resulting picture.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    pub calls: Vec<SurfaceCall>,
    pub loading: bool,
    pub base_image: Option<String>,
    pub view: Option<ViewportState>,
    pub interaction: Option<InteractionPolicy>,
    pub letterbox: Option<Letterbox>,
    pub fog: Option<(FogRaster, f64)>,
    pub nodes: HashMap<String, OverlayNode>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, matches: impl Fn(&SurfaceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| matches(call)).count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl RenderSurface for RecordingSurface {
    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.calls.push(SurfaceCall::Loading(loading));
    }

    fn set_base_image(&mut self, image_url: Option<&str>, _dims: MapDimensions) {
        self.base_image = image_url.map(str::to_string);
        self.calls.push(SurfaceCall::BaseImage(self.base_image.clone()));
    }

    fn set_view(&mut self, view: &ViewportState, animate: bool) {
        self.view = Some(view.clone());
        self.calls.push(SurfaceCall::View {
            view: view.clone(),
            animate,
        });
    }

    fn set_interaction(&mut self, policy: &InteractionPolicy) {
        self.interaction = Some(*policy);
        self.calls.push(SurfaceCall::Interaction(*policy));
    }

    fn set_letterbox(&mut self, letterbox: Option<&Letterbox>) {
        self.letterbox = letterbox.copied();
        self.calls.push(SurfaceCall::Letterbox(self.letterbox));
    }

    fn draw_disc(&mut self, center: MapPoint, radius: f64) {
        if let Some((raster, _)) = self.fog.as_mut() {
            raster.erase_disc(center, radius);
        }
        self.calls.push(SurfaceCall::Disc { center, radius });
    }

    fn set_overlay_image(&mut self, raster: &FogRaster, opacity: f64) {
        self.fog = Some((raster.clone(), opacity));
        self.calls.push(SurfaceCall::OverlayImage { opacity });
    }

    fn clear_overlay_image(&mut self) {
        self.fog = None;
        self.calls.push(SurfaceCall::ClearOverlayImage);
    }

    fn create_overlay_node(&mut self, node: &OverlayNode) {
        self.nodes.insert(node.id.clone(), node.clone());
        self.calls.push(SurfaceCall::CreateNode(node.id.clone()));
    }

    fn remove_overlay_node(&mut self, id: &str) {
        self.nodes.remove(id);
        self.calls.push(SurfaceCall::RemoveNode(id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use tabletop_shared::MapPoint;

    use super::{
        Control, NodeRegistry, NodeShape, NodeTarget, OverlayLayer, OverlayNode, RecordingSurface,
        SurfaceCall,
    };

    fn pin(id: &str, label: &str) -> OverlayNode {
        OverlayNode {
            id: id.to_string(),
            layer: OverlayLayer::Markers,
            shape: NodeShape::Pin {
                position: [0.0, 0.0],
                label: label.to_string(),
            },
            controls: Vec::new(),
        }
    }

    #[test]
    fn registry_only_touches_changed_nodes() {
        let mut surface = RecordingSurface::new();
        let mut registry = NodeRegistry::default();

        registry.sync(&mut surface, vec![pin("a", "Camp"), pin("b", "Inn")]);
        assert_eq!(surface.nodes.len(), 2);
        surface.clear_calls();

        registry.sync(&mut surface, vec![pin("a", "Camp"), pin("b", "Tavern")]);
        assert_eq!(surface.calls, vec![SurfaceCall::CreateNode("b".to_string())]);
        surface.clear_calls();

        registry.sync(&mut surface, vec![pin("b", "Tavern")]);
        assert_eq!(surface.calls, vec![SurfaceCall::RemoveNode("a".to_string())]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn node_ids_map_back_to_targets() {
        assert_eq!(
            NodeTarget::from_node_id("token:t-1"),
            Some(NodeTarget::Token("t-1".to_string()))
        );
        assert_eq!(
            NodeTarget::from_node_id("spell:effect-2"),
            Some(NodeTarget::Effect("effect-2".to_string()))
        );
        assert_eq!(NodeTarget::from_node_id("spell-preview"), Some(NodeTarget::Preview));
        assert_eq!(NodeTarget::from_node_id("grid"), None);
    }

    #[test]
    fn upper_layer_handles_are_hit_first() {
        let mut surface = RecordingSurface::new();
        let mut registry = NodeRegistry::default();
        let mut marker = pin("marker:m1", "Camp");
        marker.controls = vec![Control::Remove];
        let token = OverlayNode {
            id: "token:t1".to_string(),
            layer: OverlayLayer::Tokens,
            shape: NodeShape::Token {
                position: [20.0, 20.0],
                image_url: String::new(),
                diameter: 60.0,
                is_player: true,
                active_turn: false,
                dead: false,
            },
            controls: vec![Control::Drag],
        };
        registry.sync(&mut surface, vec![marker, token]);

        // The marker's remove handle at (20, 980) lies under the token body.
        let hit = registry
            .control_at(MapPoint::new(20.0, 980.0), 1000.0, 10.0)
            .expect("hit");
        assert_eq!(hit.target, NodeTarget::Token("t1".to_string()));

        let plain = pin("marker:m2", "Inn");
        registry.sync(&mut surface, vec![plain]);
        assert!(registry.control_at(MapPoint::new(0.0, 1000.0), 1000.0, 10.0).is_none());
    }
}
