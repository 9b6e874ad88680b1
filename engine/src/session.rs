//! Authority (DM window) and replica (player window) sessions.
//!
//! A session owns everything one window needs: the store, the camera and fog
//! bookkeeping, and the surface it renders into. Host code forwards input and
//! frames to it and drives [`AuthoritySession::tick`] from a timer.

use std::collections::HashMap;

use tabletop_shared::{
    Combatant, ContainerSize, FogOfWar, GridSettings, LatLng, MapCatalog, MapPoint, MapRef,
    MapState, MapStatePatch, SpellEffectPreview, Token, ViewportState, Weather,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fog::{FogEngine, FogRender, FogView, Throttle};
use crate::overlay::{
    self, Overlay, ProjectionContext, compose_scene, grid, markers, route, spells, tokens, weather,
};
use crate::render::{Control, ControlHit, NodeRegistry, NodeTarget, RenderSurface};
use crate::store::{MapStore, Role};
use crate::transport::{ClosedTransport, Transport};
use crate::viewport::{
    InteractionPolicy, Letterbox, ReplicaFrame, ViewportController, fit_view, replica_frame,
    resolve_interaction,
};

/// Store type used by replicas. It never publishes, so its transport slot is
/// always empty.
pub type ReplicaStore = MapStore<ClosedTransport>;

fn render_fog<S: RenderSurface>(surface: &mut S, render: FogRender<'_>) {
    match render {
        FogRender::Hidden => surface.clear_overlay_image(),
        FogRender::Image { raster, opacity } => surface.set_overlay_image(raster, opacity),
        FogRender::Unchanged => {}
    }
}

pub struct AuthoritySession<T: Transport, S: RenderSurface> {
    config: EngineConfig,
    store: MapStore<T>,
    catalog: MapCatalog,
    viewport: ViewportController,
    fog: FogEngine,
    fog_view: FogView,
    /// Fog of every map visited this session, restored on return.
    fog_memory: HashMap<MapRef, FogOfWar>,
    overlays: Vec<Box<dyn Overlay>>,
    nodes: NodeRegistry,
    interaction: Option<InteractionPolicy>,
    keepalive: Throttle,
    surface: S,
}

impl<T: Transport, S: RenderSurface> AuthoritySession<T, S> {
    /// Build the DM session on the world map and publish the initial snapshot.
    pub fn mount(
        config: EngineConfig,
        transport: Option<T>,
        catalog: MapCatalog,
        surface: S,
        container: ContainerSize,
    ) -> Result<Self> {
        let dims = catalog.dimensions(&MapRef::World);
        let mut session = Self {
            store: MapStore::authority(transport),
            viewport: ViewportController::new(config.clone(), container),
            fog: FogEngine::new(dims, config.fog_refresh_throttle_ms),
            fog_view: FogView::new(config.dm_fog_opacity),
            fog_memory: HashMap::new(),
            overlays: overlay::standard_overlays(),
            nodes: NodeRegistry::default(),
            interaction: None,
            keepalive: Throttle::new(config.keepalive_republish_ms),
            catalog,
            surface,
            config,
        };
        session.switch_map(MapRef::World)?;
        Ok(session)
    }

    pub fn state(&self) -> &MapState {
        self.store.state()
    }

    pub fn store(&self) -> &MapStore<T> {
        &self.store
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn fog(&self) -> &FogEngine {
        &self.fog
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn interaction(&self) -> Option<&InteractionPolicy> {
        self.interaction.as_ref()
    }

    pub fn switch_map(&mut self, map: MapRef) -> Result<()> {
        let previous = self.viewport.map().clone();
        self.fog_memory.insert(previous, self.fog.fog_state());

        let descriptor = self.catalog.resolve(&map);
        if descriptor.is_none() {
            warn!(map = %map, "map missing from catalog; using fallback dimensions");
        }
        let image_url = descriptor.map(|d| d.image_url.clone());
        let dims = self.catalog.dimensions(&map);
        info!(map = %map, width = dims.width, height = dims.height, "switching map");

        let fog = self.fog_memory.get(&map).cloned().unwrap_or_default();
        self.fog.load(&fog, dims);

        let patch = self
            .viewport
            .on_map_changed(map, dims)
            .merge(MapStatePatch::fog(self.fog.fog_state().into()));
        self.surface.set_base_image(image_url.as_deref(), dims);
        if let Some(view) = self.viewport.camera() {
            self.surface.set_view(view, false);
        }
        self.commit(patch)
    }

    /// The DM panned or zoomed. Published once the gesture settles.
    pub fn camera_moved(&mut self, camera: ViewportState, now_ms: f64) {
        self.viewport.on_camera_changed(camera, now_ms);
    }

    pub fn container_resized(&mut self, container: ContainerSize, now_ms: f64) {
        self.viewport.on_container_resized(container, now_ms);
        if self.viewport.map().is_combat() {
            if let Some(view) = self.viewport.camera() {
                self.surface.set_view(view, false);
            }
            self.refresh_interaction();
        }
    }

    /// Timer hook: flushes the debounced viewport and re-sends the snapshot on
    /// the keepalive interval so late replicas get seeded.
    pub fn tick(&mut self, now_ms: f64) -> Result<()> {
        if let Some(patch) = self.viewport.poll(now_ms) {
            self.keepalive.ready(now_ms);
            return self.commit(patch);
        }
        if self.keepalive.ready(now_ms) {
            self.store.republish()?;
        }
        Ok(())
    }

    pub fn set_fog_enabled(&mut self, enabled: bool) -> Result<()> {
        let patch = self.fog.set_enabled(enabled);
        self.commit(patch)
    }

    /// Returns false when fog is disabled and draw mode cannot be entered.
    pub fn set_fog_drawing(&mut self, drawing: bool) -> Result<bool> {
        let patch = self.fog.set_drawing_mode(drawing);
        self.commit_optional(patch)
    }

    pub fn set_brush_size(&mut self, size: f64) -> Result<f64> {
        let patch = self.fog.set_brush_size(size);
        self.commit(patch)?;
        Ok(self.fog.brush_size())
    }

    pub fn reveal_all(&mut self) -> Result<()> {
        let patch = self.fog.reveal_all();
        self.commit(patch)
    }

    pub fn hide_all(&mut self) -> Result<()> {
        let patch = self.fog.hide_all();
        self.commit(patch)
    }

    /// Pointer pressed on the map. Returns whether a fog stroke started.
    pub fn pointer_down(&mut self, position: LatLng) -> bool {
        let point = self.to_map_point(position);
        if !self.fog.pointer_down(point) {
            return false;
        }
        self.surface.draw_disc(point, self.fog.brush_size());
        true
    }

    pub fn pointer_move(&mut self, position: LatLng, now_ms: f64) {
        if !self.fog.stroke_active() {
            return;
        }
        let point = self.to_map_point(position);
        let update = self.fog.pointer_move(point, now_ms);
        let radius = self.fog.brush_size();
        for stamp in &update.stamps {
            self.surface.draw_disc(*stamp, radius);
        }
        if update.refresh {
            self.surface
                .set_overlay_image(self.fog.raster(), self.config.dm_fog_opacity);
        }
    }

    /// Pointer released over the map. Returns whether a stroke was committed.
    pub fn pointer_up(&mut self) -> Result<bool> {
        let Some(patch) = self.fog.pointer_up() else {
            return Ok(false);
        };
        self.store.update_state(patch)?;
        self.fog_view
            .adopt(&self.store.state().fog_of_war, self.fog.raster());
        self.surface
            .set_overlay_image(self.fog.raster(), self.config.dm_fog_opacity);
        self.render();
        Ok(true)
    }

    /// Release anywhere in the window. Finishes a stroke whose pointer left the
    /// map mid-drag; a no-op otherwise.
    pub fn global_pointer_up(&mut self) -> Result<bool> {
        self.pointer_up()
    }

    pub fn add_marker(&mut self, position: LatLng, label: &str) -> Result<String> {
        let id = self.store.allocate_id("marker")?;
        let patch = markers::add_marker(self.store.state(), id.clone(), position, label)?;
        self.commit(patch)?;
        Ok(id)
    }

    pub fn remove_marker(&mut self, id: &str) -> Result<bool> {
        let patch = markers::remove_marker(self.store.state(), id);
        self.commit_optional(patch)
    }

    /// Put tokens and their initiative order on the table; the first combatant
    /// is up.
    pub fn start_encounter(&mut self, tokens: Vec<Token>, order: Vec<Combatant>) -> Result<()> {
        self.commit(MapStatePatch {
            tokens: Some(tokens),
            initiative_order: Some(order),
            current_turn_index: Some(0),
            ..MapStatePatch::default()
        })
    }

    /// Start an encounter from the session data: switch to its combat map,
    /// if it names one, then place its roster. False for an unknown id.
    pub fn begin_encounter(&mut self, id: &str) -> Result<bool> {
        let Some(encounter) = self.catalog.encounter(id).cloned() else {
            warn!(encounter = id, "encounter missing from session data");
            return Ok(false);
        };
        if let Some(map_id) = encounter.combat_map_id {
            self.switch_map(MapRef::Combat(map_id))?;
        }
        info!(
            encounter = id,
            tokens = encounter.tokens.len(),
            combatants = encounter.combatants.len(),
            "starting encounter"
        );
        self.start_encounter(encounter.tokens, encounter.combatants)?;
        Ok(true)
    }

    pub fn move_token(&mut self, id: &str, position: LatLng) -> Result<()> {
        let patch = tokens::move_token(self.store.state(), id, position)?;
        self.commit(patch)
    }

    pub fn advance_turn(&mut self) -> Result<bool> {
        let patch = tokens::advance_turn(self.store.state());
        self.commit_optional(patch)
    }

    pub fn set_combatant_dead(&mut self, combatant_id: &str, dead: bool) -> Result<bool> {
        let patch = tokens::set_combatant_dead(self.store.state(), combatant_id, dead);
        self.commit_optional(patch)
    }

    pub fn add_waypoint(&mut self, point: LatLng) -> Result<()> {
        let patch = route::add_waypoint(self.store.state(), point)?;
        self.commit(patch)
    }

    pub fn clear_route(&mut self) -> Result<()> {
        let patch = route::clear_route(self.store.state());
        self.commit(patch)
    }

    pub fn set_route_visibility(&mut self, visible: bool) -> Result<()> {
        let patch = route::set_route_visibility(self.store.state(), visible);
        self.commit(patch)
    }

    pub fn place_spell_preview(&mut self, preview: SpellEffectPreview) -> Result<()> {
        self.commit(spells::create_preview(preview)?)
    }

    /// Returns the new effect's id, or `None` if nothing was pending.
    pub fn confirm_spell_preview(&mut self) -> Result<Option<String>> {
        if self.store.state().spell_effect_preview.is_none() {
            return Ok(None);
        }
        let id = self.store.allocate_id("effect")?;
        let patch = spells::confirm_preview(self.store.state(), id.clone());
        Ok(self.commit_optional(patch)?.then_some(id))
    }

    pub fn cancel_spell_preview(&mut self) -> Result<bool> {
        let patch = spells::cancel_preview(self.store.state());
        self.commit_optional(patch)
    }

    pub fn move_spell_effect(&mut self, id: &str, position: LatLng) -> Result<()> {
        let patch = spells::move_effect(self.store.state(), id, position)?;
        self.commit(patch)
    }

    pub fn resize_spell_effect(&mut self, id: &str, radius: f64) -> Result<()> {
        let patch = spells::resize_effect(self.store.state(), id, radius)?;
        self.commit(patch)
    }

    pub fn remove_spell_effect(&mut self, id: &str) -> Result<bool> {
        let patch = spells::remove_effect(self.store.state(), id);
        self.commit_optional(patch)
    }

    pub fn set_grid(&mut self, settings: GridSettings) -> Result<()> {
        self.commit(grid::set_grid(settings)?)
    }

    pub fn set_weather(&mut self, value: Weather) -> Result<()> {
        self.commit(weather::set_weather(value))
    }

    /// DM handle under `position`. `handle` is the handle radius in map pixels.
    pub fn control_at(&self, position: LatLng, handle: f64) -> Option<ControlHit> {
        let height = self.viewport.dims().height as f64;
        self.nodes
            .control_at(self.to_map_point(position), height, handle)
    }

    /// Click on a remove, confirm or cancel handle. Drag handles return false.
    pub fn activate_control(&mut self, hit: &ControlHit) -> Result<bool> {
        match (&hit.target, hit.control) {
            (NodeTarget::Marker(id), Control::Remove) => self.remove_marker(id),
            (NodeTarget::Effect(id), Control::Remove) => self.remove_spell_effect(id),
            (NodeTarget::Preview, Control::Confirm) => {
                Ok(self.confirm_spell_preview()?.is_some())
            }
            (NodeTarget::Preview, Control::Cancel) => self.cancel_spell_preview(),
            _ => Ok(false),
        }
    }

    /// Drag a handle to `position`: moves tokens and effects, or sets an
    /// effect's radius to the pointer's distance from its center.
    pub fn drag_control(&mut self, hit: &ControlHit, position: LatLng) -> Result<bool> {
        match (&hit.target, hit.control) {
            (NodeTarget::Token(id), Control::Drag) => {
                self.move_token(id, position)?;
                Ok(true)
            }
            (NodeTarget::Effect(id), Control::Drag) => {
                self.move_spell_effect(id, position)?;
                Ok(true)
            }
            (NodeTarget::Effect(id), Control::Resize) => {
                let Some(center) = self
                    .store
                    .state()
                    .spell_effects
                    .iter()
                    .find(|e| &e.id == id)
                    .map(|e| self.to_map_point(e.position))
                else {
                    return Ok(false);
                };
                let radius = center.distance_to(self.to_map_point(position)).max(1.0);
                self.resize_spell_effect(id, radius)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn to_map_point(&self, position: LatLng) -> MapPoint {
        MapPoint::from_lat_lng(position, self.viewport.dims().height as f64)
    }

    fn commit(&mut self, patch: MapStatePatch) -> Result<()> {
        self.store.update_state(patch)?;
        self.render();
        Ok(())
    }

    fn commit_optional(&mut self, patch: Option<MapStatePatch>) -> Result<bool> {
        match patch {
            Some(patch) => {
                self.commit(patch)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sole writer of the map's interaction flags on the DM side.
    fn refresh_interaction(&mut self) {
        let policy = resolve_interaction(
            Role::Authority,
            self.viewport.map().kind(),
            self.viewport.fitted_zoom(),
            self.fog.is_drawing(),
            &self.config,
        );
        if self.interaction != Some(policy) {
            debug!(
                dragging = policy.dragging,
                min_zoom = policy.min_zoom,
                max_zoom = policy.max_zoom,
                "interaction policy changed"
            );
            self.surface.set_interaction(&policy);
            self.interaction = Some(policy);
        }
    }

    fn render(&mut self) {
        self.refresh_interaction();
        let dims = self.viewport.dims();
        let fog = self.fog_view.apply(&self.store.state().fog_of_war, dims);
        render_fog(&mut self.surface, fog);
        let ctx = ProjectionContext {
            role: Role::Authority,
            dims,
        };
        let nodes = compose_scene(&self.overlays, self.store.state(), &ctx);
        self.nodes.sync(&mut self.surface, nodes);
    }
}

pub struct ReplicaSession<S: RenderSurface> {
    config: EngineConfig,
    store: ReplicaStore,
    catalog: MapCatalog,
    container: ContainerSize,
    fog_view: FogView,
    overlays: Vec<Box<dyn Overlay>>,
    nodes: NodeRegistry,
    loading: bool,
    shown_map: Option<MapRef>,
    /// Last camera and letterbox pushed to the surface.
    shown_frame: Option<(ViewportState, Option<Letterbox>)>,
    interaction: Option<InteractionPolicy>,
    surface: S,
}

impl<S: RenderSurface> ReplicaSession<S> {
    /// Shows the loading placeholder until the first snapshot arrives.
    pub fn new(
        config: EngineConfig,
        catalog: MapCatalog,
        mut surface: S,
        container: ContainerSize,
    ) -> Self {
        surface.set_loading(true);
        Self {
            store: MapStore::replica(),
            fog_view: FogView::new(config.player_fog_opacity),
            overlays: overlay::standard_overlays(),
            nodes: NodeRegistry::default(),
            loading: true,
            shown_map: None,
            shown_frame: None,
            interaction: None,
            config,
            catalog,
            container,
            surface,
        }
    }

    pub fn state(&self) -> &MapState {
        self.store.state()
    }

    pub fn seq(&self) -> u64 {
        self.store.seq()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn interaction(&self) -> Option<&InteractionPolicy> {
        self.interaction.as_ref()
    }

    /// Ingest one frame from the transport; re-renders when it was applied.
    pub fn receive_frame(&mut self, frame: &[u8]) -> Result<bool> {
        let applied = self.store.receive_frame(frame)?;
        if applied {
            self.render();
        }
        Ok(applied)
    }

    pub fn resize(&mut self, container: ContainerSize) {
        self.container = container;
        if self.store.has_snapshot() {
            self.shown_frame = None;
            self.render_view();
        }
    }

    fn render(&mut self) {
        if self.loading {
            self.loading = false;
            self.surface.set_loading(false);
        }
        let map = self.store.state().current_map_id.clone();
        let dims = self.catalog.dimensions(&map);
        if self.shown_map.as_ref() != Some(&map) {
            let image_url = self.catalog.resolve(&map).map(|d| d.image_url.as_str());
            self.surface.set_base_image(image_url, dims);
            debug!(map = %map, "replica switched map");
            self.shown_map = Some(map);
        }

        self.render_view();

        let fog = self.fog_view.apply(&self.store.state().fog_of_war, dims);
        render_fog(&mut self.surface, fog);

        let ctx = ProjectionContext {
            role: Role::Replica,
            dims,
        };
        let nodes = compose_scene(&self.overlays, self.store.state(), &ctx);
        self.nodes.sync(&mut self.surface, nodes);
    }

    fn render_view(&mut self) {
        let state = self.store.state();
        let frame = replica_frame(state, self.container, &self.config).unwrap_or_else(|| {
            // Snapshot without a camera: frame the whole map locally.
            let dims = self.catalog.dimensions(&state.current_map_id);
            let view = fit_view(dims, self.container, &self.config);
            ReplicaFrame {
                policy: resolve_interaction(
                    Role::Replica,
                    state.current_map_id.kind(),
                    view.zoom,
                    false,
                    &self.config,
                ),
                view,
                letterbox: None,
            }
        });

        let shown = self
            .shown_frame
            .as_ref()
            .map(|(view, letterbox)| (view, letterbox.as_ref()));
        if shown != Some((&frame.view, frame.letterbox.as_ref())) {
            self.surface.set_view(&frame.view, false);
            self.surface.set_letterbox(frame.letterbox.as_ref());
            self.shown_frame = Some((frame.view, frame.letterbox));
        }
        if self.interaction != Some(frame.policy) {
            self.surface.set_interaction(&frame.policy);
            self.interaction = Some(frame.policy);
        }
    }
}

#[cfg(test)]
mod tests {
    use tabletop_shared::mapset::{Encounter, MapSetData, SessionData};
    use tabletop_shared::{
        Combatant, ContainerSize, MapCatalog, MapDescriptor, MapRef, SpellEffectPreview, Token,
    };

    use super::{AuthoritySession, ReplicaSession};
    use crate::config::EngineConfig;
    use crate::render::{Control, NodeTarget, RecordingSurface, SurfaceCall};
    use crate::transport::LocalBus;

    fn catalog() -> MapCatalog {
        MapCatalog {
            map_set: MapSetData {
                world: Some(MapDescriptor {
                    id: "world".to_string(),
                    name: "Realm".to_string(),
                    image_url: "/maps/realm.png".to_string(),
                    width: Some(4000),
                    height: Some(3000),
                }),
                ..MapSetData::default()
            },
            session: SessionData {
                combat_maps: vec![MapDescriptor {
                    id: "pit".to_string(),
                    name: "Pit".to_string(),
                    image_url: "/maps/pit.png".to_string(),
                    width: Some(1000),
                    height: Some(1000),
                }],
                encounters: vec![Encounter {
                    id: "goblins".to_string(),
                    name: "Goblin pit".to_string(),
                    combat_map_id: Some("pit".to_string()),
                    tokens: vec![Token {
                        id: "t-gob".to_string(),
                        name: "Goblin".to_string(),
                        position: [500.0, 500.0],
                        image_url: String::new(),
                        is_player: false,
                        size: 40.0,
                    }],
                    combatants: vec![Combatant {
                        id: "c-gob".to_string(),
                        name: "Goblin".to_string(),
                        initiative: 14,
                        is_dead: false,
                        token_id: Some("t-gob".to_string()),
                    }],
                }],
            },
        }
    }

    fn fireball(position: [f64; 2]) -> SpellEffectPreview {
        SpellEffectPreview {
            kind: "fireball".to_string(),
            position,
            radius: 100.0,
            color: "#ff5722".to_string(),
        }
    }

    fn dm(bus: Option<LocalBus>) -> AuthoritySession<LocalBus, RecordingSurface> {
        AuthoritySession::mount(
            EngineConfig::default(),
            bus,
            catalog(),
            RecordingSurface::new(),
            ContainerSize::new(1000.0, 800.0),
        )
        .expect("mount")
    }

    #[test]
    fn mount_publishes_initial_snapshot() {
        let bus = LocalBus::new(8);
        let mut rx = bus.subscribe();
        let session = dm(Some(bus));
        assert!(rx.try_recv().is_ok());
        assert_eq!(session.store().seq(), 1);
        assert_eq!(
            session.surface().base_image.as_deref(),
            Some("/maps/realm.png")
        );
        assert!(session.interaction().is_some_and(|p| p.dragging));
    }

    #[test]
    fn single_window_mode_still_works() {
        let mut session = dm(None);
        session.set_fog_enabled(true).expect("fog");
        assert!(session.state().fog_of_war.enabled);
    }

    #[test]
    fn fog_drawing_locks_and_restores_interaction() {
        let mut session = dm(None);
        session.set_fog_enabled(true).expect("fog");
        assert!(session.set_fog_drawing(true).expect("draw"));
        assert!(session.interaction().is_some_and(|p| !p.accepts_input()));
        session.set_fog_drawing(false).expect("draw off");
        assert!(session.interaction().is_some_and(|p| p.accepts_input()));
    }

    #[test]
    fn drawing_mode_needs_enabled_fog() {
        let mut session = dm(None);
        assert!(!session.set_fog_drawing(true).expect("no-op"));
    }

    #[test]
    fn keepalive_republishes_on_interval() {
        let mut session = dm(None);
        session.tick(0.0).expect("tick");
        let after_first = session.store().seq();
        session.tick(500.0).expect("tick");
        assert_eq!(session.store().seq(), after_first);
        session.tick(2000.0).expect("tick");
        assert_eq!(session.store().seq(), after_first + 1);
    }

    #[test]
    fn fog_is_remembered_per_map() {
        let mut session = dm(None);
        session.set_fog_enabled(true).expect("fog");
        session.reveal_all().expect("reveal");
        session
            .switch_map(MapRef::Combat("crypt".to_string()))
            .expect("combat");
        assert!(!session.state().fog_of_war.enabled);
        session.switch_map(MapRef::World).expect("back");
        assert!(session.state().fog_of_war.enabled);
        assert!(session.fog().raster().revealed_fraction() > 0.99);
    }

    #[test]
    fn encounter_switches_map_and_places_roster() {
        let mut session = dm(None);
        assert!(session.begin_encounter("goblins").expect("begin"));
        assert_eq!(
            session.state().current_map_id,
            MapRef::Combat("pit".to_string())
        );
        assert_eq!(session.state().tokens.len(), 1);
        assert_eq!(session.state().current_turn_index, 0);
        assert!(!session.begin_encounter("dragons").expect("unknown"));
    }

    #[test]
    fn token_body_is_a_drag_handle() {
        let mut session = dm(None);
        session.begin_encounter("goblins").expect("begin");
        let hit = session.control_at([510.0, 505.0], 8.0).expect("token hit");
        assert_eq!(hit.target, NodeTarget::Token("t-gob".to_string()));
        assert_eq!(hit.control, Control::Drag);
        assert!(session.control_at([800.0, 800.0], 8.0).is_none());

        assert!(session.drag_control(&hit, [300.0, 250.0]).expect("drag"));
        assert_eq!(session.state().tokens[0].position, [300.0, 250.0]);
        assert!(!session.activate_control(&hit).expect("not a click handle"));
    }

    #[test]
    fn marker_remove_handle_deletes_the_marker() {
        let mut session = dm(None);
        session.add_marker([1000.0, 500.0], "Camp").expect("marker");
        // Pin at map (500, 2000); its remove handle sits two handle radii up-right.
        let hit = session.control_at([1020.0, 520.0], 10.0).expect("remove handle");
        assert_eq!(hit.control, Control::Remove);
        assert!(session.activate_control(&hit).expect("remove"));
        assert!(session.state().markers.is_empty());
        assert!(session.surface().nodes.is_empty());
    }

    #[test]
    fn preview_handles_confirm_or_cancel() {
        let mut session = dm(None);
        session
            .place_spell_preview(fireball([1500.0, 2000.0]))
            .expect("preview");
        // Confirm sits left of center, cancel right.
        let cancel = session.control_at([1500.0, 2015.0], 10.0).expect("cancel");
        assert_eq!(cancel.control, Control::Cancel);
        assert!(session.activate_control(&cancel).expect("cancel"));
        assert!(session.state().spell_effect_preview.is_none());
        assert!(session.state().spell_effects.is_empty());

        session
            .place_spell_preview(fireball([1500.0, 2000.0]))
            .expect("preview");
        let confirm = session.control_at([1500.0, 1985.0], 10.0).expect("confirm");
        assert_eq!(confirm.target, NodeTarget::Preview);
        assert!(session.activate_control(&confirm).expect("confirm"));
        assert_eq!(session.state().spell_effects.len(), 1);
    }

    #[test]
    fn effect_handles_move_resize_and_remove() {
        let mut session = dm(None);
        session
            .place_spell_preview(fireball([1500.0, 2000.0]))
            .expect("preview");
        session.confirm_spell_preview().expect("confirm");

        // Resize handle on the east edge: map (2100, 1500).
        let resize = session.control_at([1500.0, 2100.0], 10.0).expect("resize");
        assert_eq!(resize.control, Control::Resize);
        assert!(session.drag_control(&resize, [1500.0, 2150.0]).expect("resize"));
        assert_eq!(session.state().spell_effects[0].radius, 150.0);

        let drag = session.control_at([1500.0, 2000.0], 10.0).expect("center");
        assert_eq!(drag.control, Control::Drag);
        assert!(session.drag_control(&drag, [1400.0, 1900.0]).expect("move"));
        assert_eq!(session.state().spell_effects[0].position, [1400.0, 1900.0]);

        let remove = session
            .control_at(
                [1400.0 + 150.0 * std::f64::consts::FRAC_1_SQRT_2, 1900.0 + 150.0 * std::f64::consts::FRAC_1_SQRT_2],
                10.0,
            )
            .expect("remove");
        assert_eq!(remove.control, Control::Remove);
        assert!(session.activate_control(&remove).expect("remove"));
        assert!(session.state().spell_effects.is_empty());
    }

    #[test]
    fn replica_shows_loading_until_first_snapshot() {
        let mut replica = ReplicaSession::new(
            EngineConfig::default(),
            catalog(),
            RecordingSurface::new(),
            ContainerSize::new(1920.0, 1080.0),
        );
        assert!(replica.is_loading());
        assert!(replica.surface().loading);
        assert!(replica.receive_frame(b"not json").is_err());
        assert!(replica.is_loading());

        let bus = LocalBus::new(8);
        let mut rx = bus.subscribe();
        let _dm = dm(Some(bus));
        let frame = rx.try_recv().expect("frame");
        assert!(replica.receive_frame(&frame).expect("apply"));
        assert!(!replica.is_loading());
        assert!(!replica.surface().loading);
        assert!(replica.surface().calls.iter().any(|call| matches!(
            call,
            SurfaceCall::View { animate: false, .. }
        )));
    }
}
