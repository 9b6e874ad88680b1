use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gloo_net::http::Request;
use gloo_storage::Storage;
use gloo_timers::callback::Interval;
use leptos::either::Either;
use leptos::html;
use leptos::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tabletop_engine::{AuthoritySession, Control, ControlHit, EngineConfig, ReplicaSession};
use tabletop_shared::fog::DEFAULT_BRUSH_SIZE;
use tabletop_shared::{
    ContainerSize, LatLng, MapCatalog, MapRef, MapSetData, SessionData, SpellEffectPreview,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{MouseEvent, PointerEvent, WheelEvent};

use crate::channel::{self, ChannelTransport};
use crate::surface::CanvasSurface;

const MAPSET_URL: &str = "/data/mapset.json";
const SESSION_URL: &str = "/data/session.json";
const PREFERENCES_KEY: &str = "tabletop_dm_preferences";
const TICK_MS: u32 = 16;
/// Wheel delta applied by a double click.
const DOUBLE_CLICK_ZOOM_DELTA: f64 = -500.0;
/// Minimum gap between published positions while a handle is dragged.
const HANDLE_DRAG_PUBLISH_MS: f64 = 50.0;

/// `(kind, color, radius in map pixels)` offered by the spell picker.
const SPELL_PRESETS: &[(&str, &str, f64)] = &[
    ("fireball", "#ff5722", 120.0),
    ("ice-storm", "#4fc3f7", 160.0),
    ("darkness", "#37474f", 100.0),
    ("healing-circle", "#66bb6a", 80.0),
];

type Dm = AuthoritySession<ChannelTransport, CanvasSurface>;
type Player = ReplicaSession<CanvasSurface>;
type DmSlot = Rc<RefCell<Option<Dm>>>;
type PlayerSlot = Rc<RefCell<Option<Player>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    Dm,
    Player,
}

/// `?view=player` opens the read-only player window; anything else is the DM.
pub fn role_from_query(search: &str) -> WindowRole {
    let is_player = search
        .trim_start_matches('?')
        .split('&')
        .any(|pair| pair == "view=player");
    if is_player {
        WindowRole::Player
    } else {
        WindowRole::Dm
    }
}

fn window_role() -> WindowRole {
    web_sys::window()
        .and_then(|w| w.location().search().ok())
        .map(|search| role_from_query(&search))
        .unwrap_or(WindowRole::Dm)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct DmPreferences {
    brush_size: f64,
}

impl Default for DmPreferences {
    fn default() -> Self {
        Self {
            brush_size: DEFAULT_BRUSH_SIZE,
        }
    }
}

impl DmPreferences {
    fn load() -> Self {
        gloo_storage::LocalStorage::get(PREFERENCES_KEY).unwrap_or_default()
    }

    fn save(&self) {
        gloo_storage::LocalStorage::set(PREFERENCES_KEY, self).ok();
    }
}

fn warn(message: &str) {
    web_sys::console::warn_1(&message.into());
}

async fn fetch_json<T: DeserializeOwned>(url: &str) -> Result<T, String> {
    let resp = Request::get(url)
        .send()
        .await
        .map_err(|e| format!("fetch {url} failed: {e}"))?;
    if !resp.ok() {
        return Err(format!("fetch {url} returned HTTP {}", resp.status()));
    }
    resp.json::<T>()
        .await
        .map_err(|e| format!("parse {url} failed: {e}"))
}

async fn load_catalog() -> MapCatalog {
    let map_set = fetch_json::<MapSetData>(MAPSET_URL).await.unwrap_or_else(|e| {
        warn(&e);
        MapSetData::default()
    });
    let session = fetch_json::<SessionData>(SESSION_URL)
        .await
        .unwrap_or_else(|e| {
            warn(&e);
            SessionData::default()
        });
    MapCatalog::new(map_set, session)
}

/// `(wire id, label)` for every map the DM can switch to.
pub fn map_choices(catalog: &MapCatalog) -> Vec<(String, String)> {
    let label = |name: &str, fallback: &str| {
        if name.is_empty() {
            fallback.to_string()
        } else {
            name.to_string()
        }
    };
    let mut choices = Vec::new();
    if let Some(world) = &catalog.map_set.world {
        choices.push((MapRef::World.to_string(), label(&world.name, "World")));
    }
    if let Some(city) = &catalog.map_set.city {
        choices.push((MapRef::City.to_string(), label(&city.name, "City")));
    }
    for map in catalog
        .session
        .combat_maps
        .iter()
        .chain(catalog.map_set.dungeons.iter())
    {
        choices.push((
            MapRef::Combat(map.id.clone()).to_string(),
            label(&map.name, &map.id),
        ));
    }
    choices
}

/// `(id, label)` for every encounter in the session data.
pub fn encounter_choices(catalog: &MapCatalog) -> Vec<(String, String)> {
    catalog
        .session
        .encounters
        .iter()
        .map(|e| {
            let label = if e.name.is_empty() { &e.id } else { &e.name };
            (e.id.clone(), label.clone())
        })
        .collect()
}

/// Preview for the preset at `index`, centered on `position`.
pub fn spell_preview(index: usize, position: LatLng) -> Option<SpellEffectPreview> {
    let (kind, color, radius) = SPELL_PRESETS.get(index)?;
    Some(SpellEffectPreview {
        kind: (*kind).to_string(),
        position,
        radius: *radius,
        color: (*color).to_string(),
    })
}

/// What a click on the map does in the DM window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClickMode {
    Select,
    Marker,
    Waypoint,
    Spell,
}

/// A drag or resize handle held by the pointer.
struct HeldHandle {
    hit: ControlHit,
    published_at: f64,
}

fn measure(el: &web_sys::HtmlElement) -> ContainerSize {
    ContainerSize::new(el.client_width() as f64, el.client_height() as f64)
}

fn device_pixel_ratio() -> f64 {
    web_sys::window().map_or(1.0, |w| w.device_pixel_ratio())
}

struct WindowListener {
    window: web_sys::Window,
    event: &'static str,
    handler: Closure<dyn FnMut(web_sys::Event)>,
}

impl Drop for WindowListener {
    fn drop(&mut self) {
        self.window
            .remove_event_listener_with_callback(self.event, self.handler.as_ref().unchecked_ref())
            .ok();
    }
}

thread_local! {
    static TICKER: RefCell<Option<Interval>> = const { RefCell::new(None) };
    static WINDOW_LISTENERS: RefCell<Vec<WindowListener>> = const { RefCell::new(Vec::new()) };
}

fn start_ticker(mut on_tick: impl FnMut(f64) + 'static) {
    let interval = Interval::new(TICK_MS, move || on_tick(js_sys::Date::now()));
    TICKER.with(|slot| {
        // Dropping the previous interval cancels it.
        *slot.borrow_mut() = Some(interval);
    });
}

fn listen_window(event: &'static str, handler: impl FnMut(web_sys::Event) + 'static) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let handler = Closure::<dyn FnMut(web_sys::Event)>::new(handler);
    if window
        .add_event_listener_with_callback(event, handler.as_ref().unchecked_ref())
        .is_ok()
    {
        WINDOW_LISTENERS.with(|slot| {
            slot.borrow_mut().push(WindowListener {
                window,
                event,
                handler,
            });
        });
    }
}

fn stop_window_bindings() {
    TICKER.with(|slot| slot.borrow_mut().take());
    WINDOW_LISTENERS.with(|slot| slot.borrow_mut().clear());
    channel::disconnect();
}

#[component]
pub fn App() -> impl IntoView {
    let role = window_role();
    let catalog: RwSignal<Option<MapCatalog>> = RwSignal::new(None);

    Effect::new(move || {
        wasm_bindgen_futures::spawn_local(async move {
            catalog.set(Some(load_catalog().await));
        });
    });

    let window = match role {
        WindowRole::Dm => Either::Left(view! { <DmWindow catalog=catalog /> }),
        WindowRole::Player => Either::Right(view! { <PlayerWindow catalog=catalog /> }),
    };

    view! {
        <div style="position: fixed; inset: 0; background: #101114; color: #e8e8e8; font-family: sans-serif;">
            {window}
            {move || {
                catalog
                    .with(|c| c.is_none())
                    .then(|| view! {
                        <div style="position: absolute; top: 24px; left: 24px;">"Loading maps..."</div>
                    })
            }}
        </div>
    }
}

/// Toolbar state mirrored from the DM session after every command.
#[derive(Clone, Copy)]
struct DmControls {
    fog_enabled: RwSignal<bool>,
    drawing: RwSignal<bool>,
    route_visible: RwSignal<bool>,
    current_map: RwSignal<String>,
}

impl DmControls {
    fn sync(&self, session: &Dm) {
        let state = session.state();
        self.fog_enabled.set(state.fog_of_war.enabled);
        self.drawing.set(session.fog().is_drawing());
        self.route_visible.set(state.route.visible_to_players);
        self.current_map.set(state.current_map_id.to_string());
    }
}

fn run(
    dm: &DmSlot,
    controls: DmControls,
    action: &str,
    f: impl FnOnce(&mut Dm) -> tabletop_engine::Result<()>,
) {
    let mut slot = dm.borrow_mut();
    let Some(session) = slot.as_mut() else {
        return;
    };
    if let Err(e) = f(session) {
        warn(&format!("{action} failed: {e}"));
    }
    controls.sync(session);
}

fn on_click<T: Fn(&mut Dm) -> tabletop_engine::Result<()> + 'static>(
    dm: &DmSlot,
    controls: DmControls,
    action: &'static str,
    f: T,
) -> impl Fn(MouseEvent) + 'static + use<T> {
    let dm = dm.clone();
    move |_| run(&dm, controls, action, &f)
}

/// Publish the DM's current camera; the session debounces it.
fn publish_camera(session: &mut Dm, now_ms: f64) {
    let view = session
        .surface()
        .camera()
        .view_state(session.surface().map_height());
    session.camera_moved(view, now_ms);
}

#[component]
fn DmWindow(catalog: RwSignal<Option<MapCatalog>>) -> impl IntoView {
    let wrapper_ref = NodeRef::<html::Div>::new();
    let canvas_ref = NodeRef::<html::Canvas>::new();
    let dm: DmSlot = Rc::new(RefCell::new(None));
    let drag: Rc<Cell<Option<(f64, f64)>>> = Rc::new(Cell::new(None));
    let held: Rc<RefCell<Option<HeldHandle>>> = Rc::new(RefCell::new(None));

    let prefs = DmPreferences::load();
    let brush = RwSignal::new(prefs.brush_size);
    let mode = RwSignal::new(ClickMode::Select);
    let spell_preset = RwSignal::new(0usize);
    let encounter_pick = RwSignal::new(String::new());
    let controls = DmControls {
        fog_enabled: RwSignal::new(false),
        drawing: RwSignal::new(false),
        route_visible: RwSignal::new(false),
        current_map: RwSignal::new(MapRef::World.to_string()),
    };

    Effect::new({
        let dm = dm.clone();
        let held = held.clone();
        move || {
            let (Some(wrapper), Some(canvas), Some(catalog)) =
                (wrapper_ref.get(), canvas_ref.get(), catalog.get())
            else {
                return;
            };
            if dm.borrow().is_some() {
                return;
            }
            let container = measure(&wrapper);
            let surface = match CanvasSurface::new(canvas, container, device_pixel_ratio()) {
                Ok(surface) => surface,
                Err(e) => {
                    warn(&format!("map canvas unavailable: {e}"));
                    return;
                }
            };
            let transport = ChannelTransport::open();
            if transport.is_none() {
                warn("player windows will not receive updates from this tab");
            }
            let mut session = match AuthoritySession::mount(
                EngineConfig::default(),
                transport,
                catalog,
                surface,
                container,
            ) {
                Ok(session) => session,
                Err(e) => {
                    warn(&format!("mounting the DM session failed: {e}"));
                    return;
                }
            };
            if let Err(e) = session.set_brush_size(brush.get_untracked()) {
                warn(&format!("restoring brush size failed: {e}"));
            }
            controls.sync(&session);
            *dm.borrow_mut() = Some(session);

            let ticking = dm.clone();
            start_ticker(move |now| {
                if let Some(session) = ticking.borrow_mut().as_mut() {
                    if let Err(e) = session.tick(now) {
                        warn(&format!("tick failed: {e}"));
                    }
                    session.surface_mut().paint();
                }
            });

            let released = dm.clone();
            let released_handle = held.clone();
            listen_window("pointerup", move |_| {
                released_handle.borrow_mut().take();
                if let Some(session) = released.borrow_mut().as_mut()
                    && let Err(e) = session.global_pointer_up()
                {
                    warn(&format!("finishing stroke failed: {e}"));
                }
            });

            let resized = dm.clone();
            listen_window("resize", move |_| {
                let Some(wrapper) = wrapper_ref.get_untracked() else {
                    return;
                };
                let size = measure(&wrapper);
                let now = js_sys::Date::now();
                if let Some(session) = resized.borrow_mut().as_mut() {
                    session.surface_mut().resize(size);
                    session.container_resized(size, now);
                    if !session.state().current_map_id.is_combat() {
                        publish_camera(session, now);
                    }
                }
            });
        }
    });
    on_cleanup(stop_window_bindings);

    let pointer_position = |session: &Dm, e: &PointerEvent| -> LatLng {
        session
            .surface()
            .to_lat_lng(e.offset_x() as f64, e.offset_y() as f64)
    };

    let on_pointer_down = {
        let dm = dm.clone();
        let drag = drag.clone();
        let held = held.clone();
        move |e: PointerEvent| {
            let mut slot = dm.borrow_mut();
            let Some(session) = slot.as_mut() else {
                return;
            };
            let position = pointer_position(session, &e);
            let placed = match mode.get_untracked() {
                ClickMode::Select => None,
                ClickMode::Marker => {
                    mode.set(ClickMode::Select);
                    Some(("placing marker", session.add_marker(position, "").map(|_| ())))
                }
                ClickMode::Waypoint => Some(("adding waypoint", session.add_waypoint(position))),
                ClickMode::Spell => {
                    mode.set(ClickMode::Select);
                    spell_preview(spell_preset.get_untracked(), position)
                        .map(|preview| ("placing spell", session.place_spell_preview(preview)))
                }
            };
            if let Some((action, result)) = placed {
                if let Err(e) = result {
                    warn(&format!("{action} failed: {e}"));
                }
                controls.sync(session);
                return;
            }

            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.set_pointer_capture(e.pointer_id()).ok();
            }
            if session.pointer_down(position) {
                return;
            }
            let handle = session.surface().handle_radius();
            if let Some(hit) = session.control_at(position, handle) {
                if matches!(hit.control, Control::Drag | Control::Resize) {
                    *held.borrow_mut() = Some(HeldHandle {
                        hit,
                        published_at: 0.0,
                    });
                } else if let Err(e) = session.activate_control(&hit) {
                    warn(&format!("{:?} on {} failed: {e}", hit.control, hit.node_id));
                }
                return;
            }
            drag.set(Some((e.client_x() as f64, e.client_y() as f64)));
        }
    };

    let on_pointer_move = {
        let dm = dm.clone();
        let drag = drag.clone();
        let held = held.clone();
        move |e: PointerEvent| {
            let mut slot = dm.borrow_mut();
            let Some(session) = slot.as_mut() else {
                return;
            };
            let now = js_sys::Date::now();
            if session.fog().stroke_active() {
                let position = pointer_position(session, &e);
                session.pointer_move(position, now);
                return;
            }
            if let Some(handle) = held.borrow_mut().as_mut() {
                if now - handle.published_at >= HANDLE_DRAG_PUBLISH_MS {
                    handle.published_at = now;
                    let position = pointer_position(session, &e);
                    if let Err(e) = session.drag_control(&handle.hit, position) {
                        warn(&format!("dragging {} failed: {e}", handle.hit.node_id));
                    }
                }
                return;
            }
            let Some((last_x, last_y)) = drag.get() else {
                return;
            };
            let (x, y) = (e.client_x() as f64, e.client_y() as f64);
            drag.set(Some((x, y)));
            let Some(policy) = session.interaction().copied() else {
                return;
            };
            if session
                .surface_mut()
                .camera_mut()
                .pan(x - last_x, y - last_y, &policy)
            {
                publish_camera(session, now);
            }
        }
    };

    let on_pointer_up = {
        let dm = dm.clone();
        let drag = drag.clone();
        let held = held.clone();
        move |e: PointerEvent| {
            drag.set(None);
            let mut slot = dm.borrow_mut();
            let Some(session) = slot.as_mut() else {
                return;
            };
            if let Some(handle) = held.borrow_mut().take() {
                let position = pointer_position(session, &e);
                if let Err(e) = session.drag_control(&handle.hit, position) {
                    warn(&format!("dropping {} failed: {e}", handle.hit.node_id));
                }
                return;
            }
            if let Err(e) = session.pointer_up() {
                warn(&format!("committing stroke failed: {e}"));
            }
        }
    };

    let zoom = {
        let dm = dm.clone();
        move |delta: f64, x: f64, y: f64| {
            let mut slot = dm.borrow_mut();
            let Some(session) = slot.as_mut() else {
                return;
            };
            let Some(policy) = session.interaction().copied() else {
                return;
            };
            if session.surface_mut().camera_mut().zoom_at(delta, x, y, &policy) {
                publish_camera(session, js_sys::Date::now());
            }
        }
    };

    let on_wheel = {
        let zoom = zoom.clone();
        move |e: WheelEvent| {
            e.prevent_default();
            zoom(e.delta_y(), e.offset_x() as f64, e.offset_y() as f64);
        }
    };

    let on_double_click = {
        let dm = dm.clone();
        move |e: MouseEvent| {
            let allowed = dm
                .borrow()
                .as_ref()
                .and_then(|s| s.interaction().copied())
                .is_some_and(|policy| policy.double_click_zoom);
            if allowed {
                zoom(DOUBLE_CLICK_ZOOM_DELTA, e.offset_x() as f64, e.offset_y() as f64);
            }
        }
    };

    let on_map_change = {
        let dm = dm.clone();
        move |e: web_sys::Event| {
            let value = event_target_value(&e);
            match value.parse::<MapRef>() {
                Ok(map) => run(&dm, controls, "switching map", |s| s.switch_map(map)),
                Err(e) => warn(&format!("unknown map {value}: {e}")),
            }
        }
    };

    let on_encounter_change = {
        let dm = dm.clone();
        move |e: web_sys::Event| {
            let id = event_target_value(&e);
            // Back to the placeholder so the same encounter can be picked again.
            encounter_pick.set(String::new());
            if id.is_empty() {
                return;
            }
            run(&dm, controls, "starting encounter", |s| {
                if !s.begin_encounter(&id)? {
                    warn(&format!("unknown encounter {id}"));
                }
                Ok(())
            });
        }
    };

    let on_spell_change = move |e: web_sys::Event| {
        if let Ok(index) = event_target_value(&e).parse::<usize>() {
            spell_preset.set(index);
        }
    };

    let toggle_mode = move |target: ClickMode| {
        move |_: MouseEvent| {
            mode.update(|m| *m = if *m == target { ClickMode::Select } else { target });
        }
    };

    let on_brush_input = {
        let dm = dm.clone();
        move |e: web_sys::Event| {
            let Ok(size) = event_target_value(&e).parse::<f64>() else {
                return;
            };
            run(&dm, controls, "setting brush size", |s| {
                let applied = s.set_brush_size(size)?;
                brush.set(applied);
                DmPreferences {
                    brush_size: applied,
                }
                .save();
                Ok(())
            });
        }
    };

    let toggle_fog = on_click(&dm, controls, "toggling fog", |s| {
        let enabled = !s.state().fog_of_war.enabled;
        s.set_fog_enabled(enabled)
    });
    let toggle_drawing = on_click(&dm, controls, "toggling fog drawing", |s| {
        let drawing = !s.fog().is_drawing();
        if !s.set_fog_drawing(drawing)? {
            warn("enable fog before drawing");
        }
        Ok(())
    });
    let reveal_all = on_click(&dm, controls, "revealing map", |s| s.reveal_all());
    let hide_all = on_click(&dm, controls, "hiding map", |s| s.hide_all());
    let next_turn = on_click(&dm, controls, "advancing turn", |s| {
        s.advance_turn().map(|_| ())
    });
    let toggle_route = on_click(&dm, controls, "toggling route", |s| {
        let visible = !s.state().route.visible_to_players;
        s.set_route_visibility(visible)
    });
    let clear_route = on_click(&dm, controls, "clearing route", |s| s.clear_route());
    let open_player_window = |_: MouseEvent| {
        if let Some(window) = web_sys::window() {
            window
                .open_with_url_and_target("?view=player", "_blank")
                .ok();
        }
    };

    let button_style = "background: #262a33; color: inherit; border: 1px solid #3a404d; border-radius: 4px; padding: 4px 10px; cursor: pointer;";

    view! {
        <div style="display: flex; flex-direction: column; width: 100%; height: 100%;">
            <div style="display: flex; gap: 8px; align-items: center; padding: 8px; background: #181a20; flex-wrap: wrap;">
                <select style=button_style on:change=on_map_change prop:value=move || controls.current_map.get()>
                    {move || {
                        catalog
                            .with(|c| c.as_ref().map(map_choices).unwrap_or_default())
                            .into_iter()
                            .map(|(value, label)| view! { <option value=value>{label}</option> })
                            .collect_view()
                    }}
                </select>
                <button style=button_style on:click=toggle_fog>
                    {move || if controls.fog_enabled.get() { "Fog: on" } else { "Fog: off" }}
                </button>
                <button
                    style=button_style
                    on:click=toggle_drawing
                    disabled=move || !controls.fog_enabled.get()
                >
                    {move || if controls.drawing.get() { "Drawing" } else { "Draw fog" }}
                </button>
                <label style="display: flex; gap: 4px; align-items: center;">
                    "Brush"
                    <input
                        type="range"
                        min="5"
                        max="300"
                        prop:value=move || brush.get().to_string()
                        on:input=on_brush_input
                    />
                </label>
                <button style=button_style on:click=reveal_all>"Reveal all"</button>
                <button style=button_style on:click=hide_all>"Hide all"</button>
                <button style=button_style on:click=toggle_mode(ClickMode::Marker)>
                    {move || if mode.get() == ClickMode::Marker { "Click map..." } else { "Add marker" }}
                </button>
                <select style=button_style on:change=on_spell_change prop:value=move || spell_preset.get().to_string()>
                    {SPELL_PRESETS
                        .iter()
                        .enumerate()
                        .map(|(i, (kind, _, _))| view! { <option value=i.to_string()>{*kind}</option> })
                        .collect_view()}
                </select>
                <button style=button_style on:click=toggle_mode(ClickMode::Spell)>
                    {move || if mode.get() == ClickMode::Spell { "Click map..." } else { "Place spell" }}
                </button>
                <button style=button_style on:click=toggle_mode(ClickMode::Waypoint)>
                    {move || if mode.get() == ClickMode::Waypoint { "Adding waypoints" } else { "Add waypoints" }}
                </button>
                <button style=button_style on:click=toggle_route>
                    {move || if controls.route_visible.get() { "Route: shown" } else { "Route: hidden" }}
                </button>
                <button style=button_style on:click=clear_route>"Clear route"</button>
                <select style=button_style on:change=on_encounter_change prop:value=move || encounter_pick.get()>
                    <option value="">"Start encounter..."</option>
                    {move || {
                        catalog
                            .with(|c| c.as_ref().map(encounter_choices).unwrap_or_default())
                            .into_iter()
                            .map(|(value, label)| view! { <option value=value>{label}</option> })
                            .collect_view()
                    }}
                </select>
                <button style=button_style on:click=next_turn>"Next turn"</button>
                <button style=button_style on:click=open_player_window>"Player window"</button>
            </div>
            <div node_ref=wrapper_ref style="position: relative; flex: 1; overflow: hidden;">
                <canvas
                    node_ref=canvas_ref
                    style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none;"
                    on:pointerdown=on_pointer_down
                    on:pointermove=on_pointer_move
                    on:pointerup=on_pointer_up
                    on:wheel=on_wheel
                    on:dblclick=on_double_click
                />
            </div>
        </div>
    }
}

#[component]
fn PlayerWindow(catalog: RwSignal<Option<MapCatalog>>) -> impl IntoView {
    let wrapper_ref = NodeRef::<html::Div>::new();
    let canvas_ref = NodeRef::<html::Canvas>::new();
    let player: PlayerSlot = Rc::new(RefCell::new(None));

    Effect::new({
        let player = player.clone();
        move || {
            let (Some(wrapper), Some(canvas), Some(catalog)) =
                (wrapper_ref.get(), canvas_ref.get(), catalog.get())
            else {
                return;
            };
            if player.borrow().is_some() {
                return;
            }
            let container = measure(&wrapper);
            let surface = match CanvasSurface::new(canvas, container, device_pixel_ratio()) {
                Ok(surface) => surface,
                Err(e) => {
                    warn(&format!("map canvas unavailable: {e}"));
                    return;
                }
            };
            *player.borrow_mut() = Some(ReplicaSession::new(
                EngineConfig::default(),
                catalog,
                surface,
                container,
            ));

            let receiving = player.clone();
            if !channel::listen(move |frame| {
                if let Some(session) = receiving.borrow_mut().as_mut()
                    && let Err(e) = session.receive_frame(frame)
                {
                    warn(&format!("dropping map frame: {e}"));
                }
            }) {
                warn("this browser cannot receive map updates");
            }

            let painting = player.clone();
            start_ticker(move |_| {
                if let Some(session) = painting.borrow_mut().as_mut() {
                    session.surface_mut().paint();
                }
            });

            let resized = player.clone();
            listen_window("resize", move |_| {
                let Some(wrapper) = wrapper_ref.get_untracked() else {
                    return;
                };
                let size = measure(&wrapper);
                if let Some(session) = resized.borrow_mut().as_mut() {
                    session.surface_mut().resize(size);
                    session.resize(size);
                }
            });
        }
    });
    on_cleanup(stop_window_bindings);

    view! {
        <div node_ref=wrapper_ref style="position: relative; width: 100%; height: 100%; overflow: hidden; background: #000;">
            <canvas node_ref=canvas_ref style="position: absolute; inset: 0; width: 100%; height: 100%;" />
        </div>
    }
}
