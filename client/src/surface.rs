//! Canvas 2D implementation of the engine's render surface.
//!
//! Surface calls only record what changed and mark the surface dirty; the
//! interval in the window component calls [`CanvasSurface::paint`].

use std::cell::Cell;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::rc::Rc;

use tabletop_engine::{
    Control, FogRaster, InteractionPolicy, Letterbox, NodeShape, OverlayNode, RenderSurface,
    control_anchors,
};
use tabletop_shared::{ContainerSize, LatLng, MapDimensions, MapPoint, ViewportState};
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement, ImageData};

use crate::camera::Camera;

const PIN_RADIUS_PX: f64 = 8.0;
const LABEL_FONT_PX: f64 = 14.0;
const STROKE_PX: f64 = 2.0;
const ACTIVE_TURN_PX: f64 = 4.0;
const HANDLE_PX: f64 = 9.0;

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, String> {
    canvas
        .get_context("2d")
        .map_err(|e| format!("get_context failed: {e:?}"))?
        .ok_or_else(|| "canvas has no 2d context".to_string())?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| "context is not a CanvasRenderingContext2d".to_string())
}

/// Fill color and glyph of a DM handle.
pub fn control_style(control: Control) -> (&'static str, &'static str) {
    match control {
        Control::Drag => ("#546e7a", "+"),
        Control::Resize => ("#546e7a", "\u{2194}"),
        Control::Remove | Control::Cancel => ("#c62828", "\u{00d7}"),
        Control::Confirm => ("#2e7d32", "\u{2713}"),
    }
}

/// Black RGBA pixels carrying the fog alpha scaled by `opacity`.
pub fn fog_rgba(alpha: &[u8], opacity: f64) -> Vec<u8> {
    let opacity = opacity.clamp(0.0, 1.0);
    let mut rgba = Vec::with_capacity(alpha.len() * 4);
    for a in alpha {
        rgba.extend_from_slice(&[0, 0, 0, (*a as f64 * opacity).round() as u8]);
    }
    rgba
}

/// CSS placing the DM-sized canvas inside a player wrapper.
pub fn letterbox_style(letterbox: Option<&Letterbox>) -> String {
    match letterbox {
        Some(lb) => format!(
            "position: absolute; left: {}px; top: {}px; width: {}px; height: {}px; \
             transform: scale({}); transform-origin: 0 0;",
            lb.offset_x, lb.offset_y, lb.width, lb.height, lb.scale
        ),
        None => "position: absolute; inset: 0; width: 100%; height: 100%;".to_string(),
    }
}

struct FogLayer {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

struct LoadedImage {
    element: HtmlImageElement,
    _on_load: Closure<dyn FnMut()>,
}

pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    camera: Camera,
    wrapper: ContainerSize,
    dpr: f64,
    dims: MapDimensions,
    view: Option<ViewportState>,
    base: Option<LoadedImage>,
    fog: Option<FogLayer>,
    fog_visible: bool,
    images: HashMap<String, LoadedImage>,
    nodes: HashMap<String, OverlayNode>,
    loading: bool,
    interaction: Option<InteractionPolicy>,
    dirty: Rc<Cell<bool>>,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement, wrapper: ContainerSize, dpr: f64) -> Result<Self, String> {
        let ctx = context_2d(&canvas)?;
        let mut surface = Self {
            canvas,
            ctx,
            camera: Camera::default(),
            wrapper,
            dpr: if dpr > 0.0 { dpr } else { 1.0 },
            dims: MapDimensions::default(),
            view: None,
            base: None,
            fog: None,
            fog_visible: false,
            images: HashMap::new(),
            nodes: HashMap::new(),
            loading: false,
            interaction: None,
            dirty: Rc::new(Cell::new(true)),
        };
        surface.apply_container(wrapper);
        Ok(surface)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera for local pan/zoom; marks the surface for repaint.
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.dirty.set(true);
        &mut self.camera
    }

    pub fn map_height(&self) -> f64 {
        self.dims.height as f64
    }

    pub fn interaction(&self) -> Option<&InteractionPolicy> {
        self.interaction.as_ref()
    }

    /// Handle radius in map pixels at the current zoom.
    pub fn handle_radius(&self) -> f64 {
        self.px(HANDLE_PX)
    }

    pub fn to_lat_lng(&self, sx: f64, sy: f64) -> LatLng {
        self.camera.screen_to_world(sx, sy).to_lat_lng(self.map_height())
    }

    /// The wrapper element changed size.
    pub fn resize(&mut self, wrapper: ContainerSize) {
        self.wrapper = wrapper;
        self.apply_container(wrapper);
    }

    fn apply_container(&mut self, container: ContainerSize) {
        self.canvas
            .set_width((container.width * self.dpr).round().max(1.0) as u32);
        self.canvas
            .set_height((container.height * self.dpr).round().max(1.0) as u32);
        self.camera.resize(container);
        self.dirty.set(true);
    }

    fn load_image(&self, url: &str) -> Option<LoadedImage> {
        let element = HtmlImageElement::new().ok()?;
        let dirty = self.dirty.clone();
        let on_load = Closure::<dyn FnMut()>::new(move || dirty.set(true));
        element.set_onload(Some(on_load.as_ref().unchecked_ref()));
        element.set_src(url);
        Some(LoadedImage {
            element,
            _on_load: on_load,
        })
    }

    fn fog_layer(&mut self, width: u32, height: u32) -> Option<&FogLayer> {
        let stale = self
            .fog
            .as_ref()
            .is_none_or(|fog| fog.canvas.width() != width || fog.canvas.height() != height);
        if stale {
            let canvas = web_sys::window()?
                .document()?
                .create_element("canvas")
                .ok()?
                .dyn_into::<HtmlCanvasElement>()
                .ok()?;
            canvas.set_width(width);
            canvas.set_height(height);
            let ctx = context_2d(&canvas).ok()?;
            self.fog = Some(FogLayer { canvas, ctx });
        }
        self.fog.as_ref()
    }

    /// Redraw the frame if anything changed since the last paint.
    pub fn paint(&mut self) {
        if !self.dirty.replace(false) {
            return;
        }
        let ctx = &self.ctx;
        ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0).ok();
        ctx.clear_rect(
            0.0,
            0.0,
            self.canvas.width() as f64,
            self.canvas.height() as f64,
        );

        if self.loading {
            ctx.set_transform(self.dpr, 0.0, 0.0, self.dpr, 0.0, 0.0).ok();
            ctx.set_fill_style_str("#888");
            ctx.set_font("16px sans-serif");
            ctx.set_text_align("center");
            ctx.fill_text(
                "Waiting for the DM...",
                self.camera.container.width / 2.0,
                self.camera.container.height / 2.0,
            )
            .ok();
            return;
        }

        let scale = self.camera.scale * self.dpr;
        ctx.set_transform(
            scale,
            0.0,
            0.0,
            scale,
            self.camera.offset_x * self.dpr,
            self.camera.offset_y * self.dpr,
        )
        .ok();

        let (width, height) = (self.dims.width as f64, self.dims.height as f64);
        if let Some(base) = &self.base
            && base.element.complete()
        {
            ctx.draw_image_with_html_image_element_and_dw_and_dh(
                &base.element,
                0.0,
                0.0,
                width,
                height,
            )
            .ok();
        }

        let mut nodes: Vec<&OverlayNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| {
            a.layer
                .z_index()
                .cmp(&b.layer.z_index())
                .then_with(|| a.id.cmp(&b.id))
        });
        for node in &nodes {
            self.paint_node(node);
        }
        // Handles above every node so none is hidden by a later layer.
        for node in &nodes {
            self.paint_controls(node);
        }

        if self.fog_visible
            && let Some(fog) = &self.fog
        {
            ctx.draw_image_with_html_canvas_element_and_dw_and_dh(
                &fog.canvas,
                0.0,
                0.0,
                width,
                height,
            )
            .ok();
        }
    }

    /// Screen pixels expressed in map units at the current zoom.
    fn px(&self, value: f64) -> f64 {
        value / self.camera.scale
    }

    fn point(&self, pos: LatLng) -> MapPoint {
        MapPoint::from_lat_lng(pos, self.map_height())
    }

    fn paint_node(&self, node: &OverlayNode) {
        let ctx = &self.ctx;
        ctx.save();
        match &node.shape {
            NodeShape::Pin { position, label } => {
                let p = self.point(*position);
                ctx.begin_path();
                ctx.arc(p.x, p.y, self.px(PIN_RADIUS_PX), 0.0, TAU).ok();
                ctx.set_fill_style_str("#e53935");
                ctx.fill();
                if !label.is_empty() {
                    ctx.set_font(&format!("{}px sans-serif", self.px(LABEL_FONT_PX)));
                    ctx.set_text_align("center");
                    ctx.set_fill_style_str("#fff");
                    ctx.fill_text(label, p.x, p.y - self.px(PIN_RADIUS_PX * 1.5))
                        .ok();
                }
            }
            NodeShape::Token {
                position,
                image_url,
                diameter,
                is_player,
                active_turn,
                dead,
            } => {
                let p = self.point(*position);
                let r = diameter / 2.0;
                if *dead {
                    ctx.set_global_alpha(0.4);
                }
                ctx.begin_path();
                ctx.arc(p.x, p.y, r, 0.0, TAU).ok();
                ctx.set_fill_style_str(if *is_player { "#1e88e5" } else { "#8e24aa" });
                ctx.fill();
                if let Some(image) = self.images.get(image_url)
                    && image.element.complete()
                {
                    ctx.save();
                    ctx.clip();
                    ctx.draw_image_with_html_image_element_and_dw_and_dh(
                        &image.element,
                        p.x - r,
                        p.y - r,
                        *diameter,
                        *diameter,
                    )
                    .ok();
                    ctx.restore();
                }
                if *active_turn {
                    ctx.begin_path();
                    ctx.arc(p.x, p.y, r, 0.0, TAU).ok();
                    ctx.set_stroke_style_str("#ffd600");
                    ctx.set_line_width(self.px(ACTIVE_TURN_PX));
                    ctx.stroke();
                }
                if *dead {
                    ctx.set_stroke_style_str("#000");
                    ctx.set_line_width(self.px(STROKE_PX));
                    ctx.begin_path();
                    ctx.move_to(p.x - r, p.y - r);
                    ctx.line_to(p.x + r, p.y + r);
                    ctx.move_to(p.x + r, p.y - r);
                    ctx.line_to(p.x - r, p.y + r);
                    ctx.stroke();
                }
            }
            NodeShape::Polyline { points, dashed } => {
                ctx.begin_path();
                for (i, pos) in points.iter().enumerate() {
                    let p = self.point(*pos);
                    if i == 0 {
                        ctx.move_to(p.x, p.y);
                    } else {
                        ctx.line_to(p.x, p.y);
                    }
                }
                if *dashed {
                    let dash = js_sys::Array::of2(
                        &JsValue::from_f64(self.px(8.0)),
                        &JsValue::from_f64(self.px(6.0)),
                    );
                    ctx.set_line_dash(&dash).ok();
                }
                ctx.set_stroke_style_str("#fdd835");
                ctx.set_line_width(self.px(STROKE_PX * 1.5));
                ctx.stroke();
            }
            NodeShape::Circle {
                center,
                radius,
                color,
                pulsing,
            } => {
                let p = self.point(*center);
                ctx.begin_path();
                ctx.arc(p.x, p.y, *radius, 0.0, TAU).ok();
                ctx.set_global_alpha(0.35);
                ctx.set_fill_style_str(color);
                ctx.fill();
                ctx.set_global_alpha(1.0);
                if *pulsing {
                    let dash = js_sys::Array::of2(
                        &JsValue::from_f64(self.px(6.0)),
                        &JsValue::from_f64(self.px(4.0)),
                    );
                    ctx.set_line_dash(&dash).ok();
                }
                ctx.set_stroke_style_str(color);
                ctx.set_line_width(self.px(STROKE_PX));
                ctx.stroke();
            }
            NodeShape::Grid {
                cell_size,
                offset,
                color,
                opacity,
                columns,
                rows,
            } => {
                let (width, height) = (self.dims.width as f64, self.dims.height as f64);
                let x0 = offset[0].rem_euclid(*cell_size);
                let y0 = offset[1].rem_euclid(*cell_size);
                ctx.set_global_alpha(*opacity);
                ctx.set_stroke_style_str(color);
                ctx.set_line_width(self.px(1.0));
                ctx.begin_path();
                for i in 0..=*columns {
                    let x = x0 + i as f64 * cell_size;
                    ctx.move_to(x, 0.0);
                    ctx.line_to(x, height);
                }
                for j in 0..=*rows {
                    let y = y0 + j as f64 * cell_size;
                    ctx.move_to(0.0, y);
                    ctx.line_to(width, y);
                }
                ctx.stroke();
            }
        }
        ctx.restore();
    }

    fn paint_controls(&self, node: &OverlayNode) {
        if node.controls.is_empty() {
            return;
        }
        let ctx = &self.ctx;
        ctx.save();
        ctx.set_text_align("center");
        ctx.set_text_baseline("middle");
        for anchor in control_anchors(node, self.map_height(), self.handle_radius()) {
            if anchor.body {
                continue;
            }
            let (fill, glyph) = control_style(anchor.control);
            ctx.begin_path();
            ctx.arc(anchor.at.x, anchor.at.y, anchor.radius, 0.0, TAU).ok();
            ctx.set_fill_style_str(fill);
            ctx.fill();
            ctx.set_stroke_style_str("#fff");
            ctx.set_line_width(self.px(1.0));
            ctx.stroke();
            ctx.set_fill_style_str("#fff");
            ctx.set_font(&format!("bold {}px sans-serif", anchor.radius * 1.4));
            ctx.fill_text(glyph, anchor.at.x, anchor.at.y).ok();
        }
        ctx.restore();
    }
}

impl RenderSurface for CanvasSurface {
    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.dirty.set(true);
    }

    fn set_base_image(&mut self, image_url: Option<&str>, dims: MapDimensions) {
        self.dims = dims;
        self.base = image_url.and_then(|url| self.load_image(url));
        self.dirty.set(true);
    }

    fn set_view(&mut self, view: &ViewportState, _animate: bool) {
        self.camera.look_at(view, self.map_height());
        self.view = Some(view.clone());
        self.dirty.set(true);
    }

    fn set_interaction(&mut self, policy: &InteractionPolicy) {
        let cursor = if policy.dragging { "grab" } else { "default" };
        self.canvas.style().set_property("cursor", cursor).ok();
        self.interaction = Some(*policy);
    }

    fn set_letterbox(&mut self, letterbox: Option<&Letterbox>) {
        self.canvas
            .set_attribute("style", &letterbox_style(letterbox))
            .ok();
        let container = match letterbox {
            Some(lb) => ContainerSize::new(lb.width, lb.height),
            None => self.wrapper,
        };
        self.apply_container(container);
        if let Some(view) = self.view.clone() {
            self.camera.look_at(&view, self.map_height());
        }
    }

    fn draw_disc(&mut self, center: MapPoint, radius: f64) {
        let Some(fog) = &self.fog else {
            return;
        };
        fog.ctx.set_global_composite_operation("destination-out").ok();
        fog.ctx.begin_path();
        fog.ctx.arc(center.x, center.y, radius, 0.0, TAU).ok();
        fog.ctx.fill();
        fog.ctx.set_global_composite_operation("source-over").ok();
        self.dirty.set(true);
    }

    fn set_overlay_image(&mut self, raster: &FogRaster, opacity: f64) {
        let (width, height) = (raster.width(), raster.height());
        let rgba = fog_rgba(raster.alpha(), opacity);
        let Some(fog) = self.fog_layer(width, height) else {
            web_sys::console::warn_1(&"could not create the fog canvas".into());
            return;
        };
        match ImageData::new_with_u8_clamped_array_and_sh(Clamped(&rgba), width, height) {
            Ok(image) => {
                fog.ctx.put_image_data(&image, 0.0, 0.0).ok();
            }
            Err(e) => {
                web_sys::console::warn_1(&format!("fog image rejected: {e:?}").into());
                return;
            }
        }
        self.fog_visible = true;
        self.dirty.set(true);
    }

    fn clear_overlay_image(&mut self) {
        self.fog_visible = false;
        self.dirty.set(true);
    }

    fn create_overlay_node(&mut self, node: &OverlayNode) {
        if let NodeShape::Token { image_url, .. } = &node.shape
            && !image_url.is_empty()
            && !self.images.contains_key(image_url)
            && let Some(image) = self.load_image(image_url)
        {
            self.images.insert(image_url.clone(), image);
        }
        self.nodes.insert(node.id.clone(), node.clone());
        self.dirty.set(true);
    }

    fn remove_overlay_node(&mut self, id: &str) {
        if self.nodes.remove(id).is_some() {
            self.dirty.set(true);
        }
    }
}
