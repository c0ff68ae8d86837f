//! Zoom, pan and fullscreen state for a rendered diagram.
//!
//! All geometry is in viewport pixels. The scaled content is centred with padding while it is
//! smaller than the viewport, so the scrollable extent on each axis is
//! `max(content * scale, viewport)`. Zooming keeps the content point under the anchor fixed:
//! the anchor's fraction of the extent is measured before rescaling and restored afterwards.

use crate::svg::ViewBox;
use sketchwire_core::{DiagramType, Error, Result, ViewportSpec};

pub const MIN_SCALE: f64 = 0.1;
/// Upper bound for wheel zoom. Button zoom is unbounded above.
pub const MAX_WHEEL_SCALE: f64 = 5.0;
pub const BUTTON_STEP: f64 = 0.1;
pub const WHEEL_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl From<ViewBox> for Size {
    fn from(vb: ViewBox) -> Self {
        Self::new(vb.width, vb.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    ZoomIn,
    ZoomOut,
    Reset,
    Fullscreen,
}

/// A platform fullscreen implementation (standard, vendor-prefixed, ...).
pub trait FullscreenApi: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn request(&self) -> Result<()>;
    fn exit(&self) -> Result<()>;
}

struct FullscreenControl {
    apis: Vec<Box<dyn FullscreenApi>>,
    active: bool,
}

#[derive(Debug, Clone, Copy)]
struct Pan {
    pointer: Point,
    scroll: Point,
}

pub struct ViewportController {
    default_scale: f64,
    content: Size,
    viewport: Size,
    scale: f64,
    scroll: Point,
    fullscreen: Option<FullscreenControl>,
    space_held: bool,
    pan: Option<Pan>,
}

impl std::fmt::Debug for ViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportController")
            .field("scale", &self.scale)
            .field("scroll", &self.scroll)
            .field("content", &self.content)
            .field("viewport", &self.viewport)
            .field("fullscreen", &self.is_fullscreen())
            .finish()
    }
}

impl ViewportController {
    /// Attaches to content of `content` size shown in a `viewport` sized area, at the type's
    /// default scale, centred.
    pub fn attach(spec: ViewportSpec, content: Size, viewport: Size) -> Self {
        let mut this = Self {
            default_scale: spec.default_scale.max(MIN_SCALE),
            content,
            viewport,
            scale: 1.0,
            scroll: Point::default(),
            fullscreen: spec.fullscreen.then(|| FullscreenControl {
                apis: Vec::new(),
                active: false,
            }),
            space_held: false,
            pan: None,
        };
        this.reset();
        this
    }

    /// `None` for types without interactive viewport support.
    pub fn for_type(diagram_type: &DiagramType, content: Size, viewport: Size) -> Option<Self> {
        diagram_type
            .viewport
            .map(|spec| Self::attach(spec, content, viewport))
    }

    pub fn with_fullscreen_api(mut self, api: Box<dyn FullscreenApi>) -> Self {
        if let Some(control) = self.fullscreen.as_mut() {
            control.apis.push(api);
        }
        self
    }

    pub fn controls(&self) -> Vec<Control> {
        let mut out = vec![Control::ZoomIn, Control::ZoomOut, Control::Reset];
        if self.fullscreen.is_some() {
            out.push(Control::Fullscreen);
        }
        out
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn scroll(&self) -> Point {
        self.scroll
    }

    pub fn padding(&self) -> Size {
        Size::new(
            pad(self.content.width * self.scale, self.viewport.width),
            pad(self.content.height * self.scale, self.viewport.height),
        )
    }

    /// Total scrollable size, padding included.
    pub fn extent(&self) -> Size {
        Size::new(
            (self.content.width * self.scale).max(self.viewport.width),
            (self.content.height * self.scale).max(self.viewport.height),
        )
    }

    pub fn max_scroll(&self) -> Point {
        let extent = self.extent();
        Point::new(
            (extent.width - self.viewport.width).max(0.0),
            (extent.height - self.viewport.height).max(0.0),
        )
    }

    pub fn viewport_center(&self) -> Point {
        Point::new(self.viewport.width / 2.0, self.viewport.height / 2.0)
    }

    pub fn zoom_in(&mut self) {
        let center = self.viewport_center();
        self.zoom_to(tidy(self.scale + BUTTON_STEP), center);
    }

    pub fn zoom_out(&mut self) {
        let center = self.viewport_center();
        self.zoom_to(tidy(self.scale - BUTTON_STEP).max(MIN_SCALE), center);
    }

    /// Wheel zoom around the pointer. Returns `false` (and leaves the event to normal
    /// scrolling) unless ctrl or meta is held.
    pub fn wheel(&mut self, delta_y: f64, pointer: Point, modifiers: Modifiers) -> bool {
        if !(modifiers.ctrl || modifiers.meta) || delta_y == 0.0 {
            return false;
        }
        // Button zoom may already be past the wheel cap.
        if delta_y < 0.0 && self.scale >= MAX_WHEEL_SCALE {
            return true;
        }
        let next = if delta_y < 0.0 {
            self.scale * WHEEL_FACTOR
        } else {
            self.scale / WHEEL_FACTOR
        };
        self.zoom_to(next.clamp(MIN_SCALE, MAX_WHEEL_SCALE), pointer);
        true
    }

    pub fn reset(&mut self) {
        self.scale = self.default_scale;
        let max = self.max_scroll();
        self.scroll = Point::new(max.x / 2.0, max.y / 2.0);
    }

    /// Rescales so the content point under `anchor` (viewport coordinates) stays put.
    pub fn zoom_to(&mut self, scale: f64, anchor: Point) {
        let before = self.extent();
        let fx = fraction(self.scroll.x + anchor.x, before.width);
        let fy = fraction(self.scroll.y + anchor.y, before.height);

        self.scale = scale.max(MIN_SCALE);

        let after = self.extent();
        self.scroll = Point::new(fx * after.width - anchor.x, fy * after.height - anchor.y);
        self.clamp_scroll();
    }

    pub fn set_viewport_size(&mut self, viewport: Size) {
        self.viewport = viewport;
        self.clamp_scroll();
    }

    pub fn scroll_to(&mut self, scroll: Point) {
        self.scroll = scroll;
        self.clamp_scroll();
    }

    fn clamp_scroll(&mut self) {
        let max = self.max_scroll();
        self.scroll.x = self.scroll.x.clamp(0.0, max.x);
        self.scroll.y = self.scroll.y.clamp(0.0, max.y);
    }

    pub fn set_space_held(&mut self, held: bool) {
        self.space_held = held;
    }

    /// Whether a drag would pan (space is held or a pan is in progress).
    pub fn is_draggable(&self) -> bool {
        self.space_held || self.pan.is_some()
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    /// Starts a pan if space is held. Returns whether the pointer-down was consumed.
    pub fn begin_pan(&mut self, pointer: Point) -> bool {
        if !self.space_held {
            return false;
        }
        self.pan = Some(Pan {
            pointer,
            scroll: self.scroll,
        });
        true
    }

    pub fn pan_to(&mut self, pointer: Point) {
        let Some(pan) = self.pan else {
            return;
        };
        self.scroll = Point::new(
            pan.scroll.x - (pointer.x - pan.pointer.x),
            pan.scroll.y - (pointer.y - pan.pointer.y),
        );
        self.clamp_scroll();
    }

    pub fn end_pan(&mut self) {
        self.pan = None;
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.as_ref().is_some_and(|c| c.active)
    }

    pub fn fullscreen_label(&self) -> &'static str {
        if self.is_fullscreen() {
            "Exit fullscreen"
        } else {
            "Fullscreen"
        }
    }

    /// Enters or leaves fullscreen through the first available platform API.
    pub fn toggle_fullscreen(&mut self) -> Result<()> {
        let control = self
            .fullscreen
            .as_mut()
            .ok_or_else(|| Error::configuration("fullscreen is not offered for this diagram type"))?;
        let api = control
            .apis
            .iter()
            .find(|api| api.is_available())
            .ok_or_else(|| Error::configuration("no fullscreen API is available"))?;

        if control.active {
            api.exit()?;
        } else {
            api.request()?;
        }
        tracing::debug!(api = api.name(), entering = !control.active, "fullscreen toggled");
        control.active = !control.active;
        Ok(())
    }

    /// Resyncs with the platform after a fullscreen-change event.
    pub fn on_fullscreen_change(&mut self, active: bool) {
        if let Some(control) = self.fullscreen.as_mut() {
            control.active = active;
        }
    }
}

fn pad(scaled: f64, viewport: f64) -> f64 {
    ((viewport - scaled) / 2.0).max(0.0)
}

fn fraction(position: f64, extent: f64) -> f64 {
    if extent > 0.0 { position / extent } else { 0.0 }
}

/// Removes float noise from repeated button steps.
fn tidy(scale: f64) -> f64 {
    (scale * 1e6).round() / 1e6
}
