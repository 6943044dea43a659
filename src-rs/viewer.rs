use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::events::{ResizeEvents, ResizeSubscription};
use crate::geometry::{fit_scale, zoom_in, zoom_out, ImageSize, Rotation, MAX_ZOOM};
use crate::overlay::{FrameReport, HighlightRenderer, OverlayInputs};
use crate::session::{ActiveField, FieldSession};
use crate::style::RenderStyle;

fn default_scale() -> f64 {
    1.0
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default = "first_page")]
    pub total_pages: u32,
    /// Show the server's filled rendering of the page instead of the blank form.
    #[serde(default)]
    pub show_filled: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: Rotation::Deg0,
            current_page: 1,
            total_pages: 1,
            show_filled: false,
        }
    }
}

impl ViewState {
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            bail!("scale must be positive, got {}", self.scale);
        }
        if self.scale > MAX_ZOOM {
            bail!("scale {} is above the {MAX_ZOOM} zoom limit", self.scale);
        }
        if self.total_pages == 0 {
            bail!("total_pages must be at least 1");
        }
        if self.current_page == 0 || self.current_page > self.total_pages {
            bail!(
                "current_page {} is outside 1..={}",
                self.current_page,
                self.total_pages
            );
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct PageViewer {
    image: Option<ImageSize>,
    container_width: f64,
    view: ViewState,
    session: FieldSession,
    renderer: HighlightRenderer,
    frame: Option<FrameReport>,
}

impl PageViewer {
    pub fn new(session: FieldSession, style: RenderStyle) -> Self {
        let view = ViewState {
            total_pages: session.total_pages(),
            ..ViewState::default()
        };
        Self {
            image: None,
            container_width: 0.0,
            view,
            session,
            renderer: HighlightRenderer::new(style),
            frame: None,
        }
    }

    pub fn with_view(mut self, view: ViewState) -> Result<Self> {
        view.validate()?;
        self.view = view;
        Ok(self)
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn session(&self) -> &FieldSession {
        &self.session
    }

    pub fn image(&self) -> Option<ImageSize> {
        self.image
    }

    pub fn renderer(&self) -> &HighlightRenderer {
        &self.renderer
    }

    pub fn frame(&self) -> Option<&FrameReport> {
        self.frame.as_ref()
    }

    pub fn set_container_width(&mut self, width: f64) {
        self.container_width = width;
    }

    pub fn load_image(&mut self, natural: ImageSize) {
        self.image = Some(natural);
        self.refit();
        self.repaint();
    }

    pub fn unload_image(&mut self) {
        self.image = None;
        self.repaint();
    }

    pub fn resize(&mut self, container_width: f64) {
        self.container_width = container_width;
        if self.image.is_none() {
            return;
        }
        self.refit();
        self.repaint();
    }

    pub fn zoom_in(&mut self) {
        self.view.scale = zoom_in(self.view.scale);
        self.repaint();
    }

    pub fn zoom_out(&mut self) {
        self.view.scale = zoom_out(self.view.scale);
        self.repaint();
    }

    pub fn rotate(&mut self) {
        self.view.rotation = self.view.rotation.rotate_cw();
        self.repaint();
    }

    pub fn next_page(&mut self) {
        if self.view.current_page < self.view.total_pages {
            self.set_page(self.view.current_page + 1);
        }
    }

    pub fn prev_page(&mut self) {
        if self.view.current_page > 1 {
            self.set_page(self.view.current_page - 1);
        }
    }

    /// Out-of-range pages are clamped into `1..=total_pages`.
    pub fn set_page(&mut self, page: u32) {
        let page = page.clamp(1, self.view.total_pages.max(1));
        if page == self.view.current_page {
            return;
        }
        self.view.current_page = page;
        // A new page means a new bitmap; wait for its load callback.
        self.unload_image();
    }

    /// Switches between the blank and the filled page rendering. Both are
    /// separate bitmaps, so the overlay waits for the next load.
    pub fn toggle_filled_view(&mut self) {
        self.view.show_filled = !self.view.show_filled;
        self.unload_image();
    }

    pub fn advance(&mut self, field: ActiveField) {
        let page = self.session.advance(field);
        self.view.total_pages = self.view.total_pages.max(page);
        if page != self.view.current_page {
            self.set_page(page);
        } else {
            self.repaint();
        }
    }

    pub fn record_answer(&mut self, value: &str) -> bool {
        let matched = self.session.record_answer(value);
        if matched {
            self.repaint();
        }
        matched
    }

    pub fn validation_error(&mut self) {
        self.session.validation_error();
        self.repaint();
    }

    pub fn navigate_away(&mut self) {
        self.session.navigate_away();
        self.repaint();
    }

    /// Jumps to the page holding the field called `name`.
    pub fn navigate_to(&mut self, name: &str) {
        match self.session.navigate_to(name) {
            Some(page) if page != self.view.current_page => {
                self.view.total_pages = self.view.total_pages.max(page);
                self.set_page(page);
            }
            _ => {
                self.repaint();
            }
        }
    }

    pub fn complete(&mut self) {
        self.session.complete();
        self.repaint();
    }

    pub fn restart(&mut self) {
        self.session.restart();
        self.repaint();
    }

    pub fn repaint(&mut self) -> &FrameReport {
        let inputs = OverlayInputs {
            image: self.image,
            scale: self.view.scale,
            rotation: self.view.rotation,
            page: self.view.current_page,
            active: self.session.active(),
            fields: self.session.fields(),
        };
        let report = self.renderer.repaint(&inputs);
        self.frame.insert(report)
    }

    fn refit(&mut self) {
        let Some(natural) = self.image else {
            return;
        };
        if let Some(scale) = fit_scale(natural.width, self.container_width) {
            tracing::debug!(
                natural_width = natural.width,
                container_width = self.container_width,
                scale,
                "fit scale recomputed"
            );
            self.view.scale = scale;
        }
    }

    /// Hooks the viewer up to container resizes. Dropping (or unmounting)
    /// the returned handle unregisters the listener.
    pub fn mount(self, events: &ResizeEvents) -> MountedViewer {
        let viewer = Rc::new(RefCell::new(self));
        let weak = Rc::downgrade(&viewer);
        let subscription = events.subscribe(move |width| {
            if let Some(viewer) = weak.upgrade() {
                viewer.borrow_mut().resize(width);
            }
        });
        MountedViewer {
            viewer,
            _resize: subscription,
        }
    }
}

pub struct MountedViewer {
    viewer: Rc<RefCell<PageViewer>>,
    _resize: ResizeSubscription,
}

impl MountedViewer {
    pub fn borrow(&self) -> Ref<'_, PageViewer> {
        self.viewer.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, PageViewer> {
        self.viewer.borrow_mut()
    }

    pub fn unmount(self) -> Option<PageViewer> {
        let MountedViewer { viewer, _resize: subscription } = self;
        drop(subscription);
        Rc::try_unwrap(viewer).ok().map(RefCell::into_inner)
    }
}
