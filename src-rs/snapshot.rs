use std::fs;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::geometry::ImageSize;
use crate::session::{ActiveField, FieldSession, FormField};
use crate::style::{RenderStyle, StyleOverrides};
use crate::viewer::{PageViewer, ViewState};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    pub view: Option<ViewState>,
    pub image: Option<ImageSize>,
    pub container_width: Option<f64>,
    pub active_field: Option<ActiveField>,
    pub fields: Vec<FormField>,
    pub style: StyleOverrides,
}

pub fn load_snapshot(path: &str) -> Result<SessionSnapshot> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read session snapshot from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read session snapshot: {path}"))?
    };
    parse_snapshot(&raw)
}

pub fn parse_snapshot(raw: &str) -> Result<SessionSnapshot> {
    serde_json::from_str(raw).context("invalid session snapshot JSON")
}

impl SessionSnapshot {
    /// Builds a viewer with the page loaded at `natural` size and painted once.
    pub fn into_viewer(
        self,
        natural: ImageSize,
        container_width: Option<f64>,
    ) -> Result<PageViewer> {
        if natural.width == 0 || natural.height == 0 {
            bail!(
                "page image has no pixels ({}x{})",
                natural.width,
                natural.height
            );
        }
        let style = RenderStyle::default().with_overrides(&self.style)?;
        let session = FieldSession::resume(self.fields, self.active_field);

        let mut view = self.view.unwrap_or_default();
        view.total_pages = view.total_pages.max(session.total_pages());
        let mut viewer = PageViewer::new(session, style).with_view(view)?;

        if let Some(width) = container_width.or(self.container_width) {
            viewer.set_container_width(width);
        }
        viewer.load_image(natural);
        Ok(viewer)
    }
}
