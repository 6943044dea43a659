use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveField {
    pub label: String,
    pub bounding_box: BoundingBox,
    #[serde(default = "first_page")]
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub filled: bool,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "first_page")]
    pub page: u32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightState {
    Idle,
    Highlighted,
}

#[derive(Debug, Clone, Default)]
pub struct FieldSession {
    fields: Vec<FormField>,
    active: Option<ActiveField>,
    step: usize,
    done: bool,
}

impl FieldSession {
    pub fn start(fields: Vec<FormField>) -> Self {
        let mut session = Self::resume(fields, None);
        session.restart();
        session
    }

    pub fn resume(fields: Vec<FormField>, active: Option<ActiveField>) -> Self {
        let step = fields.iter().filter(|f| f.filled).count() + usize::from(active.is_some());
        Self {
            fields,
            active,
            step,
            done: false,
        }
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn active(&self) -> Option<&ActiveField> {
        self.active.as_ref()
    }

    pub fn state(&self) -> HighlightState {
        if self.active.is_some() {
            HighlightState::Highlighted
        } else {
            HighlightState::Idle
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn total_pages(&self) -> u32 {
        self.fields
            .iter()
            .map(|f| f.page)
            .chain(self.active.as_ref().map(|a| a.page))
            .max()
            .unwrap_or(1)
            .max(1)
    }

    /// A new question arrived for `field`. Returns the page to show.
    pub fn advance(&mut self, field: ActiveField) -> u32 {
        let page = field.page.max(1);
        tracing::debug!(label = %field.label, page, "field highlighted");
        self.active = Some(field);
        self.step += 1;
        page
    }

    /// Marks the field named after the active label as filled with `value`.
    /// Returns false when nothing is active or no field carries that name.
    pub fn record_answer(&mut self, value: &str) -> bool {
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        let mut matched = false;
        for field in self.fields.iter_mut().filter(|f| f.name == active.label) {
            field.filled = true;
            field.value = Some(value.to_string());
            matched = true;
        }
        if !matched {
            tracing::warn!(label = %active.label, "answer did not match any form field");
        }
        matched
    }

    pub fn validation_error(&mut self) {
        self.active = None;
    }

    pub fn navigate_away(&mut self) {
        self.active = None;
    }

    /// The user picked `name` in the field list. Clears the highlight and
    /// returns that field's page, if such a field exists.
    pub fn navigate_to(&mut self, name: &str) -> Option<u32> {
        self.active = None;
        let page = self.fields.iter().find(|f| f.name == name).map(|f| f.page.max(1));
        if page.is_none() {
            tracing::warn!(name, "navigation target is not a form field");
        }
        page
    }

    pub fn complete(&mut self) {
        self.active = None;
        self.done = true;
    }

    pub fn restart(&mut self) {
        for field in &mut self.fields {
            field.filled = false;
            field.value = None;
        }
        self.active = None;
        self.step = 0;
        self.done = false;
    }

    pub fn completed_fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields.iter().filter(|f| f.filled)
    }

    pub fn progress(&self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        self.completed_fields().count() as f64 / self.fields.len() as f64
    }
}
