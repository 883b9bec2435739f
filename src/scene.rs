use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DisplayStateError;

/// Layout offsets belong to the editor's viewport, never to an exported image.
const OFFSET_FIELDS: [&str; 2] = ["offsetTop", "offsetLeft"];

/// The ordered diagram elements to render. Elements are opaque to us, they are only handed through
/// to the exporter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementSet(Arc<Vec<Value>>);

impl ElementSet {
    pub fn new(elements: Vec<Value>) -> Self {
        ElementSet(Arc::new(elements))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    /// Editors keep deleted elements around for undo, the exporter must never see them
    pub fn non_deleted(&self) -> ElementSet {
        let is_deleted = |element: &Value| {
            element
                .get("isDeleted")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        if !self.iter().any(is_deleted) {
            return self.clone();
        }

        ElementSet::new(
            self.iter()
                .filter(|element| !is_deleted(element))
                .cloned()
                .collect(),
        )
    }
}

impl PartialEq for ElementSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

/// Export settings (background, theme, scale...) handed to the exporter as-is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct DisplayState(Map<String, Value>);

impl DisplayState {
    pub fn new(fields: Map<String, Value>) -> Result<Self, DisplayStateError> {
        if let Some(field) = OFFSET_FIELDS.iter().find(|f| fields.contains_key(**f)) {
            return Err(DisplayStateError::OffsetField(field.to_string()));
        }

        Ok(DisplayState(fields))
    }

    /// Builds a display state from a saved scene, where the offsets are just stale viewport
    /// information and safe to drop.
    pub fn without_offsets(mut fields: Map<String, Value>) -> Self {
        for field in OFFSET_FIELDS {
            if fields.remove(field).is_some() {
                log::debug!("Dropping {field} from display state");
            }
        }

        DisplayState(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a new state with `overrides` layered on top of ours
    pub fn merged_with(&self, overrides: &DisplayState) -> DisplayState {
        let mut fields = self.0.clone();
        for (key, value) in overrides.0.iter() {
            fields.insert(key.clone(), value.clone());
        }

        DisplayState(fields)
    }
}

impl TryFrom<Value> for DisplayState {
    type Error = DisplayStateError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => DisplayState::new(fields),
            other => Err(DisplayStateError::NotAnObject(json_kind(&other))),
        }
    }
}

impl From<DisplayState> for Value {
    fn from(state: DisplayState) -> Self {
        Value::Object(state.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Everything an export depends on. A preview only re-exports when this changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreviewInput {
    pub elements: ElementSet,
    pub display_state: Option<DisplayState>,
}

impl PreviewInput {
    pub fn new(elements: ElementSet, display_state: Option<DisplayState>) -> Self {
        PreviewInput {
            elements,
            display_state,
        }
    }
}

/// A saved `.excalidraw` scene
#[derive(Deserialize, Debug, Default)]
pub struct Scene {
    #[serde(default)]
    pub elements: Vec<Value>,
    #[serde(rename = "appState", default)]
    pub app_state: Option<Map<String, Value>>,
}

impl Scene {
    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }

    /// Turns the scene into preview input, layering the configured display state over the one
    /// saved in the scene.
    pub fn into_input(self, overrides: Option<&DisplayState>) -> PreviewInput {
        let saved = self.app_state.map(DisplayState::without_offsets);
        let display_state = match (saved, overrides) {
            (Some(saved), Some(overrides)) => Some(saved.merged_with(overrides)),
            (Some(saved), None) => Some(saved),
            (None, overrides) => overrides.cloned(),
        };

        PreviewInput {
            elements: ElementSet::new(self.elements).non_deleted(),
            display_state,
        }
    }
}
