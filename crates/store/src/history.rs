use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two companion appearance systems a snapshot keeps history for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppearanceKind {
    Glamourer,
    Customize,
}

impl AppearanceKind {
    /// History file name inside a snapshot directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Glamourer => "glamourer_history.json",
            Self::Customize => "customize_history.json",
        }
    }
}

/// One appearance capture. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// Mapping state active when this appearance was captured.
    #[serde(default)]
    pub file_map_id: Option<String>,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_template: Option<String>,
}

impl HistoryEntry {
    pub fn new(description: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            description: description.into(),
            file_map_id: None,
            payload: payload.into(),
            derived_template: None,
        }
    }

    pub fn linked_to(mut self, file_map_id: Option<String>) -> Self {
        self.file_map_id = file_map_id;
        self
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.derived_template = template;
        self
    }
}
