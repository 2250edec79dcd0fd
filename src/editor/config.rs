//! Editing surface options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EditorConfig;
use crate::html::ParagraphSpacing;

/// Declarative options for an editing surface.
///
/// - `page_height_budget`: rendered page height (layout px) above which the
///   last page block is split
/// - `page_width`: width given to page blocks created by a split
/// - `padding`: page padding, counted on both sides when measuring
/// - `debounce`: quiet period before the content observer fires
/// - `spacing`: paragraph margin and line-height preset
/// - `max_image_width`: inserted images wider than this are scaled down
/// - `sanitize`: strip scripts and event handlers from committed HTML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceConfig {
    pub page_height_budget: f32,
    pub page_width: f32,
    pub padding: f32,
    #[serde(with = "millis")]
    pub debounce: Duration,
    pub spacing: ParagraphSpacing,
    pub max_image_width: u32,
    pub sanitize: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            // A4 at 96 DPI
            page_height_budget: 1123.0,
            page_width: 794.0,
            padding: 40.0,
            debounce: Duration::from_millis(100),
            spacing: ParagraphSpacing::Compact,
            max_image_width: 700,
            sanitize: true,
        }
    }
}

impl SurfaceConfig {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            page_height_budget: config.page_height_budget,
            debounce: config.debounce(),
            ..Self::default()
        }
    }

    /// Height left for blocks once padding is taken off
    pub fn content_height(&self) -> f32 {
        (self.page_height_budget - 2.0 * self.padding).max(0.0)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_editor_config() {
        let editor = EditorConfig {
            page_height_budget: 900.0,
            debounce_ms: 250,
        };
        let config = SurfaceConfig::from_config(&editor);
        assert_eq!(config.page_height_budget, 900.0);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.max_image_width, 700);
        assert_eq!(config.content_height(), 820.0);
    }

    #[test]
    fn test_serializes_debounce_as_millis() {
        let json = serde_json::to_value(SurfaceConfig::default()).unwrap();
        assert_eq!(json["debounce"], 100);
        assert_eq!(json["pageHeightBudget"], 1123.0);
        assert_eq!(json["spacing"], "compact");
    }
}
