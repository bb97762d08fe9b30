//! Knobs for a pagination run.
//!
//! Everything has a default, so a configuration file only needs to name the
//! values it changes:
//!
//! ```
//! use paged_flow::{PaginationConfig, Pt};
//!
//! let config = PaginationConfig::from_json(r#"{ "max_pages": 20, "layout": { "max_chars": 800 } }"#)
//!     .expect("valid config");
//! assert_eq!(config.max_pages, Some(20));
//! assert_eq!(config.layout.max_chars, 800);
//! assert_eq!(config.gutter, Pt(0.0));
//! ```

use crate::error::PaginationError;
use crate::layout::Margins;
use crate::pagesize::{self, PageSize};
use crate::units::Pt;
use serde::{Deserialize, Serialize};

/// How the chunker cuts a document into sections
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionSplit {
    /// The whole document flows as one section
    #[default]
    Whole,
    /// Every top-level element starts a section of its own
    TopLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub page_size: PageSize,
    pub margins: Margins,
    /// Extra margin on the bound edge, alternating with the page side
    pub gutter: Pt,
    pub section_split: SectionSplit,
    /// Stop with [`PaginationError::PageLimit`] instead of producing more
    /// pages than this
    pub max_pages: Option<usize>,
    pub layout: LayoutSettings,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            page_size: pagesize::LETTER,
            margins: Margins::all(Pt(72.0)),
            gutter: Pt(0.0),
            section_split: SectionSplit::Whole,
            max_pages: None,
            layout: LayoutSettings::default(),
        }
    }
}

impl PaginationConfig {
    pub fn from_json(json: &str) -> Result<PaginationConfig, PaginationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn with_gutter(mut self, gutter: Pt) -> Self {
        self.gutter = gutter;
        self
    }

    pub fn with_section_split(mut self, section_split: SectionSplit) -> Self {
        self.section_split = section_split;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_layout(mut self, layout: LayoutSettings) -> Self {
        self.layout = layout;
        self
    }
}

/// Settings for a single [`Layout`](crate::layout::Layout) pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Chars of text appended between two overflow checks
    pub max_chars: usize,
    /// Appended to the kept half of a word split across pages
    pub hyphen_glyph: String,
    /// Tolerance past the right edge before content counts as overflowing
    pub gap: Pt,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        LayoutSettings {
            max_chars: 1500,
            hyphen_glyph: "\u{2011}".to_string(),
            gap: Pt(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = PaginationConfig::from_json(
            r#"{ "page_size": [300.0, 400.0], "margins": { "top": 10.0 }, "section_split": "top_level" }"#,
        )
        .unwrap();
        assert_eq!(config.page_size, (Pt(300.0), Pt(400.0)));
        assert_eq!(config.margins.top, Pt(10.0));
        assert_eq!(config.margins.left, Pt(0.0));
        assert_eq!(config.section_split, SectionSplit::TopLevel);
        assert_eq!(config.layout, LayoutSettings::default());
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let err = PaginationConfig::from_json(r#"{ "max_pages": "many" }"#).unwrap_err();
        assert!(matches!(err, PaginationError::Config(_)));
    }
}
