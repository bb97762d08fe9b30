//! Break markers carried on source elements.
//!
//! Whatever computes the cascade upstream leaves its decisions as `data-*`
//! attributes: `data-break-before`, `data-break-after`,
//! `data-previous-break-after` and `data-page` for named pages. The flow only
//! reads them, apart from [`propagate_break_markers`] which moves
//! `break-after` values onto the node a break actually happens in front of.

use crate::document::{attrs, Document, NodeId};
use std::str::FromStr;

/// Value of a `break-before` / `break-after` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakValue {
    Auto,
    Avoid,
    Always,
    Page,
    Left,
    Right,
    Recto,
    Verso,
}

impl FromStr for BreakValue {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BreakValue::Auto),
            "avoid" | "avoid-page" => Ok(BreakValue::Avoid),
            "always" => Ok(BreakValue::Always),
            "page" => Ok(BreakValue::Page),
            "left" => Ok(BreakValue::Left),
            "right" => Ok(BreakValue::Right),
            "recto" => Ok(BreakValue::Recto),
            "verso" => Ok(BreakValue::Verso),
            _ => Err(()),
        }
    }
}

impl BreakValue {
    /// Whether the value starts a new page
    pub fn is_forced(self) -> bool {
        matches!(
            self,
            BreakValue::Always
                | BreakValue::Page
                | BreakValue::Left
                | BreakValue::Right
                | BreakValue::Recto
                | BreakValue::Verso
        )
    }

    /// The page side a forced break asks for, if any
    pub fn side(self) -> Option<PageSide> {
        match self {
            BreakValue::Left | BreakValue::Verso => Some(PageSide::Left),
            BreakValue::Right | BreakValue::Recto => Some(PageSide::Right),
            _ => None,
        }
    }
}

/// Side of a spread. Page one is a right-hand page
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSide {
    Left,
    Right,
}

impl PageSide {
    /// Side of a 1-based page number
    pub fn of_page(number: usize) -> PageSide {
        if number % 2 == 0 {
            PageSide::Left
        } else {
            PageSide::Right
        }
    }
}

fn marker(document: &Document, node: NodeId, name: &str) -> Option<BreakValue> {
    document.attr(node, name).and_then(|v| v.parse().ok())
}

pub fn break_before(document: &Document, node: NodeId) -> Option<BreakValue> {
    marker(document, node, attrs::BREAK_BEFORE)
}

pub fn previous_break_after(document: &Document, node: NodeId) -> Option<BreakValue> {
    marker(document, node, attrs::PREVIOUS_BREAK_AFTER)
}

pub fn needs_break_before(document: &Document, node: NodeId) -> bool {
    break_before(document, node).is_some_and(BreakValue::is_forced)
}

pub fn needs_previous_break_after(document: &Document, node: NodeId) -> bool {
    previous_break_after(document, node).is_some_and(BreakValue::is_forced)
}

/// Whether a page break is due in front of `node`. `limiter` is where the
/// current page started: nothing before it counts as a previous node.
pub fn should_break(document: &Document, node: NodeId, limiter: Option<NodeId>) -> bool {
    let previous = document.node_before(node, limiter);
    let parent = document.parent(node);

    // a first child repeating its parent's break-before already got that break
    let double_break_before = needs_break_before(document, node)
        && previous.is_none()
        && parent.is_some_and(|p| {
            needs_break_before(document, p) && break_before(document, p) == break_before(document, node)
        });

    (needs_break_before(document, node) && !double_break_before)
        || needs_previous_break_after(document, node)
        || needs_page_break(document, node, previous)
}

/// A change of named page between `previous` and `node` forces a break
pub fn needs_page_break(document: &Document, node: NodeId, previous: Option<NodeId>) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    if document.is_ignorable(node) {
        return false;
    }
    let previous_page = named_page(document, previous, None);
    let current_page = named_page(document, node, Some(previous));
    previous_page != current_page
}

/// The named page in effect at `node`: its own `data-page`, or the nearest
/// ancestor's below `limiter`
pub fn named_page<'a>(
    document: &'a Document,
    node: NodeId,
    limiter: Option<NodeId>,
) -> Option<&'a str> {
    let mut current = Some(node);
    while let Some(id) = current {
        if id != node && Some(id) == limiter {
            return None;
        }
        if let Some(page) = document.attr(id, attrs::PAGE) {
            return Some(page);
        }
        current = document.parent_element(id);
    }
    None
}

/// The page side a node must start on, from its own forced break markers
pub fn required_side(document: &Document, node: NodeId) -> Option<PageSide> {
    previous_break_after(document, node)
        .and_then(BreakValue::side)
        .or_else(|| break_before(document, node).and_then(BreakValue::side))
}

/// Rewrite break-after markers into the form the flow reads.
///
/// `data-break-after` becomes `data-previous-break-after` on the next
/// significant sibling, or on the next sibling of the nearest ancestor that
/// has one. A forced `data-break-before` on a first child is copied up to
/// parents that start with it, so the break lands before the outermost box.
pub fn propagate_break_markers(document: &mut Document) {
    let elements: Vec<NodeId> = document
        .descendants(document.root())
        .filter(|id| document.is_element(*id))
        .collect();

    for node in &elements {
        let Some(value) = document.attr(*node, attrs::BREAK_AFTER).map(str::to_string) else {
            continue;
        };
        let mut current = Some(*node);
        while let Some(id) = current {
            if let Some(next) = document.next_significant(id) {
                if document.is_element(next) && !document.has_attr(next, attrs::PREVIOUS_BREAK_AFTER) {
                    document.set_attr(next, attrs::PREVIOUS_BREAK_AFTER, value.as_str());
                }
                break;
            }
            current = document.parent_element(id);
        }
    }

    for node in &elements {
        if !needs_break_before(document, *node) {
            continue;
        }
        let Some(value) = document.attr(*node, attrs::BREAK_BEFORE).map(str::to_string) else {
            continue;
        };
        let mut child = *node;
        while let Some(parent) = document.parent_element(child) {
            if document.previous_significant(child).is_some() || document.has_attr(parent, attrs::BREAK_BEFORE) {
                break;
            }
            document.set_attr(parent, attrs::BREAK_BEFORE, value.as_str());
            child = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ContentParser;

    #[test]
    fn break_after_moves_to_the_next_box() {
        let mut doc = ContentParser::parse(
            r#"<section><p data-break-after="page">a</p></section><section><p>b</p></section>"#,
        )
        .unwrap();
        propagate_break_markers(&mut doc);
        let sections = doc.elements_by_tag("section");
        assert_eq!(doc.attr(sections[1], attrs::PREVIOUS_BREAK_AFTER), Some("page"));
        assert!(needs_previous_break_after(&doc, sections[1]));
        assert!(should_break(&doc, sections[1], None));
    }

    #[test]
    fn first_child_breaks_once() {
        let mut doc = ContentParser::parse(
            r#"<p>intro</p><div><h1 data-break-before="right">Title</h1><p>text</p></div>"#,
        )
        .unwrap();
        propagate_break_markers(&mut doc);
        let div = doc.elements_by_tag("div")[0];
        let h1 = doc.elements_by_tag("h1")[0];
        assert_eq!(doc.attr(div, attrs::BREAK_BEFORE), Some("right"));
        assert!(should_break(&doc, div, None));
        assert!(!should_break(&doc, h1, Some(div)));
        assert_eq!(required_side(&doc, div), Some(PageSide::Right));
    }

    #[test]
    fn named_page_changes_force_breaks() {
        let doc = ContentParser::parse(
            r#"<p>front</p><section data-page="chapter"><p>one</p><p>two</p></section>"#,
        )
        .unwrap();
        let section = doc.elements_by_tag("section")[0];
        let paragraphs = doc.elements_by_tag("p");
        assert!(should_break(&doc, section, None));
        assert!(!should_break(&doc, paragraphs[2], Some(section)));
        assert_eq!(named_page(&doc, paragraphs[1], None), Some("chapter"));
    }

    #[test]
    fn sides_alternate() {
        assert_eq!(PageSide::of_page(1), PageSide::Right);
        assert_eq!(PageSide::of_page(2), PageSide::Left);
        assert_eq!("verso".parse::<BreakValue>().unwrap().side(), Some(PageSide::Left));
        assert!(!BreakValue::Avoid.is_forced());
    }
}
