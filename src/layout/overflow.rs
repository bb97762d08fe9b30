//! Finding where rendered content leaves the page, and turning that place
//! into a position in the source tree.

use super::Layout;
use crate::document::{attrs, Document, NodeId};
use crate::rect::Rect;
use crate::token::{BreakToken, Overflow, OverflowRange};
use crate::units::Pt;

const WORD_JOINERS: [char; 2] = ['_', '\u{AD}'];

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || WORD_JOINERS.contains(&ch)
}

/// Edges of the page a rendered box is tested against
#[derive(Debug, Clone, Copy)]
struct Edges {
    end: Pt,
    v_end: Pt,
}

impl Edges {
    /// The box starts at or beyond an edge
    fn past(&self, rect: &Rect) -> bool {
        rect.left().round() >= self.end || rect.top().round() >= self.v_end
    }

    /// Some of the box is beyond the bottom edge, or all of it beyond the
    /// right one
    fn crossing(&self, rect: &Rect) -> bool {
        self.past(rect) || rect.bottom().floor() > self.v_end
    }
}

impl Layout<'_> {
    /// Whether the content of `node` is bigger than `bounds`
    pub fn has_overflow(&self, rendered: &Document, node: NodeId, bounds: Rect) -> bool {
        let rect = self.geometry.bounding_box(rendered, node);
        let (scroll_width, scroll_height) = self.geometry.scroll_size(rendered, node);
        let width = rect.width().floor().max(scroll_width.floor());
        let height = rect.height().floor().max(scroll_height.floor());
        width > bounds.width().round() || height > bounds.height().round()
    }

    /// Locate the first rendered content that doesn't fit in `bounds`. The
    /// returned range runs from there to the end of the rendered tree.
    pub fn find_overflow(&self, rendered: &Document, bounds: Rect) -> Option<Overflow> {
        let root = rendered.root();
        if !self.has_overflow(rendered, root, bounds) {
            return None;
        }
        let edges = Edges {
            end: (bounds.right() + self.settings.gap).round(),
            v_end: bounds.bottom().round(),
        };

        let mut next = rendered.first_child(root);
        while let Some(node) = next {
            let skip = rendered.following(node, root);
            if rendered.is_ignorable(node) {
                next = skip;
                continue;
            }
            let rect = self.geometry.bounding_box(rendered, node);

            if rendered.is_text(node) {
                let last_line = self
                    .geometry
                    .client_rects(rendered, node)
                    .into_iter()
                    .filter(|r| r.height() > Pt(0.0))
                    .reduce(|a, r| if r.top() >= a.top() { r } else { a });
                if last_line.is_some_and(|line| edges.crossing(&line)) {
                    return match self.text_break(rendered, node, edges) {
                        Some(offset) if offset > 0 => Some(text_overflow(rendered, node, offset)),
                        _ => Some(overflow_before(rendered, node)),
                    };
                }
                next = skip;
                continue;
            }

            if !rendered.is_element(node) || !edges.crossing(&rect) {
                next = skip;
                continue;
            }

            let style = self.geometry.computed_style(rendered, node);
            if style.is_floating() || rendered.is_tag(node, "br") || rendered.is_tag(node, "wbr") {
                next = skip;
                continue;
            }

            if let Some(unit) = self.avoid_unit(rendered, node) {
                log::trace!("backing up to avoid-break unit {:?}", rendered.node_ref(unit));
                return Some(overflow_before(rendered, unit));
            }

            let leaf = rendered
                .children(node)
                .iter()
                .all(|child| rendered.is_ignorable(*child));
            let avoid = style.avoids_break_inside() && can_back_up_to(rendered, node);
            if edges.past(&rect) || leaf || avoid {
                let unit = keep_with_previous(rendered, node).unwrap_or(node);
                return Some(overflow_before(rendered, unit));
            }

            next = rendered.first_child(node).or(skip);
        }
        None
    }

    /// Units a crossing table part has to move with: the row of a cell that
    /// avoids breaks, a row group that avoids breaks, or the last row that
    /// covers every column when the crossing row is shortened by a rowspan
    fn avoid_unit(&self, rendered: &Document, node: NodeId) -> Option<NodeId> {
        let tag = rendered.tag(node)?;
        let candidate = match tag {
            "td" | "th" if self.geometry.computed_style(rendered, node).avoids_break_inside() => {
                rendered.parent_element(node).filter(|row| rendered.is_tag(*row, "tr"))
            }
            "tr" => {
                let group = rendered.parent_element(node).filter(|g| {
                    (rendered.is_tag(*g, "tbody") || rendered.is_tag(*g, "thead"))
                        && self.geometry.computed_style(rendered, *g).avoids_break_inside()
                });
                group.or_else(|| full_row_before(rendered, node))
            }
            _ => None,
        };
        candidate.filter(|unit| can_back_up_to(rendered, *unit))
    }

    /// Char offset of the first char of `text` past the edges. Words are
    /// probed first so only one word is measured char by char; inside `pre`
    /// the whole text counts as one word.
    fn text_break(&self, rendered: &Document, text: NodeId, edges: Edges) -> Option<usize> {
        let chars: Vec<char> = rendered.text(text)?.chars().collect();
        let words = if rendered.closest(text, "pre", None).is_some() {
            vec![(0, chars.len())]
        } else {
            word_ranges(&chars)
        };
        for (start, end) in words {
            let word = self.geometry.text_range_box(rendered, text, start, end);
            if !edges.crossing(&word) {
                continue;
            }
            for index in start..end {
                // a page never starts with a soft hyphen
                if chars[index] == '\u{AD}' {
                    continue;
                }
                let letter = self.geometry.text_range_box(rendered, text, index, index + 1);
                if edges.crossing(&letter) {
                    return Some(index);
                }
            }
            return Some(start);
        }
        None
    }

    /// Map the start of an overflow range back to the source tree
    pub fn create_break_token(
        &self,
        overflow: &Overflow,
        rendered: &Document,
        source: &Document,
    ) -> Option<BreakToken> {
        let OverflowRange {
            start_container: container,
            start_offset: offset,
            ..
        } = overflow.range;

        if rendered.is_text(container) {
            let node_ref = rendered.node_ref(container)?;
            source.find_by_ref(node_ref)?;
            return Some(BreakToken::new(
                node_ref.clone(),
                Some(rendered.text_offset(container) + offset),
            ));
        }

        let Some(child) = rendered.child(container, offset) else {
            return token_after_previous(rendered, source, container, offset);
        };
        let Some(node_ref) = rendered.node_ref(child) else {
            return token_after_previous(rendered, source, container, offset);
        };
        source.find_by_ref(node_ref)?;

        if rendered.is_text(child) {
            if rendered.text_offset(child) > 0 {
                return Some(BreakToken::new(node_ref.clone(), Some(rendered.text_offset(child))));
            }
            // a leading text node is never split off its parent
            let resumes_parent = offset == 0
                && !rendered.is_root(container)
                && !rendered.has_attr(container, attrs::SPLIT_FROM);
            if resumes_parent {
                let parent_ref = rendered.node_ref(container)?;
                return Some(BreakToken::new(parent_ref.clone(), None));
            }
        }
        Some(BreakToken::new(node_ref.clone(), None))
    }

    /// Cut the overflow out of the rendered tree and hyphenate the cut.
    /// Returns the detached fragment holding what was removed.
    pub(crate) fn remove_overflow(&self, rendered: &mut Document, overflow: &Overflow) -> NodeId {
        let range = overflow.range;
        let break_letter = rendered
            .text(range.start_container)
            .and_then(|text| text.chars().nth(range.start_offset));
        let fragment = rendered.extract_from(range.start_container, range.start_offset);
        self.hyphenate(rendered, range.start_container, break_letter);
        prune_empty(rendered, range.start_container);
        fragment
    }

    fn hyphenate(&self, rendered: &mut Document, container: NodeId, break_letter: Option<char>) {
        let Some(text) = rendered.text(container) else {
            return;
        };
        let Some(previous) = text.chars().last() else {
            return;
        };
        let mid_word = match break_letter {
            Some(letter) => is_word_char(previous) && is_word_char(letter),
            None => is_word_char(previous),
        };
        if !mid_word || self.settings.hyphen_glyph.is_empty() {
            return;
        }
        let mut hyphenated = text.to_string();
        let mut added = self.settings.hyphen_glyph.chars().count();
        if previous == '\u{AD}' {
            hyphenated.pop();
            added = added.saturating_sub(1);
        }
        hyphenated.push_str(&self.settings.hyphen_glyph);
        rendered.set_text(container, hyphenated);
        if let Some(parent) = rendered.parent_element(container) {
            rendered.set_attr(parent, attrs::HYPHEN, added.to_string());
        }
    }
}

/// Maximal runs of non-whitespace chars
fn word_ranges(chars: &[char]) -> Vec<(usize, usize)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (index, ch) in chars.iter().enumerate() {
        match (ch.is_whitespace(), start) {
            (false, None) => start = Some(index),
            (true, Some(s)) => {
                words.push((s, index));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, chars.len()));
    }
    words
}

fn overflow_before(rendered: &Document, node: NodeId) -> Overflow {
    let root = rendered.root();
    let parent = rendered.parent(node).unwrap_or(root);
    let index = rendered.index_in_parent(node).unwrap_or(0);
    Overflow {
        node,
        offset: None,
        range: OverflowRange {
            start_container: parent,
            start_offset: index,
            end_container: root,
            end_offset: rendered.children(root).len(),
        },
        top_level: parent == root,
    }
}

fn text_overflow(rendered: &Document, text: NodeId, offset: usize) -> Overflow {
    let root = rendered.root();
    Overflow {
        node: text,
        offset: Some(offset),
        range: OverflowRange {
            start_container: text,
            start_offset: offset,
            end_container: root,
            end_offset: rendered.children(root).len(),
        },
        top_level: rendered.parent(text) == Some(root),
    }
}

/// Moving a unit that already starts the page, or that is itself the rest
/// of a split box, would leave the page without progress
fn can_back_up_to(rendered: &Document, unit: NodeId) -> bool {
    if rendered.has_attr(unit, attrs::SPLIT_FROM) {
        return false;
    }
    let mut current = unit;
    loop {
        if rendered.previous_significant(current).is_some() {
            return true;
        }
        match rendered.parent(current) {
            Some(parent) if !rendered.is_root(parent) => current = parent,
            _ => return false,
        }
    }
}

/// The box before `node` when `node` must not be separated from it
fn keep_with_previous(rendered: &Document, node: NodeId) -> Option<NodeId> {
    let avoid = |name: &str| {
        rendered
            .attr(node, name)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("avoid"))
    };
    if !(avoid(attrs::BREAK_BEFORE) || avoid(attrs::PREVIOUS_BREAK_AFTER)) {
        return None;
    }
    rendered
        .node_before(node, Some(rendered.root()))
        .filter(|previous| rendered.is_element(*previous) && can_back_up_to(rendered, *previous))
}

fn row_width(rendered: &Document, row: NodeId) -> usize {
    rendered
        .children(row)
        .iter()
        .filter(|cell| rendered.is_tag(**cell, "td") || rendered.is_tag(**cell, "th"))
        .map(|cell| {
            rendered
                .attr(*cell, "colspan")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(1)
                .max(1)
        })
        .sum()
}

/// Full column count of a table: the widest rendered row
pub(crate) fn column_count(rendered: &Document, table: NodeId) -> usize {
    rendered
        .descendants(table)
        .filter(|node| rendered.is_tag(*node, "tr"))
        .map(|row| row_width(rendered, row))
        .max()
        .unwrap_or(0)
}

/// When `row` is missing cells because a rowspan from above covers them,
/// the closest previous row that spans every column
fn full_row_before(rendered: &Document, row: NodeId) -> Option<NodeId> {
    let table = rendered.closest(row, "table", None)?;
    let spans_rows = rendered.descendants(table).any(|cell| {
        rendered
            .attr(cell, "rowspan")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .is_some_and(|span| span > 1)
    });
    if !spans_rows {
        return None;
    }
    let columns = column_count(rendered, table);
    if row_width(rendered, row) == columns {
        return None;
    }
    let mut previous = rendered.previous_significant(row);
    while let Some(candidate) = previous {
        if rendered.is_tag(candidate, "tr") && row_width(rendered, candidate) == columns {
            return Some(candidate);
        }
        previous = rendered.previous_significant(candidate);
    }
    None
}

/// Resume after the last rendered node before the break when the break
/// itself carries no ref. `None` while part of that node is still pending.
fn token_after_previous(
    rendered: &Document,
    source: &Document,
    container: NodeId,
    offset: usize,
) -> Option<BreakToken> {
    let previous = rendered.children(container)[..offset.min(rendered.children(container).len())]
        .iter()
        .rev()
        .copied()
        .find(|child| rendered.node_ref(*child).is_some())
        .or_else(|| Some(container).filter(|c| rendered.node_ref(*c).is_some()))?;
    let source_node = source.find_by_ref(rendered.node_ref(previous)?)?;

    if previous != container {
        let rendered_nodes = rendered.descendants(previous).count();
        let source_nodes = source.descendants(source_node).count();
        if rendered_nodes < source_nodes {
            return None;
        }
        let after = source.node_after(source_node, None)?;
        return Some(BreakToken::new(source.node_ref(after)?.clone(), None));
    }
    let first = source.first_child(source_node)?;
    Some(BreakToken::new(source.node_ref(first)?.clone(), None))
}

/// Remove the shells left behind when all of their content was cut away
fn prune_empty(rendered: &mut Document, container: NodeId) {
    let mut current = container;
    if rendered.text(current).is_some_and(str::is_empty) {
        let Some(parent) = rendered.parent(current) else {
            return;
        };
        rendered.detach(current);
        current = parent;
    }
    while rendered.is_element(current) && rendered.children(current).is_empty() {
        let Some(parent) = rendered.parent(current) else {
            return;
        };
        rendered.detach(current);
        current = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_split_on_whitespace() {
        let chars: Vec<char> = "  two words\nhere".chars().collect();
        assert_eq!(word_ranges(&chars), vec![(2, 5), (6, 11), (12, 16)]);
        assert!(is_word_char('\u{AD}'));
        assert!(!is_word_char('-'));
    }
}
