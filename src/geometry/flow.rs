use super::style::{self, ComputedStyle, Display};
use super::GeometryProvider;
use crate::document::{Document, NodeId};
use crate::rect::Rect;
use crate::units::Pt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const TABSIZE: usize = 4;
const PRESERVE_WHITESPACE: &[&str] = &["pre", "textarea", "listing", "plaintext", "xmp"];

/// Fixed advance of every glyph and height of every line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowMetrics {
    pub char_width: Pt,
    pub line_height: Pt,
}

impl Default for FlowMetrics {
    fn default() -> Self {
        FlowMetrics {
            char_width: Pt(6.0),
            line_height: Pt(12.0),
        }
    }
}

/// A monospaced block-flow layout of a [`Document`].
///
/// Blocks stack downwards at the full width of their container, inline
/// content wraps at whitespace, after hyphens and at soft hyphens (falling
/// back to breaking between chars), tables get equal-width columns with
/// colspan and rowspan, and images take the size of their `width`/`height`
/// attributes. A document's root is placed in its frame; documents without
/// one start at the origin with the provider's default width.
///
/// Layouts are cached per document revision, so repeated queries against an
/// unchanged tree are cheap.
#[derive(Debug)]
pub struct FlowGeometry {
    metrics: FlowMetrics,
    width: Pt,
    cache: RefCell<Option<Rc<FlowBoxes>>>,
}

impl Default for FlowGeometry {
    fn default() -> Self {
        FlowGeometry::new(FlowMetrics::default())
    }
}

impl FlowGeometry {
    pub fn new(metrics: FlowMetrics) -> FlowGeometry {
        FlowGeometry {
            metrics,
            width: Pt(6.5 * 72.0),
            cache: RefCell::new(None),
        }
    }

    pub fn metrics(&self) -> FlowMetrics {
        self.metrics
    }

    pub fn set_metrics(&mut self, metrics: FlowMetrics) {
        self.metrics = metrics;
        self.cache.replace(None);
    }

    /// Width used for documents that have no frame
    pub fn with_default_width(mut self, width: Pt) -> Self {
        self.width = width;
        self.cache.replace(None);
        self
    }

    fn boxes(&self, document: &Document) -> Rc<FlowBoxes> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            if cached.document == document.id() && cached.revision == document.revision() {
                return Rc::clone(cached);
            }
        }
        let computed = Rc::new(self.compute(document));
        self.cache.replace(Some(Rc::clone(&computed)));
        computed
    }

    fn compute(&self, document: &Document) -> FlowBoxes {
        let frame = document
            .frame()
            .unwrap_or_else(|| Rect::from_origin(Pt(0.0), Pt(0.0), self.width, Pt(0.0)));
        let mut flow = Flow {
            document,
            metrics: self.metrics,
            boxes: HashMap::new(),
        };
        let root = document.root();
        let height = flow.block_children(root, frame.x1, frame.y1, frame.width());
        flow.boxes.insert(
            root,
            NodeBox::block(
                Rect::from_origin(frame.x1, frame.y1, frame.width(), height),
                (frame.width(), height),
            ),
        );
        log::trace!(
            "flowed document {} revision {} to {}",
            document.id(),
            document.revision(),
            height
        );
        FlowBoxes {
            document: document.id(),
            revision: document.revision(),
            boxes: flow.boxes,
        }
    }
}

impl GeometryProvider for FlowGeometry {
    fn bounding_box(&self, document: &Document, node: NodeId) -> Rect {
        self.boxes(document)
            .boxes
            .get(&node)
            .map(|b| b.rect)
            .unwrap_or_default()
    }

    fn client_rects(&self, document: &Document, node: NodeId) -> Vec<Rect> {
        let boxes = self.boxes(document);
        match boxes.boxes.get(&node) {
            Some(b) if !b.lines.is_empty() => b.lines.clone(),
            Some(b) => vec![b.rect],
            None => Vec::new(),
        }
    }

    fn text_range_box(&self, document: &Document, text: NodeId, start: usize, end: usize) -> Rect {
        let boxes = self.boxes(document);
        let Some(b) = boxes.boxes.get(&text) else {
            return Rect::default();
        };
        let end = end.min(b.glyphs.len());
        let start = start.min(end);
        let covered = b.glyphs[start..end]
            .iter()
            .flatten()
            .copied()
            .reduce(|a, r| a.union(&r));
        if let Some(rect) = covered {
            return rect;
        }
        // collapsed whitespace sits where the next visible glyph starts
        if let Some(next) = b.glyphs[end..].iter().flatten().next() {
            return Rect {
                x2: next.x1,
                ..*next
            };
        }
        if let Some(previous) = b.glyphs[..start].iter().rev().flatten().next() {
            return Rect {
                x1: previous.x2,
                ..*previous
            };
        }
        b.rect
    }

    fn computed_style(&self, document: &Document, node: NodeId) -> ComputedStyle {
        ComputedStyle::from_inline(document, node)
    }

    fn scroll_size(&self, document: &Document, node: NodeId) -> (Pt, Pt) {
        self.boxes(document)
            .boxes
            .get(&node)
            .map(|b| b.scroll.unwrap_or((b.rect.width(), b.rect.height())))
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct FlowBoxes {
    document: u64,
    revision: u64,
    boxes: HashMap<NodeId, NodeBox>,
}

#[derive(Debug, Clone, Default)]
struct NodeBox {
    rect: Rect,
    scroll: Option<(Pt, Pt)>,
    /// Line boxes of inline content
    lines: Vec<Rect>,
    /// Per-char boxes of a text node, `None` where whitespace collapsed
    glyphs: Vec<Option<Rect>>,
}

impl NodeBox {
    fn block(rect: Rect, scroll: (Pt, Pt)) -> NodeBox {
        NodeBox {
            rect,
            scroll: Some(scroll),
            ..NodeBox::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Item {
    Glyph(char),
    LineBreak,
}

#[derive(Debug, Clone, Copy)]
struct Placed {
    line: usize,
    x: Pt,
    width: Pt,
}

struct Flow<'a> {
    document: &'a Document,
    metrics: FlowMetrics,
    boxes: HashMap<NodeId, NodeBox>,
}

impl Flow<'_> {
    fn preformatted(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if self
                .document
                .tag(id)
                .is_some_and(|tag| PRESERVE_WHITESPACE.contains(&tag))
            {
                return true;
            }
            if style::property(self.document, id, "white-space").is_some_and(|v| v.starts_with("pre")) {
                return true;
            }
            current = self.document.parent(id);
        }
        false
    }

    fn is_inline_level(&self, node: NodeId) -> bool {
        !self.document.is_element(node)
            || ComputedStyle::from_inline(self.document, node).display == Display::Inline
    }

    /// Stack the children of `parent`, returning the height they take
    fn block_children(&mut self, parent: NodeId, x: Pt, y: Pt, width: Pt) -> Pt {
        let preformatted = self.preformatted(parent);
        let mut cursor = y;
        let mut run: Vec<NodeId> = Vec::new();
        for child in self.document.children(parent).to_vec() {
            if self.document.is_element(child)
                && ComputedStyle::from_inline(self.document, child).display == Display::None
            {
                self.collapse(child, x, cursor);
                continue;
            }
            if self.is_inline_level(child) {
                run.push(child);
                continue;
            }
            if !run.is_empty() {
                cursor += self.inline_run(&run, x, cursor, width, preformatted);
                run.clear();
            }
            cursor += self.block(child, x, cursor, width);
        }
        if !run.is_empty() {
            cursor += self.inline_run(&run, x, cursor, width, preformatted);
        }
        cursor - y
    }

    fn block(&mut self, node: NodeId, x: Pt, y: Pt, width: Pt) -> Pt {
        let doc = self.document;
        let style = ComputedStyle::from_inline(doc, node);
        let height = match doc.tag(node) {
            Some("img") => self.image(node, x, y, width),
            Some("table") => self.table(node, x, y, width),
            _ => {
                let content = self.block_children(node, x, y, width);
                let height = self.explicit_length(node, "height").unwrap_or(content);
                self.boxes.insert(
                    node,
                    NodeBox::block(
                        Rect::from_origin(x, y, width, height),
                        (width, content.max(height)),
                    ),
                );
                height
            }
        };
        if style.is_floating() {
            Pt(0.0)
        } else {
            height
        }
    }

    fn explicit_length(&self, node: NodeId, name: &str) -> Option<Pt> {
        style::property(self.document, node, name)
            .and_then(|value| style::parse_length(&value))
            .or_else(|| {
                self.document
                    .attr(node, name)
                    .and_then(style::parse_length)
            })
    }

    fn image(&mut self, node: NodeId, x: Pt, y: Pt, width: Pt) -> Pt {
        let w = self.explicit_length(node, "width").unwrap_or(width);
        let h = self.explicit_length(node, "height").unwrap_or(Pt(0.0));
        self.boxes
            .insert(node, NodeBox::block(Rect::from_origin(x, y, w, h), (w, h)));
        h
    }

    /// Zero-sized boxes for a subtree that isn't displayed
    fn collapse(&mut self, node: NodeId, x: Pt, y: Pt) {
        let nodes: Vec<NodeId> = std::iter::once(node)
            .chain(self.document.descendants(node))
            .collect();
        for id in nodes {
            let glyphs = self
                .document
                .text(id)
                .map(|t| vec![None; t.chars().count()])
                .unwrap_or_default();
            self.boxes.insert(
                id,
                NodeBox {
                    rect: Rect::point(x, y),
                    glyphs,
                    ..NodeBox::default()
                },
            );
        }
    }

    fn collect_inline(&self, node: NodeId, items: &mut Vec<Item>, spans: &mut Vec<(NodeId, usize, usize)>) {
        let start = items.len();
        let doc = self.document;
        if let Some(text) = doc.text(node) {
            items.extend(text.chars().map(Item::Glyph));
        } else if doc.is_tag(node, "br") {
            items.push(Item::LineBreak);
        } else if doc.is_element(node)
            && ComputedStyle::from_inline(doc, node).display != Display::None
        {
            for child in doc.children(node) {
                self.collect_inline(*child, items, spans);
            }
        }
        spans.push((node, start, items.len()));
    }

    fn advance(&self, ch: char, preformatted: bool) -> Pt {
        match ch {
            '\u{AD}' | '\r' | '\u{200B}' => Pt(0.0),
            '\t' if preformatted => self.metrics.char_width * TABSIZE as f32,
            _ => self.metrics.char_width,
        }
    }

    /// Assign every item a line and an x position. Break opportunities are
    /// remembered as the line fills; on overflow the line is rewound to the
    /// last one, or broken right before the overflowing char if there is none.
    fn break_lines(&self, items: &[Item], left: Pt, width: Pt, preformatted: bool) -> Vec<Option<Placed>> {
        let right = left + width;
        let mut placed: Vec<Option<Placed>> = vec![None; items.len()];
        let mut line = 0usize;
        let mut pen = left;
        let mut has_content = false;
        let mut prev_space = false;
        let mut last_break: Option<usize> = None;

        let mut i = 0usize;
        while i < items.len() {
            let ch = match items[i] {
                Item::Glyph('\n') if preformatted => None,
                Item::Glyph(ch) => Some(ch),
                Item::LineBreak => None,
            };
            let Some(ch) = ch else {
                placed[i] = Some(Placed {
                    line,
                    x: pen,
                    width: Pt(0.0),
                });
                line += 1;
                pen = left;
                has_content = false;
                prev_space = false;
                last_break = None;
                i += 1;
                continue;
            };

            let collapsible = !preformatted && matches!(ch, ' ' | '\t' | '\n' | '\r');
            if collapsible && (!has_content || prev_space) {
                i += 1;
                continue;
            }

            let advance = self.advance(ch, preformatted);
            if pen + advance > right && has_content && !collapsible {
                if let Some(resume) = last_break.take() {
                    for slot in &mut placed[resume..i] {
                        *slot = None;
                    }
                    i = resume;
                }
                line += 1;
                pen = left;
                has_content = false;
                prev_space = false;
                continue;
            }

            placed[i] = Some(Placed {
                line,
                x: pen,
                width: advance,
            });
            pen += advance;
            has_content = true;
            prev_space = collapsible;
            if collapsible || ch == '-' || ch == '\u{AD}' || (preformatted && ch == ' ') {
                last_break = Some(i + 1);
            }
            i += 1;
        }
        placed
    }

    fn inline_run(&mut self, run: &[NodeId], x: Pt, y: Pt, width: Pt, preformatted: bool) -> Pt {
        let mut items: Vec<Item> = Vec::new();
        let mut spans: Vec<(NodeId, usize, usize)> = Vec::new();
        for node in run {
            self.collect_inline(*node, &mut items, &mut spans);
        }
        let placed = self.break_lines(&items, x, width, preformatted);
        let line_height = self.metrics.line_height;
        let rect_of = |p: &Placed| {
            Rect::from_origin(p.x, y + line_height * p.line as f32, p.width, line_height)
        };

        for (node, start, end) in spans {
            let mut lines: Vec<(usize, Rect)> = Vec::new();
            for p in placed[start..end].iter().flatten() {
                let rect = rect_of(p);
                match lines.last_mut() {
                    Some((line, acc)) if *line == p.line => *acc = acc.union(&rect),
                    _ => lines.push((p.line, rect)),
                }
            }
            let rect = lines
                .iter()
                .map(|(_, r)| *r)
                .reduce(|a, r| a.union(&r))
                .unwrap_or_else(|| {
                    // nothing visible: sit where the surrounding content continues
                    placed[start..]
                        .iter()
                        .flatten()
                        .next()
                        .map(|p| Rect::point(p.x, y + line_height * p.line as f32))
                        .or_else(|| {
                            placed[..start].iter().rev().flatten().next().map(|p| {
                                Rect::point(p.x + p.width, y + line_height * p.line as f32)
                            })
                        })
                        .unwrap_or_else(|| Rect::point(x, y))
                });
            let glyphs = if self.document.is_text(node) {
                placed[start..end].iter().map(|p| p.as_ref().map(rect_of)).collect()
            } else {
                Vec::new()
            };
            self.boxes.insert(
                node,
                NodeBox {
                    rect,
                    scroll: None,
                    lines: lines.into_iter().map(|(_, r)| r).collect(),
                    glyphs,
                },
            );
        }

        placed
            .iter()
            .flatten()
            .map(|p| p.line + 1)
            .max()
            .map(|lines| line_height * lines as f32)
            .unwrap_or(Pt(0.0))
    }

    fn table(&mut self, table: NodeId, x: Pt, y: Pt, width: Pt) -> Pt {
        let doc = self.document;
        let mut rows: Vec<NodeId> = Vec::new();
        let mut groups: Vec<(NodeId, usize, usize)> = Vec::new();
        let mut cursor = y;
        for child in doc.children(table).to_vec() {
            match doc.tag(child) {
                Some("tr") => rows.push(child),
                Some("thead") | Some("tbody") | Some("tfoot") => {
                    let first = rows.len();
                    rows.extend(doc.children(child).iter().filter(|c| doc.is_tag(**c, "tr")));
                    groups.push((child, first, rows.len()));
                }
                Some(_) if rows.is_empty() => cursor += self.block(child, x, cursor, width),
                _ => self.collapse(child, x, cursor),
            }
        }

        // place cells on the grid, skipping slots taken by earlier rowspans
        let mut occupied: Vec<Vec<bool>> = vec![Vec::new(); rows.len()];
        let mut cells: Vec<(NodeId, usize, usize, usize, usize)> = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            let mut column = 0usize;
            for cell in doc.children(*row).to_vec() {
                if !(doc.is_tag(cell, "td") || doc.is_tag(cell, "th")) {
                    self.collapse(cell, x, cursor);
                    continue;
                }
                while occupied[r].get(column).copied().unwrap_or(false) {
                    column += 1;
                }
                let colspan = span(doc, cell, "colspan");
                let rowspan = span(doc, cell, "rowspan").min(rows.len() - r);
                for slots in occupied.iter_mut().skip(r).take(rowspan) {
                    if slots.len() < column + colspan {
                        slots.resize(column + colspan, false);
                    }
                    for slot in slots.iter_mut().skip(column).take(colspan) {
                        *slot = true;
                    }
                }
                cells.push((cell, r, column, colspan, rowspan));
                column += colspan;
            }
        }
        let columns = occupied.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let column_width = width / columns as f32;

        let mut row_heights = vec![Pt(0.0); rows.len()];
        let mut spanning: Vec<(usize, usize, Pt)> = Vec::new();
        for (cell, r, column, colspan, rowspan) in &cells {
            let cell_x = x + column_width * *column as f32;
            let height = self.block_children(*cell, cell_x, Pt(0.0), column_width * *colspan as f32);
            let height = self.explicit_length(*cell, "height").unwrap_or(height).max(height);
            if *rowspan == 1 {
                row_heights[*r] = row_heights[*r].max(height);
            } else {
                spanning.push((*r, *rowspan, height));
            }
        }
        for (r, rowspan, height) in spanning {
            let covered: Pt = row_heights[r..r + rowspan].iter().copied().sum();
            if height > covered {
                row_heights[r + rowspan - 1] += height - covered;
            }
        }

        let mut row_tops = Vec::with_capacity(rows.len());
        let mut top = cursor;
        for (r, row) in rows.iter().enumerate() {
            row_tops.push(top);
            self.boxes.insert(
                *row,
                NodeBox::block(
                    Rect::from_origin(x, top, width, row_heights[r]),
                    (width, row_heights[r]),
                ),
            );
            top += row_heights[r];
        }
        for (cell, r, column, colspan, rowspan) in cells {
            let cell_x = x + column_width * column as f32;
            let cell_width = column_width * colspan as f32;
            let height: Pt = row_heights[r..r + rowspan].iter().copied().sum();
            let content = self.block_children(cell, cell_x, row_tops[r], cell_width);
            self.boxes.insert(
                cell,
                NodeBox::block(
                    Rect::from_origin(cell_x, row_tops[r], cell_width, height),
                    (cell_width, content.max(height)),
                ),
            );
        }
        for (group, first, last) in groups {
            let rect = if first < last {
                Rect::from_origin(x, row_tops[first], width, row_tops[last - 1] + row_heights[last - 1] - row_tops[first])
            } else {
                Rect::point(x, top)
            };
            self.boxes.insert(group, NodeBox::block(rect, (rect.width(), rect.height())));
        }

        let height = top - y;
        self.boxes.insert(
            table,
            NodeBox::block(Rect::from_origin(x, y, width, height), (width, height)),
        );
        height
    }
}

fn span(document: &Document, cell: NodeId, name: &str) -> usize {
    document
        .attr(cell, name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ContentParser;

    fn framed(markup: &str, width: f32) -> Document {
        let mut doc = ContentParser::parse(markup).unwrap();
        doc.set_frame(Rect::from_origin(Pt(10.0), Pt(20.0), Pt(width), Pt(1000.0)));
        doc
    }

    #[test]
    fn blocks_stack_and_text_wraps_at_spaces() {
        // 10 chars per line
        let doc = framed("<p>aaaa bbbb cccc</p><div style=\"height: 30pt\"></div><p>x</p>", 60.0);
        let geometry = FlowGeometry::default();
        let p = doc.elements_by_tag("p");
        let first = geometry.bounding_box(&doc, p[0]);
        assert_eq!(first.top(), Pt(20.0));
        assert_eq!(first.height(), Pt(24.0));
        let text = doc.first_child(p[0]).unwrap();
        let lines = geometry.client_rects(&doc, text);
        assert_eq!(lines.len(), 2);
        // "cccc" moved to the second line
        let word = geometry.text_range_box(&doc, text, 10, 14);
        assert_eq!(word.top(), Pt(32.0));
        assert_eq!(word.left(), Pt(10.0));

        let second = geometry.bounding_box(&doc, p[1]);
        assert_eq!(second.top(), Pt(20.0 + 24.0 + 30.0));
        assert_eq!(geometry.bounding_box(&doc, doc.root()).height(), Pt(24.0 + 30.0 + 12.0));
    }

    #[test]
    fn soft_hyphen_is_a_break_opportunity() {
        // "xxxxx exam" fills the first line exactly
        let doc = framed("<p>xxxxx exam\u{AD}ple</p>", 60.0);
        let geometry = FlowGeometry::default();
        let p = doc.elements_by_tag("p")[0];
        let text = doc.first_child(p).unwrap();
        let tail = geometry.text_range_box(&doc, text, 11, 14);
        assert_eq!(tail.top(), Pt(32.0));
        assert_eq!(tail.left(), Pt(10.0));
        let head = geometry.text_range_box(&doc, text, 6, 10);
        assert_eq!(head.top(), Pt(20.0));
    }

    #[test]
    fn long_words_break_between_chars() {
        let doc = framed("<p>abcdefghijklmno</p>", 60.0);
        let geometry = FlowGeometry::default();
        let text = doc.first_child(doc.elements_by_tag("p")[0]).unwrap();
        assert_eq!(geometry.client_rects(&doc, text).len(), 2);
        assert_eq!(geometry.text_range_box(&doc, text, 10, 11).top(), Pt(32.0));
    }

    #[test]
    fn rowspans_extend_rows() {
        let doc = framed(
            "<table><tr><td>a</td><td rowspan=\"2\">b<br>c<br>d</td></tr><tr><td>e</td></tr></table>",
            120.0,
        );
        let geometry = FlowGeometry::default();
        let rows = doc.elements_by_tag("tr");
        let cells = doc.elements_by_tag("td");
        assert_eq!(geometry.bounding_box(&doc, rows[0]).height(), Pt(12.0));
        assert_eq!(geometry.bounding_box(&doc, rows[1]).height(), Pt(24.0));
        assert_eq!(geometry.bounding_box(&doc, cells[1]).left(), Pt(70.0));
        assert_eq!(geometry.bounding_box(&doc, cells[2]).top(), Pt(32.0));
        assert_eq!(geometry.bounding_box(&doc, doc.elements_by_tag("table")[0]).height(), Pt(36.0));
    }

    #[test]
    fn images_and_hidden_content() {
        let doc = framed(
            "<img width=\"40\" height=\"100\"><div style=\"display:none\"><p>gone</p></div><p>after</p>",
            120.0,
        );
        let geometry = FlowGeometry::default();
        let img = doc.elements_by_tag("img")[0];
        assert_eq!(geometry.bounding_box(&doc, img).height(), Pt(100.0));
        assert_eq!(geometry.bounding_box(&doc, img).width(), Pt(40.0));
        let paragraphs = doc.elements_by_tag("p");
        assert_eq!(geometry.bounding_box(&doc, paragraphs[0]).height(), Pt(0.0));
        assert_eq!(geometry.bounding_box(&doc, paragraphs[1]).top(), Pt(120.0));
    }

    #[test]
    fn cache_follows_revisions() {
        let mut doc = framed("<p>one</p>", 120.0);
        let geometry = FlowGeometry::default();
        assert_eq!(geometry.bounding_box(&doc, doc.root()).height(), Pt(12.0));
        let p = doc.create_element("p");
        let text = doc.create_text("two");
        doc.append_child(p, text);
        doc.append_child(doc.root(), p);
        assert_eq!(geometry.bounding_box(&doc, doc.root()).height(), Pt(24.0));
    }
}
