//! Flowing a source tree onto one page.
//!
//! A [`Layout`] walks the source [`Document`] from a [`BreakToken`], cloning
//! nodes into the page's rendered tree until the geometry says the page is
//! full or a forced break is due. It then cuts off whatever doesn't fit and
//! returns the token the next page resumes at.
//!
//! ```
//! use paged_flow::{ContentParser, Document, LayoutSettings, Pt, Rect};
//! use paged_flow::geometry::FlowGeometry;
//! use paged_flow::layout::Layout;
//!
//! let source = ContentParser::parse("<p>aaaa bbbb cccc dddd eeee</p>").expect("valid markup");
//! let bounds = Rect::from_origin(Pt(0.0), Pt(0.0), Pt(60.0), Pt(24.0));
//! let geometry = FlowGeometry::default();
//!
//! let mut page = Document::with_frame(bounds);
//! let mut layout = Layout::new(bounds, LayoutSettings::default(), &geometry);
//! let token = layout
//!     .render_to(&mut page, &source, None)
//!     .into_result()
//!     .expect("fits somewhere")
//!     .expect("doesn't fit on one page");
//! assert_eq!(token.offset, Some(20));
//! ```

mod kind;
mod margins;
mod overflow;
mod tables;

pub use kind::*;
pub use margins::*;

use crate::breaks;
use crate::config::LayoutSettings;
use crate::document::{attrs, Document, NodeId};
use crate::error::PaginationError;
use crate::geometry::GeometryProvider;
use crate::rect::Rect;
use crate::refs::Ref;
use crate::token::{BreakToken, RenderResult};
use std::collections::VecDeque;

/// One pass of the flow into a fixed box
pub struct Layout<'g> {
    bounds: Rect,
    settings: LayoutSettings,
    geometry: &'g dyn GeometryProvider,
    force_render_break: bool,
    break_requests: VecDeque<Ref>,
}

impl<'g> Layout<'g> {
    pub fn new(bounds: Rect, settings: LayoutSettings, geometry: &'g dyn GeometryProvider) -> Layout<'g> {
        Layout {
            bounds,
            settings,
            geometry,
            force_render_break: false,
            break_requests: VecDeque::new(),
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Break before the node carrying `node_ref` once it is reached, unless
    /// it already starts the page. Requests that aren't reached on this page
    /// travel on in the returned token.
    pub fn request_break_at(&mut self, node_ref: Ref) {
        self.break_requests.push_back(node_ref);
    }

    /// End the page right after the next node is appended
    pub fn force_break(&mut self) {
        self.force_render_break = true;
    }

    /// Flow `source` into `dest`, starting at `break_token` or at the top of
    /// the document. The result carries the token the next page starts at,
    /// `None` once everything is placed.
    pub fn render_to(
        &mut self,
        dest: &mut Document,
        source: &Document,
        break_token: Option<&BreakToken>,
    ) -> RenderResult {
        match self.flow(dest, source, break_token) {
            Ok(token) => RenderResult::done(token),
            Err(error) => RenderResult::failed(error),
        }
    }

    fn flow(
        &mut self,
        dest: &mut Document,
        source: &Document,
        break_token: Option<&BreakToken>,
    ) -> Result<Option<BreakToken>, PaginationError> {
        let root = source.root();
        let start = match break_token {
            Some(token) => source
                .find_by_ref(&token.node)
                .ok_or_else(|| PaginationError::UnknownRef(token.node.clone()))?,
            None => match source.first_child(root) {
                Some(first) => first,
                None => return Ok(None),
            },
        };
        let start_position = match break_token {
            Some(token) => Some(token.clone()),
            None => source.node_ref(start).map(|r| BreakToken::new(r.clone(), None)),
        };
        let mut floor = Floor {
            start: start_position.clone(),
            first_leaf: None,
        };

        let mut pending: VecDeque<Ref> = break_token
            .map(|token| token.break_needed_at.clone())
            .unwrap_or_default();
        pending.extend(self.break_requests.drain(..));

        let mut length = 0usize;
        let mut has_rendered_content = false;
        let mut node = Some(start);

        while let Some(current) = node {
            let shallow = source.is_element(current) && NodeKind::of(source, current) == NodeKind::Container;
            let next = if shallow {
                source
                    .first_child(current)
                    .or_else(|| source.following(current, root))
            } else {
                source.following(current, root)
            };

            let requested = source
                .node_ref(current)
                .is_some_and(|r| pending.front() == Some(r));
            if requested && !has_rendered_content {
                pending.pop_front();
            }

            if has_rendered_content && (requested || breaks::should_break(source, current, Some(start))) {
                log::debug!("forced break before {:?}", source.node_ref(current));
                let token = match self.cut(dest, source, &floor)? {
                    Some(token) => token,
                    None => BreakToken::forced(ref_of(source, current)?),
                };
                return Ok(with_pending(Some(token), pending));
            }

            let offset = if current == start {
                break_token.and_then(|t| t.offset)
            } else {
                None
            };
            let rendered = self.append(dest, source, current, shallow, offset);
            if !shallow {
                length += dest.text_content(rendered).chars().count();
            }
            has_rendered_content |= has_content(source, current);
            if floor.first_leaf.is_none() && !shallow && has_content(source, current) {
                floor.first_leaf = if current == start {
                    start_position.clone()
                } else {
                    source.node_ref(current).map(|r| BreakToken::new(r.clone(), None))
                };
            }

            if self.force_render_break {
                self.force_render_break = false;
                let token = match self.cut(dest, source, &floor)? {
                    Some(token) => Some(token),
                    None => match next {
                        Some(next) => Some(BreakToken::forced(ref_of(source, next)?)),
                        None => None,
                    },
                };
                return Ok(with_pending(token, pending));
            }

            if length >= self.settings.max_chars {
                length = 0;
                if let Some(token) = self.cut(dest, source, &floor)? {
                    return Ok(with_pending(Some(token), pending));
                }
            }

            node = next;
        }

        let token = self.cut(dest, source, &floor)?;
        Ok(with_pending(token, pending))
    }

    /// Settle, measure and cut the page at its overflow. A break that would
    /// leave the page without progress skips the stuck node instead.
    fn cut(
        &self,
        dest: &mut Document,
        source: &Document,
        floor: &Floor,
    ) -> Result<Option<BreakToken>, PaginationError> {
        self.settle_images(dest);
        let Some(token) = self.find_break_token(dest, source, self.bounds, None, false) else {
            return Ok(None);
        };
        if floor.holds(&token) {
            return self.skip_stuck(token, dest, source).map(Some);
        }
        let token = self
            .find_break_token(dest, source, self.bounds, None, true)
            .unwrap_or(token);
        self.rebuild_table_from_break_token(&token, dest, source);
        Ok(Some(token))
    }

    /// Clone `node` into `dest` under the counterpart of its source parent,
    /// rebuilding the parent chain when the page starts inside it
    fn append(
        &self,
        dest: &mut Document,
        source: &Document,
        node: NodeId,
        shallow: bool,
        offset: Option<usize>,
    ) -> NodeId {
        let clone = dest.import(source, node, !shallow);
        if let (Some(offset), Some(text)) = (offset.filter(|o| *o > 0), source.text(node)) {
            let rest: String = text.chars().skip(offset).collect();
            dest.set_text(clone, rest);
            dest.set_text_offset(clone, offset);
        }

        let parent = match source.parent(node) {
            Some(parent) if !source.is_root(parent) => match dest.find_counterpart(source, parent) {
                Some(existing) => existing,
                None => self.rebuild_ancestors(dest, source, node),
            },
            _ => dest.root(),
        };
        dest.append_child(parent, clone);
        dest.index_subtree(clone);
        clone
    }

    /// Shallow copies of the ancestors of `node` missing from `dest`,
    /// outermost first. Returns the innermost one.
    fn rebuild_ancestors(&self, dest: &mut Document, source: &Document, node: NodeId) -> NodeId {
        let mut parent = dest.root();
        for ancestor in source.ancestors(node).into_iter().rev() {
            if let Some(existing) = dest.find_counterpart(source, ancestor) {
                parent = existing;
                continue;
            }
            let clone = dest.import(source, ancestor, false);
            if let Some(node_ref) = source.node_ref(ancestor) {
                dest.set_attr(clone, attrs::SPLIT_FROM, node_ref.as_str());
            }
            if let Some(id) = dest.remove_attr(clone, "id") {
                dest.set_attr(clone, attrs::ID, id);
            }
            dest.remove_attr(clone, attrs::BREAK_BEFORE);
            dest.remove_attr(clone, attrs::PREVIOUS_BREAK_AFTER);
            if source.is_tag(ancestor, "ol") {
                if let Some(start) = list_start(source, ancestor, node) {
                    dest.set_attr(clone, "start", start.to_string());
                }
            }
            dest.append_child(parent, clone);
            dest.index_ref(clone);
            parent = clone;
        }
        parent
    }

    /// A token at the page's floor would loop forever: skip the stuck node,
    /// leaving it on this page, or give up when nothing follows it
    fn skip_stuck(
        &self,
        token: BreakToken,
        dest: &mut Document,
        source: &Document,
    ) -> Result<BreakToken, PaginationError> {
        log::warn!("Unable to layout item: {}", token.node);
        let node = source
            .find_by_ref(&token.node)
            .ok_or_else(|| PaginationError::UnknownRef(token.node.clone()))?;
        let Some(after) = source.node_after(node, None) else {
            return Err(PaginationError::unable_to_layout(vec![token.node.clone()]));
        };
        let after_ref = ref_of(source, after)?;

        if let Some(rendered) = dest.find_by_ref(&after_ref) {
            if let (Some(parent), Some(index)) = (dest.parent(rendered), dest.index_in_parent(rendered)) {
                dest.extract_from(parent, index);
            }
        }
        Ok(BreakToken {
            finished: token.finished,
            ..BreakToken::new(after_ref, None)
        })
    }

    /// Measure the overflow of `rendered` against `bounds` and map it to a
    /// source position. With `extract` the overflowing content is also cut
    /// away. A token at the same position as `prev` never extracts, so the
    /// call can be repeated on a settled page without changing it.
    pub fn find_break_token(
        &self,
        rendered: &mut Document,
        source: &Document,
        bounds: Rect,
        prev: Option<&BreakToken>,
        extract: bool,
    ) -> Option<BreakToken> {
        if extract {
            return self
                .break_and_extract(rendered, source, bounds, prev)
                .map(|(token, _)| token);
        }
        let overflow = self.find_overflow(rendered, bounds)?;
        let mut token = self.create_break_token(&overflow, rendered, source)?;
        token.overflow.push(overflow);
        Some(token)
    }

    /// As [`Layout::find_break_token`], also handing back the detached
    /// fragment holding the extracted content
    pub(crate) fn break_and_extract(
        &self,
        rendered: &mut Document,
        source: &Document,
        bounds: Rect,
        prev: Option<&BreakToken>,
    ) -> Option<(BreakToken, Option<NodeId>)> {
        let overflow = self.find_overflow(rendered, bounds)?;
        let mut token = self.create_break_token(&overflow, rendered, source)?;
        token.overflow.push(overflow.clone());
        if prev.is_some_and(|prev| token.same_position(prev)) {
            return Some((token, None));
        }
        let fragment = self.remove_overflow(rendered, &overflow);
        Some((token, Some(fragment)))
    }

    /// The source position right after the last rendered content
    pub fn find_end_token(&self, rendered: &Document, source: &Document) -> Option<BreakToken> {
        let last = rendered
            .descendants(rendered.root())
            .filter(|node| rendered.node_ref(*node).is_some() && !rendered.has_attr(*node, attrs::SPLIT_TO))
            .last()?;
        let node_ref = rendered.node_ref(last)?;
        let source_node = source.find_by_ref(node_ref)?;

        if let Some(text) = rendered.text(last) {
            let hyphens = rendered
                .parent(last)
                .and_then(|parent| rendered.attr(parent, attrs::HYPHEN))
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(0);
            let end = rendered.text_offset(last) + text.chars().count().saturating_sub(hyphens);
            let source_length = source.text(source_node).map_or(0, |t| t.chars().count());
            if end < source_length {
                return Some(BreakToken::new(node_ref.clone(), Some(end)));
            }
        }
        let after = source.node_after(source_node, None)?;
        Some(BreakToken::new(source.node_ref(after)?.clone(), None))
    }

    fn settle_images(&self, dest: &Document) {
        let images = dest.elements_by_tag("img");
        if !images.is_empty() {
            self.geometry.settle_images(dest, &images);
        }
    }
}

fn ref_of(document: &Document, node: NodeId) -> Result<Ref, PaginationError> {
    document.node_ref(node).cloned().ok_or_else(|| {
        PaginationError::Markup("node without a ref; run ContentParser::add over the tree".to_string())
    })
}

/// Positions a break has to move past for the page to count as progress:
/// where the page started and the first leaf placed on it
struct Floor {
    start: Option<BreakToken>,
    first_leaf: Option<BreakToken>,
}

impl Floor {
    fn holds(&self, token: &BreakToken) -> bool {
        [&self.start, &self.first_leaf]
            .into_iter()
            .flatten()
            .any(|position| token.same_position(position))
    }
}

fn with_pending(token: Option<BreakToken>, pending: VecDeque<Ref>) -> Option<BreakToken> {
    token.map(|mut token| {
        token.break_needed_at = pending;
        token
    })
}

/// Ordinal of the first item of `list` shown when the page resumes at `node`
fn list_start(source: &Document, list: NodeId, node: NodeId) -> Option<usize> {
    let first = source
        .attr(list, "start")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1);
    let item = source
        .children(list)
        .iter()
        .copied()
        .find(|child| source.contains(*child, node))?;
    let index = source.index_in_parent(item)?;
    let preceding = source.children(list)[..index]
        .iter()
        .filter(|child| source.is_tag(**child, "li"))
        .count();
    Some(first + preceding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FlowGeometry;
    use crate::parser::ContentParser;
    use crate::units::Pt;

    fn bounds() -> Rect {
        Rect::from_origin(Pt(0.0), Pt(0.0), Pt(60.0), Pt(24.0))
    }

    fn render(source: &Document, token: Option<&BreakToken>) -> (Document, RenderResult) {
        let geometry = FlowGeometry::default();
        let mut dest = Document::with_frame(bounds());
        let mut layout = Layout::new(bounds(), LayoutSettings::default(), &geometry);
        let result = layout.render_to(&mut dest, source, token);
        (dest, result)
    }

    #[test]
    fn content_that_fits_finishes_the_document() {
        let source = ContentParser::parse("<p>aaaa bbbb cccc dddd</p>").unwrap();
        let (dest, result) = render(&source, None);
        assert!(result.into_result().unwrap().is_none());
        assert_eq!(dest.text_content(dest.root()), "aaaa bbbb cccc dddd");
    }

    #[test]
    fn overflowing_text_breaks_at_the_first_hidden_word() {
        let source = ContentParser::parse("<p>aaaa bbbb cccc dddd eeee</p>").unwrap();
        let (dest, result) = render(&source, None);
        let token = result.into_result().unwrap().unwrap();
        let text = source.first_child(source.elements_by_tag("p")[0]).unwrap();
        assert_eq!(Some(&token.node), source.node_ref(text));
        assert_eq!(token.offset, Some(20));
        assert_eq!(dest.text_content(dest.root()), "aaaa bbbb cccc dddd ");

        let (next, result) = render(&source, Some(&token));
        assert!(result.into_result().unwrap().is_none());
        let p = next.elements_by_tag("p")[0];
        assert!(next.has_attr(p, attrs::SPLIT_FROM));
        assert_eq!(next.text_content(p), "eeee");
    }

    #[test]
    fn forced_break_stops_the_page() {
        let source = ContentParser::parse(r#"<p>one</p><p data-break-before="page">two</p>"#).unwrap();
        let (dest, result) = render(&source, None);
        let token = result.into_result().unwrap().unwrap();
        let second = source.elements_by_tag("p")[1];
        assert_eq!(Some(&token.node), source.node_ref(second));
        assert!(token.finished);
        assert_eq!(dest.text_content(dest.root()), "one");
    }

    #[test]
    fn force_break_ends_after_the_next_node() {
        let source = ContentParser::parse("<p>one</p><p>two</p>").unwrap();
        let geometry = FlowGeometry::default();
        let mut dest = Document::with_frame(bounds());
        let mut layout = Layout::new(bounds(), LayoutSettings::default(), &geometry);
        layout.force_break();
        let token = layout.render_to(&mut dest, &source, None).into_result().unwrap().unwrap();
        let second = source.elements_by_tag("p")[1];
        assert_eq!(Some(&token.node), source.node_ref(second));
        assert_eq!(dest.text_content(dest.root()), "one");
    }

    #[test]
    fn requested_breaks_travel_with_the_token() {
        let source = ContentParser::parse("<p>one</p><p>two</p><p>three</p>").unwrap();
        let paragraphs = source.elements_by_tag("p");
        let geometry = FlowGeometry::default();
        let mut dest = Document::with_frame(bounds());
        let mut layout = Layout::new(bounds(), LayoutSettings::default(), &geometry);
        layout.request_break_at(source.node_ref(paragraphs[1]).unwrap().clone());
        layout.request_break_at(source.node_ref(paragraphs[2]).unwrap().clone());

        let token = layout.render_to(&mut dest, &source, None).into_result().unwrap().unwrap();
        assert_eq!(Some(&token.node), source.node_ref(paragraphs[1]));
        assert_eq!(token.break_needed_at.len(), 2);

        let (_, result) = render(&source, Some(&token));
        let token = result.into_result().unwrap().unwrap();
        assert_eq!(Some(&token.node), source.node_ref(paragraphs[2]));
        assert_eq!(token.break_needed_at.len(), 1);
    }

    #[test]
    fn unknown_refs_are_reported() {
        let source = ContentParser::parse("<p>one</p>").unwrap();
        let token = BreakToken::new(Ref::new("nowhere"), None);
        let (_, result) = render(&source, Some(&token));
        assert!(matches!(result.error, Some(PaginationError::UnknownRef(_))));
    }

    #[test]
    fn resumed_ordered_lists_keep_counting() {
        let source = ContentParser::parse("<ol start=\"3\"><li>a</li><li>b</li><li>c</li></ol>").unwrap();
        let items = source.elements_by_tag("li");
        let token = BreakToken::new(source.node_ref(items[2]).unwrap().clone(), None);
        let (dest, result) = render(&source, Some(&token));
        assert!(result.into_result().unwrap().is_none());
        let list = dest.elements_by_tag("ol")[0];
        assert_eq!(dest.attr(list, "start"), Some("5"));
        assert_eq!(dest.text_content(list), "c");
    }

    #[test]
    fn end_token_points_past_the_rendered_content() {
        let source = ContentParser::parse("<p>aaaa bbbb cccc dddd eeee</p><p>next</p>").unwrap();
        let (dest, result) = render(&source, None);
        let token = result.into_result().unwrap().unwrap();
        let geometry = FlowGeometry::default();
        let layout = Layout::new(bounds(), LayoutSettings::default(), &geometry);
        let end = layout.find_end_token(&dest, &source).unwrap();
        assert!(end.same_position(&token));
    }
}
