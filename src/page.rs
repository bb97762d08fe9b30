use crate::breaks::{self, PageSide};
use crate::config::LayoutSettings;
use crate::document::{attrs, Document, NodeId};
use crate::error::PaginationError;
use crate::geometry::GeometryProvider;
use crate::layout::{Layout, Margins};
use crate::pagesize::{self, PageSize};
use crate::rect::Rect;
use crate::token::BreakToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Empty,
    LayingOut,
    Settled,
}

/// One fixed-size page and the slice of the source tree rendered onto it
#[derive(Debug)]
pub struct Page {
    /// 0-based position among all pages of the run
    pub index: usize,
    /// The size of the page
    pub size: PageSize,
    pub margins: Margins,
    /// Where content can live, i.e. within the margins
    pub content_area: Rect,
    /// The rendered clones of the source nodes placed on this page
    pub rendered: Document,
    /// Token this page started from, `None` for the very first page
    pub start_token: Option<BreakToken>,
    /// Token the next page starts from, `None` when this page ends the flow
    pub end_token: Option<BreakToken>,
    /// Inserted only to put the next page on the right side
    pub blank: bool,
    /// Named page in effect on this page
    pub name: Option<String>,
    state: PageState,
    listening: bool,
    settings: LayoutSettings,
}

impl Page {
    pub fn new(index: usize, size: PageSize, margins: Margins, settings: LayoutSettings) -> Page {
        let content_area = pagesize::content_area(size, &margins);
        Page {
            index,
            size,
            margins,
            content_area,
            rendered: Document::with_frame(content_area),
            start_token: None,
            end_token: None,
            blank: false,
            name: None,
            state: PageState::Empty,
            listening: false,
            settings,
        }
    }

    /// A page without content, flowed around to satisfy a left/right break
    pub fn blank(index: usize, size: PageSize, margins: Margins, settings: LayoutSettings) -> Page {
        Page {
            blank: true,
            state: PageState::Settled,
            ..Page::new(index, size, margins, settings)
        }
    }

    /// 1-based page number
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn side(&self) -> PageSide {
        PageSide::of_page(self.number())
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Whether the page reacts to [`Page::check_overflow`] and
    /// [`Page::check_underflow`]
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.children(self.rendered.root()).is_empty()
    }

    fn clear(&mut self) {
        self.rendered = Document::with_frame(self.content_area);
        self.start_token = None;
        self.end_token = None;
        self.name = None;
        self.listening = false;
        self.state = PageState::Empty;
    }

    fn layout_engine<'g>(&self, geometry: &'g dyn GeometryProvider) -> Layout<'g> {
        Layout::new(self.content_area, self.settings.clone(), geometry)
    }

    /// Flow `source` onto this page from `break_token`, replacing anything
    /// rendered before. Returns the token the next page starts from.
    pub fn layout(
        &mut self,
        source: &Document,
        break_token: Option<&BreakToken>,
        geometry: &dyn GeometryProvider,
    ) -> Result<Option<BreakToken>, PaginationError> {
        self.clear();
        self.state = PageState::LayingOut;
        self.start_token = break_token.cloned();

        let mut layout = self.layout_engine(geometry);
        let token = layout
            .render_to(&mut self.rendered, source, break_token)
            .into_result()?;
        self.state = PageState::Settled;

        if let (Some(start), Some(end)) = (break_token, token.as_ref()) {
            if end.same_position(start) {
                log::warn!("page {} made no progress at {}", self.number(), start.node);
                return Ok(None);
            }
        }
        self.end_token = token.clone();
        self.name = self.resolve_name(source);
        self.listening = true;
        log::debug!(
            "page {} laid out, next starts at {:?}",
            self.number(),
            token.as_ref().map(BreakToken::key)
        );
        Ok(token)
    }

    /// Keep flowing onto an already settled page, after what it holds
    pub fn append(
        &mut self,
        source: &Document,
        break_token: Option<&BreakToken>,
        geometry: &dyn GeometryProvider,
    ) -> Result<Option<BreakToken>, PaginationError> {
        self.state = PageState::LayingOut;
        let mut layout = self.layout_engine(geometry);
        let token = layout
            .render_to(&mut self.rendered, source, break_token)
            .into_result()?;
        self.state = PageState::Settled;
        self.end_token = token.clone();
        if self.name.is_none() {
            self.name = self.resolve_name(source);
        }
        Ok(token)
    }

    /// Content that stopped fitting after the page settled, e.g. once images
    /// got their real size. The content is cut from the page and returned
    /// with the token it resumes at; a second call finds nothing.
    pub fn check_overflow(
        &mut self,
        source: &Document,
        geometry: &dyn GeometryProvider,
    ) -> Option<(BreakToken, Document)> {
        if !self.listening {
            return None;
        }
        let layout = self.layout_engine(geometry);
        let (token, fragment) = layout.break_and_extract(
            &mut self.rendered,
            source,
            self.content_area,
            self.start_token.as_ref(),
        )?;
        let fragment = fragment?;

        let mut overflow = Document::new();
        let root = overflow.root();
        for child in self.rendered.children(fragment).to_vec() {
            let copy = overflow.import(&self.rendered, child, true);
            overflow.append_child(root, copy);
        }
        overflow.index_subtree(root);

        log::debug!("page {} overflowed at {}", self.number(), token.key());
        self.end_token = Some(token.clone());
        Some((token, overflow))
    }

    /// Where the rendered content actually ends in the source, `None` when it
    /// runs to the end. A page whose end token no longer matches this has
    /// room to pull content back from the next page.
    pub fn check_underflow(
        &self,
        source: &Document,
        geometry: &dyn GeometryProvider,
    ) -> Option<BreakToken> {
        if !self.listening {
            return None;
        }
        self.layout_engine(geometry).find_end_token(&self.rendered, source)
    }

    /// Put content cut from the previous page in front of this page's
    /// content. The box the content was split from is merged with its
    /// continuation here. A blank page that takes content stops being blank.
    pub fn prepend(&mut self, fragment: &Document, token: BreakToken) {
        let root = self.rendered.root();
        self.merge(fragment, fragment.root(), root);
        self.rendered.index_subtree(root);
        self.start_token = Some(token);
        self.blank = false;
        self.state = PageState::Settled;
        self.listening = true;
    }

    fn merge(&mut self, fragment: &Document, from: NodeId, into: NodeId) {
        let incoming = fragment.children(from).to_vec();
        let first_existing = self.rendered.first_child(into);
        let joined = match (incoming.last(), first_existing) {
            (Some(last), Some(first)) if self.continues(fragment, *last, first) => Some((*last, first)),
            _ => None,
        };

        let inserted = if joined.is_some() {
            &incoming[..incoming.len() - 1]
        } else {
            &incoming[..]
        };
        for child in inserted {
            let copy = self.rendered.import(fragment, *child, true);
            self.rendered.insert_before(into, copy, first_existing);
        }

        let Some((last, first)) = joined else {
            return;
        };
        if let (Some(head), Some(tail)) = (fragment.text(last), self.rendered.text(first)) {
            let text = format!("{head}{tail}");
            self.rendered.set_text(first, text);
            self.rendered.set_text_offset(first, fragment.text_offset(last));
            return;
        }
        self.merge(fragment, last, first);
        if !fragment.has_attr(last, attrs::SPLIT_FROM) {
            self.rendered.remove_attr(first, attrs::SPLIT_FROM);
        }
    }

    /// Whether `first` on this page is the continuation of `last` from the
    /// fragment
    fn continues(&self, fragment: &Document, last: NodeId, first: NodeId) -> bool {
        let same_ref = fragment.node_ref(last).is_some() && fragment.node_ref(last) == self.rendered.node_ref(first);
        if !same_ref {
            return false;
        }
        match (fragment.text(last), self.rendered.text(first)) {
            (Some(head), Some(_)) => {
                fragment.text_offset(last) + head.chars().count() == self.rendered.text_offset(first)
            }
            (None, None) => true,
            _ => false,
        }
    }

    fn resolve_name(&self, source: &Document) -> Option<String> {
        let rendered = &self.rendered;
        if let Some(name) = rendered
            .descendants(rendered.root())
            .find_map(|node| rendered.attr(node, attrs::PAGE))
        {
            return Some(name.to_string());
        }
        let token = self.start_token.as_ref()?;
        let node = source.find_by_ref(&token.node)?;
        breaks::named_page(source, node, None).map(str::to_string)
    }
}
