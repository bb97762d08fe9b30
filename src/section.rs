use crate::breaks;
use crate::config::PaginationConfig;
use crate::document::Document;
use crate::error::PaginationError;
use crate::geometry::GeometryProvider;
use crate::page::Page;
use crate::token::BreakToken;
use std::collections::HashSet;

/// Cancellation hook checked once per page
pub trait CancelToken {
    fn is_cancelled(&self) -> bool;
}

/// Never-cancel token for default call paths
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Called between two pages, where a host can hand control back to its
/// event loop
pub trait Scheduler {
    fn yield_now(&mut self);
}

/// Runs every page back to back
#[derive(Clone, Copy, Debug, Default)]
pub struct NoYield;

impl Scheduler for NoYield {
    fn yield_now(&mut self) {}
}

/// Everything a section needs from the run it is part of
pub struct FlowContext<'a> {
    pub config: &'a PaginationConfig,
    pub geometry: &'a dyn GeometryProvider,
    pub cancel: &'a dyn CancelToken,
    pub scheduler: &'a mut dyn Scheduler,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionState {
    /// A page has to be laid out from the token
    NeedsPage(Option<BreakToken>),
    /// The last page settled and handed over this token
    PageSettled(Option<BreakToken>),
    Done,
    Failed,
}

/// A part of the document flowed onto its own run of pages
#[derive(Debug)]
pub struct Section {
    pub index: usize,
    pub source: Document,
    pub pages: Vec<Page>,
    /// Index of this section's first page among all pages of the run
    pub first_page_index: usize,
    state: SectionState,
}

impl Section {
    pub fn new(index: usize, source: Document, first_page_index: usize) -> Section {
        Section {
            index,
            source,
            pages: Vec::new(),
            first_page_index,
            state: SectionState::NeedsPage(None),
        }
    }

    pub fn state(&self) -> &SectionState {
        &self.state
    }

    /// Lay out pages until the source is exhausted
    pub fn render(&mut self, context: &mut FlowContext<'_>) -> Result<(), PaginationError> {
        self.state = SectionState::NeedsPage(None);
        let result = self.run(context);
        if result.is_err() {
            self.state = SectionState::Failed;
        }
        result
    }

    fn run(&mut self, context: &mut FlowContext<'_>) -> Result<(), PaginationError> {
        let mut seen: HashSet<String> = HashSet::new();
        loop {
            let state = std::mem::replace(&mut self.state, SectionState::Failed);
            self.state = match state {
                SectionState::NeedsPage(token) => {
                    if context.cancel.is_cancelled() {
                        return Err(PaginationError::Cancelled);
                    }
                    if let Some(token) = &token {
                        if !seen.insert(token.key()) {
                            log::error!("break token {} repeated", token.key());
                            return Err(PaginationError::OverflowContent {
                                message: "Pagination stopped repeating the same break".to_string(),
                                nodes: vec![token.node.clone()],
                            });
                        }
                    }
                    let next = self.lay_out_page(token.as_ref(), context)?;
                    SectionState::PageSettled(next)
                }
                SectionState::PageSettled(Some(token)) => {
                    context.scheduler.yield_now();
                    SectionState::NeedsPage(Some(token))
                }
                SectionState::PageSettled(None) => SectionState::Done,
                terminal @ (SectionState::Done | SectionState::Failed) => {
                    log::debug!("section {} stopped with {} pages", self.index, self.pages.len());
                    self.state = terminal;
                    return Ok(());
                }
            };
        }
    }

    fn next_page_index(&self) -> usize {
        self.first_page_index + self.pages.len()
    }

    fn check_page_limit(&self, context: &FlowContext<'_>) -> Result<(), PaginationError> {
        match context.config.max_pages {
            Some(max) if self.next_page_index() >= max => Err(PaginationError::PageLimit(max)),
            _ => Ok(()),
        }
    }

    fn new_page(&self, config: &PaginationConfig, blank: bool) -> Page {
        let index = self.next_page_index();
        let margins = config.margins.with_gutter(config.gutter, index);
        if blank {
            Page::blank(index, config.page_size, margins, config.layout.clone())
        } else {
            Page::new(index, config.page_size, margins, config.layout.clone())
        }
    }

    fn lay_out_page(
        &mut self,
        token: Option<&BreakToken>,
        context: &mut FlowContext<'_>,
    ) -> Result<Option<BreakToken>, PaginationError> {
        if self.needs_blank_page(token) {
            self.check_page_limit(context)?;
            let blank = self.new_page(context.config, true);
            log::debug!("blank page {} inserted for page side", blank.number());
            self.pages.push(blank);
        }
        self.check_page_limit(context)?;
        let mut page = self.new_page(context.config, false);
        let next = page.layout(&self.source, token, context.geometry)?;
        self.pages.push(page);
        Ok(next)
    }

    /// Whether the page about to start sits on the wrong side for the node it
    /// starts with. The document's first page is never preceded by a blank.
    fn needs_blank_page(&self, token: Option<&BreakToken>) -> bool {
        let index = self.next_page_index();
        if index == 0 {
            return false;
        }
        let node = match token {
            Some(token) => self.source.find_by_ref(&token.node),
            None => self.source.first_child(self.source.root()),
        };
        let Some(node) = node else {
            return false;
        };
        breaks::required_side(&self.source, node)
            .is_some_and(|side| side != breaks::PageSide::of_page(index + 1))
    }

    /// Push content that stopped fitting on page `from` (an index into
    /// [`Section::pages`]) forward, page after page, until it settles.
    /// Missing pages are laid out fresh. Returns how many pages gave up
    /// content.
    pub fn reflow_overflow(
        &mut self,
        from: usize,
        context: &mut FlowContext<'_>,
    ) -> Result<usize, PaginationError> {
        let mut moved = 0;
        let mut index = from;
        while index < self.pages.len() {
            let Some((token, fragment)) = self.pages[index].check_overflow(&self.source, context.geometry) else {
                break;
            };
            moved += 1;
            if index + 1 < self.pages.len() {
                index += 1;
                if self.pages[index].blank {
                    log::debug!("blank page {} takes the overflow", self.pages[index].number());
                    let end = self.pages.get(index + 1).and_then(|page| page.start_token.clone());
                    self.pages[index].end_token = end;
                }
                self.pages[index].prepend(&fragment, token);
                continue;
            }
            log::debug!("overflow of the last page continues at {}", token.key());
            self.state = SectionState::NeedsPage(Some(token));
            let result = self.run(context);
            if result.is_err() {
                self.state = SectionState::Failed;
            }
            result?;
            break;
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FlowGeometry;
    use crate::layout::Margins;
    use crate::parser::ContentParser;
    use crate::units::Pt;

    struct Counting(usize);

    impl Scheduler for Counting {
        fn yield_now(&mut self) {
            self.0 += 1;
        }
    }

    struct AlreadyCancelled;

    impl CancelToken for AlreadyCancelled {
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    fn config() -> PaginationConfig {
        PaginationConfig::default()
            .with_page_size((Pt(60.0), Pt(24.0)))
            .with_margins(Margins::empty())
    }

    #[test]
    fn pages_follow_each_other() {
        let source = ContentParser::parse("<p>aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii</p>").unwrap();
        let config = config();
        let geometry = FlowGeometry::default();
        let mut scheduler = Counting(0);
        let mut context = FlowContext {
            config: &config,
            geometry: &geometry,
            cancel: &NeverCancel,
            scheduler: &mut scheduler,
        };
        let mut section = Section::new(0, source, 0);
        section.render(&mut context).unwrap();

        assert_eq!(section.pages.len(), 3);
        assert_eq!(section.state(), &SectionState::Done);
        for pair in section.pages.windows(2) {
            assert_eq!(pair[0].end_token, pair[1].start_token);
        }
        assert!(section.pages[2].end_token.is_none());
        assert_eq!(scheduler.0, 2);
    }

    #[test]
    fn right_pages_get_a_blank_in_front() {
        let source = ContentParser::parse(r#"<h1 data-break-before="right">Title</h1>"#).unwrap();
        let config = config();
        let geometry = FlowGeometry::default();
        let mut scheduler = NoYield;
        let mut context = FlowContext {
            config: &config,
            geometry: &geometry,
            cancel: &NeverCancel,
            scheduler: &mut scheduler,
        };
        // starts as the document's second page, a left one
        let mut section = Section::new(1, source, 1);
        section.render(&mut context).unwrap();
        assert_eq!(section.pages.len(), 2);
        assert!(section.pages[0].blank);
        assert_eq!(section.pages[1].number(), 3);
    }

    #[test]
    fn limits_and_cancellation_stop_the_loop() {
        let text = "aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii";
        let geometry = FlowGeometry::default();
        let mut scheduler = NoYield;

        let limited = config().with_max_pages(2);
        let mut context = FlowContext {
            config: &limited,
            geometry: &geometry,
            cancel: &NeverCancel,
            scheduler: &mut scheduler,
        };
        let mut section = Section::new(0, ContentParser::parse(&format!("<p>{text}</p>")).unwrap(), 0);
        assert!(matches!(
            section.render(&mut context),
            Err(PaginationError::PageLimit(2))
        ));
        assert_eq!(section.state(), &SectionState::Failed);

        let config = config();
        let mut context = FlowContext {
            config: &config,
            geometry: &geometry,
            cancel: &AlreadyCancelled,
            scheduler: &mut scheduler,
        };
        let mut section = Section::new(0, ContentParser::parse(&format!("<p>{text}</p>")).unwrap(), 0);
        assert!(matches!(
            section.render(&mut context),
            Err(PaginationError::Cancelled)
        ));
        assert!(section.pages.is_empty());
    }

    #[test]
    fn overflow_fills_a_blank_page_before_a_right_start() {
        let source = ContentParser::parse(
            r#"<p>aaaa bbbb cccc dddd</p><h2 data-break-before="right">x</h2>"#,
        )
        .unwrap();
        let config = config();
        let geometry = FlowGeometry::default();
        let mut scheduler = NoYield;
        let mut context = FlowContext {
            config: &config,
            geometry: &geometry,
            cancel: &NeverCancel,
            scheduler: &mut scheduler,
        };
        let mut section = Section::new(0, source, 0);
        section.render(&mut context).unwrap();
        assert_eq!(section.pages.len(), 3);
        assert!(section.pages[1].blank);

        let first = &mut section.pages[0];
        first.content_area = first.content_area.shrink_bottom(Pt(12.0));
        assert_eq!(section.reflow_overflow(0, &mut context).unwrap(), 1);

        let pages: Vec<(bool, String)> = section
            .pages
            .iter()
            .map(|page| (page.blank, page.rendered.text_content(page.rendered.root())))
            .collect();
        assert_eq!(
            pages,
            vec![
                (false, "aaaa bbbb ".to_string()),
                (false, "cccc dddd".to_string()),
                (false, "x".to_string()),
            ]
        );
        assert!(section.pages[1].is_listening());
        assert_eq!(section.pages[1].end_token, section.pages[2].start_token);
        assert!(section.pages[1].check_overflow(&section.source, &geometry).is_none());
    }
}
