use crate::breaks;
use crate::config::{PaginationConfig, SectionSplit};
use crate::document::Document;
use crate::error::PaginationError;
use crate::geometry::GeometryProvider;
use crate::page::Page;
use crate::parser::ContentParser;
use crate::section::{CancelToken, FlowContext, NeverCancel, NoYield, Scheduler, Section};

/// Drives a whole pagination run: parse, annotate, split into sections and
/// flow every section onto pages, in order.
///
/// ```
/// use paged_flow::{Chunker, PaginationConfig, Pt};
/// use paged_flow::geometry::FlowGeometry;
/// use paged_flow::layout::Margins;
///
/// let config = PaginationConfig::default()
///     .with_page_size((Pt(60.0), Pt(24.0)))
///     .with_margins(Margins::empty());
/// let geometry = FlowGeometry::default();
/// let paginated = Chunker::new(config, &geometry)
///     .flow("<p>aaaa bbbb cccc dddd eeee</p>")
///     .expect("content fits");
/// assert_eq!(paginated.page_count(), 2);
/// ```
pub struct Chunker<'a> {
    config: PaginationConfig,
    geometry: &'a dyn GeometryProvider,
    cancel: &'a dyn CancelToken,
}

impl<'a> Chunker<'a> {
    pub fn new(config: PaginationConfig, geometry: &'a dyn GeometryProvider) -> Chunker<'a> {
        Chunker {
            config,
            geometry,
            cancel: &NeverCancel,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a dyn CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Parse `markup` and paginate it
    pub fn flow(&self, markup: &str) -> Result<Paginated, PaginationError> {
        let document = ContentParser::parse(markup)?;
        self.flow_document(document)
    }

    /// Paginate an already built tree. Nodes without refs get one.
    pub fn flow_document(&self, document: Document) -> Result<Paginated, PaginationError> {
        self.flow_with_scheduler(document, &mut NoYield)
    }

    /// Paginate, calling `scheduler` between pages
    pub fn flow_with_scheduler(
        &self,
        mut document: Document,
        scheduler: &mut dyn Scheduler,
    ) -> Result<Paginated, PaginationError> {
        ContentParser::add(&mut document);
        breaks::propagate_break_markers(&mut document);

        let mut context = FlowContext {
            config: &self.config,
            geometry: self.geometry,
            cancel: self.cancel,
            scheduler,
        };
        let mut sections = Vec::new();
        let mut page_count = 0;
        for (index, source) in split_sections(&document, self.config.section_split)
            .into_iter()
            .enumerate()
        {
            let mut section = Section::new(index, source, page_count);
            section.render(&mut context)?;
            page_count += section.pages.len();
            sections.push(section);
        }
        log::info!(
            "paginated {} sections onto {} pages",
            sections.len(),
            page_count
        );
        Ok(Paginated { sections })
    }
}

/// The source of every section, each in a document of its own. Refs carry
/// over, so tokens stay valid against the original tree.
fn split_sections(document: &Document, split: SectionSplit) -> Vec<Document> {
    let root = document.root();
    let mut parts: Vec<Vec<_>> = Vec::new();
    match split {
        SectionSplit::Whole => parts.push(document.children(root).to_vec()),
        SectionSplit::TopLevel => {
            for child in document.children(root) {
                if document.is_ignorable(*child) {
                    continue;
                }
                match parts.last_mut() {
                    // loose text stays with the element before it
                    Some(part) if !document.is_element(*child) => part.push(*child),
                    _ => parts.push(vec![*child]),
                }
            }
        }
    }

    parts
        .into_iter()
        .map(|nodes| {
            let mut part = Document::new();
            let part_root = part.root();
            for node in nodes {
                let copy = part.import(document, node, true);
                part.append_child(part_root, copy);
            }
            part.index_subtree(part_root);
            part
        })
        .collect()
}

/// The outcome of a pagination run
#[derive(Debug)]
pub struct Paginated {
    pub sections: Vec<Section>,
}

impl Paginated {
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.sections.iter().flat_map(|section| section.pages.iter())
    }

    pub fn into_pages(self) -> impl Iterator<Item = Page> {
        self.sections.into_iter().flat_map(|section| section.pages.into_iter())
    }

    pub fn page_count(&self) -> usize {
        self.sections.iter().map(|section| section.pages.len()).sum()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FlowGeometry;
    use crate::layout::Margins;
    use crate::units::Pt;

    fn chunker(geometry: &FlowGeometry) -> Chunker<'_> {
        let config = PaginationConfig::default()
            .with_page_size((Pt(60.0), Pt(36.0)))
            .with_margins(Margins::empty());
        Chunker::new(config, geometry)
    }

    #[test]
    fn top_level_split_restarts_on_a_new_page() {
        let geometry = FlowGeometry::default();
        let mut chunker = chunker(&geometry);
        chunker.config.section_split = SectionSplit::TopLevel;
        let paginated = chunker.flow("<section>one</section>\n<section>two</section>").unwrap();
        assert_eq!(paginated.section_count(), 2);
        assert_eq!(paginated.page_count(), 2);
        let numbers: Vec<usize> = paginated.pages().map(Page::number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn whole_document_shares_pages() {
        let geometry = FlowGeometry::default();
        let paginated = chunker(&geometry)
            .flow("<section>one</section><section>two</section>")
            .unwrap();
        assert_eq!(paginated.section_count(), 1);
        assert_eq!(paginated.page_count(), 1);
        let page = paginated.into_pages().next().unwrap();
        assert_eq!(page.rendered.text_content(page.rendered.root()), "onetwo");
    }

    #[test]
    fn empty_documents_get_one_empty_page() {
        let geometry = FlowGeometry::default();
        let paginated = chunker(&geometry).flow("").unwrap();
        assert_eq!(paginated.page_count(), 1);
        assert!(paginated.pages().all(Page::is_empty));
    }
}
