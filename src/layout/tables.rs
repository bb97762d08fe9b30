use super::Layout;
use crate::document::{attrs, Document, NodeId};
use crate::token::BreakToken;

impl Layout<'_> {
    /// When a page breaks inside a table cell, the row keeps its shape: the
    /// cells that follow the broken one get empty placeholders on this page,
    /// tagged `data-split-to`, while their content flows to the next page.
    pub fn rebuild_table_from_break_token(
        &self,
        token: &BreakToken,
        rendered: &mut Document,
        source: &Document,
    ) {
        let Some(node) = source.find_by_ref(&token.node) else {
            return;
        };
        let Some(cell) = closest_cell(source, node) else {
            return;
        };
        let Some(rendered_cell) = rendered.find_counterpart(source, cell) else {
            return;
        };
        let Some(row) = rendered.parent(rendered_cell) else {
            return;
        };

        let mut sibling = source.next_sibling(cell);
        while let Some(next) = sibling {
            if source.is_element(next) && rendered.find_counterpart(source, next).is_none() {
                let copy = rendered.import(source, next, false);
                rendered.set_attr(copy, attrs::SPLIT_TO, "true");
                rendered.append_child(row, copy);
                rendered.index_subtree(copy);
                log::trace!("placeholder for table cell {:?}", source.node_ref(next));
            }
            sibling = source.next_sibling(next);
        }
    }
}

fn closest_cell(document: &Document, node: NodeId) -> Option<NodeId> {
    let table = document.closest(node, "table", None)?;
    document
        .closest(node, "td", Some(table))
        .or_else(|| document.closest(node, "th", Some(table)))
}
