use crate::refs::Ref;
use thiserror::Error;

/// All errors that the crate can generate
#[derive(Error, Debug)]
pub enum PaginationError {
    /// Content that can neither be placed on a page nor skipped past. This is
    /// fatal: it is never retried and propagates out of the whole run.
    #[error("{message}: {}", format_refs(.nodes))]
    OverflowContent { message: String, nodes: Vec<Ref> },

    #[error(transparent)]
    /// [quick_xml] failed to read the markup
    Parse(#[from] quick_xml::Error),

    #[error("malformed markup: {0}")]
    /// The markup could be tokenised but not turned into a tree
    Markup(String),

    #[error(transparent)]
    /// [serde_json] failed to read a configuration or a persisted break token
    Config(#[from] serde_json::Error),

    #[error("no node carries the ref `{0}`")]
    /// A break token pointed at a node the source document doesn't have
    UnknownRef(Ref),

    #[error("pagination was cancelled")]
    Cancelled,

    #[error("page limit of {0} reached before the content was exhausted")]
    PageLimit(usize),
}

impl PaginationError {
    pub(crate) fn unable_to_layout(nodes: Vec<Ref>) -> PaginationError {
        PaginationError::OverflowContent {
            message: "Unable to layout item".to_string(),
            nodes,
        }
    }
}

fn format_refs(nodes: &[Ref]) -> String {
    nodes
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
