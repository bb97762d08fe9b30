use crate::document::NodeId;
use crate::error::PaginationError;
use crate::refs::Ref;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Where the next page resumes in the source tree.
///
/// A missing token (`Option::<BreakToken>::None`) means the document is
/// complete. For text nodes `offset` counts chars into the source text; for
/// elements it is unused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakToken {
    pub node: Ref,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// What was cut off the previous page to produce this token. Handles point
    /// into that page's rendered tree, so they never outlive it.
    #[serde(skip)]
    pub overflow: Vec<Overflow>,
    /// Set when the token came from a forced break rather than from content
    /// running off the page
    #[serde(default)]
    pub finished: bool,
    /// Refs at which a break was requested while laying out but not reached yet
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub break_needed_at: VecDeque<Ref>,
}

impl BreakToken {
    pub fn new(node: Ref, offset: Option<usize>) -> BreakToken {
        BreakToken {
            node,
            offset,
            overflow: Vec::new(),
            finished: false,
            break_needed_at: VecDeque::new(),
        }
    }

    /// A token produced by a forced break
    pub fn forced(node: Ref) -> BreakToken {
        BreakToken {
            finished: true,
            ..BreakToken::new(node, None)
        }
    }

    /// Whether both tokens resume at the same place. Bookkeeping (overflow,
    /// `finished`, pending break requests) is ignored and a missing offset is
    /// the same as offset zero.
    pub fn same_position(&self, other: &BreakToken) -> bool {
        self.node == other.node && self.offset.unwrap_or(0) == other.offset.unwrap_or(0)
    }

    /// Stable key of the position, used to notice a page loop that keeps
    /// producing the same tokens
    pub fn key(&self) -> String {
        format!("{}@{}", self.node, self.offset.unwrap_or(0))
    }

    pub fn to_json(&self) -> Result<String, PaginationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<BreakToken, PaginationError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A boundary-to-end range inside a rendered tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverflowRange {
    pub start_container: NodeId,
    /// Char offset for a text container, child index for anything else
    pub start_offset: usize,
    pub end_container: NodeId,
    pub end_offset: usize,
}

/// Rendered content that runs past the page bounds and has to go
#[derive(Debug, Clone, PartialEq)]
pub struct Overflow {
    /// First rendered node of the overflowing content
    pub node: NodeId,
    pub offset: Option<usize>,
    pub range: OverflowRange,
    /// Whether the range starts directly under the rendered root
    pub top_level: bool,
}

/// Outcome of one [`Layout::render_to`](crate::layout::Layout::render_to)
/// call
#[derive(Debug, Default)]
pub struct RenderResult {
    pub break_token: Option<BreakToken>,
    pub error: Option<PaginationError>,
}

impl RenderResult {
    pub fn done(break_token: Option<BreakToken>) -> RenderResult {
        RenderResult {
            break_token,
            error: None,
        }
    }

    pub fn failed(error: PaginationError) -> RenderResult {
        RenderResult {
            break_token: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Option<BreakToken>, PaginationError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.break_token),
        }
    }
}
