//! Box geometry of rendered trees.
//!
//! The flow never measures text or sizes boxes itself: it asks a
//! [`GeometryProvider`] for boxes of content that has already been laid out.
//! Hosts with a real layout engine implement the trait on top of it;
//! [`FlowGeometry`] is a deterministic monospaced block flow that needs
//! nothing but the tree.

mod flow;
mod style;

pub use flow::*;
pub use style::*;

use crate::document::{Document, NodeId};
use crate::rect::Rect;
use crate::units::Pt;

pub trait GeometryProvider {
    /// Border box of a node. Text nodes get the union of their line boxes
    fn bounding_box(&self, document: &Document, node: NodeId) -> Rect;

    /// One box per line a node occupies
    fn client_rects(&self, document: &Document, node: NodeId) -> Vec<Rect>;

    /// Box of the chars `start..end` of a text node
    fn text_range_box(&self, document: &Document, text: NodeId, start: usize, end: usize) -> Rect;

    fn computed_style(&self, document: &Document, node: NodeId) -> ComputedStyle;

    /// Width and height of a node's content, which may exceed its box
    fn scroll_size(&self, document: &Document, node: NodeId) -> (Pt, Pt);

    /// Block until the given images have their final size
    fn settle_images(&self, _document: &Document, _images: &[NodeId]) {}
}
