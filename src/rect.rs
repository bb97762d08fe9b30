use crate::units::*;
use serde::{Deserialize, Serialize};

/// A rectangle, specified by two opposite corners.
///
/// Unlike print coordinates, rendered geometry grows downwards: `(x1, y1)` is
/// the top-left corner and `(x2, y2)` the bottom-right one.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// The x-coordinate of the left edge.
    pub x1: Pt,
    /// The y-coordinate of the top edge.
    pub y1: Pt,
    /// The x-coordinate of the right edge.
    pub x2: Pt,
    /// The y-coordinate of the bottom edge.
    pub y2: Pt,
}

impl Rect {
    /// Create a rectangle from its origin and size
    pub fn from_origin(x: Pt, y: Pt, width: Pt, height: Pt) -> Rect {
        Rect {
            x1: x,
            y1: y,
            x2: x + width,
            y2: y + height,
        }
    }

    /// A zero-sized rectangle sitting at a point
    pub fn point(x: Pt, y: Pt) -> Rect {
        Rect {
            x1: x,
            y1: y,
            x2: x,
            y2: y,
        }
    }

    pub fn left(&self) -> Pt {
        self.x1
    }

    pub fn top(&self) -> Pt {
        self.y1
    }

    pub fn right(&self) -> Pt {
        self.x2
    }

    pub fn bottom(&self) -> Pt {
        self.y2
    }

    pub fn width(&self) -> Pt {
        self.x2 - self.x1
    }

    pub fn height(&self) -> Pt {
        self.y2 - self.y1
    }

    /// Smallest rectangle covering both `self` and `other`
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Same rectangle with the bottom edge pulled up by `height`, used when
    /// something (footnotes, margin notes) claims space at the foot of a page
    pub fn shrink_bottom(&self, height: Pt) -> Rect {
        Rect {
            x1: self.x1,
            y1: self.y1,
            x2: self.x2,
            y2: (self.y2 - height).max(self.y1),
        }
    }
}
