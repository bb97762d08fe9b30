//! Page sizes for common paper formats.
//!
//! Sizes are (width, height) pairs in portrait orientation. Use
//! [`PageOrientation`](crate::pagesize::PageOrientation) to flip them, and
//! [`content_area`](crate::pagesize::content_area) to get the box content is
//! flowed into once margins are applied.
//!
//! ```
//! use paged_flow::pagesize::{content_area, PageOrientation, A5, LETTER};
//! use paged_flow::layout::Margins;
//! use paged_flow::Pt;
//!
//! let area = content_area(LETTER, &Margins::all(Pt(72.0)));
//! assert_eq!(area.width(), Pt(6.5 * 72.0));
//!
//! let (width, height) = A5.landscape();
//! assert!(width > height);
//! ```

use crate::layout::Margins;
use crate::rect::Rect;
use crate::units::*;

/// Page dimensions as (width, height) in points.
pub type PageSize = (Pt, Pt);

// north american sizes
pub const LETTER: PageSize = (Pt(8.5 * 72.0), Pt(11.0 * 72.0));
pub const HALF_LETTER: PageSize = (Pt(5.5 * 72.0), Pt(8.5 * 72.0));
pub const LEGAL: PageSize = (Pt(8.5 * 72.0), Pt(13.0 * 72.0));
pub const TABLOID: PageSize = (Pt(11.0 * 72.0), Pt(17.0 * 72.0));

// book formats
pub const QUARTO: PageSize = (Pt(9.5 * 72.0), Pt(12.0 * 72.0));
pub const OCTAVO: PageSize = (Pt(6.0 * 72.0), Pt(9.0 * 72.0));

// iso a-series (converted from mm to points)
pub const A3: PageSize = (Pt(297.0 * 72.0 / 25.4), Pt(420.0 * 72.0 / 25.4));
pub const A4: PageSize = (Pt(210.0 * 72.0 / 25.4), Pt(297.0 * 72.0 / 25.4));
pub const A5: PageSize = (Pt(148.0 * 72.0 / 25.4), Pt(210.0 * 72.0 / 25.4));
pub const A6: PageSize = (Pt(105.0 * 72.0 / 25.4), Pt(148.0 * 72.0 / 25.4));

/// Convert page sizes between portrait and landscape orientations.
pub trait PageOrientation {
    /// Returns the size in portrait orientation (width ≤ height).
    fn portrait(self) -> Self;
    /// Returns the size in landscape orientation (width ≥ height).
    fn landscape(self) -> Self;
}

impl PageOrientation for PageSize {
    fn portrait(self) -> Self {
        if self.0 <= self.1 {
            self
        } else {
            (self.1, self.0)
        }
    }

    fn landscape(self) -> PageSize {
        if self.0 >= self.1 {
            self
        } else {
            (self.1, self.0)
        }
    }
}

/// The box inside the margins that content is flowed into. The origin is the
/// page's top-left corner and y grows downwards.
pub fn content_area(size: PageSize, margins: &Margins) -> Rect {
    let (width, height) = size;
    Rect {
        x1: margins.left,
        y1: margins.top,
        x2: (width - margins.right).max(margins.left),
        y2: (height - margins.bottom).max(margins.top),
    }
}
