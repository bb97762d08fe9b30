use crate::units::Pt;
use serde::{Deserialize, Serialize};

/// Page margins. The content area of every page is the page box minus these,
/// and the flow engine never places content outside of it. Left and right
/// pages may differ through a binding gutter, see [`Margins::with_gutter`].
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl Margins {
    /// Create margins where all values are equal
    pub fn all<D: Into<Pt>>(value: D) -> Margins {
        let value: Pt = value.into();
        Margins {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// No margins at all, content touches the page edges
    pub fn empty() -> Margins {
        Margins::all(Pt(0.0))
    }

    /// Add a gutter on the inside edge of a page. `page_index` is 0-based, so
    /// even indices are right-hand (recto) pages bound on their left edge:
    /// * _even_ => left
    /// * _odd_ => right
    pub fn with_gutter(&self, gutter: Pt, page_index: usize) -> Margins {
        let mut margins = self.clone();
        if page_index % 2 == 0 {
            margins.left += gutter;
        } else {
            margins.right += gutter;
        }
        margins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gutter_alternates_with_page_side() {
        let base = Margins::all(Pt(36.0));
        let recto = base.with_gutter(Pt(18.0), 0);
        let verso = base.with_gutter(Pt(18.0), 1);
        assert_eq!(recto.left, Pt(54.0));
        assert_eq!(recto.right, Pt(36.0));
        assert_eq!(verso.left, Pt(36.0));
        assert_eq!(verso.right, Pt(54.0));
    }
}
