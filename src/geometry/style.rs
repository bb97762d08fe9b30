use crate::document::{Document, NodeId};
use crate::units::{Pt, Px};

/// Elements laid out inline unless a style says otherwise
pub const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "b", "bdo", "big", "br", "button", "cite", "code", "dfn", "em", "font",
    "i", "input", "kbd", "label", "map", "object", "q", "samp", "select", "small", "span",
    "strike", "strong", "sub", "sup", "textarea", "tt", "u", "var", "wbr",
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    #[default]
    Block,
    Inline,
    None,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Float {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BreakInside {
    #[default]
    Auto,
    Avoid,
}

/// The slice of computed style the flow needs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ComputedStyle {
    pub display: Display,
    pub float: Float,
    pub break_inside: BreakInside,
}

impl ComputedStyle {
    /// Style from the tag defaults and the element's `style` attribute
    pub fn from_inline(document: &Document, node: NodeId) -> ComputedStyle {
        let Some(tag) = document.tag(node) else {
            return ComputedStyle {
                display: Display::Inline,
                ..ComputedStyle::default()
            };
        };
        let mut style = ComputedStyle {
            display: if INLINE_TAGS.contains(&tag) {
                Display::Inline
            } else {
                Display::Block
            },
            ..ComputedStyle::default()
        };
        for (name, value) in declarations(document, node) {
            match (name.as_str(), value.as_str()) {
                ("display", "none") => style.display = Display::None,
                ("display", "inline") | ("display", "inline-block") => style.display = Display::Inline,
                ("display", _) => style.display = Display::Block,
                ("float", "left") => style.float = Float::Left,
                ("float", "right") => style.float = Float::Right,
                ("float", _) => style.float = Float::None,
                ("break-inside", "avoid") | ("break-inside", "avoid-page") => {
                    style.break_inside = BreakInside::Avoid
                }
                ("page-break-inside", "avoid") => style.break_inside = BreakInside::Avoid,
                _ => {}
            }
        }
        style
    }

    pub fn avoids_break_inside(&self) -> bool {
        self.break_inside == BreakInside::Avoid
    }

    pub fn is_floating(&self) -> bool {
        self.float != Float::None
    }
}

/// `name: value` pairs of the `style` attribute, names lowercased
pub fn declarations(document: &Document, node: NodeId) -> Vec<(String, String)> {
    let Some(style) = document.attr(node, "style") else {
        return Vec::new();
    };
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_ascii_lowercase();
            (!name.is_empty()).then_some((name, value))
        })
        .collect()
}

pub fn property(document: &Document, node: NodeId, name: &str) -> Option<String> {
    declarations(document, node)
        .into_iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

/// Parse a length such as `12pt`, `16px` or a bare number (points)
pub fn parse_length(value: &str) -> Option<Pt> {
    let value = value.trim();
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse::<f32>().ok().map(|v| Pt::from(Px(v)));
    }
    let number = value.strip_suffix("pt").unwrap_or(value);
    number.trim().parse::<f32>().ok().map(Pt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_style_overrides_tag_defaults() {
        let mut doc = Document::new();
        let span = doc.create_element("span");
        let div = doc.create_element("div");
        doc.set_attr(span, "style", "display: block; float: LEFT");
        doc.set_attr(div, "style", "break-inside:avoid;height: 20px");

        let span_style = ComputedStyle::from_inline(&doc, span);
        assert_eq!(span_style.display, Display::Block);
        assert!(span_style.is_floating());

        let div_style = ComputedStyle::from_inline(&doc, div);
        assert!(div_style.avoids_break_inside());
        assert_eq!(
            property(&doc, div, "height").and_then(|h| parse_length(&h)),
            Some(Pt(15.0))
        );
    }

    #[test]
    fn lengths() {
        assert_eq!(parse_length("12pt"), Some(Pt(12.0)));
        assert_eq!(parse_length(" 30 "), Some(Pt(30.0)));
        assert_eq!(parse_length("auto"), None);
    }
}
