use crate::document::{attrs, Document, NodeId};
use crate::geometry::{ComputedStyle, Display};

/// Elements that are cloned whole: their content is only ever split by
/// overflow detection, never walked node by node
const ATOMIC_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "figcaption", "blockquote", "pre", "li", "td", "th",
    "dt", "dd", "video", "canvas", "img",
    // inline and form elements
    "a", "abbr", "acronym", "b", "bdo", "big", "br", "button", "cite", "code", "dfn", "em", "font",
    "i", "input", "kbd", "label", "map", "object", "q", "samp", "script", "select", "small",
    "span", "strike", "strong", "style", "sub", "sup", "textarea", "tt", "u", "var",
];

/// How the flow clones a source node onto a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Cloned shallow; its children are walked and appended one by one
    Container,
    /// Cloned with its whole subtree
    Atomic,
}

impl NodeKind {
    pub fn of(document: &Document, node: NodeId) -> NodeKind {
        let Some(tag) = document.tag(node) else {
            return NodeKind::Atomic;
        };
        match document.attr(node, attrs::LAYOUT) {
            Some("container") => return NodeKind::Container,
            Some("atomic") => return NodeKind::Atomic,
            _ => {}
        }
        if ComputedStyle::from_inline(document, node).display == Display::None {
            return NodeKind::Atomic;
        }
        if ATOMIC_TAGS.contains(&tag) {
            NodeKind::Atomic
        } else {
            NodeKind::Container
        }
    }
}

/// Elements and visible text count as content; whitespace does not
pub fn has_content(document: &Document, node: NodeId) -> bool {
    document.is_element(node) || (document.is_text(node) && !document.is_all_whitespace(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ContentParser;

    #[test]
    fn classifies_by_tag_with_overrides() {
        let doc = ContentParser::parse(
            r#"<section><p>a</p><ul data-layout="atomic"><li>b</li></ul><li data-layout="container">c</li><div style="display: none"><p>d</p></div></section>"#,
        )
        .unwrap();
        let kind = |tag: &str| NodeKind::of(&doc, doc.elements_by_tag(tag)[0]);
        assert_eq!(kind("section"), NodeKind::Container);
        assert_eq!(kind("p"), NodeKind::Atomic);
        assert_eq!(kind("ul"), NodeKind::Atomic);
        assert_eq!(NodeKind::of(&doc, doc.elements_by_tag("li")[1]), NodeKind::Container);
        assert_eq!(kind("div"), NodeKind::Atomic);

        let p = doc.elements_by_tag("p")[0];
        assert!(has_content(&doc, p));
        assert!(has_content(&doc, doc.first_child(p).unwrap()));
    }
}
