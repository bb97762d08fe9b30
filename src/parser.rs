//! Turns markup (or an already built [`Document`]) into a tagged source tree.
//!
//! Every node gets a stable [`Ref`] so rendered clones can be mapped back to
//! the source, and whitespace that would only get in the way of pagination is
//! stripped.

use crate::document::{attrs, Document, NodeId};
use crate::error::PaginationError;
use crate::refs::Ref;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Elements inside which whitespace is significant and left untouched
const PRESERVE_WHITESPACE: &[&str] = &["pre", "textarea", "listing", "plaintext", "xmp"];

/// Elements that never have content or an end tag in HTML
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements dropped together with everything inside them
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "template"];

#[derive(Debug, Default, Clone, Copy)]
pub struct ContentParser;

impl ContentParser {
    /// Parse a markup string into a fresh, tagged document
    pub fn parse(markup: &str) -> Result<Document, PaginationError> {
        let mut document = build_tree(markup)?;
        ContentParser::add(&mut document);
        Ok(document)
    }

    /// Tag an existing document in place
    pub fn add(document: &mut Document) {
        add_refs(document);
        remove_empty(document);
        log::trace!(
            "tagged document {} with {} nodes",
            document.id(),
            document.descendants(document.root()).count()
        );
    }
}

fn add_refs(document: &mut Document) {
    let nodes: Vec<NodeId> = document.descendants(document.root()).collect();
    for node in nodes {
        if document.node_ref(node).is_some() {
            continue;
        }
        if document.is_element(node) {
            let node_ref = match document.attr(node, attrs::REF) {
                Some(existing) => Ref::new(existing),
                None => {
                    let fresh = document.allocator.gen();
                    document.set_attr(node, attrs::REF, fresh.as_str());
                    fresh
                }
            };
            document.assign_ref(node, node_ref);
            if let Some(id) = document.attr(node, "id").map(str::to_string) {
                document.set_attr(node, attrs::ID, id);
            }
        } else {
            let fresh = document.allocator.gen();
            document.assign_ref(node, fresh);
        }
    }
}

fn remove_empty(document: &mut Document) {
    let candidates: Vec<NodeId> = document
        .descendants(document.root())
        .filter(|id| document.is_comment(*id) || document.is_text(*id))
        .collect();

    for node in candidates {
        if document.is_comment(node) {
            document.detach(node);
            continue;
        }
        let length = document.text(node).map(|t| t.chars().count()).unwrap_or(0);
        if length <= 1 || !document.is_all_whitespace(node) || in_preformatted(document, node) {
            continue;
        }
        let only_child = document
            .parent(node)
            .map(|p| document.children(p).len() == 1)
            .unwrap_or(false);
        if only_child {
            document.set_text(node, " ");
        } else {
            document.detach(node);
        }
    }
}

fn in_preformatted(document: &Document, node: NodeId) -> bool {
    document.ancestors(node).into_iter().any(|ancestor| {
        document
            .tag(ancestor)
            .map(|tag| PRESERVE_WHITESPACE.contains(&tag))
            .unwrap_or(false)
    })
}

fn build_tree(markup: &str) -> Result<Document, PaginationError> {
    let mut document = Document::new();
    let mut reader = Reader::from_str(markup);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;
    }

    let mut stack: Vec<NodeId> = vec![document.root()];
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = tag_name(&e)?;
                if skip_depth > 0 || SKIPPED_ELEMENTS.contains(&tag.as_str()) {
                    skip_depth += 1;
                    continue;
                }
                let element = element_from_start(&mut document, &tag, &e)?;
                let parent = current(&stack, &document);
                document.append_child(parent, element);
                if !VOID_ELEMENTS.contains(&tag.as_str()) {
                    stack.push(element);
                }
            }
            Event::Empty(e) => {
                if skip_depth > 0 {
                    continue;
                }
                let tag = tag_name(&e)?;
                if SKIPPED_ELEMENTS.contains(&tag.as_str()) {
                    continue;
                }
                let element = element_from_start(&mut document, &tag, &e)?;
                let parent = current(&stack, &document);
                document.append_child(parent, element);
            }
            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    continue;
                }
                // close up to the nearest matching element, ignore strays
                if let Some(depth) = stack
                    .iter()
                    .rposition(|id| document.is_tag(*id, tag.as_str()))
                {
                    stack.truncate(depth.max(1));
                }
            }
            Event::Text(e) => {
                if skip_depth > 0 {
                    continue;
                }
                let text = e
                    .decode()
                    .map_err(|err| PaginationError::Markup(format!("text decode: {err:?}")))?;
                push_text(&mut document, &stack, &text);
            }
            Event::CData(e) => {
                if skip_depth > 0 {
                    continue;
                }
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| PaginationError::Markup(format!("cdata decode: {err:?}")))?;
                push_text(&mut document, &stack, &text);
            }
            Event::GeneralRef(e) => {
                if skip_depth > 0 {
                    continue;
                }
                let name = e
                    .decode()
                    .map_err(|err| PaginationError::Markup(format!("entity decode: {err:?}")))?;
                let entity = format!("&{name};");
                let resolved = quick_xml::escape::unescape_with(&entity, html_entity)
                    .map(|cow| cow.into_owned())
                    .unwrap_or(entity);
                push_text(&mut document, &stack, &resolved);
            }
            Event::Comment(e) => {
                if skip_depth > 0 {
                    continue;
                }
                let text = e
                    .decode()
                    .map_err(|err| PaginationError::Markup(format!("comment decode: {err:?}")))?;
                let comment = document.create_comment(text.into_owned());
                let parent = current(&stack, &document);
                document.append_child(parent, comment);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    unwrap_body(&mut document);
    Ok(document)
}

fn current(stack: &[NodeId], document: &Document) -> NodeId {
    stack.last().copied().unwrap_or_else(|| document.root())
}

fn tag_name(e: &BytesStart<'_>) -> Result<String, PaginationError> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| PaginationError::Markup(format!("tag name: {err}")))?
        .to_ascii_lowercase();
    Ok(name)
}

fn element_from_start(
    document: &mut Document,
    tag: &str,
    e: &BytesStart<'_>,
) -> Result<NodeId, PaginationError> {
    let element = document.create_element(tag);
    for attr in e.html_attributes().with_checks(false) {
        let attr = attr.map_err(|err| PaginationError::Markup(format!("attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = quick_xml::escape::unescape_with(&raw, html_entity)
            .map(|cow| cow.into_owned())
            .unwrap_or(raw);
        document.set_attr(element, &key, value);
    }
    Ok(element)
}

/// Append text to the open element, merging with a preceding text node so
/// entity references don't fragment words
fn push_text(document: &mut Document, stack: &[NodeId], text: &str) {
    if text.is_empty() {
        return;
    }
    let parent = current(stack, document);
    if let Some(last) = document.last_child(parent) {
        if let Some(existing) = document.text(last) {
            let merged = format!("{existing}{text}");
            document.set_text(last, merged);
            return;
        }
    }
    let node = document.create_text(text);
    document.append_child(parent, node);
}

/// Keep only the body's content when a whole HTML page was given
fn unwrap_body(document: &mut Document) {
    let Some(body) = document.elements_by_tag("body").into_iter().next() else {
        return;
    };
    let root = document.root();
    let content = document.children(body).to_vec();
    for child in document.children(root).to_vec() {
        document.detach(child);
    }
    for child in content {
        document.append_child(root, child);
    }
}

fn html_entity(name: &str) -> Option<&'static str> {
    let resolved = match name {
        "nbsp" => "\u{00A0}",
        "shy" => "\u{00AD}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        "copy" => "\u{00A9}",
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => return None,
    };
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_node_gets_a_ref_and_ids_are_shadowed() {
        let doc = ContentParser::parse(r#"<section id="intro"><p>Hello <em>there</em></p></section>"#)
            .unwrap();
        let section = doc.first_child(doc.root()).unwrap();
        assert_eq!(doc.attr(section, attrs::ID), Some("intro"));
        assert_eq!(doc.attr(section, "id"), Some("intro"));
        for node in doc.descendants(doc.root()) {
            let node_ref = doc.node_ref(node).expect("tagged");
            assert_eq!(doc.find_by_ref(node_ref), Some(node));
            if doc.is_element(node) {
                assert_eq!(doc.attr(node, attrs::REF), Some(node_ref.as_str()));
            }
        }
    }

    #[test]
    fn existing_refs_are_kept() {
        let doc = ContentParser::parse(r#"<div data-ref="ref-7"><p>a</p></div>"#).unwrap();
        let div = doc.first_child(doc.root()).unwrap();
        assert_eq!(doc.node_ref(div).unwrap().as_str(), "ref-7");
        let p = doc.first_child(div).unwrap();
        assert_ne!(doc.node_ref(p).unwrap().as_str(), "ref-7");
    }

    #[test]
    fn whitespace_is_stripped_except_in_pre() {
        let doc = ContentParser::parse(
            "<div>\n   <p>one</p>\n   <!-- note -->\n  <span>   </span><pre>  \n  </pre></div>",
        )
        .unwrap();
        let div = doc.first_child(doc.root()).unwrap();
        let tags: Vec<Option<&str>> = doc.children(div).iter().map(|c| doc.tag(*c)).collect();
        assert_eq!(tags, vec![Some("p"), Some("span"), Some("pre")]);
        let span = doc.children(div)[1];
        assert_eq!(doc.text_content(span), " ");
        let pre = doc.children(div)[2];
        assert_eq!(doc.text_content(pre), "  \n  ");
    }

    #[test]
    fn void_elements_and_entities() {
        let doc = ContentParser::parse("<p>exam&shy;ple<br>next &amp; last<img src=a.png></p>")
            .unwrap();
        let p = doc.first_child(doc.root()).unwrap();
        let kinds: Vec<String> = doc
            .children(p)
            .iter()
            .map(|c| {
                doc.tag(*c)
                    .map(str::to_string)
                    .unwrap_or_else(|| doc.text(*c).unwrap_or_default().to_string())
            })
            .collect();
        assert_eq!(kinds, vec!["exam\u{AD}ple", "br", "next & last", "img"]);
    }

    #[test]
    fn body_content_is_unwrapped() {
        let doc = ContentParser::parse(
            "<html><head><title>x</title></head><body><h1>Title</h1><p>Body</p></body></html>",
        )
        .unwrap();
        let tags: Vec<Option<&str>> = doc.children(doc.root()).iter().map(|c| doc.tag(*c)).collect();
        assert_eq!(tags, vec![Some("h1"), Some("p")]);
    }
}
