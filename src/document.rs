use crate::rect::Rect;
use crate::refs::{Ref, RefAllocator};
use id_arena::{Arena, Id};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle of a node inside one [`Document`]'s arena
pub type NodeId = Id<Node>;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Bookkeeping attribute names shared between the parser, the layout engine
/// and the break-rule annotator
pub mod attrs {
    pub const REF: &str = "data-ref";
    pub const ID: &str = "data-id";
    pub const SPLIT_FROM: &str = "data-split-from";
    pub const SPLIT_TO: &str = "data-split-to";
    pub const BREAK_BEFORE: &str = "data-break-before";
    pub const BREAK_AFTER: &str = "data-break-after";
    pub const PREVIOUS_BREAK_AFTER: &str = "data-previous-break-after";
    pub const PAGE: &str = "data-page";
    pub const LAYOUT: &str = "data-layout";
    pub const HYPHEN: &str = "data-hyphenated";
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// The root of a document, or of a detached fragment
    Root,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    node_ref: Option<Ref>,
    /// Offset (in chars) of a text clone's first char inside its source text
    text_offset: usize,
}

impl Node {
    fn new(data: NodeData) -> Node {
        Node {
            data,
            parent: None,
            children: Vec::new(),
            node_ref: None,
            text_offset: 0,
        }
    }
}

/// An arena-backed node tree. The same structure holds the read-only source
/// tree and every page's rendered tree; nodes are never freed individually,
/// a rendered tree is simply dropped when its page lays out again.
#[derive(Debug)]
pub struct Document {
    nodes: Arena<Node>,
    root: NodeId,
    refs: HashMap<Ref, NodeId>,
    pub(crate) allocator: RefAllocator,
    frame: Option<Rect>,
    id: u64,
    revision: u64,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    pub fn new() -> Document {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new(NodeData::Root));
        Document {
            nodes,
            root,
            refs: HashMap::new(),
            allocator: RefAllocator::new(),
            frame: None,
            id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
        }
    }

    /// A rendered document laid into `frame`, the box its root is placed in
    pub fn with_frame(frame: Rect) -> Document {
        let mut document = Document::new();
        document.frame = Some(frame);
        document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Unique per document, used together with [`Document::revision`] to key
    /// geometry caches
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bumped on every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn frame(&self) -> Option<Rect> {
        self.frame
    }

    pub fn set_frame(&mut self, frame: Rect) {
        self.frame = Some(frame);
        self.touch();
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id].data
    }

    // ---- creation ----

    pub fn create_element<S: Into<String>>(&mut self, name: S) -> NodeId {
        self.nodes.alloc(Node::new(NodeData::Element {
            name: name.into().to_ascii_lowercase(),
            attrs: Vec::new(),
        }))
    }

    pub fn create_text<S: Into<String>>(&mut self, text: S) -> NodeId {
        self.nodes.alloc(Node::new(NodeData::Text(text.into())))
    }

    pub fn create_comment<S: Into<String>>(&mut self, text: S) -> NodeId {
        self.nodes.alloc(Node::new(NodeData::Comment(text.into())))
    }

    /// A detached root, used to hold extracted content
    pub fn create_fragment(&mut self) -> NodeId {
        self.nodes.alloc(Node::new(NodeData::Root))
    }

    // ---- kinds ----

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].data, NodeData::Element { .. })
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].data, NodeData::Text(_))
    }

    pub fn is_comment(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].data, NodeData::Comment(_))
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].data, NodeData::Root)
    }

    /// Lowercase tag name for elements
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    // ---- attributes ----

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs.as_slice(),
            _ => &[],
        }
    }

    pub fn set_attr<S: Into<String>>(&mut self, id: NodeId, name: &str, value: S) {
        let value = value.into();
        if let NodeData::Element { attrs, .. } = &mut self.nodes[id].data {
            if let Some(slot) = attrs.iter_mut().find(|(key, _)| key == name) {
                slot.1 = value;
            } else {
                attrs.push((name.to_string(), value));
            }
        }
        self.touch();
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let removed = match &mut self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .position(|(key, _)| key == name)
                .map(|index| attrs.remove(index).1),
            _ => None,
        };
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    // ---- text ----

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn set_text<S: Into<String>>(&mut self, id: NodeId, value: S) {
        match &mut self.nodes[id].data {
            NodeData::Text(text) | NodeData::Comment(text) => *text = value.into(),
            _ => return,
        }
        self.touch();
    }

    /// Offset of a text clone inside its source text node
    pub fn text_offset(&self, id: NodeId) -> usize {
        self.nodes[id].text_offset
    }

    pub fn set_text_offset(&mut self, id: NodeId, offset: usize) {
        self.nodes[id].text_offset = offset;
    }

    /// Concatenated text of a node and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Comment(_) => {}
            _ => {
                for child in &self.nodes[id].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    // ---- refs ----

    pub fn node_ref(&self, id: NodeId) -> Option<&Ref> {
        self.nodes[id].node_ref.as_ref()
    }

    /// Attach a ref to a node and index it
    pub fn assign_ref(&mut self, id: NodeId, node_ref: Ref) {
        self.allocator.observe(&node_ref);
        self.nodes[id].node_ref = Some(node_ref.clone());
        self.refs.insert(node_ref, id);
    }

    /// Make `id` the node returned by [`Document::find_by_ref`] for its ref
    pub fn index_ref(&mut self, id: NodeId) {
        if let Some(node_ref) = self.nodes[id].node_ref.clone() {
            self.refs.insert(node_ref, id);
        }
    }

    /// Find the attached node carrying `node_ref`. The index is tried first;
    /// if the indexed node has since been detached the tree is searched.
    pub fn find_by_ref(&self, node_ref: &Ref) -> Option<NodeId> {
        if let Some(id) = self.refs.get(node_ref) {
            if self.is_attached(*id) {
                return Some(*id);
            }
        }
        self.descendants(self.root)
            .find(|id| self.nodes[*id].node_ref.as_ref() == Some(node_ref))
    }

    /// The node in `self` that corresponds to `id` from `other`
    pub fn find_counterpart(&self, other: &Document, id: NodeId) -> Option<NodeId> {
        if other.is_root(id) {
            return Some(self.root);
        }
        other.node_ref(id).and_then(|r| self.find_by_ref(r))
    }

    // ---- navigation ----

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// The parent, unless it is the root of the tree
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|p| !self.is_root(*p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].children.first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].children.last().copied()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent].children.iter().position(|c| *c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.nodes[parent].children.get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.nodes[parent].children.get(i).copied())
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.nodes[id].children.get(index).copied()
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.root
    }

    /// Whether `node` is `ancestor` or sits below it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Nearest element (the node itself included) with the given tag, never
    /// looking past `limiter`
    pub fn closest(&self, id: NodeId, tag: &str, limiter: Option<NodeId>) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if Some(node) == limiter {
                return None;
            }
            if self.is_tag(node, tag) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Strict ancestors from the parent up to (but excluding) the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent_element(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent_element(node);
        }
        out
    }

    pub fn is_all_whitespace(&self, id: NodeId) -> bool {
        self.text(id)
            .map(|t| t.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')))
            .unwrap_or(false)
    }

    /// Comments and whitespace-only text carry no content of their own
    pub fn is_ignorable(&self, id: NodeId) -> bool {
        self.is_comment(id) || (self.is_text(id) && self.is_all_whitespace(id))
    }

    pub fn next_significant(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.next_sibling(id);
        while let Some(node) = current {
            if !self.is_ignorable(node) {
                return Some(node);
            }
            current = self.next_sibling(node);
        }
        None
    }

    pub fn previous_significant(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.previous_sibling(id);
        while let Some(node) = current {
            if !self.is_ignorable(node) {
                return Some(node);
            }
            current = self.previous_sibling(node);
        }
        None
    }

    /// The next node in document order that is not inside `id`, climbing out
    /// of ancestors as needed but never past `limiter`
    pub fn node_after(&self, id: NodeId, limiter: Option<NodeId>) -> Option<NodeId> {
        if Some(id) == limiter {
            return None;
        }
        if let Some(next) = self.next_significant(id) {
            return Some(next);
        }
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            if Some(parent) == limiter {
                return None;
            }
            if let Some(next) = self.next_significant(parent) {
                return Some(next);
            }
            current = parent;
        }
        None
    }

    /// The next node in document order outside of `id`'s subtree, whitespace
    /// included, never climbing past `limiter`
    pub fn following(&self, id: NodeId, limiter: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            if current == limiter {
                return None;
            }
            if let Some(next) = self.next_sibling(current) {
                return Some(next);
            }
            current = self.parent(current)?;
        }
    }

    /// Mirror of [`Document::node_after`] going backwards
    pub fn node_before(&self, id: NodeId, limiter: Option<NodeId>) -> Option<NodeId> {
        if Some(id) == limiter {
            return None;
        }
        if let Some(previous) = self.previous_significant(id) {
            return Some(previous);
        }
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            if Some(parent) == limiter {
                return None;
            }
            if let Some(previous) = self.previous_significant(parent) {
                return Some(previous);
            }
            current = parent;
        }
        None
    }

    /// Depth-first walk starting at `start`, staying inside `limiter`
    pub fn walk(&self, start: Option<NodeId>, limiter: NodeId) -> Walk<'_> {
        Walk {
            document: self,
            next: start,
            limiter,
        }
    }

    /// All nodes below `id` in document order, `id` excluded
    pub fn descendants(&self, id: NodeId) -> Walk<'_> {
        self.walk(self.first_child(id), id)
    }

    /// Attached elements with the given tag, in document order
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .filter(|id| self.is_tag(*id, tag))
            .collect()
    }

    // ---- mutation ----

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|c| *c != id);
            self.touch();
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        self.touch();
    }

    /// Insert `child` before `reference`, or at the end when there is none
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.detach(child);
        let index = reference
            .and_then(|r| self.nodes[parent].children.iter().position(|c| *c == r))
            .unwrap_or(self.nodes[parent].children.len());
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(index, child);
        self.touch();
    }

    /// Copy a node from another document into this one, detached. The copy
    /// keeps the ref and the text offset; with `deep` the subtree comes along.
    pub fn import(&mut self, source: &Document, id: NodeId, deep: bool) -> NodeId {
        let original = source.node(id);
        let data = match &original.data {
            NodeData::Root => NodeData::Root,
            other => other.clone(),
        };
        let copy = self.nodes.alloc(Node {
            data,
            parent: None,
            children: Vec::new(),
            node_ref: original.node_ref.clone(),
            text_offset: original.text_offset,
        });
        if let Some(node_ref) = &original.node_ref {
            self.allocator.observe(node_ref);
        }
        if deep {
            for child in source.children(id).to_vec() {
                let child_copy = self.import(source, child, true);
                self.nodes[child_copy].parent = Some(copy);
                self.nodes[copy].children.push(child_copy);
            }
        }
        self.touch();
        copy
    }

    /// Copy a node of this document, detached
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> NodeId {
        let original = self.nodes[id].clone();
        let copy = self.nodes.alloc(Node {
            data: original.data,
            parent: None,
            children: Vec::new(),
            node_ref: original.node_ref,
            text_offset: original.text_offset,
        });
        if deep {
            for child in original.children {
                let child_copy = self.clone_node(child, true);
                self.nodes[child_copy].parent = Some(copy);
                self.nodes[copy].children.push(child_copy);
            }
        }
        self.touch();
        copy
    }

    /// Index every ref-bearing node below `id`, the node itself included
    pub fn index_subtree(&mut self, id: NodeId) {
        let ids: Vec<NodeId> = std::iter::once(id).chain(self.descendants(id)).collect();
        for node in ids {
            self.index_ref(node);
        }
    }

    /// Remove everything from the boundary point `(container, offset)` to the
    /// end of the document and return it as a detached fragment.
    ///
    /// For a text container `offset` counts chars and the text node is split;
    /// for an element it is a child index. Partially covered ancestors stay in
    /// place and get shallow continuation copies in the fragment, marked with
    /// `data-split-from`.
    pub fn extract_from(&mut self, container: NodeId, offset: usize) -> NodeId {
        let fragment = self.create_fragment();
        let mut pieces: Vec<NodeId> = Vec::new();

        if self.is_text(container) {
            let text = self.text(container).unwrap_or_default().to_string();
            let split_at = text
                .char_indices()
                .nth(offset)
                .map(|(byte, _)| byte)
                .unwrap_or(text.len());
            let (kept, tail) = text.split_at(split_at);
            if !tail.is_empty() {
                let tail_node = self.create_text(tail);
                self.nodes[tail_node].node_ref = self.nodes[container].node_ref.clone();
                self.nodes[tail_node].text_offset = self.nodes[container].text_offset + offset;
                pieces.push(tail_node);
            }
            let kept = kept.to_string();
            self.set_text(container, kept);
        } else {
            let moved: Vec<NodeId> = self.children(container).iter().skip(offset).copied().collect();
            for child in &moved {
                self.detach(*child);
            }
            if container == self.root || self.is_root(container) {
                for child in moved {
                    self.append_child(fragment, child);
                }
                return fragment;
            }
            let copy = self.continuation_copy(container);
            for child in moved {
                self.append_child(copy, child);
            }
            pieces.push(copy);
        }

        let mut level = container;
        while let Some(parent) = self.parent(level) {
            let following: Vec<NodeId> = {
                let siblings = self.children(parent);
                let index = siblings.iter().position(|c| *c == level).unwrap_or(siblings.len());
                siblings.iter().skip(index + 1).copied().collect()
            };
            for sibling in following {
                self.detach(sibling);
                pieces.push(sibling);
            }
            if self.is_root(parent) {
                break;
            }
            let copy = self.continuation_copy(parent);
            for piece in pieces.drain(..) {
                self.append_child(copy, piece);
            }
            pieces.push(copy);
            level = parent;
        }

        for piece in pieces {
            self.append_child(fragment, piece);
        }
        fragment
    }

    fn continuation_copy(&mut self, id: NodeId) -> NodeId {
        let copy = self.clone_node(id, false);
        if let Some(node_ref) = self.node_ref(id).cloned() {
            self.set_attr(copy, attrs::SPLIT_FROM, node_ref.as_str());
        }
        if let Some(original_id) = self.remove_attr(copy, "id") {
            self.set_attr(copy, attrs::ID, original_id);
        }
        copy
    }
}

/// Depth-first document-order iterator bounded by a limiter node
pub struct Walk<'a> {
    document: &'a Document,
    next: Option<NodeId>,
    limiter: NodeId,
}

impl Iterator for Walk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.next?;
        let doc = self.document;
        self.next = if let Some(first) = doc.first_child(node) {
            Some(first)
        } else {
            let mut current = node;
            loop {
                if current == self.limiter {
                    break None;
                }
                if let Some(sibling) = doc.next_sibling(current) {
                    break Some(sibling);
                }
                match doc.parent(current) {
                    Some(parent) if parent != self.limiter => current = parent,
                    _ => break None,
                }
            }
        };
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.create_element("DIV");
        let p = doc.create_element("p");
        let text = doc.create_text("hello world");
        doc.append_child(root, div);
        doc.append_child(div, p);
        doc.append_child(p, text);
        doc.assign_ref(div, Ref::new("d"));
        doc.assign_ref(p, Ref::new("p"));
        doc.assign_ref(text, Ref::new("t"));
        (doc, div, p, text)
    }

    #[test]
    fn walk_visits_in_document_order() {
        let (mut doc, div, p, text) = sample();
        let tail = doc.create_element("span");
        doc.append_child(div, tail);
        let order: Vec<NodeId> = doc.descendants(doc.root()).collect();
        assert_eq!(order, vec![div, p, text, tail]);
        assert_eq!(doc.tag(div), Some("div"));
    }

    #[test]
    fn node_after_climbs_out_of_subtrees() {
        let (mut doc, div, p, text) = sample();
        let sibling = doc.create_element("p");
        doc.append_child(doc.root(), sibling);
        assert_eq!(doc.node_after(text, Some(doc.root())), Some(sibling));
        assert_eq!(doc.node_after(p, Some(div)), None);
        assert_eq!(doc.node_before(sibling, Some(doc.root())), Some(div));
    }

    #[test]
    fn extraction_splits_text_and_copies_ancestors() {
        let (mut doc, div, p, text) = sample();
        let after = doc.create_element("p");
        doc.append_child(div, after);

        let fragment = doc.extract_from(text, 6);
        assert_eq!(doc.text(text), Some("hello "));
        assert_eq!(doc.children(div), &[p]);

        let top = doc.children(fragment).to_vec();
        assert_eq!(top.len(), 1);
        assert_eq!(doc.attr(top[0], attrs::SPLIT_FROM), Some("d"));
        let inner = doc.children(top[0]).to_vec();
        assert_eq!(inner.len(), 2);
        assert_eq!(doc.text_content(inner[0]), "world");
        assert_eq!(inner[1], after);
        let tail = doc.first_child(inner[0]).unwrap();
        assert_eq!(doc.text_offset(tail), 6);
        assert_eq!(doc.node_ref(tail), Some(&Ref::new("t")));
    }

    #[test]
    fn find_by_ref_skips_detached_nodes() {
        let (mut doc, _div, p, _text) = sample();
        let copy = doc.clone_node(p, true);
        doc.append_child(doc.root(), copy);
        doc.detach(p);
        assert_eq!(doc.find_by_ref(&Ref::new("p")), Some(copy));
    }
}
