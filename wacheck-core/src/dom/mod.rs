//! Arena-backed document tree.
//!
//! Nodes live in a `generational_arena` and are linked intrusively through
//! parent, first/last child and sibling handles, so upward walks used by
//! selector matching never allocate. The tree is read-only for the style
//! code except for the property map attached to every element by the
//! cascade.

use generational_arena::Arena;
use string_cache::DefaultAtom;

use crate::css::PropertyMap;
use crate::location::Location;

pub type NodeId = generational_arena::Index;

#[derive(Debug, Clone)]
pub enum Node {
    Root(RootData),
    Element(ElementData),
    Text(TextData),
}

#[derive(Debug, Clone, Default)]
pub struct RootData {
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag_name: DefaultAtom,
    pub attributes: Vec<(DefaultAtom, String)>,
    pub style: PropertyMap,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

impl ElementData {
    pub fn new(tag_name: &str, attributes: Vec<(DefaultAtom, String)>) -> Self {
        ElementData {
            tag_name: DefaultAtom::from(tag_name),
            attributes,
            style: PropertyMap::default(),
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextData {
    pub text: String,
    pub parent: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

impl TextData {
    pub fn new(text: &str) -> Self {
        TextData {
            text: text.to_string(),
            parent: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub nodes: Arena<Node>,
    pub root_id: NodeId,
    /// Where the document was loaded from; base for relative stylesheet URLs.
    pub location: Option<Location>,
    /// Response headers the document was served with.
    pub headers: Vec<(String, String)>,
    pub(crate) styles_assigned: bool,
}

impl Default for Document {
    fn default() -> Self {
        let mut nodes = Arena::new();
        let root_id = nodes.insert(Node::Root(RootData::default()));
        Document {
            nodes,
            root_id,
            location: None,
            headers: Vec::new(),
            styles_assigned: false,
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Case-insensitive response header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    pub fn append_child(&mut self, parent_id: NodeId, child_id: NodeId) {
        let prev_last = match self.nodes.get_mut(parent_id) {
            Some(Node::Root(data)) => {
                let prev = data.last_child;
                if data.first_child.is_none() {
                    data.first_child = Some(child_id);
                }
                data.last_child = Some(child_id);
                prev
            }
            Some(Node::Element(data)) => {
                let prev = data.last_child;
                if data.first_child.is_none() {
                    data.first_child = Some(child_id);
                }
                data.last_child = Some(child_id);
                prev
            }
            // Text nodes and stale handles cannot take children.
            Some(Node::Text(_)) | None => return,
        };

        if let Some(prev) = prev_last {
            self.set_next_sibling(prev, Some(child_id));
        }
        match self.nodes.get_mut(child_id) {
            Some(Node::Element(data)) => {
                data.parent = Some(parent_id);
                data.prev_sibling = prev_last;
                data.next_sibling = None;
            }
            Some(Node::Text(data)) => {
                data.parent = Some(parent_id);
                data.prev_sibling = prev_last;
                data.next_sibling = None;
            }
            Some(Node::Root(_)) | None => {}
        }
    }

    /// Detaches `node_id` from its parent and drops it with its whole subtree.
    pub fn remove_node(&mut self, node_id: NodeId) {
        let parent = self.parent_of(node_id);
        let prev = self.prev_sibling_of(node_id);
        let next = self.next_sibling_of(node_id);

        if let Some(p) = prev {
            self.set_next_sibling(p, next);
        }
        if let Some(n) = next {
            self.set_prev_sibling(n, prev);
        }
        if let Some(pid) = parent {
            match self.nodes.get_mut(pid) {
                Some(Node::Root(data)) => {
                    if data.first_child == Some(node_id) {
                        data.first_child = next;
                    }
                    if data.last_child == Some(node_id) {
                        data.last_child = prev;
                    }
                }
                Some(Node::Element(data)) => {
                    if data.first_child == Some(node_id) {
                        data.first_child = next;
                    }
                    if data.last_child == Some(node_id) {
                        data.last_child = prev;
                    }
                }
                _ => {}
            }
        }

        let mut stack = vec![node_id];
        while let Some(id) = stack.pop() {
            let mut child = self.first_child_of(id);
            while let Some(c) = child {
                stack.push(c);
                child = self.next_sibling_of(c);
            }
            self.nodes.remove(id);
        }
    }

    fn set_next_sibling(&mut self, id: NodeId, next: Option<NodeId>) {
        match self.nodes.get_mut(id) {
            Some(Node::Element(data)) => data.next_sibling = next,
            Some(Node::Text(data)) => data.next_sibling = next,
            _ => {}
        }
    }

    fn set_prev_sibling(&mut self, id: NodeId, prev: Option<NodeId>) {
        match self.nodes.get_mut(id) {
            Some(Node::Element(data)) => data.prev_sibling = prev,
            Some(Node::Text(data)) => data.prev_sibling = prev,
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Raw links (any node kind)
    // -----------------------------------------------------------------------

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes.get(id)? {
            Node::Element(data) => data.parent,
            Node::Text(data) => data.parent,
            Node::Root(_) => None,
        }
    }

    pub fn first_child_of(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes.get(id)? {
            Node::Root(data) => data.first_child,
            Node::Element(data) => data.first_child,
            Node::Text(_) => None,
        }
    }

    pub fn last_child_of(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes.get(id)? {
            Node::Root(data) => data.last_child,
            Node::Element(data) => data.last_child,
            Node::Text(_) => None,
        }
    }

    pub fn next_sibling_of(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes.get(id)? {
            Node::Element(data) => data.next_sibling,
            Node::Text(data) => data.next_sibling,
            Node::Root(_) => None,
        }
    }

    pub fn prev_sibling_of(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes.get(id)? {
            Node::Element(data) => data.prev_sibling,
            Node::Text(data) => data.prev_sibling,
            Node::Root(_) => None,
        }
    }

    // -----------------------------------------------------------------------
    // Element view used by selectors and the cascade
    // -----------------------------------------------------------------------

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.nodes.get(id)? {
            Node::Element(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|data| &*data.tag_name)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attribute_names(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.element(id)
            .into_iter()
            .flat_map(|data| data.attributes.iter().map(|(k, _)| &**k))
    }

    /// The parent element. The document root is not an element.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent_of(id).filter(|p| self.is_element(*p))
    }

    /// Element children in document order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = self.first_child_of(id);
        while let Some(c) = child {
            if self.is_element(c) {
                out.push(c);
            }
            child = self.next_sibling_of(c);
        }
        out
    }

    /// The closest preceding element sibling; text in between is skipped.
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut sibling = self.prev_sibling_of(id);
        while let Some(s) = sibling {
            if self.is_element(s) {
                return Some(s);
            }
            sibling = self.prev_sibling_of(s);
        }
        None
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut sibling = self.next_sibling_of(id);
        while let Some(s) = sibling {
            if self.is_element(s) {
                return Some(s);
            }
            sibling = self.next_sibling_of(s);
        }
        None
    }

    /// Text of the node's direct text children.
    pub fn text(&self, id: NodeId) -> String {
        match self.nodes.get(id) {
            Some(Node::Text(data)) => data.text.clone(),
            Some(_) => {
                let mut text = String::new();
                let mut child = self.first_child_of(id);
                while let Some(c) = child {
                    if let Some(Node::Text(data)) = self.nodes.get(c) {
                        text.push_str(&data.text);
                    }
                    child = self.next_sibling_of(c);
                }
                text
            }
            None => String::new(),
        }
    }

    /// All elements in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        if let Some(first) = self.first_child_of(self.root_id) {
            stack.push(first);
        }
        while let Some(id) = stack.pop() {
            if self.is_element(id) {
                out.push(id);
            }
            if let Some(next) = self.next_sibling_of(id) {
                stack.push(next);
            }
            if let Some(child) = self.first_child_of(id) {
                stack.push(child);
            }
        }
        out
    }

    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.elements()
            .into_iter()
            .filter(move |id| self.name(*id) == Some(name))
    }

    // -----------------------------------------------------------------------
    // Style attachment
    // -----------------------------------------------------------------------

    /// Properties resolved for the element, excluding inherited ones.
    pub fn style(&self, id: NodeId) -> Option<&PropertyMap> {
        self.element(id).map(|data| &data.style)
    }

    pub fn set_style(&mut self, id: NodeId, style: PropertyMap) {
        if let Some(Node::Element(data)) = self.nodes.get_mut(id) {
            data.style = style;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(doc: &mut Document, parent: NodeId, name: &str) -> NodeId {
        let id = doc.add_node(Node::Element(ElementData::new(name, Vec::new())));
        doc.append_child(parent, id);
        id
    }

    #[test]
    fn element_siblings_skip_text() {
        let mut doc = Document::new();
        let root = doc.root_id;
        let ul = element(&mut doc, root, "ul");
        let first = element(&mut doc, ul, "li");
        let text = doc.add_node(Node::Text(TextData::new("\n  ")));
        doc.append_child(ul, text);
        let second = element(&mut doc, ul, "li");

        assert_eq!(doc.prev_sibling(second), Some(first));
        assert_eq!(doc.prev_sibling_of(second), Some(text));
        assert_eq!(doc.next_sibling(first), Some(second));
        assert_eq!(doc.prev_sibling(first), None);
        assert_eq!(doc.children(ul), vec![first, second]);
    }

    #[test]
    fn root_is_not_an_element_parent() {
        let mut doc = Document::new();
        let root = doc.root_id;
        let html = element(&mut doc, root, "html");
        let body = element(&mut doc, html, "body");

        assert_eq!(doc.parent(body), Some(html));
        assert_eq!(doc.parent(html), None);
        assert_eq!(doc.parent_of(html), Some(doc.root_id));
    }

    #[test]
    fn elements_are_listed_in_document_order() {
        let mut doc = Document::new();
        let root = doc.root_id;
        let html = element(&mut doc, root, "html");
        let head = element(&mut doc, html, "head");
        let title = element(&mut doc, head, "title");
        let body = element(&mut doc, html, "body");
        let p = element(&mut doc, body, "p");

        assert_eq!(doc.elements(), vec![html, head, title, body, p]);
        assert_eq!(doc.elements_named("p").collect::<Vec<_>>(), vec![p]);
    }

    #[test]
    fn remove_node_removes_descendants() {
        let mut doc = Document::new();
        let root = doc.root_id;
        let parent = element(&mut doc, root, "div");
        let child = element(&mut doc, parent, "span");
        let grandchild = doc.add_node(Node::Text(TextData::new("hello")));
        doc.append_child(child, grandchild);
        let sibling = element(&mut doc, root, "p");

        doc.remove_node(parent);

        assert!(doc.nodes.get(parent).is_none());
        assert!(doc.nodes.get(child).is_none());
        assert!(doc.nodes.get(grandchild).is_none());
        assert_eq!(doc.first_child_of(doc.root_id), Some(sibling));
        assert_eq!(doc.prev_sibling_of(sibling), None);
    }

    #[test]
    fn text_joins_direct_text_children() {
        let mut doc = Document::new();
        let root = doc.root_id;
        let p = element(&mut doc, root, "p");
        let a = doc.add_node(Node::Text(TextData::new("Hello ")));
        doc.append_child(p, a);
        let b = element(&mut doc, p, "b");
        let inner = doc.add_node(Node::Text(TextData::new("bold")));
        doc.append_child(b, inner);
        let c = doc.add_node(Node::Text(TextData::new("world")));
        doc.append_child(p, c);

        assert_eq!(doc.text(p), "Hello world");
        assert_eq!(doc.text(b), "bold");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let doc = Document::new().with_headers(vec![(
            "Content-Style-Type".to_string(),
            "text/css".to_string(),
        )]);
        assert_eq!(doc.header("content-style-type"), Some("text/css"));
        assert_eq!(doc.header("content-type"), None);
    }
}
