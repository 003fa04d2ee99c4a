//! In-memory output adapter for `waterfall`.
//!
//! [`MemoryDom`] is a tiny DOM: elements with attributes and listeners, text nodes
//! and raw markup. It serialises to HTML and dispatches bubbling events, which is
//! enough to drive and observe the renderer in tests and on the server.

mod html;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::trace;
use waterfall_core::{Adapter, AdapterError, Event, Listener, Props, Value};

/// Handle to a node in a [`MemoryDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(usize);

#[derive(Debug)]
enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, Value>,
        listeners: Vec<(String, Listener)>,
    },
    Text(String),
    Raw(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

#[derive(Debug, Default)]
struct Document {
    nodes: Vec<NodeData>,
    roots: Vec<NodeRef>,
}

impl Document {
    fn push(&mut self, kind: NodeKind) -> NodeRef {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeRef(self.nodes.len() - 1)
    }

    fn node(&self, node: NodeRef, operation: &'static str) -> Result<&NodeData, AdapterError> {
        self.nodes
            .get(node.0)
            .ok_or_else(|| AdapterError::new(operation, format!("unknown node {}", node.0)))
    }

    fn node_mut(
        &mut self,
        node: NodeRef,
        operation: &'static str,
    ) -> Result<&mut NodeData, AdapterError> {
        self.nodes
            .get_mut(node.0)
            .ok_or_else(|| AdapterError::new(operation, format!("unknown node {}", node.0)))
    }

    fn detach(&mut self, node: NodeRef) {
        let Some(parent) = self.nodes.get_mut(node.0).and_then(|data| data.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.retain(|child| *child != node);
        }
    }

    fn listeners(
        &mut self,
        node: NodeRef,
        operation: &'static str,
    ) -> Result<&mut Vec<(String, Listener)>, AdapterError> {
        match &mut self.node_mut(node, operation)?.kind {
            NodeKind::Element { listeners, .. } => Ok(listeners),
            _ => Err(AdapterError::new(operation, "only elements take listeners")),
        }
    }
}

/// Converts an attribute value the way the DOM stringifies it. `null` means the
/// attribute is absent.
fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

/// A shared in-memory document. Clones refer to the same document.
#[derive(Debug, Clone, Default)]
pub struct MemoryDom {
    document: Rc<RefCell<Document>>,
}

impl MemoryDom {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached `body` element to render into.
    #[must_use]
    pub fn create_root(&self) -> NodeRef {
        let mut document = self.document.borrow_mut();
        let root = document.push(NodeKind::Element {
            tag: "body".to_owned(),
            attributes: BTreeMap::new(),
            listeners: Vec::new(),
        });
        document.roots.push(root);
        root
    }

    /// Serialises the children of `node`.
    #[must_use]
    pub fn inner_html(&self, node: NodeRef) -> String {
        let document = self.document.borrow();
        let mut out = String::new();
        if let Some(data) = document.nodes.get(node.0) {
            for child in &data.children {
                html::write_node(&document, *child, &mut out);
            }
        }
        out
    }

    /// Serialises `node` itself.
    #[must_use]
    pub fn outer_html(&self, node: NodeRef) -> String {
        let document = self.document.borrow();
        let mut out = String::new();
        html::write_node(&document, node, &mut out);
        out
    }

    /// Finds the first element below a root whose `id` attribute is `id`.
    #[must_use]
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeRef> {
        let document = self.document.borrow();
        let mut stack: Vec<NodeRef> = document.roots.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            let data = document.nodes.get(node.0)?;
            if let NodeKind::Element { attributes, .. } = &data.kind {
                if attributes.get("id").and_then(attribute_text).as_deref() == Some(id) {
                    return Some(node);
                }
            }
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }

    /// The children of `node`, in order.
    #[must_use]
    pub fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        self.document
            .borrow()
            .nodes
            .get(node.0)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    /// The parent of `node`, if attached.
    #[must_use]
    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.document.borrow().nodes.get(node.0)?.parent
    }

    /// Number of listeners registered directly on `node`.
    #[must_use]
    pub fn listener_count(&self, node: NodeRef) -> usize {
        match self.document.borrow().nodes.get(node.0).map(|data| &data.kind) {
            Some(NodeKind::Element { listeners, .. }) => listeners.len(),
            _ => 0,
        }
    }

    /// Dispatches an event at `node`, bubbling through its ancestors.
    ///
    /// Listeners run after the document is released, so they may render.
    pub fn dispatch(&self, node: NodeRef, name: &str) {
        let (event, listeners) = {
            let document = self.document.borrow();
            let mut target = BTreeMap::new();
            let mut listeners = Vec::new();
            let mut current = Some(node);
            while let Some(at) = current {
                let Some(data) = document.nodes.get(at.0) else { break };
                if let NodeKind::Element {
                    attributes,
                    listeners: registered,
                    ..
                } = &data.kind
                {
                    if at == node {
                        target.clone_from(attributes);
                    }
                    listeners.extend(
                        registered
                            .iter()
                            .filter(|(event, _)| event == name)
                            .map(|(_, listener)| listener.clone()),
                    );
                }
                current = data.parent;
            }
            (
                Event {
                    name: name.to_owned(),
                    target,
                },
                listeners,
            )
        };
        for listener in listeners {
            listener.call(&event);
        }
    }

    /// Dispatches a `click` at `node`.
    pub fn click(&self, node: NodeRef) {
        self.dispatch(node, "click");
    }
}

impl Adapter for MemoryDom {
    type Node = NodeRef;

    fn create_node(&self, tag: &str, props: &Props) -> Result<NodeRef, AdapterError> {
        if tag.is_empty() {
            return Err(AdapterError::new("create_node", "empty tag name"));
        }
        let attributes = props
            .attributes()
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(self.document.borrow_mut().push(NodeKind::Element {
            tag: tag.to_owned(),
            attributes,
            listeners: Vec::new(),
        }))
    }

    fn patch_node(&self, node: &NodeRef, old: &Props, new: &Props) -> Result<(), AdapterError> {
        let mut document = self.document.borrow_mut();
        let NodeKind::Element { attributes, .. } = &mut document.node_mut(*node, "patch_node")?.kind
        else {
            return Err(AdapterError::new("patch_node", "not an element"));
        };
        for name in old.attributes().keys() {
            if new.get(name).is_none_or(Value::is_null) {
                attributes.remove(name);
            }
        }
        for (name, value) in new.attributes() {
            if !value.is_null() {
                attributes.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn insert_node(
        &self,
        node: &NodeRef,
        parent: &NodeRef,
        before: Option<&NodeRef>,
    ) -> Result<(), AdapterError> {
        let mut document = self.document.borrow_mut();
        document.node(*node, "insert_node")?;
        if !matches!(document.node(*parent, "insert_node")?.kind, NodeKind::Element { .. }) {
            return Err(AdapterError::new("insert_node", "parent is not an element"));
        }
        document.detach(*node);
        let siblings = &mut document.node_mut(*parent, "insert_node")?.children;
        let index = match before {
            Some(before) => siblings
                .iter()
                .position(|child| child == before)
                .ok_or_else(|| AdapterError::new("insert_node", "reference node is not a child"))?,
            None => siblings.len(),
        };
        siblings.insert(index, *node);
        document.node_mut(*node, "insert_node")?.parent = Some(*parent);
        trace!(node = node.0, parent = parent.0, index, "inserted node");
        Ok(())
    }

    fn remove_node(&self, node: &NodeRef) -> Result<(), AdapterError> {
        let mut document = self.document.borrow_mut();
        document.node(*node, "remove_node")?;
        document.detach(*node);
        Ok(())
    }

    fn create_text_node(&self, text: &str) -> Result<NodeRef, AdapterError> {
        Ok(self.document.borrow_mut().push(NodeKind::Text(text.to_owned())))
    }

    fn update_text(&self, node: &NodeRef, text: &str) -> Result<(), AdapterError> {
        let mut document = self.document.borrow_mut();
        match &mut document.node_mut(*node, "update_text")?.kind {
            NodeKind::Text(content) => {
                text.clone_into(content);
                Ok(())
            }
            _ => Err(AdapterError::new("update_text", "not a text node")),
        }
    }

    fn create_raw(&self, markup: &str) -> Result<NodeRef, AdapterError> {
        Ok(self.document.borrow_mut().push(NodeKind::Raw(markup.to_owned())))
    }

    fn add_event_listener(
        &self,
        node: &NodeRef,
        name: &str,
        listener: &Listener,
    ) -> Result<(), AdapterError> {
        let mut document = self.document.borrow_mut();
        let listeners = document.listeners(*node, "add_event_listener")?;
        if !listeners.iter().any(|(event, existing)| event == name && existing == listener) {
            listeners.push((name.to_owned(), listener.clone()));
        }
        Ok(())
    }

    fn remove_event_listener(
        &self,
        node: &NodeRef,
        name: &str,
        listener: &Listener,
    ) -> Result<(), AdapterError> {
        let mut document = self.document.borrow_mut();
        document
            .listeners(*node, "remove_event_listener")?
            .retain(|(event, existing)| !(event == name && existing == listener));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use waterfall_core::json;

    use super::*;

    fn attrs(value: &Value) -> Props {
        value
            .as_object()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    #[test]
    fn serialises_attributes_like_the_dom() {
        let dom = MemoryDom::new();
        let root = dom.create_root();
        let div = dom
            .create_node("div", &attrs(&json!({"id": 0, "hidden": true, "title": "a\"b", "gone": null})))
            .unwrap();
        let text = dom.create_text_node("1 < 2 & 3").unwrap();
        dom.insert_node(&text, &div, None).unwrap();
        dom.insert_node(&div, &root, None).unwrap();

        assert_eq!(
            dom.inner_html(root),
            r#"<div hidden="true" id="0" title="a&quot;b">1 &lt; 2 &amp; 3</div>"#
        );
        assert_eq!(dom.get_element_by_id("0"), Some(div));
    }

    #[test]
    fn inserting_an_attached_node_moves_it() {
        let dom = MemoryDom::new();
        let root = dom.create_root();
        let a = dom.create_text_node("a").unwrap();
        let b = dom.create_text_node("b").unwrap();
        dom.insert_node(&a, &root, None).unwrap();
        dom.insert_node(&b, &root, None).unwrap();
        dom.insert_node(&b, &root, Some(&a)).unwrap();

        assert_eq!(dom.children(root), vec![b, a]);
        assert_eq!(dom.inner_html(root), "ba");
        dom.remove_node(&b).unwrap();
        assert_eq!(dom.parent(b), None);
        assert_eq!(dom.inner_html(root), "a");
    }

    #[test]
    fn patch_adds_and_removes_attributes() {
        let dom = MemoryDom::new();
        let old = attrs(&json!({"id": "x", "class": "a"}));
        let new = attrs(&json!({"class": "b", "title": "t"}));
        let node = dom.create_node("p", &old).unwrap();
        dom.patch_node(&node, &old, &new).unwrap();
        assert_eq!(dom.outer_html(node), r#"<p class="b" title="t"></p>"#);
    }

    #[test]
    fn events_bubble_to_ancestors() {
        let dom = MemoryDom::new();
        let outer = dom.create_node("div", &Props::new()).unwrap();
        let button = dom.create_node("button", &attrs(&json!({"id": "button"}))).unwrap();
        dom.insert_node(&button, &outer, None).unwrap();

        let hits = Rc::new(Cell::new(0));
        let listener = Listener::new({
            let hits = hits.clone();
            move |event: &Event| {
                assert_eq!(event.target_attr("id"), Some("button"));
                hits.set(hits.get() + 1);
            }
        });
        dom.add_event_listener(&outer, "click", &listener).unwrap();
        dom.add_event_listener(&outer, "click", &listener).unwrap();
        assert_eq!(dom.listener_count(outer), 1);

        dom.click(button);
        dom.dispatch(button, "keydown");
        assert_eq!(hits.get(), 1);

        dom.remove_event_listener(&outer, "click", &listener).unwrap();
        dom.click(button);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn raw_markup_is_not_escaped() {
        let dom = MemoryDom::new();
        let root = dom.create_root();
        let raw = dom.create_raw("<b>bold</b>").unwrap();
        dom.insert_node(&raw, &root, None).unwrap();
        assert_eq!(dom.inner_html(root), "<b>bold</b>");
        assert!(dom.update_text(&raw, "x").is_err());
    }
}
