use core::fmt;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::trace;
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use waterfall_core::{Adapter, AdapterError, Event, Listener, Props, Value};
use web_sys::{Document, Element, HtmlTemplateElement, Node, Window};

use crate::error::WebError;

type Callback = Closure<dyn FnMut(web_sys::Event)>;

struct Registration {
    node: Node,
    name: String,
    listener: Listener,
    callback: Callback,
}

/// Stringifies an attribute value the way the DOM would. `null` removes the
/// attribute.
fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn element(node: &Node) -> Result<&Element, WebError> {
    node.dyn_ref::<Element>().ok_or(WebError::NotAnElement)
}

/// Snapshot of a DOM event in the engine's terms.
fn convert(event: &web_sys::Event) -> Event {
    let mut target = BTreeMap::new();
    if let Some(element) = event.target().and_then(|target| target.dyn_into::<Element>().ok()) {
        for name in element.get_attribute_names().iter().filter_map(|name| name.as_string()) {
            if let Some(value) = element.get_attribute(&name) {
                target.insert(name, Value::String(value));
            }
        }
    }
    Event {
        name: event.type_(),
        target,
    }
}

/// Output adapter writing to the browser document.
#[derive(Clone)]
pub struct WebDom {
    document: Document,
    registrations: Rc<RefCell<Vec<Registration>>>,
}

impl fmt::Debug for WebDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDom")
            .field("listeners", &self.registrations.borrow().len())
            .finish_non_exhaustive()
    }
}

impl WebDom {
    /// Binds to the window's document.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::DomUnavailable`] outside of a browser.
    pub fn new() -> Result<Self, WebError> {
        let window: Window = web_sys::window().ok_or(WebError::DomUnavailable)?;
        let document: Document = window.document().ok_or(WebError::DomUnavailable)?;
        Ok(Self {
            document,
            registrations: Rc::default(),
        })
    }

    /// Returns the owning document.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Looks up the element to render into: the one with `root_id`, or `<body>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the element does not exist.
    pub fn root(&self, root_id: Option<&str>) -> Result<Node, WebError> {
        let element = match root_id {
            Some(id) => self
                .document
                .get_element_by_id(id)
                .ok_or_else(|| WebError::RootNotFound(id.to_string()))?,
            None => self.document.body().ok_or(WebError::DomUnavailable)?.into(),
        };
        Ok(element.into())
    }

    fn raw_node(&self, markup: &str) -> Result<Node, WebError> {
        let template: HtmlTemplateElement = self
            .document
            .create_element("template")?
            .dyn_into()
            .map_err(|element| WebError::from(wasm_bindgen::JsValue::from(element)))?;
        template.set_inner_html(markup);
        let content = template.content();
        if let Some(only) = content.first_child() {
            if only.next_sibling().is_none() {
                content.remove_child(&only)?;
                return Ok(only);
            }
        }
        // Several top-level nodes need one handle.
        let wrapper = self.document.create_element("span")?;
        wrapper.set_attribute("style", "display: contents")?;
        wrapper.append_child(&content)?;
        Ok(wrapper.into())
    }
}

impl Adapter for WebDom {
    type Node = Node;

    fn create_node(&self, tag: &str, props: &Props) -> Result<Node, AdapterError> {
        let create = || -> Result<Node, WebError> {
            let element = self.document.create_element(tag)?;
            for (name, value) in props.attributes() {
                if let Some(text) = attribute_text(value) {
                    element.set_attribute(name, &text)?;
                }
            }
            Ok(element.into())
        };
        create().map_err(|error| error.during("create_node"))
    }

    fn patch_node(&self, node: &Node, old: &Props, new: &Props) -> Result<(), AdapterError> {
        let patch = || -> Result<(), WebError> {
            let element = element(node)?;
            for name in old.attributes().keys() {
                if new.get(name).is_none() {
                    element.remove_attribute(name)?;
                }
            }
            for (name, value) in new.attributes() {
                if old.get(name) == Some(value) {
                    continue;
                }
                match attribute_text(value) {
                    Some(text) => element.set_attribute(name, &text)?,
                    None => element.remove_attribute(name)?,
                }
            }
            Ok(())
        };
        patch().map_err(|error| error.during("patch_node"))
    }

    fn insert_node(&self, node: &Node, parent: &Node, before: Option<&Node>) -> Result<(), AdapterError> {
        parent
            .insert_before(node, before)
            .map(drop)
            .map_err(|error| WebError::from(error).during("insert_node"))
    }

    fn remove_node(&self, node: &Node) -> Result<(), AdapterError> {
        let Some(parent) = node.parent_node() else {
            return Ok(());
        };
        parent
            .remove_child(node)
            .map(drop)
            .map_err(|error| WebError::from(error).during("remove_node"))
    }

    fn create_text_node(&self, text: &str) -> Result<Node, AdapterError> {
        Ok(self.document.create_text_node(text).into())
    }

    fn update_text(&self, node: &Node, text: &str) -> Result<(), AdapterError> {
        if node.node_type() != Node::TEXT_NODE {
            return Err(AdapterError::new("update_text", "not a text node"));
        }
        node.set_text_content(Some(text));
        Ok(())
    }

    fn create_raw(&self, markup: &str) -> Result<Node, AdapterError> {
        self.raw_node(markup).map_err(|error| error.during("create_raw"))
    }

    fn add_event_listener(&self, node: &Node, name: &str, listener: &Listener) -> Result<(), AdapterError> {
        let mut registrations = self.registrations.borrow_mut();
        let registered = registrations
            .iter()
            .any(|entry| &entry.node == node && entry.name == name && &entry.listener == listener);
        if registered {
            return Ok(());
        }

        let callback: Callback = Closure::new({
            let listener = listener.clone();
            move |event: web_sys::Event| listener.call(&convert(&event))
        });
        node.add_event_listener_with_callback(name, callback.as_ref().unchecked_ref())
            .map_err(|error| WebError::from(error).during("add_event_listener"))?;
        trace!(event = name, "registered DOM listener");
        registrations.push(Registration {
            node: node.clone(),
            name: name.to_owned(),
            listener: listener.clone(),
            callback,
        });
        Ok(())
    }

    fn remove_event_listener(&self, node: &Node, name: &str, listener: &Listener) -> Result<(), AdapterError> {
        let mut registrations = self.registrations.borrow_mut();
        let Some(index) = registrations
            .iter()
            .position(|entry| &entry.node == node && entry.name == name && &entry.listener == listener)
        else {
            return Ok(());
        };
        let entry = registrations.swap_remove(index);
        node.remove_event_listener_with_callback(name, entry.callback.as_ref().unchecked_ref())
            .map_err(|error| WebError::from(error).during("remove_event_listener"))
    }
}
