//! The output-tree capability consumed by the engine.

use core::fmt::Debug;

use crate::context::Listener;
use crate::error::AdapterError;
use crate::props::Props;

/// Creates, mutates and removes platform nodes on behalf of the engine.
///
/// The engine only calls mutating methods while committing a result. Nodes are
/// created ahead of time and stay detached until their parent commits.
pub trait Adapter: 'static {
    /// Handle to a platform node. Handles are compared to decide whether a parent's
    /// children need rearranging.
    type Node: Clone + PartialEq + Debug + 'static;

    /// Creates a detached element node.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the tag or an attribute.
    fn create_node(&self, tag: &str, props: &Props) -> Result<Self::Node, AdapterError>;

    /// Brings a node's attributes from `old` to `new`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects an attribute.
    fn patch_node(&self, node: &Self::Node, old: &Props, new: &Props) -> Result<(), AdapterError>;

    /// Inserts `node` into `parent` before `before`, or at the end. A node that is
    /// already attached somewhere is moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the insertion is impossible.
    fn insert_node(
        &self,
        node: &Self::Node,
        parent: &Self::Node,
        before: Option<&Self::Node>,
    ) -> Result<(), AdapterError>;

    /// Detaches `node` from its parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the removal.
    fn remove_node(&self, node: &Self::Node) -> Result<(), AdapterError>;

    /// Creates a detached text node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be created.
    fn create_text_node(&self, text: &str) -> Result<Self::Node, AdapterError>;

    /// Replaces a text node's content.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not a text node.
    fn update_text(&self, node: &Self::Node, text: &str) -> Result<(), AdapterError>;

    /// Creates a node for raw markup. Adapters that cannot parse markup fall back to a
    /// text node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be created.
    fn create_raw(&self, markup: &str) -> Result<Self::Node, AdapterError> {
        self.create_text_node(markup)
    }

    /// Registers `listener` for events named `name` on `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot take listeners.
    fn add_event_listener(
        &self,
        node: &Self::Node,
        name: &str,
        listener: &Listener,
    ) -> Result<(), AdapterError>;

    /// Unregisters a listener added with [`add_event_listener`](Self::add_event_listener).
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot take listeners.
    fn remove_event_listener(
        &self,
        node: &Self::Node,
        name: &str,
        listener: &Listener,
    ) -> Result<(), AdapterError>;
}

/// Brings `parent`'s children from `old` to `new` with as few moves as the simple
/// forward scan finds. Nodes present in `old` but not `new` are removed.
pub(crate) fn arrange<A: Adapter>(
    adapter: &A,
    parent: &A::Node,
    old: &[A::Node],
    new: &[A::Node],
) -> Result<(), AdapterError> {
    for node in old {
        if !new.contains(node) {
            adapter.remove_node(node)?;
        }
    }

    let mut current: Vec<A::Node> = old.iter().filter(|node| new.contains(node)).cloned().collect();
    for (index, node) in new.iter().enumerate() {
        if current.get(index) == Some(node) {
            continue;
        }
        adapter.insert_node(node, parent, current.get(index))?;
        if let Some(offset) = current[index..].iter().position(|existing| existing == node) {
            current.remove(index + offset);
        }
        current.insert(index, node.clone());
    }
    Ok(())
}
