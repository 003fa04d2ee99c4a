//! Element properties.

use std::collections::BTreeMap;

use crate::element::Child;

/// Attribute value type. Properties are plain JSON values so adapters can map them
/// onto whatever their platform understands.
pub type Value = serde_json::Value;

/// The properties supplied to an element: named attributes plus ordered children.
///
/// The reserved `key` lives on [`Element`](crate::Element) itself and never shows up
/// here.
#[derive(Debug, Clone, Default)]
pub struct Props {
    attributes: BTreeMap<String, Value>,
    children: Vec<Child>,
}

impl Props {
    /// Creates an empty property set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Returns the attribute stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns the attribute under `name` if it is a string.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns the attribute under `name` if it is an integer.
    #[must_use]
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Returns the attribute under `name` if it is a number.
    #[must_use]
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Returns the attribute under `name` if it is a boolean.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Sets an attribute, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Removes an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// All attributes in name order.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// The child descriptors.
    #[must_use]
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// Appends a child descriptor.
    pub fn push_child(&mut self, child: impl Into<Child>) {
        self.children.push(child.into());
    }

    /// Replaces the child descriptors.
    pub fn set_children(&mut self, children: Vec<Child>) {
        self.children = children;
    }

    /// Takes the children out, leaving the attributes in place.
    pub(crate) fn take_children(&mut self) -> Vec<Child> {
        core::mem::take(&mut self.children)
    }

    /// Returns `true` when both property sets carry the same attributes.
    #[must_use]
    pub fn same_attributes(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }
}

impl<K, V> FromIterator<(K, V)> for Props
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let props: Props = [
            ("message", Value::from("Hello")),
            ("delay", Value::from(100)),
            ("ratio", Value::from(0.5)),
            ("open", Value::from(true)),
        ]
        .into_iter()
        .collect();

        assert_eq!(props.str("message"), Some("Hello"));
        assert_eq!(props.i64("delay"), Some(100));
        assert_eq!(props.f64("ratio"), Some(0.5));
        assert_eq!(props.bool("open"), Some(true));
        assert_eq!(props.str("delay"), None);
        assert!(props.get("missing").is_none());
    }

    #[test]
    fn attribute_comparison_ignores_children() {
        let mut a = Props::new();
        a.set("id", "x");
        let mut b = a.clone();
        b.push_child("text");
        assert!(a.same_attributes(&b));
        b.set("id", "y");
        assert!(!a.same_attributes(&b));
    }
}
