//! Element descriptors.
//!
//! An [`Element`] says "render this kind of thing with these properties". Elements
//! are cheap to clone and never mutated once handed to the renderer; a fresh tree is
//! built for every render.

use core::fmt;
use std::rc::Rc;

use crate::component::Component;
use crate::props::{Props, Value};

/// Stable identity of an element among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// A string key.
    Str(String),
    /// An integer key.
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(key) => f.write_str(key),
            Self::Int(key) => write!(f, "{key}"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

macro_rules! impl_int_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Key {
                fn from(value: $ty) -> Self {
                    Self::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_int_key!(i8, i16, i32, i64, u8, u16, u32);

/// What an element renders.
#[derive(Clone)]
pub enum Tag {
    /// A platform element such as `div`, handled by the adapter.
    Intrinsic(Rc<str>),
    /// A user component.
    Component(Component),
    /// Expands to its children in place, without a record of its own.
    Fragment,
    /// Keeps whatever was rendered at this position last time.
    Copy,
    /// Raw markup, taken from the `value` attribute.
    Raw,
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intrinsic(name) => write!(f, "<{name}>"),
            Self::Component(component) => write!(f, "<{}>", component.name()),
            Self::Fragment => f.write_str("Fragment"),
            Self::Copy => f.write_str("Copy"),
            Self::Raw => f.write_str("Raw"),
        }
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::Intrinsic(Rc::from(value))
    }
}

impl From<Component> for Tag {
    fn from(value: Component) -> Self {
        Self::Component(value)
    }
}

impl From<&Component> for Tag {
    fn from(value: &Component) -> Self {
        Self::Component(value.clone())
    }
}

/// An element descriptor: tag, optional key and properties.
#[derive(Debug, Clone)]
pub struct Element {
    tag: Tag,
    key: Option<Key>,
    props: Props,
}

/// Shorthand for [`Element::new`].
#[must_use]
pub fn h(tag: impl Into<Tag>) -> Element {
    Element::new(tag)
}

impl Element {
    /// Creates an element with no properties.
    #[must_use]
    pub fn new(tag: impl Into<Tag>) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            props: Props::new(),
        }
    }

    /// A fragment holding `children`.
    #[must_use]
    pub fn fragment<C: Into<Child>>(children: impl IntoIterator<Item = C>) -> Self {
        Self::new(Tag::Fragment).children(children)
    }

    /// A copy marker.
    #[must_use]
    pub fn copy() -> Self {
        Self::new(Tag::Copy)
    }

    /// Raw markup inserted as-is.
    #[must_use]
    pub fn raw(markup: impl Into<String>) -> Self {
        Self::new(Tag::Raw).prop("value", markup.into())
    }

    /// Sets the element's key.
    #[must_use]
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.set(name, value);
        self
    }

    /// Appends a child.
    #[must_use]
    pub fn child(mut self, child: impl Into<Child>) -> Self {
        self.props.push_child(child);
        self
    }

    /// Appends several children.
    #[must_use]
    pub fn children<C: Into<Child>>(mut self, children: impl IntoIterator<Item = C>) -> Self {
        for child in children {
            self.props.push_child(child);
        }
        self
    }

    /// The element's tag.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    /// The element's key, if any.
    #[must_use]
    pub const fn key_ref(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// The element's properties.
    #[must_use]
    pub const fn props(&self) -> &Props {
        &self.props
    }

    pub(crate) fn into_parts(self) -> (Tag, Option<Key>, Props) {
        (self.tag, self.key, self.props)
    }
}

/// Anything that can sit in a child position.
#[derive(Debug, Clone, Default)]
pub enum Child {
    /// Renders nothing.
    #[default]
    Empty,
    /// A text node.
    Text(String),
    /// An element.
    Element(Element),
    /// Several children, expanded in place like a fragment.
    List(Vec<Child>),
}

impl Child {
    /// Returns `true` for [`Child::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Element> for Child {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Child {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Child {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<Vec<Self>> for Child {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<()> for Child {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl<T: Into<Self>> From<Option<T>> for Child {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

macro_rules! impl_number_child {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Child {
                fn from(value: $ty) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )*
    };
}

impl_number_child!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);
