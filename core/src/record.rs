//! Node records and the arena that owns them.

use core::fmt;
use std::rc::Rc;

use crate::component::{Component, ComponentKind, Generator};
use crate::context::{Listener, Mailbox};
use crate::diff::TagId;
use crate::element::Key;
use crate::props::Props;
use crate::scheduler::Schedule;

/// Identifies a node record. Ids are never reused: a freed slot gets a new
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational slot arena.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(value)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// What a record stands for. Never changes over the record's life.
#[derive(Debug, Clone)]
pub(crate) enum Kind {
    Root,
    Host(Rc<str>),
    Text,
    Raw,
    Component(Component),
}

impl Kind {
    pub(crate) fn tag_id(&self) -> TagId {
        match self {
            // Roots never sit in a children list.
            Self::Root => TagId::Copy,
            Self::Host(name) => TagId::Host(name.clone()),
            Self::Text => TagId::Text,
            Self::Raw => TagId::Raw,
            Self::Component(component) => TagId::Component(component.id()),
        }
    }
}

/// Execution state of a component record.
pub(crate) enum ExecState {
    /// Plain records and function components.
    Stateless,
    /// A generator that has not run yet.
    Unstarted,
    Async {
        running: bool,
        enqueued: Option<(Props, u64)>,
    },
    /// `None` while the generator is executing.
    Generator(Option<Box<dyn Generator>>),
    AsyncGenerator(Rc<Mailbox>),
    /// Returned; every later update re-delivers the cached value.
    Done,
    /// Failed; inert like `Done`.
    Errored,
}

impl ExecState {
    fn initial(kind: &Kind) -> Self {
        let Kind::Component(component) = kind else {
            return Self::Stateless;
        };
        match component.kind() {
            ComponentKind::Function(_) => Self::Stateless,
            ComponentKind::Async(_) => Self::Async {
                running: false,
                enqueued: None,
            },
            ComponentKind::Generator(_) | ComponentKind::AsyncGenerator(_) => Self::Unstarted,
        }
    }

    pub(crate) const fn is_running(&self) -> bool {
        matches!(self, Self::Async { running: true, .. })
    }
}

impl fmt::Debug for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stateless => f.write_str("Stateless"),
            Self::Unstarted => f.write_str("Unstarted"),
            Self::Async { running, enqueued } => f
                .debug_struct("Async")
                .field("running", running)
                .field("enqueued", &enqueued.as_ref().map(|(_, seq)| seq))
                .finish(),
            Self::Generator(generator) => f
                .debug_tuple("Generator")
                .field(&if generator.is_some() { "suspended" } else { "executing" })
                .finish(),
            Self::AsyncGenerator(_) => f.write_str("AsyncGenerator"),
            Self::Done => f.write_str("Done"),
            Self::Errored => f.write_str("Errored"),
        }
    }
}

/// One live position in the rendered tree.
pub(crate) struct Record<N> {
    pub(crate) kind: Kind,
    pub(crate) key: Option<Key>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Latest props. Hosts keep attributes only; their children live in `children`.
    pub(crate) props: Props,
    /// Attributes currently on the platform node.
    pub(crate) committed: Props,
    /// Content of a text or raw node.
    pub(crate) text: String,
    pub(crate) node: Option<N>,
    /// Platform children last arranged under `node`.
    pub(crate) arranged: Vec<N>,
    /// Last committed output.
    pub(crate) value: Vec<N>,
    pub(crate) exec: ExecState,
    pub(crate) schedule: Schedule<N>,
    pub(crate) listeners: Vec<(String, Listener)>,
    /// Nodes the listeners are currently attached to.
    pub(crate) listening: Vec<N>,
    pub(crate) destroyed: bool,
}

impl<N> Record<N> {
    pub(crate) fn new(kind: Kind, key: Option<Key>, parent: Option<NodeId>) -> Self {
        Self {
            exec: ExecState::initial(&kind),
            kind,
            key,
            parent,
            children: Vec::new(),
            props: Props::new(),
            committed: Props::new(),
            text: String::new(),
            node: None,
            arranged: Vec::new(),
            value: Vec::new(),
            schedule: Schedule::new(),
            listeners: Vec::new(),
            listening: Vec::new(),
            destroyed: false,
        }
    }

    /// A record wrapping an already created platform node.
    pub(crate) fn with_node(kind: Kind, key: Option<Key>, parent: NodeId, node: N) -> Self
    where
        N: Clone,
    {
        let mut record = Self::new(kind, key, Some(parent));
        record.value = vec![node.clone()];
        record.node = Some(node);
        record
    }

    pub(crate) fn component(&self) -> Option<&Component> {
        match &self.kind {
            Kind::Component(component) => Some(component),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match &self.kind {
            Kind::Root => "root",
            Kind::Host(name) => name,
            Kind::Text => "#text",
            Kind::Raw => "#raw",
            Kind::Component(component) => component.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_ids_do_not_alias() {
        let mut arena = Arena::default();
        let first = arena.insert("first");
        assert_eq!(arena.remove(first), Some("first"));
        let second = arena.insert("second");

        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&"second"));
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn mutation_through_ids() {
        let mut arena = Arena::default();
        let a = arena.insert(1);
        let b = arena.insert(2);
        *arena.get_mut(b).unwrap() += 40;
        assert_eq!(arena.get(a), Some(&1));
        assert_eq!(arena.get(b), Some(&42));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn exec_state_follows_component_kind() {
        let function = Component::function("F", |_, _| Ok(().into()));
        let generator = Component::generator("G", |_, _| {
            crate::generator_fn(|_, _| Ok(crate::Step::Return(().into())))
        });
        let host: Record<()> = Record::new(Kind::Host("div".into()), None, None);

        assert!(matches!(host.exec, ExecState::Stateless));
        let record: Record<()> = Record::new(Kind::Component(function), None, None);
        assert!(matches!(record.exec, ExecState::Stateless));
        let record: Record<()> = Record::new(Kind::Component(generator), None, None);
        assert!(matches!(record.exec, ExecState::Unstarted));
        assert_eq!(record.name(), "G");
    }
}
