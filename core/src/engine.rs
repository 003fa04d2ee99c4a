//! Reconciliation, commits and teardown.
//!
//! The engine owns every record in one arena. No `RefCell` borrow of the arena is
//! held across a call into user code or the adapter, so components may refresh,
//! read props or add listeners from anywhere.

use core::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::adapter::{Adapter, arrange};
use crate::component::Component;
use crate::config::Config;
use crate::context::{Context, ContextHost, Listener, Mailbox};
use crate::diff::{self, Slot, TagId};
use crate::element::{Child, Key, Tag};
use crate::error::RenderError;
use crate::props::Props;
use crate::record::{Arena, ExecState, Kind, NodeId, Record};
use crate::renderer::{Completion, Spawner};
use crate::scheduler::Output;

/// A flattened child descriptor. Fragments never survive flattening.
pub(crate) enum Entry {
    Text(String),
    Host {
        name: Rc<str>,
        key: Option<Key>,
        props: Props,
    },
    Component {
        component: Component,
        key: Option<Key>,
        props: Props,
    },
    Raw {
        key: Option<Key>,
        props: Props,
    },
    Copy {
        key: Option<Key>,
    },
}

impl Entry {
    fn tag_id(&self) -> TagId {
        match self {
            Self::Text(_) => TagId::Text,
            Self::Host { name, .. } => TagId::Host(name.clone()),
            Self::Component { component, .. } => TagId::Component(component.id()),
            Self::Raw { .. } => TagId::Raw,
            Self::Copy { .. } => TagId::Copy,
        }
    }

    fn key_mut(&mut self) -> Option<&mut Option<Key>> {
        match self {
            Self::Text(_) => None,
            Self::Host { key, .. }
            | Self::Component { key, .. }
            | Self::Raw { key, .. }
            | Self::Copy { key } => Some(key),
        }
    }

    fn key(&self) -> Option<Key> {
        match self {
            Self::Text(_) => None,
            Self::Host { key, .. }
            | Self::Component { key, .. }
            | Self::Raw { key, .. }
            | Self::Copy { key } => key.clone(),
        }
    }
}

/// Expands fragments and lists in place and drops holes.
fn flatten(children: Vec<Child>, out: &mut Vec<Entry>) {
    for child in children {
        match child {
            Child::Empty => {}
            Child::Text(text) => out.push(Entry::Text(text)),
            Child::List(list) => flatten(list, out),
            Child::Element(element) => {
                let (tag, key, mut props) = element.into_parts();
                match tag {
                    Tag::Fragment => flatten(props.take_children(), out),
                    Tag::Intrinsic(name) => out.push(Entry::Host { name, key, props }),
                    Tag::Component(component) => out.push(Entry::Component {
                        component,
                        key,
                        props,
                    }),
                    Tag::Raw => out.push(Entry::Raw { key, props }),
                    Tag::Copy => out.push(Entry::Copy { key }),
                }
            }
        }
    }
}

fn raw_markup(props: &Props) -> String {
    match props.get("value") {
        Some(serde_json::Value::String(markup)) => markup.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

enum Plan {
    Update(NodeId, Entry),
    Copy(NodeId),
}

/// A reconciled child list.
///
/// `fault` is the first duplicate key found further down. The list that held it
/// was left as it was; everything around it still updated and committed.
pub(crate) struct Reconciled<N> {
    pub(crate) output: Output<N>,
    pub(crate) fault: Option<RenderError>,
}

impl<N> From<Output<N>> for Reconciled<N> {
    fn from(output: Output<N>) -> Self {
        Self { output, fault: None }
    }
}

pub(crate) type Records<N> = RefCell<Arena<Record<N>>>;

pub(crate) struct Engine<A: Adapter> {
    pub(crate) adapter: A,
    spawner: Box<dyn Spawner>,
    pub(crate) records: Records<A::Node>,
    pub(crate) config: Config,
    pub(crate) this: Weak<Self>,
}

impl<A: Adapter> Engine<A> {
    pub(crate) fn new(adapter: A, spawner: Box<dyn Spawner>, config: Config) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            adapter,
            spawner,
            records: RefCell::default(),
            config,
            this: this.clone(),
        })
    }

    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.spawner.spawn(task.boxed_local());
    }

    pub(crate) fn context(&self, id: NodeId) -> Context {
        let host: Weak<dyn ContextHost> = self.this.clone();
        Context::new(host, id)
    }

    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.records
            .borrow()
            .get(id)
            .is_some_and(|record| !record.destroyed)
    }

    pub(crate) fn set_exec(&self, id: NodeId, exec: ExecState) {
        if let Some(record) = self.records.borrow_mut().get_mut(id) {
            record.exec = exec;
        }
    }

    /// Creates the record for a root platform node.
    pub(crate) fn create_root(&self, node: A::Node) -> NodeId {
        let mut record = Record::new(Kind::Root, None, None);
        record.node = Some(node);
        self.records.borrow_mut().insert(record)
    }

    /// Aligns `children` against `parent`'s current children and updates them.
    ///
    /// Repeated keys in `children` fail before anything is touched. Repeated keys
    /// deeper down only leave that one list alone and come back as the fault.
    pub(crate) fn reconcile(
        &self,
        parent: NodeId,
        children: Vec<Child>,
    ) -> Result<Reconciled<A::Node>, RenderError> {
        let mut entries = Vec::new();
        flatten(children, &mut entries);

        let mut keys: Vec<Option<Key>> = entries.iter().map(Entry::key).collect();
        diff::check_keys(&mut keys, self.config.duplicate_keys)?;
        for (entry, key) in entries.iter_mut().zip(keys) {
            if let Some(slot) = entry.key_mut() {
                *slot = key;
            }
        }

        let (old, old_tags) = {
            let records = self.records.borrow();
            let Some(record) = records.get(parent) else {
                return Ok(Output::Ready(Vec::new()).into());
            };
            record
                .children
                .iter()
                .filter_map(|&id| {
                    let child = records.get(id)?;
                    Some((id, (child.key.clone(), child.kind.tag_id())))
                })
                .unzip::<_, _, Vec<_>, Vec<_>>()
        };
        let new_tags: Vec<_> = entries.iter().map(|entry| (entry.key(), entry.tag_id())).collect();
        let alignment = diff::align(&old_tags, &new_tags);

        for index in alignment.removed {
            self.destroy(old[index]);
        }

        let mut ids = Vec::with_capacity(entries.len());
        let mut plan = Vec::with_capacity(entries.len());
        for (entry, slot) in entries.into_iter().zip(alignment.slots) {
            match slot {
                Slot::Reuse(index) => {
                    ids.push(old[index]);
                    plan.push(Plan::Update(old[index], entry));
                }
                Slot::Create => {
                    if let Some(id) = self.create(parent, &entry)? {
                        ids.push(id);
                        plan.push(Plan::Update(id, entry));
                    }
                }
                Slot::Copy(Some(index)) => {
                    ids.push(old[index]);
                    plan.push(Plan::Copy(old[index]));
                }
                Slot::Copy(None) => {}
            }
        }
        if let Some(record) = self.records.borrow_mut().get_mut(parent) {
            record.children = ids;
        }

        let mut fault = None;
        let mut outputs = Vec::with_capacity(plan.len());
        for step in plan {
            let (id, result) = match step {
                Plan::Update(id, entry) => (id, self.update(id, entry)),
                Plan::Copy(id) => (id, Ok(self.copied(id).into())),
            };
            match result {
                Ok(reconciled) => {
                    outputs.push(reconciled.output);
                    fault = fault.or(reconciled.fault);
                }
                Err(error) if error.is_duplicate_key() => {
                    debug!(%id, %error, "keeping subtree with duplicate keys");
                    outputs.push(Output::Ready(self.value(id)));
                    fault = fault.or(Some(error));
                }
                Err(error) => return Err(error),
            }
        }
        Ok(Reconciled {
            output: Output::join(outputs),
            fault,
        })
    }

    fn value(&self, id: NodeId) -> Vec<A::Node> {
        self.records
            .borrow()
            .get(id)
            .map(|record| record.value.clone())
            .unwrap_or_default()
    }

    fn create(&self, parent: NodeId, entry: &Entry) -> Result<Option<NodeId>, RenderError> {
        let record = match entry {
            Entry::Text(text) => {
                let node = self.adapter.create_text_node(text)?;
                let mut record = Record::with_node(Kind::Text, None, parent, node);
                record.text.clone_from(text);
                record
            }
            Entry::Host { name, key, props } => {
                let mut attributes = props.clone();
                attributes.take_children();
                let node = self.adapter.create_node(name, &attributes)?;
                let mut record = Record::with_node(Kind::Host(name.clone()), key.clone(), parent, node);
                record.committed = attributes;
                record
            }
            Entry::Raw { key, props } => {
                let markup = raw_markup(props);
                let node = self.adapter.create_raw(&markup)?;
                let mut record = Record::with_node(Kind::Raw, key.clone(), parent, node);
                record.text = markup;
                record
            }
            Entry::Component { component, key, .. } => {
                Record::new(Kind::Component(component.clone()), key.clone(), Some(parent))
            }
            Entry::Copy { .. } => return Ok(None),
        };
        let id = self.records.borrow_mut().insert(record);
        trace!(%id, %parent, "created record");
        Ok(Some(id))
    }

    fn update(&self, id: NodeId, entry: Entry) -> Result<Reconciled<A::Node>, RenderError> {
        match entry {
            Entry::Text(text) => self.update_text(id, text).map(Into::into),
            Entry::Host { props, .. } => self.update_host(id, props),
            Entry::Raw { props, .. } => self.update_raw(id, &props).map(Into::into),
            Entry::Component { props, .. } => self.update_component(id, props).map(Into::into),
            Entry::Copy { .. } => Ok(self.copied(id).into()),
        }
    }

    fn update_text(&self, id: NodeId, text: String) -> Result<Output<A::Node>, RenderError> {
        let node = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Ok(Output::Ready(Vec::new()));
            };
            if record.text == text {
                return Ok(Output::Ready(record.value.clone()));
            }
            record.text = text.clone();
            record.node.clone()
        };
        if let Some(node) = &node {
            self.adapter.update_text(node, &text)?;
        }
        Ok(Output::Ready(node.into_iter().collect()))
    }

    fn update_raw(&self, id: NodeId, props: &Props) -> Result<Output<A::Node>, RenderError> {
        let markup = raw_markup(props);
        {
            let records = self.records.borrow();
            let Some(record) = records.get(id) else {
                return Ok(Output::Ready(Vec::new()));
            };
            if record.text == markup {
                return Ok(Output::Ready(record.value.clone()));
            }
        }
        let node = self.adapter.create_raw(&markup)?;
        if let Some(record) = self.records.borrow_mut().get_mut(id) {
            record.text = markup;
            record.node = Some(node.clone());
            record.value = vec![node.clone()];
        }
        Ok(Output::Ready(vec![node]))
    }

    fn update_host(&self, id: NodeId, mut props: Props) -> Result<Reconciled<A::Node>, RenderError> {
        let children = props.take_children();
        let (node, attempt) = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Ok(Output::Ready(Vec::new()).into());
            };
            record.props = props;
            (record.node.clone(), record.schedule.attempt())
        };
        let Some(node) = node else {
            return Ok(Output::Ready(Vec::new()).into());
        };
        let Reconciled { output, fault } = self.reconcile(id, children)?;
        let output = match output {
            Output::Ready(nodes) => {
                self.commit_host(id, attempt, attempt, &nodes)?;
                Output::Ready(vec![node])
            }
            Output::Pending(pending) => {
                let this = self.this.clone();
                Output::Pending(
                    async move {
                        let nodes = pending.await?;
                        if let Some(engine) = this.upgrade() {
                            engine.commit_host(id, attempt, attempt, &nodes)?;
                        }
                        Ok(vec![node])
                    }
                    .boxed_local(),
                )
            }
        };
        Ok(Reconciled { output, fault })
    }

    /// Updates the root record with a new top-level child.
    pub(crate) fn update_root(
        &self,
        id: NodeId,
        child: Child,
    ) -> Result<(u64, u64, Reconciled<A::Node>), RenderError> {
        let (seq, attempt) = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Err(RenderError::Unmounted);
            };
            (record.schedule.request(), record.schedule.attempt())
        };
        let reconciled = self.reconcile(id, vec![child])?;
        Ok((seq, attempt, reconciled))
    }

    /// Patches a host's attributes and arranges its platform children. Older
    /// attempts arriving after a newer commit are dropped.
    pub(crate) fn commit_host(
        &self,
        id: NodeId,
        attempt: u64,
        covers: u64,
        nodes: &[A::Node],
    ) -> Result<(), RenderError> {
        let (node, old, new, arranged) = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Ok(());
            };
            if !record.schedule.try_commit(attempt, covers) {
                debug!(%id, attempt, "dropping superseded host commit");
                return Ok(());
            }
            let Some(node) = record.node.clone() else {
                return Ok(());
            };
            (
                node,
                record.committed.clone(),
                record.props.clone(),
                record.arranged.clone(),
            )
        };

        if !old.same_attributes(&new) {
            self.adapter.patch_node(&node, &old, &new)?;
        }
        arrange(&self.adapter, &node, &arranged, nodes)?;

        if let Some(record) = self.records.borrow_mut().get_mut(id) {
            record.committed = new;
            record.arranged = nodes.to_vec();
            record.schedule.resolve(&record.value);
        }
        trace!(%id, attempt, children = nodes.len(), "committed host");
        Ok(())
    }

    /// Stores a component's rendered output if `attempt` is still the newest.
    /// Returns whatever the record shows afterwards.
    pub(crate) fn commit_component(
        &self,
        id: NodeId,
        attempt: u64,
        covers: u64,
        nodes: Vec<A::Node>,
    ) -> Vec<A::Node> {
        let committed = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return nodes;
            };
            if record.schedule.try_commit(attempt, covers) {
                record.value.clone_from(&nodes);
                record.schedule.resolve(&nodes);
                trace!(%id, attempt, covers, "committed component");
                nodes
            } else {
                debug!(%id, attempt, "dropping superseded component result");
                return record.value.clone();
            }
        };
        self.retarget(id);
        committed
    }

    /// Renders a component's output child as attempt of request `seq`.
    ///
    /// With `recover` set, a failure below is offered to the record's generator.
    /// Duplicate keys further down are not offered: the output still commits and
    /// the key error is returned afterwards.
    pub(crate) fn render_output(
        &self,
        id: NodeId,
        seq: u64,
        child: Child,
        recover: bool,
    ) -> Result<Output<A::Node>, RenderError> {
        let Some(attempt) = self
            .records
            .borrow_mut()
            .get_mut(id)
            .map(|record| record.schedule.attempt())
        else {
            return Ok(Output::Ready(Vec::new()));
        };
        let Reconciled { output, fault } = match self.reconcile(id, vec![child]) {
            Ok(reconciled) => reconciled,
            Err(error) if recover => return self.recover(id, seq, error),
            Err(error) => return Err(error),
        };
        let output = match output {
            Output::Ready(nodes) => Output::Ready(self.commit_component(id, attempt, seq, nodes)),
            Output::Pending(pending) => {
                let this = self.this.clone();
                Output::Pending(
                    async move {
                        let result = pending.await;
                        let Some(engine) = this.upgrade() else {
                            return result;
                        };
                        match result {
                            Ok(nodes) => Ok(engine.commit_component(id, attempt, seq, nodes)),
                            Err(error) if recover => engine.recover(id, seq, error)?.into_future().await,
                            Err(error) => Err(error),
                        }
                    }
                    .boxed_local(),
                )
            }
        };
        let Some(fault) = fault else {
            return Ok(output);
        };
        if let Output::Pending(pending) = output {
            let this = self.this.clone();
            self.spawn(async move {
                if let (Ok(_), Some(engine)) = (pending.await, this.upgrade()) {
                    engine.propagate(id);
                }
            });
        }
        Err(fault)
    }

    /// Value for a copied position: the cached output, or the in-flight request
    /// when nothing has committed yet.
    fn copied(&self, id: NodeId) -> Output<A::Node> {
        let mut records = self.records.borrow_mut();
        let Some(record) = records.get_mut(id) else {
            return Output::Ready(Vec::new());
        };
        if record.component().is_none()
            || record.schedule.has_committed()
            || record.schedule.requested() == 0
        {
            return Output::Ready(record.value.clone());
        }
        let seq = record.schedule.requested();
        Output::waiter(record.schedule.wait(seq))
    }

    /// Tears a record down depth-first.
    ///
    /// Generators are finalized and props streams closed. Platform nodes stay where
    /// they are until the parent's next arrangement removes them. A record whose
    /// async call is still in flight is kept until that call settles.
    pub(crate) fn destroy(&self, id: NodeId) {
        let (children, exec, listeners, listening, zombie) = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return;
            };
            if record.destroyed {
                return;
            }
            record.destroyed = true;
            let exec = match record.exec {
                ExecState::Generator(_) | ExecState::AsyncGenerator(_) => {
                    core::mem::replace(&mut record.exec, ExecState::Done)
                }
                _ => ExecState::Stateless,
            };
            (
                core::mem::take(&mut record.children),
                exec,
                core::mem::take(&mut record.listeners),
                core::mem::take(&mut record.listening),
                record.exec.is_running(),
            )
        };

        match exec {
            ExecState::Generator(Some(mut generator)) => generator.finalize(&self.context(id)),
            ExecState::AsyncGenerator(mailbox) => mailbox.close(),
            _ => {}
        }
        for node in &listening {
            for (name, listener) in &listeners {
                if let Err(error) = self.adapter.remove_event_listener(node, name, listener) {
                    warn!(%id, %error, "failed to remove listener");
                }
            }
        }
        for child in children {
            self.destroy(child);
        }

        if zombie {
            debug!(%id, "keeping destroyed record until its call settles");
        } else {
            self.free(id);
        }
    }

    /// Removes a record from the arena, settling whoever still waits on it.
    pub(crate) fn free(&self, id: NodeId) {
        let record = self.records.borrow_mut().remove(id);
        if let Some(mut record) = record {
            record.schedule.drain(&record.value);
        }
    }

    /// Pushes a record's new value up to the nearest platform parent.
    pub(crate) fn propagate(&self, id: NodeId) {
        let mut current = id;
        loop {
            let parent = {
                let records = self.records.borrow();
                match records.get(current) {
                    Some(record) if !record.destroyed => record.parent,
                    _ => None,
                }
            };
            let Some(parent) = parent else { return };

            let (host, nodes, arranged) = {
                let mut records = self.records.borrow_mut();
                let Some(record) = records.get(parent) else { return };
                if record.destroyed {
                    return;
                }
                let nodes: Vec<A::Node> = record
                    .children
                    .iter()
                    .filter_map(|child| records.get(*child))
                    .flat_map(|child| child.value.iter().cloned())
                    .collect();
                let Some(record) = records.get_mut(parent) else { return };
                match &record.kind {
                    Kind::Root | Kind::Host(_) => {
                        (record.node.clone(), nodes, record.arranged.clone())
                    }
                    Kind::Component(_) => {
                        record.value = nodes;
                        (None, Vec::new(), Vec::new())
                    }
                    Kind::Text | Kind::Raw => return,
                }
            };

            match host {
                Some(node) => {
                    match arrange(&self.adapter, &node, &arranged, &nodes) {
                        Ok(()) => {
                            if let Some(record) = self.records.borrow_mut().get_mut(parent) {
                                record.arranged = nodes;
                            }
                        }
                        Err(error) => warn!(%parent, %error, "failed to rearrange after update"),
                    }
                    return;
                }
                None => {
                    self.retarget(parent);
                    current = parent;
                }
            }
        }
    }

    /// Moves a record's listeners onto its current top-level nodes.
    fn retarget(&self, id: NodeId) {
        let (listeners, old, new) = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else { return };
            if record.listeners.is_empty() || record.listening == record.value {
                return;
            }
            let new = record.value.clone();
            let old = core::mem::replace(&mut record.listening, new.clone());
            (record.listeners.clone(), old, new)
        };
        for node in old.iter().filter(|node| !new.contains(node)) {
            for (name, listener) in &listeners {
                if let Err(error) = self.adapter.remove_event_listener(node, name, listener) {
                    warn!(%id, %error, "failed to remove listener");
                }
            }
        }
        for node in new.iter().filter(|node| !old.contains(node)) {
            for (name, listener) in &listeners {
                if let Err(error) = self.adapter.add_event_listener(node, name, listener) {
                    warn!(%id, %error, "failed to add listener");
                }
            }
        }
    }

    /// Refreshes a component with its current props and propagates the result.
    pub(crate) fn refresh_record(&self, id: NodeId) -> Completion {
        let props = {
            let records = self.records.borrow();
            match records.get(id) {
                Some(record) if !record.destroyed && record.component().is_some() => {
                    record.props.clone()
                }
                _ => return Completion::ready(Err(RenderError::Unmounted)),
            }
        };
        match self.update_component(id, props) {
            Ok(Output::Ready(_)) => {
                self.propagate(id);
                Completion::ready(Ok(()))
            }
            Ok(Output::Pending(pending)) => {
                let this = self.this.clone();
                let (tx, rx) = futures::channel::oneshot::channel();
                self.spawn(async move {
                    let result = pending.await.map(drop);
                    if let (Ok(()), Some(engine)) = (&result, this.upgrade()) {
                        engine.propagate(id);
                    }
                    let _ = tx.send(result);
                });
                Completion::from_receiver(rx)
            }
            Err(error) => {
                if error.is_duplicate_key() {
                    self.propagate(id);
                }
                Completion::ready(Err(error))
            }
        }
    }
}

impl<A: Adapter> ContextHost for Engine<A> {
    fn props(&self, id: NodeId) -> Option<Props> {
        self.records.borrow().get(id).map(|record| record.props.clone())
    }

    fn mailbox(&self, id: NodeId) -> Option<Rc<Mailbox>> {
        match &self.records.borrow().get(id)?.exec {
            ExecState::AsyncGenerator(mailbox) => Some(mailbox.clone()),
            _ => None,
        }
    }

    fn refresh(self: Rc<Self>, id: NodeId) -> Completion {
        self.refresh_record(id)
    }

    fn add_listener(&self, id: NodeId, name: &str, listener: Listener) {
        let nodes = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else { return };
            if record.destroyed {
                return;
            }
            if record.listeners.is_empty() {
                record.listening = record.value.clone();
            }
            record.listeners.push((name.to_owned(), listener.clone()));
            record.listening.clone()
        };
        for node in &nodes {
            if let Err(error) = self.adapter.add_event_listener(node, name, &listener) {
                warn!(%id, %error, "failed to add listener");
            }
        }
    }

    fn remove_listener(&self, id: NodeId, name: &str, listener: &Listener) {
        let nodes = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else { return };
            let before = record.listeners.len();
            record
                .listeners
                .retain(|(registered, existing)| !(registered == name && existing == listener));
            if record.listeners.len() == before {
                return;
            }
            let nodes = record.listening.clone();
            if record.listeners.is_empty() {
                record.listening.clear();
            }
            nodes
        };
        for node in &nodes {
            if let Err(error) = self.adapter.remove_event_listener(node, name, listener) {
                warn!(%id, %error, "failed to remove listener");
            }
        }
    }

    fn nodes(&self, id: NodeId) -> Option<Box<dyn Any>> {
        let records = self.records.borrow();
        let record = records.get(id)?;
        Some(Box::new(record.value.clone()))
    }

    fn is_mounted(&self, id: NodeId) -> bool {
        self.is_live(id)
    }
}
