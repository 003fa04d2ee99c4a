//! Running and resuming component logic.

use std::rc::{Rc, Weak};

use futures::StreamExt;
use tracing::{debug, error};

use crate::adapter::Adapter;
use crate::component::{Component, ComponentKind, Generator, GeneratorStream, Step};
use crate::context::Mailbox;
use crate::element::Child;
use crate::engine::Engine;
use crate::error::RenderError;
use crate::props::Props;
use crate::record::{ExecState, NodeId};
use crate::scheduler::Output;

/// What a sync generator record holds when an update reaches it.
enum Resumable {
    Start,
    Suspended(Box<dyn Generator>),
    Settled,
}

impl<A: Adapter> Engine<A> {
    /// Runs one update of a component record.
    pub(crate) fn update_component(
        &self,
        id: NodeId,
        props: Props,
    ) -> Result<Output<A::Node>, RenderError> {
        let (component, seq) = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Ok(Output::Ready(Vec::new()));
            };
            let Some(component) = record.component().cloned() else {
                return Ok(Output::Ready(record.value.clone()));
            };
            if matches!(record.exec, ExecState::Done | ExecState::Errored) {
                let seq = record.schedule.request();
                record.schedule.cover(seq);
                record.schedule.resolve(&record.value);
                return Ok(Output::Ready(record.value.clone()));
            }
            record.props = props.clone();
            (component, record.schedule.request())
        };

        match component.kind() {
            ComponentKind::Function(body) => {
                let ctx = self.context(id);
                match body(&props, &ctx) {
                    Ok(child) => self.render_output(id, seq, child, true),
                    Err(error) => Err(RenderError::component(component.name(), error)),
                }
            }
            ComponentKind::Async(_) => Ok(self.run_async(id, seq, component, props)),
            ComponentKind::Generator(_) => self.run_generator(id, seq, &component, &props),
            ComponentKind::AsyncGenerator(_) => Ok(self.run_async_generator(id, seq, &component, props)),
        }
    }

    /// Starts an async call, or parks the props for the call after the running one.
    fn run_async(&self, id: NodeId, seq: u64, component: Component, props: Props) -> Output<A::Node> {
        let rx = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Output::Ready(Vec::new());
            };
            let rx = record.schedule.wait(seq);
            let ExecState::Async { running, enqueued } = &mut record.exec else {
                return Output::waiter(rx);
            };
            if *running {
                debug!(%id, seq, "call in flight; enqueueing update");
                *enqueued = Some((props, seq));
                return Output::waiter(rx);
            }
            *running = true;
            rx
        };
        self.spawn(invoke(self.this.clone(), id, component, props, seq));
        Output::waiter(rx)
    }

    fn run_generator(
        &self,
        id: NodeId,
        seq: u64,
        component: &Component,
        props: &Props,
    ) -> Result<Output<A::Node>, RenderError> {
        let state = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Ok(Output::Ready(Vec::new()));
            };
            let state = match &mut record.exec {
                ExecState::Unstarted => Resumable::Start,
                ExecState::Generator(slot) => match slot.take() {
                    Some(generator) => Resumable::Suspended(generator),
                    None => {
                        return Err(RenderError::Reentrant {
                            name: component.name().to_owned(),
                        });
                    }
                },
                _ => Resumable::Settled,
            };
            if matches!(state, Resumable::Settled) {
                record.schedule.cover(seq);
                record.schedule.resolve(&record.value);
                return Ok(Output::Ready(record.value.clone()));
            }
            record.exec = ExecState::Generator(None);
            state
        };

        let ctx = self.context(id);
        let mut generator = match state {
            Resumable::Suspended(generator) => generator,
            _ => match component.kind() {
                ComponentKind::Generator(factory) => factory(props, &ctx),
                _ => return Ok(Output::Ready(Vec::new())),
            },
        };
        let step = generator.resume(&ctx, props);
        self.advance(id, seq, component, generator, step)
    }

    /// Applies a step produced by `resume` or `throw`.
    fn advance(
        &self,
        id: NodeId,
        seq: u64,
        component: &Component,
        generator: Box<dyn Generator>,
        step: anyhow::Result<Step>,
    ) -> Result<Output<A::Node>, RenderError> {
        match step {
            Ok(Step::Yield(child)) => {
                self.restore(id, generator);
                self.render_output(id, seq, child, true)
            }
            Ok(Step::Return(child)) => {
                self.set_exec(id, ExecState::Done);
                self.render_output(id, seq, child, false)
            }
            Err(error) => {
                self.set_exec(id, ExecState::Errored);
                Err(RenderError::component(component.name(), error))
            }
        }
    }

    /// Puts a suspended generator back, or finalizes it when its record went away
    /// while it was executing.
    fn restore(&self, id: NodeId, generator: Box<dyn Generator>) {
        let mut generator = {
            let mut records = self.records.borrow_mut();
            match records.get_mut(id) {
                Some(record) if !record.destroyed => {
                    if let ExecState::Generator(slot @ None) = &mut record.exec {
                        *slot = Some(generator);
                    }
                    return;
                }
                _ => generator,
            }
        };
        generator.finalize(&self.context(id));
    }

    /// Offers a failure below `id` to its generator. Anything else passes the
    /// error on.
    pub(crate) fn recover(
        &self,
        id: NodeId,
        seq: u64,
        error: RenderError,
    ) -> Result<Output<A::Node>, RenderError> {
        let taken = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Err(error);
            };
            let component = record.component().cloned();
            let destroyed = record.destroyed;
            match (&mut record.exec, component) {
                (ExecState::Generator(slot), Some(component)) if !destroyed => {
                    slot.take().map(|generator| (generator, component))
                }
                _ => None,
            }
        };
        let Some((mut generator, component)) = taken else {
            return Err(error);
        };
        debug!(%id, %error, "offering failure to generator");
        let step = generator.throw(&self.context(id), error);
        match step {
            Ok(Step::Yield(child)) => {
                self.restore(id, generator);
                self.render_output(id, seq, child, false)
            }
            step => self.advance(id, seq, &component, generator, step),
        }
    }

    /// Settles waiters up to `upto` with `failure`, logging it when nobody listens.
    pub(crate) fn fail(&self, id: NodeId, upto: u64, failure: &RenderError) {
        let observed = self
            .records
            .borrow_mut()
            .get_mut(id)
            .map_or(0, |record| record.schedule.fail(upto, failure));
        if observed == 0 {
            error!(%id, error = %failure, "component failed with nobody waiting");
        }
    }

    fn next_enqueued(&self, id: NodeId) -> Option<(Props, u64)> {
        let mut records = self.records.borrow_mut();
        let record = records.get_mut(id)?;
        let destroyed = record.destroyed;
        let ExecState::Async { running, enqueued } = &mut record.exec else {
            return None;
        };
        let next = if destroyed { None } else { enqueued.take() };
        if next.is_none() {
            *running = false;
        }
        next
    }

    /// Frees a zombie once its last call settled.
    fn release(&self, id: NodeId) {
        let children = {
            let mut records = self.records.borrow_mut();
            match records.get_mut(id) {
                Some(record) if record.destroyed => core::mem::take(&mut record.children),
                _ => return,
            }
        };
        debug!(%id, "releasing destroyed record");
        for child in children {
            self.destroy(child);
        }
        self.free(id);
    }

    fn run_async_generator(
        &self,
        id: NodeId,
        seq: u64,
        component: &Component,
        props: Props,
    ) -> Output<A::Node> {
        let (rx, started) = {
            let mut records = self.records.borrow_mut();
            let Some(record) = records.get_mut(id) else {
                return Output::Ready(Vec::new());
            };
            let rx = record.schedule.wait(seq);
            let started = match &record.exec {
                ExecState::Unstarted => {
                    let mailbox = Rc::new(Mailbox::new(props.clone(), seq));
                    record.exec = ExecState::AsyncGenerator(mailbox.clone());
                    Some(mailbox)
                }
                ExecState::AsyncGenerator(mailbox) => {
                    mailbox.deliver(props.clone(), seq);
                    None
                }
                _ => None,
            };
            (rx, started)
        };

        if let (Some(mailbox), ComponentKind::AsyncGenerator(factory)) = (started, component.kind()) {
            let stream = factory(props, self.context(id));
            self.spawn(pump(self.this.clone(), id, component.clone(), mailbox, stream));
        }
        Output::waiter(rx)
    }

    /// Renders one async generator output and shows it once it commits.
    fn emit(&self, id: NodeId, covers: u64, child: Child) {
        match self.render_output(id, covers, child, false) {
            Ok(Output::Ready(_)) => self.propagate(id),
            Ok(Output::Pending(pending)) => {
                let this = self.this.clone();
                self.spawn(async move {
                    let result = pending.await;
                    let Some(engine) = this.upgrade() else { return };
                    match result {
                        Ok(_) => engine.propagate(id),
                        Err(failure) => engine.fail(id, covers, &failure),
                    }
                });
            }
            Err(failure) => {
                if failure.is_duplicate_key() {
                    self.propagate(id);
                }
                self.fail(id, covers, &failure);
            }
        }
    }

    /// Marks a finished stream done and settles requests its final output does not
    /// cover.
    fn finish_stream(&self, id: NodeId, returned: Option<u64>) {
        if let Some(record) = self.records.borrow_mut().get_mut(id) {
            if matches!(record.exec, ExecState::AsyncGenerator(_)) {
                record.exec = ExecState::Done;
            }
            let value = record.value.clone();
            record.schedule.settle_after(returned.unwrap_or(0), &value);
        }
    }
}

/// Calls an async component until no update is left enqueued.
async fn invoke<A: Adapter>(
    engine: Weak<Engine<A>>,
    id: NodeId,
    component: Component,
    mut props: Props,
    mut seq: u64,
) {
    let ComponentKind::Async(body) = component.kind() else {
        return;
    };
    loop {
        let Some(ctx) = engine.upgrade().map(|engine| engine.context(id)) else {
            return;
        };
        let result = body(props, ctx).await;

        let outcome = match result {
            Ok(child) => {
                let rendered = match engine.upgrade() {
                    Some(engine) => engine.render_output(id, seq, child, true),
                    None => return,
                };
                match rendered {
                    Ok(Output::Ready(_)) => Ok(()),
                    Ok(Output::Pending(pending)) => pending.await.map(drop),
                    Err(failure) => Err(failure),
                }
            }
            Err(failure) => Err(RenderError::component(component.name(), failure)),
        };

        let Some(engine) = engine.upgrade() else { return };
        if let Err(failure) = outcome {
            engine.fail(id, seq, &failure);
        }
        match engine.next_enqueued(id) {
            Some((next_props, next_seq)) => {
                props = next_props;
                seq = next_seq;
            }
            None => {
                engine.release(id);
                return;
            }
        }
    }
}

/// Drives an async generator stream, committing every item it produces.
async fn pump<A: Adapter>(
    engine: Weak<Engine<A>>,
    id: NodeId,
    component: Component,
    mailbox: Rc<Mailbox>,
    mut stream: GeneratorStream,
) {
    let mut returned = None;
    while let Some(item) = stream.next().await {
        let Some(engine) = engine.upgrade() else { continue };
        if !engine.is_live(id) {
            // Keep pulling so code after the props loop still runs.
            continue;
        }
        let covers = mailbox.covers();
        match item {
            Ok(Step::Yield(child)) => engine.emit(id, covers, child),
            Ok(Step::Return(child)) => {
                engine.set_exec(id, ExecState::Done);
                engine.emit(id, covers, child);
                returned = Some(covers);
                break;
            }
            Err(failure) => {
                engine.set_exec(id, ExecState::Errored);
                engine.fail(id, u64::MAX, &RenderError::component(component.name(), failure));
                break;
            }
        }
    }
    if let Some(engine) = engine.upgrade() {
        engine.finish_stream(id, returned);
    }
}
