//! Per-record ordering of requests, attempts and commits.
//!
//! Every update of a record is a *request* with a sequence number. Every candidate
//! output that starts rendering is an *attempt*. An attempt commits only when it is
//! newer than the last committed one, and a commit that covers request `n` settles
//! every waiter for a request up to `n`.

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};

use crate::error::RenderError;

pub(crate) type Settled<N> = Result<Vec<N>, RenderError>;
type Waiter<N> = oneshot::Sender<Settled<N>>;

/// Sequence counters and completion waiters of one record.
pub(crate) struct Schedule<N> {
    requested: u64,
    attempts: u64,
    committed: u64,
    covered: u64,
    waiters: Vec<(u64, Waiter<N>)>,
}

impl<N> Schedule<N> {
    pub(crate) const fn new() -> Self {
        Self {
            requested: 0,
            attempts: 0,
            committed: 0,
            covered: 0,
            waiters: Vec::new(),
        }
    }

    /// Starts a new request and returns its sequence number.
    pub(crate) const fn request(&mut self) -> u64 {
        self.requested += 1;
        self.requested
    }

    pub(crate) const fn requested(&self) -> u64 {
        self.requested
    }

    /// Starts a new attempt and returns its number.
    pub(crate) const fn attempt(&mut self) -> u64 {
        self.attempts += 1;
        self.attempts
    }

    pub(crate) const fn has_committed(&self) -> bool {
        self.committed > 0
    }

    /// Records a commit of `attempt`, which reflects requests up to `covers`.
    /// Returns `false` when a newer attempt already committed.
    pub(crate) fn try_commit(&mut self, attempt: u64, covers: u64) -> bool {
        if attempt <= self.committed {
            return false;
        }
        self.committed = attempt;
        self.cover(covers);
        true
    }

    /// Marks requests up to `seq` as reflected without a new commit.
    pub(crate) fn cover(&mut self, seq: u64) {
        self.covered = self.covered.max(seq);
    }

    /// Registers a waiter for request `seq`.
    pub(crate) fn wait(&mut self, seq: u64) -> oneshot::Receiver<Settled<N>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push((seq, tx));
        rx
    }

    fn take_waiters(&mut self, select: impl Fn(u64) -> bool) -> Vec<Waiter<N>> {
        let (settled, pending): (Vec<_>, Vec<_>) = core::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|(seq, _)| select(*seq));
        self.waiters = pending;
        settled.into_iter().map(|(_, tx)| tx).collect()
    }

    /// Settles every waiter whose request is covered.
    pub(crate) fn resolve(&mut self, value: &[N])
    where
        N: Clone,
    {
        let covered = self.covered;
        for tx in self.take_waiters(|seq| seq <= covered) {
            let _ = tx.send(Ok(value.to_vec()));
        }
    }

    /// Fails every waiter for a request up to `upto`. Returns how many there were.
    pub(crate) fn fail(&mut self, upto: u64, error: &RenderError) -> usize {
        let waiters = self.take_waiters(|seq| seq <= upto);
        let count = waiters.len();
        for tx in waiters {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    /// Settles all remaining waiters with `value`.
    pub(crate) fn drain(&mut self, value: &[N])
    where
        N: Clone,
    {
        self.settle_after(0, value);
    }

    /// Settles waiters for requests newer than `seq` with `value`.
    pub(crate) fn settle_after(&mut self, seq: u64, value: &[N])
    where
        N: Clone,
    {
        self.cover(self.requested);
        for tx in self.take_waiters(|waiting| waiting > seq) {
            let _ = tx.send(Ok(value.to_vec()));
        }
    }
}

/// The platform nodes a record renders to, now or later.
pub(crate) enum Output<N> {
    Ready(Vec<N>),
    Pending(LocalBoxFuture<'static, Settled<N>>),
}

impl<N: 'static> Output<N> {
    /// Waits for a registered waiter. A waiter whose record vanished without
    /// settling it renders nothing.
    pub(crate) fn waiter(rx: oneshot::Receiver<Settled<N>>) -> Self {
        Self::Pending(rx.map(|settled| settled.unwrap_or_else(|_| Ok(Vec::new()))).boxed_local())
    }

    pub(crate) fn into_future(self) -> LocalBoxFuture<'static, Settled<N>> {
        match self {
            Self::Ready(nodes) => future::ready(Ok(nodes)).boxed_local(),
            Self::Pending(pending) => pending,
        }
    }

    /// Concatenates outputs in order. Ready when every part is.
    pub(crate) fn join(outputs: Vec<Self>) -> Self {
        if outputs.iter().all(|output| matches!(output, Self::Ready(_))) {
            let nodes = outputs
                .into_iter()
                .flat_map(|output| match output {
                    Self::Ready(nodes) => nodes,
                    Self::Pending(_) => Vec::new(),
                })
                .collect();
            return Self::Ready(nodes);
        }
        let parts = future::try_join_all(outputs.into_iter().map(Self::into_future));
        Self::Pending(
            async move { Ok(parts.await?.into_iter().flatten().collect()) }.boxed_local(),
        )
    }
}
