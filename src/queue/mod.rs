//! Ordered, single-consumer event dispatch.
//!
//! Producers call [`EventDispatchQueue::submit`] from any task or thread; it
//! never waits. The first submission while the queue is idle spawns a drain
//! task, which hands events to the registered handlers one at a time, in
//! submission order, and exits once nothing is pending. A later submission
//! starts a new drain task.
//!
//! ```text
//!            submit()              drain task (at most one)
//! producers ─────────► [pending] ─────────────────────────► handler 1 ─► handler 2 ─► ...
//!                       FIFO         Idle ──submit──► Draining
//!                                    Idle ◄─empty──── Draining
//! ```

mod stats;

pub use stats::{DrainState, QueueStats, ShutdownReport};

use crate::config::{QueueConfig, ShutdownMode};
use crate::error::Error;
use crate::events::{Event, Named, Seq};
use crate::handler::{
    handler_fn, panic_message, FailureKind, FailureObserver, Handler, HandlerFailure, HandlerId,
    HighWaterObserver,
};
use crate::Result;
use futures::FutureExt;
use stats::Counters;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use uuid::Uuid;

struct Registered<P>
where
    P: Send + Sync + 'static,
{
    id: HandlerId,
    handler: Arc<dyn Handler<P>>,
}

impl<P> Clone for Registered<P>
where
    P: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Handlers owned by one queue, keyed by event name.
struct Registry<P>
where
    P: Send + Sync + 'static,
{
    next_id: u64,
    by_name: HashMap<String, Vec<Registered<P>>>,
    catch_all: Vec<Registered<P>>,
}

impl<P> Registry<P>
where
    P: Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            next_id: 0,
            by_name: HashMap::new(),
            catch_all: Vec::new(),
        }
    }

    fn insert(&mut self, name: Option<String>, handler: Arc<dyn Handler<P>>) -> HandlerId {
        self.next_id += 1;
        let entry = Registered {
            id: HandlerId(self.next_id),
            handler,
        };
        match name {
            Some(name) => self.by_name.entry(name).or_default().push(entry),
            None => self.catch_all.push(entry),
        }
        HandlerId(self.next_id)
    }

    fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.catch_all.len();
        self.catch_all.retain(|r| r.id != id);
        if self.catch_all.len() != before {
            return true;
        }
        for list in self.by_name.values_mut() {
            if let Some(pos) = list.iter().position(|r| r.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Handlers for `name` in registration order, then catch-all handlers.
    fn snapshot(&self, name: &str) -> Vec<Registered<P>> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .chain(self.catch_all.iter())
            .cloned()
            .collect()
    }
}

struct Inner<P> {
    pending: VecDeque<Arc<Event<P>>>,
    state: DrainState,
    /// Front of `pending` is being handled.
    in_flight: bool,
    closed: bool,
    next_seq: Seq,
    above_high_water: bool,
}

struct Shared<P>
where
    P: Send + Sync + 'static,
{
    id: Uuid,
    config: QueueConfig,
    runtime: Handle,
    inner: Mutex<Inner<P>>,
    handlers: RwLock<Registry<P>>,
    idle: Notify,
    counters: Counters,
    on_failure: Option<FailureObserver>,
    on_high_water: Option<HighWaterObserver>,
}

impl<P> Shared<P>
where
    P: Send + Sync + 'static,
{
    // Nothing panics while these locks are held, so a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> std::sync::RwLockReadGuard<'_, Registry<P>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, Registry<P>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retire the finished front event (if any) and claim the next one.
    /// Switches to `Idle` when nothing is left.
    fn advance(&self, finished: bool) -> Option<Arc<Event<P>>> {
        let mut inner = self.lock();
        if finished {
            inner.pending.pop_front();
            Counters::incr(&self.counters.processed, 1);
            if let Some(mark) = self.config.high_water_mark {
                if inner.pending.len() < mark {
                    inner.above_high_water = false;
                }
            }
        }
        match inner.pending.front() {
            Some(event) => {
                let event = Arc::clone(event);
                inner.in_flight = true;
                Some(event)
            }
            None => {
                inner.in_flight = false;
                inner.state = DrainState::Idle;
                None
            }
        }
    }

    async fn dispatch(&self, event: &Arc<Event<P>>) {
        let handlers = self.registry().snapshot(&event.name);
        if handlers.is_empty() {
            tracing::trace!(queue = %self.id, event = %event.name, seq = event.seq, "no handler registered");
            return;
        }
        let limit = self.config.handler_timeout;
        for reg in handlers {
            // The timer is armed inside the unwind boundary: on a runtime
            // without the time driver it panics, and that panic is reported
            // like any other handler panic.
            let call = AssertUnwindSafe(async {
                let handled = reg.handler.handle(Arc::clone(event));
                match limit {
                    Some(limit) => tokio::time::timeout(limit, handled)
                        .await
                        .map_err(|_| limit),
                    None => Ok(handled.await),
                }
            })
            .catch_unwind();
            match call.await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => self.report(event, &reg, FailureKind::Error(e)),
                Ok(Err(limit)) => self.report(event, &reg, FailureKind::Timeout(limit)),
                Err(panic) => {
                    self.report(event, &reg, FailureKind::Panic(panic_message(panic.as_ref())))
                }
            }
        }
    }

    fn report(&self, event: &Event<P>, reg: &Registered<P>, kind: FailureKind) {
        Counters::incr(&self.counters.failed, 1);
        let failure = HandlerFailure {
            event: event.name.clone(),
            seq: event.seq,
            handler: reg.handler.name().to_string(),
            handler_id: reg.id,
            kind,
        };
        tracing::warn!(
            queue = %self.id,
            event = %failure.event,
            seq = failure.seq,
            handler = %failure.handler,
            "handler failed: {}",
            failure.kind
        );
        if let Some(observer) = &self.on_failure {
            if std::panic::catch_unwind(AssertUnwindSafe(|| observer(&failure))).is_err() {
                tracing::error!(queue = %self.id, "failure observer panicked");
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.lock().state == DrainState::Idle
    }
}

/// Restores the queue if a drain task ends before reaching `Idle`, either
/// by unwinding or by being dropped with its runtime.
struct DrainGuard<P>
where
    P: Send + Sync + 'static,
{
    shared: Arc<Shared<P>>,
    armed: bool,
}

impl<P> Drop for DrainGuard<P>
where
    P: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let restart = {
            let mut inner = self.shared.lock();
            // The in-flight event may have been seen by some of its handlers
            // already, so it is not handed out a second time.
            if inner.in_flight && inner.pending.pop_front().is_some() {
                Counters::incr(&self.shared.counters.discarded, 1);
            }
            inner.in_flight = false;
            let restart = !inner.pending.is_empty();
            inner.state = if restart {
                DrainState::Draining
            } else {
                DrainState::Idle
            };
            tracing::error!(
                queue = %self.shared.id,
                pending = inner.pending.len(),
                restart,
                "drain task ended unexpectedly"
            );
            restart
        };
        if restart {
            self.shared.runtime.spawn(drain(Arc::clone(&self.shared)));
        } else {
            self.shared.idle.notify_waiters();
        }
    }
}

async fn drain<P>(shared: Arc<Shared<P>>)
where
    P: Send + Sync + 'static,
{
    tracing::debug!(queue = %shared.id, "drain started");
    let mut guard = DrainGuard {
        shared: Arc::clone(&shared),
        armed: true,
    };
    let mut next = shared.advance(false);
    while let Some(event) = next {
        shared.dispatch(&event).await;
        next = shared.advance(true);
    }
    guard.armed = false;
    tracing::debug!(queue = %shared.id, "drain finished");
    shared.idle.notify_waiters();
}

/// Ordered mailbox between an event producer and async handlers.
///
/// Cheap to clone; clones share the same queue.
pub struct EventDispatchQueue<P>
where
    P: Send + Sync + 'static,
{
    shared: Arc<Shared<P>>,
}

impl<P> Clone for EventDispatchQueue<P>
where
    P: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P> fmt::Debug for EventDispatchQueue<P>
where
    P: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatchQueue")
            .field("id", &self.shared.id)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<P> EventDispatchQueue<P>
where
    P: Send + Sync + 'static,
{
    /// Create a queue on the current tokio runtime.
    pub fn new(config: QueueConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: QueueConfig) -> QueueBuilder<P> {
        QueueBuilder {
            config,
            on_failure: None,
            on_high_water: None,
            handlers: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Append an event and start the drain task if it is not running.
    ///
    /// Returns the event's sequence number. Fails with [`Error::Closed`] after
    /// shutdown and with [`Error::QueueFull`] when a capacity is configured and
    /// reached; the in-flight event counts towards the capacity.
    pub fn submit(&self, name: impl Into<String>, payload: P) -> Result<Seq> {
        let name = name.into();
        let (seq, depth, crossed, start) = {
            let mut inner = self.shared.lock();
            if inner.closed {
                return Err(Error::Closed);
            }
            if let Some(capacity) = self.shared.config.capacity {
                if inner.pending.len() >= capacity {
                    tracing::warn!(queue = %self.shared.id, event = %name, capacity, "queue full, rejecting event");
                    return Err(Error::QueueFull { capacity });
                }
            }
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner.pending.push_back(Arc::new(Event::new(name, payload, seq)));
            Counters::incr(&self.shared.counters.submitted, 1);

            let depth = inner.pending.len();
            let crossed = match self.shared.config.high_water_mark {
                Some(mark) if depth >= mark && !inner.above_high_water => {
                    inner.above_high_water = true;
                    true
                }
                _ => false,
            };
            let start = inner.state == DrainState::Idle;
            if start {
                inner.state = DrainState::Draining;
            }
            (seq, depth, crossed, start)
        };

        if crossed {
            tracing::warn!(queue = %self.shared.id, pending = depth, "pending events reached high water mark");
            if let Some(observer) = &self.shared.on_high_water {
                if std::panic::catch_unwind(AssertUnwindSafe(|| observer(depth))).is_err() {
                    tracing::error!(queue = %self.shared.id, "high water observer panicked");
                }
            }
        }
        if start {
            self.shared.runtime.spawn(drain(Arc::clone(&self.shared)));
        }
        Ok(seq)
    }

    /// Submit a payload under the event name it reports.
    pub fn submit_named(&self, payload: P) -> Result<Seq>
    where
        P: Named,
    {
        let name = payload.event_name().to_string();
        self.submit(name, payload)
    }

    /// Register a handler for `name`. Handlers for the same name run in
    /// registration order, each isolated from the others' failures.
    pub fn register<H>(&self, name: impl Into<String>, handler: H) -> Result<HandlerId>
    where
        H: Handler<P> + 'static,
    {
        self.register_shared(name, Arc::new(handler))
    }

    /// Register a handler that is also registered elsewhere.
    pub fn register_shared(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn Handler<P>>,
    ) -> Result<HandlerId> {
        self.insert(Some(name.into()), handler)
    }

    /// Register an async closure for `name`. Failure reports name it after the
    /// closure's type; register [`handler_fn`]`(f).named(..)` to pick the name.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F) -> Result<HandlerId>
    where
        F: Fn(Arc<Event<P>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name, handler_fn::<P, F, Fut>(f))
    }

    /// Register a handler for every event. Catch-all handlers run after the
    /// handlers registered for the event's name.
    pub fn register_catch_all<H>(&self, handler: H) -> Result<HandlerId>
    where
        H: Handler<P> + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    fn insert(&self, name: Option<String>, handler: Arc<dyn Handler<P>>) -> Result<HandlerId> {
        if self.shared.lock().closed {
            return Err(Error::Closed);
        }
        let id = self.shared.registry_mut().insert(name.clone(), handler);
        tracing::debug!(queue = %self.shared.id, handler = %id, event = name.as_deref().unwrap_or("*"), "handler registered");
        Ok(id)
    }

    /// Remove a handler. Takes effect from the next event. Returns whether
    /// the handler was registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        self.shared.registry_mut().remove(id)
    }

    /// Number of events not yet fully handled, including the in-flight one.
    pub fn len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.shared.lock();
        let c = &self.shared.counters;
        QueueStats {
            submitted: Counters::get(&c.submitted),
            processed: Counters::get(&c.processed),
            failed: Counters::get(&c.failed),
            discarded: Counters::get(&c.discarded),
            pending: inner.pending.len(),
            state: inner.state,
            closed: inner.closed,
        }
    }

    /// Wait until the drain task has emptied the queue.
    ///
    /// Must not be awaited from inside a handler of the same queue.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Shut down using the configured [`ShutdownMode`].
    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        self.shutdown_with(self.shared.config.shutdown).await
    }

    /// Stop accepting events and handlers, then drain or discard what is
    /// pending and wait until the queue is idle. The in-flight event always
    /// completes. The drain task may still be logging its exit when this
    /// returns; no handler runs after that point.
    ///
    /// Must not be awaited from inside a handler of the same queue.
    pub async fn shutdown_with(&self, mode: ShutdownMode) -> Result<ShutdownReport> {
        let discarded = {
            let mut inner = self.shared.lock();
            if inner.closed {
                return Err(Error::Closed);
            }
            inner.closed = true;
            match mode {
                ShutdownMode::Drain => 0,
                ShutdownMode::Discard => {
                    let keep = usize::from(inner.in_flight);
                    let dropped = inner.pending.len().saturating_sub(keep);
                    inner.pending.truncate(keep);
                    dropped
                }
            }
        };
        tracing::info!(queue = %self.shared.id, ?mode, discarded, "shutting down");
        if discarded > 0 {
            Counters::incr(&self.shared.counters.discarded, discarded as u64);
        }
        self.wait_idle().await;
        let c = &self.shared.counters;
        Ok(ShutdownReport {
            processed: Counters::get(&c.processed),
            failed: Counters::get(&c.failed),
            discarded: Counters::get(&c.discarded),
        })
    }
}

/// Builds an [`EventDispatchQueue`] with observers and initial handlers.
pub struct QueueBuilder<P>
where
    P: Send + Sync + 'static,
{
    config: QueueConfig,
    on_failure: Option<FailureObserver>,
    on_high_water: Option<HighWaterObserver>,
    handlers: Vec<(Option<String>, Arc<dyn Handler<P>>)>,
}

impl<P> QueueBuilder<P>
where
    P: Send + Sync + 'static,
{
    /// Called once for every failed handler invocation, after it is logged.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(f));
        self
    }

    /// Called when pending events reach the configured high water mark.
    pub fn on_high_water<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_high_water = Some(Arc::new(f));
        self
    }

    pub fn handler<H>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<P> + 'static,
    {
        self.handlers.push((Some(name.into()), Arc::new(handler)));
        self
    }

    pub fn catch_all<H>(mut self, handler: H) -> Self
    where
        H: Handler<P> + 'static,
    {
        self.handlers.push((None, Arc::new(handler)));
        self
    }

    /// Validate the config and bind the queue to the current tokio runtime.
    pub fn build(self) -> Result<EventDispatchQueue<P>> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let mut registry = Registry::new();
        for (name, handler) in self.handlers {
            registry.insert(name, handler);
        }
        let shared = Shared {
            id: Uuid::new_v4(),
            config: self.config,
            runtime,
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                state: DrainState::Idle,
                in_flight: false,
                closed: false,
                next_seq: 0,
                above_high_water: false,
            }),
            handlers: RwLock::new(registry),
            idle: Notify::new(),
            counters: Counters::default(),
            on_failure: self.on_failure,
            on_high_water: self.on_high_water,
        };
        tracing::debug!(queue = %shared.id, "queue created");
        Ok(EventDispatchQueue {
            shared: Arc::new(shared),
        })
    }
}
