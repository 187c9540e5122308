//! Handler contract for the dispatch queue.
//!
//! A handler reports failure through its return value. The queue catches
//! errors, panics, and timeouts at the handler boundary and turns each into a
//! [`HandlerFailure`]; nothing a handler does can stop the drain loop.

use crate::events::{Event, Seq};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Async function invoked with an event.
#[async_trait]
pub trait Handler<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    async fn handle(&self, event: Arc<Event<P>>) -> anyhow::Result<()>;

    /// Name used in logs and failure reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    /// Replace the name reported in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Wrap an async closure as a [`Handler`].
///
/// ```ignore
/// let h = handler_fn(|evt: Arc<Event<WaEvent>>| async move {
///     tracing::info!(seq = evt.seq, "got event");
///     Ok(())
/// })
/// .named("log");
/// ```
pub fn handler_fn<P, F, Fut>(f: F) -> FnHandler<F>
where
    P: Send + Sync + 'static,
    F: Fn(Arc<Event<P>>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler {
        name: std::any::type_name::<F>().to_string(),
        f,
    }
}

#[async_trait]
impl<P, F, Fut> Handler<P> for FnHandler<F>
where
    P: Send + Sync + 'static,
    F: Fn(Arc<Event<P>>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event<P>>) -> anyhow::Result<()> {
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Identifies one registration; used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// How a handler invocation failed.
#[derive(Debug)]
pub enum FailureKind {
    Error(anyhow::Error),
    Panic(String),
    Timeout(Duration),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "error: {e:#}"),
            Self::Panic(msg) => write!(f, "panicked: {msg}"),
            Self::Timeout(limit) => write!(f, "timed out after {limit:?}"),
        }
    }
}

/// One failed handler invocation, as reported to the failure observer.
#[derive(Debug)]
pub struct HandlerFailure {
    pub event: String,
    pub seq: Seq,
    pub handler: String,
    pub handler_id: HandlerId,
    pub kind: FailureKind,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handler {} ({}) failed on {} #{}: {}",
            self.handler, self.handler_id, self.event, self.seq, self.kind
        )
    }
}

/// Called once per failed handler invocation.
pub type FailureObserver = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

/// Called with the pending length when the high water mark is reached.
pub type HighWaterObserver = Arc<dyn Fn(usize) + Send + Sync>;

/// Best-effort message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_handler_runs_closure() {
        let h = handler_fn(|evt: Arc<Event<u32>>| async move {
            anyhow::ensure!(evt.payload == 7, "unexpected payload {}", evt.payload);
            Ok(())
        })
        .named("check-seven");
        assert_eq!(Handler::<u32>::name(&h), "check-seven");

        let ok = Arc::new(Event::new("n".into(), 7u32, 1));
        assert!(h.handle(ok).await.is_ok());
        let bad = Arc::new(Event::new("n".into(), 8u32, 2));
        let err = h.handle(bad).await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected payload 8");
    }

    #[test]
    fn panic_message_extracts_strings() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
        let s: Box<dyn std::any::Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(s.as_ref()), "non-string panic payload");
    }

    #[test]
    fn failure_display() {
        let failure = HandlerFailure {
            event: "messages.upsert".into(),
            seq: 4,
            handler: "reply".into(),
            handler_id: HandlerId(2),
            kind: FailureKind::Timeout(Duration::from_millis(50)),
        };
        assert_eq!(
            failure.to_string(),
            "handler reply (h2) failed on messages.upsert #4: timed out after 50ms"
        );
    }
}
