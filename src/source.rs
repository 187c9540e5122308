//! Bridge from an upstream client's event stream into a dispatch queue.
//!
//! The WhatsApp client is treated as an opaque producer: anything that yields
//! `(name, payload)` pairs as a [`Stream`] can be forwarded. Typically a task
//! owns the stream and calls [`forward`] until the connection ends.

use crate::events::Named;
use crate::queue::EventDispatchQueue;
use crate::Result;
use futures::stream::{Stream, StreamExt};

/// Submit every item of `stream` to `queue`, in stream order.
///
/// Returns how many events were submitted once the stream ends. Stops at the
/// first rejected submission (for example after the queue was shut down).
pub async fn forward<S, N, P>(stream: S, queue: &EventDispatchQueue<P>) -> Result<u64>
where
    S: Stream<Item = (N, P)>,
    N: Into<String>,
    P: Send + Sync + 'static,
{
    futures::pin_mut!(stream);
    let mut submitted = 0u64;
    while let Some((name, payload)) = stream.next().await {
        if let Err(e) = queue.submit(name, payload) {
            tracing::debug!(queue = %queue.id(), submitted, "forwarding stopped: {}", e);
            return Err(e);
        }
        submitted += 1;
    }
    tracing::debug!(queue = %queue.id(), submitted, "upstream stream ended");
    Ok(submitted)
}

/// Like [`forward`], for payloads that carry their own event name.
pub async fn forward_named<S, P>(stream: S, queue: &EventDispatchQueue<P>) -> Result<u64>
where
    S: Stream<Item = P>,
    P: Named + Send + Sync + 'static,
{
    let named = stream.map(|payload| (payload.event_name().to_string(), payload));
    forward(named, queue).await
}
