//! # whatsapp-dispatch
//!
//! Ordered, in-process dispatch for the event stream of a WhatsApp Web client.
//!
//! ## Features
//!
//! - Non-blocking `submit` from any number of producers
//! - Strict FIFO processing, one handler invocation at a time
//! - Fan-out to several handlers per event name, plus catch-all handlers
//! - Handler errors, panics and timeouts are logged and isolated
//! - Optional capacity limit and high water mark signal
//! - Drain or discard on shutdown
//! - Event persistence through a pluggable store
//!
//! ## Example
//!
//! ```ignore
//! use whatsapp_dispatch::{events::names, EventDispatchQueue, QueueConfig, WaEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = EventDispatchQueue::<WaEvent>::new(QueueConfig::default())?;
//!     queue.register_fn(names::CREDS_UPDATE, |_evt| async move {
//!         // save credentials...
//!         Ok(())
//!     })?;
//!     queue.submit_named(WaEvent::CredsUpdate)?;
//!     queue.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod queue;
pub mod source;
pub mod store;

pub use config::{QueueConfig, ShutdownMode};
pub use error::{Error, Result};
pub use events::{Event, Named, Seq, WaEvent};
pub use handler::{handler_fn, FailureKind, FnHandler, Handler, HandlerFailure, HandlerId};
pub use queue::{DrainState, EventDispatchQueue, QueueBuilder, QueueStats, ShutdownReport};
pub use source::{forward, forward_named};
pub use store::{EventStore, MemoryEventStore, PersistHandler};
