//! Basic example: route a simulated client event stream through a dispatch queue.
//!
//! Run with: `cargo run --example basic`

use std::sync::Arc;
use std::time::Duration;
use whatsapp_dispatch::events::{names, ConnectionState, DisconnectReason};
use whatsapp_dispatch::{
    forward_named, handler_fn, Event, EventDispatchQueue, MemoryEventStore, PersistHandler,
    QueueConfig, WaEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let store = Arc::new(MemoryEventStore::<WaEvent>::new());
    let queue = EventDispatchQueue::<WaEvent>::builder(
        QueueConfig::default().with_handler_timeout(Duration::from_secs(5)),
    )
    .on_failure(|failure| eprintln!("[Failure] {}", failure))
    .catch_all(PersistHandler::<WaEvent>::new(store.clone()))
    .build()?;

    queue.register_fn(names::CONNECTION_UPDATE, |evt| async move {
        if let WaEvent::ConnectionUpdate {
            connection,
            qr,
            last_disconnect,
            ..
        } = &evt.payload
        {
            if let Some(qr) = qr {
                println!("[Event] QR code (scan with WhatsApp Linked Devices): {}", qr);
            }
            match connection {
                Some(ConnectionState::Open) => println!("[Event] Connected."),
                Some(ConnectionState::Close) => {
                    let reconnect = last_disconnect.map_or(true, |r| r.should_reconnect());
                    println!("[Event] Connection closed, reconnect: {}", reconnect);
                }
                _ => {}
            }
        }
        Ok(())
    })?;

    queue.register(
        names::CREDS_UPDATE,
        handler_fn(|_evt: Arc<Event<WaEvent>>| async move {
            anyhow::bail!("credentials store is read-only in this demo")
        })
        .named("creds-writer"),
    )?;

    let upstream = futures::stream::iter(vec![
        WaEvent::ConnectionUpdate {
            connection: Some(ConnectionState::Connecting),
            qr: Some("2@STUB_QR_CODE".to_string()),
            last_disconnect: None,
            is_new_login: false,
        },
        WaEvent::CredsUpdate,
        WaEvent::ConnectionUpdate {
            connection: Some(ConnectionState::Open),
            qr: None,
            last_disconnect: None,
            is_new_login: true,
        },
        WaEvent::ConnectionUpdate {
            connection: Some(ConnectionState::Close),
            qr: None,
            last_disconnect: DisconnectReason::from_code(515),
            is_new_login: false,
        },
    ]);

    let submitted = forward_named(upstream, &queue).await?;
    let report = queue.shutdown().await?;
    println!(
        "Submitted {}, processed {}, failed handler calls {}.",
        submitted, report.processed, report.failed
    );
    Ok(())
}
