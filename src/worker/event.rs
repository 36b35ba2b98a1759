use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::interceptor::Intercepted;
use super::lifecycle::{ActivationReport, InstallReport};
use super::sync::SyncReport;
use crate::net::Request;

/// Events the host delivers to the worker
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  /// Background sync for a registered tag
  Sync { tag: String },
}

impl WorkerEvent {
  /// Lifecycle events are handled one at a time, in order.
  fn is_lifecycle(&self) -> bool {
    matches!(self, Self::Install | Self::Activate)
  }
}

/// Result of handling one event
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivationReport),
  Fetched(Intercepted),
  Synced(SyncReport),
}

/// Asynchronous unit of work the host must await before it considers an
/// event resolved.
pub type Task = BoxFuture<'static, Result<EventOutcome>>;

/// Anything that turns events into tasks.
pub trait EventHandler: Send + Sync + 'static {
  fn handle(&self, event: WorkerEvent) -> Task;
}

type Envelope = (WorkerEvent, oneshot::Sender<Result<EventOutcome>>);

/// Host-side event loop.
///
/// Install and activate are awaited before the next event is taken, so
/// activation never starts before install has finished and no fetch is
/// dispatched before activation has finished. Fetch and sync tasks run
/// concurrently with each other.
pub struct EventDispatcher {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl EventDispatcher {
  /// Spawn the event loop for `handler`.
  pub fn spawn<H: EventHandler>(handler: H) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    tokio::spawn(async move {
      while let Some((event, reply)) = rx.recv().await {
        debug!(?event, "dispatching");
        let serial = event.is_lifecycle();
        let task = handler.handle(event);

        if serial {
          // Receiver may have given up waiting
          let _ = reply.send(task.await);
        } else {
          tokio::spawn(async move {
            let _ = reply.send(task.await);
          });
        }
      }
    });

    Self { tx }
  }

  /// Deliver an event and wait for its task to complete.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send((event, reply_tx))
      .map_err(|_| eyre!("Worker event loop has stopped"))?;

    reply_rx
      .await
      .map_err(|_| eyre!("Worker dropped the event before finishing it"))?
  }
}
