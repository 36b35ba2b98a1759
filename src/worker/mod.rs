//! Offline worker: cache lifecycle, request interception and deferred sync.
//!
//! The host drives the worker by delivering [`WorkerEvent`]s; each one is
//! turned into a [`Task`] the host awaits. See [`EventDispatcher`] for the
//! ordering guarantees between events.

mod event;
mod fallback;
mod interceptor;
mod lifecycle;
mod sync;

pub use event::{EventDispatcher, EventHandler, EventOutcome, Task, WorkerEvent};
pub use interceptor::{Intercepted, RequestInterceptor};
pub use lifecycle::{ActivationReport, InstallReport, LifecycleManager, WorkerConfig, WorkerState};
pub use sync::{
  PendingWrite, QueuedWrite, ReplayError, Replayer, RetryPolicy, SyncQueue, SyncReport,
  SyncStorage, WriteMethod, TIME_ENTRY_SYNC,
};

use color_eyre::Result;
use futures::FutureExt;
use std::sync::Arc;

use crate::cache::CacheStorage;
use crate::net::Network;

/// The worker as a whole: one lifecycle manager, interceptor and sync queue
/// sharing a storage backend.
pub struct ServiceWorker<S>
where
  S: CacheStorage + SyncStorage + 'static,
{
  lifecycle: Arc<LifecycleManager<S>>,
  interceptor: Arc<RequestInterceptor<S>>,
  sync: Arc<SyncQueue<S>>,
}

impl<S> ServiceWorker<S>
where
  S: CacheStorage + SyncStorage + 'static,
{
  pub fn new(
    config: WorkerConfig,
    storage: Arc<S>,
    network: Arc<dyn Network>,
    replayer: Arc<dyn Replayer>,
    policy: RetryPolicy,
  ) -> Result<Self> {
    let config = Arc::new(config);
    let lifecycle = LifecycleManager::new(
      Arc::clone(&config),
      Arc::clone(&storage),
      Arc::clone(&network),
    )?;
    let interceptor = RequestInterceptor::new(config, Arc::clone(&storage), network);
    let sync = SyncQueue::new(storage, replayer, policy);

    Ok(Self {
      lifecycle: Arc::new(lifecycle),
      interceptor: Arc::new(interceptor),
      sync: Arc::new(sync),
    })
  }

  pub fn lifecycle(&self) -> &LifecycleManager<S> {
    &self.lifecycle
  }

  pub fn sync_queue(&self) -> &SyncQueue<S> {
    &self.sync
  }
}

impl<S> Clone for ServiceWorker<S>
where
  S: CacheStorage + SyncStorage + 'static,
{
  fn clone(&self) -> Self {
    Self {
      lifecycle: Arc::clone(&self.lifecycle),
      interceptor: Arc::clone(&self.interceptor),
      sync: Arc::clone(&self.sync),
    }
  }
}

impl<S> EventHandler for ServiceWorker<S>
where
  S: CacheStorage + SyncStorage + 'static,
{
  fn handle(&self, event: WorkerEvent) -> Task {
    match event {
      WorkerEvent::Install => {
        let lifecycle = Arc::clone(&self.lifecycle);
        async move { lifecycle.install().await.map(EventOutcome::Installed) }.boxed()
      }
      WorkerEvent::Activate => {
        let lifecycle = Arc::clone(&self.lifecycle);
        async move { lifecycle.activate().map(EventOutcome::Activated) }.boxed()
      }
      WorkerEvent::Fetch(request) => {
        let lifecycle = Arc::clone(&self.lifecycle);
        let interceptor = Arc::clone(&self.interceptor);
        async move {
          // With no active version the worker does not control its clients.
          let outcome = match lifecycle.serving_version()? {
            Some(version) => interceptor.intercept(&version, &request).await,
            None => Intercepted::Passthrough,
          };
          Ok::<_, color_eyre::Report>(EventOutcome::Fetched(outcome))
        }
        .boxed()
      }
      WorkerEvent::Sync { tag } => {
        let sync = Arc::clone(&self.sync);
        async move { sync.on_sync_signal(&tag).await.map(EventOutcome::Synced) }.boxed()
      }
    }
  }
}
