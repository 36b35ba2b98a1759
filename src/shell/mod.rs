//! Client application shell: the user-facing operations behind the CLI.
//!
//! Backend writes that fail because the backend is unreachable are handed
//! to the worker's sync queue instead of being reported as errors.

pub mod image;
pub mod output;

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

use crate::api::{
  create_write, delete_write, update_write, ApiClient, CreatedEntry, EntryInput, EntryQuery,
  OcrEntry, OcrRequest, ReportRequest, Stats, TimeEntry,
};
use crate::cache::CacheStorage;
use crate::net::Request;
use crate::worker::{
  EventDispatcher, EventOutcome, PendingWrite, QueuedWrite, ServiceWorker, SyncStorage,
  WorkerEvent, WorkerState, TIME_ENTRY_SYNC,
};

/// What happened to a write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
  /// The backend accepted it
  Sent(T),
  /// The backend was unreachable; queued under this id for the next sync
  Queued(i64),
}

pub struct Shell<S>
where
  S: CacheStorage + SyncStorage + 'static,
{
  api: ApiClient,
  worker: ServiceWorker<S>,
  events: EventDispatcher,
}

impl<S> Shell<S>
where
  S: CacheStorage + SyncStorage + 'static,
{
  /// Must be called inside a Tokio runtime; the worker's event loop is
  /// spawned here.
  pub fn new(api: ApiClient, worker: ServiceWorker<S>) -> Self {
    let events = EventDispatcher::spawn(worker.clone());
    Self {
      api,
      worker,
      events,
    }
  }

  /// Entries newest first, optionally narrowed to rows containing `search`.
  pub async fn list_entries(
    &self,
    query: &EntryQuery,
    search: Option<&str>,
  ) -> Result<Vec<TimeEntry>> {
    let mut entries = self
      .api
      .list_entries(query)
      .await
      .map_err(|e| eyre!("Failed to load entries: {}", e))?;

    entries.sort_by(|a, b| b.start_date_time.cmp(&a.start_date_time));
    if let Some(term) = search.map(str::to_lowercase).filter(|t| !t.is_empty()) {
      entries.retain(|entry| {
        output::format_entry_row(entry)
          .to_lowercase()
          .contains(&term)
      });
    }

    Ok(entries)
  }

  pub async fn add_entry(&self, entry: EntryInput) -> Result<WriteOutcome<CreatedEntry>> {
    let entry = entry.validated()?;
    let outcome = self.submit(create_write(&entry)?).await?;

    match outcome {
      WriteOutcome::Sent(value) => {
        let created: CreatedEntry = serde_json::from_value(value)
          .map_err(|e| eyre!("Unexpected reply to create: {}", e))?;
        Ok(WriteOutcome::Sent(created))
      }
      WriteOutcome::Queued(id) => Ok(WriteOutcome::Queued(id)),
    }
  }

  pub async fn update_entry(&self, id: i64, entry: EntryInput) -> Result<WriteOutcome<()>> {
    let entry = entry.validated()?;
    let outcome = self.submit(update_write(id, &entry)?).await?;
    Ok(discard(outcome))
  }

  pub async fn delete_entry(&self, id: i64) -> Result<WriteOutcome<()>> {
    let outcome = self.submit(delete_write(id)).await?;
    Ok(discard(outcome))
  }

  /// Send a write, or queue it if the backend cannot be reached.
  async fn submit(&self, write: PendingWrite) -> Result<WriteOutcome<serde_json::Value>> {
    match self.api.send(&write).await {
      Ok(reply) => Ok(WriteOutcome::Sent(reply)),
      Err(e) if e.is_connectivity() => {
        warn!(%write, error = %e, "backend unreachable, queueing write");
        let id = self.worker.sync_queue().enqueue(&write)?;
        Ok(WriteOutcome::Queued(id))
      }
      Err(e) => Err(eyre!("{} failed: {}", write, e)),
    }
  }

  /// Upload a timesheet image and return the entries found on it.
  pub async fn extract_entries(&self, image: &Path) -> Result<Vec<OcrEntry>> {
    let request = OcrRequest {
      image: image::encode_data_url(image)?,
    };
    self
      .api
      .ocr(&request)
      .await
      .map_err(|e| eyre!("Error processing image: {}", e))
  }

  /// Save recognized entries as service time, in order.
  pub async fn import_entries(
    &self,
    entries: Vec<OcrEntry>,
  ) -> Result<Vec<WriteOutcome<CreatedEntry>>> {
    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
      outcomes.push(self.add_entry(entry.into_input()).await?);
    }
    info!(count = outcomes.len(), "imported entries");
    Ok(outcomes)
  }

  pub async fn stats(&self) -> Result<Stats> {
    self
      .api
      .stats()
      .await
      .map_err(|e| eyre!("Failed to load stats: {}", e))
  }

  /// Generate a report and write it to `out`, or to the default file name
  /// for `today` in the current directory.
  pub async fn report(
    &self,
    request: &ReportRequest,
    out: Option<PathBuf>,
    today: NaiveDate,
  ) -> Result<PathBuf> {
    if request.end_date < request.start_date {
      return Err(eyre!("Report end date is before its start date"));
    }

    let pdf = self
      .api
      .report(request)
      .await
      .map_err(|e| eyre!("Error generating report: {}", e))?;

    let path = out.unwrap_or_else(|| PathBuf::from(request.report_type.file_name(today)));
    std::fs::write(&path, pdf)
      .map_err(|e| eyre!("Failed to write report to {}: {}", path.display(), e))?;

    Ok(path)
  }

  pub async fn install(&self) -> Result<EventOutcome> {
    self.events.dispatch(WorkerEvent::Install).await
  }

  pub async fn activate(&self) -> Result<EventOutcome> {
    self.events.dispatch(WorkerEvent::Activate).await
  }

  pub async fn fetch(&self, url: Url, navigate: bool) -> Result<EventOutcome> {
    let request = if navigate {
      Request::navigate(url)
    } else {
      Request::get(url)
    };
    self.events.dispatch(WorkerEvent::Fetch(request)).await
  }

  /// Deliver the connectivity signal for queued time entry writes.
  pub async fn sync(&self) -> Result<EventOutcome> {
    self
      .events
      .dispatch(WorkerEvent::Sync {
        tag: TIME_ENTRY_SYNC.to_string(),
      })
      .await
  }

  /// Cache versions present, with the configured one flagged.
  pub fn versions(&self) -> Result<Vec<(String, bool)>> {
    let current = self.worker.lifecycle().version().as_str();
    let versions = self.worker.lifecycle().list_versions()?;
    Ok(
      versions
        .into_iter()
        .map(|name| {
          let is_current = name == current;
          (name, is_current)
        })
        .collect(),
    )
  }

  pub fn worker_state(&self) -> WorkerState {
    self.worker.lifecycle().state()
  }

  pub fn pending(&self) -> Result<Vec<QueuedWrite>> {
    self.worker.sync_queue().pending()
  }
}

fn discard(outcome: WriteOutcome<serde_json::Value>) -> WriteOutcome<()> {
  match outcome {
    WriteOutcome::Sent(_) => WriteOutcome::Sent(()),
    WriteOutcome::Queued(id) => WriteOutcome::Queued(id),
  }
}
