//! Plain-text rendering of command results.

use crate::api::{OcrEntry, Stats, TimeEntry};
use crate::cache::CacheSource;
use crate::worker::{ActivationReport, InstallReport, Intercepted, QueuedWrite, SyncReport};

const DATETIME: &str = "%Y-%m-%d %H:%M";

/// One entry as a table row.
pub fn format_entry_row(entry: &TimeEntry) -> String {
  let order = if entry.order_number.is_empty() {
    "-"
  } else {
    entry.order_number.as_str()
  };
  format!(
    "{:>5}  {:<20} {:<12} {:<10} {}  {}  {}",
    entry.id,
    entry.employee_name,
    entry.entry_type,
    order,
    entry.start_date_time.format(DATETIME),
    entry.end_date_time.format(DATETIME),
    entry.elapsed_time
  )
}

pub fn format_entries(entries: &[TimeEntry]) -> String {
  if entries.is_empty() {
    return "No entries found.".to_string();
  }
  let mut output = format!("ENTRIES ({})\n", entries.len());
  output.push_str(&"-".repeat(40));
  for entry in entries {
    output.push('\n');
    output.push_str(&format_entry_row(entry));
  }
  output
}

pub fn format_stats(stats: &Stats) -> String {
  format!(
    "Hours this week: {:.1}\nTotal entries:   {}\nActive orders:   {}",
    stats.total_hours_this_week, stats.total_entries, stats.active_orders
  )
}

/// Preview of entries recognized on a timesheet.
pub fn format_ocr_preview(entries: &[OcrEntry]) -> String {
  if entries.is_empty() {
    return "No time entries found in image.".to_string();
  }
  let mut output = format!("EXTRACTED ({})\n", entries.len());
  output.push_str(&"-".repeat(40));
  for entry in entries {
    output.push_str(&format!(
      "\n{} - {}\n  {} - {}  {}",
      entry.employee_name,
      entry.order_number,
      entry.start_date_time.format(DATETIME),
      entry.end_date_time.format(DATETIME),
      entry.elapsed_time
    ));
  }
  output
}

pub fn format_pending(writes: &[QueuedWrite]) -> String {
  if writes.is_empty() {
    return "Nothing waiting to sync.".to_string();
  }
  let mut output = format!("PENDING ({})\n", writes.len());
  output.push_str(&"-".repeat(40));
  for queued in writes {
    output.push_str(&format!(
      "\n#{} {} (queued {}, {} failed attempts)",
      queued.id,
      queued.write,
      queued.queued_at.format(DATETIME),
      queued.attempts
    ));
    if let Some(error) = &queued.last_error {
      output.push_str(&format!("\n  Last error: {}", error));
    }
  }
  output
}

pub fn format_install(report: &InstallReport) -> String {
  if report.already_installed {
    format!("{} is already installed.", report.version)
  } else {
    format!("Installed {} ({} assets cached).", report.version, report.cached)
  }
}

pub fn format_activation(report: &ActivationReport) -> String {
  if report.already_active {
    return "Already active.".to_string();
  }
  let mut output = format!("Activated. Removed {} old cache(s).", report.deleted.len());
  for name in &report.deleted {
    output.push_str(&format!("\n  - {}", name));
  }
  for (name, reason) in &report.failed {
    output.push_str(&format!("\n  ! could not remove {}: {}", name, reason));
  }
  output
}

pub fn format_intercepted(outcome: &Intercepted) -> String {
  match outcome {
    Intercepted::Passthrough => "Not intercepted; request goes straight to the network.".to_string(),
    Intercepted::Served(served) => {
      let origin = match served.source {
        CacheSource::Network => "network".to_string(),
        CacheSource::Cache | CacheSource::Offline => match served.cached_at {
          Some(at) => format!("{} (cached {})", served.source, at.format(DATETIME)),
          None => served.source.to_string(),
        },
      };
      format!(
        "{} {} from {}, {} bytes",
        served.data.status,
        served.data.url,
        origin,
        served.data.body.len()
      )
    }
    Intercepted::Fallback(page) => format!("Offline page served for {}", page.url),
    Intercepted::Failed(err) if err.is_connectivity() => {
      format!("Offline and not cached: {}", err)
    }
    Intercepted::Failed(err) => format!("Request failed: {}", err),
  }
}

pub fn format_sync(report: &SyncReport) -> String {
  if report.ignored {
    return format!("Sync tag '{}' is not handled.", report.tag);
  }
  let mut output = format!(
    "Synced {}: {} sent, {} dropped, {} still pending.",
    report.tag,
    report.replayed.len(),
    report.dropped.len(),
    report.pending.len()
  );
  for (id, reason) in &report.dropped {
    output.push_str(&format!("\n  ! #{} dropped: {}", id, reason));
  }
  output
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{local_datetime, EntryType};

  fn entry(order: &str) -> TimeEntry {
    TimeEntry {
      id: 3,
      employee_name: "Ana Ruiz".to_string(),
      entry_type: EntryType::Service,
      order_number: order.to_string(),
      start_date_time: local_datetime::parse("2024-03-01T08:00").unwrap(),
      end_date_time: local_datetime::parse("2024-03-01T12:30").unwrap(),
      elapsed_time: "04h:30m:00s".to_string(),
      notes: String::new(),
    }
  }

  #[test]
  fn test_entry_row() {
    let row = format_entry_row(&entry("SO-1042"));
    assert!(row.contains("Ana Ruiz"));
    assert!(row.contains("SO-1042"));
    assert!(row.contains("2024-03-01 08:00"));
    assert!(row.ends_with("04h:30m:00s"));

    assert!(format_entry_row(&entry("")).contains(" - "));
  }

  #[test]
  fn test_empty_lists() {
    assert_eq!(format_entries(&[]), "No entries found.");
    assert_eq!(format_pending(&[]), "Nothing waiting to sync.");
  }

  #[test]
  fn test_sync_summary() {
    let report = SyncReport {
      tag: "time-entry-sync".to_string(),
      replayed: vec![1, 2],
      dropped: vec![(3, "Invalid entry type".to_string())],
      ..Default::default()
    };
    let text = format_sync(&report);
    assert!(text.starts_with("Synced time-entry-sync: 2 sent, 1 dropped, 0 still pending."));
    assert!(text.contains("#3 dropped: Invalid entry type"));
  }
}
