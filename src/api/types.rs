//! Wire types for the time tracking backend.

use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::error::ApiError;

/// Kind of time being booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
  Service,
  Vacation,
  Personal,
  Shop,
  Nonbillable,
  Drive,
}

impl EntryType {
  /// Service time is billed against an order and needs its number.
  pub fn requires_order(&self) -> bool {
    matches!(self, Self::Service)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Service => "service",
      Self::Vacation => "vacation",
      Self::Personal => "personal",
      Self::Shop => "shop",
      Self::Nonbillable => "nonbillable",
      Self::Drive => "drive",
    }
  }
}

impl fmt::Display for EntryType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Local (zone-less) datetimes as exchanged with the backend:
/// `YYYY-MM-DDTHH:MM[:SS[.fff]]`.
pub mod local_datetime {
  use chrono::NaiveDateTime;
  use serde::{Deserialize, Deserializer, Serializer};

  const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
  const READ_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

  pub fn parse(s: &str) -> Option<NaiveDateTime> {
    READ_FORMATS
      .iter()
      .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
  }

  pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.format(WRITE_FORMAT).to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid datetime '{}'", s)))
  }
}

/// The backend stores missing text columns as NULL.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A stored time entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
  pub id: i64,
  pub employee_name: String,
  pub entry_type: EntryType,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub order_number: String,
  #[serde(with = "local_datetime")]
  pub start_date_time: NaiveDateTime,
  #[serde(with = "local_datetime")]
  pub end_date_time: NaiveDateTime,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub elapsed_time: String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub notes: String,
}

/// Body of a create or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInput {
  pub employee_name: String,
  pub entry_type: EntryType,
  pub order_number: String,
  #[serde(with = "local_datetime")]
  pub start_date_time: NaiveDateTime,
  #[serde(with = "local_datetime")]
  pub end_date_time: NaiveDateTime,
  pub notes: String,
}

impl EntryInput {
  /// Check the entry the way the form does before it is sent.
  ///
  /// Names and order numbers are trimmed, and the order number is cleared
  /// for types that do not take one.
  pub fn validated(mut self) -> Result<Self, ApiError> {
    self.employee_name = self.employee_name.trim().to_string();
    self.order_number = self.order_number.trim().to_string();

    if self.employee_name.is_empty() {
      return Err(ApiError::Invalid("Employee name is required".into()));
    }
    if self.entry_type.requires_order() {
      if self.order_number.is_empty() {
        return Err(ApiError::Invalid(
          "Order number is required for service entries".into(),
        ));
      }
    } else {
      self.order_number.clear();
    }
    if self.end_date_time <= self.start_date_time {
      return Err(ApiError::Invalid("End time must be after start time".into()));
    }

    Ok(self)
  }

  pub fn elapsed(&self) -> String {
    format_elapsed(self.start_date_time, self.end_date_time)
  }
}

/// Elapsed time as `HHh:MMm:SSs`. Hours are not wrapped at 24.
pub fn format_elapsed(start: NaiveDateTime, end: NaiveDateTime) -> String {
  let total = (end - start).num_seconds().max(0);
  format!(
    "{:02}h:{:02}m:{:02}s",
    total / 3600,
    (total % 3600) / 60,
    total % 60
  )
}

/// Reply to a create.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedEntry {
  pub id: i64,
  #[serde(default)]
  pub message: String,
}

/// Filters accepted by `GET /entries`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntryQuery {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub employee: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_date: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
  pub total_hours_this_week: f64,
  pub total_entries: u64,
  pub active_orders: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
  Summary,
  Detailed,
  Employee,
  Order,
}

impl ReportType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Summary => "summary",
      Self::Detailed => "detailed",
      Self::Employee => "employee",
      Self::Order => "order",
    }
  }

  /// Default download name, e.g. `summary_report_2024-03-01.pdf`.
  pub fn file_name(&self, date: NaiveDate) -> String {
    format!("{}_report_{}.pdf", self.as_str(), date.format("%Y-%m-%d"))
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
  pub report_type: ReportType,
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
  /// Empty for all employees
  pub employee: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrRequest {
  /// Image as a `data:` URL
  pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrResponse {
  #[serde(default)]
  pub entries: Vec<OcrEntry>,
}

/// A time entry recognized on an uploaded timesheet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrEntry {
  pub employee_name: String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub order_number: String,
  #[serde(with = "local_datetime")]
  pub start_date_time: NaiveDateTime,
  #[serde(with = "local_datetime")]
  pub end_date_time: NaiveDateTime,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub elapsed_time: String,
}

impl OcrEntry {
  /// Recognized rows are always booked as service time.
  pub fn into_input(self) -> EntryInput {
    EntryInput {
      employee_name: self.employee_name,
      entry_type: EntryType::Service,
      order_number: self.order_number,
      start_date_time: self.start_date_time,
      end_date_time: self.end_date_time,
      notes: "Imported from image".to_string(),
    }
  }
}

/// Error body returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
  pub error: String,
}
