mod api;
mod cache;
mod config;
mod logging;
mod net;
mod shell;
#[cfg(test)]
mod testing;
mod worker;

use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use api::{ApiClient, EntryInput, EntryQuery, EntryType, ReportRequest, ReportType};
use cache::SqliteStorage;
use config::Config;
use net::HttpNetwork;
use shell::{output, Shell, WriteOutcome};
use worker::{EventOutcome, ServiceWorker};

#[derive(Parser, Debug)]
#[command(name = "timecache")]
#[command(about = "Offline-first time tracking client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/timecache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log at debug level (overridden by RUST_LOG)
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List, add, update and delete time entries
  Entries {
    #[command(subcommand)]
    action: EntriesAction,
  },
  /// Extract time entries from a timesheet image
  Ocr {
    image: PathBuf,
    /// Save the extracted entries as service time
    #[arg(long)]
    save: bool,
  },
  /// Dashboard statistics
  Stats,
  /// Generate a PDF report
  Report {
    #[arg(long = "type", value_enum, default_value = "summary")]
    report_type: ReportType,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,
    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,
    /// Only entries of this employee
    #[arg(long, default_value = "")]
    employee: String,
    /// Output file (default: {type}_report_{today}.pdf)
    #[arg(long)]
    out: Option<PathBuf>,
  },
  /// Drive the offline worker
  Worker {
    #[command(subcommand)]
    action: WorkerAction,
  },
}

#[derive(Subcommand, Debug)]
enum EntriesAction {
  List {
    /// Employee name (substring match)
    #[arg(long)]
    employee: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Only rows containing this text (case-insensitive)
    #[arg(long)]
    search: Option<String>,
  },
  Add(EntryArgs),
  Update {
    id: i64,
    #[command(flatten)]
    entry: EntryArgs,
  },
  Delete {
    id: i64,
  },
}

#[derive(ClapArgs, Debug)]
struct EntryArgs {
  #[arg(long)]
  employee: String,
  #[arg(long = "type", value_enum, default_value = "service")]
  entry_type: EntryType,
  /// Order number, required for service entries
  #[arg(long, default_value = "")]
  order: String,
  /// Start (YYYY-MM-DDTHH:MM)
  #[arg(long, value_parser = parse_datetime)]
  start: NaiveDateTime,
  /// End (YYYY-MM-DDTHH:MM)
  #[arg(long, value_parser = parse_datetime)]
  end: NaiveDateTime,
  #[arg(long, default_value = "")]
  notes: String,
}

impl From<EntryArgs> for EntryInput {
  fn from(args: EntryArgs) -> Self {
    EntryInput {
      employee_name: args.employee,
      entry_type: args.entry_type,
      order_number: args.order,
      start_date_time: args.start,
      end_date_time: args.end,
      notes: args.notes,
    }
  }
}

#[derive(Subcommand, Debug)]
enum WorkerAction {
  /// Cache the asset manifest under the configured version
  Install,
  /// Make the installed version current and delete older caches
  Activate,
  /// Send a GET through the interceptor
  Fetch {
    url: Url,
    /// Treat as a page navigation (offline page on failure)
    #[arg(long)]
    navigate: bool,
  },
  /// List cache versions present
  Versions,
  /// Replay queued writes now
  Sync,
  /// Show writes waiting to sync
  Pending,
}

fn parse_datetime(s: &str) -> std::result::Result<NaiveDateTime, String> {
  api::local_datetime::parse(s).ok_or_else(|| format!("expected YYYY-MM-DDTHH:MM, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&Config::data_dir(), args.verbose)?;

  let storage = Arc::new(SqliteStorage::open(&config.cache_path())?);
  let api = ApiClient::new(config.api.url.clone(), config.api_timeout())?;
  let network = Arc::new(HttpNetwork::new(config.api_timeout())?);
  let worker = ServiceWorker::new(
    config.worker_config()?,
    storage,
    network,
    Arc::new(api.clone()),
    config.retry_policy(),
  )?;

  let shell = Shell::new(api, worker);
  run(&shell, args.command).await
}

async fn run(shell: &Shell<SqliteStorage>, command: Command) -> Result<()> {
  match command {
    Command::Entries { action } => match action {
      EntriesAction::List {
        employee,
        start,
        end,
        search,
      } => {
        let query = EntryQuery {
          employee,
          start_date: start,
          end_date: end,
        };
        let entries = shell.list_entries(&query, search.as_deref()).await?;
        println!("{}", output::format_entries(&entries));
      }
      EntriesAction::Add(entry) => {
        let input = EntryInput::from(entry);
        let elapsed = input.elapsed();
        match shell.add_entry(input).await? {
          WriteOutcome::Sent(created) => {
            println!("Time entry {} saved ({}).", created.id, elapsed)
          }
          WriteOutcome::Queued(id) => print_queued(id),
        }
      }
      EntriesAction::Update { id, entry } => match shell.update_entry(id, entry.into()).await? {
        WriteOutcome::Sent(()) => println!("Time entry {} updated.", id),
        WriteOutcome::Queued(queued) => print_queued(queued),
      },
      EntriesAction::Delete { id } => match shell.delete_entry(id).await? {
        WriteOutcome::Sent(()) => println!("Time entry {} deleted.", id),
        WriteOutcome::Queued(queued) => print_queued(queued),
      },
    },
    Command::Ocr { image, save } => {
      let entries = shell.extract_entries(&image).await?;
      println!("{}", output::format_ocr_preview(&entries));

      if save && !entries.is_empty() {
        let outcomes = shell.import_entries(entries).await?;
        let queued = outcomes
          .iter()
          .filter(|o| matches!(o, WriteOutcome::Queued(_)))
          .count();
        println!(
          "{} entries saved, {} queued for sync.",
          outcomes.len() - queued,
          queued
        );
      }
    }
    Command::Stats => {
      let stats = shell.stats().await?;
      println!("{}", output::format_stats(&stats));
    }
    Command::Report {
      report_type,
      start,
      end,
      employee,
      out,
    } => {
      let request = ReportRequest {
        report_type,
        start_date: start,
        end_date: end,
        employee,
      };
      let path = shell
        .report(&request, out, Local::now().date_naive())
        .await?;
      println!("Report written to {}", path.display());
    }
    Command::Worker { action } => match action {
      WorkerAction::Install => print_outcome(shell.install().await?),
      WorkerAction::Activate => print_outcome(shell.activate().await?),
      WorkerAction::Fetch { url, navigate } => print_outcome(shell.fetch(url, navigate).await?),
      WorkerAction::Sync => print_outcome(shell.sync().await?),
      WorkerAction::Versions => {
        let versions = shell.versions()?;
        if versions.is_empty() {
          println!("No cache versions.");
        }
        for (name, current) in versions {
          if current {
            println!("* {} ({})", name, shell.worker_state());
          } else {
            println!("  {}", name);
          }
        }
      }
      WorkerAction::Pending => {
        let pending = shell.pending()?;
        println!("{}", output::format_pending(&pending));
      }
    },
  }

  Ok(())
}

fn print_queued(id: i64) {
  println!(
    "Backend unreachable. Write queued as #{} and will sync when the connection is back.",
    id
  );
}

fn print_outcome(outcome: EventOutcome) {
  let text = match &outcome {
    EventOutcome::Installed(report) => output::format_install(report),
    EventOutcome::Activated(report) => output::format_activation(report),
    EventOutcome::Fetched(intercepted) => output::format_intercepted(intercepted),
    EventOutcome::Synced(report) => output::format_sync(report),
  };
  println!("{}", text);
}
