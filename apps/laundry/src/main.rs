use std::{fs, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use reminders::TimerReminderService;
use shared::{
    domain::{Category, CategoryId, RecordId},
    error::{ErrorCode, ErrorReport, LaundryError},
};
use storage::Storage;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracker_core::{CategoryPatch, LaundryTracker, PickupSchedule, RecordDraft};

mod config;
mod render;

use config::{load_settings, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "laundry", version, about = "Track laundry handed out and when it comes back")]
struct Cli {
    /// Settings file; defaults to ./laundry.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Categories(CategoryCommand),
    /// Record a new batch handed to the laundry.
    New {
        /// `<categoryId>=<count>`, repeatable.
        #[arg(long = "item", value_parser = parse_item_count, required = true)]
        items: Vec<(CategoryId, u32)>,
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        pickup: PickupArgs,
        #[arg(long)]
        alarm: bool,
        /// Skip the pickup reminder even if a default delay is configured.
        #[arg(long, conflicts_with_all = ["after_minutes", "at"])]
        no_reminder: bool,
    },
    List {
        #[arg(long, conflicts_with = "returned")]
        pending: bool,
        #[arg(long)]
        returned: bool,
    },
    Show {
        id: String,
    },
    Return {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Replace the pickup reminder of a pending record.
    Remind {
        id: String,
        #[command(flatten)]
        pickup: PickupArgs,
        #[arg(long)]
        alarm: bool,
    },
    Export {
        file: PathBuf,
    },
    Import {
        file: PathBuf,
    },
    /// Delete every record and restore the default categories.
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Stay running and deliver pickup reminders as they come due.
    Watch,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "🧺")]
        icon: String,
    },
    Rename {
        id: String,
        name: String,
        #[arg(long)]
        icon: Option<String>,
    },
    Delete {
        id: String,
    },
    /// Move the given ids to the front, in that order.
    Reorder {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Reset,
}

#[derive(Args, Debug)]
struct PickupArgs {
    #[arg(long, conflicts_with = "at")]
    after_minutes: Option<u32>,
    /// RFC 3339 timestamp, e.g. 2024-05-06T18:30:00+02:00.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

impl PickupArgs {
    fn schedule(&self) -> Option<PickupSchedule> {
        match (self.after_minutes, self.at) {
            (Some(minutes), _) => Some(PickupSchedule::AfterMinutes(minutes)),
            (None, Some(at)) => Some(PickupSchedule::At(at)),
            (None, None) => None,
        }
    }
}

fn parse_item_count(raw: &str) -> Result<(CategoryId, u32), String> {
    let (id, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <categoryId>=<count>, got '{raw}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing category id in '{raw}'"));
    }
    let count = count
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid count in '{raw}': {err}"))?;
    Ok((CategoryId::from(id), count))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, settings).await {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<LaundryError>() {
                Some(laundry_err) => print_report(&ErrorReport::from(laundry_err)),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<ExitCode> {
    let database_url = normalize_database_url(
        cli.database_url
            .as_deref()
            .unwrap_or(settings.database_url.as_str()),
    );
    let storage = Storage::new(&database_url).await.map_err(|err| {
        error!(
            %database_url,
            %err,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        err
    })?;
    storage
        .health_check()
        .await
        .with_context(|| format!("database '{database_url}' is not usable"))?;
    let reminders = TimerReminderService::new();
    let mut tracker = LaundryTracker::open(
        Arc::new(storage),
        Arc::new(reminders.clone()),
        env!("CARGO_PKG_VERSION"),
    )
    .await?;

    // Timers die with this process unless it is watching.
    let one_shot = !matches!(cli.command, Command::Watch);

    match cli.command {
        Command::Categories(command) => return run_category_command(&mut tracker, command).await,
        Command::New {
            items,
            notes,
            pickup,
            alarm,
            no_reminder,
        } => {
            let schedule = match pickup.schedule() {
                Some(schedule) => Some(schedule),
                None if no_reminder || settings.default_pickup_minutes == 0 => None,
                None => Some(PickupSchedule::AfterMinutes(settings.default_pickup_minutes)),
            };
            let mut draft = RecordDraft::default();
            for (category_id, count) in items {
                if tracker.categories().get(&category_id).is_none() {
                    warn!("laundry: ignoring unknown category id={category_id}");
                }
                draft = draft.with_count(category_id, count);
            }
            if let Some(notes) = notes {
                draft = draft.with_notes(notes);
            }
            if let Some(schedule) = schedule {
                draft = draft.with_pickup(schedule, alarm);
            }

            let record = tracker.create_record(draft).await?;
            println!("{}", render::record_detail(&record));
            if schedule.is_some() && record.notification_id.is_none() {
                println!("note: no reminder was scheduled for this entry");
            } else if record.notification_id.is_some() {
                println!("note: the pickup reminder fires while `laundry watch` is running");
            }
        }
        Command::List { pending, returned } => {
            let records = if pending {
                tracker.pending()
            } else if returned {
                tracker.returned()
            } else {
                tracker.records().list().iter().collect()
            };
            if records.is_empty() {
                println!("no records");
            }
            for record in records {
                println!("{}", render::record_line(record));
            }
        }
        Command::Show { id } => {
            let id = RecordId::from(id);
            match tracker.record(&id) {
                Some(record) => println!("{}", render::record_detail(record)),
                None => return not_found(&id),
            }
        }
        Command::Return { id } => {
            let id = RecordId::from(id);
            if tracker.record(&id).is_none() {
                return not_found(&id);
            }
            tracker.mark_returned(&id).await?;
            if let Some(record) = tracker.record(&id) {
                println!("{}", render::record_line(record));
            }
        }
        Command::Delete { id } => {
            let id = RecordId::from(id);
            tracker.delete_record(&id).await?;
            println!("deleted {id}");
        }
        Command::Remind { id, pickup, alarm } => {
            let Some(schedule) = pickup.schedule() else {
                bail!("pass --after-minutes or --at");
            };
            let id = RecordId::from(id);
            if tracker.record(&id).is_none() {
                return not_found(&id);
            }
            match tracker.reschedule_reminder(&id, schedule, alarm).await? {
                Some(_) => println!(
                    "reminder set for {id}; it fires while `laundry watch` is running"
                ),
                None => println!("no reminder scheduled for {id}"),
            }
        }
        Command::Export { file } => {
            let json = tracker.export_json()?;
            fs::write(&file, json)
                .with_context(|| format!("failed to write backup '{}'", file.display()))?;
            println!(
                "exported {} categories and {} records to {}",
                tracker.categories().len(),
                tracker.records().len(),
                file.display()
            );
        }
        Command::Import { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read backup '{}'", file.display()))?;
            let summary = tracker.import_snapshot(&raw).await?;
            println!(
                "imported {} categories and {} records",
                summary.categories, summary.records
            );
            if summary.stale_reminders > 0 {
                println!(
                    "note: {} imported reminders are re-armed by `laundry watch`",
                    summary.stale_reminders
                );
            }
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to clear all data without --yes");
            }
            tracker.clear_all_data().await?;
            println!("all records deleted; categories reset to defaults");
        }
        Command::Watch => watch(&mut tracker, &reminders).await?,
    }

    if one_shot {
        tracker.release_reminders().await?;
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_category_command(
    tracker: &mut LaundryTracker,
    command: CategoryCommand,
) -> Result<ExitCode> {
    match command {
        CategoryCommand::List => {}
        CategoryCommand::Add { name, icon } => {
            let category = tracker.add_category(&name, &icon).await?;
            println!("added {}", render::category_line(&category));
            return Ok(ExitCode::SUCCESS);
        }
        CategoryCommand::Rename { id, name, icon } => {
            let id = CategoryId::from(id);
            if tracker.categories().get(&id).is_none() {
                return not_found(&id);
            }
            tracker
                .update_category(
                    &id,
                    CategoryPatch {
                        name: Some(name),
                        icon,
                        order: None,
                    },
                )
                .await?;
        }
        CategoryCommand::Delete { id } => {
            tracker.delete_category(&CategoryId::from(id)).await?;
        }
        CategoryCommand::Reorder { ids } => {
            let Some(ordered) = front_loaded_order(tracker.categories().list(), &ids) else {
                return not_found("category in reorder list");
            };
            tracker.reorder_categories(ordered).await?;
        }
        CategoryCommand::Reset => tracker.reset_categories().await?,
    }

    for category in tracker.categories().list() {
        println!("{}", render::category_line(category));
    }
    Ok(ExitCode::SUCCESS)
}

/// The named categories first, in the given order, then everything else in
/// its current order. `None` when a name matches no category.
fn front_loaded_order(current: &[Category], ids: &[String]) -> Option<Vec<Category>> {
    let mut ordered = Vec::with_capacity(current.len());
    for id in ids {
        ordered.push(current.iter().find(|c| c.id.as_str() == id)?.clone());
    }
    ordered.extend(
        current
            .iter()
            .filter(|c| !ids.iter().any(|id| id == c.id.as_str()))
            .cloned(),
    );
    Some(ordered)
}

async fn watch(tracker: &mut LaundryTracker, reminders: &TimerReminderService) -> Result<()> {
    let mut fired = reminders.subscribe();
    let armed = tracker.rearm_reminders().await?;
    info!("laundry: watching for pickups armed={armed}");
    println!("watching {armed} pending pickup(s); press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = fired.recv() => match event {
                Ok(event) => {
                    let record = tracker
                        .handle_reminder_fired(&event.content.record_key, &event.handle)
                        .await?;
                    let Some(record) = record else {
                        debug!("laundry: ignoring reminder for deleted record={}", event.content.record_key);
                        continue;
                    };
                    if event.content.sound {
                        print!("\x07");
                    }
                    println!("{}  {}", event.content.title, event.content.body);
                    println!("{}", render::record_detail(&record));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("laundry: reminder listener lagged skipped={skipped}");
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("laundry: watch stopped");
                break;
            }
        }
    }
    Ok(())
}

fn not_found(what: impl std::fmt::Display) -> Result<ExitCode> {
    print_report(&ErrorReport::new(
        ErrorCode::NotFound,
        format!("no such entry: {what}"),
    ));
    Ok(ExitCode::FAILURE)
}

fn print_report(report: &ErrorReport) {
    match serde_json::to_string(report) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("error: {}", report.message),
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
