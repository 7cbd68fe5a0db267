//! seatwatch - watch train seat availability from the command line
//!
//! # Usage
//!
//! ```bash
//! # Track a compartment seat on train 258А and log events until Ctrl+C
//! seatwatch watch --from 2000000 --to 2060150 --date 31.12.2019 \
//!     --train 258А --time 13:45 --seat Купе
//!
//! # Drop departed trains from a stored schedule
//! seatwatch schedule schedule.json
//!
//! # Print the canonical keys for a watch
//! seatwatch keys --from 2000000 --to 2060150 --date 31.12.2019 \
//!     --train 258А --time 13:45
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use seatwatch_client::{spawn_tracker, ClientConfig, TaskOptions, TrackerEvent};
use seatwatch_core::{TaskIdentity, WatcherSpec, ANY_SEAT};
use seatwatch_protocol::{filter_departed, StoredSchedule};

/// seatwatch - train seat availability tracker
#[derive(Parser, Debug)]
#[command(name = "seatwatch", version, about)]
struct Cli {
    /// Config file (default: <config dir>/seatwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track one watcher and log tracker events until Ctrl+C
    Watch(WatchArgs),
    /// Print the schedule rows of a stored-schedule JSON file that have not departed
    Schedule {
        file: PathBuf,
    },
    /// Print the task and watcher keys for the given arguments
    Keys(WatchArgs),
}

#[derive(Args, Debug, Clone)]
struct WatchArgs {
    /// Departure station code
    #[arg(long)]
    from: String,
    /// Arrival station code
    #[arg(long)]
    to: String,
    /// Travel date, DD.MM.YYYY
    #[arg(long)]
    date: String,
    /// Train number
    #[arg(long)]
    train: String,
    /// Departure time, HH:MM
    #[arg(long)]
    time: String,
    /// Seat category
    #[arg(long, default_value = ANY_SEAT)]
    seat: String,
    #[arg(long)]
    car: Option<String>,
    #[arg(long)]
    seat_num: Option<String>,
    #[arg(long)]
    position: Option<String>,
    /// Track the single train instead of the route listing
    #[arg(long)]
    details: bool,
    /// Server error codes to tolerate
    #[arg(long = "ignore", value_name = "CODE")]
    ignore: Vec<String>,
}

impl WatchArgs {
    fn identity(&self) -> TaskIdentity {
        if self.details {
            TaskIdentity::details(&self.from, &self.to, &self.date, &self.train, &self.time)
        } else {
            TaskIdentity::list(&self.from, &self.to, &self.date)
        }
    }

    fn spec(&self) -> Result<WatcherSpec> {
        let mut spec = WatcherSpec::new(&self.train, &self.time, &self.seat);
        if let Some(car) = &self.car {
            spec = spec.with_car(car);
        }
        if let Some(seat_num) = &self.seat_num {
            spec = spec.with_seat_number(seat_num);
        }
        if let Some(position) = &self.position {
            spec = spec.with_position(position);
        }
        spec.validate().context("Invalid watcher arguments")?;
        Ok(spec)
    }

    fn options(&self) -> TaskOptions {
        TaskOptions {
            error_proof: self.ignore.clone(),
            limited: false,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Watch(args) => {
            let config = ClientConfig::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(run_watch(config, args))
        }
        Command::Schedule { file } => print_schedule(&file),
        Command::Keys(args) => {
            let spec = args.spec()?;
            println!("task:    {}", args.identity().key());
            println!("watcher: {}", spec.key());
            Ok(())
        }
    }
}

async fn run_watch(config: ClientConfig, args: WatchArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("seatwatch=info".parse()?)
                .add_directive("seatwatch_client=info".parse()?)
                .add_directive("seatwatch_protocol=info".parse()?),
        )
        .init();

    info!(url = %config.ws_url(), "Starting seatwatch");

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Error waiting for Ctrl+C");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let tracker = spawn_tracker(&config, cancel_token.clone());
    let mut events = tracker.subscribe();

    let identity = args.identity();
    let task_key = identity.key();
    let spec = args.spec()?;
    match tracker.track(identity, args.options(), spec).await {
        Ok(watcher) => info!(task_key = %task_key, watcher_key = %watcher.key(), "Watching"),
        Err(e) => warn!(task_key = %task_key, error = %e, "Watch not sent yet"),
    }

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagging"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("seatwatch stopped");
    Ok(())
}

fn log_event(event: &TrackerEvent) {
    match event {
        TrackerEvent::Found { task_key, watchers } => {
            for watcher in watchers {
                info!(
                    task_key = %task_key,
                    watcher_key = %watcher.key(),
                    seats = %watcher.found_payload().cloned().unwrap_or_default(),
                    "Seats found"
                );
            }
        }
        TrackerEvent::Lost { task_key, watchers } => {
            info!(task_key = %task_key, watchers = watchers.len(), "Seats lost");
        }
        TrackerEvent::Failure {
            task_key,
            status,
            error,
        } => warn!(
            task_key = %task_key,
            %status,
            error = %error.clone().unwrap_or_default(),
            "Task failure"
        ),
        TrackerEvent::TaskRemoved { task_key, reason } => info!(
            task_key = %task_key,
            reason = reason.as_deref().unwrap_or("-"),
            "Task removed"
        ),
        other => info!(event = ?other, "Tracker event"),
    }
}

fn print_schedule(file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let schedule: StoredSchedule = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let now = chrono::Local::now().naive_local();
    let entries = filter_departed(&schedule, now);
    println!(
        "{}",
        serde_json::to_string_pretty(&entries).context("Failed to encode schedule")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_keys_args_build_canonical_keys() {
        let cli = parse(&[
            "seatwatch", "keys", "--from", "2000000", "--to", "2060150", "--date",
            "31.12.2019", "--train", "258А", "--time", "13:45", "--seat", "Купе",
        ]);
        let Command::Keys(args) = cli.command else {
            panic!("expected keys");
        };
        assert_eq!(
            args.identity().key().as_str(),
            "list,2000000,2060150,31.12.2019"
        );
        assert_eq!(
            args.spec().unwrap().key().as_str(),
            "train_num=258А&dep_time=13:45&seat_type=Купе"
        );
    }

    #[test]
    fn test_watch_args_details_and_ignore() {
        let cli = parse(&[
            "seatwatch", "watch", "--from", "1", "--to", "2", "--date", "01.01.2020",
            "--train", "054Ч", "--time", "23:40", "--details", "--ignore", "5",
            "--ignore", "7",
        ]);
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(
            args.identity().key().as_str(),
            "details,1,2,01.01.2020,054Ч,23:40"
        );
        assert!(args.spec().unwrap().is_greedy());
        assert_eq!(args.options().error_proof, vec!["5", "7"]);
    }

    #[test]
    fn test_value_with_space_is_rejected() {
        let cli = parse(&[
            "seatwatch", "keys", "--from", "1", "--to", "2", "--date", "01.01.2020",
            "--train", "054Ч", "--time", "23:40", "--position", "upper side",
        ]);
        let Command::Keys(args) = cli.command else {
            panic!("expected keys");
        };
        assert!(args.spec().is_err());
    }
}
