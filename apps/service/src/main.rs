use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use pulse::alerts::{NotificationPreferences, senders};
use pulse::config::Config;
use pulse::database::{self, Monitor, MonitorPatch, NewMonitor};
use pulse::history::Window;
use pulse::monitoring::{MonitoringExecutor, ProbeMethod};
use pulse::orchestrator::Orchestrator;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pulse uptime monitoring engine", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitoring daemon until interrupted
    Run,
    /// Register a new monitor
    Add {
        /// Owner of the monitor
        #[arg(long, default_value = "local")]
        owner: String,
        url: String,
        #[command(flatten)]
        settings: MonitorArgs,
    },
    /// List monitors
    List {
        /// Only monitors of this owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show one monitor as JSON
    Show { id: Uuid },
    /// Change a monitor's configuration
    Edit {
        id: Uuid,
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        settings: MonitorArgs,
    },
    Pause { id: Uuid },
    Resume { id: Uuid },
    /// Delete a monitor and its history
    Delete { id: Uuid },
    /// Show statistics over a window (1h, 24h, 7d, 30d)
    History {
        id: Uuid,
        #[arg(long, default_value = "24h")]
        window: Window,
        /// Also print every check result
        #[arg(long)]
        points: bool,
    },
    /// Show recent status changes
    Transitions {
        id: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Send a test alert through every sink the owner enabled
    TestAlert { id: Uuid },
    /// Show or change the alert channels an owner receives
    Preferences {
        #[arg(long, default_value = "local")]
        owner: String,
        #[arg(long)]
        email: Option<bool>,
        #[arg(long)]
        sms: Option<bool>,
        #[arg(long)]
        telegram: Option<bool>,
        #[arg(long)]
        webhook: Option<bool>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    #[arg(long)]
    name: Option<String>,
    /// Free-form note, an empty string clears it
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    method: Option<ProbeMethod>,
    /// Seconds between checks
    #[arg(long)]
    interval: Option<u64>,
    /// Seconds before a probe attempt times out
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    retries: Option<u32>,
    #[arg(long)]
    expected_status: Option<u16>,
    /// Consecutive failures before the monitor is marked down
    #[arg(long)]
    failure_threshold: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init_with_level(match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    });

    let config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;

    if let Command::Config = cli.command {
        println!("{config}");
        return Ok(());
    }

    let database = database::open(&config.database).await.context("Failed to open database")?;
    let sinks = senders::from_config(&config.alerts)?;

    if let Command::Run = cli.command {
        let executor = Arc::new(MonitoringExecutor::http(&config)?);
        let orchestrator = Orchestrator::start(config, database, executor, sinks).await?;

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");
        orchestrator.shutdown();
        return Ok(());
    }

    let orchestrator = Orchestrator::offline(config, database, sinks);
    let outcome = manage(&orchestrator, cli.command).await;
    orchestrator.shutdown();
    outcome
}

async fn manage(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    match command {
        Command::Add { owner, url, settings } => {
            let monitor = orchestrator
                .create_monitor(NewMonitor {
                    name: settings.name,
                    description: settings.description,
                    method: settings.method,
                    interval_seconds: settings.interval,
                    timeout_seconds: settings.timeout,
                    max_retries: settings.retries,
                    expected_status_code: settings.expected_status,
                    failure_threshold: settings.failure_threshold,
                    ..NewMonitor::new(owner, url)
                })
                .await?;
            println!("Created monitor {}", monitor.id);
        }
        Command::List { owner } => {
            let monitors = match owner {
                Some(owner) => orchestrator.get_monitors(&owner).await?,
                None => orchestrator.list_monitors().await?,
            };
            for monitor in &monitors {
                print_monitor_line(monitor);
            }
        }
        Command::Show { id } => {
            let monitor = orchestrator.get_monitor(id).await?;
            println!("{}", serde_json::to_string_pretty(&monitor)?);
        }
        Command::Edit { id, url, settings } => {
            let patch = MonitorPatch {
                name: settings.name,
                description: settings.description,
                url,
                method: settings.method,
                interval_seconds: settings.interval,
                timeout_seconds: settings.timeout,
                max_retries: settings.retries,
                expected_status_code: settings.expected_status,
                failure_threshold: settings.failure_threshold,
            };
            print_monitor_line(&orchestrator.edit_monitor(id, patch).await?);
        }
        Command::Pause { id } => print_monitor_line(&orchestrator.pause_monitor(id).await?),
        Command::Resume { id } => print_monitor_line(&orchestrator.resume_monitor(id).await?),
        Command::Delete { id } => {
            orchestrator.delete_monitor(id).await?;
            println!("Deleted monitor {id}");
        }
        Command::History { id, window, points } => {
            let history = orchestrator.get_history(id, window).await?;
            if points {
                for point in &history.points {
                    let error = point.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                    println!(
                        "{}  {:<4}  {:>6}  {}",
                        point.timestamp.to_rfc3339(),
                        point.outcome.to_string(),
                        point.response_time_ms.map(|ms| format!("{ms}ms")).unwrap_or_default(),
                        error
                    );
                }
            }
            println!("{}", serde_json::to_string_pretty(&history.statistics)?);
        }
        Command::Transitions { id, limit } => {
            for transition in orchestrator.get_transitions(id, limit).await? {
                println!("{}  {} -> {}", transition.at.to_rfc3339(), transition.from, transition.to);
            }
        }
        Command::TestAlert { id } => {
            if orchestrator.send_test_alert(id).await? {
                println!("Test alert delivered");
            } else {
                anyhow::bail!("Test alert could not be delivered to any sink");
            }
        }
        Command::Preferences { owner, email, sms, telegram, webhook } => {
            let mut preferences = orchestrator.get_notification_preferences(&owner).await?;
            if email.is_some() || sms.is_some() || telegram.is_some() || webhook.is_some() {
                preferences = NotificationPreferences {
                    email: email.unwrap_or(preferences.email),
                    sms: sms.unwrap_or(preferences.sms),
                    telegram: telegram.unwrap_or(preferences.telegram),
                    webhook: webhook.unwrap_or(preferences.webhook),
                };
                preferences = orchestrator.set_notification_preferences(&owner, preferences).await?;
            }
            println!("{}", serde_json::to_string_pretty(&preferences)?);
        }
        Command::Run | Command::Config => {}
    }

    Ok(())
}

fn print_monitor_line(monitor: &Monitor) {
    println!(
        "{}  {:<7}  {:<6}  every {}s  {}  ({})",
        monitor.id,
        monitor.status.to_string(),
        if monitor.is_paused { "paused" } else { "active" },
        monitor.interval_seconds,
        monitor.name,
        monitor.url
    );
}
