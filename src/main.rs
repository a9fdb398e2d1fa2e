use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use inbox_call_reminder::config::{AppConfig, ConfigHandle};
use inbox_call_reminder::extractor::EventTimeExtractor;
use inbox_call_reminder::logging::init_logging;
use inbox_call_reminder::mailbox::GmailMailbox;
use inbox_call_reminder::models::{format_timestamp, ProgressEvent, ProgressLevel};
use inbox_call_reminder::notifier::{DryRunSink, NotificationSink, TwilioCallSink};
use inbox_call_reminder::pipeline::ScanPipeline;
use inbox_call_reminder::registry::ReminderRegistry;
use inbox_call_reminder::scheduler::{ReminderScheduler, TokioExecutor};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the mailbox once and schedule reminder calls
    Scan {
        /// Log calls instead of placing them
        #[arg(long)]
        dry_run: bool,

        /// Stay running until every scheduled reminder has fired
        #[arg(long)]
        wait: bool,
    },
    /// Scan the mailbox periodically until interrupted
    Watch {
        /// Seconds between scans
        #[arg(short, long, default_value = "300")]
        interval_secs: u64,

        /// Log calls instead of placing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the event times found in TEXT (or stdin)
    Extract {
        /// Text to scan; read from stdin when omitted
        text: Option<String>,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging; the guard must outlive every log call
    let _guard = init_logging(
        Some(&config.get_log_level()),
        config.logging.file_path.as_deref().map(Path::new),
        config.logging.format == "json",
    )?;

    info!("Starting inbox-call-reminder");

    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { dry_run, wait } => scan_once(config, dry_run, wait).await?,
        Commands::Watch { interval_secs, dry_run } => watch(config, interval_secs, dry_run).await?,
        Commands::Extract { text } => extract(&config, text)?,
        Commands::Config => {
            let yaml = serde_yaml::to_string(&config.masked()).context("Failed to render configuration")?;
            println!("{yaml}");
        }
    }

    Ok(())
}

/// Wire the pipeline and its collaborators around one configuration handle
fn build_pipeline(handle: &ConfigHandle, dry_run: bool) -> Result<ScanPipeline> {
    let sink: Arc<dyn NotificationSink> = if dry_run {
        Arc::new(DryRunSink)
    } else {
        Arc::new(TwilioCallSink::new(handle.clone())?)
    };
    let registry = Arc::new(ReminderRegistry::new(handle.snapshot().reminders.max_finished_records));
    let executor = Arc::new(TokioExecutor::current()?);
    let scheduler = Arc::new(ReminderScheduler::new(registry, executor, sink, handle.clone()));
    let mailbox = Arc::new(GmailMailbox::new(handle.clone())?);

    Ok(ScanPipeline::new(handle.clone(), mailbox, scheduler)?)
}

/// Print progress events as they arrive; ends when the sender is dropped
fn spawn_progress_printer() -> (mpsc::UnboundedSender<ProgressEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let level = match event.level {
                ProgressLevel::Info => "INFO",
                ProgressLevel::Success => "OK",
                ProgressLevel::Warn => "WARN",
                ProgressLevel::Error => "ERROR",
            };
            println!("[{}] {level:<5} {}", event.timestamp, event.message);
        }
    });
    (tx, printer)
}

async fn run_cycle(pipeline: &ScanPipeline) -> Result<()> {
    let (tx, printer) = spawn_progress_printer();
    let result = pipeline.run(Some(tx)).await;
    printer.await.context("Progress printer panicked")?;

    let summary = result?;
    info!(
        found = summary.messages_found,
        matched = summary.keyword_matches,
        detected = summary.events_detected,
        scheduled = summary.events_scheduled,
        "Scan cycle complete"
    );
    Ok(())
}

fn print_reminders(pipeline: &ScanPipeline) {
    let reminders = pipeline.list_reminders();
    if reminders.is_empty() {
        println!("No reminders scheduled.");
        return;
    }

    println!("{:<30} {:<26} {:<22} {:<26} {}", "Subject", "Event time", "Offset", "Fires at", "Status");
    for record in reminders {
        println!(
            "{:<30} {:<26} {:<22} {:<26} {}",
            record.subject, record.event_time, record.offset_label, record.fires_at, record.status
        );
    }
}

async fn scan_once(config: AppConfig, dry_run: bool, wait: bool) -> Result<()> {
    let handle = ConfigHandle::new(config);
    let pipeline = build_pipeline(&handle, dry_run)?;

    run_cycle(&pipeline).await?;
    print_reminders(&pipeline);

    if !wait {
        return Ok(());
    }

    let registry = pipeline.list_reminders();
    if registry.is_empty() {
        return Ok(());
    }

    info!("Waiting for scheduled reminders to fire");
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pending = pipeline
                    .list_reminders()
                    .iter()
                    .filter(|r| !r.status.is_finished())
                    .count();
                if pending == 0 {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; pending reminders will not fire");
                break;
            }
        }
    }

    print_reminders(&pipeline);
    Ok(())
}

async fn watch(config: AppConfig, interval_secs: u64, dry_run: bool) -> Result<()> {
    let handle = ConfigHandle::new(config);
    let pipeline = build_pipeline(&handle, dry_run)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    info!(interval_secs, "Watching mailbox");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match AppConfig::load() {
                    Ok(fresh) => {
                        if let Err(e) = handle.replace(fresh) {
                            warn!(error = %e, "Keeping previous configuration");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to reload configuration"),
                }

                if let Err(e) = run_cycle(&pipeline).await {
                    error!(error = %e, "Scan cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    print_reminders(&pipeline);
    Ok(())
}

fn extract(config: &AppConfig, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read text from stdin")?;
            buffer
        }
    };

    let extractor = EventTimeExtractor::from_config(&config.extraction)?;
    let times = extractor.extract(&text, extractor.now())?;
    if times.is_empty() {
        println!("No future event times found.");
    }
    for time in times {
        println!("{}", format_timestamp(&time));
    }
    Ok(())
}
