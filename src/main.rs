use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::{LevelFilter, info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use dialr::config::Config;
use dialr::daemon::{CallDispatcher, CallOrigin, DispatchReport, DispatchWorker, TickConfig, run_ticker};
use dialr::domain::{ParticipantStatus, RetryPolicy};
use dialr::id::now_utc;
use dialr::pipeline::CommandPipeline;
use dialr::recovery::Reconciler;
use dialr::scheduler::{DispatchMode, resolve_timezone, schedule};
use dialr::server::{AppState, Questionnaire, VoiceFlow};
use dialr::storage::{AuditLog, DispatchJournal, ParticipantLedger, PauseSwitch};
use dialr::telephony::TwilioProvider;
use dialr::webhook::WebhookIngestor;

fn setup_logging(config: &Config, verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dialr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("dialr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Info);
    if let Some(level) = config.log_level.as_deref() {
        builder.parse_filters(level);
    }
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if verbose {
        builder.filter_module("dialr", LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Files and policy shared by every command
struct Workspace {
    ledger: Arc<ParticipantLedger>,
    pause: PauseSwitch,
    journal: DispatchJournal,
    audit: AuditLog,
    policy: RetryPolicy,
}

impl Workspace {
    fn open(config: &Config) -> Result<Self> {
        let storage = &config.storage;
        let ledger = ParticipantLedger::open(storage.ledger_path()).context("Failed to open participant ledger")?;
        Ok(Self {
            ledger: Arc::new(ledger),
            pause: PauseSwitch::open(storage.settings_path()),
            journal: DispatchJournal::open(storage.journal_path()),
            audit: AuditLog::open(storage.audit_log_path()),
            policy: config.retry.policy(),
        })
    }

    fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.ledger.clone(), self.journal.clone(), self.policy)
    }
}

fn call_origin(config: &Config) -> Result<CallOrigin> {
    let from_number = config
        .telephony
        .from_number
        .clone()
        .ok_or_else(|| eyre!("TWILIO_FROM_NUMBER is not set"))?;
    let public_base_url = config
        .telephony
        .public_base_url
        .clone()
        .ok_or_else(|| eyre!("PUBLIC_BASE_URL is not set"))?;
    Ok(CallOrigin {
        from_number,
        public_base_url,
    })
}

fn build_dispatcher(config: &Config, workspace: &Workspace, telephony: Arc<TwilioProvider>) -> Result<CallDispatcher> {
    Ok(CallDispatcher::new(
        workspace.ledger.clone(),
        workspace.journal.clone(),
        telephony,
        call_origin(config)?,
        workspace.policy,
    ))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let workspace = Workspace::open(config)?;

    match &cli.command {
        Commands::Serve => handle_serve_command(config, workspace).await,
        Commands::DialNow { normal } => handle_dial_now_command(*normal, config, workspace).await,
        Commands::Schedule { id, time } => handle_schedule_command(id, time, config, &workspace),
        Commands::Pause => handle_pause_command(true, &workspace),
        Commands::Resume => handle_pause_command(false, &workspace),
        Commands::List { status } => handle_list_command(status.as_deref(), &workspace),
        Commands::Add { id, phone } => handle_add_command(id, phone, &workspace),
        Commands::Retry { id, reset_attempts } => handle_retry_command(id, *reset_attempts, &workspace),
        Commands::Reset { log, no_backup } => handle_reset_command(*log, !*no_backup, &workspace),
        Commands::Reconcile => handle_reconcile_command(config, &workspace),
    }
}

async fn handle_serve_command(config: &Config, workspace: Workspace) -> Result<()> {
    let stats = workspace
        .reconciler()
        .recover(now_utc(), config.retry.stale_after())
        .context("Startup recovery failed")?;
    if !stats.is_clean() {
        println!(
            "{} {} replayed, {} released, {} failed",
            "Recovered:".yellow(),
            stats.replayed,
            stats.released,
            stats.failed
        );
    }

    let origin = call_origin(config)?;
    let questions = Questionnaire::load(&config.ivr.questions_file).context("Failed to load survey questions")?;
    info!(
        "Loaded {} survey questions from {}",
        questions.count(),
        config.ivr.questions_file.display()
    );
    let timezone = resolve_timezone(&config.ivr.timezone)?;
    let telephony = Arc::new(TwilioProvider::from_config(&config.telephony)?);
    let pipeline = Arc::new(CommandPipeline::from_config(&config.pipeline));

    let ingestor = WebhookIngestor::new(
        workspace.ledger.clone(),
        workspace.audit.clone(),
        telephony.clone(),
        pipeline,
        config.storage.clone(),
        config.guard.clone(),
        workspace.policy,
    );

    let tick_config = TickConfig::from_config(&config.scheduler);
    let dispatcher = build_dispatcher(config, &workspace, telephony)?;
    let (worker, dispatch) = DispatchWorker::new(dispatcher, workspace.pause.clone(), &tick_config);
    tokio::spawn(worker.run());
    tokio::spawn(run_ticker(dispatch.clone(), tick_config));

    let state = AppState {
        ledger: workspace.ledger.clone(),
        pause: workspace.pause.clone(),
        ingestor: Arc::new(ingestor),
        dispatch,
        voice: Arc::new(VoiceFlow::new(&origin.public_base_url, &config.ivr, questions)),
        timezone,
        admin_token: config.server.admin_token.clone(),
    };

    println!(
        "{} http://{} (callbacks via {})",
        "Serving:".green(),
        config.server.bind,
        origin.public_base_url
    );
    if workspace.pause.is_paused() {
        println!("{}", "Automatic dispatch is paused".yellow());
    }
    dialr::server::serve(&config.server.bind, state).await?;
    Ok(())
}

async fn handle_dial_now_command(normal: bool, config: &Config, workspace: Workspace) -> Result<()> {
    let mode = if normal { DispatchMode::Normal } else { DispatchMode::Force };
    let telephony = Arc::new(TwilioProvider::from_config(&config.telephony)?);
    let dispatcher = build_dispatcher(config, &workspace, telephony)?;

    let tick_config = TickConfig::from_config(&config.scheduler);
    let (worker, dispatch) = DispatchWorker::new(dispatcher, workspace.pause.clone(), &tick_config);
    let worker_task = tokio::spawn(worker.run());

    let report = dispatch.dispatch_now(mode).await?;
    drop(dispatch);
    if let Err(e) = worker_task.await {
        warn!("Dispatch worker ended abnormally: {}", e);
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &DispatchReport) {
    println!(
        "{} {} placed, {} failed, {} eligible ({})",
        "Dispatch:".green(),
        report.placed,
        report.failed,
        report.eligible,
        report.mode
    );
    if report.skipped_no_phone > 0 {
        println!("  {} skipped without a phone number", report.skipped_no_phone);
    }
    for id in &report.placed_ids {
        println!("  called {}", id);
    }
}

fn handle_schedule_command(id: &str, time: &str, config: &Config, workspace: &Workspace) -> Result<()> {
    let tz = resolve_timezone(&config.ivr.timezone)?;
    let scheduled = schedule(&workspace.ledger, id, time, tz)?;
    println!("{} {} at {} ({})", "Scheduled:".green(), id, scheduled.local, scheduled.utc);
    Ok(())
}

fn handle_pause_command(paused: bool, workspace: &Workspace) -> Result<()> {
    let was_paused = workspace.pause.set_paused(paused)?;
    match (paused, was_paused) {
        (true, false) => println!("{}", "Automatic dispatch paused".yellow()),
        (false, true) => println!("{}", "Automatic dispatch resumed".green()),
        (true, true) => println!("Automatic dispatch was already paused"),
        (false, false) => println!("Automatic dispatch was not paused"),
    }
    Ok(())
}

fn colored_status(status: ParticipantStatus) -> ColoredString {
    match status {
        ParticipantStatus::Pending => status.as_str().cyan(),
        ParticipantStatus::InProgress => status.as_str().yellow(),
        ParticipantStatus::Completed => status.as_str().green(),
        ParticipantStatus::Failed => status.as_str().red(),
    }
}

fn handle_list_command(status: Option<&str>, workspace: &Workspace) -> Result<()> {
    let filter = match status {
        Some(raw) => Some(ParticipantStatus::parse(raw).ok_or_else(|| eyre!("Unknown status: {}", raw))?),
        None => None,
    };
    let rows = workspace.ledger.summaries(filter)?;
    if rows.is_empty() {
        println!("No participants");
        return Ok(());
    }

    for row in rows {
        println!(
            "{:<16} {:<16} {:<12} attempts={} engaged={} scheduled={}",
            row.id,
            row.phone,
            colored_status(row.status),
            row.attempts,
            row.engaged,
            row.scheduled_time_local.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn handle_add_command(id: &str, phone: &str, workspace: &Workspace) -> Result<()> {
    let created = workspace.ledger.upsert(id, phone)?;
    if created {
        println!("{} {}", "Added:".green(), id);
    } else {
        println!("{} {}", "Updated phone for:".green(), id);
    }
    Ok(())
}

fn handle_retry_command(id: &str, reset_attempts: bool, workspace: &Workspace) -> Result<()> {
    let previous = workspace.ledger.retry(id, reset_attempts)?;
    println!("{} {} ({} -> pending)", "Retry:".green(), id, previous);
    Ok(())
}

fn handle_reset_command(include_log: bool, backup: bool, workspace: &Workspace) -> Result<()> {
    let now = now_utc();
    match workspace.ledger.reset(backup, now)? {
        Some(path) => println!("{} participants saved to {}", "Reset:".yellow(), path.display()),
        None => println!("{} participants cleared", "Reset:".yellow()),
    }
    workspace.journal.clear()?;

    if include_log {
        match workspace.audit.reset(backup, now)? {
            Some(path) => println!("{} call log saved to {}", "Reset:".yellow(), path.display()),
            None => println!("{} call log cleared", "Reset:".yellow()),
        }
    }
    Ok(())
}

fn handle_reconcile_command(config: &Config, workspace: &Workspace) -> Result<()> {
    let stats = workspace
        .reconciler()
        .recover(now_utc(), config.retry.stale_after())?;
    if stats.is_clean() {
        println!("Nothing to reconcile");
        return Ok(());
    }
    println!(
        "{} {} replayed, {} already recorded, {} dropped, {} released, {} failed",
        "Reconciled:".green(),
        stats.replayed,
        stats.already_recorded,
        stats.dropped,
        stats.released,
        stats.failed
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging before any work
    setup_logging(&config, cli.is_verbose()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
