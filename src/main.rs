//! unnest - recursive archive flattener
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! Initializes:
//! - Logging infrastructure (daily rotating file, console layer in debug mode)
//! - Configuration loading ([`ConfigManager`], `unnest.yaml` + `UNNEST__*` env overrides)
//! - State management ([`StateManager`]) with a printer subscribed to its events
//! - Tokio runtime; the whole task list runs on one worker, one decoder process at a time
//!
//! # Execution Flow
//!
//! 1. Parse arguments, load config from `<config-dir>/unnest.yaml`
//! 2. Initialize logging → `<config-dir>/logs/unnest.<date>`
//! 3. Locate the decoder (flag, config, `PATH`, common install folders)
//! 4. Run the tasks; Ctrl-C stops before the next top-level file
//! 5. Print the tally and exit non-zero when anything failed

mod cli;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use cli::{Cli, Command, ExtractArgs, PasswordAction};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use unnest::logging::{LOG_PREFIX, setup_logging};
use unnest::models::MAX_CONCURRENT_DECODERS;
use unnest::{
    APP_NAME, ArchiveTask, CommandDecoder, ConfigManager, ExtractionOrchestrator, FormatSniffer,
    RunObserver, RunSummary, StateChange, StateManager, TaskRunner, TaskStatus, UserConfig,
    VERSION,
};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut user_config = config_manager.load_user_config()?;

    let debug = cli.debug || user_config.extractor.debug_mode;
    // Held until exit so buffered log lines are flushed
    let _log_guard = setup_logging(&cli.config_dir.join("logs"), LOG_PREFIX, debug, debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    match cli.command {
        Command::Identify { ref files } => {
            identify(files);
            Ok(ExitCode::SUCCESS)
        }
        Command::Passwords { ref action } => {
            manage_passwords(&config_manager, &mut user_config, action)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Extract(ref args) => {
            let task = build_extract_task(&config_manager, &mut user_config, args)?;
            let max_depth = args.max_depth.unwrap_or(user_config.extractor.max_depth);
            run_tasks(&cli, &user_config, vec![task], max_depth)
        }
        Command::Run {
            ref tasks,
            max_depth,
        } => {
            let tasks = config_manager.load_tasks(tasks)?;
            let max_depth = max_depth.unwrap_or(user_config.extractor.max_depth);
            run_tasks(&cli, &user_config, tasks, max_depth)
        }
    }
}

fn identify(files: &[Utf8PathBuf]) {
    let sniffer = FormatSniffer::new();
    for file in files {
        let result = sniffer.identify(file);
        let verdict = if result.is_archive { "archive" } else { "not an archive" };
        let format = if result.format_name.is_empty() {
            "-"
        } else {
            result.format_name.as_str()
        };
        println!("{}: {} [{}] {}", file, verdict, format, result.reason);
    }
}

fn manage_passwords(
    config_manager: &ConfigManager,
    user_config: &mut UserConfig,
    action: &PasswordAction,
) -> Result<()> {
    let changed = match action {
        PasswordAction::List => {
            for (index, password) in user_config.passwords.iter().enumerate() {
                println!("{:>3}. {}", index + 1, password);
            }
            false
        }
        PasswordAction::Add { password } => {
            let added = user_config.passwords.add(password);
            println!("{}", if added { "Password saved" } else { "Password already saved or empty" });
            added
        }
        PasswordAction::Remove { password } => {
            let removed = user_config.passwords.remove(password);
            println!("{}", if removed { "Password removed" } else { "Password not found" });
            removed
        }
    };

    if changed {
        config_manager.save_user_config(user_config)?;
    }
    Ok(())
}

/// Turn `unnest extract` arguments into a task, applying remembered settings.
fn build_extract_task(
    config_manager: &ConfigManager,
    user_config: &mut UserConfig,
    args: &ExtractArgs,
) -> Result<ArchiveTask> {
    let settings = &user_config.extractor;
    let to_source = args.to_source || (args.output.is_none() && settings.extract_to_source);

    let mut task = if to_source {
        ArchiveTask::alongside_source(args.files.clone())
    } else {
        let output = match &args.output {
            Some(dir) => dir.clone(),
            None if !settings.output_dir.is_empty() => Utf8PathBuf::from(&settings.output_dir),
            None => anyhow::bail!("No output directory: pass -o <DIR> or --to-source"),
        };
        ArchiveTask::new(args.files.clone(), output)
    };

    match args.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            task = task.with_password(password);
            if user_config.extractor.remember_password {
                user_config.extractor.remember(password);
                user_config.passwords.add(password);
                config_manager
                    .save_user_config(user_config)
                    .context("Failed to remember password")?;
            }
        }
        None => {
            if let Some(password) = user_config.extractor.remembered_password() {
                tracing::info!("Using remembered password");
                task = task.with_password(password);
            }
        }
    }

    Ok(task)
}

fn run_tasks(
    cli: &Cli,
    user_config: &UserConfig,
    tasks: Vec<ArchiveTask>,
    max_depth: u32,
) -> Result<ExitCode> {
    let configured = cli.decoder.clone().or_else(|| {
        let path = &user_config.extractor.decoder_path;
        (!path.is_empty()).then(|| Utf8PathBuf::from(path))
    });
    let decoder = CommandDecoder::locate(configured.as_deref())
        .context("Cannot extract without WinRAR, unrar or 7-Zip")?;
    tracing::info!("Decoder: {} ({:?})", decoder.program(), decoder.kind());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(MAX_CONCURRENT_DECODERS + 1)
        .thread_name("unnest-worker")
        .build()?;

    let summary = runtime.block_on(async move {
        let state_manager = Arc::new(StateManager::new());
        let printer = tokio::spawn(print_events(state_manager.subscribe()));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_state = Arc::clone(&state_manager);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl-C received, stopping after the current file");
                cancel_state.request_cancel();
                let _ = cancel_tx.send(true);
            }
        });

        let observer: Arc<dyn RunObserver> = state_manager.clone();
        let orchestrator = ExtractionOrchestrator::new(decoder)
            .with_observer(observer)
            .with_max_depth(max_depth)
            .with_cancellation(cancel_rx);
        let runner = TaskRunner::new(orchestrator);

        state_manager.start_run(tasks.len());
        let summary = runner.run(&tasks).await;

        if let Err(e) = printer.await {
            tracing::error!("Event printer failed: {}", e);
        }
        summary
    });

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    report(&summary);

    let clean = summary.failed == 0
        && !summary.cancelled
        && summary.task_statuses.iter().all(|s| *s == TaskStatus::Success);
    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Print log lines and task transitions until the run finishes.
async fn print_events(mut rx: broadcast::Receiver<StateChange>) {
    loop {
        match rx.recv().await {
            Ok(StateChange::LogMessage { message }) => println!("{}", message),
            Ok(StateChange::TaskStatusChanged { index, status }) if status.is_terminal() => {
                println!("Task {}: {}", index + 1, status);
            }
            Ok(StateChange::CancelRequested) => println!("Cancelling after the current file..."),
            Ok(StateChange::RunFinished { .. }) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Printer lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report(summary: &RunSummary) {
    let statuses: Vec<String> = summary
        .task_statuses
        .iter()
        .enumerate()
        .map(|(i, s)| format!("#{} {}", i + 1, s))
        .collect();
    println!("Tasks: {}", statuses.join(", "));
    println!("{}", summary.tally_line());
}
