use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use taskline::agent::TaskExecutor;
use taskline::cli::commands::{
    load_inputs, CancelCommand, HistoryCommand, ListCommand, PendingCommand, ResumeCommand,
    RunCommand, RunnerArgs, ValidateCommand,
};
use taskline::cli::output::*;
use taskline::cli::{Cli, Command};
use taskline::core::config::ProcessConfig;
use taskline::core::{Pipeline, RunStatus};
use taskline::execution::{ExecutionEngine, ExecutionEvent, RunOutcome};
use taskline::persistence::{ExecutionSummary, InMemoryPersistence, PersistenceBackend, RunJournal};
use tracing::{error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_process(cmd).await?,
        Command::Resume(cmd) => resume_run(cmd).await?,
        Command::Cancel(cmd) => cancel_run(cmd).await?,
        Command::Pending(cmd) => list_pending(cmd).await?,
        Command::Validate(cmd) => validate_process(cmd)?,
        Command::List(cmd) => list_processes(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = taskline::persistence::SqliteExecutionStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    tracing::warn!("Built without SQLite support, history is kept in memory only");
    Ok(Arc::new(InMemoryPersistence::new()))
}

fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let config = ProcessConfig::from_file(path).context("Failed to load process config")?;
    println!("{} Loaded process: {}", INFO, style(&config.name).bold());
    config.to_pipeline()
}

/// Build an engine with console output, journal and cancellation wired up
async fn build_engine(
    runner: &RunnerArgs,
    total_steps: usize,
) -> Result<ExecutionEngine<Box<dyn TaskExecutor>>> {
    let store: Arc<dyn PersistenceBackend> = if runner.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };

    let mut engine = ExecutionEngine::new(runner.executor_config().build(), runner.review_gate())
        .with_store(store);

    let progress = create_progress_bar(total_steps);
    engine.add_event_handler(move |event| {
        if let Some(line) = format_execution_event(event) {
            progress.println(line);
        }
        match event {
            ExecutionEvent::StepCompleted { .. } | ExecutionEvent::StepSkipped { .. } => {
                progress.inc(1)
            }
            ExecutionEvent::RunFinished { .. } | ExecutionEvent::RunSuspended { .. } => {
                progress.finish_and_clear()
            }
            _ => {}
        }
    });

    if !runner.no_journal {
        let journal = Arc::new(RunJournal::new(runner.journal_dir.clone()));
        engine.add_event_handler(journal.handler());
    }

    // First Ctrl-C cancels before the next step, the second one exits
    let cancellation = engine.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Cancelling after the current step (Ctrl-C again to abort)", WARN);
            cancellation.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    Ok(engine)
}

fn report_outcome(outcome: &RunOutcome, process_file: &Path, json: bool) -> Result<()> {
    match outcome {
        RunOutcome::Finished(result) => {
            println!("\n{}", format_result(result));
            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        RunOutcome::Suspended {
            run_id, breakpoint, ..
        } => {
            println!(
                "\n{} Waiting for review: {}\n  {}",
                PAUSE,
                style(&breakpoint.title).bold(),
                breakpoint.question
            );
            println!(
                "  Resume with: taskline resume {} --file {} --approve",
                run_id,
                process_file.display()
            );
            if json {
                println!("{}", serde_json::to_string_pretty(breakpoint)?);
            }
        }
    }
    Ok(())
}

async fn run_process(cmd: &RunCommand) -> Result<()> {
    let pipeline = load_pipeline(&cmd.file)?;
    let inputs = load_inputs(cmd.inputs.as_ref(), &cmd.input)?;
    let engine = build_engine(&cmd.runner, pipeline.len()).await?;

    println!();
    let outcome = engine.run(&pipeline, inputs).await?;
    report_outcome(&outcome, &cmd.file, cmd.json)
}

async fn resume_run(cmd: &ResumeCommand) -> Result<()> {
    let run_id = Uuid::parse_str(&cmd.run_id).context("Invalid run ID format")?;
    let pipeline = load_pipeline(&cmd.file)?;
    let engine = build_engine(&cmd.runner, pipeline.len()).await?;

    let outcome = engine.resume(&pipeline, run_id, cmd.decision()).await?;
    report_outcome(&outcome, &cmd.file, cmd.json)
}

async fn cancel_run(cmd: &CancelCommand) -> Result<()> {
    let run_id = Uuid::parse_str(&cmd.run_id).context("Invalid run ID format")?;
    let store = open_store().await?;
    let engine = ExecutionEngine::new(
        taskline::agent::ExecutorConfig::default().build(),
        Arc::new(taskline::review::DeferReview),
    )
    .with_store(store);

    engine.cancel(run_id).await?;
    println!("{} Run {} cancelled", CHECK, style(run_id).cyan());
    Ok(())
}

async fn list_pending(cmd: &PendingCommand) -> Result<()> {
    let store = open_store().await?;
    let runs = store.list_suspended().await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs waiting for review", INFO);
        return Ok(());
    }

    println!("{} Runs waiting for review:", INFO);
    for run in &runs {
        println!("  {}", format_suspended(run));
        println!("      {}", style(&run.breakpoint.question).dim());
    }
    Ok(())
}

fn validate_process(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating process...", INFO);

    match ProcessConfig::from_file(&cmd.file) {
        Ok(config) => {
            let breakpoints = config.steps.iter().filter(|s| s.breakpoint.is_some()).count();
            println!("{} Process configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Tasks: {}", style(config.tasks.len()).cyan());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!("  Breakpoints: {}", style(breakpoints).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn list_processes(cmd: &ListCommand) -> Result<()> {
    let store = open_store().await?;
    let processes = store.list_processes().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for process in &processes {
            let runs = store.list_executions(process).await?;
            json_data.push(serde_json::json!({
                "name": process,
                "run_count": runs.len()
            }));
        }
        let data = serde_json::json!({ "processes": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if processes.is_empty() {
        println!("{} No processes found in history", INFO);
        return Ok(());
    }

    println!("{} Processes in history:", INFO);
    for process in &processes {
        if cmd.with_counts {
            let runs = store.list_executions(process).await?;
            let completed = runs.iter().filter(|e| e.status == RunStatus::Completed).count();
            let failed = runs.iter().filter(|e| e.status == RunStatus::Failed).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(process).bold(),
                style(runs.len()).cyan(),
                style(completed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(process).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_execution(run_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.verbose)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut runs = match &cmd.process {
        Some(process) => store.list_executions(process).await?,
        None => {
            let mut all = Vec::new();
            for process in store.list_processes().await? {
                all.extend(store.list_executions(&process).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    runs.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Process: {}", style(&summary.process_name).bold());
    if let Some(version) = &summary.version {
        println!("  Version: {}", version);
    }
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        match completed.signed_duration_since(summary.started_at).to_std() {
            Ok(duration) => println!("  Duration: {}", style(format_duration(duration)).dim()),
            Err(e) => error!("Invalid run duration: {}", e),
        }
    }
    println!(
        "  Progress: {} ({}/{}, {} skipped)",
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan(),
        summary.executed_steps + summary.skipped_steps,
        summary.total_steps,
        summary.skipped_steps
    );
    println!("  Artifacts: {}", summary.artifact_count);
    if let Some(err) = &summary.error {
        println!("  Error: {}", style(err).red());
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
