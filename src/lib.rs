// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod output;
pub mod registry;
pub mod schedule;
pub mod session;
pub mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::AppSettings;
use crate::exec::RealLauncher;
use crate::output::OutputBroker;
use crate::registry::ProjectRegistry;
use crate::schedule::{FireRecordStore, Scheduler};
use crate::session::SessionStore;
use crate::supervisor::{StartOutcome, StateChanged, Supervisor, SupervisorHandle, SupervisorMsg};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading and project discovery
/// - the output broker, supervisor, and session writer
/// - session restore from the previous run
/// - the scheduler tick task
/// - Ctrl-C handling and graceful shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let mut settings = config::load_or_default(PathBuf::from(&args.config))?;
    if let Some(dir) = &args.projects_dir {
        settings.projects_dir = PathBuf::from(dir);
    }

    let registry = Arc::new(ProjectRegistry::discover(settings.projects_dir.clone())?);

    if args.dry_run {
        print_dry_run(&settings, &registry);
        return Ok(());
    }

    std::fs::create_dir_all(&settings.state_dir)
        .with_context(|| format!("creating state dir {:?}", settings.state_dir))?;

    let session_store = SessionStore::new(&settings.state_dir);
    let restorable = session_store.restore_known(&registry);

    let broker = Arc::new(OutputBroker::new(settings.output_buffer_lines));
    let (sup_tx, sup_rx) = mpsc::channel::<SupervisorMsg>(64);
    let (state_tx, _) = broadcast::channel::<StateChanged>(256);
    let backend = Arc::new(RealLauncher::new(Arc::clone(&broker), sup_tx.clone()));
    let (session_handle, _session_task) = session::spawn_writer(session_store);

    let supervisor = Supervisor::new(
        Arc::clone(&registry),
        settings.clone(),
        backend,
        session_handle,
        state_tx.clone(),
        sup_rx,
    );
    let supervisor_task = tokio::spawn(supervisor.run());

    let handle = SupervisorHandle::new(sup_tx, state_tx, Arc::clone(&broker), Arc::clone(&registry));

    // Headless front-end: relay every output line to stdout.
    {
        let mut rx = handle.subscribe_all_output();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(line) => println!("[{}:{}] {}", line.project_id, line.stream, line.text),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    if !args.no_restore && !restorable.is_empty() {
        info!(count = restorable.len(), "restoring previous session");
        for (id, outcome) in handle.bulk_start(restorable).await? {
            match outcome {
                StartOutcome::Started(status) => {
                    info!(project = %id, pid = status.pid, "restored");
                }
                StartOutcome::AlreadyRunning => {}
                StartOutcome::Failed(err) => {
                    warn!(project = %id, %err, "failed to restore project");
                }
            }
        }
    }

    let scheduler = Scheduler::new(
        handle.clone(),
        Arc::clone(&registry),
        FireRecordStore::new(&settings.state_dir),
        settings.tick_interval(),
    );
    let scheduler_task = scheduler.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    info!("shutdown requested");

    scheduler_task.abort();
    handle.shutdown().await?;
    supervisor_task.await?;
    Ok(())
}

/// Print discovered projects and their schedules without running anything.
fn print_dry_run(settings: &AppSettings, registry: &ProjectRegistry) {
    println!("scriptdock dry-run");
    println!("  projects_dir = {}", settings.projects_dir.display());
    println!("  tick_interval_secs = {}", settings.tick_interval_secs);
    println!();

    for desc in registry.descriptors() {
        println!("  project '{}' ({})", desc.id, desc.name);
        println!("    entry     = {}", desc.entry.display());
        println!(
            "    interpreter = {}",
            exec::resolve_interpreter(&desc, settings).display()
        );
        println!("    schedule  = {}", desc.schedule);
        if desc.manifest.is_some() {
            println!("    manifest  = requirements.txt");
        }
        if !desc.tags.is_empty() {
            let tags: Vec<&str> = desc.tags.iter().map(String::as_str).collect();
            println!("    tags      = {}", tags.join(", "));
        }
    }
}
