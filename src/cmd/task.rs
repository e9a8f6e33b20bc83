//! Status, scheduling, scaffolding, split, log and reset commands.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use super::{load_config, load_state};

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    use proofloop::orchestrator::RunReport;
    use proofloop::ui::print_status_table;

    let config = load_config(project_dir, false)?;
    let (graph, ledger) = load_state(&config)?;

    println!();
    if graph.is_empty() {
        println!("No tasks defined.");
        println!();
        return Ok(());
    }
    print_status_table(&graph, &ledger);

    if let Some(latest) = RunReport::list(&config.runs_dir)?.first() {
        match RunReport::load(latest) {
            Ok(report) => println!(
                "Last run {} ended {}: {}",
                &report.run_id.to_string()[..8],
                report.ended_at.format("%Y-%m-%d %H:%M:%S"),
                if report.is_done() { "done" } else { "not done" }
            ),
            Err(e) => tracing::debug!("Unreadable run report {}: {:#}", latest.display(), e),
        }
    }
    println!();
    Ok(())
}

pub fn cmd_next(project_dir: &Path) -> Result<()> {
    use proofloop::errors::ScheduleError;
    use proofloop::scheduler::{Selection, next_step};

    let config = load_config(project_dir, false)?;
    let (graph, ledger) = load_state(&config)?;

    match next_step(&graph, &ledger) {
        Ok(Selection::Next(id)) => {
            let title = graph.get(&id).map(|t| t.title.as_str()).unwrap_or_default();
            println!("{}  {}", style(&id).yellow().bold(), title);
        }
        Ok(Selection::Finished) => println!("All tasks completed."),
        Ok(Selection::Stalled(report)) => {
            println!("Nothing can run: {}", report);
        }
        Err(ScheduleError::TaskInProgress { id }) => {
            println!(
                "{}  in progress (run `proofloop run` to resume it)",
                style(&id).cyan().bold()
            );
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn cmd_scaffold(project_dir: &Path, task_id: &str) -> Result<()> {
    use proofloop::graph::TaskGraph;
    use proofloop::scaffold::TemplateScaffolder;

    let config = load_config(project_dir, false)?;
    let graph = TaskGraph::load(&config.graph_file)?;
    let Some(task) = graph.get(task_id) else {
        bail!("Unknown task '{}'", task_id);
    };

    let scaffold = &config.settings.scaffold;
    let scaffolder =
        TemplateScaffolder::new(scaffold.resolved_templates(), scaffold.resolved_test_template());
    let created = scaffolder.create_stubs(task, &config.project_dir)?;

    if created.is_empty() {
        println!("Nothing to scaffold for {}", task_id);
    } else {
        for path in &created {
            println!("  {} {}", style("+").green(), path.display());
        }
    }
    Ok(())
}

pub fn cmd_split(project_dir: &Path, task_id: &str, from: &Path) -> Result<()> {
    use proofloop::agent::parse_decomposition;
    use proofloop::orchestrator::{RunLock, apply_split};

    let config = load_config(project_dir, false)?;
    let content = std::fs::read_to_string(from)
        .with_context(|| format!("Failed to read sub-tasks from {}", from.display()))?;
    let subtasks = parse_decomposition(&content)?;

    let _lock = RunLock::acquire(&config.lock_file)?;
    let (graph, mut ledger) = load_state(&config)?;
    let next = apply_split(
        &graph,
        &mut ledger,
        task_id,
        subtasks,
        &config.graph_file,
        &config.ledger_file,
    )?;

    let record = ledger.get(task_id)?;
    println!(
        "Split {} into {} (graph version {})",
        style(task_id).yellow().bold(),
        record.blocking.join(", "),
        next.version()
    );
    Ok(())
}

pub fn cmd_log(project_dir: &Path, task: Option<&str>, limit: usize) -> Result<()> {
    use proofloop::orchestrator::RunLog;

    let config = load_config(project_dir, false)?;
    let log = RunLog::new(&config.run_log_file);
    let entries = match task {
        Some(id) => log.entries_for_task(id)?,
        None => log.entries()?,
    };

    if entries.is_empty() {
        println!("No run log entries.");
        return Ok(());
    }

    let skip = entries.len().saturating_sub(limit);
    for entry in entries.iter().skip(skip) {
        println!(
            "{} {} {:<11} {:<8} {:<9} {}",
            style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            style(&entry.run_id.to_string()[..8]).dim(),
            entry.phase,
            entry.task_id.as_deref().unwrap_or("-"),
            format!("{:?}", entry.outcome).to_lowercase(),
            entry.message
        );
    }
    Ok(())
}

pub fn cmd_reset(project_dir: &Path, force: bool) -> Result<()> {
    use dialoguer::Confirm;
    use proofloop::orchestrator::RunLock;

    let config = load_config(project_dir, false)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt("This will reset all progress. Are you sure?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let _lock = RunLock::acquire(&config.lock_file)?;
    for file in [&config.ledger_file, &config.run_log_file] {
        if file.exists() {
            std::fs::remove_file(file)
                .with_context(|| format!("Failed to remove {}", file.display()))?;
        }
    }

    println!("Reset complete");
    Ok(())
}
