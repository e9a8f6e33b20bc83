//! Project initialization, validation and task listing.

use anyhow::Result;
use console::style;
use std::path::Path;

use super::load_config;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use proofloop::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized proofloop project at {}",
            result.state_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .proofloop/");
        println!("  ├── proofloop.toml  # Settings (agent command, verify stages, retry budget)");
        println!("  ├── tasks.json      # Task graph");
        println!("  ├── runs/           # Run reports");
        println!("  └── logs/           # Log files");
        println!();
        println!("Next steps:");
        println!("  1. Describe your tasks in .proofloop/tasks.json");
        println!("  2. Set [agent] command in .proofloop/proofloop.toml");
        println!("  3. Run `proofloop validate`, then `proofloop run`");
    } else if was_initialized {
        println!(
            "Proofloop project already initialized at {}",
            result.state_dir.display()
        );
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed proofloop initialization at {}",
            result.state_dir.display()
        );
    }

    Ok(())
}

pub fn cmd_validate(project_dir: &Path) -> Result<()> {
    use proofloop::graph::TaskGraph;

    let config = load_config(project_dir, false)?;
    let graph = TaskGraph::load(&config.graph_file)?;

    println!(
        "{} Task graph version {}: {} task(s)",
        style("✓").green(),
        graph.version(),
        graph.len()
    );
    if !graph.is_empty() {
        println!("  Roots:  {}", graph.roots().join(", "));
        println!("  Leaves: {}", graph.leaves().join(", "));
        let depth = graph
            .ids()
            .filter_map(|id| graph.topological_depth(id))
            .max()
            .unwrap_or(0);
        println!("  Longest dependency chain: {}", depth);
    }

    let warnings = config.settings.validate();
    if warnings.is_empty() {
        println!("{} Settings OK", style("✓").green());
    } else {
        println!("{} Settings warnings:", style("!").yellow());
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}

pub fn cmd_list(project_dir: &Path) -> Result<()> {
    use proofloop::graph::TaskGraph;

    let config = load_config(project_dir, false)?;
    let graph = TaskGraph::load(&config.graph_file)?;

    if graph.is_empty() {
        println!("No tasks defined. Add tasks to {}", config.graph_file.display());
        return Ok(());
    }

    let width = graph.ids().map(str::len).max().unwrap_or(2).max(2);
    println!();
    println!(
        "{:<width$}  {:>5}  {:<12}  {:<20}  Title",
        "ID",
        "Depth",
        "Kind",
        "Depends on",
        width = width
    );
    for task in graph.tasks() {
        let deps = if task.depends_on.is_empty() {
            "-".to_string()
        } else {
            task.depends_on.join(", ")
        };
        let mut title = task.title.clone();
        if let Some(parent) = &task.split_from {
            title.push_str(&format!(" {}", style(format!("(split from {})", parent)).dim()));
        }
        println!(
            "{:<width$}  {:>5}  {:<12}  {:<20}  {}",
            task.id,
            graph.topological_depth(&task.id).unwrap_or(0),
            task.kind,
            deps,
            title,
            width = width
        );
    }
    println!();
    println!("{} task(s), graph version {}", graph.len(), graph.version());
    Ok(())
}
