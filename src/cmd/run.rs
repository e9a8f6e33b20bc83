//! `proofloop run`: wires the configured collaborators into the run loop.

use anyhow::{Result, bail};
use console::style;
use std::path::Path;
use std::sync::Arc;

use super::{load_config, load_state};

pub async fn cmd_run(project_dir: &Path, verbose: bool, max_attempts: Option<u32>) -> Result<()> {
    use proofloop::agent::{CommandAgent, CommandDecomposer};
    use proofloop::gate::{CommandStageRunner, VerificationGate};
    use proofloop::graph::TaskGraphFile;
    use proofloop::orchestrator::{RunLoop, RunOutcome};
    use proofloop::reflect::RetryController;
    use proofloop::scaffold::{NoopScaffolder, Scaffolder, TemplateScaffolder};
    use proofloop::settings::AGENT_CMD_ENV;
    use proofloop::ui::{RunUI, print_status_table};

    let config = load_config(project_dir, verbose)?.with_max_attempts(max_attempts);
    config.ensure_directories()?;
    let settings = config.settings.clone();

    for warning in settings.validate() {
        tracing::warn!("{}", warning);
    }
    let Some(agent_command) = settings.agent_command() else {
        bail!(
            "No agent command configured. Set [agent] command in {} or {}",
            config.settings_file.display(),
            AGENT_CMD_ENV
        );
    };

    let gate = VerificationGate::new(
        settings.stage_specs(),
        settings.prohibited_regex()?,
        settings.verify_timeout(),
        Arc::new(CommandStageRunner::new()),
    );
    let scaffolder: Arc<dyn Scaffolder> = if settings.scaffold.enabled {
        Arc::new(TemplateScaffolder::new(
            settings.scaffold.resolved_templates(),
            settings.scaffold.resolved_test_template(),
        ))
    } else {
        Arc::new(NoopScaffolder)
    };
    let agent = Arc::new(CommandAgent::new(
        &agent_command,
        &config.project_dir,
        settings.agent_timeout(),
    ));

    let total = TaskGraphFile::load(&config.graph_file)
        .map(|f| f.tasks.len())
        .unwrap_or(0);
    let ui = Arc::new(RunUI::new(total as u64, verbose));

    let mut run = RunLoop::new(
        config.clone(),
        gate,
        RetryController::new(settings.retry_policy()),
        scaffolder,
        agent,
    )
    .with_ui(ui);
    if let Some(command) = &settings.agent.decompose_command {
        run = run.with_decomposer(Arc::new(CommandDecomposer::new(
            command,
            &config.project_dir,
            settings.agent_timeout(),
        )));
    }

    let result = run.run().await;

    println!();
    if let Ok((graph, ledger)) = load_state(&config) {
        print_status_table(&graph, &ledger);
    }

    let report = result?;
    match &report.outcome {
        RunOutcome::Done => {
            println!("{}", style("All tasks completed.").green().bold());
            Ok(())
        }
        RunOutcome::Stalled { report: stall } => {
            bail!("Run stopped before completion: {}", stall)
        }
        RunOutcome::Aborted { error } => bail!("Run aborted: {}", error),
    }
}
