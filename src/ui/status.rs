//! Plain status table for `status`, `list` and end-of-run summaries.

use crate::graph::TaskGraph;
use crate::ledger::{Ledger, TaskStatus};
use crate::ui::icons::{BLOCKER, CHECK, CROSS, RUNNING, WAITING};
use console::{Emoji, style};

fn status_icon(status: TaskStatus) -> Emoji<'static, 'static> {
    match status {
        TaskStatus::Completed => CHECK,
        TaskStatus::Failed => CROSS,
        TaskStatus::Blocked => BLOCKER,
        TaskStatus::InProgress => RUNNING,
        TaskStatus::Todo | TaskStatus::Ready => WAITING,
    }
}

fn styled_status(status: TaskStatus) -> String {
    let padded = format!("{:<11}", status.as_str());
    match status {
        TaskStatus::Completed => style(padded).green().to_string(),
        TaskStatus::Failed => style(padded).red().to_string(),
        TaskStatus::Blocked => style(padded).yellow().to_string(),
        TaskStatus::InProgress => style(padded).cyan().to_string(),
        TaskStatus::Todo | TaskStatus::Ready => style(padded).dim().to_string(),
    }
}

/// One line per task in graph order, plus a summary line.
pub fn render_status_table(graph: &TaskGraph, ledger: &Ledger) -> String {
    let width = graph.ids().map(str::len).max().unwrap_or(2).max(2);
    let mut out = String::new();

    out.push_str(&format!(
        "   {:<width$}  {:<11}  {:>8}  {}\n",
        "ID",
        "STATUS",
        "ATTEMPTS",
        "TITLE",
        width = width
    ));

    for task in graph.tasks() {
        let Ok(record) = ledger.get(&task.id) else {
            continue;
        };
        let mut line = format!(
            "{}{:<width$}  {}  {:>8}  {}",
            status_icon(record.status),
            task.id,
            styled_status(record.status),
            record.attempts,
            task.title,
            width = width
        );
        if record.awaiting_split {
            line.push_str(&format!(" {}", style("(awaiting split)").yellow()));
        } else if !record.blocking.is_empty() {
            line.push_str(&format!(
                " {}",
                style(format!("(waiting on {})", record.blocking.join(", "))).dim()
            ));
        }
        out.push_str(&line);
        out.push('\n');
    }

    let s = ledger.summary();
    out.push_str(&format!(
        "\n{} task(s): {} completed, {} in progress, {} ready, {} todo, {} blocked, {} failed\n",
        s.total(),
        s.completed,
        s.in_progress,
        s.ready,
        s.todo,
        s.blocked,
        s.failed
    ));
    out
}

pub fn print_status_table(graph: &TaskGraph, ledger: &Ledger) {
    print!("{}", render_status_table(graph, ledger));
}
