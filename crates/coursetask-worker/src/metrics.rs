//! Prometheus metrics over the task records of a store.
//!
//! This module renders metrics in Prometheus text exposition format.

use std::fmt::Write;

use coursetask_core::{TaskOutput, TaskRecord, TaskState};

/// Format metrics for `tasks` as Prometheus text.
pub fn collect_metrics(tasks: &[TaskRecord]) -> String {
    let mut output = String::new();

    collect_state_metrics(tasks, &mut output);
    collect_progress_metrics(tasks, &mut output);

    output
}

/// Count task records by state.
fn collect_state_metrics(tasks: &[TaskRecord], output: &mut String) {
    let mut pending = 0u64;
    let mut running = 0u64;
    let mut progress = 0u64;
    let mut success = 0u64;
    let mut failure = 0u64;

    for task in tasks {
        match task.task_state {
            TaskState::Pending => pending += 1,
            TaskState::Running => running += 1,
            TaskState::Progress => progress += 1,
            TaskState::Success => success += 1,
            TaskState::Failure => failure += 1,
        }
    }

    writeln!(
        output,
        "# HELP coursetask_tasks_total Number of task records by state"
    )
    .ok();
    writeln!(output, "# TYPE coursetask_tasks_total gauge").ok();
    writeln!(output, "coursetask_tasks_total{{state=\"pending\"}} {pending}").ok();
    writeln!(output, "coursetask_tasks_total{{state=\"running\"}} {running}").ok();
    writeln!(output, "coursetask_tasks_total{{state=\"progress\"}} {progress}").ok();
    writeln!(output, "coursetask_tasks_total{{state=\"success\"}} {success}").ok();
    writeln!(output, "coursetask_tasks_total{{state=\"failure\"}} {failure}").ok();
}

/// Sum the final counters of successful runs.
fn collect_progress_metrics(tasks: &[TaskRecord], output: &mut String) {
    let mut attempted = 0u64;
    let mut succeeded = 0u64;
    let mut failed = 0u64;
    let mut skipped = 0u64;

    let finished = tasks
        .iter()
        .filter(|t| t.task_state == TaskState::Success)
        .filter_map(|t| t.task_output.as_deref())
        .filter_map(|raw| TaskOutput::decode(raw).ok());
    for output in finished {
        if let TaskOutput::Progress(snapshot) = output {
            attempted += snapshot.attempted;
            succeeded += snapshot.succeeded;
            failed += snapshot.failed;
            skipped += snapshot.skipped;
        }
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP coursetask_targets_total Targets visited by successful tasks by outcome"
    )
    .ok();
    writeln!(output, "# TYPE coursetask_targets_total counter").ok();
    writeln!(output, "coursetask_targets_total{{outcome=\"attempted\"}} {attempted}").ok();
    writeln!(output, "coursetask_targets_total{{outcome=\"succeeded\"}} {succeeded}").ok();
    writeln!(output, "coursetask_targets_total{{outcome=\"failed\"}} {failed}").ok();
    writeln!(output, "coursetask_targets_total{{outcome=\"skipped\"}} {skipped}").ok();
}
