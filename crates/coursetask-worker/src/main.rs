//! CourseTask worker CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use coursetask_core::{CourseId, EntryId, RunId, TaskInput, TaskOutput, TaskRecord};
use coursetask_worker::json_output;
use coursetask_worker::metrics::collect_metrics;
use coursetask_worker::progress::{JsonProgressSink, LogProgressSink, ProgressSink};
use coursetask_worker::store::TaskStore;
use coursetask_worker::{
    run_task, Collaborators, Config, ExecutionContext, MemoryStore, TaskAction, TaskError,
    TaskLifecycle,
};

/// CourseTask worker - runs per-student course update tasks
#[derive(Parser)]
#[command(name = "coursetask-worker")]
#[command(about = "Submit and run per-student course update tasks", long_about = None)]
struct Cli {
    /// JSON state file
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Stream task events as JSON lines on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a pending task record
    Submit {
        /// Course to update
        #[arg(short, long)]
        course: String,

        /// Task type (rescore_problem, reset_problem_attempts,
        /// delete_problem_state, update_offline_grades)
        #[arg(short = 't', long = "type")]
        task_type: String,

        /// Problem to update
        #[arg(short, long)]
        problem: Option<String>,

        /// Restrict to one student, by username or email
        #[arg(long)]
        student: Option<String>,
    },

    /// Run a task record
    Run {
        /// Task entry id
        entry_id: u64,

        /// Execute under this run id instead of the record's
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Show the state and output of a task record
    Status {
        /// Task entry id
        entry_id: u64,
    },

    /// Print task metrics in Prometheus format
    Metrics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::default();
    if let Some(state) = cli.state {
        config.state_path = state;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.json_output = cli.json;

    // Logs go to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if config.json_output {
        json_output::enable_json_mode();
    }

    let store = Arc::new(MemoryStore::open(&config.state_path).await?);

    match cli.command {
        Commands::Submit {
            course,
            task_type,
            problem,
            student,
        } => submit(&config, &store, course, task_type, problem, student).await?,
        Commands::Run { entry_id, run_id } => run(&config, store, entry_id, run_id).await?,
        Commands::Status { entry_id } => status(&store, entry_id).await?,
        Commands::Metrics => print!("{}", collect_metrics(&store.tasks().await)),
    }

    Ok(())
}

async fn submit(
    config: &Config,
    store: &MemoryStore,
    course: String,
    task_type: String,
    problem: Option<String>,
    student: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let action = TaskAction::from_task_type(&task_type)
        .ok_or_else(|| TaskError::UnsupportedTaskType(task_type.clone()))?;
    if action.requires_problem() && problem.is_none() {
        return Err(TaskError::InvalidInput(format!("{action} requires --problem")).into());
    }

    let input = TaskInput {
        problem_url: problem,
        student,
    };
    let entry_id = store.next_entry_id().await;
    let record = TaskRecord::new(
        entry_id,
        action.task_type(),
        CourseId::new(course),
        &input,
        config.requester.clone(),
    )?;
    store.save(&record).await?;

    info!(entry_id = %entry_id, task_id = %record.task_id, task_type = %action, "Task submitted");
    println!("Task submitted:");
    print_task(&record);
    Ok(())
}

async fn run(
    config: &Config,
    store: Arc<MemoryStore>,
    entry_id: u64,
    run_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let entry_id = EntryId::new(entry_id);
    let run_id = match run_id {
        Some(id) => RunId::new(id),
        None => store.load(entry_id).await?.task_id,
    };

    let progress: Arc<dyn ProgressSink> = if config.json_output {
        Arc::new(JsonProgressSink)
    } else {
        Arc::new(LogProgressSink)
    };
    let ctx = ExecutionContext::new(run_id).with_progress(progress);

    let collaborators = Collaborators::from_store(store);
    let lifecycle = TaskLifecycle::new(collaborators.tasks.clone())
        .with_max_traceback_len(config.max_traceback_len);

    let snapshot = run_task(&lifecycle, &collaborators, entry_id, &ctx).await?;
    if !config.json_output {
        println!(
            "{}: {} of {} attempted ({} succeeded, {} failed, {} skipped) in {} ms",
            snapshot.action_name,
            snapshot.attempted,
            snapshot.total,
            snapshot.succeeded,
            snapshot.failed,
            snapshot.skipped,
            snapshot.duration_ms
        );
    }
    Ok(())
}

async fn status(store: &MemoryStore, entry_id: u64) -> Result<(), Box<dyn std::error::Error>> {
    let record = store.load(EntryId::new(entry_id)).await?;
    print_task(&record);
    Ok(())
}

fn print_task(record: &TaskRecord) {
    println!("  Entry:     {}", record.id);
    println!("  Run ID:    {}", record.task_id);
    println!("  Type:      {}", record.task_type);
    println!("  Course:    {}", record.course_id);
    println!("  Input:     {}", record.task_input);
    println!("  State:     {}", record.task_state);
    println!("  Requester: {}", record.requester);
    println!("  Created:   {}", record.created_at);
    println!("  Updated:   {}", record.updated_at);

    match record.task_output.as_deref().map(TaskOutput::decode) {
        Some(Ok(TaskOutput::Progress(p))) => println!(
            "  Output:    {} {}/{} (succeeded {}, failed {}, skipped {}) in {} ms",
            p.action_name, p.attempted, p.total, p.succeeded, p.failed, p.skipped, p.duration_ms
        ),
        Some(Ok(TaskOutput::Failure(report))) => {
            println!("  Error:     {}: {}", report.exception, report.message);
            if let Some(traceback) = report.traceback {
                println!("  Traceback: {traceback}");
            }
        }
        Some(Err(_)) => println!(
            "  Output:    {}",
            record.task_output.as_deref().unwrap_or_default()
        ),
        None => {}
    }
}
