use clap::{Parser, Subcommand};
use dotenv::dotenv;
use futures::StreamExt;
use kinetic_flow::adk::tool::Tool;
use kinetic_flow::kinetic::tools::builtin;
use kinetic_flow::kinetic::workflow::builder::Builder;
use kinetic_flow::kinetic::workflow::checkpoint::{CheckpointStorage, FileCheckpointStorage};
use kinetic_flow::kinetic::workflow::config::checkpoint_dir;
use kinetic_flow::kinetic::workflow::registry::{AgentRegistry, ToolRegistry};
use kinetic_flow::kinetic::workflow::{Workflow, WorkflowRun};
use serde_json::Value;

use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding file checkpoints [env: KINETIC_CHECKPOINT_DIR]
    #[arg(long, global = true)]
    checkpoint_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow from a file
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Input to the workflow (JSON, or plain text)
        #[arg(short, long)]
        input: String,

        /// Print events as JSON lines while the run progresses
        #[arg(long)]
        stream: bool,
    },
    /// Answer a pending request of a checkpointed run and continue it
    Respond {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Checkpoint to resume from
        #[arg(short, long)]
        checkpoint: String,

        /// Id of the request being answered
        #[arg(short, long)]
        request: String,

        /// Response payload (JSON, or plain text)
        #[arg(long)]
        response: String,
    },
    /// List or delete the checkpoints of a workflow
    Checkpoints {
        /// Workflow name
        #[arg(short, long)]
        workflow: String,

        /// Delete this checkpoint instead of listing
        #[arg(long)]
        delete: Option<String>,
    },
    /// List the built-in tools available to function executors
    Tools,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let storage = Arc::new(FileCheckpointStorage::new(
        args.checkpoint_dir.clone().unwrap_or_else(checkpoint_dir),
    ));

    match args.command {
        Commands::Run {
            file,
            input,
            stream,
        } => {
            let workflow = load(&file, storage.clone()).await?;
            let input = parse_payload(input);

            if stream {
                run_streaming(&workflow, input).await?;
            } else {
                println!("Running workflow: {}", workflow.id());
                let run = workflow.run(input).await?;
                report(&run);
            }
        }
        Commands::Respond {
            file,
            checkpoint,
            request,
            response,
        } => {
            let workflow = load(&file, storage.clone()).await?;
            let mut run = workflow.restore(&checkpoint).await?;
            run.send_response(&request, parse_payload(response)).await?;
            report(&run);
        }
        Commands::Checkpoints { workflow, delete } => match delete {
            Some(id) => {
                if storage.delete(&id).await? {
                    println!("Deleted checkpoint {}", id);
                } else {
                    println!("Checkpoint {} not found", id);
                }
            }
            None => {
                for id in storage.list(&workflow).await? {
                    println!("{}", id);
                }
            }
        },
        Commands::Tools => {
            for tool in builtin::all() {
                println!("{}: {}", tool.name(), tool.description());
            }
        }
    }

    Ok(())
}

async fn load(file: &str, storage: Arc<FileCheckpointStorage>) -> CliResult<Workflow> {
    let tools = ToolRegistry::with_builtins().await;
    for name in tools.names().await {
        log::debug!("Registered tool: {}", name);
    }

    let builder = Builder::new(tools, AgentRegistry::new());
    let workflow = builder.build_workflow(file).await?;
    Ok(workflow.with_checkpoint_storage(storage))
}

async fn run_streaming(workflow: &Workflow, input: Value) -> CliResult<()> {
    let mut events = workflow.run_stream(input);
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
        // Pending requests are answered later with `respond`
        if event.is_terminal() {
            break;
        }
    }

    if let Some(latest) = workflow.list_checkpoints().await?.last() {
        eprintln!("Latest checkpoint: {}", latest);
    }
    Ok(())
}

fn parse_payload(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn report(run: &WorkflowRun) {
    println!("Status: {}", run.status());
    for output in run.outputs() {
        println!("Output: {}", output);
    }
    if let Some(failure) = run.failure() {
        println!("Failed: {}", failure.message);
    }
    for request in run.pending_requests() {
        println!(
            "Pending request {} from '{}': {}",
            request.request_id, request.executor_id, request.payload
        );
    }
    if let Some(id) = run.last_checkpoint_id() {
        println!("Checkpoint: {}", id);
    }
}
