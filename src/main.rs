use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use relay::agent::{AgentType, SimulatedBridge};
use relay::bulk::{BatchExecutor, BulkOperationConfig};
use relay::config::Config;
use relay::core::{PageContext, PageType, Task};
use relay::log::LogLevel;
use relay::orchestration::{AgentRegistry, Dispatcher, ROUTES};
use relay::workflow::{WorkflowDefinition, WorkflowExecutor};
use relay::{rlog, rlog_debug, Result};

/// Relay - browser agent dispatcher, workflow runner and bulk executor
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RELAY_DEBUG=1   Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.relay/relay.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Page the agents operate on
    #[arg(short = 'p', long, global = true, default_value = "unknown")]
    pub page_type: PageType,

    /// URL of the current page
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Item shown on the current page
    #[arg(long, global = true)]
    pub item: Option<String>,

    /// Config file (defaults to ~/.relay/relay.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Dispatch a single task by type
    Dispatch {
        /// Task type, e.g. seo_analyze or update_item
        task_type: String,

        /// Task payload as JSON
        #[arg(long, default_value = "{}")]
        data: String,

        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Extra attempts after a failed execution
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Run a workflow definition from a JSON file
    Workflow {
        /// Path to the workflow definition
        file: PathBuf,
    },

    /// Run a bulk operation from a JSON file
    Bulk {
        /// Path to the bulk operation config
        file: PathBuf,

        /// Print a status line to stderr after every settled item
        #[arg(long)]
        progress: bool,
    },

    /// List the task routing table
    Routes,

    /// List agent types with their operations and allowed pages
    Agents,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    relay::log::init_with_debug(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(level) = &config.log_level {
        if !cli.debug {
            relay::log::set_level(level.parse::<LogLevel>()?);
        }
    }

    let mut context = PageContext::new(cli.page_type);
    if let Some(url) = cli.url {
        context = context.with_url(&url);
    }
    if let Some(item) = cli.item {
        context = context.with_item(&item);
    }
    rlog!(
        "Relay starting: command={:?} page={}",
        cli.command,
        context.page_type
    );

    match cli.command {
        Command::Routes => print_json(&ROUTES),
        Command::Agents => print_json(&agent_catalog()),
        Command::Dispatch {
            task_type,
            data,
            timeout_ms,
            retries,
        } => {
            let mut task = Task::new(&task_type, serde_json::from_str(&data)?);
            if let Some(ms) = timeout_ms {
                task = task.with_timeout(Duration::from_millis(ms));
            }
            if let Some(retries) = retries {
                task = task.with_retries(retries);
            }
            run_dispatch(&config, context, task)
        }
        Command::Workflow { file } => run_workflow(&config, context, &file),
        Command::Bulk { file, progress } => run_bulk(&config, context, &file, progress),
    }
}

fn build_dispatcher(config: &Config, context: PageContext) -> Arc<Dispatcher> {
    let bridge = Arc::new(SimulatedBridge::new(config.bridge_latency()));
    let registry = Arc::new(AgentRegistry::from_config(config, bridge, context));
    Arc::new(Dispatcher::new(registry).with_default_timeout(config.default_timeout()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    rlog_debug!("Reading {}", path.display());
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn agent_catalog() -> Vec<Value> {
    AgentType::ALL
        .iter()
        .map(|agent_type| {
            json!({
                "agentType": agent_type,
                "operations": agent_type.operations(),
                "pages": agent_type.allowed_pages(),
            })
        })
        .collect()
}

fn run_dispatch(config: &Config, context: PageContext, mut task: Task) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let dispatcher = build_dispatcher(config, context);
        Dispatcher::route(&mut task);
        let result = dispatcher.dispatch(&task).await;
        dispatcher.registry().teardown().await;
        result
    })?;
    print_json(&result)
}

fn run_workflow(config: &Config, context: PageContext, file: &Path) -> Result<()> {
    let definition: WorkflowDefinition = read_json(file)?;
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let dispatcher = build_dispatcher(config, context);
        let result = WorkflowExecutor::new(dispatcher.clone())
            .execute_workflow(&definition)
            .await;
        dispatcher.registry().teardown().await;
        result
    })?;
    print_json(&result)
}

fn run_bulk(config: &Config, context: PageContext, file: &Path, progress: bool) -> Result<()> {
    let mut bulk: BulkOperationConfig = read_json(file)?;
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let dispatcher = build_dispatcher(config, context);
        let executor = BatchExecutor::from_config(dispatcher.clone(), config);

        let printer = if progress {
            let (tx, mut rx) = mpsc::unbounded_channel();
            bulk = bulk.with_progress(tx);
            Some(tokio::spawn(async move {
                while let Some(status) = rx.recv().await {
                    eprintln!(
                        "[{}] {}/{} processed ({} ok, {} failed)",
                        status.id.short(),
                        status.processed_items,
                        status.total_items,
                        status.success_count,
                        status.failure_count
                    );
                }
            }))
        } else {
            None
        };

        let result = executor.execute(bulk).await;
        if let Some(printer) = printer {
            // The sender went away with the config; the printer drains and ends.
            let _ = printer.await;
        }
        dispatcher.registry().teardown().await;
        result
    })?;
    print_json(&result)
}
