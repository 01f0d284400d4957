use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agentflow_config::{TemplateDef, WorkflowDef};
use agentflow_runtime::{AgentRegistry, EchoAgent, WorkflowExecutor, WorkflowInput};
use agentflow_workflow::{AgentWorkflow, NodeKind, create_from_template};

/// Agentflow - a DAG orchestrator for agent pipelines
#[derive(Parser)]
#[command(name = "agentflow")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a workflow definition and print its execution order
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Instantiate a template and print the resulting workflow
  Instantiate {
    /// Path to the template file (JSON)
    template_file: PathBuf,

    /// Template parameters as a JSON object
    #[arg(long, default_value = "{}")]
    params: String,
  },

  /// Dry-run a workflow with echo agents, reading the input from stdin
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Budget for the whole execution
    #[arg(long, env = "AGENTFLOW_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agentflow=info,warn")),
    )
    .with_writer(io::stderr)
    .with_target(false)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Validate { workflow_file }) => validate(&workflow_file)?,
    Some(Commands::Instantiate {
      template_file,
      params,
    }) => instantiate(&template_file, &params)?,
    Some(Commands::Run {
      workflow_file,
      timeout_ms,
    }) => {
      let success = run_workflow(workflow_file, timeout_ms)?;
      if !success {
        std::process::exit(1);
      }
    }
    None => {
      println!("agentflow - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_workflow(workflow_file: &Path) -> Result<AgentWorkflow> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let def: WorkflowDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  AgentWorkflow::from_def(def).context("invalid workflow")
}

fn validate(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  workflow.validate().context("invalid workflow")?;

  println!(
    "{}",
    serde_json::to_string_pretty(&serde_json::json!({
      "workflow_id": workflow.id,
      "nodes": workflow.len(),
      "order": workflow.topological_order(),
    }))?
  );

  Ok(())
}

fn instantiate(template_file: &Path, params: &str) -> Result<()> {
  let content = std::fs::read_to_string(template_file)
    .with_context(|| format!("failed to read template file: {}", template_file.display()))?;

  let template: TemplateDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse template file: {}", template_file.display()))?;

  let params: serde_json::Map<String, serde_json::Value> =
    serde_json::from_str(params).context("--params must be a JSON object")?;

  let workflow = create_from_template(&template, &params).context("failed to instantiate template")?;

  println!("{}", serde_json::to_string_pretty(&workflow.to_def())?);

  Ok(())
}

fn run_workflow(workflow_file: PathBuf, timeout_ms: Option<u64>) -> Result<bool> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_workflow_async(workflow_file, timeout_ms).await })
}

async fn run_workflow_async(workflow_file: PathBuf, timeout_ms: Option<u64>) -> Result<bool> {
  let workflow = load_workflow(&workflow_file)?;
  info!(workflow_id = %workflow.id, nodes = workflow.len(), "loaded workflow");

  let payload = read_payload_from_stdin()?;

  // Every agent name answers with its `output` option or its inputs.
  let mut agents = AgentRegistry::new();
  for node in workflow.nodes() {
    if let NodeKind::Agent(config) = &node.kind {
      agents.register(config.agent.clone(), Arc::new(EchoAgent));
    }
  }

  let mut input = WorkflowInput::new(payload);
  if let Some(ms) = timeout_ms {
    input = input.with_timeout(Duration::from_millis(ms));
  }

  let executor = WorkflowExecutor::new(Arc::new(agents));
  let result = executor
    .execute(&workflow, input)
    .await
    .context("workflow execution failed")?;

  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(result.success)
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read input from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse input JSON from stdin")
  }
}
