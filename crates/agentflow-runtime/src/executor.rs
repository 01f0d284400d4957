//! Workflow scheduling and execution.
//!
//! The executor dispatches every node whose dependencies have settled as
//! soon as it becomes ready. There is no batch barrier: when any in-flight
//! node finishes, the scheduler publishes its output and rescans for newly
//! ready nodes while the others keep running.
//!
//! # Readiness
//! A pending node is skipped with [`SkipReason::UpstreamFailed`] as soon as
//! a dependency fails or is skipped because of a failure. Once all of its
//! dependencies have settled it is
//! - skipped with [`SkipReason::BranchNotTaken`] if every incoming edge is
//!   foreclosed by a condition,
//! - dispatched otherwise.
//!
//! Condition nodes are evaluated inline by the scheduler; agent nodes run
//! as tokio tasks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentflow_workflow::{AgentWorkflow, CONDITION_RESULT_FIELD, NodeKind, WorkflowNode};
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Span, error, info, instrument, warn};

use crate::agent::Agent;
use crate::condition::{ConditionEvaluator, ExpressionEvaluator};
use crate::error::{AgentError, ExecutionError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::input::resolve_inputs;
use crate::result::{NodeRecord, NodeStatus, SkipReason, WorkflowInput, WorkflowResult, aggregate};
use crate::state::WorkflowState;

/// Field under which non-object agent outputs are published.
const SCALAR_OUTPUT_FIELD: &str = "output";

/// Runtime tuning.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
  /// Budget for agent nodes that do not declare their own timeout.
  pub default_node_timeout: Option<Duration>,
}

/// Executes workflows against an [`Agent`].
///
/// An executor holds no per-execution state and can run any number of
/// executions concurrently through a shared reference.
pub struct WorkflowExecutor<N: ExecutionNotifier = NoopNotifier> {
  agent: Arc<dyn Agent>,
  evaluator: Arc<dyn ConditionEvaluator>,
  config: ExecutorConfig,
  notifier: N,
}

impl WorkflowExecutor<NoopNotifier> {
  pub fn new(agent: Arc<dyn Agent>) -> Self {
    Self {
      agent,
      evaluator: Arc::new(ExpressionEvaluator::new()),
      config: ExecutorConfig::default(),
      notifier: NoopNotifier,
    }
  }
}

impl<N: ExecutionNotifier> WorkflowExecutor<N> {
  pub fn with_notifier<M: ExecutionNotifier>(self, notifier: M) -> WorkflowExecutor<M> {
    WorkflowExecutor {
      agent: self.agent,
      evaluator: self.evaluator,
      config: self.config,
      notifier,
    }
  }

  pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
    self.evaluator = evaluator;
    self
  }

  pub fn with_config(mut self, config: ExecutorConfig) -> Self {
    self.config = config;
    self
  }

  /// Execute a workflow to completion.
  ///
  /// Node failures are reported in the returned [`WorkflowResult`]. An `Err`
  /// means the execution itself could not finish: the graph is invalid or
  /// the workflow budget ran out.
  pub async fn execute(
    &self,
    workflow: &AgentWorkflow,
    input: WorkflowInput,
  ) -> Result<WorkflowResult, ExecutionError> {
    self
      .execute_with_cancel(workflow, input, CancellationToken::new())
      .await
  }

  /// Execute a workflow, stopping early when `cancel` fires.
  ///
  /// Cancellation and timeout abort in-flight agent invocations.
  #[instrument(
    name = "workflow_execute",
    skip(self, workflow, input, cancel),
    fields(
      workflow_id = %workflow.id,
      execution_id = tracing::field::Empty,
    )
  )]
  pub async fn execute_with_cancel(
    &self,
    workflow: &AgentWorkflow,
    input: WorkflowInput,
    cancel: CancellationToken,
  ) -> Result<WorkflowResult, ExecutionError> {
    workflow.validate().map_err(|e| ExecutionError::InvalidGraph {
      message: e.to_string(),
    })?;

    let execution_id = uuid::Uuid::new_v4().to_string();
    Span::current().record("execution_id", tracing::field::display(&execution_id));

    info!(
      execution_id = %execution_id,
      workflow_id = %workflow.id,
      nodes = workflow.len(),
      "workflow_started"
    );
    self.notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: execution_id.clone(),
      workflow_id: workflow.id.clone(),
    });

    let execution = Execution::new(self, workflow, &execution_id, input.data);

    let outcome = match input.timeout {
      Some(budget) => match tokio::time::timeout(budget, execution.run(&cancel)).await {
        Ok(outcome) => outcome,
        Err(_) => {
          warn!(
            execution_id = %execution_id,
            budget_ms = budget.as_millis() as u64,
            "workflow_timed_out"
          );
          Err(ExecutionError::Timeout { budget })
        }
      },
      None => execution.run(&cancel).await,
    };

    match &outcome {
      Ok(result) if result.success => {
        info!(
          execution_id = %execution_id,
          execution_time_ms = result.execution_time.as_millis() as u64,
          "workflow_completed"
        );
        self.notifier.notify(ExecutionEvent::WorkflowCompleted {
          execution_id: execution_id.clone(),
        });
      }
      Ok(result) => {
        let message = result.error.clone().unwrap_or_default();
        error!(
          execution_id = %execution_id,
          failed_nodes = ?result.failed_nodes,
          error = %message,
          "workflow_failed"
        );
        self.notifier.notify(ExecutionEvent::WorkflowFailed {
          execution_id: execution_id.clone(),
          error: message,
        });
      }
      Err(e) => {
        error!(execution_id = %execution_id, error = %e, "workflow_failed");
        self.notifier.notify(ExecutionEvent::WorkflowFailed {
          execution_id: execution_id.clone(),
          error: e.to_string(),
        });
      }
    }

    outcome
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
  Pending,
  Running,
  Settled(NodeStatus),
}

enum Readiness {
  Waiting,
  Ready,
  Skip(SkipReason),
}

/// Bookkeeping for a dispatched node until it settles.
struct Started {
  sequence: u64,
  at: Duration,
  resolved_input: Map<String, Value>,
}

type TaskOutcome = (usize, Result<Value, AgentError>);

/// State of one execution. Dropping it aborts in-flight agent tasks.
struct Execution<'a, N: ExecutionNotifier> {
  executor: &'a WorkflowExecutor<N>,
  workflow: &'a AgentWorkflow,
  execution_id: &'a str,
  state: WorkflowState,
  slots: Vec<Slot>,
  started: Vec<Option<Started>>,
  /// Branch chosen by each settled condition node.
  branches: Vec<Option<String>>,
  records: Vec<NodeRecord>,
  sequence: u64,
  clock: Instant,
  tasks: JoinSet<TaskOutcome>,
}

impl<'a, N: ExecutionNotifier> Execution<'a, N> {
  fn new(
    executor: &'a WorkflowExecutor<N>,
    workflow: &'a AgentWorkflow,
    execution_id: &'a str,
    input: Map<String, Value>,
  ) -> Self {
    let count = workflow.len();
    Self {
      executor,
      workflow,
      execution_id,
      state: WorkflowState::new(input),
      slots: vec![Slot::Pending; count],
      started: (0..count).map(|_| None).collect(),
      branches: vec![None; count],
      records: Vec::with_capacity(count),
      sequence: 0,
      clock: Instant::now(),
      tasks: JoinSet::new(),
    }
  }

  async fn run(mut self, cancel: &CancellationToken) -> Result<WorkflowResult, ExecutionError> {
    if cancel.is_cancelled() {
      return Err(ExecutionError::Cancelled);
    }

    self.dispatch_ready();

    while !self.tasks.is_empty() {
      let joined = tokio::select! {
        joined = self.tasks.join_next() => joined,
        _ = cancel.cancelled() => {
          warn!(
            execution_id = %self.execution_id,
            in_flight = self.tasks.len(),
            "workflow cancelled"
          );
          return Err(ExecutionError::Cancelled);
        }
      };

      let Some(joined) = joined else { break };
      let (idx, outcome) = joined.map_err(|e| ExecutionError::Join {
        message: e.to_string(),
      })?;

      self.settle_agent(idx, outcome);
      self.dispatch_ready();
    }

    let stuck: Vec<&str> = self
      .slots
      .iter()
      .enumerate()
      .filter(|(_, slot)| !matches!(slot, Slot::Settled(_)))
      .map(|(idx, _)| self.node(idx).id.as_str())
      .collect();
    if !stuck.is_empty() {
      return Err(ExecutionError::InvalidGraph {
        message: format!("nodes never became ready: {}", stuck.join(", ")),
      });
    }

    Ok(self.finish())
  }

  fn node(&self, idx: usize) -> &'a WorkflowNode {
    &self.workflow.nodes()[idx]
  }

  fn next_sequence(&mut self) -> u64 {
    self.sequence += 1;
    self.sequence
  }

  /// Start or skip every node that can make progress, in insertion order.
  ///
  /// Conditions settle inline and can unblock later nodes, so the scan
  /// repeats until a full pass changes nothing.
  fn dispatch_ready(&mut self) {
    loop {
      let mut progressed = false;

      for idx in 0..self.slots.len() {
        if self.slots[idx] != Slot::Pending {
          continue;
        }
        match self.readiness(idx) {
          Readiness::Waiting => {}
          Readiness::Skip(reason) => {
            self.skip(idx, reason);
            progressed = true;
          }
          Readiness::Ready => {
            self.start(idx);
            progressed = true;
          }
        }
      }

      if !progressed {
        break;
      }
    }
  }

  fn readiness(&self, idx: usize) -> Readiness {
    let node = self.node(idx);
    let upstream = self.workflow.graph().upstream(idx);
    if upstream.is_empty() {
      return Readiness::Ready;
    }

    let mut waiting = false;
    let mut active = false;
    for &dep in upstream {
      match &self.slots[dep] {
        Slot::Pending | Slot::Running => waiting = true,
        Slot::Settled(NodeStatus::Failed)
        | Slot::Settled(NodeStatus::Skipped(SkipReason::UpstreamFailed)) => {
          return Readiness::Skip(SkipReason::UpstreamFailed);
        }
        Slot::Settled(NodeStatus::Skipped(SkipReason::BranchNotTaken)) => {}
        Slot::Settled(NodeStatus::Completed) => {
          let foreclosed = match self.node(dep).as_condition() {
            Some(condition) if condition.is_branch(&node.id) => {
              self.branches[dep].as_deref() != Some(node.id.as_str())
            }
            _ => false,
          };
          active |= !foreclosed;
        }
      }
    }

    if waiting {
      Readiness::Waiting
    } else if active {
      Readiness::Ready
    } else {
      Readiness::Skip(SkipReason::BranchNotTaken)
    }
  }

  fn start(&mut self, idx: usize) {
    let node = self.node(idx);
    let sequence = self.next_sequence();
    let at = self.clock.elapsed();
    self.slots[idx] = Slot::Running;

    info!(
      execution_id = %self.execution_id,
      node_id = %node.id,
      sequence,
      "node_started"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: self.execution_id.to_string(),
      node_id: node.id.clone(),
      sequence,
    });

    let resolved = resolve_inputs(node, &self.state);
    self.started[idx] = Some(Started {
      sequence,
      at,
      resolved_input: resolved.as_ref().cloned().unwrap_or_default(),
    });

    let resolved = match resolved {
      Ok(resolved) => resolved,
      Err(e) => {
        self.fail(idx, format!("input resolution failed: {}", e));
        return;
      }
    };

    match &node.kind {
      NodeKind::Condition(condition) => {
        let evaluated = self
          .executor
          .evaluator
          .evaluate(&condition.predicate, &self.state);
        match evaluated {
          Ok(outcome) => {
            let branch = condition.branch(outcome).to_string();
            info!(
              execution_id = %self.execution_id,
              node_id = %node.id,
              outcome,
              branch = %branch,
              "branch_selected"
            );
            self.executor.notifier.notify(ExecutionEvent::BranchSelected {
              execution_id: self.execution_id.to_string(),
              node_id: node.id.clone(),
              outcome,
              branch: branch.clone(),
            });
            self.branches[idx] = Some(branch);
            let mut output = Map::new();
            output.insert(CONDITION_RESULT_FIELD.to_string(), Value::Bool(outcome));
            self.complete(idx, Value::Object(output));
          }
          Err(e) => self.fail(idx, e.to_string()),
        }
      }
      NodeKind::Agent(config) => {
        let mut config = config.clone();
        let budget = config.timeout.or(self.executor.config.default_node_timeout);
        config.timeout = budget;
        let agent = self.executor.agent.clone();

        self.tasks.spawn(async move {
          // Panics raised before the agent returns its future are caught too.
          let call = AssertUnwindSafe(async move { agent.invoke(config, resolved).await }).catch_unwind();
          let outcome = match budget {
            Some(budget) => match tokio::time::timeout(budget, call).await {
              Ok(outcome) => outcome,
              Err(_) => return (idx, Err(AgentError::Timeout(budget))),
            },
            None => call.await,
          };
          let result = outcome.unwrap_or_else(|panic| {
            Err(AgentError::failed(format!(
              "agent panicked: {}",
              panic_message(panic.as_ref())
            )))
          });
          (idx, result)
        });
      }
    }
  }

  fn settle_agent(&mut self, idx: usize, outcome: Result<Value, AgentError>) {
    match outcome {
      Ok(output) => self.complete(idx, output),
      Err(e) => self.fail(idx, e.to_string()),
    }
  }

  fn complete(&mut self, idx: usize, output: Value) {
    let node = self.node(idx);
    let output = match output {
      Value::Object(map) => map,
      other => {
        let mut map = Map::new();
        map.insert(SCALAR_OUTPUT_FIELD.to_string(), other);
        map
      }
    };
    self.state.publish(node, &output);

    let output = Value::Object(output);
    let sequence = self.settle(idx, NodeStatus::Completed, Some(output.clone()), None);

    info!(
      execution_id = %self.execution_id,
      node_id = %node.id,
      sequence,
      "node_completed"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeCompleted {
      execution_id: self.execution_id.to_string(),
      node_id: node.id.clone(),
      sequence,
      output,
    });
  }

  fn fail(&mut self, idx: usize, message: String) {
    let node = self.node(idx);
    let sequence = self.settle(idx, NodeStatus::Failed, None, Some(message.clone()));

    error!(
      execution_id = %self.execution_id,
      node_id = %node.id,
      sequence,
      error = %message,
      "node_failed"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeFailed {
      execution_id: self.execution_id.to_string(),
      node_id: node.id.clone(),
      sequence,
      error: message,
    });
  }

  fn skip(&mut self, idx: usize, reason: SkipReason) {
    let node = self.node(idx);
    let sequence = self.settle(idx, NodeStatus::Skipped(reason), None, None);

    info!(
      execution_id = %self.execution_id,
      node_id = %node.id,
      sequence,
      reason = ?reason,
      "node_skipped"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeSkipped {
      execution_id: self.execution_id.to_string(),
      node_id: node.id.clone(),
      sequence,
      reason,
    });
  }

  /// Record a node's final status. Returns its settlement sequence.
  fn settle(
    &mut self,
    idx: usize,
    status: NodeStatus,
    output: Option<Value>,
    error: Option<String>,
  ) -> u64 {
    let sequence = self.next_sequence();
    let started = self.started[idx].take();
    self.slots[idx] = Slot::Settled(status);

    self.records.push(NodeRecord {
      node_id: self.node(idx).id.clone(),
      status,
      start_sequence: started.as_ref().map(|s| s.sequence),
      sequence,
      started_at: started.as_ref().map(|s| s.at),
      finished_at: self.clock.elapsed(),
      resolved_input: started.map(|s| s.resolved_input),
      output,
      error,
    });

    sequence
  }

  fn finish(self) -> WorkflowResult {
    let node_order: Vec<&str> = self.workflow.nodes().iter().map(|n| n.id.as_str()).collect();
    aggregate(
      self.execution_id.to_string(),
      self.workflow.id.clone(),
      self.records,
      self.state.into_outputs(),
      &node_order,
      self.clock.elapsed(),
    )
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::agent::EchoAgent;
  use serde_json::json;

  fn executor() -> WorkflowExecutor {
    WorkflowExecutor::new(Arc::new(EchoAgent))
  }

  #[tokio::test]
  async fn test_empty_workflow_succeeds() {
    let workflow = AgentWorkflow::new("empty", "Empty");
    let result = executor()
      .execute(&workflow, WorkflowInput::default())
      .await
      .unwrap();

    assert!(result.success);
    assert!(result.node_records.is_empty());
    assert!(result.outputs.is_empty());
  }

  #[tokio::test]
  async fn test_scalar_output_is_wrapped() {
    let mut workflow = AgentWorkflow::new("w", "W");
    workflow
      .add_node(
        WorkflowNode::agent("answer", "echo").with_option("output", json!(42)),
        Vec::<String>::new(),
      )
      .unwrap();

    let result = executor()
      .execute(&workflow, WorkflowInput::default())
      .await
      .unwrap();

    assert_eq!(result.output("answer.output"), Some(&json!(42)));
  }

  #[tokio::test]
  async fn test_resolution_failure_fails_node() {
    let mut workflow = AgentWorkflow::new("w", "W");
    workflow
      .add_node(
        WorkflowNode::agent("search", "echo").with_input("query", "input.query"),
        Vec::<String>::new(),
      )
      .unwrap();

    let result = executor()
      .execute(&workflow, WorkflowInput::default())
      .await
      .unwrap();

    assert!(!result.success);
    let record = result.node_record("search").unwrap();
    assert_eq!(record.status, NodeStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("input.query"));
  }

  #[tokio::test]
  async fn test_cancelled_before_start() {
    let mut workflow = AgentWorkflow::new("w", "W");
    workflow
      .add_node(WorkflowNode::agent("a", "echo"), Vec::<String>::new())
      .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = executor()
      .execute_with_cancel(&workflow, WorkflowInput::default(), cancel)
      .await
      .unwrap_err();
    assert!(matches!(err, ExecutionError::Cancelled));
  }

  #[test]
  fn test_panic_message() {
    let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
    assert_eq!(panic_message(payload.as_ref()), "boom");
    let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
    assert_eq!(panic_message(payload.as_ref()), "bang");
  }
}
