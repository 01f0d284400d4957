//! Runtime error types.

use std::time::Duration;

/// Errors that abort an execution as a whole.
///
/// Node-level failures never show up here; they are recorded in the
/// [`crate::WorkflowResult`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  /// The workflow-level budget from `WorkflowInput::timeout` ran out.
  #[error("workflow timed out after {}ms", budget.as_millis())]
  Timeout { budget: Duration },

  /// The workflow failed graph-level validation.
  #[error("invalid graph: {message}")]
  InvalidGraph { message: String },

  /// Execution was cancelled by the caller.
  #[error("execution cancelled")]
  Cancelled,

  /// A node task could not be joined.
  #[error("task join error: {message}")]
  Join { message: String },
}

/// Failure reported by an agent capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
  /// The capability ran and reported an error.
  #[error("{message}")]
  Failed { message: String },

  /// No capability registered under the node's agent name.
  #[error("no agent registered for '{0}'")]
  UnknownAgent(String),

  /// Resolved inputs or options were not usable by the capability.
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  /// The invocation exceeded its budget.
  #[error("timed out after {}ms", .0.as_millis())]
  Timeout(Duration),
}

impl AgentError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }
}

/// A path expression could not be resolved against the workflow state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
  #[error("invalid path '{path}': {message}")]
  InvalidPath { path: String, message: String },

  #[error("workflow input has no value at '{path}'")]
  MissingInput { path: String },

  #[error("node '{node_id}' has not produced output (referenced by '{path}')")]
  MissingNodeOutput { node_id: String, path: String },

  #[error("no value at '{path}'")]
  MissingField { path: String },

  #[error("failed to render '{path}': {message}")]
  Template { path: String, message: String },
}

/// A condition predicate could not be evaluated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConditionError {
  #[error("invalid predicate '{predicate}': {message}")]
  Parse { predicate: String, message: String },

  #[error("failed to evaluate '{predicate}': {message}")]
  Evaluation { predicate: String, message: String },
}
