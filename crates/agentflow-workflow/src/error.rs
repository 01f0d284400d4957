use thiserror::Error;

/// Build-time validation errors.
///
/// Raised by graph construction and template instantiation; the workflow is
/// left unmodified whenever one of these is returned.
#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("missing dependency: node '{node_id}' depends on unknown node '{dependency}'")]
  MissingDependency { node_id: String, dependency: String },

  #[error("circular dependency: {}", cycle.join(" -> "))]
  CircularDependency { cycle: Vec<String> },

  #[error("invalid node '{node_id}': {message}")]
  InvalidNode { node_id: String, message: String },

  #[error("condition '{node_id}' has invalid branch '{branch}': {message}")]
  UnknownBranch {
    node_id: String,
    branch: String,
    message: String,
  },

  #[error("template parameter '{field}': {message}")]
  SchemaViolation { field: String, message: String },

  #[error("failed to substitute parameters in node '{node_id}': {message}")]
  Placeholder { node_id: String, message: String },

  #[error("node not found: {0}")]
  NodeNotFound(String),
}

impl WorkflowError {
  pub(crate) fn invalid_node(node_id: &str, message: impl Into<String>) -> Self {
    Self::InvalidNode {
      node_id: node_id.to_string(),
      message: message.into(),
    }
  }
}
