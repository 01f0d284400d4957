use std::collections::HashMap;
use std::time::Duration;

use agentflow_config::{NodeDef, NodeType};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// The only field a condition node publishes.
pub const CONDITION_RESULT_FIELD: &str = "result";

/// A validated workflow node.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowNode {
  pub id: String,
  pub kind: NodeKind,
  /// Logical input name -> path expression.
  pub input_mapping: HashMap<String, String>,
  /// Output field -> published state key.
  pub output_mapping: HashMap<String, String>,
  /// Filled in by [`crate::AgentWorkflow::add_node`].
  pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
  Agent(AgentConfig),
  Condition(ConditionConfig),
}

/// Configuration handed to the agent capability on every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
  /// Capability name, e.g. "search" or "summarize".
  pub agent: String,
  /// Passthrough options for the capability.
  #[serde(default)]
  pub options: serde_json::Map<String, serde_json::Value>,
  /// Invocation budget. Agents may use it as a hint; the scheduler enforces it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
  pub predicate: String,
  pub true_branch: String,
  pub false_branch: String,
}

impl ConditionConfig {
  /// The branch selected for a predicate outcome.
  pub fn branch(&self, outcome: bool) -> &str {
    if outcome {
      &self.true_branch
    } else {
      &self.false_branch
    }
  }

  /// Whether `node_id` is one of this condition's branches.
  pub fn is_branch(&self, node_id: &str) -> bool {
    self.true_branch == node_id || self.false_branch == node_id
  }
}

impl WorkflowNode {
  /// Create an agent node.
  pub fn agent(id: impl Into<String>, agent: impl Into<String>) -> Self {
    Self::new(
      id,
      NodeKind::Agent(AgentConfig {
        agent: agent.into(),
        options: serde_json::Map::new(),
        timeout: None,
      }),
    )
  }

  /// Create a condition node.
  pub fn condition(
    id: impl Into<String>,
    predicate: impl Into<String>,
    true_branch: impl Into<String>,
    false_branch: impl Into<String>,
  ) -> Self {
    Self::new(
      id,
      NodeKind::Condition(ConditionConfig {
        predicate: predicate.into(),
        true_branch: true_branch.into(),
        false_branch: false_branch.into(),
      }),
    )
  }

  fn new(id: impl Into<String>, kind: NodeKind) -> Self {
    Self {
      id: id.into(),
      kind,
      input_mapping: HashMap::new(),
      output_mapping: HashMap::new(),
      dependencies: Vec::new(),
    }
  }

  /// Map a logical input to a path expression.
  pub fn with_input(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
    self.input_mapping.insert(name.into(), path.into());
    self
  }

  /// Publish an output field under a different state key.
  pub fn with_output(mut self, field: impl Into<String>, key: impl Into<String>) -> Self {
    self.output_mapping.insert(field.into(), key.into());
    self
  }

  /// Set a passthrough option. No-op for condition nodes.
  pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    if let NodeKind::Agent(config) = &mut self.kind {
      config.options.insert(key.into(), value);
    }
    self
  }

  /// Bound the invocation. No-op for condition nodes.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    if let NodeKind::Agent(config) = &mut self.kind {
      config.timeout = Some(timeout);
    }
    self
  }

  pub fn as_condition(&self) -> Option<&ConditionConfig> {
    match &self.kind {
      NodeKind::Condition(config) => Some(config),
      NodeKind::Agent(_) => None,
    }
  }

  /// Published state key for an output field.
  pub fn published_key(&self, field: &str) -> String {
    self
      .output_mapping
      .get(field)
      .cloned()
      .unwrap_or_else(|| format!("{}.{}", self.id, field))
  }

  /// Convert a node definition, checking the type-specific fields.
  pub fn from_def(def: NodeDef) -> Result<Self, WorkflowError> {
    let kind = match def.node_type {
      NodeType::Agent { agent, options } => NodeKind::Agent(AgentConfig {
        agent,
        options,
        timeout: def.timeout_ms.map(Duration::from_millis),
      }),
      NodeType::Condition {
        predicate,
        true_branch,
        false_branch,
      } => {
        if def.timeout_ms.is_some() {
          return Err(WorkflowError::invalid_node(
            &def.node_id,
            "condition nodes do not take a timeout",
          ));
        }
        NodeKind::Condition(ConditionConfig {
          predicate,
          true_branch,
          false_branch,
        })
      }
    };

    let node = Self {
      id: def.node_id,
      kind,
      input_mapping: def.input_mapping,
      output_mapping: def.output_mapping,
      dependencies: def.dependencies,
    };
    node.validate()?;
    Ok(node)
  }

  /// Convert back to a serializable definition.
  pub fn to_def(&self) -> NodeDef {
    let (node_type, timeout_ms) = match &self.kind {
      NodeKind::Agent(config) => (
        NodeType::Agent {
          agent: config.agent.clone(),
          options: config.options.clone(),
        },
        config.timeout.map(|t| t.as_millis() as u64),
      ),
      NodeKind::Condition(config) => (
        NodeType::Condition {
          predicate: config.predicate.clone(),
          true_branch: config.true_branch.clone(),
          false_branch: config.false_branch.clone(),
        },
        None,
      ),
    };

    NodeDef {
      node_id: self.id.clone(),
      node_type,
      input_mapping: self.input_mapping.clone(),
      output_mapping: self.output_mapping.clone(),
      dependencies: self.dependencies.clone(),
      timeout_ms,
    }
  }

  /// Check node-local invariants. Graph-level checks live in the workflow.
  pub(crate) fn validate(&self) -> Result<(), WorkflowError> {
    if self.id.trim().is_empty() {
      return Err(WorkflowError::invalid_node(&self.id, "node id must not be empty"));
    }
    if self.id.contains('.') {
      return Err(WorkflowError::invalid_node(
        &self.id,
        "node id must not contain '.'",
      ));
    }
    if self.id == "input" {
      return Err(WorkflowError::invalid_node(
        &self.id,
        "'input' is reserved for workflow input paths",
      ));
    }

    for (name, path) in &self.input_mapping {
      if path.trim().is_empty() {
        return Err(WorkflowError::invalid_node(
          &self.id,
          format!("input '{}' has an empty path", name),
        ));
      }
    }

    for (field, key) in &self.output_mapping {
      if key.trim().is_empty() {
        return Err(WorkflowError::invalid_node(
          &self.id,
          format!("output '{}' is published under an empty key", field),
        ));
      }
      if key.contains('.') {
        return Err(WorkflowError::invalid_node(
          &self.id,
          format!("output '{}' key '{}' must not contain '.'", field, key),
        ));
      }
    }

    match &self.kind {
      NodeKind::Agent(config) => {
        if config.agent.trim().is_empty() {
          return Err(WorkflowError::invalid_node(&self.id, "agent name must not be empty"));
        }
        if config.timeout.is_some_and(|t| t.is_zero()) {
          return Err(WorkflowError::invalid_node(&self.id, "timeout must be greater than zero"));
        }
      }
      NodeKind::Condition(config) => {
        if config.predicate.trim().is_empty() {
          return Err(WorkflowError::invalid_node(&self.id, "predicate must not be empty"));
        }
        for branch in [&config.true_branch, &config.false_branch] {
          if branch.trim().is_empty() {
            return Err(WorkflowError::invalid_node(&self.id, "branch id must not be empty"));
          }
          if *branch == self.id {
            return Err(WorkflowError::CircularDependency {
              cycle: vec![self.id.clone(), self.id.clone()],
            });
          }
        }
        if config.true_branch == config.false_branch {
          return Err(WorkflowError::invalid_node(
            &self.id,
            "true_branch and false_branch must differ",
          ));
        }
        if let Some(field) = self
          .output_mapping
          .keys()
          .find(|field| *field != CONDITION_RESULT_FIELD)
        {
          return Err(WorkflowError::invalid_node(
            &self.id,
            format!("condition nodes only publish '{}', not '{}'", CONDITION_RESULT_FIELD, field),
          ));
        }
      }
    }

    Ok(())
  }
}
