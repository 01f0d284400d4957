use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single node in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  #[serde(flatten)]
  pub node_type: NodeType,
  /// Logical input name -> path expression (`input.query`, `search.results`).
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub input_mapping: HashMap<String, String>,
  /// Output field -> key the value is published under.
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub output_mapping: HashMap<String, String>,
  /// Node ids that must complete before this node is eligible.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeType {
  /// Invokes an agent capability by name (search, summarize, rag, tool, ...).
  Agent {
    agent: String,
    /// Capability-specific passthrough options.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    options: serde_json::Map<String, serde_json::Value>,
  },
  /// Evaluates a predicate and activates exactly one branch.
  Condition {
    predicate: String,
    true_branch: String,
    false_branch: String,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_agent_node_from_json() {
    let node: NodeDef = serde_json::from_value(json!({
      "node_id": "search",
      "type": "agent",
      "agent": "search",
      "options": { "limit": 3 },
      "input_mapping": { "query": "input.query" },
      "timeout_ms": 500
    }))
    .unwrap();

    assert_eq!(node.node_id, "search");
    assert_eq!(node.timeout_ms, Some(500));
    assert!(node.dependencies.is_empty());
    match node.node_type {
      NodeType::Agent { agent, options } => {
        assert_eq!(agent, "search");
        assert_eq!(options["limit"], 3);
      }
      other => panic!("expected agent node, got {:?}", other),
    }
  }

  #[test]
  fn test_condition_node_from_json() {
    let node: NodeDef = serde_json::from_value(json!({
      "node_id": "has_results",
      "type": "condition",
      "predicate": "search.results.length > 0",
      "true_branch": "summary",
      "false_branch": "fallback",
      "dependencies": ["search"]
    }))
    .unwrap();

    assert_eq!(node.dependencies, vec!["search".to_string()]);
    assert!(matches!(
      node.node_type,
      NodeType::Condition { ref true_branch, .. } if true_branch == "summary"
    ));
  }

  #[test]
  fn test_unknown_node_type_rejected() {
    let result: Result<NodeDef, _> = serde_json::from_value(json!({
      "node_id": "x",
      "type": "loop"
    }));
    assert!(result.is_err());
  }

  #[test]
  fn test_empty_collections_not_serialized() {
    let node = NodeDef {
      node_id: "a".to_string(),
      node_type: NodeType::Agent {
        agent: "echo".to_string(),
        options: serde_json::Map::new(),
      },
      input_mapping: HashMap::new(),
      output_mapping: HashMap::new(),
      dependencies: Vec::new(),
      timeout_ms: None,
    };

    let value = serde_json::to_value(&node).unwrap();
    assert_eq!(value, json!({ "node_id": "a", "type": "agent", "agent": "echo" }));
  }
}
