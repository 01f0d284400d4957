//! Execution input and aggregated results.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Input to one execution.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInput {
  /// Read by `input.*` paths.
  pub data: Map<String, Value>,
  /// Budget for the whole execution.
  pub timeout: Option<Duration>,
}

impl WorkflowInput {
  /// Wrap a JSON value. Non-object values are exposed as `input.value`.
  pub fn new(data: Value) -> Self {
    let data = match data {
      Value::Object(map) => map,
      Value::Null => Map::new(),
      other => {
        let mut map = Map::new();
        map.insert("value".to_string(), other);
        map
      }
    };
    Self {
      data,
      timeout: None,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

impl From<Value> for WorkflowInput {
  fn from(data: Value) -> Self {
    Self::new(data)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  /// A dependency failed, or was skipped because of a failure.
  UpstreamFailed,
  /// Every incoming edge was foreclosed by a condition.
  BranchNotTaken,
}

/// Final state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Completed,
  Failed,
  Skipped(SkipReason),
}

/// What happened to one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
  pub node_id: String,
  pub status: NodeStatus,
  /// Position in the start order. `None` for skipped nodes.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_sequence: Option<u64>,
  /// Position in the settlement order.
  pub sequence: u64,
  /// Offset from the start of the execution.
  #[serde(rename = "started_at_ms", serialize_with = "serialize_opt_millis")]
  pub started_at: Option<Duration>,
  #[serde(rename = "finished_at_ms", serialize_with = "serialize_millis")]
  pub finished_at: Duration,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resolved_input: Option<Map<String, Value>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl NodeRecord {
  pub fn is_completed(&self) -> bool {
    self.status == NodeStatus::Completed
  }
}

/// Result of a finished execution.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
  pub execution_id: String,
  pub workflow_id: String,
  /// True when no node failed.
  pub success: bool,
  /// Every published value, keyed by published key.
  pub outputs: Map<String, Value>,
  /// `"<node>: <message>"` for each failed node, joined with `"; "`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub failed_nodes: BTreeSet<String>,
  pub skipped_nodes: BTreeSet<String>,
  /// In settlement order.
  pub node_records: Vec<NodeRecord>,
  #[serde(rename = "execution_time_ms", serialize_with = "serialize_millis")]
  pub execution_time: Duration,
}

impl WorkflowResult {
  pub fn node_record(&self, node_id: &str) -> Option<&NodeRecord> {
    self.node_records.iter().find(|r| r.node_id == node_id)
  }

  /// Ids of completed nodes, in completion order.
  pub fn execution_order(&self) -> Vec<&str> {
    self
      .node_records
      .iter()
      .filter(|r| r.is_completed())
      .map(|r| r.node_id.as_str())
      .collect()
  }

  pub fn output(&self, key: &str) -> Option<&Value> {
    self.outputs.get(key)
  }
}

/// Fold settled node records into a result.
///
/// `node_order` is the workflow's insertion order; error messages follow it.
pub(crate) fn aggregate(
  execution_id: String,
  workflow_id: String,
  mut records: Vec<NodeRecord>,
  outputs: Map<String, Value>,
  node_order: &[&str],
  execution_time: Duration,
) -> WorkflowResult {
  records.sort_by_key(|r| r.sequence);

  let mut failed_nodes = BTreeSet::new();
  let mut skipped_nodes = BTreeSet::new();
  let mut errors: HashMap<&str, &str> = HashMap::new();

  for record in &records {
    match record.status {
      NodeStatus::Failed => {
        failed_nodes.insert(record.node_id.clone());
        errors.insert(
          record.node_id.as_str(),
          record.error.as_deref().unwrap_or("unknown error"),
        );
      }
      NodeStatus::Skipped(_) => {
        skipped_nodes.insert(record.node_id.clone());
      }
      NodeStatus::Completed => {}
    }
  }

  let error = if errors.is_empty() {
    None
  } else {
    Some(
      node_order
        .iter()
        .filter_map(|id| errors.get(id).map(|message| format!("{}: {}", id, message)))
        .collect::<Vec<_>>()
        .join("; "),
    )
  };

  WorkflowResult {
    execution_id,
    workflow_id,
    success: failed_nodes.is_empty(),
    outputs,
    error,
    failed_nodes,
    skipped_nodes,
    node_records: records,
    execution_time,
  }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}

fn serialize_opt_millis<S: Serializer>(
  duration: &Option<Duration>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  match duration {
    Some(duration) => serialize_millis(duration, serializer),
    None => serializer.serialize_none(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn record(node_id: &str, status: NodeStatus, sequence: u64, error: Option<&str>) -> NodeRecord {
    NodeRecord {
      node_id: node_id.to_string(),
      status,
      start_sequence: None,
      sequence,
      started_at: None,
      finished_at: Duration::from_millis(sequence),
      resolved_input: None,
      output: None,
      error: error.map(str::to_string),
    }
  }

  #[test]
  fn test_workflow_input_wraps_scalars() {
    assert_eq!(WorkflowInput::new(json!("hello")).data["value"], json!("hello"));
    assert!(WorkflowInput::new(Value::Null).data.is_empty());

    let input = WorkflowInput::new(json!({"query": "q"})).with_timeout(Duration::from_secs(1));
    assert_eq!(input.data["query"], json!("q"));
    assert_eq!(input.timeout, Some(Duration::from_secs(1)));
  }

  #[test]
  fn test_aggregate_success() {
    let records = vec![
      record("summary", NodeStatus::Completed, 2, None),
      record("search", NodeStatus::Completed, 1, None),
    ];
    let result = aggregate(
      "e1".into(),
      "w1".into(),
      records,
      Map::new(),
      &["search", "summary"],
      Duration::from_millis(5),
    );

    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.execution_order(), vec!["search", "summary"]);
    assert!(result.node_record("summary").is_some());
  }

  #[test]
  fn test_aggregate_failures() {
    let records = vec![
      record("b", NodeStatus::Failed, 1, Some("second")),
      record("a", NodeStatus::Failed, 2, Some("first")),
      record("c", NodeStatus::Skipped(SkipReason::UpstreamFailed), 3, None),
    ];
    let result = aggregate(
      "e1".into(),
      "w1".into(),
      records,
      Map::new(),
      &["a", "b", "c"],
      Duration::ZERO,
    );

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("a: first; b: second"));
    assert_eq!(
      result.failed_nodes.iter().collect::<Vec<_>>(),
      vec!["a", "b"]
    );
    assert!(result.skipped_nodes.contains("c"));
    assert!(result.execution_order().is_empty());
  }

  #[test]
  fn test_result_serialization() {
    let result = aggregate(
      "e1".into(),
      "w1".into(),
      vec![record("c", NodeStatus::Skipped(SkipReason::BranchNotTaken), 1, None)],
      Map::new(),
      &["c"],
      Duration::from_millis(42),
    );

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["execution_time_ms"], json!(42));
    assert_eq!(value["success"], json!(true));
    assert_eq!(
      value["node_records"][0]["status"],
      json!({"skipped": "branch_not_taken"})
    );
    assert_eq!(value["node_records"][0]["started_at_ms"], Value::Null);
  }
}
