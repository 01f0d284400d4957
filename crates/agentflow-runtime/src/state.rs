//! Accumulated workflow state.

use std::collections::{BTreeMap, HashMap};

use agentflow_workflow::WorkflowNode;
use serde_json::{Map, Value};
use tracing::warn;

/// Everything published so far in one execution.
///
/// Owned by a single execution and only mutated by the scheduler between
/// node settlements, so agents never observe a half-written state.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
  input: Map<String, Value>,
  /// Published key -> value.
  published: BTreeMap<String, Value>,
  /// Node id -> output field -> published key.
  fields: HashMap<String, BTreeMap<String, String>>,
}

impl WorkflowState {
  pub fn new(input: Map<String, Value>) -> Self {
    Self {
      input,
      ..Default::default()
    }
  }

  /// The original workflow input.
  pub fn input(&self) -> &Map<String, Value> {
    &self.input
  }

  /// Publish every field of a node's output.
  ///
  /// Keys already present are kept; the first write wins.
  pub fn publish(&mut self, node: &WorkflowNode, output: &Map<String, Value>) {
    let fields = self.fields.entry(node.id.clone()).or_default();

    for (field, value) in output {
      let key = node.published_key(field);
      if self.published.contains_key(&key) {
        warn!(
          node_id = %node.id,
          field = %field,
          key = %key,
          "published key already set, keeping first value"
        );
        continue;
      }
      self.published.insert(key.clone(), value.clone());
      fields.insert(field.clone(), key);
    }
  }

  /// Whether the node has published anything.
  pub fn has_node(&self, node_id: &str) -> bool {
    self.fields.contains_key(node_id)
  }

  /// Value a node published for one of its output fields.
  pub fn node_value(&self, node_id: &str, field: &str) -> Option<&Value> {
    let key = self.fields.get(node_id)?.get(field)?;
    self.published.get(key)
  }

  /// Value under a published key.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.published.get(key)
  }

  /// Context for predicates and templated mappings.
  ///
  /// ```json
  /// { "input": {...}, "search": { "results": [...] }, "summary_text": "..." }
  /// ```
  ///
  /// Node outputs are keyed by node id and field. Custom published keys
  /// are also exposed at the top level unless they collide with `input`
  /// or a node id.
  pub fn context(&self) -> Value {
    let mut context = Map::new();
    context.insert("input".to_string(), Value::Object(self.input.clone()));

    for (node_id, fields) in &self.fields {
      let values: Map<String, Value> = fields
        .iter()
        .filter_map(|(field, key)| Some((field.clone(), self.published.get(key)?.clone())))
        .collect();
      context.insert(node_id.clone(), Value::Object(values));
    }

    for (key, value) in &self.published {
      if !key.contains('.') && !context.contains_key(key) {
        context.insert(key.clone(), value.clone());
      }
    }

    Value::Object(context)
  }

  /// Consume the state into the final output map, keyed by published key.
  pub fn into_outputs(self) -> Map<String, Value> {
    self.published.into_iter().collect()
  }
}
