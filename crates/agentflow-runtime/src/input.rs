//! Input resolution.
//!
//! Turns a node's `input_mapping` into the concrete input map handed to its
//! agent. Each mapping value is either a path expression or a minijinja
//! template.
//!
//! # Paths
//! - `input.query` reads the original workflow input
//! - `search.results` reads what node `search` published for field `results`
//! - `search.results.0.content` descends into objects and arrays
//! - `search.results.length` yields the length of an array, string or object
//! - `summary_text` reads a custom published key directly
//!
//! # Templates
//! A mapping containing `{{` is rendered against [`WorkflowState::context`]:
//! ```json
//! { "prompt": "Summarize {{ search.count }} results for {{ input.query }}" }
//! ```
//! A mapping that is exactly one `{{ ... }}` keeps the expression's type.

use agentflow_workflow::WorkflowNode;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::error::ResolveError;
use crate::state::WorkflowState;

const INPUT_ROOT: &str = "input";
const LENGTH_SEGMENT: &str = "length";

/// Resolve every input of a node against the current state.
///
/// Fails on the first mapping that cannot be resolved, in input name order.
pub fn resolve_inputs(
  node: &WorkflowNode,
  state: &WorkflowState,
) -> Result<Map<String, Value>, ResolveError> {
  let mut names: Vec<&String> = node.input_mapping.keys().collect();
  names.sort();

  let mut env: Option<Environment> = None;
  let mut resolved = Map::new();

  for name in names {
    let mapping = &node.input_mapping[name];
    let value = if mapping.contains("{{") {
      let env = env.get_or_insert_with(strict_environment);
      resolve_template(env, mapping, state)?
    } else {
      resolve_path(mapping, state)?
    };
    resolved.insert(name.clone(), value);
  }

  Ok(resolved)
}

/// Resolve a single path expression.
pub fn resolve_path(path: &str, state: &WorkflowState) -> Result<Value, ResolveError> {
  let segments: Vec<&str> = path.trim().split('.').collect();
  if segments.iter().any(|s| s.is_empty()) {
    return Err(ResolveError::InvalidPath {
      path: path.to_string(),
      message: "path segments must not be empty".to_string(),
    });
  }

  match segments.as_slice() {
    [INPUT_ROOT, rest @ ..] => {
      let root = Value::Object(state.input().clone());
      descend(&root, rest).ok_or_else(|| ResolveError::MissingInput {
        path: path.to_string(),
      })
    }
    [key] => state
      .get(key)
      .cloned()
      .ok_or_else(|| ResolveError::InvalidPath {
        path: path.to_string(),
        message: "expected 'input.<field>', '<node>.<field>' or a published key".to_string(),
      }),
    [node_id, field, rest @ ..] => {
      if !state.has_node(node_id) {
        return Err(ResolveError::MissingNodeOutput {
          node_id: node_id.to_string(),
          path: path.to_string(),
        });
      }
      let value = state
        .node_value(node_id, field)
        .ok_or_else(|| ResolveError::MissingField {
          path: path.to_string(),
        })?;
      descend(value, rest).ok_or_else(|| ResolveError::MissingField {
        path: path.to_string(),
      })
    }
    [] => Err(ResolveError::InvalidPath {
      path: path.to_string(),
      message: "empty path".to_string(),
    }),
  }
}

/// Walk object keys and array indices. A trailing `length` that is not a
/// key yields the length of the current value.
fn descend(value: &Value, segments: &[&str]) -> Option<Value> {
  let mut current = value;

  for (i, segment) in segments.iter().enumerate() {
    let next = match current {
      Value::Object(map) => map.get(*segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
      _ => None,
    };

    match next {
      Some(next) => current = next,
      None if *segment == LENGTH_SEGMENT && i + 1 == segments.len() => {
        return length_of(current).map(Value::from);
      }
      None => return None,
    }
  }

  Some(current.clone())
}

fn length_of(value: &Value) -> Option<usize> {
  match value {
    Value::Array(items) => Some(items.len()),
    Value::Object(map) => Some(map.len()),
    Value::String(s) => Some(s.chars().count()),
    _ => None,
  }
}

fn strict_environment() -> Environment<'static> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  env
}

fn resolve_template(
  env: &Environment,
  template: &str,
  state: &WorkflowState,
) -> Result<Value, ResolveError> {
  let context = minijinja::Value::from_serialize(state.context());
  let template_err = |message: String| ResolveError::Template {
    path: template.to_string(),
    message,
  };

  if let Some(expr) = single_expression(template) {
    let compiled = env
      .compile_expression(expr)
      .map_err(|e| template_err(e.to_string()))?;
    let value = compiled
      .eval(context)
      .map_err(|e| template_err(e.to_string()))?;
    if value.is_undefined() {
      return Err(template_err(format!("'{}' is undefined", expr)));
    }
    return serde_json::to_value(&value).map_err(|e| template_err(e.to_string()));
  }

  env
    .render_str(template, context)
    .map(Value::String)
    .map_err(|e| template_err(e.to_string()))
}

fn single_expression(s: &str) -> Option<&str> {
  let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
  if inner.contains("{{") || inner.contains("}}") {
    return None;
  }
  Some(inner.trim())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn state() -> WorkflowState {
    let mut state = WorkflowState::new(
      json!({"query": "test query", "options": {"depth": 2}})
        .as_object()
        .cloned()
        .unwrap(),
    );
    let search = WorkflowNode::agent("search", "search");
    let summary = WorkflowNode::agent("summary", "summarize").with_output("summary", "summary_text");
    state.publish(
      &search,
      json!({
        "results": [
          {"id": "a", "content": "first", "score": 0.9},
          {"id": "b", "content": "second", "score": 0.4}
        ],
        "count": 2
      })
      .as_object()
      .unwrap(),
    );
    state.publish(&summary, json!({"summary": "two results"}).as_object().unwrap());
    state
  }

  #[test]
  fn test_resolve_input_paths() {
    let state = state();
    assert_eq!(resolve_path("input.query", &state).unwrap(), json!("test query"));
    assert_eq!(resolve_path("input.options.depth", &state).unwrap(), json!(2));
  }

  #[test]
  fn test_resolve_node_paths() {
    let state = state();
    assert_eq!(resolve_path("search.count", &state).unwrap(), json!(2));
    assert_eq!(
      resolve_path("search.results.1.content", &state).unwrap(),
      json!("second")
    );
    assert_eq!(resolve_path("summary.summary", &state).unwrap(), json!("two results"));
    assert_eq!(resolve_path("summary_text", &state).unwrap(), json!("two results"));
  }

  #[test]
  fn test_resolve_length() {
    let state = state();
    assert_eq!(resolve_path("search.results.length", &state).unwrap(), json!(2));
    assert_eq!(resolve_path("summary.summary.length", &state).unwrap(), json!(11));
    assert!(resolve_path("search.count.length", &state).is_err());
  }

  #[test]
  fn test_length_entry_wins_over_size() {
    let state = WorkflowState::new(
      json!({"page": {"length": 7, "title": "intro"}, "meta": {"a": 1, "b": 2}})
        .as_object()
        .cloned()
        .unwrap(),
    );
    assert_eq!(resolve_path("input.page.length", &state).unwrap(), json!(7));
    assert_eq!(resolve_path("input.meta.length", &state).unwrap(), json!(2));
  }

  #[test]
  fn test_missing_sources() {
    let state = state();

    let err = resolve_path("input.missing", &state).unwrap_err();
    assert!(matches!(err, ResolveError::MissingInput { .. }));

    let err = resolve_path("analysis.report", &state).unwrap_err();
    assert!(matches!(err, ResolveError::MissingNodeOutput { node_id, .. } if node_id == "analysis"));

    let err = resolve_path("search.missing", &state).unwrap_err();
    assert!(matches!(err, ResolveError::MissingField { .. }));

    let err = resolve_path("search.results.9", &state).unwrap_err();
    assert!(matches!(err, ResolveError::MissingField { .. }));
  }

  #[test]
  fn test_invalid_paths() {
    let state = state();
    assert!(matches!(
      resolve_path("search..results", &state).unwrap_err(),
      ResolveError::InvalidPath { .. }
    ));
    assert!(matches!(
      resolve_path("unknown", &state).unwrap_err(),
      ResolveError::InvalidPath { .. }
    ));
  }

  #[test]
  fn test_resolve_inputs() {
    let state = state();
    let node = WorkflowNode::agent("analysis", "analyze")
      .with_input("summary", "summary.summary")
      .with_input("raw_data", "search.results");

    let resolved = resolve_inputs(&node, &state).unwrap();
    assert_eq!(resolved["summary"], json!("two results"));
    assert_eq!(resolved["raw_data"].as_array().unwrap().len(), 2);
  }

  #[test]
  fn test_resolve_templated_inputs() {
    let state = state();
    let node = WorkflowNode::agent("analysis", "analyze")
      .with_input("prompt", "Analyze {{ search.count }} results for {{ input.query }}")
      .with_input("top", "{{ search.results[0] }}");

    let resolved = resolve_inputs(&node, &state).unwrap();
    assert_eq!(resolved["prompt"], json!("Analyze 2 results for test query"));
    assert_eq!(resolved["top"]["id"], json!("a"));
  }

  #[test]
  fn test_templated_input_undefined() {
    let state = state();
    let node = WorkflowNode::agent("analysis", "analyze").with_input("prompt", "{{ nope.value }}");

    let err = resolve_inputs(&node, &state).unwrap_err();
    assert!(matches!(err, ResolveError::Template { .. }));
  }
}
