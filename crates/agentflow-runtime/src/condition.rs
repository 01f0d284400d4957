//! Condition predicate evaluation.

use minijinja::value::ValueKind;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};

use crate::error::ConditionError;
use crate::state::WorkflowState;

/// Evaluates a condition node's predicate against the workflow state.
pub trait ConditionEvaluator: Send + Sync {
  fn evaluate(&self, predicate: &str, state: &WorkflowState) -> Result<bool, ConditionError>;
}

/// Default evaluator backed by minijinja expressions.
///
/// Predicates see [`WorkflowState::context`], so node outputs are addressed
/// as `node.field` and the workflow input as `input.field`:
///
/// ```text
/// search.results.length > 0
/// input.mode == "deep" and search.count >= 3
/// "rust" in input.tags
/// ```
///
/// `x.length` reads a `length` entry when `x` has one and otherwise gives
/// the size of `x`, the same rule input paths follow. References to values
/// that do not exist are errors, not falsy.
#[derive(Debug)]
pub struct ExpressionEvaluator {
  env: Environment<'static>,
}

impl Default for ExpressionEvaluator {
  fn default() -> Self {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter(LENGTH_FILTER, field_length);
    Self { env }
  }
}

impl ExpressionEvaluator {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ConditionEvaluator for ExpressionEvaluator {
  fn evaluate(&self, predicate: &str, state: &WorkflowState) -> Result<bool, ConditionError> {
    let source = rewrite_length(predicate);

    let expr = self
      .env
      .compile_expression(&source)
      .map_err(|e| ConditionError::Parse {
        predicate: predicate.to_string(),
        message: e.to_string(),
      })?;

    let value = expr
      .eval(Value::from_serialize(state.context()))
      .map_err(|e| ConditionError::Evaluation {
        predicate: predicate.to_string(),
        message: e.to_string(),
      })?;

    if value.is_undefined() {
      return Err(ConditionError::Evaluation {
        predicate: predicate.to_string(),
        message: "predicate evaluated to undefined".to_string(),
      });
    }

    Ok(value.is_true())
  }
}

const LENGTH_FILTER: &str = "field_length";

/// A map's own `length` entry wins over its entry count.
fn field_length(value: Value) -> Result<Value, Error> {
  if value.kind() == ValueKind::Map {
    let entry = value.get_attr("length")?;
    if !entry.is_undefined() {
      return Ok(entry);
    }
  }
  value.len().map(Value::from).ok_or_else(|| {
    Error::new(
      ErrorKind::InvalidOperation,
      format!("{} has no length", value.kind()),
    )
  })
}

/// Rewrite `<expr>.length` into `<expr> | field_length`, leaving string
/// literals and longer identifiers such as `.lengths` untouched.
fn rewrite_length(predicate: &str) -> String {
  const SUFFIX: &str = ".length";

  let mut out = String::with_capacity(predicate.len() + 8);
  let mut quote: Option<char> = None;
  let mut prev: Option<char> = None;
  let mut rest = predicate;

  while let Some(c) = rest.chars().next() {
    if let Some(q) = quote {
      out.push(c);
      if c == q && prev != Some('\\') {
        quote = None;
      }
      prev = Some(c);
      rest = &rest[c.len_utf8()..];
      continue;
    }

    if c == '"' || c == '\'' {
      quote = Some(c);
    } else if c == '.' && rest.starts_with(SUFFIX) {
      let after = rest[SUFFIX.len()..].chars().next();
      let ends = !after.is_some_and(|a| a.is_alphanumeric() || a == '_');
      let follows_operand = prev.is_some_and(|p| p.is_alphanumeric() || p == '_' || p == ']' || p == ')');
      if ends && follows_operand {
        out.push_str(" | ");
        out.push_str(LENGTH_FILTER);
        prev = Some('h');
        rest = &rest[SUFFIX.len()..];
        continue;
      }
    }

    out.push(c);
    prev = Some(c);
    rest = &rest[c.len_utf8()..];
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use agentflow_workflow::WorkflowNode;
  use serde_json::json;

  fn state() -> WorkflowState {
    let mut state = WorkflowState::new(
      json!({"mode": "deep", "tags": ["rust", "async"]})
        .as_object()
        .cloned()
        .unwrap(),
    );
    let search = WorkflowNode::agent("search", "search");
    state.publish(
      &search,
      json!({"results": [1, 2, 3], "count": 3}).as_object().unwrap(),
    );
    state
  }

  #[test]
  fn test_rewrite_length() {
    assert_eq!(
      rewrite_length("search.results.length > 0"),
      "search.results | field_length > 0"
    );
    assert_eq!(rewrite_length("a.lengths > 0"), "a.lengths > 0");
    assert_eq!(rewrite_length("x == '.length'"), "x == '.length'");
    assert_eq!(rewrite_length("a[0].length"), "a[0] | field_length");
  }

  #[test]
  fn test_length_predicate() {
    let evaluator = ExpressionEvaluator::new();
    let state = state();

    assert!(evaluator.evaluate("search.results.length > 0", &state).unwrap());
    assert!(!evaluator.evaluate("search.results.length > 5", &state).unwrap());
    assert!(evaluator.evaluate("input.mode.length == 4", &state).unwrap());
  }

  #[test]
  fn test_length_entry_wins_over_size() {
    let evaluator = ExpressionEvaluator::new();
    let state = WorkflowState::new(
      json!({"page": {"length": 7, "title": "intro"}, "meta": {"a": 1, "b": 2}})
        .as_object()
        .cloned()
        .unwrap(),
    );

    assert!(evaluator.evaluate("input.page.length == 7", &state).unwrap());
    assert!(evaluator.evaluate("input.meta.length == 2", &state).unwrap());
    assert!(matches!(
      evaluator.evaluate("input.meta.a.length > 0", &state),
      Err(ConditionError::Evaluation { .. })
    ));
  }

  #[test]
  fn test_boolean_operators() {
    let evaluator = ExpressionEvaluator::new();
    let state = state();

    assert!(
      evaluator
        .evaluate("input.mode == 'deep' and search.count >= 3", &state)
        .unwrap()
    );
    assert!(evaluator.evaluate("'rust' in input.tags", &state).unwrap());
    assert!(evaluator.evaluate("not ('go' in input.tags)", &state).unwrap());
    assert!(!evaluator.evaluate("search.count < 3 or false", &state).unwrap());
  }

  #[test]
  fn test_truthiness() {
    let evaluator = ExpressionEvaluator::new();
    let state = state();

    assert!(evaluator.evaluate("search.results", &state).unwrap());
    assert!(!evaluator.evaluate("0", &state).unwrap());
  }

  #[test]
  fn test_parse_error() {
    let evaluator = ExpressionEvaluator::new();
    let err = evaluator.evaluate("search.count >", &state()).unwrap_err();
    assert!(matches!(err, ConditionError::Parse { .. }));
  }

  #[test]
  fn test_missing_reference_is_error() {
    let evaluator = ExpressionEvaluator::new();
    let err = evaluator
      .evaluate("analysis.score > 0.5", &state())
      .unwrap_err();
    assert!(matches!(err, ConditionError::Evaluation { .. }));
  }
}
