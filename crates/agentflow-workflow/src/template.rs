//! Template instantiation.
//!
//! A [`WorkflowTemplate`] is turned into a concrete [`AgentWorkflow`] by
//! checking the parameters against the template's input schema, rendering
//! `{{ ... }}` placeholders in node options and predicates with minijinja,
//! and replaying the nodes through [`AgentWorkflow::add_node`].
//!
//! A string that consists of a single placeholder is replaced by the typed
//! parameter value, so `"limit": "{{ limit }}"` becomes `"limit": 5`.

use agentflow_config::{InputSchema, NodeDef, NodeType, TemplateDef as WorkflowTemplate};
use minijinja::{Environment, UndefinedBehavior, Value};
use serde_json::Map;
use tracing::{debug, instrument};

use crate::error::WorkflowError;
use crate::workflow::AgentWorkflow;

/// Instantiate a template with the given parameters.
#[instrument(name = "create_from_template", skip(template, params), fields(template_id = %template.template_id))]
pub fn create_from_template(
  template: &WorkflowTemplate,
  params: &Map<String, serde_json::Value>,
) -> Result<AgentWorkflow, WorkflowError> {
  let params = validate_params(&template.input_schema, params)?;

  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  let context = Value::from_serialize(&params);

  let nodes = template
    .nodes
    .iter()
    .map(|node| substitute_node(&env, node, &context))
    .collect::<Result<Vec<_>, _>>()?;

  let workflow_id = format!("{}-{}", template.template_id, uuid::Uuid::new_v4());
  let workflow = AgentWorkflow::from_nodes(
    workflow_id,
    template.name.clone(),
    template.description.clone(),
    nodes,
  )?;

  debug!(
    workflow_id = %workflow.id,
    nodes = workflow.len(),
    "template instantiated"
  );

  Ok(workflow)
}

/// Check parameters against a schema and fill in declared defaults.
///
/// Returns the effective parameter map. Parameters not mentioned by the
/// schema are passed through untouched.
pub fn validate_params(
  schema: &InputSchema,
  params: &Map<String, serde_json::Value>,
) -> Result<Map<String, serde_json::Value>, WorkflowError> {
  let mut effective = params.clone();

  for field in &schema.required {
    if !params.contains_key(field) {
      return Err(WorkflowError::SchemaViolation {
        field: field.clone(),
        message: "required parameter is missing".to_string(),
      });
    }
  }

  // Sorted for deterministic error reporting.
  let mut names: Vec<&String> = schema.properties.keys().collect();
  names.sort();

  for name in names {
    let property = &schema.properties[name];
    match effective.get(name) {
      Some(value) => {
        if !property.schema_type.matches(value) {
          return Err(WorkflowError::SchemaViolation {
            field: name.clone(),
            message: format!("expected {}, got {}", property.schema_type, json_type(value)),
          });
        }
      }
      None => {
        if let Some(default) = &property.default {
          effective.insert(name.clone(), default.clone());
        }
      }
    }
  }

  Ok(effective)
}

fn substitute_node(env: &Environment, node: &NodeDef, context: &Value) -> Result<NodeDef, WorkflowError> {
  let mut node = node.clone();
  let node_id = node.node_id.clone();
  let render_err = |message: String| WorkflowError::Placeholder {
    node_id: node_id.clone(),
    message,
  };

  match &mut node.node_type {
    NodeType::Agent { options, .. } => {
      for value in options.values_mut() {
        *value = substitute_value(env, value, context).map_err(render_err)?;
      }
    }
    NodeType::Condition { predicate, .. } => {
      *predicate = render_string(env, predicate, context).map_err(render_err)?;
    }
  }

  Ok(node)
}

fn substitute_value(
  env: &Environment,
  value: &serde_json::Value,
  context: &Value,
) -> Result<serde_json::Value, String> {
  match value {
    serde_json::Value::String(s) => {
      if let Some(expr) = single_placeholder(s) {
        evaluate_placeholder(env, expr, context)
      } else {
        render_string(env, s, context).map(serde_json::Value::String)
      }
    }
    serde_json::Value::Array(items) => items
      .iter()
      .map(|item| substitute_value(env, item, context))
      .collect::<Result<Vec<_>, _>>()
      .map(serde_json::Value::Array),
    serde_json::Value::Object(fields) => fields
      .iter()
      .map(|(k, v)| substitute_value(env, v, context).map(|v| (k.clone(), v)))
      .collect::<Result<Map<_, _>, _>>()
      .map(serde_json::Value::Object),
    other => Ok(other.clone()),
  }
}

fn render_string(env: &Environment, template: &str, context: &Value) -> Result<String, String> {
  if !template.contains("{{") && !template.contains("{%") {
    return Ok(template.to_string());
  }
  env
    .render_str(template, context.clone())
    .map_err(|e| format!("failed to render '{}': {}", template, e))
}

fn evaluate_placeholder(env: &Environment, expr: &str, context: &Value) -> Result<serde_json::Value, String> {
  let compiled = env
    .compile_expression(expr)
    .map_err(|e| format!("invalid placeholder '{}': {}", expr, e))?;
  let value = compiled
    .eval(context.clone())
    .map_err(|e| format!("failed to evaluate '{}': {}", expr, e))?;
  if value.is_undefined() {
    return Err(format!("undefined parameter in '{}'", expr));
  }
  serde_json::to_value(&value).map_err(|e| format!("failed to convert '{}': {}", expr, e))
}

/// Return the inner expression if `s` is exactly one `{{ ... }}` block.
fn single_placeholder(s: &str) -> Option<&str> {
  let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
  if inner.contains("{{") || inner.contains("}}") {
    return None;
  }
  Some(inner.trim())
}

fn json_type(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "boolean",
    serde_json::Value::Number(_) => "number",
    serde_json::Value::String(_) => "string",
    serde_json::Value::Array(_) => "array",
    serde_json::Value::Object(_) => "object",
  }
}
