use serde::{Deserialize, Serialize};

use crate::node::NodeDef;
use crate::schema::InputSchema;

/// A parameterizable workflow blueprint.
///
/// Node option strings and condition predicates may contain `{{ param }}`
/// placeholders that are filled in at instantiation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
  pub template_id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub input_schema: InputSchema,
  pub nodes: Vec<NodeDef>,
}
