use serde::{Deserialize, Serialize};

use crate::node::NodeDef;

/// A workflow definition as stored on disk.
///
/// Node order only matters for tie-breaking between nodes that become
/// ready at the same time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub workflow_id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub nodes: Vec<NodeDef>,
}
