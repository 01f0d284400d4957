use std::collections::{HashMap, HashSet};

use agentflow_config::{NodeDef, WorkflowDef};

use crate::error::WorkflowError;
use crate::graph::{Graph, kahn_partial};
use crate::node::{NodeKind, WorkflowNode};

/// A validated workflow ready for execution.
///
/// Nodes are stored in insertion order; every node's dependencies precede it,
/// so the graph is acyclic by construction. Executions only ever borrow the
/// workflow, which makes one instance safe to run many times concurrently.
#[derive(Debug, Clone)]
pub struct AgentWorkflow {
  pub id: String,
  pub name: String,
  pub description: String,
  nodes: Vec<WorkflowNode>,
  index: HashMap<String, usize>,
  graph: Graph,
}

impl AgentWorkflow {
  /// Create an empty workflow.
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      description: String::new(),
      nodes: Vec::new(),
      index: HashMap::new(),
      graph: Graph::new(),
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  /// Add a node that depends on the given, already present, nodes.
  ///
  /// Fails without modifying the workflow if the node is malformed, its id
  /// is taken, it depends on itself, or a dependency does not exist yet.
  pub fn add_node<I, S>(&mut self, mut node: WorkflowNode, dependencies: I) -> Result<(), WorkflowError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    node.validate()?;

    if self.index.contains_key(&node.id) {
      return Err(WorkflowError::DuplicateNode(node.id));
    }

    let mut seen = HashSet::new();
    let dependencies: Vec<String> = dependencies
      .into_iter()
      .map(Into::into)
      .filter(|dep| seen.insert(dep.clone()))
      .collect();

    // The new node is not in the graph yet, so the only edge that can close
    // a cycle is one pointing back at itself.
    if dependencies.iter().any(|dep| *dep == node.id) {
      return Err(WorkflowError::CircularDependency {
        cycle: vec![node.id.clone(), node.id],
      });
    }

    let mut indices = Vec::with_capacity(dependencies.len());
    for dep in &dependencies {
      match self.index.get(dep) {
        Some(&i) => indices.push(i),
        None => {
          return Err(WorkflowError::MissingDependency {
            node_id: node.id,
            dependency: dep.clone(),
          });
        }
      }
    }

    node.dependencies = dependencies;
    let index = self.graph.push(indices);
    self.index.insert(node.id.clone(), index);
    self.nodes.push(node);
    Ok(())
  }

  /// Build a workflow from nodes declared in any order.
  ///
  /// Nodes are replayed through [`AgentWorkflow::add_node`] in dependency
  /// order, ties broken by declaration order.
  pub fn from_nodes(
    id: impl Into<String>,
    name: impl Into<String>,
    description: impl Into<String>,
    nodes: Vec<NodeDef>,
  ) -> Result<Self, WorkflowError> {
    let order = order_definitions(&nodes)?;

    let mut slots: Vec<Option<NodeDef>> = nodes.into_iter().map(Some).collect();
    let mut workflow = Self::new(id, name).with_description(description);
    for i in order {
      let Some(def) = slots[i].take() else {
        continue;
      };
      let node = WorkflowNode::from_def(def)?;
      let dependencies = node.dependencies.clone();
      workflow.add_node(node, dependencies)?;
    }
    Ok(workflow)
  }

  /// Build a workflow from a loaded definition.
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    Self::from_nodes(def.workflow_id, def.name, def.description, def.nodes)
  }

  /// Convert back to a serializable definition.
  pub fn to_def(&self) -> WorkflowDef {
    WorkflowDef {
      workflow_id: self.id.clone(),
      name: self.name.clone(),
      description: self.description.clone(),
      nodes: self.nodes.iter().map(WorkflowNode::to_def).collect(),
    }
  }

  /// Graph-level checks that can only run once all nodes are present.
  ///
  /// Every condition branch must name an existing node that depends on the
  /// condition, and explicitly mapped output keys must be unique.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    let mut published: HashMap<&str, &str> = HashMap::new();
    for node in &self.nodes {
      for key in node.output_mapping.values() {
        if let Some(owner) = published.insert(key.as_str(), node.id.as_str()) {
          return Err(WorkflowError::invalid_node(
            &node.id,
            format!("output key '{}' is already published by '{}'", key, owner),
          ));
        }
      }
    }

    for node in &self.nodes {
      let NodeKind::Condition(config) = &node.kind else {
        continue;
      };
      for branch in [&config.true_branch, &config.false_branch] {
        let target = self
          .node(branch)
          .ok_or_else(|| WorkflowError::UnknownBranch {
            node_id: node.id.clone(),
            branch: branch.clone(),
            message: "no such node".to_string(),
          })?;
        if !target.dependencies.contains(&node.id) {
          return Err(WorkflowError::UnknownBranch {
            node_id: node.id.clone(),
            branch: branch.clone(),
            message: format!("'{}' does not depend on '{}'", branch, node.id),
          });
        }
      }
    }
    Ok(())
  }

  /// Get a node by ID.
  pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
    self.index.get(node_id).map(|&i| &self.nodes[i])
  }

  /// Arena position of a node.
  pub fn index_of(&self, node_id: &str) -> Option<usize> {
    self.index.get(node_id).copied()
  }

  /// Nodes in insertion order.
  pub fn nodes(&self) -> &[WorkflowNode] {
    &self.nodes
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Whether `to_id` depends on `from_id`, directly or transitively.
  pub fn has_path(&self, from_id: &str, to_id: &str) -> bool {
    match (self.index_of(from_id), self.index_of(to_id)) {
      (Some(from), Some(to)) => self.graph.has_path(from, to),
      _ => false,
    }
  }

  /// Ids of nodes that depend on `node_id`.
  pub fn dependents(&self, node_id: &str) -> Result<Vec<&str>, WorkflowError> {
    let index = self
      .index_of(node_id)
      .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;
    Ok(
      self
        .graph
        .downstream(index)
        .iter()
        .map(|&i| self.nodes[i].id.as_str())
        .collect(),
    )
  }

  /// Node ids in a deterministic execution-compatible order.
  pub fn topological_order(&self) -> Vec<&str> {
    // Insertion order is always topological; Kahn keeps ties stable.
    self
      .graph
      .topological_order()
      .unwrap_or_else(|| (0..self.nodes.len()).collect())
      .into_iter()
      .map(|i| self.nodes[i].id.as_str())
      .collect()
  }
}

/// Order node definitions so that every dependency precedes its dependents.
fn order_definitions(nodes: &[NodeDef]) -> Result<Vec<usize>, WorkflowError> {
  let mut positions: HashMap<&str, usize> = HashMap::new();
  for (i, def) in nodes.iter().enumerate() {
    if positions.insert(def.node_id.as_str(), i).is_some() {
      return Err(WorkflowError::DuplicateNode(def.node_id.clone()));
    }
  }

  // Unknown and self references are left out here; add_node reports them.
  let upstream: Vec<Vec<usize>> = nodes
    .iter()
    .enumerate()
    .map(|(i, def)| {
      def
        .dependencies
        .iter()
        .filter_map(|dep| positions.get(dep.as_str()).copied())
        .filter(|&dep| dep != i)
        .collect()
    })
    .collect();

  let (mut order, remaining) = kahn_partial(nodes.len(), |i| upstream[i].as_slice());
  if remaining.is_empty() {
    return Ok(order);
  }

  if let Some(cycle) = find_cycle(&remaining, &upstream) {
    return Err(WorkflowError::CircularDependency {
      cycle: cycle.into_iter().map(|i| nodes[i].node_id.clone()).collect(),
    });
  }

  // Blocked without a cycle should not happen, but let add_node decide.
  order.extend(remaining);
  Ok(order)
}

/// DFS coloring over the blocked nodes; returns the first cycle found,
/// closed (first id repeated at the end).
fn find_cycle(candidates: &[usize], upstream: &[Vec<usize>]) -> Option<Vec<usize>> {
  #[derive(Clone, Copy, PartialEq)]
  enum Color {
    White,
    Grey,
    Black,
  }

  fn visit(
    node: usize,
    upstream: &[Vec<usize>],
    color: &mut [Color],
    stack: &mut Vec<usize>,
  ) -> Option<Vec<usize>> {
    color[node] = Color::Grey;
    stack.push(node);
    for &dep in &upstream[node] {
      match color[dep] {
        Color::Grey => {
          let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
          let mut cycle: Vec<usize> = stack[start..].to_vec();
          // Stack follows dependency edges; report in execution direction.
          cycle.reverse();
          cycle.push(cycle[0]);
          return Some(cycle);
        }
        Color::White => {
          if let Some(cycle) = visit(dep, upstream, color, stack) {
            return Some(cycle);
          }
        }
        Color::Black => {}
      }
    }
    stack.pop();
    color[node] = Color::Black;
    None
  }

  let mut color = vec![Color::White; upstream.len()];
  let mut stack = Vec::new();
  for &start in candidates {
    if color[start] == Color::White {
      if let Some(cycle) = visit(start, upstream, &mut color, &mut stack) {
        return Some(cycle);
      }
    }
  }
  None
}
