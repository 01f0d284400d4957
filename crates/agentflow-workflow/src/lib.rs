//! Agentflow Workflow
//!
//! This crate provides the validated, in-memory workflow representation for
//! agentflow. An [`AgentWorkflow`] is built node by node through
//! [`AgentWorkflow::add_node`], which rejects missing dependencies and cycles
//! before touching the graph, so a workflow that exists is always a DAG.
//!
//! Key differences from `agentflow-config`:
//! - Node configuration is a typed union ([`NodeKind`]) checked at insertion
//! - Nodes live in a dense arena, edges are index lists ([`Graph`])
//! - Templates are instantiated through the same insertion path
//!   ([`create_from_template`])

mod error;
mod graph;
mod node;
mod template;
mod workflow;

pub use agentflow_config::{NodeDef as WorkflowNodeTemplate, TemplateDef as WorkflowTemplate};
pub use error::WorkflowError;
pub use graph::Graph;
pub use node::{AgentConfig, CONDITION_RESULT_FIELD, ConditionConfig, NodeKind, WorkflowNode};
pub use template::{create_from_template, validate_params};
pub use workflow::AgentWorkflow;
