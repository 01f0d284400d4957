//! Agentflow Config
//!
//! This crate contains the serializable workflow configuration types for agentflow.
//! These types represent workflow and template definitions before they are
//! validated and turned into an executable graph by `agentflow-workflow`.
//!
//! Configuration is plain JSON:
//!
//! ```json
//! {
//!   "workflow_id": "research",
//!   "name": "Research pipeline",
//!   "nodes": [
//!     { "node_id": "search", "type": "agent", "agent": "search",
//!       "input_mapping": { "query": "input.query" } },
//!     { "node_id": "summary", "type": "agent", "agent": "summarize",
//!       "input_mapping": { "text": "search.results" },
//!       "dependencies": ["search"] }
//!   ]
//! }
//! ```

mod node;
mod schema;
mod template;
mod workflow;

pub use node::{NodeDef, NodeType};
pub use schema::{InputSchema, PropertySchema, SchemaType};
pub use template::TemplateDef;
pub use workflow::WorkflowDef;
