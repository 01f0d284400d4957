//! Agentflow Runtime
//!
//! This crate executes [`agentflow_workflow::AgentWorkflow`]s. It resolves
//! each node's inputs from the accumulated workflow state, dispatches every
//! ready node concurrently to an [`Agent`], evaluates condition nodes, and
//! folds the outcome into a [`WorkflowResult`].
//!
//! # Architecture
//!
//! ```text
//! WorkflowExecutor
//! ├── execute(workflow, input) -> WorkflowResult
//! └── execute_with_cancel(workflow, input, cancel)
//!
//! Execution (one per call, owns its WorkflowState)
//! ├── find ready nodes (dependencies settled, branch selected)
//! ├── resolve inputs (input.* / node.field paths)
//! ├── condition nodes -> ConditionEvaluator, inline
//! ├── agent nodes -> Agent::invoke, one tokio task each
//! └── wait for any task to settle, repeat
//! ```
//!
//! Node failures are reported in the result; only a workflow timeout,
//! cancellation or an invalid graph surface as [`ExecutionError`].
//!
//! # Usage
//!
//! ```ignore
//! use agentflow_runtime::{AgentRegistry, WorkflowExecutor, WorkflowInput};
//!
//! let agents = AgentRegistry::new()
//!     .with("search", Arc::new(SearchAgent::new(provider)))
//!     .with("summarize", Arc::new(my_llm_agent));
//! let executor = WorkflowExecutor::new(Arc::new(agents));
//!
//! let result = executor
//!     .execute(&workflow, WorkflowInput::new(json!({ "query": "rust" })))
//!     .await?;
//! ```

mod agent;
mod condition;
mod error;
mod events;
mod executor;
mod input;
mod result;
mod search;
mod state;

pub use agent::{Agent, AgentRegistry, EchoAgent};
pub use condition::{ConditionEvaluator, ExpressionEvaluator};
pub use error::{AgentError, ConditionError, ExecutionError, ResolveError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use input::{resolve_inputs, resolve_path};
pub use result::{NodeRecord, NodeStatus, SkipReason, WorkflowInput, WorkflowResult};
pub use search::{SearchAgent, SearchHit, SearchProvider};
pub use state::WorkflowState;
