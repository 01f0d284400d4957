//! Agent capabilities.
//!
//! An [`Agent`] is whatever does the work behind an agent node: a search
//! backend, an LLM call, a tool invocation. The executor only knows this
//! trait; routing by agent name is done by [`AgentRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use agentflow_workflow::AgentConfig;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AgentError;

/// A capability invoked for agent nodes.
///
/// Implementations must be safe to call concurrently; the executor may
/// invoke the same agent for several nodes and several executions at once.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
  /// Run the capability with the node's configuration and resolved inputs.
  ///
  /// Objects are published field by field; any other value is published
  /// under the `output` field.
  async fn invoke(&self, config: AgentConfig, input: Map<String, Value>) -> Result<Value, AgentError>;
}

#[async_trait]
impl<A: Agent + ?Sized> Agent for Arc<A> {
  async fn invoke(&self, config: AgentConfig, input: Map<String, Value>) -> Result<Value, AgentError> {
    (**self).invoke(config, input).await
  }
}

/// Routes invocations to agents by [`AgentConfig::agent`].
#[derive(Default, Clone)]
pub struct AgentRegistry {
  agents: HashMap<String, Arc<dyn Agent>>,
  fallback: Option<Arc<dyn Agent>>,
}

impl AgentRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an agent under a name, replacing any previous registration.
  pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) {
    self.agents.insert(name.into(), agent);
  }

  /// Builder form of [`AgentRegistry::register`].
  pub fn with(mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
    self.register(name, agent);
    self
  }

  /// Agent used for names with no registration.
  pub fn with_fallback(mut self, agent: Arc<dyn Agent>) -> Self {
    self.fallback = Some(agent);
    self
  }
}

impl std::fmt::Debug for AgentRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut names: Vec<_> = self.agents.keys().collect();
    names.sort();
    f.debug_struct("AgentRegistry")
      .field("agents", &names)
      .field("fallback", &self.fallback.is_some())
      .finish()
  }
}

#[async_trait]
impl Agent for AgentRegistry {
  async fn invoke(&self, config: AgentConfig, input: Map<String, Value>) -> Result<Value, AgentError> {
    match self.agents.get(&config.agent).or(self.fallback.as_ref()) {
      Some(agent) => agent.invoke(config, input).await,
      None => Err(AgentError::UnknownAgent(config.agent)),
    }
  }
}

/// Returns the `output` option when set, otherwise the resolved input.
///
/// Useful for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
  async fn invoke(&self, config: AgentConfig, input: Map<String, Value>) -> Result<Value, AgentError> {
    Ok(match config.options.get("output") {
      Some(output) => output.clone(),
      None => Value::Object(input),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn config(agent: &str) -> AgentConfig {
    AgentConfig {
      agent: agent.to_string(),
      options: Map::new(),
      timeout: None,
    }
  }

  fn input(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
  }

  #[tokio::test]
  async fn test_echo_returns_input() {
    let output = EchoAgent
      .invoke(config("echo"), input(json!({"query": "rust"})))
      .await
      .unwrap();
    assert_eq!(output, json!({"query": "rust"}));
  }

  #[tokio::test]
  async fn test_echo_prefers_output_option() {
    let mut config = config("echo");
    config.options.insert("output".into(), json!({"summary": "fixed"}));

    let output = EchoAgent.invoke(config, Map::new()).await.unwrap();
    assert_eq!(output, json!({"summary": "fixed"}));
  }

  #[tokio::test]
  async fn test_registry_routes_by_name() {
    let registry = AgentRegistry::new().with("echo", Arc::new(EchoAgent));

    let output = registry
      .invoke(config("echo"), input(json!({"a": 1})))
      .await
      .unwrap();
    assert_eq!(output, json!({"a": 1}));
  }

  #[tokio::test]
  async fn test_registry_unknown_agent() {
    let registry = AgentRegistry::new();
    let err = registry
      .invoke(config("summarize"), Map::new())
      .await
      .unwrap_err();
    assert!(matches!(err, AgentError::UnknownAgent(name) if name == "summarize"));
  }

  #[tokio::test]
  async fn test_registry_fallback() {
    let registry = AgentRegistry::new().with_fallback(Arc::new(EchoAgent));
    let output = registry
      .invoke(config("anything"), input(json!({"x": true})))
      .await
      .unwrap();
    assert_eq!(output, json!({"x": true}));
  }
}
