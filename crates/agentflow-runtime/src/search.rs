//! Retrieval capability.
//!
//! The runtime does not rank or store documents. A [`SearchProvider`] is
//! whatever backend answers the query; [`SearchAgent`] adapts it to the
//! [`Agent`] interface so RAG-style nodes can use it.

use std::sync::Arc;

use agentflow_workflow::AgentConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::agent::Agent;
use crate::error::AgentError;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 20;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
  pub id: String,
  pub content: String,
  pub score: f64,
}

/// A search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync + 'static {
  async fn search(
    &self,
    query: String,
    limit: usize,
    filter: Option<Value>,
  ) -> Result<Vec<SearchHit>, AgentError>;
}

/// Agent that routes a node's `query` input to a [`SearchProvider`].
///
/// Options:
/// - `limit`: number of hits, 1..=20, default 5
/// - `filter`: passed to the provider untouched
/// - `query`: used when the node has no `query` input
///
/// Publishes `results` (hits by descending score) and `count`.
pub struct SearchAgent {
  provider: Arc<dyn SearchProvider>,
}

impl SearchAgent {
  pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
    Self { provider }
  }
}

impl std::fmt::Debug for SearchAgent {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SearchAgent").finish_non_exhaustive()
  }
}

#[async_trait]
impl Agent for SearchAgent {
  async fn invoke(&self, config: AgentConfig, input: Map<String, Value>) -> Result<Value, AgentError> {
    let query = input
      .get("query")
      .or_else(|| config.options.get("query"))
      .and_then(Value::as_str)
      .filter(|q| !q.trim().is_empty())
      .ok_or_else(|| AgentError::invalid_input("search requires a non-empty string 'query'"))?
      .to_string();

    let limit = match config.options.get("limit") {
      None => DEFAULT_LIMIT,
      Some(value) => value
        .as_u64()
        .map(|n| n as usize)
        .filter(|n| (1..=MAX_LIMIT).contains(n))
        .ok_or_else(|| {
          AgentError::invalid_input(format!(
            "'limit' must be an integer between 1 and {}, got {}",
            MAX_LIMIT, value
          ))
        })?,
    };

    let filter = config.options.get("filter").cloned();

    let mut hits = self.provider.search(query, limit, filter).await?;
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);

    Ok(json!({
      "count": hits.len(),
      "results": hits,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  /// Returns canned hits and records the last call.
  #[derive(Default)]
  struct FixedProvider {
    hits: Vec<SearchHit>,
    calls: Mutex<Vec<(String, usize, Option<Value>)>>,
  }

  #[async_trait]
  impl SearchProvider for FixedProvider {
    async fn search(
      &self,
      query: String,
      limit: usize,
      filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, AgentError> {
      self.calls.lock().unwrap().push((query, limit, filter));
      Ok(self.hits.clone())
    }
  }

  fn hit(id: &str, score: f64) -> SearchHit {
    SearchHit {
      id: id.to_string(),
      content: format!("content of {}", id),
      score,
    }
  }

  fn config(options: Value) -> AgentConfig {
    AgentConfig {
      agent: "search".to_string(),
      options: options.as_object().cloned().unwrap_or_default(),
      timeout: None,
    }
  }

  fn query(q: &str) -> Map<String, Value> {
    let mut input = Map::new();
    input.insert("query".into(), json!(q));
    input
  }

  #[tokio::test]
  async fn test_search_sorts_by_score() {
    let provider = Arc::new(FixedProvider {
      hits: vec![hit("a", 0.2), hit("b", 0.9), hit("c", 0.5)],
      ..Default::default()
    });
    let agent = SearchAgent::new(provider.clone());

    let output = agent.invoke(config(json!({})), query("rust")).await.unwrap();

    assert_eq!(output["count"], json!(3));
    let ids: Vec<_> = output["results"]
      .as_array()
      .unwrap()
      .iter()
      .map(|h| h["id"].as_str().unwrap().to_string())
      .collect();
    assert_eq!(ids, vec!["b", "c", "a"]);

    let calls = provider.calls.lock().unwrap();
    assert_eq!(calls[0], ("rust".to_string(), DEFAULT_LIMIT, None));
  }

  #[tokio::test]
  async fn test_search_passes_limit_and_filter() {
    let provider = Arc::new(FixedProvider::default());
    let agent = SearchAgent::new(provider.clone());

    agent
      .invoke(
        config(json!({"limit": 10, "filter": {"lang": "en"}})),
        query("rust"),
      )
      .await
      .unwrap();

    let calls = provider.calls.lock().unwrap();
    assert_eq!(calls[0].1, 10);
    assert_eq!(calls[0].2, Some(json!({"lang": "en"})));
  }

  #[tokio::test]
  async fn test_search_rejects_out_of_range_limit() {
    let agent = SearchAgent::new(Arc::new(FixedProvider::default()));

    for limit in [json!(0), json!(21), json!("five")] {
      let err = agent
        .invoke(config(json!({ "limit": limit })), query("rust"))
        .await
        .unwrap_err();
      assert!(matches!(err, AgentError::InvalidInput { .. }));
    }
  }

  #[tokio::test]
  async fn test_search_requires_query() {
    let agent = SearchAgent::new(Arc::new(FixedProvider::default()));

    let err = agent
      .invoke(config(json!({})), Map::new())
      .await
      .unwrap_err();
    assert!(err.to_string().contains("query"));
  }

  #[tokio::test]
  async fn test_search_query_from_options() {
    let provider = Arc::new(FixedProvider::default());
    let agent = SearchAgent::new(provider.clone());

    agent
      .invoke(config(json!({"query": "from options"})), Map::new())
      .await
      .unwrap();

    assert_eq!(provider.calls.lock().unwrap()[0].0, "from options");
  }
}
