//! Execution events and notifiers.
//!
//! Events let a host follow an execution as it happens: stream progress to
//! a UI, persist node records, or assert on ordering in tests.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::SkipReason;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  WorkflowStarted {
    execution_id: String,
    workflow_id: String,
  },

  /// An agent node was dispatched, or a condition node began evaluating.
  NodeStarted {
    execution_id: String,
    node_id: String,
    sequence: u64,
  },

  NodeCompleted {
    execution_id: String,
    node_id: String,
    sequence: u64,
    output: serde_json::Value,
  },

  NodeFailed {
    execution_id: String,
    node_id: String,
    sequence: u64,
    error: String,
  },

  NodeSkipped {
    execution_id: String,
    node_id: String,
    sequence: u64,
    reason: SkipReason,
  },

  /// A condition node chose a branch.
  BranchSelected {
    execution_id: String,
    node_id: String,
    outcome: bool,
    branch: String,
  },

  /// Every node settled and none failed.
  WorkflowCompleted { execution_id: String },

  /// Every node settled and at least one failed.
  WorkflowFailed { execution_id: String, error: String },
}

/// Receives execution events.
///
/// `notify` is called from the scheduler loop, so implementations should
/// hand events off rather than block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls the scheduler. Volume is a
  // handful of events per node.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with its receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_channel_notifier_delivers_in_order() {
    let (notifier, mut receiver) = ChannelNotifier::channel();

    notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: "e1".into(),
      workflow_id: "w1".into(),
    });
    notifier.notify(ExecutionEvent::WorkflowCompleted {
      execution_id: "e1".into(),
    });

    assert!(matches!(
      receiver.try_recv().unwrap(),
      ExecutionEvent::WorkflowStarted { .. }
    ));
    assert!(matches!(
      receiver.try_recv().unwrap(),
      ExecutionEvent::WorkflowCompleted { .. }
    ));
    assert!(receiver.try_recv().is_err());
  }

  #[test]
  fn test_channel_notifier_ignores_closed_receiver() {
    let (notifier, receiver) = ChannelNotifier::channel();
    drop(receiver);
    notifier.notify(ExecutionEvent::WorkflowCompleted {
      execution_id: "e1".into(),
    });
  }

  #[test]
  fn test_event_serialization() {
    let event = ExecutionEvent::NodeSkipped {
      execution_id: "e1".into(),
      node_id: "apology".into(),
      sequence: 4,
      reason: SkipReason::BranchNotTaken,
    };
    assert_eq!(
      serde_json::to_value(&event).unwrap(),
      json!({
        "event": "node_skipped",
        "execution_id": "e1",
        "node_id": "apology",
        "sequence": 4,
        "reason": "branch_not_taken"
      })
    );
  }
}
