//! Operation state machine and tracking
//!
//! Every lock, close or cancel attempt is an [`Operation`]. The coordinator task
//! that starts an operation is the only one that moves it forward; everyone
//! else reads snapshots through the [`OperationTracker`].

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::orders::OrderId;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// What an operation does to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Lock,
    Close,
    Cancel,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Lock => "lock",
            OperationKind::Close => "close",
            OperationKind::Cancel => "cancel",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationState {
    Idle,
    AwaitingPrecondition,
    /// Waiting for the wallet to produce a signature
    Signing,
    Confirming { tx_hash: String },
    Settled { tx_hash: String },
    Failed { reason: String },
}

impl OperationState {
    pub fn name(&self) -> &'static str {
        match self {
            OperationState::Idle => "idle",
            OperationState::AwaitingPrecondition => "awaiting_precondition",
            OperationState::Signing => "signing",
            OperationState::Confirming { .. } => "confirming",
            OperationState::Settled { .. } => "settled",
            OperationState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Settled { .. } | OperationState::Failed { .. })
    }

    pub fn can_transition_to(&self, next: &OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Idle, AwaitingPrecondition)
                | (AwaitingPrecondition, Signing)
                | (AwaitingPrecondition, Failed { .. })
                | (Signing, Confirming { .. })
                | (Signing, Failed { .. })
                | (Confirming { .. }, Settled { .. })
                | (Confirming { .. }, Failed { .. })
        )
    }
}

/// One coordinator attempt
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub order_id: OrderId,
    pub state: OperationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registry of operations started during this session
pub struct OperationTracker {
    operations: RwLock<HashMap<Uuid, Operation>>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
        }
    }

    /// Record a new operation in the idle state
    pub async fn begin(&self, kind: OperationKind, order_id: &OrderId) -> Uuid {
        let now = Utc::now();
        let operation = Operation {
            id: Uuid::new_v4(),
            kind,
            order_id: order_id.clone(),
            state: OperationState::Idle,
            created_at: now,
            updated_at: now,
        };
        let id = operation.id;
        self.operations.write().await.insert(id, operation);
        id
    }

    /// Move an operation to its next state
    pub async fn transition(&self, id: Uuid, next: OperationState) -> CoordinatorResult<()> {
        let mut operations = self.operations.write().await;
        let operation = operations
            .get_mut(&id)
            .ok_or_else(|| CoordinatorError::Internal(format!("Unknown operation {}", id)))?;

        if !operation.state.can_transition_to(&next) {
            return Err(CoordinatorError::InvalidStateTransition {
                from: operation.state.name().to_string(),
                to: next.name().to_string(),
            });
        }

        debug!(
            "{} operation {} for order {}: {} -> {}",
            operation.kind,
            id,
            operation.order_id,
            operation.state.name(),
            next.name()
        );
        operation.state = next;
        operation.updated_at = Utc::now();
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Option<Operation> {
        self.operations.read().await.get(&id).cloned()
    }

    /// Most recent operations first
    pub async fn recent(&self, limit: usize) -> Vec<Operation> {
        let mut operations: Vec<Operation> = self.operations.read().await.values().cloned().collect();
        operations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        operations.truncate(limit);
        operations
    }

    /// Operations that have not reached a terminal state
    pub async fn active(&self) -> Vec<Operation> {
        self.operations
            .read()
            .await
            .values()
            .filter(|op| !op.state.is_terminal())
            .cloned()
            .collect()
    }

    /// Drop finished operations older than `max_age`
    pub async fn cleanup(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut operations = self.operations.write().await;
        let before = operations.len();
        operations.retain(|_, op| !op.state.is_terminal() || op.updated_at > cutoff);
        before - operations.len()
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}
