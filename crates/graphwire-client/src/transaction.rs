//! Transaction coordinator.
//!
//! A transaction is logically opened by [`TransactionCoordinator::begin`]
//! and physically opened by the backend on the first flush, which reports
//! the server-assigned id. Statements accumulate in a pending batch until
//! flushed; one flush is one adaptor request.
//!
//! The coordinator is a single-writer structure. Callers sharing one across
//! tasks must serialize access (the session wraps it in a mutex).

use std::fmt;
use std::sync::Arc;

use graphwire_core::{GraphError, Result};

use crate::adaptor::Adaptor;
use crate::cypher::Statement;
use crate::response::RawResult;

/// Lifecycle: `Pending → Open → {Committed, RolledBack}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Open,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

pub struct TransactionCoordinator {
    adaptor: Arc<dyn Adaptor>,
    state: TransactionState,
    id: Option<u64>,
    pending: Vec<Statement>,
}

impl TransactionCoordinator {
    pub fn new(adaptor: Arc<dyn Adaptor>) -> Self {
        Self {
            adaptor,
            state: TransactionState::Pending,
            id: None,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Server-assigned id, known once the first flush confirmed the transaction.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// True once the backend holds a physical transaction for us.
    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }

    pub fn pending(&self) -> &[Statement] {
        &self.pending
    }

    fn transition(&mut self, to: TransactionState) {
        tracing::debug!(from = %self.state, to = %to, id = ?self.id, "Transaction state change");
        self.state = to;
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(GraphError::ClosedTransaction {
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Logical open. No request is made until the first flush.
    pub fn begin(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.state == TransactionState::Pending {
            self.transition(TransactionState::Open);
        }
        Ok(())
    }

    /// Append statements to the pending batch without sending them.
    pub fn queue(&mut self, statements: Vec<Statement>) -> Result<()> {
        self.begin()?;
        self.pending.extend(statements);
        Ok(())
    }

    /// Append statements; with `commit`, also flush and commit in the same request.
    ///
    /// Without `commit` nothing is sent and the returned list is empty.
    pub async fn submit(
        &mut self,
        statements: Vec<Statement>,
        commit: bool,
    ) -> Result<Vec<RawResult>> {
        self.queue(statements)?;
        if commit {
            self.send(true).await
        } else {
            Ok(Vec::new())
        }
    }

    /// Send the pending batch as one request.
    pub async fn flush(&mut self) -> Result<Vec<RawResult>> {
        self.begin()?;
        self.send(false).await
    }

    /// Queue and flush in one step, returning the results of `statements`.
    pub async fn execute(&mut self, statements: Vec<Statement>) -> Result<Vec<RawResult>> {
        let queued = self.pending.len();
        self.queue(statements)?;
        let mut results = self.send(false).await?;
        Ok(results.split_off(queued.min(results.len())))
    }

    /// Flush anything pending and commit.
    pub async fn commit(&mut self) -> Result<Vec<RawResult>> {
        self.submit(Vec::new(), true).await
    }

    /// Discard pending statements and roll back the server-side transaction, if any.
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let discarded = std::mem::take(&mut self.pending);
        if !discarded.is_empty() {
            tracing::debug!(count = discarded.len(), "Discarding unflushed statements");
        }
        if let Some(id) = self.id {
            self.adaptor.rollback(id).await?;
        }
        self.transition(TransactionState::RolledBack);
        Ok(())
    }

    async fn send(&mut self, commit: bool) -> Result<Vec<RawResult>> {
        let batch = std::mem::take(&mut self.pending);

        if batch.is_empty() && self.id.is_none() {
            // Nothing to send and nothing open on the server.
            if commit {
                self.transition(TransactionState::Committed);
            }
            return Ok(Vec::new());
        }
        if batch.is_empty() && !commit {
            return Ok(Vec::new());
        }

        tracing::debug!(
            id = ?self.id,
            statements = batch.len(),
            commit,
            "Flushing transaction batch"
        );
        let response = self.adaptor.query(self.id, &batch, commit).await?;

        if self.id.is_none() {
            if let Some(id) = response.transaction_id {
                tracing::debug!(id, "Transaction confirmed by server");
                self.id = Some(id);
            }
        }
        // The server has committed once it answers, whatever the body holds.
        if commit {
            self.transition(TransactionState::Committed);
        }
        if response.results.len() != batch.len() {
            return Err(GraphError::Decode(format!(
                "expected {} results, got {}",
                batch.len(),
                response.results.len()
            )));
        }
        Ok(response.results)
    }
}

impl fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("state", &self.state)
            .field("id", &self.id)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::statement;
    use crate::testing::FakeAdaptor;

    fn coordinator(fake: &Arc<FakeAdaptor>) -> TransactionCoordinator {
        TransactionCoordinator::new(fake.clone())
    }

    #[tokio::test]
    async fn test_begin_is_logical_only() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        assert_eq!(tx.state(), TransactionState::Pending);

        tx.begin().unwrap();
        assert_eq!(tx.state(), TransactionState::Open);
        assert!(!tx.is_confirmed());
        assert_eq!(fake.request_count(), 0);
    }

    #[tokio::test]
    async fn test_first_flush_confirms_id() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.begin().unwrap();

        tx.execute(vec![statement("RETURN 1")]).await.unwrap();
        let id = tx.id().unwrap();

        tx.execute(vec![statement("RETURN 2")]).await.unwrap();
        assert_eq!(tx.id(), Some(id));

        let calls = fake.calls();
        assert_eq!(calls[0].transaction_id, None);
        assert_eq!(calls[1].transaction_id, Some(id));
        assert!(!calls[1].commit);
    }

    #[tokio::test]
    async fn test_batch_commit_is_one_request() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        let statements: Vec<_> = (0..5).map(|i| statement(format!("RETURN {i}"))).collect();

        let results = tx.submit(statements, true).await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(tx.state(), TransactionState::Committed);

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].statements.len(), 5);
        assert!(calls[0].commit);
    }

    #[tokio::test]
    async fn test_submit_without_commit_only_queues() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.submit(vec![statement("RETURN 1")], false).await.unwrap();
        tx.submit(vec![statement("RETURN 2")], false).await.unwrap();
        assert_eq!(fake.request_count(), 0);
        assert_eq!(tx.pending().len(), 2);

        let results = tx.flush().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(tx.pending().is_empty());
        assert_eq!(fake.request_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_returns_only_its_own_results() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.queue(vec![statement("RETURN 1"), statement("RETURN 2")]).unwrap();
        let results = tx.execute(vec![statement("RETURN 3")]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(fake.calls()[0].statements.len(), 3);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_submit() {
        let fake = FakeAdaptor::new();

        let mut committed = coordinator(&fake);
        committed.submit(vec![statement("RETURN 1")], true).await.unwrap();
        let err = committed
            .submit(vec![statement("RETURN 2")], false)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::ClosedTransaction { .. }));

        let mut rolled_back = coordinator(&fake);
        rolled_back.begin().unwrap();
        rolled_back.rollback().await.unwrap();
        let err = rolled_back
            .submit(vec![statement("RETURN 2")], true)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::ClosedTransaction { .. }));
        assert!(rolled_back.rollback().await.is_err());
    }

    #[tokio::test]
    async fn test_rollback_discards_pending() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.queue(vec![statement("CREATE (n)")]).unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert!(tx.pending().is_empty());
        // Never physically opened, so nothing to roll back remotely.
        assert_eq!(fake.request_count(), 0);
        assert!(fake.rollbacks().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_of_confirmed_transaction() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.execute(vec![statement("CREATE (n)")]).await.unwrap();
        let id = tx.id().unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(fake.rollbacks(), vec![id]);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_transaction_open() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.begin().unwrap();
        fake.fail_next(GraphError::Transport("connection reset".to_string()));

        let err = tx
            .submit(vec![statement("RETURN 1")], true)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
        assert_eq!(tx.state(), TransactionState::Open);
        assert!(tx.pending().is_empty());
    }

    #[tokio::test]
    async fn test_commit_with_short_response_is_still_committed() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.execute(vec![statement("CREATE (n)")]).await.unwrap();

        fake.short_results_next();
        let err = tx
            .submit(vec![statement("CREATE (m)")], true)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Decode(_)));
        assert_eq!(tx.state(), TransactionState::Committed);

        let err = tx.rollback().await.unwrap_err();
        assert!(matches!(err, GraphError::ClosedTransaction { .. }));
        assert!(fake.rollbacks().is_empty());
    }

    #[tokio::test]
    async fn test_empty_commit_without_server_transaction_sends_nothing() {
        let fake = FakeAdaptor::new();
        let mut tx = coordinator(&fake);
        tx.begin().unwrap();
        tx.commit().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(fake.request_count(), 0);
    }
}
