//! Token rewards for discovering cells.

use std::sync::Arc;

use captur_grid::HexId;

use crate::backend::{IdentityCache, RemoteBackend};

/// Tokens credited per newly visited cell.
pub const REWARD_PER_CELL: i64 = 1;

/// Credits the user's balance when a cell is entered for the first time.
///
/// The remote increment does not deduplicate. Callers invoke
/// [`RewardCoordinator::on_new_cell_visited`] only for fixes the grid
/// manager flagged as newly visited, which happens once per cell per
/// visited-set lifetime.
pub struct RewardCoordinator<B> {
    backend: Arc<B>,
    identity: Arc<IdentityCache>,
    amount: i64,
}

impl<B: RemoteBackend> RewardCoordinator<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, identity: Arc<IdentityCache>) -> Self {
        Self {
            backend,
            identity,
            amount: REWARD_PER_CELL,
        }
    }

    /// Issues one atomic balance increment. A failure is logged and the
    /// reward dropped; there is no retry queue. Returns whether the credit
    /// went through.
    pub async fn on_new_cell_visited(&self, cell: HexId) -> bool {
        let user_id = match self.identity.resolve(self.backend.as_ref()).await {
            Ok(user_id) => user_id,
            Err(e) => {
                tracing::warn!(error = %e, %cell, "reward dropped: user unknown");
                return false;
            }
        };
        match self
            .backend
            .increment_token_balance(user_id, self.amount)
            .await
        {
            Ok(()) => {
                tracing::info!(%cell, amount = self.amount, "token reward credited");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, %cell, "reward dropped: increment failed");
                false
            }
        }
    }
}
