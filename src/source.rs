use crate::error::RemoteQueryError;
use crate::types::{ActivityEvent, BlockRange, ClaimEvent, Role};
use alloy_primitives::Address;
use async_trait::async_trait;

/// Claim (mint) events of the claims contract.
#[async_trait]
pub trait ClaimsSource: Send + Sync {
    /// Transfers out of the zero address within `range`, inclusive.
    async fn query_claims(&self, range: BlockRange) -> Result<Vec<ClaimEvent>, RemoteQueryError>;
}

/// Matched orders of the marketplace contract.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn query_orders_matched(
        &self,
        role: Role,
        wallet: Address,
        range: BlockRange,
    ) -> Result<Vec<ActivityEvent>, RemoteQueryError>;
}

#[async_trait]
pub trait ChainHead: Send + Sync {
    async fn current_block_number(&self) -> Result<u64, RemoteQueryError>;
}
