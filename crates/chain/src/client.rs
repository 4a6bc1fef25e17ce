use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holdscore_core::{AppError, Result};

/// The RPC capabilities the scanner consumes.
///
/// Errors are transient by default; callers retry at the next scan tick.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head height.
    async fn latest_block_number(&self) -> Result<u64>;

    /// All logs emitted by `contract` in the inclusive block range.
    async fn logs_in_range(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>>;

    /// Header timestamp of a block.
    async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>>;
}

/// `ChainClient` backed by an HTTP JSON-RPC provider.
pub struct RpcChainClient {
    provider: RootProvider,
}

impl RpcChainClient {
    /// Connect to an EVM JSON-RPC endpoint.
    pub fn connect(rpc_url: &str) -> eyre::Result<Self> {
        let url = rpc_url.parse()?;
        Ok(Self {
            provider: RootProvider::new_http(url),
        })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn latest_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| AppError::Rpc(e.to_string()))
    }

    async fn logs_in_range(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(contract)
            .from_block(from_block)
            .to_block(to_block);

        self.provider
            .get_logs(&filter)
            .await
            .map_err(|e| AppError::Rpc(e.to_string()))
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .map_err(|e| AppError::Rpc(e.to_string()))?
            .ok_or_else(|| AppError::Rpc(format!("block {block_number} not found")))?;

        DateTime::from_timestamp(block.header.timestamp as i64, 0)
            .ok_or_else(|| AppError::Rpc(format!("block {block_number} has an invalid timestamp")))
    }
}
