use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;

use crate::abi::LoyaltyToken;

/// Zero address constant for mint/burn detection.
pub const ZERO_ADDRESS: Address = Address::ZERO;

/// A token movement recognised by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEvent {
    Minted { to: Address, amount: U256 },
    Burned { from: Address, amount: U256 },
    Transferred { from: Address, to: Address, value: U256 },
}

/// A decoded log together with its chain coordinates.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub event: TokenEvent,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
}

/// Attempt to decode a raw log as a tracked token event.
///
/// Unknown selectors return `None`. A `Transfer` whose `from` is the zero
/// address is dropped (the supply change arrives as `TokenMinted`), as is a
/// `Transfer` whose `to` is the zero address (`TokenBurned`); keeping both
/// would double-count the supply-changing transactions.
pub fn decode_token_log(log: &Log) -> Option<DecodedLog> {
    let block_number = log.block_number?;
    let log_index = log.log_index?;
    let tx_hash = log
        .transaction_hash
        .map(|h| format!("{h:#x}"))
        .unwrap_or_default();

    // Try Transfer first (by far the most common)
    if let Ok(decoded) = log.log_decode::<LoyaltyToken::Transfer>() {
        let d = decoded.inner.data;
        if d.from == ZERO_ADDRESS || d.to == ZERO_ADDRESS {
            return None;
        }
        return Some(DecodedLog {
            event: TokenEvent::Transferred {
                from: d.from,
                to: d.to,
                value: d.value,
            },
            block_number,
            transaction_hash: tx_hash,
            log_index,
        });
    }

    if let Ok(decoded) = log.log_decode::<LoyaltyToken::TokenMinted>() {
        let d = decoded.inner.data;
        return Some(DecodedLog {
            event: TokenEvent::Minted {
                to: d.to,
                amount: d.amount,
            },
            block_number,
            transaction_hash: tx_hash,
            log_index,
        });
    }

    if let Ok(decoded) = log.log_decode::<LoyaltyToken::TokenBurned>() {
        let d = decoded.inner.data;
        return Some(DecodedLog {
            event: TokenEvent::Burned {
                from: d.from,
                amount: d.amount,
            },
            block_number,
            transaction_hash: tx_hash,
            log_index,
        });
    }

    None
}
