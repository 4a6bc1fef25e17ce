pub mod abi;
pub mod client;
pub mod decoder;

pub use abi::LoyaltyToken;
pub use client::{ChainClient, RpcChainClient};
pub use decoder::{decode_token_log, DecodedLog, TokenEvent, ZERO_ADDRESS};
