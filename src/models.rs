// Request/response DTOs for the peerbet API

use serde::{Deserialize, Serialize};

use crate::engine::market::Market;
use crate::engine::verifier::WebProof;

/// POST /markets request body
#[derive(Debug, Deserialize)]
pub struct CreateMarketRequest {
    pub id: u128,
    pub maker: String,
    pub url: String,
    pub stake: u64,
    pub expiry_ts: u64,
    pub maker_expects_true: bool,
}

/// POST /markets/:id/take request body
#[derive(Debug, Deserialize)]
pub struct TakeMarketRequest {
    pub taker: String,
    pub stake: u64,
}

/// POST /markets/:id/settle request body
#[derive(Debug, Deserialize)]
pub struct SettleMarketRequest {
    pub proof: WebProof,
}

/// POST /markets/:id/cancel request body
#[derive(Debug, Deserialize)]
pub struct CancelMarketRequest {
    pub caller: String,
}

/// POST /auth/connect request body
#[derive(Debug, Deserialize)]
pub struct ConnectWalletRequest {
    pub wallet_address: String,
}

/// POST /approve request body
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub owner: String,
    pub amount: u64,
}

/// GET /generateProof query parameters
#[derive(Debug, Deserialize)]
pub struct GenerateProofParams {
    pub url: String,
    pub pattern: String,
}

/// Market record as served on the query surface. `state` is the numeric
/// lifecycle tag: 0 open, 1 filled, 2 settled, 3 cancelled.
#[derive(Debug, Serialize)]
pub struct MarketView {
    pub id: u128,
    pub maker: String,
    pub taker: Option<String>,
    pub stake: u64,
    pub url_hash: String,
    pub expiry_ts: u64,
    pub maker_expects_true: bool,
    pub state: u8,
    pub created_at: u64,
}

impl From<&Market> for MarketView {
    fn from(market: &Market) -> Self {
        Self {
            id: market.id,
            maker: market.maker.clone(),
            taker: market.taker.clone(),
            stake: market.stake,
            url_hash: market.url_hash.clone(),
            expiry_ts: market.expiry_ts,
            maker_expects_true: market.maker_expects_true,
            state: market.state.tag(),
            created_at: market.created_at,
        }
    }
}
