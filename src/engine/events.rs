// Market lifecycle events for off-chain indexers and UIs.
//
// The creation event carries the raw data-source URL; the market record
// itself only stores the hash commitment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    Created {
        id: u128,
        maker: String,
        stake: u64,
        url: String,
        expiry_ts: u64,
        maker_expects_true: bool,
    },
    Taken {
        id: u128,
        taker: String,
        stake: u64,
    },
    Settled {
        id: u128,
        winner: String,
    },
    Cancelled {
        id: u128,
    },
}
