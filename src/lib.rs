/// peerbet - Peer-to-Peer Betting Markets Settled by zkTLS Web Proofs
/// Exports all modules for use as a library crate

pub mod app_state;
pub mod engine;
pub mod handlers;
pub mod models;
pub mod proxy;

// Re-export the settlement core
pub use engine::clock::{Clock, ManualClock, SystemClock};
pub use engine::events::MarketEvent;
pub use engine::market::{
    BettingMarket, EngineSnapshot, Market, MarketError, MarketState, MIN_EXPIRY_LEAD_SECS,
    OUTCOME_FIELD, REFUND_DELAY_SECS,
};
pub use engine::token::{BookLedger, TokenError, TokenLedger};
pub use engine::verifier::{
    keccak_hex, Attestation, AttestorVerifier, ClaimData, ClaimInfo, MockAttestor, ProofVerifier,
    SignedClaim, VerifyError, WebProof,
};

// Re-export the proxy layer
pub use proxy::{AttestorClient, ProofBundle};
