// ============================================================================
// Engine Module - Escrow & Settlement Core
// ============================================================================
//
// This module contains the betting market core:
//   - market: market records, the four public operations, outcome resolution
//   - token: fungible token interface and the in-process book ledger
//   - verifier: web proof types and attestor signature checking
//   - events: lifecycle events for off-chain indexers
//   - clock: injectable time source
//
// ============================================================================

pub mod clock;
pub mod events;
pub mod market;
pub mod token;
pub mod verifier;

pub use clock::*;
pub use events::*;
pub use market::*;
pub use token::*;
pub use verifier::*;
