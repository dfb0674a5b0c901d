// ============================================================================
// Betting Market Engine - Escrow & Settlement State Machine
// ============================================================================
//
// A market escrows equal stakes from two parties on a binary outcome and
// resolves against a web proof: the maker predicts the attested value, the
// taker holds the opposite side, and the full pool goes to whichever side
// the attested outcome picks.
//
// State machine:
//   Open --take--> Filled --settle--> Settled
//   Open --cancel (maker only)--> Cancelled
//   Filled --cancel (either side, after expiry + refund delay)--> Cancelled
//
// Every operation is atomic: it completes in full or leaves market state and
// escrowed funds untouched.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::events::MarketEvent;
use super::token::{TokenError, TokenLedger};
use super::verifier::{keccak_hex, ProofVerifier, VerifyError, WebProof};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Minimum lead between creation and expiry (30 minutes). A market whose
/// outcome is due sooner cannot realistically be filled and settled.
pub const MIN_EXPIRY_LEAD_SECS: u64 = 30 * 60;

/// How long after expiry a filled market stays locked before the mutual
/// refund path opens (24 hours).
pub const REFUND_DELAY_SECS: u64 = 24 * 60 * 60;

/// Context field the boolean outcome is read from.
pub const OUTCOME_FIELD: &str = "theWinner";

// ============================================================================
// MARKET RECORD
// ============================================================================

/// Lifecycle stage of a market. Transitions only move forward; Settled and
/// Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketState {
    Open,
    Filled,
    Settled,
    Cancelled,
}

impl MarketState {
    /// Numeric tag used on the query surface.
    pub fn tag(&self) -> u8 {
        match self {
            MarketState::Open => 0,
            MarketState::Filled => 1,
            MarketState::Settled => 2,
            MarketState::Cancelled => 3,
        }
    }
}

/// A single two-sided bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Caller-chosen unique identifier.
    pub id: u128,

    /// Party who created the market and escrowed the first stake.
    pub maker: String,

    /// Party on the opposite side; absent until the market is taken.
    pub taker: Option<String>,

    /// Stake each side escrows, in token base units. Symmetric by design.
    pub stake: u64,

    /// Keccak-256 commitment to the data-source URL (hex). The raw URL is
    /// only emitted in the creation event.
    pub url_hash: String,

    /// Deadline by which the outcome must be knowable; also the start of
    /// the refund-eligibility window.
    pub expiry_ts: u64,

    /// The maker's prediction for the attested boolean.
    pub maker_expects_true: bool,

    pub state: MarketState,

    pub created_at: u64,
}

impl Market {
    /// Total escrowed funds once both sides have deposited.
    pub fn pool(&self) -> u64 {
        2 * self.stake
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Rejection reasons. The Display strings are the stable machine-checkable
/// reasons callers match on.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketError {
    IdTaken,
    StakeZero,
    ExpirySoon,
    NotFound,
    NotOpen,
    StakeMismatch,
    BadState,
    UrlMismatch,
    OutcomeUnreadable,
    NoRefund,
    Wait,
    Token(TokenError),
    Proof(VerifyError),
}

impl std::fmt::Display for MarketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketError::IdTaken => write!(f, "id taken"),
            MarketError::StakeZero => write!(f, "stake zero"),
            MarketError::ExpirySoon => write!(f, "expiry soon"),
            MarketError::NotFound => write!(f, "market not found"),
            MarketError::NotOpen => write!(f, "not open"),
            MarketError::StakeMismatch => write!(f, "stake mismatch"),
            MarketError::BadState => write!(f, "bad state"),
            MarketError::UrlMismatch => write!(f, "URL mismatch"),
            MarketError::OutcomeUnreadable => write!(f, "outcome unreadable"),
            MarketError::NoRefund => write!(f, "no refund"),
            MarketError::Wait => write!(f, "wait"),
            MarketError::Token(e) => write!(f, "token: {}", e),
            MarketError::Proof(e) => write!(f, "proof: {}", e),
        }
    }
}

impl std::error::Error for MarketError {}

impl From<TokenError> for MarketError {
    fn from(e: TokenError) -> Self {
        MarketError::Token(e)
    }
}

impl From<VerifyError> for MarketError {
    fn from(e: VerifyError) -> Self {
        MarketError::Proof(e)
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// The escrow/settlement engine. Owns every market record plus the event
/// log, and moves funds through the injected token ledger.
pub struct BettingMarket<L: TokenLedger, V: ProofVerifier> {
    markets: HashMap<u128, Market>,
    events: Vec<MarketEvent>,
    token: L,
    verifier: V,
    clock: Box<dyn Clock>,
    /// Ledger account every stake sits in until disbursement.
    escrow_account: String,
}

/// Serializable engine state for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub markets: HashMap<u128, Market>,
    pub events: Vec<MarketEvent>,
    pub escrow_account: String,
}

impl<L: TokenLedger, V: ProofVerifier> BettingMarket<L, V> {
    pub fn new(token: L, verifier: V) -> Self {
        Self::with_clock(token, verifier, Box::new(SystemClock))
    }

    pub fn with_clock(token: L, verifier: V, clock: Box<dyn Clock>) -> Self {
        Self {
            markets: HashMap::new(),
            events: Vec::new(),
            token,
            verifier,
            clock,
            escrow_account: format!("escrow_{}", Uuid::new_v4().simple()),
        }
    }

    // ===== ACCESSORS =====

    /// Full record for one market.
    pub fn market(&self, id: u128) -> Option<&Market> {
        self.markets.get(&id)
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    /// Emitted lifecycle events, oldest first.
    pub fn events(&self) -> &[MarketEvent] {
        &self.events
    }

    pub fn escrow_account(&self) -> &str {
        &self.escrow_account
    }

    pub fn escrow_balance(&self) -> u64 {
        self.token.balance_of(&self.escrow_account)
    }

    pub fn token(&self) -> &L {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut L {
        &mut self.token
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            markets: self.markets.clone(),
            events: self.events.clone(),
            escrow_account: self.escrow_account.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: EngineSnapshot) {
        self.markets = snapshot.markets;
        self.events = snapshot.events;
        self.escrow_account = snapshot.escrow_account;
    }

    // ===== OPERATIONS =====

    /// Open a new market: validate, pull the maker stake into escrow, store
    /// the record, emit the creation event carrying the raw URL.
    pub fn create_market(
        &mut self,
        maker: &str,
        id: u128,
        url: &str,
        stake: u64,
        expiry_ts: u64,
        maker_expects_true: bool,
    ) -> Result<(), MarketError> {
        if self.markets.contains_key(&id) {
            return Err(MarketError::IdTaken);
        }
        if stake == 0 {
            return Err(MarketError::StakeZero);
        }
        let now = self.clock.now();
        if expiry_ts < now + MIN_EXPIRY_LEAD_SECS {
            return Err(MarketError::ExpirySoon);
        }

        self.token.transfer_from(maker, &self.escrow_account, stake)?;

        self.markets.insert(
            id,
            Market {
                id,
                maker: maker.to_string(),
                taker: None,
                stake,
                url_hash: keccak_hex(url),
                expiry_ts,
                maker_expects_true,
                state: MarketState::Open,
                created_at: now,
            },
        );
        self.events.push(MarketEvent::Created {
            id,
            maker: maker.to_string(),
            stake,
            url: url.to_string(),
            expiry_ts,
            maker_expects_true,
        });
        Ok(())
    }

    /// Take the opposite side of an open market. The taker stake must equal
    /// the maker's exactly.
    pub fn take_market(&mut self, taker: &str, id: u128, taker_stake: u64) -> Result<(), MarketError> {
        {
            let market = self.markets.get(&id).ok_or(MarketError::NotFound)?;
            if market.state != MarketState::Open {
                return Err(MarketError::NotOpen);
            }
            if taker_stake != market.stake {
                return Err(MarketError::StakeMismatch);
            }
        }

        self.token.transfer_from(taker, &self.escrow_account, taker_stake)?;

        if let Some(market) = self.markets.get_mut(&id) {
            market.taker = Some(taker.to_string());
            market.state = MarketState::Filled;
        }
        self.events.push(MarketEvent::Taken {
            id,
            taker: taker.to_string(),
            stake: taker_stake,
        });
        Ok(())
    }

    /// Resolve a filled market against a web proof. Deliberately callable by
    /// any party: settlement correctness rests on the attestation, not on
    /// caller identity.
    pub fn settle(&mut self, id: u128, proof: &WebProof) -> Result<(), MarketError> {
        let market = self.markets.get(&id).ok_or(MarketError::NotFound)?;
        if market.state != MarketState::Filled {
            return Err(MarketError::BadState);
        }

        let attestation = self.verifier.verify(proof)?;
        if keccak_hex(&attestation.url) != market.url_hash {
            return Err(MarketError::UrlMismatch);
        }
        let outcome = match attestation.fields.get(OUTCOME_FIELD).map(String::as_str) {
            Some("true") => true,
            Some("false") => false,
            _ => return Err(MarketError::OutcomeUnreadable),
        };

        let winner = if outcome == market.maker_expects_true {
            market.maker.clone()
        } else {
            market.taker.clone().ok_or(MarketError::BadState)?
        };
        let pool = market.pool();

        self.token.transfer(&self.escrow_account, &winner, pool)?;
        if let Some(market) = self.markets.get_mut(&id) {
            market.state = MarketState::Settled;
        }
        self.events.push(MarketEvent::Settled { id, winner });
        Ok(())
    }

    /// Refund path. Open markets: maker only. Filled markets: either side,
    /// once the refund window after expiry has opened. The timeout is an
    /// explicit call; nothing fires on its own.
    pub fn cancel(&mut self, caller: &str, id: u128) -> Result<(), MarketError> {
        let market = self.markets.get(&id).ok_or(MarketError::NotFound)?;
        match market.state {
            MarketState::Open => {
                if caller != market.maker {
                    return Err(MarketError::NoRefund);
                }
                let maker = market.maker.clone();
                let stake = market.stake;
                self.token.transfer(&self.escrow_account, &maker, stake)?;
            }
            MarketState::Filled => {
                let taker = market.taker.clone().ok_or(MarketError::BadState)?;
                if caller != market.maker && caller != taker {
                    return Err(MarketError::NoRefund);
                }
                if self.clock.now() < market.expiry_ts + REFUND_DELAY_SECS {
                    return Err(MarketError::Wait);
                }
                let maker = market.maker.clone();
                let stake = market.stake;
                // a filled market escrows 2 * stake, both refunds are covered
                self.token.transfer(&self.escrow_account, &maker, stake)?;
                self.token.transfer(&self.escrow_account, &taker, stake)?;
            }
            MarketState::Settled | MarketState::Cancelled => return Err(MarketError::BadState),
        }

        if let Some(market) = self.markets.get_mut(&id) {
            market.state = MarketState::Cancelled;
        }
        self.events.push(MarketEvent::Cancelled { id });
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::engine::token::BookLedger;
    use crate::engine::verifier::{Attestation, ClaimData, ClaimInfo, SignedClaim};

    const URL: &str = "https://site.api.espn.com/apis/v2/sports/nba/scoreboard?dates=2026-05-02";
    const T0: u64 = 1_700_000_000;

    /// Accepts any proof and replays a fixed attestation.
    struct FixedVerifier {
        url: String,
        fields: Vec<(String, String)>,
    }

    impl FixedVerifier {
        fn outcome(url: &str, value: &str) -> Self {
            Self {
                url: url.to_string(),
                fields: vec![(OUTCOME_FIELD.to_string(), value.to_string())],
            }
        }
    }

    impl ProofVerifier for FixedVerifier {
        fn verify(&self, _proof: &WebProof) -> Result<Attestation, VerifyError> {
            Ok(Attestation {
                url: self.url.clone(),
                fields: self.fields.iter().cloned().collect(),
            })
        }
    }

    /// Rejects everything, as a dead attestation network would.
    struct RejectingVerifier;

    impl ProofVerifier for RejectingVerifier {
        fn verify(&self, _proof: &WebProof) -> Result<Attestation, VerifyError> {
            Err(VerifyError::NoSignatures)
        }
    }

    /// The engine never looks inside the proof, only the verifier does.
    fn dummy_proof() -> WebProof {
        WebProof {
            claim_info: ClaimInfo {
                provider: "http".to_string(),
                parameters: String::new(),
                context: String::new(),
            },
            signed_claim: SignedClaim {
                claim: ClaimData {
                    identifier: String::new(),
                    owner: String::new(),
                    timestamp_s: 0,
                    epoch: 0,
                },
                signatures: Vec::new(),
            },
        }
    }

    fn engine_with<V: ProofVerifier>(verifier: V) -> (BettingMarket<BookLedger, V>, ManualClock) {
        let clock = ManualClock::new(T0);
        let mut ledger = BookLedger::new();
        ledger.mint("maker", 1_000);
        ledger.mint("taker", 1_000);
        let mut engine = BettingMarket::with_clock(ledger, verifier, Box::new(clock.clone()));
        let escrow = engine.escrow_account().to_string();
        engine.token_mut().approve("maker", &escrow, 1_000);
        engine.token_mut().approve("taker", &escrow, 1_000);
        (engine, clock)
    }

    fn filled_market<V: ProofVerifier>(engine: &mut BettingMarket<BookLedger, V>) {
        engine
            .create_market("maker", 1, URL, 100, T0 + 3_600, true)
            .unwrap();
        engine.take_market("taker", 1, 100).unwrap();
    }

    #[test]
    fn create_escrows_the_maker_stake() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        engine
            .create_market("maker", 1, URL, 100, T0 + 3_600, true)
            .unwrap();

        let market = engine.market(1).unwrap();
        assert_eq!(market.state, MarketState::Open);
        assert_eq!(market.taker, None);
        assert_eq!(market.url_hash, keccak_hex(URL));
        assert_eq!(engine.token().balance_of("maker"), 900);
        assert_eq!(engine.escrow_balance(), 100);
    }

    #[test]
    fn create_validation_rejects_before_any_fund_movement() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        engine
            .create_market("maker", 1, URL, 100, T0 + 3_600, true)
            .unwrap();

        assert_eq!(
            engine.create_market("maker", 1, URL, 100, T0 + 3_600, true),
            Err(MarketError::IdTaken)
        );
        assert_eq!(
            engine.create_market("maker", 2, URL, 0, T0 + 3_600, true),
            Err(MarketError::StakeZero)
        );
        // 10 minutes out is under the 30 minute lead
        assert_eq!(
            engine.create_market("maker", 3, URL, 100, T0 + 600, true),
            Err(MarketError::ExpirySoon)
        );
        assert_eq!(engine.token().balance_of("maker"), 900);
        assert_eq!(engine.escrow_balance(), 100);
    }

    #[test]
    fn create_propagates_token_failure() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        let err = engine
            .create_market("pauper", 9, URL, 100, T0 + 3_600, true)
            .unwrap_err();
        assert!(matches!(err, MarketError::Token(_)));
        assert!(engine.market(9).is_none());
        assert_eq!(engine.escrow_balance(), 0);
    }

    #[test]
    fn take_fills_the_market() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        filled_market(&mut engine);

        let market = engine.market(1).unwrap();
        assert_eq!(market.state, MarketState::Filled);
        assert_eq!(market.taker.as_deref(), Some("taker"));
        assert_eq!(engine.escrow_balance(), 200);
    }

    #[test]
    fn take_rejects_stake_mismatch_and_non_open() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        engine
            .create_market("maker", 1, URL, 100, T0 + 3_600, true)
            .unwrap();

        assert_eq!(engine.take_market("taker", 1, 50), Err(MarketError::StakeMismatch));
        assert_eq!(engine.take_market("taker", 7, 100), Err(MarketError::NotFound));

        engine.take_market("taker", 1, 100).unwrap();
        assert_eq!(engine.take_market("taker", 1, 100), Err(MarketError::NotOpen));
    }

    #[test]
    fn settle_pays_the_maker_when_outcome_matches() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        filled_market(&mut engine);

        engine.settle(1, &dummy_proof()).unwrap();
        assert_eq!(engine.market(1).unwrap().state, MarketState::Settled);
        assert_eq!(engine.token().balance_of("maker"), 1_100);
        assert_eq!(engine.token().balance_of("taker"), 900);
        assert_eq!(engine.escrow_balance(), 0);
    }

    #[test]
    fn settle_pays_the_taker_when_outcome_differs() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "false"));
        filled_market(&mut engine);

        engine.settle(1, &dummy_proof()).unwrap();
        assert_eq!(engine.token().balance_of("maker"), 900);
        assert_eq!(engine.token().balance_of("taker"), 1_100);
    }

    #[test]
    fn settle_requires_a_filled_market() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        engine
            .create_market("maker", 1, URL, 100, T0 + 3_600, true)
            .unwrap();

        assert_eq!(engine.settle(1, &dummy_proof()), Err(MarketError::BadState));
        assert_eq!(engine.settle(7, &dummy_proof()), Err(MarketError::NotFound));
    }

    #[test]
    fn settle_rejects_url_mismatch_without_moving_funds() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome("https://google.com", "true"));
        filled_market(&mut engine);

        assert_eq!(engine.settle(1, &dummy_proof()), Err(MarketError::UrlMismatch));
        assert_eq!(engine.market(1).unwrap().state, MarketState::Filled);
        assert_eq!(engine.escrow_balance(), 200);
    }

    #[test]
    fn settle_rejects_unreadable_outcome() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "maybe"));
        filled_market(&mut engine);

        assert_eq!(engine.settle(1, &dummy_proof()), Err(MarketError::OutcomeUnreadable));
        assert_eq!(engine.market(1).unwrap().state, MarketState::Filled);
    }

    #[test]
    fn settle_propagates_verifier_rejection() {
        let (mut engine, _) = engine_with(RejectingVerifier);
        filled_market(&mut engine);

        let err = engine.settle(1, &dummy_proof()).unwrap_err();
        assert!(matches!(err, MarketError::Proof(_)));
        assert_eq!(engine.market(1).unwrap().state, MarketState::Filled);
    }

    #[test]
    fn open_cancel_is_maker_only_and_refunds() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        engine
            .create_market("maker", 1, URL, 50, T0 + 3_600, true)
            .unwrap();

        assert_eq!(engine.cancel("taker", 1), Err(MarketError::NoRefund));

        engine.cancel("maker", 1).unwrap();
        assert_eq!(engine.market(1).unwrap().state, MarketState::Cancelled);
        assert_eq!(engine.token().balance_of("maker"), 1_000);

        // terminal: a second cancel fails
        assert_eq!(engine.cancel("maker", 1), Err(MarketError::BadState));
    }

    #[test]
    fn filled_cancel_waits_for_the_refund_window() {
        let (mut engine, clock) = engine_with(FixedVerifier::outcome(URL, "true"));
        filled_market(&mut engine);
        let expiry = engine.market(1).unwrap().expiry_ts;

        clock.set(expiry + REFUND_DELAY_SECS - 60);
        assert_eq!(engine.cancel("maker", 1), Err(MarketError::Wait));

        clock.set(expiry + REFUND_DELAY_SECS + 60);
        assert_eq!(engine.cancel("stranger", 1), Err(MarketError::NoRefund));
        engine.cancel("taker", 1).unwrap();

        assert_eq!(engine.token().balance_of("maker"), 1_000);
        assert_eq!(engine.token().balance_of("taker"), 1_000);
        assert_eq!(engine.escrow_balance(), 0);
    }

    #[test]
    fn terminal_markets_reject_every_operation() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        filled_market(&mut engine);
        engine.settle(1, &dummy_proof()).unwrap();

        assert_eq!(engine.take_market("taker", 1, 100), Err(MarketError::NotOpen));
        assert_eq!(engine.settle(1, &dummy_proof()), Err(MarketError::BadState));
        assert_eq!(engine.cancel("maker", 1), Err(MarketError::BadState));
        assert_eq!(engine.escrow_balance(), 0);
    }

    #[test]
    fn events_trace_the_lifecycle() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        filled_market(&mut engine);
        engine.settle(1, &dummy_proof()).unwrap();

        let events = engine.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], MarketEvent::Created { id: 1, url, .. } if url == URL));
        assert!(matches!(&events[1], MarketEvent::Taken { id: 1, stake: 100, .. }));
        assert!(matches!(&events[2], MarketEvent::Settled { id: 1, winner } if winner == "maker"));
    }

    #[test]
    fn snapshot_roundtrip_preserves_markets() {
        let (mut engine, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        filled_market(&mut engine);

        let snapshot = engine.snapshot();
        let (mut fresh, _) = engine_with(FixedVerifier::outcome(URL, "true"));
        fresh.restore(snapshot);

        assert_eq!(fresh.market(1).unwrap().state, MarketState::Filled);
        assert_eq!(fresh.events().len(), 2);
        assert_eq!(fresh.escrow_account(), engine.escrow_account());
    }
}
