// Application state management

use std::fs;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::engine::market::{BettingMarket, EngineSnapshot};
use crate::engine::token::BookLedger;
use crate::engine::verifier::AttestorVerifier;
use crate::proxy::AttestorClient;

pub type SharedState = Arc<Mutex<AppState>>;

const STATE_FILE: &str = "data/state.json";

pub struct AppState {
    pub engine: BettingMarket<BookLedger, AttestorVerifier>,
    pub attestor: Arc<AttestorClient>,
    pub activity: Vec<String>,
    pub faucet_amount: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    snapshot: EngineSnapshot,
    ledger: BookLedger,
}

impl AppState {
    pub fn new() -> Self {
        println!("🎲 Initializing peerbet settlement engine...");

        let attestor = Arc::new(AttestorClient::from_env());

        let mut trusted: Vec<String> = std::env::var("ATTESTOR_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if let Some(key) = attestor.mock_public_key() {
            println!("🧪 Mock attestor enabled ({}…)", &key[..12]);
            trusted.push(key);
        }
        let quorum = std::env::var("ATTESTOR_QUORUM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let verifier = AttestorVerifier::new(trusted, quorum);

        let faucet_amount = std::env::var("FAUCET_AMOUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        let mut state = Self {
            engine: BettingMarket::new(BookLedger::new(), verifier),
            attestor,
            activity: Vec::new(),
            faucet_amount,
        };

        if state.load_from_disk().is_ok() {
            println!("✅ Loaded persisted state from disk");
        } else {
            println!("ℹ️  No persisted state found, starting fresh");
        }

        state
    }

    pub fn log_activity(&mut self, emoji: &str, action: &str, details: &str) {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let entry = format!("[{}] {} {} | {}", timestamp, emoji, action, details);
        println!("{}", entry);
        self.activity.push(entry);
        if self.activity.len() > 1000 {
            self.activity.remove(0);
        }
    }

    pub fn save_to_disk(&self) -> Result<(), String> {
        let persisted = PersistedState {
            snapshot: self.engine.snapshot(),
            ledger: self.engine.token().clone(),
        };

        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;

        fs::create_dir_all("data").map_err(|e| format!("Failed to create data dir: {}", e))?;
        fs::write(STATE_FILE, json).map_err(|e| format!("Failed to write state file: {}", e))?;

        println!("💾 State saved to disk");
        Ok(())
    }

    fn load_from_disk(&mut self) -> Result<(), String> {
        let json = fs::read_to_string(STATE_FILE).map_err(|_| "No state file found".to_string())?;

        let persisted: PersistedState = serde_json::from_str(&json)
            .map_err(|e| format!("Failed to deserialize state: {}", e))?;

        self.engine.restore(persisted.snapshot);
        *self.engine.token_mut() = persisted.ledger;
        Ok(())
    }
}
