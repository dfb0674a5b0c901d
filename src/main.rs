// peerbet - Peer-to-Peer Betting Markets Settled by zkTLS Web Proofs
// Axum server wiring the settlement engine, token ledger, and proof proxy

use axum::{
    routing::{get, post},
    Router,
};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tower_http::cors::{Any, CorsLayer};

mod app_state;
mod engine;
mod handlers;
mod models;
mod proxy;

use app_state::{AppState, SharedState};
use handlers::*;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    println!("\n═══════════════════════════════════════════════");
    println!("     🎲 peerbet - P2P Betting Markets");
    println!("═══════════════════════════════════════════════\n");

    // Initialize application state
    let state: SharedState = Arc::new(Mutex::new(AppState::new()));

    // Clone state for shutdown handler before moving into router
    let shutdown_state = state.clone();

    let app = Router::new()
        // ===== MARKET ENDPOINTS =====
        .route("/markets", get(get_markets))
        .route("/markets", post(create_market))
        .route("/markets/:id", get(get_market))
        .route("/markets/:id/take", post(take_market))
        .route("/markets/:id/settle", post(settle_market))
        .route("/markets/:id/cancel", post(cancel_market))
        // ===== WALLET / TOKEN ENDPOINTS =====
        .route("/auth/connect", post(connect_wallet))
        .route("/balance/:account", get(get_balance))
        .route("/approve", post(approve_escrow))
        // ===== PROOF PROXY =====
        .route("/generateProof", get(generate_proof))
        // ===== INDEXER FEED =====
        .route("/events", get(get_events))
        .route("/ledger", get(get_ledger_activity))
        // ===== HEALTH CHECK =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        // Apply CORS and state
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("\n╔════════════════════════════════════════════╗");
    println!("║   🚀 SERVER RUNNING                        ║");
    println!("║   📡 http://0.0.0.0:{:<5}                  ║", port);
    println!("╚════════════════════════════════════════════╝\n");

    println!("📋 Available Endpoints:");
    println!("   POST /auth/connect        - Connect wallet (creates & funds if new)");
    println!("   POST /approve             - Approve the escrow to pull stakes");
    println!("   GET  /markets             - List all markets");
    println!("   POST /markets             - Create market (escrows maker stake)");
    println!("   GET  /markets/:id         - Get market details");
    println!("   POST /markets/:id/take    - Take the opposite side");
    println!("   POST /markets/:id/settle  - Settle against a web proof");
    println!("   POST /markets/:id/cancel  - Cancel / refund");
    println!("   GET  /generateProof       - Request a proof for url + pattern");
    println!("   GET  /balance/:account    - Get token balance");
    println!("   GET  /events              - Market event feed");
    println!("   GET  /ledger              - Recent activity\n");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    // Save state on shutdown
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");

        println!("\n\n🛑 Shutdown signal received...");
        if let Ok(app_state) = shutdown_state.lock() {
            if let Err(e) = app_state.save_to_disk() {
                eprintln!("❌ Failed to save state: {}", e);
            }
        }
        println!("👋 Goodbye!\n");
        std::process::exit(0);
    });

    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> &'static str {
    "peerbet settlement engine - Online ✅"
}
