// HTTP request handlers for the peerbet API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};

use crate::app_state::SharedState;
use crate::engine::events::MarketEvent;
use crate::engine::market::MarketError;
use crate::engine::token::TokenLedger;
use crate::models::*;

type Rejection = (StatusCode, Json<Value>);

fn rejection(err: &MarketError) -> Rejection {
    let status = match err {
        MarketError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "success": false, "error": err.to_string() })))
}

fn parse_id(raw: &str) -> Result<u128, Rejection> {
    raw.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "bad market id" })),
        )
    })
}

// ===== MARKET ENDPOINTS =====

pub async fn get_markets(State(state): State<SharedState>) -> Json<Value> {
    let app = state.lock().unwrap();
    let mut markets: Vec<MarketView> = app.engine.markets().map(MarketView::from).collect();
    markets.sort_by_key(|m| m.id);
    Json(json!({ "markets": markets }))
}

pub async fn get_market(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Rejection> {
    let id = parse_id(&id)?;
    let app = state.lock().unwrap();
    let market = app
        .engine
        .market(id)
        .map(MarketView::from)
        .ok_or_else(|| rejection(&MarketError::NotFound))?;
    Ok(Json(json!({ "market": market })))
}

pub async fn create_market(
    State(state): State<SharedState>,
    Json(req): Json<CreateMarketRequest>,
) -> Result<Json<Value>, Rejection> {
    let mut app = state.lock().unwrap();
    app.engine
        .create_market(
            &req.maker,
            req.id,
            &req.url,
            req.stake,
            req.expiry_ts,
            req.maker_expects_true,
        )
        .map_err(|e| rejection(&e))?;

    app.log_activity(
        "📊",
        "MARKET_CREATED",
        &format!(
            "{} opened market {} | stake {} | expects {} | expiry {}",
            req.maker, req.id, req.stake, req.maker_expects_true, req.expiry_ts
        ),
    );

    let market = app.engine.market(req.id).map(MarketView::from);
    Ok(Json(json!({ "success": true, "market": market })))
}

pub async fn take_market(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<TakeMarketRequest>,
) -> Result<Json<Value>, Rejection> {
    let id = parse_id(&id)?;
    let mut app = state.lock().unwrap();
    app.engine
        .take_market(&req.taker, id, req.stake)
        .map_err(|e| rejection(&e))?;

    app.log_activity(
        "🎯",
        "MARKET_TAKEN",
        &format!("{} took market {} | stake {}", req.taker, id, req.stake),
    );

    let market = app.engine.market(id).map(MarketView::from);
    Ok(Json(json!({ "success": true, "market": market })))
}

pub async fn settle_market(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<SettleMarketRequest>,
) -> Result<Json<Value>, Rejection> {
    let id = parse_id(&id)?;
    let mut app = state.lock().unwrap();
    app.engine.settle(id, &req.proof).map_err(|e| rejection(&e))?;

    let winner = app.engine.events().iter().rev().find_map(|e| match e {
        MarketEvent::Settled { id: event_id, winner } if *event_id == id => Some(winner.clone()),
        _ => None,
    });
    if let Some(ref winner) = winner {
        app.log_activity(
            "✅",
            "MARKET_SETTLED",
            &format!("market {} settled | pool paid to {}", id, winner),
        );
    }

    let market = app.engine.market(id).map(MarketView::from);
    Ok(Json(json!({ "success": true, "winner": winner, "market": market })))
}

pub async fn cancel_market(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<CancelMarketRequest>,
) -> Result<Json<Value>, Rejection> {
    let id = parse_id(&id)?;
    let mut app = state.lock().unwrap();
    app.engine.cancel(&req.caller, id).map_err(|e| rejection(&e))?;

    app.log_activity(
        "↩️",
        "MARKET_CANCELLED",
        &format!("market {} cancelled by {} | stakes refunded", id, req.caller),
    );

    let market = app.engine.market(id).map(MarketView::from);
    Ok(Json(json!({ "success": true, "market": market })))
}

// ===== WALLET / TOKEN ENDPOINTS =====

/// Simple wallet connection - creates and funds the account if new.
pub async fn connect_wallet(
    State(state): State<SharedState>,
    Json(req): Json<ConnectWalletRequest>,
) -> Json<Value> {
    let mut app = state.lock().unwrap();

    let is_new = !app.engine.token().has_account(&req.wallet_address);
    if is_new {
        let amount = app.faucet_amount;
        app.engine.token_mut().mint(&req.wallet_address, amount);
        app.log_activity(
            "🆕",
            "NEW_WALLET",
            &format!("{} connected | funded with {}", req.wallet_address, amount),
        );
    }

    let balance = app.engine.token().balance_of(&req.wallet_address);
    Json(json!({
        "success": true,
        "wallet_address": req.wallet_address,
        "balance": balance,
        "is_new_account": is_new,
    }))
}

pub async fn get_balance(
    State(state): State<SharedState>,
    Path(account): Path<String>,
) -> Json<Value> {
    let app = state.lock().unwrap();
    let balance = app.engine.token().balance_of(&account);
    let escrow = app.engine.escrow_account().to_string();
    let allowance = app.engine.token().allowance(&account, &escrow);
    Json(json!({
        "account": account,
        "balance": balance,
        "escrow_allowance": allowance,
    }))
}

/// Grant the escrow account the right to pull stakes from `owner`.
pub async fn approve_escrow(
    State(state): State<SharedState>,
    Json(req): Json<ApproveRequest>,
) -> Json<Value> {
    let mut app = state.lock().unwrap();
    let escrow = app.engine.escrow_account().to_string();
    app.engine.token_mut().approve(&req.owner, &escrow, req.amount);

    Json(json!({
        "success": true,
        "owner": req.owner,
        "spender": escrow,
        "allowance": req.amount,
    }))
}

// ===== PROOF PROXY =====

/// Ask the attestation network (or the mock attestor) to prove a content
/// match, returning the proof in the layout `settle` expects.
pub async fn generate_proof(
    State(state): State<SharedState>,
    Query(params): Query<GenerateProofParams>,
) -> Result<Json<Value>, Rejection> {
    // clone the client out so the lock is not held across the network call
    let client = state.lock().unwrap().attestor.clone();

    match client.generate_proof(&params.url, &params.pattern).await {
        Ok(bundle) => Ok(Json(json!(bundle))),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e })),
        )),
    }
}

// ===== INDEXER FEED =====

pub async fn get_events(State(state): State<SharedState>) -> Json<Value> {
    let app = state.lock().unwrap();
    Json(json!({ "events": app.engine.events() }))
}

pub async fn get_ledger_activity(State(state): State<SharedState>) -> Json<Value> {
    let app = state.lock().unwrap();
    Json(json!({ "activity": app.activity }))
}
