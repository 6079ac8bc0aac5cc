//! REST API handlers for node operations

use crate::core::{Block, ChainStats, Transaction, UnspentTxOut};
use crate::network::Node;
use crate::service::{NodeError, NodeService};
use crate::wallet::WalletError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub service: NodeService,
    /// Present when the node takes part in the P2P network
    pub node: Option<Node>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

#[derive(Debug, Serialize)]
pub struct PeerResponse {
    pub peer: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct AddPeerRequest {
    pub peer: String,
}

fn api_error(status: StatusCode, error: impl ToString) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
        }),
    )
}

/// Rejected input is a client error; anything else is ours
fn node_error(e: NodeError) -> (StatusCode, Json<ApiError>) {
    let status = match &e {
        NodeError::Blockchain(_) => StatusCode::BAD_REQUEST,
        NodeError::Wallet(WalletError::IoError(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        NodeError::Wallet(_) => StatusCode::BAD_REQUEST,
        NodeError::Mining(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /stats - Chain statistics
pub async fn get_stats(State(state): State<ApiState>) -> Json<ChainStats> {
    Json(state.service.stats().await)
}

/// GET /blocks - The whole chain
pub async fn get_blocks(State(state): State<ApiState>) -> Json<Vec<Block>> {
    Json(state.service.get_chain().await)
}

/// GET /blocks/latest - The current tip
pub async fn get_latest_block(State(state): State<ApiState>) -> Json<Block> {
    Json(state.service.latest_block().await)
}

/// GET /blocks/{index} - Get block by index
pub async fn get_block_by_index(
    State(state): State<ApiState>,
    Path(index): Path<u64>,
) -> ApiResult<Block> {
    state
        .service
        .get_block(index)
        .await
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Block at index {} not found", index),
            )
        })
}

/// POST /blocks - Mine a new block paying this node
pub async fn mine_block(State(state): State<ApiState>) -> ApiResult<Block> {
    state
        .service
        .append_mined_block()
        .await
        .map(Json)
        .map_err(node_error)
}

/// GET /transactions - Pending transactions
pub async fn get_mempool(State(state): State<ApiState>) -> Json<Vec<Transaction>> {
    Json(state.service.mempool_snapshot().await)
}

/// POST /transactions - Pay from this node's wallet
pub async fn send_transaction(
    State(state): State<ApiState>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<Transaction> {
    state
        .service
        .submit_payment(&req.address, req.amount)
        .await
        .map(Json)
        .map_err(node_error)
}

/// GET /unspent - Every unspent output
pub async fn get_unspent(State(state): State<ApiState>) -> Json<Vec<UnspentTxOut>> {
    Json(state.service.utxos().await)
}

/// GET /me/unspent - Unspent outputs owned by this node
pub async fn get_my_unspent(State(state): State<ApiState>) -> Json<Vec<UnspentTxOut>> {
    Json(state.service.my_utxos().await)
}

/// GET /me/address
pub async fn get_my_address(State(state): State<ApiState>) -> Json<AddressResponse> {
    Json(AddressResponse {
        address: state.service.address(),
    })
}

/// GET /me/balance
pub async fn get_my_balance(State(state): State<ApiState>) -> Json<BalanceResponse> {
    Json(BalanceResponse {
        address: state.service.address(),
        balance: state.service.my_balance().await,
    })
}

/// GET /balance/{address}
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let balance = state.service.get_balance(&address).await;
    Json(BalanceResponse { address, balance })
}

/// GET /peers - Connected peers
pub async fn get_peers(State(state): State<ApiState>) -> Json<Vec<String>> {
    let peers = match &state.node {
        Some(node) => node.peers().await.iter().map(|p| p.to_string()).collect(),
        None => Vec::new(),
    };
    Json(peers)
}

/// POST /peers - Connect to a peer
pub async fn add_peer(
    State(state): State<ApiState>,
    Json(req): Json<AddPeerRequest>,
) -> ApiResult<PeerResponse> {
    let Some(node) = &state.node else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "P2P networking is disabled",
        ));
    };

    node.connect_to(&req.peer)
        .await
        .map(|addr| {
            Json(PeerResponse {
                peer: addr.to_string(),
            })
        })
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e))
}
