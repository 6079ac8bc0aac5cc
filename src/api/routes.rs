//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        // Chain
        .route(
            "/blocks",
            get(handlers::get_blocks).post(handlers::mine_block),
        )
        .route("/blocks/latest", get(handlers::get_latest_block))
        .route("/blocks/{index}", get(handlers::get_block_by_index))
        // Transactions
        .route(
            "/transactions",
            get(handlers::get_mempool).post(handlers::send_transaction),
        )
        .route("/unspent", get(handlers::get_unspent))
        .route("/balance/{address}", get(handlers::get_balance))
        // This node's wallet
        .route("/me/address", get(handlers::get_my_address))
        .route("/me/balance", get(handlers::get_my_balance))
        .route("/me/unspent", get(handlers::get_my_unspent))
        // Peers
        .route("/peers", get(handlers::get_peers))
        .route("/peers", post(handlers::add_peer))
        // Add state and middleware
        .with_state(state)
        .layer(cors)
}
