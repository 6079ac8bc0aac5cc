//! REST API module
//!
//! Provides HTTP access to the node.
//!
//! # Endpoints
//!
//! ## Chain
//! - `GET /blocks` - The whole chain
//! - `POST /blocks` - Mine a block paying this node
//! - `GET /blocks/latest` - The current tip
//! - `GET /blocks/{index}` - Block by index
//! - `GET /stats` - Chain statistics
//!
//! ## Transactions
//! - `GET /transactions` - Pending transactions
//! - `POST /transactions` - Pay `{address, amount}` from this node
//! - `GET /unspent` - Every unspent output
//! - `GET /balance/{address}` - Confirmed balance
//!
//! ## This node
//! - `GET /me/address`, `GET /me/balance`, `GET /me/unspent`
//!
//! ## Peers
//! - `GET /peers` - Connected peers
//! - `POST /peers` - Connect to `{peer}`

pub mod handlers;
pub mod routes;

pub use handlers::ApiState;
pub use routes::create_router;
