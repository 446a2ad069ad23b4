//! HTTP API
//!
//! - [`server`]: router composition and middleware layering
//! - [`handlers`]: endpoint handlers and the send pipeline

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::ApiServer;
