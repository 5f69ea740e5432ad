//! Usage: Control API server (account facade) and the credential interception pipeline.

pub mod intercept;
mod listen;
mod manager;
mod responses;
mod routes;
pub mod source;

pub use manager::GatewayManager;
pub use routes::build_router;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub running: bool,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub listen_addr: Option<String>,
}
