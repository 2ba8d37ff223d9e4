//!
//! gatekeep HTTP/WS server
//! ------------------------
//! Axum-based HTTP API and realtime WebSocket gateway.
//!
//! Responsibilities:
//! - Account endpoints (register/login) backed by the identity store.
//! - Per-operation admission through the `RequestGate` using a static policy table.
//! - WebSocket gateway: handshake admission, single-session registration, membership
//!   broadcasts and the chat relay.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::{get, post}, Router};
use tracing::info;

use crate::config::GatekeepConfig;
use crate::identity::{
    CredentialVerifier, IdentityStore, LocalAuthProvider, MemoryIdentityStore, PolicyTable, RequestGate,
    SessionRegistry, ROLE_ADMIN, ROLE_SUPER_USER,
};

pub mod auth_routes;
pub mod ws;

pub const OP_AUTH_REGISTER: &str = "auth.register";
pub const OP_AUTH_LOGIN: &str = "auth.login";
pub const OP_AUTH_PRIVATE: &str = "auth.private";
pub const OP_AUTH_PRIVATE2: &str = "auth.private2";
pub const OP_REALTIME_CONNECT: &str = "realtime.connect";

/// Operation table for every route the server exposes.
pub fn default_policies() -> PolicyTable {
    PolicyTable::builder()
        .public(OP_AUTH_REGISTER)
        .public(OP_AUTH_LOGIN)
        .authenticated(OP_AUTH_PRIVATE)
        .roles(OP_AUTH_PRIVATE2, [ROLE_ADMIN, ROLE_SUPER_USER])
        .authenticated(OP_REALTIME_CONNECT)
        .build()
}

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: RequestGate,
    pub accounts: Arc<LocalAuthProvider>,
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(store: Arc<dyn IdentityStore>, verifier: Arc<CredentialVerifier>, policies: PolicyTable) -> Self {
        Self {
            gate: RequestGate::new(verifier.clone(), store.clone(), policies),
            accounts: Arc::new(LocalAuthProvider::new(store, verifier)),
            registry: SessionRegistry::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "gatekeep ok" }))
        .route("/api/auth/register", post(auth_routes::register))
        .route("/api/auth/login", post(auth_routes::login))
        .route("/api/auth/private", get(auth_routes::private))
        .route("/api/auth/private2", get(auth_routes::private2))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Build state from configuration, provision the optional seed admin and serve until shutdown.
pub async fn run(config: GatekeepConfig) -> anyhow::Result<()> {
    let verifier = CredentialVerifier::new(&config.jwt_secret, config.token_ttl, config.token_leeway_secs)
        .context("While building credential verifier")?;
    let store: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let state = AppState::new(store, Arc::new(verifier), default_policies());

    if let Some((email, password)) = &config.seed_admin {
        let admin = state
            .accounts
            .provision(email, password, "Administrator", [ROLE_ADMIN, ROLE_SUPER_USER])
            .await
            .with_context(|| format!("While provisioning seed admin {email}"))?;
        info!(target: "startup", "seed admin provisioned: id={} email={}", admin.id, admin.email);
    }

    let app = router(state);
    let addr: SocketAddr = config.bind_addr;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OperationPolicy;

    #[test]
    fn every_route_has_a_policy() {
        let table = default_policies();
        for op in [OP_AUTH_REGISTER, OP_AUTH_LOGIN, OP_AUTH_PRIVATE, OP_AUTH_PRIVATE2, OP_REALTIME_CONNECT] {
            assert!(table.get(op).is_some(), "missing policy for {op}");
        }
        assert_eq!(table.get(OP_AUTH_LOGIN), Some(&OperationPolicy::Public));
        assert_eq!(table.get(OP_REALTIME_CONNECT), Some(&OperationPolicy::Authenticated));
    }
}
