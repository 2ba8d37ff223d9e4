//! Identity, admission and realtime session management.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod credential;
mod provider;
mod authorizer;
mod request_context;
mod gate;
mod session;

pub use principal::{Identity, ROLE_USER, ROLE_ADMIN, ROLE_SUPER_USER};
pub use credential::{Claims, CredentialVerifier, TokenError, VerifiedPayload, MAX_TOKEN_TTL};
pub use provider::{
    AccountError, IdentityRecord, IdentityResolver, IdentityStore, LocalAuthProvider, LoginRequest, LoginResponse,
    MemoryIdentityStore, RegisterRequest, ResolveError, StoreError,
};
pub use authorizer::{authorize, OperationPolicy, PolicyTable, PolicyTableBuilder};
pub use request_context::RequestContext;
pub use gate::{bearer_token, AdmissionError, RequestGate};
pub use session::{
    Connection, Outbound, OutboundEvent, OutboundRx, OutboundTx, Registration, RegistryError, SessionRegistry,
    EVENT_CLIENT_UPDATE, UNKNOWN_DISPLAY_NAME,
};
