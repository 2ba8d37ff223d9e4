use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::credential::{CredentialVerifier, TokenError};
use super::principal::Identity;
use crate::security;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("identity already exists: {0}")]
    Duplicate(String),
    #[error("store operation cancelled")]
    Cancelled,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Stored account: the identity plus its password hash, which never leaves the store layer.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub identity: Identity,
    pub password_hash: String,
}

/// Read/write access to persisted identities. Owned by the account flows; the
/// admission path only ever calls `find_by_id`.
pub trait IdentityStore: Send + Sync {
    fn find_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Identity>, StoreError>>;
    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<IdentityRecord>, StoreError>>;
    fn insert(&self, record: IdentityRecord) -> BoxFuture<'_, Result<(), StoreError>>;
    fn set_active<'a>(&'a self, id: &'a str, active: bool) -> BoxFuture<'a, Result<bool, StoreError>>;
}

#[derive(Default)]
struct MemoryInner {
    by_id: HashMap<String, IdentityRecord>,
    email_index: HashMap<String, String>,
}

/// In-process identity store keyed by id with a unique email index.
#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.inner.read().by_id.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl IdentityStore for MemoryIdentityStore {
    fn find_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Identity>, StoreError>> {
        Box::pin(async move { Ok(self.inner.read().by_id.get(id).map(|r| r.identity.clone())) })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<IdentityRecord>, StoreError>> {
        Box::pin(async move {
            let key = security::normalize_email(email);
            let g = self.inner.read();
            Ok(g.email_index.get(&key).and_then(|id| g.by_id.get(id)).cloned())
        })
    }

    fn insert(&self, record: IdentityRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let key = security::normalize_email(&record.identity.email);
            let mut g = self.inner.write();
            if g.email_index.contains_key(&key) {
                return Err(StoreError::Duplicate(key));
            }
            if g.by_id.contains_key(&record.identity.id) {
                return Err(StoreError::Duplicate(record.identity.id.clone()));
            }
            g.email_index.insert(key, record.identity.id.clone());
            g.by_id.insert(record.identity.id.clone(), record);
            Ok(())
        })
    }

    fn set_active<'a>(&'a self, id: &'a str, active: bool) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let mut g = self.inner.write();
            match g.by_id.get_mut(id) {
                Some(rec) => {
                    rec.identity.active = active;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("identity not found")]
    NotFound,
    #[error("identity is inactive")]
    Inactive,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Maps a verified id to an eligible identity. Never caches: activation can change
/// between calls, so every request and handshake reads the store again.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self { Self { store } }

    pub async fn resolve(&self, id: &str) -> Result<Identity, ResolveError> {
        let identity = self.store.find_by_id(id).await?.ok_or(ResolveError::NotFound)?;
        if !identity.active {
            return Err(ResolveError::Inactive);
        }
        Ok(identity)
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub identity: Identity,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Local account flows: registration, login and provisioning against an [`IdentityStore`].
pub struct LocalAuthProvider {
    store: Arc<dyn IdentityStore>,
    verifier: Arc<CredentialVerifier>,
}

impl LocalAuthProvider {
    pub fn new(store: Arc<dyn IdentityStore>, verifier: Arc<CredentialVerifier>) -> Self { Self { store, verifier } }

    pub async fn register(&self, req: &RegisterRequest) -> Result<LoginResponse, AccountError> {
        let identity = self
            .provision(&req.email, &req.password, &req.full_name, Vec::<String>::new())
            .await?;
        let token = self.verifier.issue(&identity.id)?;
        info!(target: "auth", "auth.register user={}", identity.id);
        Ok(LoginResponse { identity, token })
    }

    /// Unknown email, wrong password and deactivated accounts are indistinguishable to the caller.
    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AccountError> {
        let Some(record) = self.store.find_by_email(&req.email).await? else {
            return Err(AccountError::InvalidCredentials);
        };
        if !record.identity.active {
            warn!(target: "auth", "auth.login refused for inactive user={}", record.identity.id);
            return Err(AccountError::InvalidCredentials);
        }
        if !security::verify_password(&record.password_hash, &req.password) {
            return Err(AccountError::InvalidCredentials);
        }
        let token = self.verifier.issue(&record.identity.id)?;
        crate::tprintln!("auth.login user={}", record.identity.id);
        Ok(LoginResponse { identity: record.identity, token })
    }

    /// Create an active identity with the given roles (base role when empty).
    pub async fn provision<I, S>(&self, email: &str, password: &str, full_name: &str, roles: I) -> Result<Identity, AccountError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let password_hash = security::hash_password(password).map_err(|e| AccountError::Hash(e.to_string()))?;
        let identity = Identity::new(
            uuid::Uuid::new_v4().to_string(),
            security::normalize_email(email),
            full_name.trim(),
            roles,
        );
        self.store.insert(IdentityRecord { identity: identity.clone(), password_hash }).await?;
        Ok(identity)
    }

    pub async fn deactivate(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self.store.set_active(id, false).await?;
        if changed { info!(target: "auth", "auth.deactivate user={}", id); }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::principal::ROLE_ADMIN;
    use std::time::Duration;

    fn provider() -> (Arc<MemoryIdentityStore>, LocalAuthProvider) {
        let store = Arc::new(MemoryIdentityStore::new());
        let verifier = Arc::new(CredentialVerifier::new("test-secret", Duration::from_secs(60), 0).unwrap());
        (store.clone(), LocalAuthProvider::new(store, verifier))
    }

    #[tokio::test]
    async fn resolve_reports_not_found_and_inactive() {
        let (store, accounts) = provider();
        let resolver = IdentityResolver::new(store.clone());
        assert_eq!(resolver.resolve("missing").await.unwrap_err(), ResolveError::NotFound);

        let id = accounts.provision("a@b.c", "Pass123", "Ann", [ROLE_ADMIN]).await.unwrap();
        assert_eq!(resolver.resolve(&id.id).await.unwrap().id, id.id);

        assert!(accounts.deactivate(&id.id).await.unwrap());
        assert_eq!(resolver.resolve(&id.id).await.unwrap_err(), ResolveError::Inactive);
    }

    #[tokio::test]
    async fn register_normalizes_and_rejects_duplicates() {
        let (store, accounts) = provider();
        let req = RegisterRequest { email: "  Ann@Example.com ".into(), password: "Pass123".into(), full_name: " Ann Lee ".into() };
        let resp = accounts.register(&req).await.unwrap();
        assert_eq!(resp.identity.email, "ann@example.com");
        assert_eq!(resp.identity.full_name, "Ann Lee");
        assert!(resp.identity.has_role("user"));
        assert!(!resp.token.is_empty());
        assert_eq!(store.len(), 1);

        let again = RegisterRequest { email: "ANN@example.com".into(), ..req };
        assert!(matches!(accounts.register(&again).await, Err(AccountError::Store(StoreError::Duplicate(_)))));
    }

    #[tokio::test]
    async fn login_hides_failure_cause() {
        let (_store, accounts) = provider();
        let id = accounts.provision("a@b.c", "Pass123", "Ann", Vec::<String>::new()).await.unwrap();

        let ok = accounts.login(&LoginRequest { email: "A@B.C".into(), password: "Pass123".into() }).await.unwrap();
        assert_eq!(ok.identity.id, id.id);

        let wrong = accounts.login(&LoginRequest { email: "a@b.c".into(), password: "nope".into() }).await;
        assert!(matches!(wrong, Err(AccountError::InvalidCredentials)));
        let unknown = accounts.login(&LoginRequest { email: "x@y.z".into(), password: "Pass123".into() }).await;
        assert!(matches!(unknown, Err(AccountError::InvalidCredentials)));

        accounts.deactivate(&id.id).await.unwrap();
        let inactive = accounts.login(&LoginRequest { email: "a@b.c".into(), password: "Pass123".into() }).await;
        assert!(matches!(inactive, Err(AccountError::InvalidCredentials)));
    }
}
