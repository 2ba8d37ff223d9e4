use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::authorizer::{authorize, OperationPolicy, PolicyTable};
use super::credential::CredentialVerifier;
use super::principal::Identity;
use super::provider::{IdentityResolver, IdentityStore, ResolveError, StoreError};
use super::request_context::RequestContext;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// Missing, malformed, expired or wrongly signed token, or an unknown/inactive identity.
    #[error("invalid credential")]
    InvalidCredential,
    #[error("forbidden")]
    Forbidden,
    #[error("admission cancelled")]
    Cancelled,
    #[error("identity store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<ResolveError> for AdmissionError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound | ResolveError::Inactive => AdmissionError::InvalidCredential,
            ResolveError::Store(StoreError::Cancelled) => AdmissionError::Cancelled,
            ResolveError::Store(other) => AdmissionError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Per-operation admission check shared by HTTP handlers and realtime handshakes.
///
/// Order is fixed: public short-circuit, credential verification, identity
/// resolution, then role authorization. A role set is never checked before the
/// identity behind it is confirmed active.
#[derive(Clone)]
pub struct RequestGate {
    verifier: Arc<CredentialVerifier>,
    resolver: IdentityResolver,
    policies: Arc<PolicyTable>,
}

impl RequestGate {
    pub fn new(verifier: Arc<CredentialVerifier>, store: Arc<dyn IdentityStore>, policies: PolicyTable) -> Self {
        Self { verifier, resolver: IdentityResolver::new(store), policies: Arc::new(policies) }
    }

    pub fn verifier(&self) -> &Arc<CredentialVerifier> { &self.verifier }

    pub async fn admit(&self, token: Option<&str>, policy: &OperationPolicy) -> Result<Option<Identity>, AdmissionError> {
        if policy.is_public() {
            return Ok(None);
        }
        let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(AdmissionError::InvalidCredential)?;
        let payload = self.verifier.verify(token)?;
        let identity = match self.resolver.resolve(&payload.id).await {
            Ok(identity) => identity,
            Err(err) => {
                debug!(target: "auth", "admission refused for id={}: {}", payload.id, err);
                return Err(err.into());
            }
        };
        if let Some(required) = policy.required_roles() {
            authorize(&identity, required)?;
        }
        Ok(Some(identity))
    }

    /// Admit a call to a declared operation. Undeclared operations are refused.
    pub async fn admit_operation(&self, operation: &str, token: Option<&str>) -> Result<RequestContext, AdmissionError> {
        let Some(policy) = self.policies.get(operation) else {
            warn!(target: "auth", "admission for undeclared operation '{}' refused", operation);
            return Err(AdmissionError::Forbidden);
        };
        let identity = self.admit(token, policy).await?;
        Ok(RequestContext::new(operation, identity))
    }
}

/// Extract a credential from an `Authorization`/`authentication` header value.
/// Accepts both `Bearer <token>` and a bare token.
pub fn bearer_token(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("bearer") { return None; }
    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        None => raw,
    };
    if token.is_empty() { None } else { Some(token) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_forms() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token(""), None);
    }

    #[test]
    fn resolve_failures_are_confidential() {
        assert_eq!(AdmissionError::from(ResolveError::NotFound), AdmissionError::InvalidCredential);
        assert_eq!(AdmissionError::from(ResolveError::Inactive), AdmissionError::InvalidCredential);
        assert_eq!(AdmissionError::from(ResolveError::Store(StoreError::Cancelled)), AdmissionError::Cancelled);
        assert!(matches!(
            AdmissionError::from(ResolveError::Store(StoreError::Unavailable("down".into()))),
            AdmissionError::StoreUnavailable(_)
        ));
    }
}
