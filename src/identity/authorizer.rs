use std::collections::{BTreeSet, HashMap};

use super::gate::AdmissionError;
use super::principal::Identity;

/// Admission tier declared for an operation.
///
/// `Public` skips identity resolution entirely. `Authenticated` requires a valid
/// credential for an active identity but no particular role. `Roles` additionally
/// requires at least one of the listed roles (logical OR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPolicy {
    Public,
    Authenticated,
    Roles(BTreeSet<String>),
}

impl OperationPolicy {
    /// An empty role list is the authenticated-only tier.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        if set.is_empty() { OperationPolicy::Authenticated } else { OperationPolicy::Roles(set) }
    }

    pub fn is_public(&self) -> bool { matches!(self, OperationPolicy::Public) }

    pub fn required_roles(&self) -> Option<&BTreeSet<String>> {
        match self {
            OperationPolicy::Roles(r) => Some(r),
            _ => None,
        }
    }
}

/// Allow iff `required` is empty or shares at least one role with the identity.
pub fn authorize(identity: &Identity, required: &BTreeSet<String>) -> Result<(), AdmissionError> {
    if required.is_empty() {
        return Ok(());
    }
    if required.iter().any(|r| identity.has_role(r)) {
        return Ok(());
    }
    tracing::debug!(target: "auth", "authorize denied user={} required={:?}", identity.id, required);
    Err(AdmissionError::Forbidden)
}

/// Static operation → policy table, declared once at startup and immutable after `build()`.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    ops: HashMap<String, OperationPolicy>,
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder { PolicyTableBuilder::default() }

    pub fn get(&self, operation: &str) -> Option<&OperationPolicy> { self.ops.get(operation) }

    pub fn len(&self) -> usize { self.ops.len() }

    pub fn is_empty(&self) -> bool { self.ops.is_empty() }
}

#[derive(Debug, Default)]
pub struct PolicyTableBuilder {
    ops: HashMap<String, OperationPolicy>,
}

impl PolicyTableBuilder {
    pub fn public(self, operation: &str) -> Self { self.declare(operation, OperationPolicy::Public) }

    pub fn authenticated(self, operation: &str) -> Self { self.declare(operation, OperationPolicy::Authenticated) }

    pub fn roles<I, S>(self, operation: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declare(operation, OperationPolicy::roles(roles))
    }

    /// Later declarations for the same operation replace earlier ones.
    pub fn declare(mut self, operation: &str, policy: OperationPolicy) -> Self {
        self.ops.insert(operation.to_string(), policy);
        self
    }

    pub fn build(self) -> PolicyTable { PolicyTable { ops: self.ops } }
}
