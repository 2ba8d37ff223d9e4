use serde::Serialize;
use std::collections::BTreeSet;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPER_USER: &str = "superUser";

/// Resolved principal behind a request or realtime connection.
///
/// Read-only to this crate: identities are provisioned and deactivated by the
/// account flows against the identity store. `roles` is never empty; an identity
/// without elevated roles carries [`ROLE_USER`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub full_name: String,
    roles: BTreeSet<String>,
    #[serde(rename = "isActive")]
    pub active: bool,
}

impl Identity {
    pub fn new<I, S>(id: impl Into<String>, email: impl Into<String>, full_name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: BTreeSet<String> = roles
            .into_iter()
            .map(Into::into)
            .filter(|r: &String| !r.trim().is_empty())
            .collect();
        if set.is_empty() {
            set.insert(ROLE_USER.to_string());
        }
        Self { id: id.into(), email: email.into(), full_name: full_name.into(), roles: set, active: true }
    }

    pub fn roles(&self) -> &BTreeSet<String> { &self.roles }

    pub fn has_role(&self, role: &str) -> bool { self.roles.contains(role) }

    /// Label used for chat relays; falls back to the email when no name was given.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() { &self.email } else { &self.full_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roles_become_base_role() {
        let id = Identity::new("u1", "a@b.c", "A", Vec::<String>::new());
        assert_eq!(id.roles().len(), 1);
        assert!(id.has_role(ROLE_USER));

        let blank = Identity::new("u2", "a@b.c", "A", ["", "  "]);
        assert!(blank.has_role(ROLE_USER));
    }

    #[test]
    fn elevated_roles_kept_as_given() {
        let id = Identity::new("u1", "a@b.c", "A", [ROLE_ADMIN]);
        assert!(id.has_role(ROLE_ADMIN));
        assert!(!id.has_role(ROLE_USER));
    }

    #[test]
    fn serializes_camel_case_without_secrets() {
        let id = Identity::new("u1", "a@b.c", "Ann Lee", [ROLE_USER]);
        let v = serde_json::to_value(&id).unwrap();
        assert_eq!(v["fullName"], "Ann Lee");
        assert_eq!(v["isActive"], true);
        assert_eq!(v["roles"], serde_json::json!(["user"]));
        assert!(v.get("password").is_none());
    }
}
