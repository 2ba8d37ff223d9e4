use super::Identity;

/// Per-call admission result handed explicitly to the handler.
/// `identity` is `None` only for public operations.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub operation: String,
    pub identity: Option<Identity>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(operation: &str, identity: Option<Identity>) -> Self {
        Self { operation: operation.to_string(), identity, request_id: uuid::Uuid::new_v4().to_string() }
    }
}
