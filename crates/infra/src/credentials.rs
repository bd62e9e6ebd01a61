//! Supplier access credentials.
//!
//! A supplier never logs in. The link they receive carries an opaque token
//! that resolves to exactly one supplier response; whether that response may
//! still be submitted is decided by the RFQ aggregate, not here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use quoteflow_core::{DomainError, TenantId};
use quoteflow_rfq::{AccessToken, RfqId, SupplierRfqId};

/// What a valid token grants access to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SupplierGrant {
    pub tenant_id: TenantId,
    pub rfq_id: RfqId,
    pub supplier_rfq_id: SupplierRfqId,
}

pub trait CredentialIndex: Send + Sync {
    /// Bind a token to a grant. Binding an already-bound token is an error.
    fn register(&self, token: &AccessToken, grant: SupplierGrant) -> Result<(), DomainError>;

    /// Unknown tokens are `Unauthorized`; the caller learns nothing else.
    fn resolve(&self, token: &AccessToken) -> Result<SupplierGrant, DomainError>;

    fn revoke(&self, token: &AccessToken);
}

impl<S> CredentialIndex for Arc<S>
where
    S: CredentialIndex + ?Sized,
{
    fn register(&self, token: &AccessToken, grant: SupplierGrant) -> Result<(), DomainError> {
        (**self).register(token, grant)
    }

    fn resolve(&self, token: &AccessToken) -> Result<SupplierGrant, DomainError> {
        (**self).resolve(token)
    }

    fn revoke(&self, token: &AccessToken) {
        (**self).revoke(token)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialIndex {
    grants: RwLock<HashMap<String, SupplierGrant>>,
}

impl InMemoryCredentialIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialIndex for InMemoryCredentialIndex {
    fn register(&self, token: &AccessToken, grant: SupplierGrant) -> Result<(), DomainError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| DomainError::invariant("credential index lock poisoned"))?;
        if grants.contains_key(token.as_str()) {
            return Err(DomainError::conflict("access token already issued"));
        }
        grants.insert(token.as_str().to_string(), grant);
        Ok(())
    }

    fn resolve(&self, token: &AccessToken) -> Result<SupplierGrant, DomainError> {
        let grants = self.grants.read().map_err(|_| DomainError::Unauthorized)?;
        grants.get(token.as_str()).copied().ok_or(DomainError::Unauthorized)
    }

    fn revoke(&self, token: &AccessToken) {
        if let Ok(mut grants) = self.grants.write() {
            grants.remove(token.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoteflow_core::AggregateId;

    fn grant() -> SupplierGrant {
        SupplierGrant {
            tenant_id: TenantId::new(),
            rfq_id: RfqId::new(AggregateId::new()),
            supplier_rfq_id: SupplierRfqId::new(AggregateId::new()),
        }
    }

    #[test]
    fn resolves_registered_tokens_only() {
        let index = InMemoryCredentialIndex::new();
        let token = AccessToken::generate();
        let g = grant();
        index.register(&token, g).unwrap();

        assert_eq!(index.resolve(&token).unwrap(), g);
        assert_eq!(
            index.resolve(&AccessToken::from_string("guess")).unwrap_err(),
            DomainError::Unauthorized
        );
    }

    #[test]
    fn tokens_bind_once_and_can_be_revoked() {
        let index = InMemoryCredentialIndex::new();
        let token = AccessToken::generate();
        index.register(&token, grant()).unwrap();
        assert!(matches!(index.register(&token, grant()), Err(DomainError::Conflict(_))));

        index.revoke(&token);
        assert_eq!(index.resolve(&token).unwrap_err(), DomainError::Unauthorized);
    }
}
