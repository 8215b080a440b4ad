//! GetEntitlementHandler - Query handler for a user's entitlement.

use std::sync::Arc;

use crate::domain::billing::{BillingError, EntitlementProjection, ProductKey};
use crate::domain::foundation::UserId;
use crate::ports::BillingStore;

/// Query for one entitlement.
#[derive(Debug, Clone)]
pub struct GetEntitlementQuery {
    pub user_id: UserId,
    pub product_key: ProductKey,
}

/// Current entitlement and whether it grants access.
#[derive(Debug, Clone)]
pub struct GetEntitlementResult {
    pub projection: EntitlementProjection,
    pub has_access: bool,
}

/// Handler for entitlement reads. Never writes.
pub struct GetEntitlementHandler {
    store: Arc<dyn BillingStore>,
}

impl GetEntitlementHandler {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: GetEntitlementQuery) -> Result<GetEntitlementResult, BillingError> {
        let projection = self
            .store
            .find_entitlement(&query.user_id, query.product_key)
            .await?
            .unwrap_or_else(|| EntitlementProjection::empty(query.user_id, query.product_key));

        Ok(GetEntitlementResult {
            has_access: projection.has_access(),
            projection,
        })
    }
}
