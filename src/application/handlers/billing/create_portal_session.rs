//! CreatePortalSessionHandler - Opens the provider's self-service billing portal.

use std::sync::Arc;

use crate::domain::billing::{BillingError, ProductKey};
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, BillingStore, PortalSession};

/// Command to open a billing portal session.
#[derive(Debug, Clone)]
pub struct CreatePortalSessionCommand {
    pub user_id: UserId,
    pub product_key: ProductKey,
    pub return_url: String,
}

/// Handler for billing portal sessions.
///
/// Only users whose entitlement carries a provider customer reference can
/// open the portal.
pub struct CreatePortalSessionHandler {
    provider: Arc<dyn BillingProvider>,
    store: Arc<dyn BillingStore>,
}

impl CreatePortalSessionHandler {
    pub fn new(provider: Arc<dyn BillingProvider>, store: Arc<dyn BillingStore>) -> Self {
        Self { provider, store }
    }

    pub async fn handle(
        &self,
        cmd: CreatePortalSessionCommand,
    ) -> Result<PortalSession, BillingError> {
        let customer_id = self
            .store
            .find_entitlement(&cmd.user_id, cmd.product_key)
            .await?
            .and_then(|projection| projection.provider_customer_id)
            .ok_or(BillingError::NoBillingAccount)?;

        let session = self
            .provider
            .create_portal_session(&customer_id, &cmd.return_url)
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            product_key = %cmd.product_key,
            session_id = %session.id,
            "Billing portal session created"
        );

        Ok(session)
    }
}
